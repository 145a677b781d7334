//! Per-frame processing — detection, recognition overlay, and capture
//! servicing. One pipeline instance is shared by every stream worker.

use crate::annotate::{self, GREEN, ORANGE, RED, WHITE, YELLOW};
use crate::session::{CaptureDecision, SessionManager};
use facewatch_core::{
    DetectionParams, FaceDetector, IdentityCache, ModelManager, SampleStore, BoundingBox,
    FACE_CROP_SIZE, UNKNOWN_LABEL,
};
use facewatch_hw::{avg_luminosity, Frame};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use std::sync::Arc;

/// Predictions at or above this distance are reported as unknown.
pub const CONFIDENCE_THRESHOLD: f32 = 100.0;

const LABEL_MARGIN: u32 = 4;
const RECT_THICKNESS: u32 = 2;
const JPEG_QUALITY: u8 = 80;

/// Stateless frame processor. Detection and overlay policy lives here;
/// all mutable state (session, model, cache) is passed per call.
pub struct FramePipeline {
    detector: Arc<dyn FaceDetector>,
    params: DetectionParams,
}

impl FramePipeline {
    pub fn new(detector: Arc<dyn FaceDetector>, params: DetectionParams) -> Self {
        Self { detector, params }
    }

    /// Annotate `frame` with recognition results and encode it as JPEG.
    ///
    /// Returns `None` when the frame should be dropped (detection or
    /// encoding failed); the stream skips to the next frame.
    pub fn process_recognition(
        &self,
        frame: &Frame,
        model: &ModelManager,
        identities: &IdentityCache,
    ) -> Option<Vec<u8>> {
        let gray = frame.to_gray();
        let faces = match self.detect(&gray) {
            Some(faces) => faces,
            None => return None,
        };

        let mut canvas = frame.rgb.clone();
        for bbox in &faces {
            let bbox = bbox.clamped(frame.width(), frame.height());
            let crop = crop_face(&gray, &bbox);

            match model.predict(crop.as_raw(), FACE_CROP_SIZE) {
                Ok(p) if p.distance < CONFIDENCE_THRESHOLD => {
                    let name = identities.name_of(p.person_id);
                    annotate::draw_rect(&mut canvas, &bbox, GREEN, RECT_THICKNESS);
                    draw_box_label(&mut canvas, &bbox, name, GREEN);
                    draw_below_label(
                        &mut canvas,
                        &bbox,
                        &format!("Conf: {:.0}", p.distance),
                        YELLOW,
                    );
                }
                Ok(p) => {
                    annotate::draw_rect(&mut canvas, &bbox, ORANGE, RECT_THICKNESS);
                    draw_box_label(&mut canvas, &bbox, UNKNOWN_LABEL, ORANGE);
                    draw_below_label(
                        &mut canvas,
                        &bbox,
                        &format!("Conf: {:.0}", p.distance),
                        YELLOW,
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "prediction failed");
                    annotate::draw_rect(&mut canvas, &bbox, RED, RECT_THICKNESS);
                    draw_box_label(&mut canvas, &bbox, "?", RED);
                }
            }
        }

        encode_jpeg(&canvas)
    }

    /// Annotate `frame` for an enrollment preview and persist a sample
    /// when the session decides to capture.
    pub fn process_capture(
        &self,
        frame: &Frame,
        session: &SessionManager,
        store: &SampleStore,
    ) -> Option<Vec<u8>> {
        let gray = frame.to_gray();
        let luminosity = avg_luminosity(&gray);
        let faces = match self.detect(&gray) {
            Some(faces) => faces,
            None => return None,
        };

        let status = session.status();
        let mut canvas = frame.rgb.clone();

        let mut captured_now = false;
        for bbox in &faces {
            let bbox = bbox.clamped(frame.width(), frame.height());
            annotate::draw_rect(&mut canvas, &bbox, GREEN, RECT_THICKNESS);
            if status.active {
                draw_box_label(&mut canvas, &bbox, &status.person_name, GREEN);
            }

            if captured_now {
                continue; // one sample per frame
            }
            if let CaptureDecision::Capture { person_id, sequence } =
                session.maybe_capture(luminosity)
            {
                let crop = crop_face(&gray, &bbox);
                match store.save(person_id, sequence, &crop) {
                    Ok(path) => {
                        session.commit_capture();
                        captured_now = true;
                        tracing::info!(
                            person_id,
                            sequence,
                            path = %path.display(),
                            "sample saved"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(person_id, sequence, error = %e, "sample save failed");
                    }
                }
            }
        }

        let line = format!(
            "Photos: {}/{} | Lum: {} | Faces: {}",
            status.captured + captured_now as u32,
            status.max_samples,
            luminosity,
            faces.len()
        );
        annotate::draw_label(&mut canvas, LABEL_MARGIN, LABEL_MARGIN, &line, WHITE);
        if status.active {
            annotate::draw_label(
                &mut canvas,
                LABEL_MARGIN,
                LABEL_MARGIN + annotate::LINE_HEIGHT + 2,
                &format!("Enrolling: {}", status.person_name),
                WHITE,
            );
        }

        // Flash feedback so the operator sees the shot land.
        if captured_now {
            let border = BoundingBox {
                x: 0,
                y: 0,
                width: frame.width().saturating_sub(1),
                height: frame.height().saturating_sub(1),
            };
            annotate::draw_rect(&mut canvas, &border, WHITE, 6);
        }

        encode_jpeg(&canvas)
    }

    fn detect(&self, gray: &GrayImage) -> Option<Vec<BoundingBox>> {
        match self
            .detector
            .detect(gray.as_raw(), gray.width(), gray.height(), self.params)
        {
            Ok(faces) => Some(faces),
            Err(e) => {
                tracing::warn!(error = %e, "detection failed, frame dropped");
                None
            }
        }
    }
}

/// Extract a face region and normalize it to the fixed crop size.
fn crop_face(gray: &GrayImage, bbox: &BoundingBox) -> GrayImage {
    let crop = imageops::crop_imm(gray, bbox.x, bbox.y, bbox.width.max(1), bbox.height.max(1))
        .to_image();
    if crop.width() == FACE_CROP_SIZE && crop.height() == FACE_CROP_SIZE {
        crop
    } else {
        imageops::resize(&crop, FACE_CROP_SIZE, FACE_CROP_SIZE, FilterType::Triangle)
    }
}

fn draw_box_label(canvas: &mut RgbImage, bbox: &BoundingBox, text: &str, color: image::Rgb<u8>) {
    let y = bbox.y.saturating_sub(annotate::LINE_HEIGHT + LABEL_MARGIN);
    annotate::draw_label(canvas, bbox.x, y, text, color);
}

fn draw_below_label(canvas: &mut RgbImage, bbox: &BoundingBox, text: &str, color: image::Rgb<u8>) {
    let y = (bbox.y + bbox.height + LABEL_MARGIN).min(
        // keep the line on the canvas
        canvas.height().saturating_sub(annotate::LINE_HEIGHT),
    );
    annotate::draw_label(canvas, bbox.x, y, text, color);
}

/// Encode an annotated frame for the multipart stream. Encoding failure
/// drops the frame rather than the stream.
pub fn encode_jpeg(img: &RgbImage) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    match img.write_with_encoder(encoder) {
        Ok(()) => Some(out),
        Err(e) => {
            tracing::error!(error = %e, "jpeg encode failed, frame dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facewatch_core::{
        DetectError, FacePredictor, LabeledFace, Prediction, RecognizerBackend, RecognizerError,
    };
    use facewatch_core::PersonRegistry;

    /// Reports one fixed face box per frame.
    struct OneFaceDetector;

    impl FaceDetector for OneFaceDetector {
        fn detect(
            &self,
            _gray: &[u8],
            _width: u32,
            _height: u32,
            _params: DetectionParams,
        ) -> Result<Vec<BoundingBox>, DetectError> {
            Ok(vec![BoundingBox { x: 10, y: 10, width: 100, height: 100 }])
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(
            &self,
            _gray: &[u8],
            _width: u32,
            _height: u32,
            _params: DetectionParams,
        ) -> Result<Vec<BoundingBox>, DetectError> {
            Err(DetectError::Failed("cascade not loaded".into()))
        }
    }

    /// Backend whose predictor always answers with a fixed result.
    struct FixedBackend {
        person_id: i32,
        distance: f32,
    }

    struct FixedPredictor {
        person_id: i32,
        distance: f32,
    }

    impl RecognizerBackend for FixedBackend {
        fn train(&self, _samples: &[LabeledFace]) -> Result<Vec<u8>, RecognizerError> {
            Ok(vec![self.person_id as u8])
        }
        fn load(&self, _artifact: &[u8]) -> Result<Box<dyn FacePredictor>, RecognizerError> {
            Ok(Box::new(FixedPredictor {
                person_id: self.person_id,
                distance: self.distance,
            }))
        }
    }

    impl FacePredictor for FixedPredictor {
        fn predict(&self, _face: &[u8], _size: u32) -> Result<Prediction, RecognizerError> {
            Ok(Prediction { person_id: self.person_id, distance: self.distance })
        }
    }

    struct OnePerson;

    impl PersonRegistry for OnePerson {
        fn get_all(&self) -> Result<Vec<facewatch_core::PersonIdentity>, facewatch_core::RegistryError> {
            Ok(vec![facewatch_core::PersonIdentity { person_id: 7, name: "Alice".into() }])
        }
        fn create(
            &self,
            _person: facewatch_core::PersonIdentity,
        ) -> Result<(), facewatch_core::RegistryError> {
            Ok(())
        }
    }

    fn bright_frame() -> Frame {
        Frame::new(RgbImage::from_pixel(320, 240, image::Rgb([200, 200, 200])))
    }

    fn pipeline(detector: Arc<dyn FaceDetector>) -> FramePipeline {
        FramePipeline::new(detector, DetectionParams::default())
    }

    fn loaded_model(dir: &std::path::Path, distance: f32) -> ModelManager {
        let model = ModelManager::new(
            dir.join("model.bin"),
            Arc::new(FixedBackend { person_id: 7, distance }),
        );
        std::fs::write(model.artifact_path(), b"x").unwrap();
        model.reload().unwrap();
        model
    }

    #[test]
    fn test_recognition_produces_jpeg() {
        let tmp = tempfile::tempdir().unwrap();
        let model = loaded_model(tmp.path(), 42.0);
        let mut cache = IdentityCache::new();
        cache.refresh(&OnePerson);

        let p = pipeline(Arc::new(OneFaceDetector));
        let jpeg = p
            .process_recognition(&bright_frame(), &model, &cache)
            .unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]); // SOI
    }

    #[test]
    fn test_recognition_survives_distance_over_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let model = loaded_model(tmp.path(), CONFIDENCE_THRESHOLD + 1.0);
        let cache = IdentityCache::new();

        let p = pipeline(Arc::new(OneFaceDetector));
        assert!(p
            .process_recognition(&bright_frame(), &model, &cache)
            .is_some());
    }

    #[test]
    fn test_detection_failure_drops_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let model = loaded_model(tmp.path(), 42.0);
        let cache = IdentityCache::new();

        let p = pipeline(Arc::new(FailingDetector));
        assert!(p
            .process_recognition(&bright_frame(), &model, &cache)
            .is_none());
    }

    #[test]
    fn test_capture_persists_and_commits() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SampleStore::open(tmp.path().join("pictures")).unwrap();
        let session = SessionManager::new();
        session.start_manual(7, "Alice", 3);
        session.request_capture();

        let p = pipeline(Arc::new(OneFaceDetector));
        let jpeg = p.process_capture(&bright_frame(), &session, &store).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        assert_eq!(session.status().captured, 1);
        assert!(tmp.path().join("pictures/person.7.1.jpg").exists());

        // No trigger armed: next frame previews without capturing.
        p.process_capture(&bright_frame(), &session, &store).unwrap();
        assert_eq!(session.status().captured, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_capture_preview_works_without_session() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SampleStore::open(tmp.path().join("pictures")).unwrap();
        let session = SessionManager::new();

        let p = pipeline(Arc::new(OneFaceDetector));
        assert!(p
            .process_capture(&bright_frame(), &session, &store)
            .is_some());
        assert_eq!(store.count().unwrap(), 0);
    }
}
