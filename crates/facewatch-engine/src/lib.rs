//! facewatch-engine — Camera resolution, frame pipeline, enrollment
//! sessions, and MJPEG stream multiplexing.
//!
//! The engine is a library: an external HTTP layer owns routing and
//! response plumbing and drives everything through [`Engine`]. Streams
//! are `tokio_stream` streams of complete multipart chunks; each stream
//! runs its capture loop on a dedicated OS thread and ends when the
//! consumer disconnects, the source is exhausted, or the camera's
//! registered status drops to off.

pub mod annotate;
pub mod config;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod stream;

pub use config::Config;
pub use pipeline::{FramePipeline, CONFIDENCE_THRESHOLD};
pub use registry::{
    CameraDescriptor, CameraRegistry, CameraStatus, CameraTransport, MemoryCameraRegistry,
    MemoryPersonRegistry,
};
pub use resolver::{ResolveError, ResolvedSource, SourceResolver, LOCAL_ONLY_CAMERA_ID};
pub use session::{
    next_person_id, CaptureMode, SessionError, SessionManager, SessionStatus,
    AUTO_CAPTURE_COOLDOWN, AUTO_MIN_LUMINOSITY, DEFAULT_MAX_SAMPLES, MANUAL_MIN_LUMINOSITY,
};
pub use stream::{content_type, multipart_chunk, MULTIPART_BOUNDARY};

use facewatch_core::{
    FaceDetector, IdentityCache, ModelManager, PersonRegistry, RecognizerBackend, SampleStore,
    CACHE_REFRESH_FRAMES,
};
use facewatch_hw::CaptureProvider;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use stream::ChunkSender;
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("sample store: {0}")]
    Store(#[from] facewatch_core::SampleError),
    #[error("session: {0}")]
    Session(#[from] SessionError),
    #[error("registry: {0}")]
    Registry(#[from] facewatch_core::RegistryError),
}

/// Outcome of a training run, shaped for direct serialization by the
/// HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub success: bool,
    pub message: String,
    pub images: usize,
}

/// Point-in-time engine health report.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub model_trained: bool,
    pub sample_count: usize,
    pub pictures_dir: PathBuf,
}

/// The engine facade. Construct once, share via `Arc`, drive from the
/// outer surface.
pub struct Engine {
    model: Arc<ModelManager>,
    store: Arc<SampleStore>,
    persons: Arc<dyn PersonRegistry>,
    resolver: SourceResolver,
    session: SessionManager,
    pipeline: Arc<FramePipeline>,
}

impl Engine {
    pub fn new(
        config: &Config,
        detector: Arc<dyn FaceDetector>,
        backend: Arc<dyn RecognizerBackend>,
        cameras: Arc<dyn CameraRegistry>,
        persons: Arc<dyn PersonRegistry>,
        provider: Arc<dyn CaptureProvider>,
    ) -> Result<Self, EngineError> {
        let store = Arc::new(SampleStore::open(&config.pictures_dir)?);
        let model = Arc::new(ModelManager::new(&config.model_path, backend));
        let resolver = SourceResolver::new(
            cameras,
            provider,
            config.fallback_enabled,
            config.webcam_index,
        );
        let pipeline = Arc::new(FramePipeline::new(detector, config.detection_params()));
        Ok(Self {
            model,
            store,
            persons,
            resolver,
            session: SessionManager::new(),
            pipeline,
        })
    }

    // --- Session control -------------------------------------------------

    /// Start a manual enrollment session for a new person; returns the
    /// id allocated for them.
    pub fn start_session(&self, person_name: &str, max_samples: u32) -> Result<i32, EngineError> {
        let person_id = next_person_id(self.persons.as_ref())?;
        self.session.start_manual(person_id, person_name, max_samples);
        Ok(person_id)
    }

    /// Arm the next manual capture.
    pub fn trigger_capture(&self) {
        self.session.request_capture();
    }

    pub fn session_status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Abandon the active session without registering anyone.
    pub fn reset_session(&self) {
        self.session.reset();
    }

    /// End the session, registering its person when samples were captured.
    pub fn finish_session(&self) -> Result<SessionStatus, EngineError> {
        Ok(self.session.finish(self.persons.as_ref())?)
    }

    // --- Training and status ----------------------------------------------

    /// Rebuild the recognition model from every persisted sample.
    pub fn train(&self) -> TrainReport {
        match self.model.train(&self.store) {
            Ok(images) => TrainReport {
                success: true,
                message: format!("model trained on {images} images"),
                images,
            },
            Err(e) => {
                tracing::error!(error = %e, "training failed");
                TrainReport {
                    success: false,
                    message: e.to_string(),
                    images: 0,
                }
            }
        }
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            model_trained: self.model.is_trained(),
            sample_count: self.store.count().unwrap_or(0),
            pictures_dir: self.store.dir().to_path_buf(),
        }
    }

    // --- Streams ----------------------------------------------------------

    /// Live recognition stream for `camera_id`.
    ///
    /// When no trained model exists the stream yields a single
    /// explanatory placeholder and ends.
    pub fn recognition_stream(&self, camera_id: i32) -> ReceiverStream<Vec<u8>> {
        if !self.model.is_trained() {
            tracing::warn!(camera_id, "recognition requested with no trained model");
            return stream::spawn_stream("recognize", |tx| {
                let jpeg = stream::placeholder_jpeg(&["Model not trained", "Run training first"]);
                tx.send(multipart_chunk(&jpeg));
            });
        }

        let model = Arc::clone(&self.model);
        let persons = Arc::clone(&self.persons);
        let resolver = self.resolver.clone();
        let pipeline = Arc::clone(&self.pipeline);

        stream::spawn_stream("recognize", move |tx| {
            if let Err(e) = model.reload() {
                tracing::error!(error = %e, "model reload failed");
                let jpeg = stream::placeholder_jpeg(&["Model unavailable"]);
                tx.send(multipart_chunk(&jpeg));
                return;
            }

            let mut resolved = match resolver.resolve(camera_id) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(camera_id, error = %e, "no source for recognition stream");
                    let jpeg = stream::placeholder_jpeg(&["Camera unavailable"]);
                    tx.send(multipart_chunk(&jpeg));
                    return;
                }
            };

            let mut identities = IdentityCache::new();
            identities.refresh(persons.as_ref());

            let mut frames: u64 = 0;
            loop {
                if camera_turned_off(&resolver, &resolved) {
                    let jpeg = stream::placeholder_jpeg(&["Camera turned off"]);
                    tx.send(multipart_chunk(&jpeg));
                    break;
                }
                match resolved.source.read_frame() {
                    Ok(Some(frame)) => {
                        frames += 1;
                        if frames % CACHE_REFRESH_FRAMES == 0 {
                            identities.refresh(persons.as_ref());
                        }
                        let Some(jpeg) =
                            pipeline.process_recognition(&frame, &model, &identities)
                        else {
                            continue;
                        };
                        if !tx.send(multipart_chunk(&jpeg)) {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!(camera_id, "source exhausted, ending stream");
                        let jpeg = stream::placeholder_jpeg(&["Stream ended"]);
                        tx.send(multipart_chunk(&jpeg));
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "frame read failed, retrying");
                        std::thread::sleep(stream::READ_RETRY_DELAY);
                    }
                }
            }
        })
    }

    /// Enrollment preview stream for `camera_id`, servicing the shared
    /// session: frames are annotated, and manual triggers persist samples.
    /// Runs until the consumer disconnects or the camera stops.
    pub fn capture_stream(&self, camera_id: i32) -> ReceiverStream<Vec<u8>> {
        let resolver = self.resolver.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let session = self.session.clone();
        let store = Arc::clone(&self.store);

        stream::spawn_stream("capture", move |tx| {
            let mut resolved = match resolver.resolve(camera_id) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(camera_id, error = %e, "no source for capture stream");
                    let jpeg = stream::placeholder_jpeg(&["Camera unavailable"]);
                    tx.send(multipart_chunk(&jpeg));
                    return;
                }
            };

            run_capture_loop(&tx, &resolver, &mut resolved, &pipeline, &session, &store, None);
        })
    }

    /// Hands-free enrollment: allocates a person id, starts an automatic
    /// session, streams annotated previews, and registers the person once
    /// `max_samples` captures land. Ends with a completion placeholder.
    pub fn auto_capture_stream(
        &self,
        camera_id: i32,
        person_name: &str,
        max_samples: u32,
    ) -> Result<ReceiverStream<Vec<u8>>, EngineError> {
        let person_id = next_person_id(self.persons.as_ref())?;
        self.session.start_auto(person_id, person_name, max_samples);

        let resolver = self.resolver.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let session = self.session.clone();
        let store = Arc::clone(&self.store);
        let persons = Arc::clone(&self.persons);
        let name = person_name.to_string();

        Ok(stream::spawn_stream("auto-capture", move |tx| {
            let mut resolved = match resolver.resolve(camera_id) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(camera_id, error = %e, "no source for auto capture");
                    let jpeg = stream::placeholder_jpeg(&["Camera unavailable"]);
                    tx.send(multipart_chunk(&jpeg));
                    return;
                }
            };

            let completed = run_capture_loop(
                &tx,
                &resolver,
                &mut resolved,
                &pipeline,
                &session,
                &store,
                Some(&session),
            );

            if completed {
                match session.finish(persons.as_ref()) {
                    Ok(summary) => {
                        let line = format!(
                            "Enrolled {} with {} samples",
                            name, summary.captured
                        );
                        let jpeg = stream::placeholder_jpeg(&["Capture complete", &line]);
                        tx.send(multipart_chunk(&jpeg));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "finishing auto session failed");
                        let jpeg = stream::placeholder_jpeg(&["Enrollment failed"]);
                        tx.send(multipart_chunk(&jpeg));
                    }
                }
            }
        }))
    }
}

/// Shared preview/capture loop. Returns true when it stopped because the
/// completion session (auto mode) reached its sample ceiling.
fn run_capture_loop(
    tx: &ChunkSender,
    resolver: &SourceResolver,
    resolved: &mut ResolvedSource,
    pipeline: &FramePipeline,
    session: &SessionManager,
    store: &SampleStore,
    completion: Option<&SessionManager>,
) -> bool {
    loop {
        if let Some(s) = completion {
            if s.is_complete() {
                return true;
            }
        }
        if camera_turned_off(resolver, resolved) {
            let jpeg = stream::placeholder_jpeg(&["Camera turned off"]);
            tx.send(multipart_chunk(&jpeg));
            return false;
        }
        match resolved.source.read_frame() {
            Ok(Some(frame)) => {
                let Some(jpeg) = pipeline.process_capture(&frame, session, store) else {
                    continue;
                };
                if !tx.send(multipart_chunk(&jpeg)) {
                    return false;
                }
            }
            Ok(None) => {
                tracing::info!("source exhausted, ending capture stream");
                let jpeg = stream::placeholder_jpeg(&["Stream ended"]);
                tx.send(multipart_chunk(&jpeg));
                // A finite recording can still complete an auto session.
                return completion.map(|s| s.is_complete()).unwrap_or(false);
            }
            Err(e) => {
                tracing::debug!(error = %e, "frame read failed, retrying");
                std::thread::sleep(stream::READ_RETRY_DELAY);
            }
        }
    }
}

/// Stop condition for streams bound to a registered camera: the camera's
/// status in the registry is polled and anything but `On` ends the loop.
/// Fallback and local-only streams have no descriptor and never stop here.
fn camera_turned_off(resolver: &SourceResolver, resolved: &ResolvedSource) -> bool {
    let Some(descriptor) = &resolved.descriptor else {
        return false;
    };
    match resolver.camera_status(descriptor.camera_id) {
        Ok(Some(CameraStatus::On)) => false,
        Ok(_) => {
            tracing::info!(camera_id = descriptor.camera_id, "camera no longer on");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "camera status check failed; keeping stream");
            false
        }
    }
}
