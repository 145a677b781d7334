//! Recognition model manager.
//!
//! Owns the trained-classifier artifact on disk: existence check,
//! (re)loading it into a predictor, and rebuilding it from the sample
//! store. The artifact is opaque bytes — its format belongs to the
//! injected [`RecognizerBackend`].

use crate::recognizer::{FacePredictor, LabeledFace, RecognizerBackend, RecognizerError};
use crate::samples::SampleStore;
use crate::types::{Prediction, FACE_CROP_SIZE};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("no images found in {}", dir.display())]
    NoSamples { dir: PathBuf },
    #[error("no usable images survived decoding")]
    NoUsableSamples,
    #[error("recognizer: {0}")]
    Backend(#[from] RecognizerError),
    #[error("sample store: {0}")]
    Store(#[from] crate::samples::SampleError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Thread-safe handle to the current trained model (if any).
pub struct ModelManager {
    artifact_path: PathBuf,
    backend: Arc<dyn RecognizerBackend>,
    predictor: RwLock<Option<Box<dyn FacePredictor>>>,
}

impl ModelManager {
    pub fn new(artifact_path: impl Into<PathBuf>, backend: Arc<dyn RecognizerBackend>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            backend,
            predictor: RwLock::new(None),
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// True iff a trained artifact exists at the configured location.
    pub fn is_trained(&self) -> bool {
        self.artifact_path.exists()
    }

    /// Modification timestamp of the current artifact, if one exists.
    pub fn trained_at(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.artifact_path)
            .and_then(|m| m.modified())
            .ok()
    }

    /// (Re)load the artifact into memory.
    ///
    /// Must run at least once before the first prediction of a stream;
    /// may run again at any time to pick up a newer artifact without
    /// restarting the stream.
    pub fn reload(&self) -> Result<(), TrainingError> {
        let bytes = std::fs::read(&self.artifact_path)?;
        let predictor = self.backend.load(&bytes)?;
        *self.predictor.write().unwrap_or_else(|e| e.into_inner()) = Some(predictor);
        tracing::info!(path = %self.artifact_path.display(), "recognition model loaded");
        Ok(())
    }

    /// Score one normalized face crop against the loaded model.
    pub fn predict(&self, face: &[u8], size: u32) -> Result<Prediction, RecognizerError> {
        let guard = self.predictor.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(p) => p.predict(face, size),
            None => Err(RecognizerError::Predict("model not loaded".into())),
        }
    }

    /// Train a new model from every decodable sample in `store`.
    ///
    /// Fails when the store holds zero samples or none survive decoding.
    /// On success the artifact is replaced atomically (temp + rename),
    /// the in-memory predictor is refreshed, and the count of images
    /// actually trained on is returned.
    pub fn train(&self, store: &SampleStore) -> Result<usize, TrainingError> {
        let files = store.scan()?;
        if files.is_empty() {
            return Err(TrainingError::NoSamples {
                dir: store.dir().to_path_buf(),
            });
        }

        let mut samples = Vec::with_capacity(files.len());
        for (person_id, path) in &files {
            let img = match image::open(path) {
                Ok(img) => img.into_luma8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping undecodable sample");
                    continue;
                }
            };
            let img = if img.width() != FACE_CROP_SIZE || img.height() != FACE_CROP_SIZE {
                image::imageops::resize(&img, FACE_CROP_SIZE, FACE_CROP_SIZE, FilterType::Nearest)
            } else {
                img
            };
            samples.push(LabeledFace {
                person_id: *person_id,
                pixels: img.into_raw(),
                size: FACE_CROP_SIZE,
            });
        }

        if samples.is_empty() {
            return Err(TrainingError::NoUsableSamples);
        }

        tracing::info!(images = samples.len(), "training recognition model");
        let artifact = self.backend.train(&samples)?;

        // Atomic replace so a concurrent reload never sees a torn artifact.
        if let Some(parent) = self.artifact_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.artifact_path.with_extension("tmp");
        std::fs::write(&tmp, &artifact)?;
        std::fs::rename(&tmp, &self.artifact_path)?;

        self.reload()?;
        tracing::info!(
            images = samples.len(),
            path = %self.artifact_path.display(),
            "training complete"
        );
        Ok(samples.len())
    }
}
