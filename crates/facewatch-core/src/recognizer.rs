//! Face recognition capability boundary.
//!
//! The trainable classifier is external. The engine drives it through two
//! traits: [`RecognizerBackend`] turns labeled samples into an opaque
//! artifact (and artifacts back into predictors), and [`FacePredictor`]
//! scores normalized face crops against the trained identities.

use crate::types::Prediction;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("training failed: {0}")]
    Train(String),
    #[error("prediction failed: {0}")]
    Predict(String),
    #[error("artifact rejected: {0}")]
    BadArtifact(String),
}

/// One labeled training sample: a square grayscale crop plus its person id.
#[derive(Debug, Clone)]
pub struct LabeledFace {
    pub person_id: i32,
    /// `size * size` grayscale bytes, row-major.
    pub pixels: Vec<u8>,
    pub size: u32,
}

/// A loaded classifier ready to score face crops.
pub trait FacePredictor: Send + Sync {
    /// Predict the closest enrolled identity for a `size * size` grayscale crop.
    fn predict(&self, face: &[u8], size: u32) -> Result<Prediction, RecognizerError>;
}

/// Trainable classifier backend.
///
/// Artifacts are opaque bytes; the model manager owns where they live on
/// disk and how they are swapped atomically.
pub trait RecognizerBackend: Send + Sync {
    /// Train a new model from labeled samples, returning the serialized artifact.
    fn train(&self, samples: &[LabeledFace]) -> Result<Vec<u8>, RecognizerError>;

    /// Deserialize an artifact into a usable predictor.
    fn load(&self, artifact: &[u8]) -> Result<Box<dyn FacePredictor>, RecognizerError>;
}
