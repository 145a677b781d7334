//! facewatch-core — Recognition engine plumbing.
//!
//! Defines the capability boundary to the external vision algorithms
//! (face detection and trainable face recognition), plus everything that
//! feeds and consumes them: the filename-addressed sample store, the
//! refreshable identity cache, and the recognition model manager.
//!
//! The detection/recognition algorithms themselves are deliberately NOT
//! implemented here; they are injected behind [`FaceDetector`] and
//! [`RecognizerBackend`].

pub mod detector;
pub mod identity;
pub mod model;
pub mod recognizer;
pub mod samples;
pub mod types;

pub use detector::{DetectError, DetectionParams, FaceDetector};
pub use identity::{IdentityCache, PersonRegistry, RegistryError, CACHE_REFRESH_FRAMES, UNKNOWN_LABEL};
pub use model::{ModelManager, TrainingError};
pub use recognizer::{FacePredictor, LabeledFace, RecognizerBackend, RecognizerError};
pub use samples::{SampleError, SampleStore};
pub use types::{BoundingBox, PersonIdentity, Prediction, FACE_CROP_SIZE};
