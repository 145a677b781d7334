//! Face detection capability boundary.
//!
//! The engine never implements detection itself; deployments inject a
//! detector (Haar cascade, DNN, remote service) behind [`FaceDetector`].

use crate::types::BoundingBox;
use thiserror::Error;

/// Detection tuning.
///
/// Deliberately only two knobs: the cascade scale step and the minimum
/// accepted box edge. Everything else is an engine-fixed policy so the
/// behavioral surface stays bounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Image pyramid scale step (> 1.0).
    pub scale_factor: f32,
    /// Minimum face box edge in pixels; smaller detections are discarded.
    pub min_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_size: 60,
        }
    }
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Locates candidate face regions in a grayscale frame.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in `gray` (`width * height` bytes, row-major).
    fn detect(
        &self,
        gray: &[u8],
        width: u32,
        height: u32,
        params: DetectionParams,
    ) -> Result<Vec<BoundingBox>, DetectError>;
}
