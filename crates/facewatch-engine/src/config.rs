use facewatch_core::DetectionParams;
use std::path::PathBuf;

/// Engine configuration, loaded from environment variables.
pub struct Config {
    /// Directory where captured face samples are persisted.
    pub pictures_dir: PathBuf,
    /// Path of the trained classifier artifact.
    pub model_path: PathBuf,
    /// Substitute the local webcam when a configured camera cannot be opened.
    pub fallback_enabled: bool,
    /// Local capture device index used for fallback and local-only mode.
    pub webcam_index: u32,
    /// Detection pyramid scale step.
    pub scale_factor: f32,
    /// Minimum accepted face box edge in pixels.
    pub min_face_size: u32,
}

impl Config {
    /// Load configuration from `FACEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facewatch");

        Self {
            pictures_dir: std::env::var("FACEWATCH_PICTURES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("pictures")),
            model_path: std::env::var("FACEWATCH_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("classifier.bin")),
            fallback_enabled: std::env::var("FACEWATCH_WEBCAM_FALLBACK")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            webcam_index: env_u32("FACEWATCH_WEBCAM_INDEX", 0),
            scale_factor: env_f32("FACEWATCH_SCALE_FACTOR", 1.1),
            min_face_size: env_u32("FACEWATCH_MIN_FACE_SIZE", 60),
        }
    }

    /// The two detection knobs exposed to deployments; everything else is
    /// fixed engine policy.
    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            scale_factor: self.scale_factor,
            min_size: self.min_face_size,
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
