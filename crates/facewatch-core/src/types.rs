use serde::{Deserialize, Serialize};

/// Edge length (pixels) of the square grayscale crop fed to the recognizer.
///
/// Every persisted sample and every prediction input uses this size;
/// changing it invalidates previously trained artifacts.
pub const FACE_CROP_SIZE: u32 = 220;

/// Axis-aligned bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Clamp the box so the crop stays inside a `frame_width` x `frame_height` frame.
    ///
    /// Detectors occasionally return boxes that overhang the frame edge by a
    /// pixel or two; cropping must never index out of bounds.
    pub fn clamped(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let x = self.x.min(frame_width.saturating_sub(1));
        let y = self.y.min(frame_height.saturating_sub(1));
        BoundingBox {
            x,
            y,
            width: self.width.min(frame_width - x).max(1),
            height: self.height.min(frame_height - y).max(1),
        }
    }
}

/// Stable person identifier plus display name.
///
/// Owned by the external person registry; the engine only reads these
/// (through the identity cache) and requests creation at enrollment end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonIdentity {
    pub person_id: i32,
    pub name: String,
}

/// Recognizer output for one face crop.
///
/// `distance` is a lower-is-better dissimilarity score; the pipeline
/// thresholds it to decide known vs unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub person_id: i32,
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_inside_frame_unchanged() {
        let b = BoundingBox { x: 10, y: 20, width: 50, height: 60 };
        assert_eq!(b.clamped(640, 480), b);
    }

    #[test]
    fn test_clamped_overhanging_edge() {
        let b = BoundingBox { x: 600, y: 440, width: 80, height: 80 };
        let c = b.clamped(640, 480);
        assert_eq!(c.x + c.width, 640);
        assert_eq!(c.y + c.height, 480);
    }

    #[test]
    fn test_clamped_origin_past_frame() {
        let b = BoundingBox { x: 700, y: 500, width: 10, height: 10 };
        let c = b.clamped(640, 480);
        assert!(c.x < 640 && c.y < 480);
        assert!(c.width >= 1 && c.height >= 1);
    }
}
