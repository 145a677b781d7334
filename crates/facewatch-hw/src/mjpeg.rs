//! MJPEG recording playback.
//!
//! Reads a raw MJPEG byte stream (concatenated JPEG images, with or
//! without multipart delimiters between them) and yields one frame per
//! embedded JPEG. Exhaustion is reported as `Ok(None)`, which is what
//! drives the engine's end-of-recording path.

use crate::frame::Frame;
use crate::source::{SourceError, VideoSource};
use std::path::Path;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Finite video source backed by an MJPEG file.
pub struct MjpegFileSource {
    data: Vec<u8>,
    pos: usize,
    description: String,
}

impl MjpegFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let data = std::fs::read(path)
            .map_err(|e| SourceError::Open(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), bytes = data.len(), "opened MJPEG recording");
        Ok(Self {
            data,
            pos: 0,
            description: format!("mjpeg:{}", path.display()),
        })
    }

    /// Source over an in-memory MJPEG byte stream.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            description: "mjpeg:<memory>".into(),
        }
    }

    fn find(&self, marker: [u8; 2], from: usize) -> Option<usize> {
        self.data[from..]
            .windows(2)
            .position(|w| w == marker)
            .map(|i| from + i)
    }
}

impl VideoSource for MjpegFileSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(start) = self.find(SOI, self.pos) else {
            return Ok(None);
        };
        let Some(end_marker) = self.find(EOI, start + 2) else {
            // Truncated trailing image: treat as exhaustion.
            self.pos = self.data.len();
            return Ok(None);
        };
        let end = end_marker + 2;
        // Advance past this segment even if it fails to decode, so a
        // corrupt image is skipped instead of retried forever.
        self.pos = end;

        let jpeg = &self.data[start..end];
        let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok(Some(Frame::new(img.into_rgb8())))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
