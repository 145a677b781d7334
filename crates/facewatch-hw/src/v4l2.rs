//! V4L2 local-device capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::source::{CaptureProvider, SourceError, VideoSource};
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Pixel formats this backend can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale (native IR camera output).
    Grey,
}

/// V4L2 camera device handle.
pub struct V4lSource {
    device: Device,
    width: u32,
    height: u32,
    device_path: String,
    pixel_format: PixelFormat,
}

impl V4lSource {
    /// Open the device at `/dev/video{index}` and negotiate a format.
    pub fn open(index: u32) -> Result<Self, SourceError> {
        let device_path = format!("/dev/video{index}");
        if !Path::new(&device_path).exists() {
            return Err(SourceError::Open(format!("device not found: {device_path}")));
        }

        let device = Device::with_path(&device_path)
            .map_err(|e| SourceError::Open(format!("{device_path}: {e}")))?;

        let caps = device
            .query_caps()
            .map_err(|e| SourceError::Open(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(SourceError::Open(format!(
                "{device_path} does not support video capture"
            )));
        }

        // Request YUYV at 640x480; accept GREY if the driver negotiates it
        // (common for IR cameras).
        let mut fmt = device
            .format()
            .map_err(|e| SourceError::Open(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = 640;
        fmt.height = 480;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| SourceError::Open(format!("failed to set format: {e}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(SourceError::Open(format!(
                "unsupported pixel format: {:?} (need YUYV or GREY)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "opened local camera"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path,
            pixel_format,
        })
    }

    fn buf_to_frame(&self, buf: &[u8]) -> Result<Frame, SourceError> {
        let rgb = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| SourceError::Decode(e.to_string()))?,
            PixelFormat::Grey => {
                let pixels = (self.width * self.height) as usize;
                if buf.len() < pixels {
                    return Err(SourceError::Decode(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                frame::gray_to_rgb(buf, self.width, self.height)
            }
        };
        Ok(Frame::new(rgb))
    }
}

impl VideoSource for V4lSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| SourceError::Read(format!("failed to create mmap stream: {e}")))?;

        let (buf, _meta) = stream
            .next()
            .map_err(|e| SourceError::Read(format!("failed to dequeue buffer: {e}")))?;

        self.buf_to_frame(buf).map(Some)
    }

    fn describe(&self) -> String {
        format!("v4l2:{}", self.device_path)
    }
}

/// Default capture provider: local devices through V4L2, recorded feeds
/// through the MJPEG file source.
///
/// RTSP ingest needs a media decoder this crate does not carry; network
/// cameras are expected to be re-exposed as an MJPEG endpoint (most IP
/// cameras offer one) or substituted by the local fallback device.
pub struct V4l2Provider;

impl CaptureProvider for V4l2Provider {
    fn open_local(&self, index: u32) -> Result<Box<dyn VideoSource>, SourceError> {
        Ok(Box::new(V4lSource::open(index)?))
    }

    fn open_network(
        &self,
        _user: &str,
        _password: &str,
        host: &str,
    ) -> Result<Box<dyn VideoSource>, SourceError> {
        Err(SourceError::Unsupported(format!(
            "no RTSP decoder available for {host}; deploy an MJPEG relay or enable local fallback"
        )))
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn VideoSource>, SourceError> {
        Ok(Box::new(crate::mjpeg::MjpegFileSource::open(path)?))
    }
}
