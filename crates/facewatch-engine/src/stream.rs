//! MJPEG stream plumbing.
//!
//! Frames cross from a dedicated capture thread to async consumers over
//! a small bounded channel: the worker blocks on a full channel, so
//! production runs at consumption speed, and a dropped receiver ends the
//! worker at its next send. Multipart framing matches the
//! `multipart/x-mixed-replace` convention browsers render natively.

use crate::pipeline;
use image::RgbImage;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Boundary token used between multipart parts.
pub const MULTIPART_BOUNDARY: &str = "frame";

/// Frames buffered between the capture thread and the consumer.
pub const CHANNEL_DEPTH: usize = 2;

/// Pause before retrying after a transient source read failure.
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 480;

/// Value for the HTTP `Content-Type` header of an MJPEG response.
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace;boundary={MULTIPART_BOUNDARY}")
}

/// Wrap one JPEG image as a multipart part.
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{MULTIPART_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

/// Render an informational frame (dark background, one line of text per
/// entry) for stream states with no camera imagery to show.
pub fn placeholder_jpeg(lines: &[&str]) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(
        PLACEHOLDER_WIDTH,
        PLACEHOLDER_HEIGHT,
        image::Rgb([24, 24, 24]),
    );
    let total = lines.len() as u32 * (crate::annotate::LINE_HEIGHT + 8);
    let mut y = PLACEHOLDER_HEIGHT.saturating_sub(total) / 2;
    for line in lines {
        let width = line.len() as u32 * crate::annotate::LINE_HEIGHT;
        let x = PLACEHOLDER_WIDTH.saturating_sub(width) / 2;
        crate::annotate::draw_label(&mut img, x, y, line, crate::annotate::WHITE);
        y += crate::annotate::LINE_HEIGHT + 8;
    }
    // A solid frame cannot fail to encode at this size.
    pipeline::encode_jpeg(&img).unwrap_or_default()
}

/// Sender half handed to stream workers. Every payload is already a
/// complete multipart chunk.
pub struct ChunkSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChunkSender {
    /// Block until the chunk is accepted or the consumer is gone.
    /// Returns false once the receiver has been dropped; the worker
    /// should wind down.
    pub fn send(&self, chunk: Vec<u8>) -> bool {
        self.tx.blocking_send(chunk).is_ok()
    }
}

/// Spawn a capture worker on its own OS thread and return the async
/// stream of multipart chunks it produces.
///
/// The worker owns its camera handle for the lifetime of the thread;
/// when the returned stream is dropped the next send fails and the
/// worker unwinds, releasing the device.
pub fn spawn_stream<F>(name: &str, worker: F) -> ReceiverStream<Vec<u8>>
where
    F: FnOnce(ChunkSender) + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let thread_name = format!("facewatch-{name}");
    std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            worker(ChunkSender { tx });
            tracing::debug!(thread = %thread_name, "stream worker finished");
        })
        .expect("failed to spawn stream worker thread");
    ReceiverStream::new(rx)
}
