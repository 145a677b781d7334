//! Video source and capture-provider traits.

use crate::frame::Frame;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("open failed: {0}")]
    Open(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("transport not supported: {0}")]
    Unsupported(String),
}

/// An open, readable video source.
///
/// Handles are exclusively owned by the stream that opened them and are
/// released by drop — there is no sharing or pooling across streams.
pub trait VideoSource: Send {
    /// Pull the next frame.
    ///
    /// `Ok(None)` means the source is exhausted (finite sources such as
    /// recordings). `Err` is a transient per-frame failure: the caller
    /// is expected to skip and retry rather than terminate.
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Configuration collaborator that hands out ready-to-use capture handles.
///
/// Platform- and transport-specific concerns (device backends, URL
/// construction, credentials in the dial string) live behind this seam;
/// the resolver never special-cases platforms itself.
pub trait CaptureProvider: Send + Sync {
    /// Open the local capture device at `index` (e.g. /dev/video0 for 0).
    fn open_local(&self, index: u32) -> Result<Box<dyn VideoSource>, SourceError>;

    /// Open a network camera from its stored connection parameters.
    fn open_network(
        &self,
        user: &str,
        password: &str,
        host: &str,
    ) -> Result<Box<dyn VideoSource>, SourceError>;

    /// Open a recorded feed from a file path.
    fn open_file(&self, path: &Path) -> Result<Box<dyn VideoSource>, SourceError>;
}
