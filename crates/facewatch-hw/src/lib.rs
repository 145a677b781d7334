//! facewatch-hw — Video source abstraction and concrete capture backends.
//!
//! Provides the [`VideoSource`] trait the engine pulls frames through,
//! the [`CaptureProvider`] configuration seam that hands out ready-to-use
//! handles per transport, and two backends: V4L2 local devices and MJPEG
//! recordings (file playback).

pub mod frame;
pub mod mjpeg;
pub mod source;
pub mod v4l2;

pub use frame::{avg_luminosity, Frame};
pub use mjpeg::MjpegFileSource;
pub use source::{CaptureProvider, SourceError, VideoSource};
pub use v4l2::{V4l2Provider, V4lSource};
