//! Camera source resolution with local-webcam fallback.

use crate::registry::{CameraDescriptor, CameraRegistry, CameraStatus, CameraTransport};
use facewatch_hw::{CaptureProvider, SourceError, VideoSource};
use std::sync::Arc;
use thiserror::Error;

/// Conventional camera id meaning "no registered camera, local-only mode".
pub const LOCAL_ONLY_CAMERA_ID: i32 = 0;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("camera {0} unavailable: no source could be opened")]
    Unavailable(i32),
    #[error("camera registry: {0}")]
    Registry(#[from] facewatch_core::RegistryError),
}

/// An open source plus how it was obtained.
pub struct ResolvedSource {
    pub source: Box<dyn VideoSource>,
    /// True when the local fallback device was substituted.
    pub fallback: bool,
    /// The registered camera actually opened (None for fallback/local-only).
    /// Streams watch this descriptor's status for the stop condition.
    pub descriptor: Option<CameraDescriptor>,
}

/// Resolves camera identifiers to open video sources.
///
/// Transport backends come from the injected [`CaptureProvider`]; the
/// resolver only owns lookup, probe ordering and the fallback policy.
/// A probe that fails drops its handle before the next step — nothing
/// half-open survives the failure path.
#[derive(Clone)]
pub struct SourceResolver {
    cameras: Arc<dyn CameraRegistry>,
    provider: Arc<dyn CaptureProvider>,
    fallback_enabled: bool,
    webcam_index: u32,
}

impl SourceResolver {
    pub fn new(
        cameras: Arc<dyn CameraRegistry>,
        provider: Arc<dyn CaptureProvider>,
        fallback_enabled: bool,
        webcam_index: u32,
    ) -> Self {
        Self {
            cameras,
            provider,
            fallback_enabled,
            webcam_index,
        }
    }

    /// Open the source for `camera_id`, falling back to the local device
    /// when the registered camera cannot be opened and fallback is enabled.
    pub fn resolve(&self, camera_id: i32) -> Result<ResolvedSource, ResolveError> {
        if camera_id != LOCAL_ONLY_CAMERA_ID {
            match self.cameras.get_by_id(camera_id)? {
                Some(descriptor) => match self.open_transport(&descriptor.transport) {
                    Ok(source) => {
                        tracing::info!(
                            camera_id,
                            source = %source.describe(),
                            "camera source opened"
                        );
                        return Ok(ResolvedSource {
                            source,
                            fallback: false,
                            descriptor: Some(descriptor),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(camera_id, error = %e, "camera open failed");
                    }
                },
                None => {
                    tracing::warn!(camera_id, "camera not registered");
                }
            }
        }

        if self.fallback_enabled {
            match self.provider.open_local(self.webcam_index) {
                Ok(source) => {
                    tracing::info!(camera_id, index = self.webcam_index, "using local fallback");
                    return Ok(ResolvedSource {
                        source,
                        fallback: true,
                        descriptor: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(index = self.webcam_index, error = %e, "fallback open failed");
                }
            }
        }

        Err(ResolveError::Unavailable(camera_id))
    }

    /// Current registered status of `camera_id`, `None` when unregistered.
    /// Streams poll this as their stop condition.
    pub fn camera_status(&self, camera_id: i32) -> Result<Option<CameraStatus>, ResolveError> {
        Ok(self.cameras.get_by_id(camera_id)?.map(|d| d.status))
    }

    fn open_transport(
        &self,
        transport: &CameraTransport,
    ) -> Result<Box<dyn VideoSource>, SourceError> {
        match transport {
            CameraTransport::LocalDevice { index } => self.provider.open_local(*index),
            CameraTransport::NetworkRtsp { user, password, host } => {
                self.provider.open_network(user, password, host)
            }
            CameraTransport::File { path } => self.provider.open_file(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CameraStatus, MemoryCameraRegistry};
    use facewatch_hw::Frame;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource(&'static str);

    impl VideoSource for StubSource {
        fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            Ok(Some(Frame::new(image::RgbImage::new(4, 4))))
        }
        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    /// Local opens succeed, network opens fail; counts open attempts.
    struct FlakyNetworkProvider {
        network_attempts: AtomicUsize,
    }

    impl FlakyNetworkProvider {
        fn new() -> Self {
            Self { network_attempts: AtomicUsize::new(0) }
        }
    }

    impl CaptureProvider for FlakyNetworkProvider {
        fn open_local(&self, _index: u32) -> Result<Box<dyn VideoSource>, SourceError> {
            Ok(Box::new(StubSource("local")))
        }
        fn open_network(
            &self,
            _user: &str,
            _password: &str,
            _host: &str,
        ) -> Result<Box<dyn VideoSource>, SourceError> {
            self.network_attempts.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::Open("connection timed out".into()))
        }
        fn open_file(&self, _path: &Path) -> Result<Box<dyn VideoSource>, SourceError> {
            Err(SourceError::Open("no such file".into()))
        }
    }

    fn network_camera(id: i32) -> CameraDescriptor {
        CameraDescriptor {
            camera_id: id,
            transport: CameraTransport::NetworkRtsp {
                user: "admin".into(),
                password: "secret".into(),
                host: "10.0.0.8".into(),
            },
            status: CameraStatus::On,
        }
    }

    #[test]
    fn test_network_failure_falls_back_to_local() {
        let cameras = Arc::new(MemoryCameraRegistry::new());
        cameras.insert(network_camera(3));
        let provider = Arc::new(FlakyNetworkProvider::new());
        let resolver = SourceResolver::new(cameras, provider.clone(), true, 0);

        let resolved = resolver.resolve(3).unwrap();
        assert!(resolved.fallback);
        assert!(resolved.descriptor.is_none());
        assert_eq!(resolved.source.describe(), "local");
        assert_eq!(provider.network_attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_network_failure_without_fallback_is_unavailable() {
        let cameras = Arc::new(MemoryCameraRegistry::new());
        cameras.insert(network_camera(3));
        let resolver =
            SourceResolver::new(cameras, Arc::new(FlakyNetworkProvider::new()), false, 0);

        match resolver.resolve(3) {
            Err(ResolveError::Unavailable(3)) => {}
            other => panic!("expected Unavailable(3), got {:?}", other.err()),
        }
    }

    #[test]
    fn test_local_only_id_uses_fallback_device() {
        let cameras = Arc::new(MemoryCameraRegistry::new());
        let resolver =
            SourceResolver::new(cameras, Arc::new(FlakyNetworkProvider::new()), true, 0);

        let resolved = resolver.resolve(LOCAL_ONLY_CAMERA_ID).unwrap();
        assert!(resolved.fallback);
    }

    #[test]
    fn test_unregistered_camera_without_fallback_is_unavailable() {
        let cameras = Arc::new(MemoryCameraRegistry::new());
        let resolver =
            SourceResolver::new(cameras, Arc::new(FlakyNetworkProvider::new()), false, 0);
        assert!(resolver.resolve(9).is_err());
    }

    #[test]
    fn test_registered_camera_keeps_descriptor() {
        let cameras = Arc::new(MemoryCameraRegistry::new());
        cameras.insert(CameraDescriptor {
            camera_id: 5,
            transport: CameraTransport::LocalDevice { index: 2 },
            status: CameraStatus::On,
        });
        let resolver =
            SourceResolver::new(cameras, Arc::new(FlakyNetworkProvider::new()), true, 0);

        let resolved = resolver.resolve(5).unwrap();
        assert!(!resolved.fallback);
        assert_eq!(resolved.descriptor.unwrap().camera_id, 5);
    }
}
