use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use super::constraints::{ConstraintLevel, MediaConstraints};
use super::error::AcquisitionError;
use crate::config::AcquisitionConfig;
use crate::platform::{CaptureHandle, DeviceCapabilities, DeviceError, DeviceErrorKind, MediaDevices, PreviewSurface};

/// Acquires the camera/microphone and owns the resulting capture handle
///
/// Cheap to clone; clones share the retry counter and the handle, so an
/// acquisition can run on its own task while the owner keeps a copy for
/// `stop_stream`.
#[derive(Clone)]
pub struct StreamAcquirer {
    inner: Arc<AcquirerInner>,
}

struct AcquirerInner {
    devices: Arc<dyn MediaDevices>,
    preview: Option<Arc<dyn PreviewSurface>>,
    capabilities: DeviceCapabilities,
    config: AcquisitionConfig,
    state: Mutex<AcquirerState>,
}

#[derive(Default)]
struct AcquirerState {
    /// Over-constrained failures since the last success or terminal failure
    retry_count: u32,
    stream: Option<Arc<dyn CaptureHandle>>,
}

impl StreamAcquirer {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        preview: Option<Arc<dyn PreviewSurface>>,
        capabilities: DeviceCapabilities,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(AcquirerInner {
                devices,
                preview,
                capabilities,
                config,
                state: Mutex::new(AcquirerState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, AcquirerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn retry_count(&self) -> u32 {
        self.state().retry_count
    }

    /// The live handle, if any
    pub fn stream(&self) -> Option<Arc<dyn CaptureHandle>> {
        self.state().stream.clone()
    }

    pub fn has_stream(&self) -> bool {
        self.state().stream.as_ref().is_some_and(|s| s.is_live())
    }

    /// Request a capture handle
    pub async fn start_stream(&self) -> Result<Arc<dyn CaptureHandle>, AcquisitionError> {
        self.start_stream_with(|_| {}).await
    }

    /// Request a capture handle, calling `on_retry` before the automatic retry
    pub async fn start_stream_with<F>(&self, mut on_retry: F) -> Result<Arc<dyn CaptureHandle>, AcquisitionError>
    where
        F: FnMut(&AcquisitionError) + Send,
    {
        if !self.inner.devices.is_available() {
            error!("Device-media API is not available");
            return Err(AcquisitionError::Unavailable);
        }

        loop {
            let retry_count = self.retry_count();
            let level = ConstraintLevel::for_attempt(retry_count, self.inner.capabilities.platform.is_ios);
            let constraints = MediaConstraints::for_level(level);

            info!("Requesting camera stream ({:?}, retry {})", level, retry_count);

            let result = timeout(
                self.inner.config.timeout(),
                self.inner.devices.get_user_media(&constraints),
            )
            .await;

            match result {
                Err(_) => {
                    error!("Camera request timed out after {:?}", self.inner.config.timeout());
                    self.state().retry_count = 0;
                    return Err(AcquisitionError::Timeout);
                }
                Ok(Ok(handle)) => {
                    self.install(Arc::clone(&handle)).await;
                    return Ok(handle);
                }
                Ok(Err(err)) => {
                    error!("Error accessing camera/mic: {}", err);
                    let failure = self.classify(&err);

                    let auto_retry = matches!(failure, AcquisitionError::Adjusting { attempt: 1, .. });
                    if !auto_retry {
                        return Err(failure);
                    }

                    warn!("{}", failure);
                    on_retry(&failure);
                    sleep(self.inner.config.retry_delay()).await;
                }
            }
        }
    }

    /// Map a device error to the user-facing taxonomy, updating the counter
    fn classify(&self, err: &DeviceError) -> AcquisitionError {
        let mut state = self.state();

        let failure = match err.kind() {
            DeviceErrorKind::OverConstrained => {
                state.retry_count += 1;
                let max = self.inner.config.max_retry_attempts;
                if state.retry_count <= max {
                    return AcquisitionError::Adjusting {
                        attempt: state.retry_count,
                        max,
                    };
                }
                AcquisitionError::Incompatible
            }
            DeviceErrorKind::PermissionDenied => AcquisitionError::PermissionDenied,
            DeviceErrorKind::NotFound => AcquisitionError::DeviceNotFound,
            DeviceErrorKind::NotReadable => AcquisitionError::DeviceInUse,
            DeviceErrorKind::NotSupported => AcquisitionError::NotSupported,
            DeviceErrorKind::Other => AcquisitionError::Unknown(err.name.clone()),
        };

        state.retry_count = 0;
        failure
    }

    async fn install(&self, handle: Arc<dyn CaptureHandle>) {
        let previous = {
            let mut state = self.state();
            state.retry_count = 0;
            state.stream.replace(Arc::clone(&handle))
        };

        if let Some(previous) = previous {
            if previous.id() != handle.id() {
                info!("Releasing superseded stream {}", previous.id());
                previous.stop_tracks();
            }
        }

        info!("Camera stream ready: {}", handle.id());

        if let Some(preview) = &self.inner.preview {
            preview.attach(handle);
            if let Err(e) = preview.play().await {
                warn!("Preview auto-play prevented: {}", e);
            }
        }
    }

    /// Stop every track of the current handle; no-op without one
    pub fn stop_stream(&self) {
        let stream = self.state().stream.take();

        if let Some(preview) = &self.inner.preview {
            preview.detach();
        }

        if let Some(stream) = stream {
            info!("Stopping camera stream {}", stream.id());
            stream.stop_tracks();
        }
    }
}

impl Drop for AcquirerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(stream) = state.stream.take() {
            stream.stop_tracks();
        }
    }
}
