use thiserror::Error;

/// Why a capture handle could not be acquired
///
/// `Display` is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("Camera access is not available in this browser. Use HTTPS or localhost.")]
    Unavailable,

    #[error("Timed out waiting for camera permission. Check your browser settings.")]
    Timeout,

    #[error("Permission denied. Allow camera and microphone access in your browser settings and click \"Try again\".")]
    PermissionDenied,

    #[error("Camera or microphone not found. Check that the devices are connected.")]
    DeviceNotFound,

    #[error("Camera or microphone is in use by another application. Close other applications and try again.")]
    DeviceInUse,

    #[error("Adjusting camera settings (attempt {attempt}/{max})...")]
    Adjusting { attempt: u32, max: u32 },

    #[error("Could not find compatible camera settings. Check that the camera works and try again.")]
    Incompatible,

    #[error("Video recording is not supported in this browser. Use Safari 14.3+ on iOS or a modern browser.")]
    NotSupported,

    #[error("Could not access the camera or microphone.")]
    Unknown(String),
}

impl AcquisitionError {
    /// Another attempt with simpler constraints may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Adjusting { .. })
    }
}
