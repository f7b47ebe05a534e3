pub mod backend;
pub mod probe;
pub mod simulated;

pub use backend::{
    CaptureHandle, DeviceError, DeviceErrorKind, MediaDevices, MediaRecorder, MediaRecorderApi,
    PlaybackState, PlaybackSurface, PreviewSurface, RecorderEvent, RecorderState,
};
pub use probe::{
    candidate_mime_types, select_mime_profile, DeviceCapabilities, MimeProfile, PlatformFlags,
};

use std::sync::Arc;

/// The platform services one recorder session runs against
///
/// Implementations:
/// - Browser: getUserMedia / MediaRecorder / <video> via bindings
/// - Simulated: `simulated::SimulatedRuntime` (CLI, tests)
#[derive(Clone)]
pub struct MediaRuntime {
    /// Probed once at session start
    pub capabilities: DeviceCapabilities,
    pub devices: Arc<dyn MediaDevices>,
    pub recorder: Arc<dyn MediaRecorderApi>,
    /// Live camera preview (optional: headless hosts have none)
    pub preview: Option<Arc<dyn PreviewSurface>>,
    pub playback: Arc<dyn PlaybackSurface>,
}
