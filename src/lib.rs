pub mod config;
pub mod countdown;
pub mod platform;
pub mod recording;
pub mod review;
pub mod session;
pub mod stream;
pub mod time;

pub use config::Config;
pub use countdown::Countdown;
pub use platform::{DeviceCapabilities, MediaRuntime, MimeProfile, PlatformFlags};
pub use recording::{OutputArtifact, RecordingEngine, RecordingError};
pub use review::ReviewPlayback;
pub use session::{RecorderStatus, RecordingSession, SessionConfig, SessionEvent, SessionHandle, SessionSnapshot};
pub use stream::{AcquisitionError, StreamAcquirer};
