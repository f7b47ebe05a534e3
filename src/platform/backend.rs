use anyhow::Result;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use super::probe::MimeProfile;
use crate::recording::OutputArtifact;
use crate::stream::MediaConstraints;

/// Error reported by the device-media API when a capture request is rejected.
///
/// `name` is the platform's error name (e.g. `NotAllowedError`); the
/// acquirer classifies on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct DeviceError {
    pub name: String,
    pub message: String,
}

impl DeviceError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> DeviceErrorKind {
        DeviceErrorKind::from_name(&self.name)
    }
}

/// Families of device-media failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    PermissionDenied,
    NotFound,
    NotReadable,
    OverConstrained,
    NotSupported,
    Other,
}

impl DeviceErrorKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" => Self::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => Self::NotFound,
            "NotReadableError" | "TrackStartError" => Self::NotReadable,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => Self::OverConstrained,
            "NotSupportedError" => Self::NotSupported,
            _ => Self::Other,
        }
    }
}

/// Live audio+video source returned by the device-media API
pub trait CaptureHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Whether any track is still running
    fn is_live(&self) -> bool;

    /// Stop every audio and video track of this source
    fn stop_tracks(&self);
}

impl std::fmt::Debug for dyn CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle").field("id", &self.id()).finish()
    }
}

/// Device-media access (camera + microphone)
///
/// Platform-specific implementations:
/// - Browser: `navigator.mediaDevices.getUserMedia`
/// - Simulated: scripted outcomes for tests and the CLI
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Whether the device-media API exists at all in this runtime
    fn is_available(&self) -> bool;

    /// Request a capture handle satisfying `constraints`
    ///
    /// May suspend indefinitely while the user answers the permission prompt.
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn CaptureHandle>, DeviceError>;
}

/// Live preview surface the acquired stream is attached to
#[async_trait::async_trait]
pub trait PreviewSurface: Send + Sync {
    fn attach(&self, handle: Arc<dyn CaptureHandle>);

    /// Start preview playback (may be refused by autoplay policy)
    async fn play(&self) -> Result<()>;

    fn detach(&self);
}

/// Recorder lifecycle as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Inactive,
    Recording,
    Paused,
}

/// Notifications delivered by a recorder instance, in delivery order
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// One encoded slice (may be zero bytes)
    Data(Bytes),
    /// The recorder has stopped; trailing `Data` may still follow
    Stopped,
    /// Runtime failure while recording
    Error(String),
}

/// Chunked-recording API
pub trait MediaRecorderApi: Send + Sync {
    /// Whether the recording API exists in this runtime
    fn is_supported(&self) -> bool;

    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Open a new recorder instance against `handle`
    ///
    /// `None` lets the runtime pick its default container.
    fn create(
        &self,
        handle: Arc<dyn CaptureHandle>,
        mime: Option<&MimeProfile>,
    ) -> Result<Arc<dyn MediaRecorder>>;
}

/// A single recorder instance
pub trait MediaRecorder: Send + Sync {
    /// Start recording, emitting a slice every `timeslice` to `events`
    fn start(&self, timeslice: Duration, events: mpsc::UnboundedSender<RecorderEvent>) -> Result<()>;

    /// Ask the recorder to flush whatever it has buffered now
    fn request_data(&self) -> Result<()>;

    /// Request stop; completion is signalled with `RecorderEvent::Stopped`
    fn stop(&self);

    fn state(&self) -> RecorderState;

    fn is_active(&self) -> bool {
        self.state() != RecorderState::Inactive
    }
}

/// Playback state of the review surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Position in seconds
    pub current_time: f64,
    /// Duration in seconds (0 until metadata is known)
    pub duration: f64,
    /// Playback reached the end
    pub ended: bool,
}

/// Playable media surface used to review a finished recording
#[async_trait::async_trait]
pub trait PlaybackSurface: Send + Sync {
    fn load(&self, artifact: &OutputArtifact);

    fn unload(&self);

    async fn play(&self) -> Result<()>;

    fn pause(&self);

    fn seek(&self, seconds: f64);

    fn set_playback_rate(&self, rate: f64);

    fn toggle_fullscreen(&self) -> Result<()>;

    fn is_fullscreen(&self) -> bool;

    fn state(&self) -> PlaybackState;
}
