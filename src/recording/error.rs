use serde::Serialize;
use thiserror::Error;

/// Failures of the chunked recording engine
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RecordingError {
    #[error("Video recording is not supported in this browser.")]
    Unsupported,

    #[error("No camera stream available. Activate the camera first.")]
    NoStream,

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("Could not start recording: {0}")]
    StartFailed(String),

    #[error("Recording error. Please try again.")]
    Engine(String),

    #[error("No data was recorded. Please try again.")]
    EmptyRecording,

    #[error("The recorded video is empty (0 bytes). Please try again.")]
    ZeroBytes,
}

impl RecordingError {
    /// Finalization produced nothing usable
    pub fn is_empty_recording(&self) -> bool {
        matches!(self, Self::EmptyRecording | Self::ZeroBytes)
    }
}
