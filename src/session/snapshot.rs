use serde::Serialize;

use super::status::RecorderStatus;
use crate::platform::PlaybackState;
use crate::recording::{ArtifactSummary, RecordingError};
use crate::review::progress_of;

/// Everything a renderer needs to draw the current state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: RecorderStatus,
    pub elapsed_seconds: u32,
    pub countdown_remaining: u32,
    pub max_duration_seconds: u32,
    /// 0..=1, see [`progress`]
    pub progress: f64,
    /// User-facing error message
    pub error: Option<String>,
    /// Recorder stopped, waiting for trailing chunks
    pub is_finalizing: bool,
    pub has_stream: bool,
    pub artifact: Option<ArtifactSummary>,
    pub review: PlaybackState,
    pub playback_rate: f64,
    pub is_fullscreen: bool,
    pub can_re_record: bool,
}

impl SessionSnapshot {
    pub fn initial(session_id: impl Into<String>, max_duration_seconds: u32, countdown_seconds: u32) -> Self {
        Self {
            session_id: session_id.into(),
            status: RecorderStatus::Idle,
            elapsed_seconds: 0,
            countdown_remaining: countdown_seconds,
            max_duration_seconds,
            progress: 0.0,
            error: None,
            is_finalizing: false,
            has_stream: false,
            artifact: None,
            review: PlaybackState::default(),
            playback_rate: 1.0,
            is_fullscreen: false,
            can_re_record: false,
        }
    }
}

/// Progress bar fraction
///
/// While reviewing (or completed) this is playback position over media
/// duration; otherwise elapsed recording time over the duration cap.
pub fn progress(status: RecorderStatus, elapsed_seconds: u32, max_duration_seconds: u32, review: &PlaybackState) -> f64 {
    if status.has_review() {
        return progress_of(review);
    }
    if max_duration_seconds == 0 {
        return 0.0;
    }
    (elapsed_seconds as f64 / max_duration_seconds as f64).clamp(0.0, 1.0)
}

/// Notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StatusChanged {
        from: RecorderStatus,
        to: RecorderStatus,
    },
    Error {
        message: String,
    },
    ArtifactReady {
        artifact: ArtifactSummary,
    },
    Completed {
        artifact: ArtifactSummary,
    },
    /// No artifact could be produced for the attempt
    RecordingFailed {
        error: RecordingError,
    },
}
