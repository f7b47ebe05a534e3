use serde::{Deserialize, Serialize};
use std::fmt;

/// Recorder widget state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    /// Nothing in progress; a stream may or may not be live
    #[default]
    Idle,
    /// Stream acquisition in flight
    Requesting,
    Countdown,
    /// Recording, or finalizing right after the recorder stopped
    Recording,
    /// Artifact ready for playback
    Reviewing,
    /// Artifact handed to the host; terminal
    Completed,
}

impl RecorderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Countdown => "countdown",
            Self::Recording => "recording",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Review playback controls are live
    pub fn has_review(&self) -> bool {
        matches!(self, Self::Reviewing | Self::Completed)
    }
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RecorderStatus::Reviewing).unwrap(), "\"reviewing\"");
        let status: RecorderStatus = serde_json::from_str("\"countdown\"").unwrap();
        assert_eq!(status, RecorderStatus::Countdown);
    }

    #[test]
    fn test_review_states() {
        assert!(RecorderStatus::Reviewing.has_review());
        assert!(RecorderStatus::Completed.has_review());
        assert!(!RecorderStatus::Recording.has_review());
        assert!(RecorderStatus::Completed.is_terminal());
    }
}
