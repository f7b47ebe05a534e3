use serde::Serialize;

/// Steps of the progressive constraint ladder, strictest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintLevel {
    /// ~1280x720 with echo cancellation, noise suppression and auto gain
    Standard,
    /// ~640x480, same audio processing
    LowResolution,
    /// Front camera only, unprocessed audio
    Minimal,
}

impl ConstraintLevel {
    /// Level for the given retry count; iOS never asks for 720p
    pub fn for_attempt(retry_count: u32, is_ios: bool) -> Self {
        if retry_count >= 2 {
            Self::Minimal
        } else if retry_count >= 1 || is_ios {
            Self::LowResolution
        } else {
            Self::Standard
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioConstraints {
    /// `audio: true`
    Basic,
    Enhanced {
        echo_cancellation: bool,
        noise_suppression: bool,
        auto_gain_control: bool,
    },
}

/// One capture request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaConstraints {
    pub level: ConstraintLevel,
    pub video: VideoConstraints,
    pub audio: AudioConstraints,
}

impl MediaConstraints {
    pub fn for_level(level: ConstraintLevel) -> Self {
        let enhanced = AudioConstraints::Enhanced {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        };

        let (video, audio) = match level {
            ConstraintLevel::Standard => (Self::video(Some((1280, 720))), enhanced),
            ConstraintLevel::LowResolution => (Self::video(Some((640, 480))), enhanced),
            ConstraintLevel::Minimal => (Self::video(None), AudioConstraints::Basic),
        };

        Self { level, video, audio }
    }

    fn video(ideal: Option<(u32, u32)>) -> VideoConstraints {
        VideoConstraints {
            facing_mode: FacingMode::User,
            ideal_width: ideal.map(|(w, _)| w),
            ideal_height: ideal.map(|(_, h)| h),
        }
    }
}
