use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::session::SessionConfig;

/// Environment variable prefix (`VIDEO_RECORDER__RECORDER__MAX_DURATION_SECONDS=60`)
pub const ENV_PREFIX: &str = "VIDEO_RECORDER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recorder: RecorderConfig,
    pub acquisition: AcquisitionConfig,
    pub engine: EngineConfig,
    pub finalize: FinalizeConfig,
    pub review: ReviewConfig,
}

/// Visual theme selector; cosmetic only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    #[default]
    Company,
    Secret,
}

/// Optional colour overrides passed through to the renderer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColors {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub background: Option<String>,
    pub text: Option<String>,
}

/// Inbound widget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub job_type: JobType,
    /// Hard cap on recording length
    pub max_duration_seconds: u32,
    pub allow_re_record: bool,
    /// Acquire the camera on mount and go straight to the countdown
    pub auto_start: bool,
    /// Pre-roll before each take
    pub countdown_seconds: u32,
    /// Pause between releasing the old stream and requesting a new one on re-record
    pub re_record_settle_ms: u64,
    pub colors: Option<ThemeColors>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            job_type: JobType::Company,
            max_duration_seconds: 180,
            allow_re_record: true,
            auto_start: false,
            countdown_seconds: 5,
            re_record_settle_ms: 200,
            colors: None,
        }
    }
}

impl RecorderConfig {
    pub fn re_record_settle(&self) -> Duration {
        Duration::from_millis(self.re_record_settle_ms)
    }
}

/// Camera/microphone acquisition policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Give up on a pending request after this long
    pub timeout_ms: u64,
    /// Delay before the automatic retry with simpler constraints
    pub retry_delay_ms: u64,
    /// Over-constrained failures tolerated before giving up
    pub max_retry_attempts: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retry_delay_ms: 500,
            max_retry_attempts: 3,
        }
    }
}

impl AcquisitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Recorder slicing and stop sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timeslice_ms: u64,
    /// Longer slices on iOS reduce encoder overhead
    pub ios_timeslice_ms: u64,
    /// Delay between the first and the second-chance flush
    pub second_flush_delay_ms: u64,
    /// Delay between the first flush and stop
    pub stop_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeslice_ms: 100,
            ios_timeslice_ms: 200,
            second_flush_delay_ms: 50,
            stop_delay_ms: 300,
        }
    }
}

impl EngineConfig {
    pub fn timeslice(&self, is_ios: bool) -> Duration {
        Duration::from_millis(if is_ios {
            self.ios_timeslice_ms
        } else {
            self.timeslice_ms
        })
    }

    pub fn second_flush_delay(&self) -> Duration {
        Duration::from_millis(self.second_flush_delay_ms)
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_millis(self.stop_delay_ms.max(self.second_flush_delay_ms))
    }
}

/// Trailing-chunk stabilization after the recorder stops
///
/// Empirically tuned: shorter windows truncated recordings on some devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizeConfig {
    pub poll_interval_ms: u64,
    /// No stability decision before this much time has passed
    pub min_wait_ms: u64,
    /// Consecutive unchanged polls required
    pub stable_polls: u32,
    /// Finalize with whatever arrived after this long
    pub ceiling_ms: u64,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            min_wait_ms: 500,
            stable_polls: 20,
            ceiling_ms: 5_000,
        }
    }
}

impl FinalizeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_wait(&self) -> Duration {
        Duration::from_millis(self.min_wait_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// How often the review surface is polled for progress
    pub poll_interval_ms: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
        }
    }
}

impl ReviewConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load from an optional file (any format `config` understands) layered
    /// under `VIDEO_RECORDER__*` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.recorder.max_duration_seconds > 0,
            "recorder.max_duration_seconds must be positive"
        );
        ensure!(
            self.recorder.countdown_seconds > 0,
            "recorder.countdown_seconds must be positive"
        );
        ensure!(
            self.finalize.poll_interval_ms > 0,
            "finalize.poll_interval_ms must be positive"
        );
        ensure!(
            self.finalize.ceiling_ms >= self.finalize.min_wait_ms,
            "finalize.ceiling_ms must not be shorter than finalize.min_wait_ms"
        );
        ensure!(
            self.engine.timeslice_ms > 0 && self.engine.ios_timeslice_ms > 0,
            "engine timeslices must be positive"
        );
        ensure!(
            self.review.poll_interval_ms > 0,
            "review.poll_interval_ms must be positive"
        );
        Ok(())
    }

    /// Session configuration with a fresh session id
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            recorder: self.recorder.clone(),
            acquisition: self.acquisition.clone(),
            engine: self.engine.clone(),
            finalize: self.finalize.clone(),
            review: self.review.clone(),
            ..SessionConfig::default()
        }
    }
}
