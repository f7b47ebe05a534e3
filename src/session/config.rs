use serde::{Deserialize, Serialize};

use crate::config::{AcquisitionConfig, EngineConfig, FinalizeConfig, RecorderConfig, ReviewConfig};
use crate::recording::EngineSettings;

/// Configuration for one recorder session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "recording-3f2a...")
    pub session_id: String,

    /// Widget options supplied by the host page
    pub recorder: RecorderConfig,

    pub acquisition: AcquisitionConfig,

    pub engine: EngineConfig,

    /// Trailing-chunk stabilization
    pub finalize: FinalizeConfig,

    pub review: ReviewConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("recording-{}", uuid::Uuid::new_v4()),
            recorder: RecorderConfig::default(),
            acquisition: AcquisitionConfig::default(),
            engine: EngineConfig::default(),
            finalize: FinalizeConfig::default(),
            review: ReviewConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_duration_seconds: self.recorder.max_duration_seconds.max(1),
            engine: self.engine.clone(),
            finalize: self.finalize.clone(),
        }
    }
}
