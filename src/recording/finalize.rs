use std::time::Duration;

use crate::config::FinalizeConfig;

/// Outcome of one finalization poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityCheck {
    Waiting,
    /// Count and size held still long enough
    Stable,
    /// Out of time; finalize with what arrived
    CeilingReached,
}

/// Debounce over (chunk count, byte size) observed at each poll
///
/// Polls before the minimum wait are ignored. The first poll after it sets the
/// baseline; stability then needs at least one chunk and `stable_polls`
/// consecutive polls with no change.
#[derive(Debug)]
pub struct Stabilizer {
    min_wait: Duration,
    ceiling: Duration,
    required: u32,
    last: Option<(usize, usize)>,
    unchanged: u32,
}

impl Stabilizer {
    pub fn new(config: &FinalizeConfig) -> Self {
        Self {
            min_wait: config.min_wait(),
            ceiling: config.ceiling(),
            required: config.stable_polls.max(1),
            last: None,
            unchanged: 0,
        }
    }

    /// Record a poll taken `elapsed` after the stop notification
    pub fn observe(&mut self, elapsed: Duration, count: usize, bytes: usize) -> StabilityCheck {
        if elapsed >= self.ceiling {
            return StabilityCheck::CeilingReached;
        }

        if elapsed < self.min_wait {
            return StabilityCheck::Waiting;
        }

        let current = (count, bytes);
        if self.last == Some(current) {
            self.unchanged += 1;
        } else {
            self.last = Some(current);
            self.unchanged = 0;
        }

        if count > 0 && self.unchanged >= self.required {
            StabilityCheck::Stable
        } else {
            StabilityCheck::Waiting
        }
    }

    /// Consecutive unchanged polls so far
    pub fn unchanged_polls(&self) -> u32 {
        self.unchanged
    }
}
