use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::platform::{PlaybackState, PlaybackSurface};
use crate::recording::OutputArtifact;

/// Review controls over the platform's playback surface
///
/// Keeps no playback state of its own beyond whether something is loaded;
/// everything else is read back from the surface.
pub struct ReviewPlayback {
    surface: Arc<dyn PlaybackSurface>,
    loaded: bool,
}

impl ReviewPlayback {
    pub fn new(surface: Arc<dyn PlaybackSurface>) -> Self {
        Self { surface, loaded: false }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Show `artifact`, paused at the start
    pub fn load(&mut self, artifact: &OutputArtifact) {
        self.surface.load(artifact);
        self.surface.pause();
        self.surface.seek(0.0);
        self.loaded = true;
        debug!("Review loaded artifact {} ({} bytes)", artifact.id, artifact.size());
    }

    pub fn unload(&mut self) {
        if self.loaded {
            self.surface.pause();
            self.surface.unload();
            self.loaded = false;
        }
    }

    pub async fn toggle_play(&self) -> Result<()> {
        if !self.loaded {
            bail!("nothing to play");
        }
        if self.surface.state().is_playing {
            self.surface.pause();
        } else {
            self.surface.play().await?;
        }
        Ok(())
    }

    /// Seek to `seconds`, clamped to the media duration
    pub fn seek_to(&self, seconds: f64) {
        if !self.loaded || !seconds.is_finite() {
            return;
        }
        let duration = self.surface.state().duration;
        self.surface.seek(seconds.clamp(0.0, duration.max(0.0)));
    }

    /// Seek to a fraction (0..=1) of the duration, e.g. from a progress-bar click
    pub fn seek_fraction(&self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let duration = self.surface.state().duration;
        self.seek_to(fraction.clamp(0.0, 1.0) * duration);
    }

    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            bail!("invalid playback rate: {}", rate);
        }
        self.surface.set_playback_rate(rate);
        Ok(())
    }

    /// Returns the new fullscreen flag
    pub fn toggle_fullscreen(&self) -> bool {
        if let Err(e) = self.surface.toggle_fullscreen() {
            warn!("Error attempting to toggle full-screen mode: {}", e);
        }
        self.surface.is_fullscreen()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.surface.is_fullscreen()
    }

    pub fn state(&self) -> PlaybackState {
        if !self.loaded {
            return PlaybackState::default();
        }
        self.surface.state()
    }

    /// Read the surface state; playback that reached the end is rewound
    pub fn poll(&self) -> PlaybackState {
        let state = self.state();
        if !state.ended {
            return state;
        }

        debug!("Review playback ended, rewinding");
        self.surface.pause();
        self.surface.seek(0.0);
        self.surface.state()
    }

    /// `current_time / duration`, 0 while the duration is unknown
    pub fn progress(&self) -> f64 {
        progress_of(&self.state())
    }
}

pub fn progress_of(state: &PlaybackState) -> f64 {
    if state.duration > 0.0 {
        (state.current_time / state.duration).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
