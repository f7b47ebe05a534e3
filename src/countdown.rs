use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Restartable one-shot pre-roll timer
///
/// Ticks `remaining` down once per second and fires the completion callback
/// exactly once when it reaches zero. Only one tick task is ever live.
pub struct Countdown {
    remaining: Arc<watch::Sender<u32>>,
    /// Set while a tick task is live
    started: Arc<AtomicBool>,
    /// Bumped on every start/cancel so an aborted task can never fire
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
    tick: Duration,
}

impl Countdown {
    pub fn new(initial: u32) -> Self {
        Self::with_tick(initial, Duration::from_secs(1))
    }

    /// Countdown with a custom tick period
    pub fn with_tick(initial: u32, tick: Duration) -> Self {
        let (remaining, _) = watch::channel(initial);
        Self {
            remaining: Arc::new(remaining),
            started: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
            tick,
        }
    }

    /// Start ticking from `seconds`
    ///
    /// Returns `false` (and does nothing) if a countdown is already running.
    pub fn start<F>(&mut self, seconds: u32, on_complete: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Countdown already started");
            return false;
        }

        info!("Countdown started: {}s", seconds);
        self.remaining.send_replace(seconds);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = Arc::clone(&self.remaining);
        let started = Arc::clone(&self.started);
        let current = Arc::clone(&self.generation);
        let tick = self.tick;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            loop {
                ticker.tick().await;
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }

                let prev = *remaining.borrow();
                if prev <= 1 {
                    remaining.send_replace(0);
                    started.store(false, Ordering::SeqCst);
                    debug!("Countdown complete");
                    on_complete();
                    return;
                }
                remaining.send_replace(prev - 1);
            }
        }));

        true
    }

    /// Reassign the displayed value without ticking
    pub fn reset(&self, seconds: u32) {
        self.remaining.send_replace(seconds);
    }

    /// Drop any pending tick; the completion callback will not fire
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.started.swap(false, Ordering::SeqCst) {
            debug!("Countdown cancelled at {}", self.remaining());
        }
    }

    pub fn is_active(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        *self.remaining.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.remaining.subscribe()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}
