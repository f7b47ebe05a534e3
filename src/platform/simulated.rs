// Simulated media runtime
//
// In-process stand-ins for the device-media, recording and playback APIs.
// They back the CLI and the test-suite: acquisition outcomes are scripted,
// the recorder emits fixed-size slices on a tokio timer, and the playback
// clock follows tokio time (so paused-clock tests stay deterministic).

use anyhow::{bail, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info};

use super::backend::{
    CaptureHandle, DeviceError, MediaDevices, MediaRecorder, MediaRecorderApi, PlaybackState,
    PlaybackSurface, PreviewSurface, RecorderEvent, RecorderState,
};
use super::probe::{DeviceCapabilities, MimeProfile, GENERIC_MIME_CANDIDATES};
use super::MediaRuntime;
use crate::recording::OutputArtifact;
use crate::stream::MediaConstraints;

/// Desktop Chrome agent used when none is given
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// MARK: - Device access

/// Scripted answer to one `get_user_media` request
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Grant,
    Fail(DeviceError),
    /// Never answer (user ignores the permission prompt)
    Hang,
}

impl AcquireOutcome {
    pub fn fail(name: &str) -> Self {
        Self::Fail(DeviceError::new(name, "simulated device failure"))
    }
}

/// Capture handle whose tracks are a single liveness flag
pub struct SimulatedHandle {
    id: String,
    live: AtomicBool,
}

impl SimulatedHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            live: AtomicBool::new(true),
        }
    }
}

impl CaptureHandle for SimulatedHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop_tracks(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("Simulated stream {} tracks stopped", self.id);
        }
    }
}

/// Camera/microphone access with scripted outcomes
///
/// Requests beyond the script are granted.
pub struct SimulatedDevices {
    available: bool,
    latency: Duration,
    script: Mutex<VecDeque<AcquireOutcome>>,
    requests: Mutex<Vec<MediaConstraints>>,
    issued: Mutex<Vec<Arc<SimulatedHandle>>>,
}

impl SimulatedDevices {
    pub fn new() -> Self {
        Self {
            available: true,
            latency: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Runtime without a device-media API
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Delay before each answer (permission prompt)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_script(self, outcomes: impl IntoIterator<Item = AcquireOutcome>) -> Self {
        lock(&self.script).extend(outcomes);
        self
    }

    pub fn push_outcome(&self, outcome: AcquireOutcome) {
        lock(&self.script).push_back(outcome);
    }

    /// Constraints of every request, in order
    pub fn requests(&self) -> Vec<MediaConstraints> {
        lock(&self.requests).clone()
    }

    /// Every handle granted so far
    pub fn issued(&self) -> Vec<Arc<SimulatedHandle>> {
        lock(&self.issued).clone()
    }

    pub fn live_handles(&self) -> usize {
        lock(&self.issued).iter().filter(|h| h.is_live()).count()
    }
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MediaDevices for SimulatedDevices {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn CaptureHandle>, DeviceError> {
        lock(&self.requests).push(constraints.clone());
        let outcome = lock(&self.script).pop_front().unwrap_or(AcquireOutcome::Grant);

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        match outcome {
            AcquireOutcome::Grant => {
                let mut issued = lock(&self.issued);
                let handle = Arc::new(SimulatedHandle::new(format!("sim-stream-{}", issued.len() + 1)));
                issued.push(Arc::clone(&handle));
                info!("Simulated camera granted: {} ({:?})", handle.id, constraints.level);
                let handle: Arc<dyn CaptureHandle> = handle;
                Ok(handle)
            }
            AcquireOutcome::Fail(err) => Err(err),
            AcquireOutcome::Hang => std::future::pending().await,
        }
    }
}

/// Preview surface that remembers which stream it shows
#[derive(Default)]
pub struct SimulatedPreview {
    attached: Mutex<Option<String>>,
    autoplay_blocked: bool,
}

impl SimulatedPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preview whose `play()` is always refused
    pub fn autoplay_blocked() -> Self {
        Self {
            autoplay_blocked: true,
            ..Self::default()
        }
    }

    pub fn attached_stream(&self) -> Option<String> {
        lock(&self.attached).clone()
    }
}

#[async_trait::async_trait]
impl PreviewSurface for SimulatedPreview {
    fn attach(&self, handle: Arc<dyn CaptureHandle>) {
        *lock(&self.attached) = Some(handle.id().to_string());
    }

    async fn play(&self) -> Result<()> {
        if self.autoplay_blocked {
            bail!("NotAllowedError: play() failed because the user didn't interact with the document first");
        }
        Ok(())
    }

    fn detach(&self) {
        *lock(&self.attached) = None;
    }
}

// MARK: - Recording

/// How simulated recorders produce data
#[derive(Debug, Clone)]
pub struct RecorderBehavior {
    /// Bytes per timeslice
    pub chunk_size: usize,
    /// Bytes emitted by each `request_data`
    pub flush_size: usize,
    /// Bytes emitted right before the stop notification
    pub final_chunk_size: usize,
    /// Chunks delivered after the stop notification
    pub late_chunks: usize,
    pub late_interval: Duration,
    /// Report a runtime error this long after start
    pub fail_after: Option<Duration>,
    /// Emit no data at all
    pub silent: bool,
}

impl Default for RecorderBehavior {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            flush_size: 0,
            final_chunk_size: 500,
            late_chunks: 0,
            late_interval: Duration::from_millis(50),
            fail_after: None,
            silent: false,
        }
    }
}

#[derive(Default)]
struct RecorderCounters {
    active: AtomicUsize,
    max_concurrent: AtomicUsize,
}

/// Recording API whose instances emit `fill`-byte chunks on a timer
///
/// Instance `n` fills its chunks with byte `n + 1`, so data from different
/// attempts can be told apart.
pub struct SimulatedRecorderApi {
    supported: bool,
    mime_types: Vec<String>,
    behavior: RecorderBehavior,
    counters: Arc<RecorderCounters>,
    recorders: Mutex<Vec<Arc<SimulatedRecorder>>>,
}

impl SimulatedRecorderApi {
    pub fn new() -> Self {
        Self {
            supported: true,
            mime_types: GENERIC_MIME_CANDIDATES.iter().map(|t| t.to_string()).collect(),
            behavior: RecorderBehavior::default(),
            counters: Arc::new(RecorderCounters::default()),
            recorders: Mutex::new(Vec::new()),
        }
    }

    /// Runtime without a recording API
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            mime_types: Vec::new(),
            ..Self::new()
        }
    }

    pub fn with_mime_types(mut self, mime_types: &[&str]) -> Self {
        self.mime_types = mime_types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_behavior(mut self, behavior: RecorderBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn behavior(&self) -> &RecorderBehavior {
        &self.behavior
    }

    /// Every recorder created so far, oldest first
    pub fn recorders(&self) -> Vec<Arc<SimulatedRecorder>> {
        lock(&self.recorders).clone()
    }

    pub fn created(&self) -> usize {
        lock(&self.recorders).len()
    }

    /// Highest number of simultaneously recording instances observed
    pub fn max_concurrent(&self) -> usize {
        self.counters.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedRecorderApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaRecorderApi for SimulatedRecorderApi {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.mime_types.iter().any(|t| t == mime_type)
    }

    fn create(
        &self,
        handle: Arc<dyn CaptureHandle>,
        mime: Option<&MimeProfile>,
    ) -> Result<Arc<dyn MediaRecorder>> {
        if !self.supported {
            bail!("NotSupportedError: MediaRecorder is not available");
        }
        if let Some(profile) = mime {
            if !self.is_type_supported(profile.as_str()) {
                bail!("NotSupportedError: {} is not supported", profile);
            }
        }
        if !handle.is_live() {
            bail!("InvalidStateError: stream {} is not live", handle.id());
        }

        let mut recorders = lock(&self.recorders);
        let fill = (recorders.len() % 250 + 1) as u8;
        let recorder = Arc::new(SimulatedRecorder {
            shared: Arc::new(RecorderShared {
                fill,
                behavior: self.behavior.clone(),
                counters: Arc::clone(&self.counters),
                state: Mutex::new(RecorderState::Inactive),
                events: Mutex::new(None),
                emitter: Mutex::new(None),
                timeslice: Mutex::new(None),
                delivered: Mutex::new(Vec::new()),
                flush_requests: AtomicUsize::new(0),
                stop_calls: AtomicUsize::new(0),
            }),
            mime: mime.cloned(),
        });
        recorders.push(Arc::clone(&recorder));

        debug!("Simulated recorder #{} created for {}", fill, handle.id());

        let recorder: Arc<dyn MediaRecorder> = recorder;
        Ok(recorder)
    }
}

struct RecorderShared {
    fill: u8,
    behavior: RecorderBehavior,
    counters: Arc<RecorderCounters>,
    state: Mutex<RecorderState>,
    events: Mutex<Option<mpsc::UnboundedSender<RecorderEvent>>>,
    emitter: Mutex<Option<JoinHandle<()>>>,
    timeslice: Mutex<Option<Duration>>,
    delivered: Mutex<Vec<Bytes>>,
    flush_requests: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl RecorderShared {
    fn chunk(&self, size: usize) -> Bytes {
        Bytes::from(vec![self.fill; size])
    }

    fn emit(&self, event: RecorderEvent) {
        let events = lock(&self.events);
        if let Some(tx) = events.as_ref() {
            if let RecorderEvent::Data(data) = &event {
                lock(&self.delivered).push(data.clone());
            }
            let _ = tx.send(event);
        }
    }
}

/// One simulated recorder instance
pub struct SimulatedRecorder {
    shared: Arc<RecorderShared>,
    mime: Option<MimeProfile>,
}

impl SimulatedRecorder {
    pub fn fill_byte(&self) -> u8 {
        self.shared.fill
    }

    pub fn mime(&self) -> Option<&MimeProfile> {
        self.mime.as_ref()
    }

    /// Every slice handed to the listener, in delivery order
    pub fn delivered(&self) -> Vec<Bytes> {
        lock(&self.shared.delivered).clone()
    }

    /// Slice interval requested by `start`
    pub fn timeslice(&self) -> Option<Duration> {
        *lock(&self.shared.timeslice)
    }

    pub fn delivered_bytes(&self) -> usize {
        lock(&self.shared.delivered).iter().map(|c| c.len()).sum()
    }

    pub fn flush_requests(&self) -> usize {
        self.shared.flush_requests.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.shared.stop_calls.load(Ordering::SeqCst)
    }
}

impl MediaRecorder for SimulatedRecorder {
    fn start(&self, timeslice: Duration, events: mpsc::UnboundedSender<RecorderEvent>) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            if *state != RecorderState::Inactive {
                bail!("InvalidStateError: recorder already started");
            }
            *state = RecorderState::Recording;
        }
        *lock(&self.shared.events) = Some(events);
        *lock(&self.shared.timeslice) = Some(timeslice);

        let active = self.shared.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.counters.max_concurrent.fetch_max(active, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let emitter = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = interval_at(started + timeslice, timeslice);
            loop {
                ticker.tick().await;

                if let Some(fail_after) = shared.behavior.fail_after {
                    if started.elapsed() >= fail_after {
                        shared.emit(RecorderEvent::Error("simulated encoder failure".to_string()));
                        return;
                    }
                }

                if !shared.behavior.silent {
                    shared.emit(RecorderEvent::Data(shared.chunk(shared.behavior.chunk_size)));
                }
            }
        });
        *lock(&self.shared.emitter) = Some(emitter);

        Ok(())
    }

    fn request_data(&self) -> Result<()> {
        if *lock(&self.shared.state) == RecorderState::Inactive {
            bail!("InvalidStateError: recorder is inactive");
        }
        self.shared.flush_requests.fetch_add(1, Ordering::SeqCst);
        if !self.shared.behavior.silent {
            self.shared
                .emit(RecorderEvent::Data(self.shared.chunk(self.shared.behavior.flush_size)));
        }
        Ok(())
    }

    fn stop(&self) {
        {
            let mut state = lock(&self.shared.state);
            if *state == RecorderState::Inactive {
                return;
            }
            *state = RecorderState::Inactive;
        }
        self.shared.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.counters.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(emitter) = lock(&self.shared.emitter).take() {
            emitter.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            let behavior = shared.behavior.clone();
            if !behavior.silent && behavior.final_chunk_size > 0 {
                shared.emit(RecorderEvent::Data(shared.chunk(behavior.final_chunk_size)));
            }
            shared.emit(RecorderEvent::Stopped);

            for _ in 0..behavior.late_chunks {
                sleep(behavior.late_interval).await;
                shared.emit(RecorderEvent::Data(shared.chunk(behavior.chunk_size)));
            }

            *lock(&shared.events) = None;
        });
    }

    fn state(&self) -> RecorderState {
        *lock(&self.shared.state)
    }
}

// MARK: - Playback

#[derive(Debug)]
struct PlaybackInner {
    loaded: bool,
    duration: f64,
    position: f64,
    playing_since: Option<Instant>,
    rate: f64,
    fullscreen: bool,
}

impl Default for PlaybackInner {
    fn default() -> Self {
        Self {
            loaded: false,
            duration: 0.0,
            position: 0.0,
            playing_since: None,
            rate: 1.0,
            fullscreen: false,
        }
    }
}

impl PlaybackInner {
    fn position_now(&self) -> f64 {
        match self.playing_since {
            Some(since) => {
                (self.position + since.elapsed().as_secs_f64() * self.rate).min(self.duration)
            }
            None => self.position,
        }
    }

    fn settle(&mut self) {
        self.position = self.position_now();
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }
}

/// Playback surface whose media duration is derived from artifact size
pub struct SimulatedPlayback {
    bytes_per_second: f64,
    autoplay_blocked: bool,
    inner: Mutex<PlaybackInner>,
}

impl SimulatedPlayback {
    pub fn new() -> Self {
        Self {
            bytes_per_second: 10_000.0,
            autoplay_blocked: false,
            inner: Mutex::new(PlaybackInner::default()),
        }
    }

    /// Bitrate used to turn artifact size into duration
    pub fn with_bytes_per_second(mut self, bytes_per_second: f64) -> Self {
        self.bytes_per_second = bytes_per_second.max(1.0);
        self
    }

    pub fn autoplay_blocked(mut self) -> Self {
        self.autoplay_blocked = true;
        self
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.inner).loaded
    }

    pub fn playback_rate(&self) -> f64 {
        lock(&self.inner).rate
    }
}

impl Default for SimulatedPlayback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PlaybackSurface for SimulatedPlayback {
    fn load(&self, artifact: &OutputArtifact) {
        let mut inner = lock(&self.inner);
        *inner = PlaybackInner {
            loaded: true,
            duration: artifact.size() as f64 / self.bytes_per_second,
            ..PlaybackInner::default()
        };
    }

    fn unload(&self) {
        *lock(&self.inner) = PlaybackInner::default();
    }

    async fn play(&self) -> Result<()> {
        if self.autoplay_blocked {
            bail!("NotAllowedError: playback blocked");
        }
        let mut inner = lock(&self.inner);
        if !inner.loaded {
            bail!("NotSupportedError: no source loaded");
        }
        if inner.position >= inner.duration {
            inner.position = 0.0;
        }
        if inner.playing_since.is_none() {
            inner.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&self) {
        let mut inner = lock(&self.inner);
        inner.position = inner.position_now();
        inner.playing_since = None;
    }

    fn seek(&self, seconds: f64) {
        let mut inner = lock(&self.inner);
        inner.settle();
        inner.position = seconds.clamp(0.0, inner.duration);
    }

    fn set_playback_rate(&self, rate: f64) {
        let mut inner = lock(&self.inner);
        inner.settle();
        inner.rate = rate;
    }

    fn toggle_fullscreen(&self) -> Result<()> {
        let mut inner = lock(&self.inner);
        if !inner.loaded {
            bail!("TypeError: nothing to show fullscreen");
        }
        inner.fullscreen = !inner.fullscreen;
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        lock(&self.inner).fullscreen
    }

    fn state(&self) -> PlaybackState {
        let inner = lock(&self.inner);
        let current_time = inner.position_now();
        let ended = inner.loaded && inner.duration > 0.0 && current_time >= inner.duration;
        PlaybackState {
            is_playing: inner.playing_since.is_some() && !ended,
            current_time,
            duration: inner.duration,
            ended,
        }
    }
}

// MARK: - Bundle

/// The simulated parts of a runtime, kept typed for inspection
pub struct SimulatedRuntime {
    pub devices: Arc<SimulatedDevices>,
    pub recorder: Arc<SimulatedRecorderApi>,
    pub preview: Arc<SimulatedPreview>,
    pub playback: Arc<SimulatedPlayback>,
    /// Touch points the capability probe sees (iPadOS reports a Mac agent)
    pub max_touch_points: u32,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(SimulatedDevices::new()),
            recorder: Arc::new(SimulatedRecorderApi::new()),
            preview: Arc::new(SimulatedPreview::new()),
            playback: Arc::new(SimulatedPlayback::new()),
            max_touch_points: 0,
        }
    }

    pub fn with_max_touch_points(mut self, max_touch_points: u32) -> Self {
        self.max_touch_points = max_touch_points;
        self
    }

    pub fn with_devices(mut self, devices: SimulatedDevices) -> Self {
        self.devices = Arc::new(devices);
        self
    }

    pub fn with_recorder(mut self, recorder: SimulatedRecorderApi) -> Self {
        self.recorder = Arc::new(recorder);
        self
    }

    pub fn with_preview(mut self, preview: SimulatedPreview) -> Self {
        self.preview = Arc::new(preview);
        self
    }

    pub fn with_playback(mut self, playback: SimulatedPlayback) -> Self {
        self.playback = Arc::new(playback);
        self
    }

    /// Type-erased runtime for a browser reporting `user_agent`
    pub fn media_runtime(&self, user_agent: &str) -> MediaRuntime {
        let capabilities = DeviceCapabilities::detect(user_agent, self.max_touch_points, self.recorder.as_ref());
        MediaRuntime {
            capabilities,
            devices: self.devices.clone(),
            recorder: self.recorder.clone(),
            preview: Some(self.preview.clone()),
            playback: self.playback.clone(),
        }
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}
