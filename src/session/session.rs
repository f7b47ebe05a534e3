use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::snapshot::{progress, SessionEvent, SessionSnapshot};
use super::status::RecorderStatus;
use crate::countdown::Countdown;
use crate::platform::{select_mime_profile, MediaRuntime};
use crate::recording::{AttemptId, EngineEvent, EngineEventKind, OutputArtifact, RecordingEngine, RecordingError};
use crate::review::ReviewPlayback;
use crate::stream::{AcquisitionError, StreamAcquirer};

/// Called once with the artifact when the user finishes reviewing
pub type CompletionCallback = Box<dyn FnOnce(OutputArtifact) + Send + 'static>;

const EVENT_CAPACITY: usize = 64;

const UNSUPPORTED_BROWSER: &str =
    "Your browser does not support video recording. Use a recent browser (Chrome, Firefox, Edge, Safari 14.3+).";
const UNSUPPORTED_IOS: &str =
    "Video recording is not available on this iOS device. Update to iOS 14.3 or later.";

/// A recorder widget session: camera, countdown, recording, review
///
/// Configure with [`RecordingSession::new`], then [`spawn`](RecordingSession::spawn)
/// the state machine onto the current tokio runtime.
pub struct RecordingSession {
    config: SessionConfig,
    runtime: MediaRuntime,
    on_complete: Option<CompletionCallback>,
}

impl RecordingSession {
    pub fn new(config: SessionConfig, runtime: MediaRuntime) -> Self {
        Self {
            config,
            runtime,
            on_complete: None,
        }
    }

    /// Register the completion callback (fires at most once)
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(OutputArtifact) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Start the session actor
    pub fn spawn(self) -> SessionHandle {
        let Self {
            config,
            runtime,
            on_complete,
        } = self;

        info!("Creating recording session: {}", config.session_id);

        let mime = select_mime_profile(&runtime.capabilities, runtime.recorder.as_ref());
        let (engine, engine_rx) = RecordingEngine::new(
            Arc::clone(&runtime.recorder),
            runtime.capabilities,
            mime,
            config.engine_settings(),
        );
        let acquirer = StreamAcquirer::new(
            Arc::clone(&runtime.devices),
            runtime.preview.clone(),
            runtime.capabilities,
            config.acquisition.clone(),
        );
        let countdown = Countdown::new(config.recorder.countdown_seconds);
        let review = ReviewPlayback::new(Arc::clone(&runtime.playback));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::initial(
            config.session_id.clone(),
            config.recorder.max_duration_seconds,
            config.recorder.countdown_seconds,
        ));
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let countdown_rx = countdown.subscribe();

        let actor = SessionActor {
            config: config.clone(),
            runtime,
            acquirer,
            engine,
            countdown,
            review,
            on_complete,
            status: RecorderStatus::Idle,
            error: None,
            elapsed_seconds: 0,
            is_finalizing: false,
            artifact: None,
            playback_rate: 1.0,
            mount_failed: false,
            last_failure: None,
            request_id: 0,
            acquisition: None,
            countdown_id: 0,
            attempt: None,
            internal_tx,
            snapshot_tx,
            events_tx: events_tx.clone(),
        };

        let task = tokio::spawn(actor.run(command_rx, internal_rx, engine_rx, countdown_rx));

        SessionHandle {
            session_id: config.session_id,
            commands: command_tx,
            snapshot: snapshot_rx,
            events: events_tx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

#[derive(Debug)]
enum Command {
    ActivateCamera,
    StartCountdown,
    StopRecording,
    ReRecord,
    Finish,
    TogglePlay,
    Seek(f64),
    SeekFraction(f64),
    SetPlaybackRate(f64),
    ToggleFullscreen,
    Retry,
    Shutdown,
}

/// Completions of work running off the actor task
#[derive(Debug)]
enum Internal {
    StreamReady { request: u64, countdown_after: bool },
    StreamRetrying { request: u64, error: AcquisitionError },
    StreamFailed { request: u64, error: AcquisitionError, countdown_after: bool },
    CountdownComplete { countdown: u64 },
}

/// What `retry` re-runs
#[derive(Debug, Clone, Copy)]
enum Failure {
    Acquire { countdown_after: bool },
    Record,
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("session {} has ended", self.session_id))
    }

    /// Request the camera (IDLE only)
    pub fn activate_camera(&self) -> Result<()> {
        self.send(Command::ActivateCamera)
    }

    /// Start the pre-roll; needs a live stream
    pub fn start_countdown(&self) -> Result<()> {
        self.send(Command::StartCountdown)
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.send(Command::StopRecording)
    }

    /// Discard the reviewed take and record again
    pub fn re_record(&self) -> Result<()> {
        self.send(Command::ReRecord)
    }

    /// Hand the artifact to the host and release the camera
    pub fn finish(&self) -> Result<()> {
        self.send(Command::Finish)
    }

    pub fn toggle_play(&self) -> Result<()> {
        self.send(Command::TogglePlay)
    }

    pub fn seek(&self, seconds: f64) -> Result<()> {
        self.send(Command::Seek(seconds))
    }

    /// Seek to a fraction of the reviewed media (progress-bar click)
    pub fn seek_fraction(&self, fraction: f64) -> Result<()> {
        self.send(Command::SeekFraction(fraction))
    }

    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.send(Command::SetPlaybackRate(rate))
    }

    pub fn toggle_fullscreen(&self) -> Result<()> {
        self.send(Command::ToggleFullscreen)
    }

    /// Re-run the operation that last failed
    pub fn retry(&self) -> Result<()> {
        self.send(Command::Retry)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> RecorderStatus {
        self.snapshot.borrow().status
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Wait until a snapshot satisfies `predicate`
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return Ok(snapshot.clone());
                }
            }
            rx.changed()
                .await
                .with_context(|| format!("session {} ended", self.session_id))?;
        }
    }

    pub async fn wait_for_status(&self, status: RecorderStatus) -> Result<SessionSnapshot> {
        self.wait_until(|s| s.status == status).await
    }

    /// Tear the session down and wait for it to release everything
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            task.await.context("session task failed")?;
        }
        Ok(())
    }
}

struct SessionActor {
    config: SessionConfig,
    runtime: MediaRuntime,
    acquirer: StreamAcquirer,
    engine: RecordingEngine,
    countdown: Countdown,
    review: ReviewPlayback,
    on_complete: Option<CompletionCallback>,

    status: RecorderStatus,
    error: Option<String>,
    elapsed_seconds: u32,
    is_finalizing: bool,
    artifact: Option<OutputArtifact>,
    playback_rate: f64,
    mount_failed: bool,
    last_failure: Option<Failure>,

    /// Stale-callback guards
    request_id: u64,
    acquisition: Option<JoinHandle<()>>,
    countdown_id: u64,
    attempt: Option<AttemptId>,

    internal_tx: mpsc::UnboundedSender<Internal>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        mut countdown: watch::Receiver<u32>,
    ) {
        self.mount();
        self.publish();

        let mut review_poll = interval(self.config.review.poll_interval());
        review_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = internal.recv() => self.handle_internal(event),
                Some(event) = engine_events.recv() => self.handle_engine(event),
                Ok(()) = countdown.changed() => {}
                _ = review_poll.tick(), if self.status.has_review() => {
                    self.review.poll();
                }
            }
            self.publish();
        }

        self.teardown();
        self.publish();
    }

    fn mount(&mut self) {
        let capabilities = self.runtime.capabilities;

        if !capabilities.recorder_supported {
            error!("Recording API is not supported in this runtime");
            self.mount_failed = true;
            self.report_error(UNSUPPORTED_BROWSER.to_string());
        } else if capabilities.platform.is_ios && self.engine.mime().is_none() {
            error!("No supported recording profile on iOS");
            self.mount_failed = true;
            self.report_error(UNSUPPORTED_IOS.to_string());
        }

        if self.config.recorder.auto_start && !self.mount_failed {
            info!("Auto-start enabled, requesting camera");
            self.request_stream(true, Duration::ZERO);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        debug!("Command {:?} in {}", command, self.status);

        match command {
            Command::ActivateCamera => {
                if self.status != RecorderStatus::Idle {
                    warn!("Cannot activate camera while {}", self.status);
                    return;
                }
                if self.acquirer.has_stream() {
                    debug!("Camera already active");
                    return;
                }
                self.request_stream(self.config.recorder.auto_start, Duration::ZERO);
            }
            Command::StartCountdown => {
                if self.status != RecorderStatus::Idle || !self.acquirer.has_stream() {
                    warn!("Cannot start countdown while {} (stream: {})", self.status, self.acquirer.has_stream());
                    return;
                }
                self.begin_countdown();
            }
            Command::StopRecording => {
                if self.status != RecorderStatus::Recording || !self.engine.stop_recording() {
                    debug!("Stop ignored while {}", self.status);
                }
            }
            Command::ReRecord => self.re_record(),
            Command::Finish => self.finish(),
            Command::TogglePlay => {
                if self.status.has_review() {
                    if let Err(e) = self.review.toggle_play().await {
                        warn!("Review playback failed: {}", e);
                    }
                }
            }
            Command::Seek(seconds) => {
                if self.status.has_review() {
                    self.review.seek_to(seconds);
                }
            }
            Command::SeekFraction(fraction) => {
                if self.status.has_review() {
                    self.review.seek_fraction(fraction);
                }
            }
            Command::SetPlaybackRate(rate) => {
                if !self.status.has_review() {
                    return;
                }
                match self.review.set_playback_rate(rate) {
                    Ok(()) => self.playback_rate = rate,
                    Err(e) => warn!("{}", e),
                }
            }
            Command::ToggleFullscreen => {
                if self.status.has_review() {
                    self.review.toggle_fullscreen();
                }
            }
            Command::Retry => self.retry(),
            Command::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::StreamReady {
                request,
                countdown_after,
            } => {
                if request != self.request_id {
                    debug!("Dropping stale stream result for request {}", request);
                    return;
                }
                self.acquisition = None;
                self.error = None;
                self.last_failure = None;
                self.set_status(RecorderStatus::Idle);

                if countdown_after {
                    self.begin_countdown();
                }
            }
            Internal::StreamRetrying { request, error } => {
                if request == self.request_id {
                    self.report_error(error.to_string());
                }
            }
            Internal::StreamFailed {
                request,
                error,
                countdown_after,
            } => {
                if request != self.request_id {
                    debug!("Dropping stale stream failure for request {}", request);
                    return;
                }
                self.acquisition = None;
                self.last_failure = Some(Failure::Acquire { countdown_after });
                self.set_status(RecorderStatus::Idle);
                self.report_error(error.to_string());
            }
            Internal::CountdownComplete { countdown } => {
                if countdown != self.countdown_id || self.status != RecorderStatus::Countdown {
                    debug!("Dropping stale countdown {}", countdown);
                    return;
                }
                self.start_recording();
            }
        }
    }

    fn handle_engine(&mut self, event: EngineEvent) {
        if Some(event.attempt) != self.attempt {
            debug!("Dropping event from stale attempt {}", event.attempt);
            return;
        }

        match event.kind {
            EngineEventKind::Started => debug!("Attempt {} recording", event.attempt),
            EngineEventKind::Tick { elapsed } => self.elapsed_seconds = elapsed,
            EngineEventKind::CapReached => {
                info!("Maximum duration of {}s reached", self.config.recorder.max_duration_seconds)
            }
            EngineEventKind::Finalizing => self.is_finalizing = true,
            EngineEventKind::Finalized(Ok(artifact)) => {
                self.is_finalizing = false;
                self.attempt = None;
                self.review.load(&artifact);
                self.playback_rate = 1.0;
                self.emit(SessionEvent::ArtifactReady {
                    artifact: artifact.summary(),
                });
                self.artifact = Some(artifact);
                self.set_status(RecorderStatus::Reviewing);
            }
            EngineEventKind::Finalized(Err(err)) => {
                self.is_finalizing = false;
                self.attempt = None;
                self.fail_recording(err);
            }
            EngineEventKind::Failed(message) => {
                self.is_finalizing = false;
                self.attempt = None;
                self.fail_recording(RecordingError::Engine(message));
            }
        }
    }

    fn request_stream(&mut self, countdown_after: bool, delay: Duration) {
        if let Some(task) = self.acquisition.take() {
            task.abort();
        }

        self.request_id += 1;
        let request = self.request_id;
        self.error = None;
        self.set_status(RecorderStatus::Requesting);

        let acquirer = self.acquirer.clone();
        let tx = self.internal_tx.clone();

        self.acquisition = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }

            let retry_tx = tx.clone();
            let result = acquirer
                .start_stream_with(move |error| {
                    let _ = retry_tx.send(Internal::StreamRetrying {
                        request,
                        error: error.clone(),
                    });
                })
                .await;

            let _ = match result {
                Ok(_) => tx.send(Internal::StreamReady {
                    request,
                    countdown_after,
                }),
                Err(error) => tx.send(Internal::StreamFailed {
                    request,
                    error,
                    countdown_after,
                }),
            };
        }));
    }

    fn begin_countdown(&mut self) {
        let seconds = self.config.recorder.countdown_seconds;

        self.countdown.cancel();
        self.countdown.reset(seconds);
        self.elapsed_seconds = 0;
        self.error = None;
        self.set_status(RecorderStatus::Countdown);

        self.countdown_id += 1;
        let id = self.countdown_id;
        let tx = self.internal_tx.clone();
        self.countdown.start(seconds, move || {
            let _ = tx.send(Internal::CountdownComplete { countdown: id });
        });
    }

    fn start_recording(&mut self) {
        self.review.unload();
        self.artifact = None;
        self.elapsed_seconds = 0;

        let Some(stream) = self.acquirer.stream() else {
            self.fail_recording(RecordingError::NoStream);
            return;
        };

        match self.engine.start_recording(&stream) {
            Ok(attempt) => {
                self.attempt = Some(attempt);
                self.set_status(RecorderStatus::Recording);
            }
            Err(RecordingError::AlreadyRecording) => {
                warn!("Recorder still busy, countdown result ignored");
            }
            Err(err) => self.fail_recording(err),
        }
    }

    fn fail_recording(&mut self, err: RecordingError) {
        error!("Recording failed: {}", err);
        if err.is_empty_recording() {
            self.emit(SessionEvent::RecordingFailed { error: err.clone() });
        }
        self.elapsed_seconds = 0;
        self.last_failure = Some(Failure::Record);
        self.set_status(RecorderStatus::Idle);
        self.report_error(err.to_string());
    }

    fn re_record(&mut self) {
        if !self.config.recorder.allow_re_record {
            warn!("Re-record is disabled for this session");
            return;
        }
        if self.status != RecorderStatus::Reviewing {
            warn!("Cannot re-record while {}", self.status);
            return;
        }

        info!("Re-recording: discarding take and re-acquiring camera");

        self.engine.cancel();
        self.attempt = None;
        self.is_finalizing = false;
        self.review.unload();
        self.artifact = None;
        self.elapsed_seconds = 0;
        self.error = None;
        self.playback_rate = 1.0;
        self.countdown.reset(self.config.recorder.countdown_seconds);

        self.set_status(RecorderStatus::Idle);
        self.acquirer.stop_stream();
        self.request_stream(true, self.config.recorder.re_record_settle());
    }

    fn finish(&mut self) {
        if self.status != RecorderStatus::Reviewing {
            warn!("Cannot finish while {}", self.status);
            return;
        }
        let Some(artifact) = self.artifact.clone() else {
            warn!("Nothing recorded to finish");
            return;
        };

        info!(
            "Recording complete: {} bytes ({}), handing off",
            artifact.size(),
            artifact.content_type
        );

        let summary = artifact.summary();
        match self.on_complete.take() {
            Some(callback) => callback(artifact),
            None => warn!("No completion callback registered"),
        }

        self.emit(SessionEvent::Completed { artifact: summary });
        self.set_status(RecorderStatus::Completed);
        self.acquirer.stop_stream();
    }

    fn retry(&mut self) {
        if self.status != RecorderStatus::Idle {
            warn!("Nothing to retry while {}", self.status);
            return;
        }

        match self.last_failure.take() {
            Some(Failure::Acquire { countdown_after }) => {
                info!("Retrying camera acquisition");
                self.request_stream(countdown_after, Duration::ZERO);
            }
            Some(Failure::Record) if self.acquirer.has_stream() => {
                info!("Retrying recording");
                self.begin_countdown();
            }
            Some(Failure::Record) => {
                info!("Retrying recording with a fresh stream");
                self.request_stream(true, Duration::ZERO);
            }
            None => debug!("Nothing to retry"),
        }
    }

    fn set_status(&mut self, status: RecorderStatus) {
        if self.status == status {
            return;
        }
        let from = self.status;
        if from == RecorderStatus::Countdown {
            self.countdown.cancel();
        }
        self.status = status;

        info!("Session {}: {} -> {}", self.config.session_id, from, status);
        self.emit(SessionEvent::StatusChanged { from, to: status });
    }

    fn report_error(&mut self, message: String) {
        warn!("{}", message);
        self.error = Some(message.clone());
        self.emit(SessionEvent::Error { message });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn snapshot(&self) -> SessionSnapshot {
        let review = self.review.state();
        let max = self.config.recorder.max_duration_seconds;

        SessionSnapshot {
            session_id: self.config.session_id.clone(),
            status: self.status,
            elapsed_seconds: self.elapsed_seconds,
            countdown_remaining: self.countdown.remaining(),
            max_duration_seconds: max,
            progress: progress(self.status, self.elapsed_seconds, max, &review),
            error: self.error.clone(),
            is_finalizing: self.is_finalizing,
            has_stream: self.acquirer.has_stream(),
            artifact: self.artifact.as_ref().map(OutputArtifact::summary),
            review,
            playback_rate: self.playback_rate,
            is_fullscreen: self.review.is_loaded() && self.review.is_fullscreen(),
            can_re_record: self.config.recorder.allow_re_record && self.status == RecorderStatus::Reviewing,
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn teardown(&mut self) {
        info!("Closing session {}", self.config.session_id);

        self.countdown.cancel();
        if let Some(task) = self.acquisition.take() {
            task.abort();
        }
        self.request_id += 1;
        self.engine.cancel();
        self.attempt = None;
        self.is_finalizing = false;
        self.review.unload();
        self.acquirer.stop_stream();
    }
}
