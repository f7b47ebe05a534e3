use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, warn};

use super::artifact::OutputArtifact;
use super::chunk::ChunkBuffer;
use super::error::RecordingError;
use super::finalize::{StabilityCheck, Stabilizer};
use crate::config::{EngineConfig, FinalizeConfig};
use crate::platform::probe::DEFAULT_CONTAINER;
use crate::platform::{CaptureHandle, DeviceCapabilities, MediaRecorder, MediaRecorderApi, MimeProfile, RecorderEvent};

/// Identifies one recording attempt; events of older attempts are stale
pub type AttemptId = u64;

/// Notification from the engine to its owner
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub attempt: AttemptId,
    pub kind: EngineEventKind,
}

#[derive(Debug, Clone)]
pub enum EngineEventKind {
    Started,
    /// Elapsed-time ticker (1 Hz)
    Tick { elapsed: u32 },
    /// Duration cap hit; the stop sequence is running
    CapReached,
    /// Recorder stopped; waiting for trailing chunks
    Finalizing,
    Finalized(Result<OutputArtifact, RecordingError>),
    /// Runtime failure; the attempt was abandoned
    Failed(String),
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_duration_seconds: u32,
    pub engine: EngineConfig,
    pub finalize: FinalizeConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_duration_seconds: 180,
            engine: EngineConfig::default(),
            finalize: FinalizeConfig::default(),
        }
    }
}

/// Chunked recording engine
///
/// Runs at most one attempt at a time. Each attempt gets a fresh recorder
/// instance and chunk buffer, owned by a pump task that appends slices,
/// drives the elapsed-time ticker, and finalizes once the recorder stops.
pub struct RecordingEngine {
    api: Arc<dyn MediaRecorderApi>,
    capabilities: DeviceCapabilities,
    mime: Option<MimeProfile>,
    settings: EngineSettings,
    events: mpsc::UnboundedSender<EngineEvent>,
    next_attempt: AttemptId,
    active: Option<ActiveAttempt>,
}

struct ActiveAttempt {
    shared: Arc<AttemptShared>,
    pump: JoinHandle<()>,
}

struct AttemptShared {
    id: AttemptId,
    recorder: Arc<dyn MediaRecorder>,
    /// Latch shared by manual and automatic stop
    stopping: AtomicBool,
    elapsed: AtomicU32,
    stop_task: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    settings: EngineSettings,
}

impl AttemptShared {
    fn emit(&self, kind: EngineEventKind) {
        let _ = self.events.send(EngineEvent {
            attempt: self.id,
            kind,
        });
    }

    /// Double flush, then stop; only the first caller wins
    fn begin_stop(&self) -> bool {
        if !self.recorder.is_active() {
            return false;
        }
        if self.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }

        let recorder = Arc::clone(&self.recorder);
        let second_flush = self.settings.engine.second_flush_delay();
        let stop_delay = self.settings.engine.stop_delay();
        let attempt = self.id;

        let task = tokio::spawn(async move {
            if let Err(e) = recorder.request_data() {
                warn!("Attempt {}: flush request failed: {}", attempt, e);
            }

            sleep(second_flush).await;
            if recorder.is_active() {
                if let Err(e) = recorder.request_data() {
                    warn!("Attempt {}: second flush failed: {}", attempt, e);
                }
            }

            sleep(stop_delay.saturating_sub(second_flush)).await;
            if recorder.is_active() {
                debug!("Attempt {}: stopping recorder", attempt);
                recorder.stop();
            }
        });

        let mut slot = self.stop_task.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(task);
        true
    }

    fn abort_stop_task(&self) {
        let task = self.stop_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl RecordingEngine {
    pub fn new(
        api: Arc<dyn MediaRecorderApi>,
        capabilities: DeviceCapabilities,
        mime: Option<MimeProfile>,
        settings: EngineSettings,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            api,
            capabilities,
            mime,
            settings,
            events,
            next_attempt: 0,
            active: None,
        };
        (engine, rx)
    }

    /// Media type finished artifacts are tagged with
    pub fn content_type(&self) -> String {
        self.mime
            .as_ref()
            .map(MimeProfile::container)
            .unwrap_or_else(|| DEFAULT_CONTAINER.to_string())
    }

    pub fn mime(&self) -> Option<&MimeProfile> {
        self.mime.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// An attempt is recording or finalizing
    pub fn is_recording(&self) -> bool {
        self.active.as_ref().is_some_and(|a| !a.pump.is_finished())
    }

    /// Recorder is capturing and no stop has been requested
    pub fn can_stop(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.shared.recorder.is_active() && !a.shared.stopping.load(Ordering::SeqCst))
    }

    pub fn current_attempt(&self) -> Option<AttemptId> {
        self.active.as_ref().map(|a| a.shared.id)
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.active
            .as_ref()
            .map(|a| a.shared.elapsed.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Open a fresh recorder against `handle` and start capturing
    pub fn start_recording(&mut self, handle: &Arc<dyn CaptureHandle>) -> Result<AttemptId, RecordingError> {
        if self.is_recording() {
            warn!("Recording already in progress, ignoring start");
            return Err(RecordingError::AlreadyRecording);
        }
        if !self.capabilities.recorder_supported {
            return Err(RecordingError::Unsupported);
        }
        if !handle.is_live() {
            return Err(RecordingError::NoStream);
        }

        self.cancel();

        let recorder = self
            .api
            .create(Arc::clone(handle), self.mime.as_ref())
            .map_err(|e| RecordingError::StartFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let timeslice = self.settings.engine.timeslice(self.capabilities.platform.is_ios);
        recorder
            .start(timeslice, tx)
            .map_err(|e| RecordingError::StartFailed(e.to_string()))?;

        self.next_attempt += 1;
        let id = self.next_attempt;

        info!(
            "Recording attempt {} started ({}, timeslice {:?}, cap {}s)",
            id,
            self.mime.as_ref().map(MimeProfile::as_str).unwrap_or("runtime default"),
            timeslice,
            self.settings.max_duration_seconds
        );

        let shared = Arc::new(AttemptShared {
            id,
            recorder,
            stopping: AtomicBool::new(false),
            elapsed: AtomicU32::new(0),
            stop_task: Mutex::new(None),
            events: self.events.clone(),
            settings: self.settings.clone(),
        });

        let pump = tokio::spawn(pump(Arc::clone(&shared), rx, self.content_type()));
        self.active = Some(ActiveAttempt { shared, pump });

        Ok(id)
    }

    /// Manual stop; no-op unless actively recording
    pub fn stop_recording(&self) -> bool {
        match &self.active {
            Some(attempt) if !attempt.pump.is_finished() => {
                let started = attempt.shared.begin_stop();
                if started {
                    info!("Attempt {}: manual stop requested", attempt.shared.id);
                } else {
                    debug!("Attempt {}: stop ignored, already stopping", attempt.shared.id);
                }
                started
            }
            _ => false,
        }
    }

    /// Abandon the current attempt without producing an artifact
    pub fn cancel(&mut self) {
        if let Some(attempt) = self.active.take() {
            attempt.pump.abort();
            attempt.shared.abort_stop_task();
            if attempt.shared.recorder.is_active() {
                attempt.shared.recorder.stop();
            }
            debug!("Attempt {} cancelled", attempt.shared.id);
        }
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn pump(shared: Arc<AttemptShared>, mut rx: mpsc::UnboundedReceiver<RecorderEvent>, content_type: String) {
    let mut buffer = ChunkBuffer::new();
    let one_second = Duration::from_secs(1);
    let mut ticker = interval_at(Instant::now() + one_second, one_second);
    let max = shared.settings.max_duration_seconds;

    shared.emit(EngineEventKind::Started);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(RecorderEvent::Data(chunk)) => {
                    debug!("Attempt {}: chunk #{} ({} bytes)", shared.id, buffer.len() + 1, chunk.len());
                    buffer.push(chunk);
                }
                Some(RecorderEvent::Stopped) => break,
                Some(RecorderEvent::Error(message)) => {
                    error!("Attempt {}: recorder error: {}", shared.id, message);
                    shared.abort_stop_task();
                    shared.recorder.stop();
                    shared.emit(EngineEventKind::Failed(message));
                    return;
                }
                None => {
                    warn!("Attempt {}: recorder closed without a stop notification", shared.id);
                    break;
                }
            },
            _ = ticker.tick(), if !shared.stopping.load(Ordering::SeqCst) => {
                let elapsed = shared.elapsed.fetch_add(1, Ordering::SeqCst) + 1;
                shared.emit(EngineEventKind::Tick { elapsed });

                if elapsed >= max && shared.begin_stop() {
                    info!("Attempt {}: duration cap of {}s reached", shared.id, max);
                    shared.emit(EngineEventKind::CapReached);
                }
            }
        }
    }

    shared.emit(EngineEventKind::Finalizing);
    info!(
        "Attempt {}: recorder stopped with {} chunks ({} bytes), finalizing",
        shared.id,
        buffer.len(),
        buffer.total_bytes()
    );

    let finalize = &shared.settings.finalize;
    let stopped_at = Instant::now();
    let mut stabilizer = Stabilizer::new(finalize);
    let mut poll = interval_at(stopped_at + finalize.poll_interval(), finalize.poll_interval());

    loop {
        tokio::select! {
            biased;

            Some(event) = rx.recv() => {
                if let RecorderEvent::Data(chunk) = event {
                    debug!("Attempt {}: trailing chunk ({} bytes)", shared.id, chunk.len());
                    buffer.push(chunk);
                }
            }
            _ = poll.tick() => {
                match stabilizer.observe(stopped_at.elapsed(), buffer.len(), buffer.total_bytes()) {
                    StabilityCheck::Waiting => {}
                    StabilityCheck::Stable => {
                        debug!("Attempt {}: buffer stable after {:?}", shared.id, stopped_at.elapsed());
                        break;
                    }
                    StabilityCheck::CeilingReached => {
                        warn!("Attempt {}: finalization ceiling reached, using {} chunks", shared.id, buffer.len());
                        break;
                    }
                }
            }
        }
    }

    let result = OutputArtifact::assemble(&buffer.snapshot(), content_type);
    match &result {
        Ok(artifact) => info!(
            "Attempt {}: artifact ready ({} bytes, {} chunks, {})",
            shared.id,
            artifact.size(),
            artifact.chunk_count,
            artifact.content_type
        ),
        Err(e) => error!("Attempt {}: finalization failed: {}", shared.id, e),
    }

    shared.emit(EngineEventKind::Finalized(result));
}
