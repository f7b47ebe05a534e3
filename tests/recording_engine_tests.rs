// Integration tests for the chunked recording engine
//
// A simulated recorder emits fixed-size slices on the tokio clock; the clock
// is paused so the duration cap, flush sequence and finalization ceiling can
// be checked to the millisecond.

use anyhow::{bail, Result};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, Instant};
use video_recorder::config::{EngineConfig, FinalizeConfig};
use video_recorder::platform::simulated::{
    RecorderBehavior, SimulatedHandle, SimulatedRecorderApi, DESKTOP_USER_AGENT,
};
use video_recorder::platform::probe::APPLE_MIME_CANDIDATES;
use video_recorder::platform::{select_mime_profile, CaptureHandle, DeviceCapabilities};
use video_recorder::recording::{
    EngineEvent, EngineEventKind, EngineSettings, OutputArtifact, RecordingEngine, RecordingError,
};

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
const SAFARI_MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

fn settings(max_duration_seconds: u32) -> EngineSettings {
    EngineSettings {
        max_duration_seconds,
        engine: EngineConfig::default(),
        finalize: FinalizeConfig::default(),
    }
}

fn engine_for(
    api: &Arc<SimulatedRecorderApi>,
    user_agent: &str,
    settings: EngineSettings,
) -> (RecordingEngine, UnboundedReceiver<EngineEvent>) {
    let capabilities = DeviceCapabilities::detect(user_agent, 0, api.as_ref());
    let mime = select_mime_profile(&capabilities, api.as_ref());
    RecordingEngine::new(api.clone(), capabilities, mime, settings)
}

fn live_stream() -> Arc<dyn CaptureHandle> {
    Arc::new(SimulatedHandle::new("test-stream"))
}

/// Collect events until the attempt is finalized or fails
async fn run_to_end(rx: &mut UnboundedReceiver<EngineEvent>) -> Result<Vec<(Instant, EngineEventKind)>> {
    let mut seen = Vec::new();
    loop {
        let Some(event) = timeout(Duration::from_secs(600), rx.recv()).await? else {
            bail!("engine event channel closed");
        };
        let done = matches!(event.kind, EngineEventKind::Finalized(_) | EngineEventKind::Failed(_));
        seen.push((Instant::now(), event.kind));
        if done {
            return Ok(seen);
        }
    }
}

fn finalized(events: &[(Instant, EngineEventKind)]) -> Result<OutputArtifact, RecordingError> {
    match events.last() {
        Some((_, EngineEventKind::Finalized(result))) => result.clone(),
        other => panic!("attempt did not finalize: {:?}", other),
    }
}

fn when(events: &[(Instant, EngineEventKind)], pred: impl Fn(&EngineEventKind) -> bool) -> Instant {
    events
        .iter()
        .find(|(_, kind)| pred(kind))
        .map(|(at, _)| *at)
        .expect("event not seen")
}

#[tokio::test(start_paused = true)]
async fn test_duration_cap_scenario() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(3));

    let started = Instant::now();
    engine.start_recording(&live_stream())?;
    let events = run_to_end(&mut rx).await?;

    let artifact = finalized(&events)?;
    assert!(artifact.size() >= 30_000, "got {} bytes", artifact.size());
    assert_eq!(artifact.content_type, "video/webm");

    // Cap fired at t=3s, never past it
    let cap_at = when(&events, |k| matches!(k, EngineEventKind::CapReached));
    assert_eq!(cap_at - started, Duration::from_secs(3));
    let max_tick = events
        .iter()
        .filter_map(|(_, k)| match k {
            EngineEventKind::Tick { elapsed } => Some(*elapsed),
            _ => None,
        })
        .max();
    assert_eq!(max_tick, Some(3));

    let recorder = &api.recorders()[0];
    assert_eq!(recorder.flush_requests(), 2, "flush, then second-chance flush");
    assert_eq!(recorder.stop_calls(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_artifact_is_every_delivered_chunk_in_order() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new().with_behavior(RecorderBehavior {
        chunk_size: 700,
        flush_size: 120,
        final_chunk_size: 333,
        late_chunks: 4,
        late_interval: Duration::from_millis(90),
        ..RecorderBehavior::default()
    }));
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(2));

    engine.start_recording(&live_stream())?;
    let artifact = finalized(&run_to_end(&mut rx).await?)?;

    let delivered = api.recorders()[0].delivered();
    let expected: Vec<u8> = delivered.iter().flat_map(|c| c.iter().copied()).collect();

    assert_eq!(artifact.chunk_count, delivered.len());
    assert_eq!(artifact.data, Bytes::from(expected));
    assert_eq!(artifact.size(), api.recorders()[0].delivered_bytes());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_slow_trailing_chunk_is_kept() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new().with_behavior(RecorderBehavior {
        late_chunks: 1,
        late_interval: Duration::from_millis(1_120),
        ..RecorderBehavior::default()
    }));
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(1));

    engine.start_recording(&live_stream())?;
    let events = run_to_end(&mut rx).await?;
    let artifact = finalized(&events)?;

    assert_eq!(artifact.size(), api.recorders()[0].delivered_bytes(), "trailing chunk must be included");

    // Baseline resets at the first poll after the chunk, then 20 quiet polls
    let finalizing_at = when(&events, |k| matches!(k, EngineEventKind::Finalizing));
    let (done_at, _) = events.last().expect("final event");
    assert_eq!(*done_at - finalizing_at, Duration::from_millis(1_150 + 1_000));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_quiet_recorder_finalizes_after_min_wait_and_stable_run() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(1));

    engine.start_recording(&live_stream())?;
    let events = run_to_end(&mut rx).await?;
    finalized(&events)?;

    // 500ms minimum wait + 20 polls of 50ms
    let finalizing_at = when(&events, |k| matches!(k, EngineEventKind::Finalizing));
    let (done_at, _) = events.last().expect("final event");
    assert_eq!(*done_at - finalizing_at, Duration::from_millis(1_500));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_ios_uses_longer_timeslice() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, mut rx) = engine_for(&api, IPHONE_UA, settings(2));

    engine.start_recording(&live_stream())?;
    finalized(&run_to_end(&mut rx).await?)?;

    let recorder = &api.recorders()[0];
    assert_eq!(recorder.timeslice(), Some(Duration::from_millis(200)));

    // About five slices per second over a two second take
    let slices = recorder.delivered().iter().filter(|c| c.len() == 1000).count();
    assert!((10..=12).contains(&slices), "got {} slices", slices);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_desktop_uses_default_timeslice() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(1));

    engine.start_recording(&live_stream())?;
    finalized(&run_to_end(&mut rx).await?)?;

    assert_eq!(api.recorders()[0].timeslice(), Some(Duration::from_millis(100)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_engine_instance() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(2));
    let stream = live_stream();

    engine.start_recording(&stream)?;
    for _ in 0..3 {
        assert_eq!(engine.start_recording(&stream), Err(RecordingError::AlreadyRecording));
    }
    assert_eq!(api.created(), 1);

    run_to_end(&mut rx).await?;

    // Once finalized, a new attempt is allowed
    sleep(Duration::from_millis(1)).await;
    assert!(!engine.is_recording());
    engine.start_recording(&stream)?;
    assert_eq!(api.created(), 2);
    assert_eq!(api.max_concurrent(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_runs_once() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(180));

    engine.start_recording(&live_stream())?;
    sleep(Duration::from_millis(1_500)).await;

    assert!(engine.stop_recording());
    assert!(!engine.stop_recording(), "second stop is a no-op");

    let artifact = finalized(&run_to_end(&mut rx).await?)?;
    let recorder = &api.recorders()[0];
    assert_eq!(recorder.flush_requests(), 2);
    assert_eq!(recorder.stop_calls(), 1);
    assert_eq!(artifact.size(), recorder.delivered_bytes());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_after_cap_is_noop() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(1));

    engine.start_recording(&live_stream())?;

    loop {
        let event = rx.recv().await.expect("engine events");
        if matches!(event.kind, EngineEventKind::CapReached) {
            break;
        }
    }

    assert!(!engine.stop_recording());
    run_to_end(&mut rx).await?;
    assert!(!engine.stop_recording());

    let recorder = &api.recorders()[0];
    assert_eq!(recorder.flush_requests(), 2);
    assert_eq!(recorder.stop_calls(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unstable_delivery_hits_ceiling() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new().with_behavior(RecorderBehavior {
        late_chunks: 1_000,
        late_interval: Duration::from_millis(40),
        ..RecorderBehavior::default()
    }));
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(1));

    engine.start_recording(&live_stream())?;
    let events = run_to_end(&mut rx).await?;

    let finalizing_at = when(&events, |k| matches!(k, EngineEventKind::Finalizing));
    let (done_at, _) = events.last().expect("final event");
    let waited = *done_at - finalizing_at;
    assert!(waited >= Duration::from_secs(5), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(5_100), "waited {:?}", waited);

    let artifact = finalized(&events)?;
    assert!(artifact.size() > 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_no_chunks_is_empty_recording() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new().with_behavior(RecorderBehavior {
        silent: true,
        ..RecorderBehavior::default()
    }));
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(180));

    engine.start_recording(&live_stream())?;
    sleep(Duration::from_secs(1)).await;
    engine.stop_recording();

    let events = run_to_end(&mut rx).await?;
    assert_eq!(finalized(&events), Err(RecordingError::EmptyRecording));

    let finalizing_at = when(&events, |k| matches!(k, EngineEventKind::Finalizing));
    let (done_at, _) = events.last().expect("final event");
    assert!(*done_at - finalizing_at >= Duration::from_secs(5));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_byte_chunks_are_rejected() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new().with_behavior(RecorderBehavior {
        chunk_size: 0,
        flush_size: 0,
        final_chunk_size: 0,
        ..RecorderBehavior::default()
    }));
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(1));

    engine.start_recording(&live_stream())?;
    let events = run_to_end(&mut rx).await?;

    assert_eq!(finalized(&events), Err(RecordingError::ZeroBytes));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_runtime_error_abandons_attempt() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new().with_behavior(RecorderBehavior {
        fail_after: Some(Duration::from_millis(1_500)),
        ..RecorderBehavior::default()
    }));
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(180));

    engine.start_recording(&live_stream())?;
    let events = run_to_end(&mut rx).await?;

    assert!(matches!(events.last(), Some((_, EngineEventKind::Failed(_)))));
    assert!(!events.iter().any(|(_, k)| matches!(k, EngineEventKind::Finalizing)));

    sleep(Duration::from_millis(1)).await;
    assert!(!engine.is_recording());
    assert_eq!(api.recorders()[0].stop_calls(), 1);
    assert_eq!(api.active(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancel_then_fresh_attempt_has_only_new_data() -> Result<()> {
    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, mut rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(1));
    let stream = live_stream();

    let first = engine.start_recording(&stream)?;
    sleep(Duration::from_millis(600)).await;
    engine.cancel();
    assert!(!engine.is_recording());
    assert_eq!(api.active(), 0);

    let second = engine.start_recording(&stream)?;
    assert_ne!(first, second);

    let artifact = loop {
        let event = rx.recv().await.expect("engine events");
        if event.attempt != second {
            continue;
        }
        if let EngineEventKind::Finalized(result) = event.kind {
            break result?;
        }
    };

    let fill = api.recorders()[1].fill_byte();
    assert_ne!(fill, api.recorders()[0].fill_byte());
    assert!(artifact.data.iter().all(|b| *b == fill));

    Ok(())
}

#[tokio::test]
async fn test_refuses_without_recorder_or_stream() -> Result<()> {
    let unsupported = Arc::new(SimulatedRecorderApi::unsupported());
    let (mut engine, _rx) = engine_for(&unsupported, DESKTOP_USER_AGENT, settings(5));
    assert_eq!(engine.start_recording(&live_stream()), Err(RecordingError::Unsupported));

    let api = Arc::new(SimulatedRecorderApi::new());
    let (mut engine, _rx) = engine_for(&api, DESKTOP_USER_AGENT, settings(5));
    let dead = live_stream();
    dead.stop_tracks();
    assert_eq!(engine.start_recording(&dead), Err(RecordingError::NoStream));
    assert_eq!(api.created(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_apple_profile_tags_mp4() -> Result<()> {
    let mut supported: Vec<&str> = APPLE_MIME_CANDIDATES[1..].to_vec();
    supported.push("video/webm");
    let api = Arc::new(SimulatedRecorderApi::new().with_mime_types(&supported));
    let (mut engine, mut rx) = engine_for(&api, SAFARI_MAC_UA, settings(1));

    assert_eq!(engine.mime().map(|m| m.as_str()), Some("video/mp4;codecs=avc1.4D001E"));

    engine.start_recording(&live_stream())?;
    let artifact = finalized(&run_to_end(&mut rx).await?)?;
    assert_eq!(artifact.content_type, "video/mp4");

    Ok(())
}
