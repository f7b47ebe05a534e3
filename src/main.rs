// Drive one recorder session end to end against the simulated media runtime.
//
// Usage: video-recorder --max-duration 5 --re-records 1 --output take.webm

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use video_recorder::platform::simulated::{SimulatedRuntime, DESKTOP_USER_AGENT};
use video_recorder::time::format_progress;
use video_recorder::{Config, RecorderStatus, RecordingSession, SessionEvent, SessionHandle, SessionSnapshot};

#[derive(Parser)]
#[command(name = "video-recorder")]
#[command(about = "Run a simulated video-response recording session")]
struct Args {
    /// Config file (TOML); VIDEO_RECORDER__* variables override it
    #[arg(short, long, default_value = "~/.config/video-recorder/config")]
    config: String,

    /// Recording cap in seconds
    #[arg(short, long)]
    max_duration: Option<u32>,

    /// Stop manually after this many seconds of recording
    #[arg(long)]
    stop_after: Option<u64>,

    /// Disable the re-record transition
    #[arg(long)]
    no_re_record: bool,

    /// Acquire the camera on start and go straight to the countdown
    #[arg(long)]
    auto_start: bool,

    /// User agent the capability probe sees
    #[arg(long, default_value = DESKTOP_USER_AGENT)]
    user_agent: String,

    /// Touch points the capability probe sees (iPadOS reports a Mac agent)
    #[arg(long, default_value = "0")]
    max_touch_points: u32,

    /// How many times to re-record before finishing
    #[arg(long, default_value = "0")]
    re_records: u32,

    /// Write the finished artifact here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the final snapshot as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config_path = shellexpand::tilde(&args.config);
    let mut cfg = Config::load(config_path.as_ref())?;
    if let Some(max) = args.max_duration {
        cfg.recorder.max_duration_seconds = max;
    }
    if args.no_re_record {
        cfg.recorder.allow_re_record = false;
    }
    if args.auto_start {
        cfg.recorder.auto_start = true;
    }
    cfg.validate()?;

    info!("Video Recorder v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Max duration: {}s, re-record: {}, auto-start: {}",
        cfg.recorder.max_duration_seconds, cfg.recorder.allow_re_record, cfg.recorder.auto_start
    );

    let simulated = SimulatedRuntime::new().with_max_touch_points(args.max_touch_points);
    let runtime = simulated.media_runtime(&args.user_agent);

    let (artifact_tx, artifact_rx) = oneshot::channel();
    let handle = RecordingSession::new(cfg.session_config(), runtime)
        .on_complete(move |artifact| {
            let _ = artifact_tx.send(artifact);
        })
        .spawn();

    let mut events = handle.subscribe();
    let logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::StatusChanged { from, to } => info!("Status: {} -> {}", from, to),
                SessionEvent::Error { message } => warn!("Error: {}", message),
                SessionEvent::ArtifactReady { artifact } => {
                    info!("Artifact ready: {} bytes in {} chunks", artifact.size, artifact.chunk_count)
                }
                SessionEvent::Completed { artifact } => info!("Completed: {}", artifact.id),
                SessionEvent::RecordingFailed { error } => warn!("Recording failed: {}", error),
            }
        }
    });

    if !cfg.recorder.auto_start {
        handle.activate_camera()?;
        let ready = handle
            .wait_until(|s| s.status == RecorderStatus::Idle && (s.has_stream || s.error.is_some()))
            .await?;
        if !ready.has_stream {
            bail!("camera unavailable: {}", ready.error.unwrap_or_default());
        }
        handle.start_countdown()?;
    }

    record_take(&handle, args.stop_after).await?;

    for take in 1..=args.re_records {
        if !cfg.recorder.allow_re_record {
            warn!("Re-record disabled, skipping remaining takes");
            break;
        }
        info!("Re-recording (take {})", take + 1);
        handle.re_record()?;
        handle.wait_until(|s| s.status != RecorderStatus::Reviewing).await?;
        record_take(&handle, args.stop_after).await?;
    }

    handle.toggle_play()?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let reviewing = handle.snapshot();
    info!(
        "Review: {} ({:.0}%)",
        format_progress(reviewing.review.current_time, reviewing.review.duration),
        reviewing.progress * 100.0
    );

    handle.finish()?;
    let artifact = artifact_rx.await?;
    info!("Received artifact: {} bytes ({})", artifact.size(), artifact.content_type);

    if let Some(path) = &args.output {
        std::fs::write(path, &artifact.data)?;
        info!("Saved artifact to {}", path.display());
    }

    let done = handle.wait_for_status(RecorderStatus::Completed).await?;
    handle.shutdown().await?;
    logger.abort();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&done)?);
    } else {
        print_summary(&done);
    }

    info!(
        "Streams issued: {}, still live: {}",
        simulated.devices.issued().len(),
        simulated.devices.live_handles()
    );

    Ok(())
}

/// Wait for one take to reach review
async fn record_take(handle: &SessionHandle, stop_after: Option<u64>) -> Result<()> {
    handle.wait_for_status(RecorderStatus::Recording).await?;

    if let Some(seconds) = stop_after {
        handle.wait_until(|s| s.elapsed_seconds as u64 >= seconds).await?;
        handle.stop_recording()?;
    }

    let snapshot = handle
        .wait_until(|s| s.status == RecorderStatus::Reviewing || s.status == RecorderStatus::Idle)
        .await?;
    if snapshot.status != RecorderStatus::Reviewing {
        bail!("recording failed: {}", snapshot.error.unwrap_or_default());
    }
    Ok(())
}

fn print_summary(snapshot: &SessionSnapshot) {
    println!("Session:   {}", snapshot.session_id);
    println!("Status:    {}", snapshot.status);
    if let Some(artifact) = &snapshot.artifact {
        println!("Artifact:  {} ({} bytes, {} chunks)", artifact.id, artifact.size, artifact.chunk_count);
        println!("Type:      {}", artifact.content_type);
    }
    println!("Stream:    {}", if snapshot.has_stream { "live" } else { "released" });
}
