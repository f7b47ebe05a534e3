// Tests for layered configuration loading

use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;
use video_recorder::config::{Config, JobType};

fn write_config(contents: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn test_missing_file_uses_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = Config::load(dir.path().join("absent").to_str().unwrap())?;

    assert_eq!(cfg.recorder.max_duration_seconds, 180);
    assert!(cfg.recorder.allow_re_record);
    assert!(!cfg.recorder.auto_start);
    assert_eq!(cfg.recorder.countdown_seconds, 5);
    assert_eq!(cfg.recorder.job_type, JobType::Company);
    assert_eq!(cfg.acquisition.timeout_ms, 10_000);
    assert_eq!(cfg.acquisition.max_retry_attempts, 3);
    assert_eq!(cfg.finalize.stable_polls, 20);
    assert_eq!(cfg.finalize.ceiling_ms, 5_000);
    assert_eq!(cfg.engine.timeslice_ms, 100);
    assert_eq!(cfg.engine.ios_timeslice_ms, 200);

    Ok(())
}

#[test]
fn test_file_overrides_selected_fields() -> Result<()> {
    let file = write_config(
        r##"
[recorder]
job_type = "secret"
max_duration_seconds = 60
allow_re_record = false

[recorder.colors]
primary = "#112233"

[finalize]
ceiling_ms = 8000
"##,
    )?;

    let cfg = Config::load(file.path().to_str().unwrap())?;

    assert_eq!(cfg.recorder.job_type, JobType::Secret);
    assert_eq!(cfg.recorder.max_duration_seconds, 60);
    assert!(!cfg.recorder.allow_re_record);
    assert_eq!(cfg.recorder.countdown_seconds, 5, "unset fields keep defaults");
    let colors = cfg.recorder.colors.as_ref().expect("colors");
    assert_eq!(colors.primary.as_deref(), Some("#112233"));
    assert!(colors.secondary.is_none());
    assert_eq!(cfg.finalize.ceiling_ms, 8_000);
    assert_eq!(cfg.finalize.min_wait_ms, 500);

    let session = cfg.session_config();
    assert!(session.session_id.starts_with("recording-"));
    assert_eq!(session.engine_settings().max_duration_seconds, 60);
    assert_ne!(session.session_id, cfg.session_config().session_id);

    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<()> {
    let file = write_config("[acquisition]\nretry_delay_ms = 900\n")?;

    std::env::set_var("VIDEO_RECORDER__ACQUISITION__RETRY_DELAY_MS", "750");
    let loaded = Config::load(file.path().to_str().unwrap());
    std::env::remove_var("VIDEO_RECORDER__ACQUISITION__RETRY_DELAY_MS");

    assert_eq!(loaded?.acquisition.retry_delay_ms, 750);
    Ok(())
}

#[test]
fn test_zero_duration_is_rejected() -> Result<()> {
    let file = write_config("[recorder]\nmax_duration_seconds = 0\n")?;

    let err = Config::load(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("max_duration_seconds"));

    Ok(())
}

#[test]
fn test_zero_countdown_is_rejected() -> Result<()> {
    let file = write_config("[recorder]\ncountdown_seconds = 0\n")?;

    let err = Config::load(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("countdown_seconds"));

    Ok(())
}

#[test]
fn test_ceiling_shorter_than_min_wait_is_rejected() {
    let mut cfg = Config::default();
    cfg.finalize.min_wait_ms = 2_000;
    cfg.finalize.ceiling_ms = 1_000;

    assert!(cfg.validate().is_err());

    cfg.finalize.ceiling_ms = 2_000;
    assert!(cfg.validate().is_ok());
}
