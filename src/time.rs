/// Format seconds as `m:ss` (minutes are not wrapped into hours)
pub fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// `elapsed / total` clock pair, e.g. `0:42 / 3:00`
pub fn format_progress(elapsed: f64, total: f64) -> String {
    format!("{} / {}", format_clock(elapsed), format_clock(total))
}
