use chrono::TimeDelta;

/// Human-readable run duration: tenths of a second below one minute, whole
/// (floored) minutes otherwise.
pub fn format_duration(elapsed: TimeDelta) -> String {
    let seconds = elapsed.num_seconds();
    if seconds < 60 {
        let micros = elapsed.num_microseconds().unwrap_or(seconds * 1_000_000);
        format!("{:.1} seconds", micros as f64 / 1_000_000.0)
    } else {
        format!("{} minutes", seconds / 60)
    }
}
