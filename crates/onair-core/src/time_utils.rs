use chrono::{DateTime, Duration, Utc};

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Converts a signed chrono duration into a sleepable std duration, clamping
/// negative values to zero.
pub fn non_negative_std_duration(delta: Duration) -> std::time::Duration {
    delta.to_std().unwrap_or(std::time::Duration::ZERO)
}

/// Delay from `now` until `target`; zero when `target` is already in the past.
pub fn delay_until(target: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    non_negative_std_duration(target.signed_duration_since(now))
}

/// Returns true when more than `threshold` has elapsed since `since`.
pub fn elapsed_exceeds(since: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    now.signed_duration_since(since) > threshold
}

/// Scales a duration by a floating factor with millisecond precision.
pub fn scale_duration(duration: Duration, factor: f64) -> Duration {
    let scaled = (duration.num_milliseconds() as f64 * factor).round();
    if !scaled.is_finite() {
        return Duration::MAX;
    }
    Duration::try_milliseconds(scaled as i64).unwrap_or(Duration::MAX)
}

/// Renders a duration as a short human readable string (`1h`, `5m`, `90s`).
pub fn humanize_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds();
    if seconds != 0 && seconds % 86_400 == 0 {
        format!("{}d", seconds / 86_400)
    } else if seconds != 0 && seconds % 3_600 == 0 {
        format!("{}h", seconds / 3_600)
    } else if seconds != 0 && seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{seconds}s")
    }
}
