use std::time::Duration;

/// Pretty-print a duration (used in logs and diagnostics)
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();

    if duration < Duration::from_millis(1) {
        format!("{:.3}μs", duration.as_nanos() as f64 / 1_000.0)
    } else if duration < Duration::from_secs(1) {
        format!("{:.3}ms", duration.as_micros() as f64 / 1_000.0)
    } else if secs < 60.0 {
        format!("{:.3}s", secs)
    } else if secs < 3_600.0 {
        format!("{:.3}m", secs / 60.0)
    } else if secs < 86_400.0 {
        format!("{:.3}h", secs / 3_600.0)
    } else {
        format!("{:.3}d", secs / 86_400.0)
    }
}

/// Returns the current wall-clock time in microseconds since the UNIX epoch.
pub fn now_as_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_picks_the_largest_fitting_unit() {
        assert_eq!(format_duration(Duration::from_nanos(1_500)), "1.500μs");
        assert_eq!(format_duration(Duration::from_micros(2_250)), "2.250ms");
        assert_eq!(format_duration(Duration::from_millis(5_000)), "5.000s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.500m");
        assert_eq!(format_duration(Duration::from_secs(5_400)), "1.500h");
        assert_eq!(format_duration(Duration::from_secs(129_600)), "1.500d");
    }

    #[test]
    fn now_as_micros_is_after_2020() {
        assert!(now_as_micros() > 1_577_836_800_000_000);
    }
}
