//! Units formatting and conversion utilities
//!
//! Human-readable formatting of durations, latencies and operation rates
//! for the report table.

use std::time::Duration;

/// Format duration into human-readable string
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use pg_client_bench::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 3600 {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if total_secs >= 60 {
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 {
        if millis > 0 {
            format!("{}.{:02}s", total_secs, millis / 10)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        format!("{}ms", millis)
    }
}

/// Operations per second over a wall-clock interval
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use pg_client_bench::util::units::calculate_ops_per_sec;
///
/// let ops = calculate_ops_per_sec(1000, Duration::from_secs(1));
/// assert!((ops - 1000.0).abs() < 0.01);
/// ```
pub fn calculate_ops_per_sec(operations: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }

    operations as f64 / duration.as_secs_f64()
}

/// Format an operation rate with appropriate units
///
/// # Examples
/// ```
/// use pg_client_bench::util::units::format_ops;
///
/// assert_eq!(format_ops(1500.0), "1.5K ops/s");
/// assert_eq!(format_ops(2500000.0), "2.5M ops/s");
/// ```
pub fn format_ops(ops: f64) -> String {
    if ops >= 1_000_000.0 {
        format!("{:.1}M ops/s", ops / 1_000_000.0)
    } else if ops >= 1_000.0 {
        format!("{:.1}K ops/s", ops / 1_000.0)
    } else {
        format!("{:.0} ops/s", ops)
    }
}

/// Format latency duration with appropriate precision
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use pg_client_bench::util::units::format_latency;
///
/// assert_eq!(format_latency(Duration::from_millis(5)), "5.00ms");
/// assert_eq!(format_latency(Duration::from_micros(500)), "500μs");
/// ```
pub fn format_latency(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros >= 1_000_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if micros >= 1000 {
        let millis = micros as f64 / 1000.0;
        format!("{:.2}ms", millis)
    } else {
        format!("{}μs", micros)
    }
}
