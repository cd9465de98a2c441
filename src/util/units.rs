//! Units formatting and conversion utilities

use std::time::Duration;

const MIB: f64 = 1_048_576.0;

/// Shortest elapsed time used in a throughput division
pub const MIN_ELAPSED: Duration = Duration::from_micros(1);

/// Format bytes into human-readable size with binary units
///
/// # Examples
/// ```
/// use usbspeed::util::units::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1048576), "1.0 MiB");
/// assert_eq!(format_bytes(10 * 1048576), "10.0 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    const THRESHOLD: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Calculate throughput in MB/s (MiB per second)
///
/// Elapsed time is floored at [`MIN_ELAPSED`] so the result is always finite.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use usbspeed::util::units::calculate_throughput_mbps;
///
/// let throughput = calculate_throughput_mbps(10 * 1048576, Duration::from_secs(2));
/// assert!((throughput - 5.0).abs() < 0.01);
/// ```
pub fn calculate_throughput_mbps(bytes: u64, duration: Duration) -> f64 {
    let duration_secs = duration.max(MIN_ELAPSED).as_secs_f64();
    bytes as f64 / MIB / duration_secs
}

/// Format throughput value with appropriate units
///
/// # Examples
/// ```
/// use usbspeed::util::units::format_throughput;
///
/// assert_eq!(format_throughput(1536.0), "1.5 GB/s");
/// assert_eq!(format_throughput(42.127), "42.13 MB/s");
/// ```
pub fn format_throughput(mbps: f64) -> String {
    if mbps >= 1024.0 {
        format!("{:.1} GB/s", mbps / 1024.0)
    } else {
        format!("{:.2} MB/s", mbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_floor() {
        let fast = calculate_throughput_mbps(1_048_576, Duration::ZERO);
        assert!(fast.is_finite());
        assert!((fast - 1_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_throughput_rates() {
        let ten_mib = 10 * 1_048_576;
        assert!((calculate_throughput_mbps(ten_mib, Duration::from_millis(200)) - 50.0).abs() < 1e-9);
        assert!((calculate_throughput_mbps(ten_mib, Duration::from_millis(125)) - 80.0).abs() < 1e-9);
        assert_eq!(calculate_throughput_mbps(0, Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}
