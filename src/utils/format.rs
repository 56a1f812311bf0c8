//! Small formatting helpers shared by the banners and traversal layers

use std::time::Duration;

/// Render an elapsed duration the way the completion banner shows it
/// (`850ms`, `12.4s`, `3m 05s`, `1h 02m 09s`)
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs == 0 {
        return format!("{}ms", elapsed.as_millis());
    }
    if secs < 60 {
        return format!("{:.1}s", elapsed.as_secs_f64());
    }
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

/// Zero-pad a 1-based position to the width needed for `total` items (at least 2)
pub fn pad_position(position: usize, total: usize) -> String {
    let width = total.to_string().len().max(2);
    format!("{:0width$}", position, width = width)
}

/// Human readable byte count for logs
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Duration::from_millis(12_400)), "12.4s");
        assert_eq!(format_elapsed(Duration::from_secs(185)), "3m 05s");
        assert_eq!(format_elapsed(Duration::from_secs(3729)), "1h 02m 09s");
    }

    #[test]
    fn test_pad_position() {
        assert_eq!(pad_position(3, 9), "03");
        assert_eq!(pad_position(7, 120), "007");
        assert_eq!(pad_position(12, 12), "12");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1_048_576), "3.0 MB");
    }
}
