/// Helper utilities for formatting Docker stats and validating input

use chrono::{DateTime, Local, Utc};

/// Format bytes the way `docker stats` prints memory (binary units, e.g. "12.5MiB")
pub fn format_binary_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    scale_bytes(bytes, 1024.0, UNITS)
}

/// Format bytes the way `docker stats` prints net and block I/O (decimal units, e.g. "1.2kB")
pub fn format_decimal_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB", "TB"];
    scale_bytes(bytes, 1000.0, UNITS)
}

fn scale_bytes(bytes: u64, step: f64, units: &[&str]) -> String {
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= step && unit_index < units.len() - 1 {
        size /= step;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{}{}", bytes, units[unit_index])
    } else {
        format!("{:.2}{}", size, units[unit_index])
    }
}

/// Render a "used / total" pair as shown in the memory, net and block columns
pub fn format_pair(left: String, right: String) -> String {
    format!("{} / {}", left, right)
}

/// Parse a percentage as reported by `docker stats` ("12.50%") or a bare number
pub fn parse_percent(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format a UTC timestamp in local time for terminal output
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = (*ts).into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Truncate string with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Mask sensitive data (show only first and last N characters)
pub fn mask_sensitive(value: &str, visible_chars: usize) -> String {
    let count = value.chars().count();
    if count <= visible_chars * 2 {
        "*".repeat(count)
    } else {
        let start: String = value.chars().take(visible_chars).collect();
        let end: String = value.chars().skip(count - visible_chars).collect();
        format!("{}...{}", start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_binary_bytes() {
        assert_eq!(format_binary_bytes(512), "512B");
        assert_eq!(format_binary_bytes(1024), "1.00KiB");
        assert_eq!(format_binary_bytes(12 * 1024 * 1024), "12.00MiB");
        assert_eq!(format_binary_bytes(1073741824), "1.00GiB");
    }

    #[test]
    fn test_format_decimal_bytes() {
        assert_eq!(format_decimal_bytes(999), "999B");
        assert_eq!(format_decimal_bytes(1200), "1.20kB");
        assert_eq!(format_decimal_bytes(3_400_000), "3.40MB");
    }

    #[test]
    fn test_format_pair() {
        assert_eq!(
            format_pair(format_binary_bytes(1024), format_binary_bytes(1073741824)),
            "1.00KiB / 1.00GiB"
        );
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("12.50%"), Some(12.5));
        assert_eq!(parse_percent(" 0.00 % "), Some(0.0));
        assert_eq!(parse_percent("7"), Some(7.0));
        assert_eq!(parse_percent("%"), None);
        assert_eq!(parse_percent("n/a"), None);
        assert_eq!(parse_percent("NaN"), None);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("docketeerdb", 20), "docketeerdb");
        assert_eq!(truncate_string("a-very-long-container-name", 10), "a-very-...");
    }

    #[test]
    fn test_mask_sensitive() {
        let token = "5e7f294e4c92a9aa661fae8d347d832d";
        let masked = mask_sensitive(token, 4);
        assert_eq!(masked, "5e7f...832d");
        assert_eq!(mask_sensitive("short", 4), "*****");
    }

    #[test]
    fn test_mask_sensitive_multibyte() {
        assert_eq!(mask_sensitive("abcödefghijklmnop", 4), "abcö...mnop");
        assert_eq!(mask_sensitive("ööööö", 4), "*****");
    }
}
