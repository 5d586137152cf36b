//! Human-readable byte counts for log lines and rejection hints.

/// Format a byte count into IEC units, trimming trailing zeros.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let precision = if value >= 10.0 { 1 } else { 2 };
    let mut rendered = format!("{value:.precision$}");
    if let Some(stripped) = rendered.trim_end_matches('0').strip_suffix('.') {
        rendered = stripped.to_string();
    } else {
        rendered = rendered.trim_end_matches('0').to_string();
    }

    format!("{rendered} {}", UNITS[unit])
}
