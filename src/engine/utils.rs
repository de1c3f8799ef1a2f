use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

/// `MM:SS`, minutes keep growing past 99.
pub fn format_clock(elapsed_ms: u64) -> String {
    let minutes = elapsed_ms / 60_000;
    let seconds = (elapsed_ms % 60_000) / 1_000;
    format!("{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_pads_minutes_and_seconds() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(999), "00:00");
        assert_eq!(format_clock(61_500), "01:01");
        assert_eq!(format_clock(10 * 60_000 + 59_999), "10:59");
        assert_eq!(format_clock(125 * 60_000), "125:00");
    }
}
