pub fn parse_port(raw: Option<&str>) -> Option<u16> {
    raw.and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
}

pub fn parse_seed(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .map(|seed| seed as u32)
}

pub fn parse_flag(raw: Option<&str>) -> bool {
    match raw {
        None => false,
        Some(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
    }
}

/// Readings outside a physically meaningful range are dropped.
pub fn sanitize_tilt(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(-180.0, 180.0))
}
