//! Clip timestamp parsing (§6 "Time format (bit-exact)").
//!
//! Accepts `HH:MM:SS`, `HH:MM:SS.mmm`, or fractional-seconds `SS.mmm`.
//! Any other shape is rejected.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

static CLOCK_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,6}))?$").unwrap());

static FRACTIONAL_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:\.(\d{1,6}))?$").unwrap());

/// Parse a clip timestamp into seconds. Rejects anything that doesn't match
/// one of the two accepted shapes, naming the offending field in the error.
pub fn parse_clip_timestamp(field: &str, raw: &str) -> Result<f64, ConfigError> {
    if let Some(caps) = CLOCK_FORMAT.captures(raw) {
        let hours: f64 = caps[1].parse().unwrap();
        let minutes: f64 = caps[2].parse().unwrap();
        let seconds: f64 = caps[3].parse().unwrap();
        let millis: f64 = caps
            .get(4)
            .map(|m| format!("0.{}", m.as_str()).parse().unwrap())
            .unwrap_or(0.0);
        if minutes >= 60.0 || seconds >= 60.0 {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("minutes/seconds out of range in '{raw}'"),
            });
        }
        return Ok(hours * 3600.0 + minutes * 60.0 + seconds + millis);
    }

    if let Some(caps) = FRACTIONAL_SECONDS.captures(raw) {
        let whole: f64 = caps[1].parse().unwrap();
        let frac: f64 = caps
            .get(2)
            .map(|m| format!("0.{}", m.as_str()).parse().unwrap())
            .unwrap_or(0.0);
        return Ok(whole + frac);
    }

    Err(ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!(
            "'{raw}' is not a valid timestamp (expected HH:MM:SS, HH:MM:SS.mmm, or SS.mmm)"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clock_format() {
        assert_eq!(parse_clip_timestamp("x", "00:06:00").unwrap(), 360.0);
        assert_eq!(parse_clip_timestamp("x", "01:00:00.5").unwrap(), 3600.5);
    }

    #[test]
    fn parses_fractional_seconds() {
        assert_eq!(parse_clip_timestamp("x", "12.25").unwrap(), 12.25);
        assert_eq!(parse_clip_timestamp("x", "45").unwrap(), 45.0);
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(parse_clip_timestamp("x", "6:00").is_err());
        assert!(parse_clip_timestamp("x", "00:60:00").is_err());
        assert!(parse_clip_timestamp("x", "not-a-time").is_err());
        assert!(parse_clip_timestamp("x", "").is_err());
    }
}
