// src/gps/cgpsinfo.rs
//! `AT+CGPSINFO` reply parsing
//!
//! A fix line looks like
//! `+CGPSINFO: 3724.123456,N,12158.654321,W,151026,061023.0,10.5,2.0,`
//! and a modem without a fix answers `+CGPSINFO: ,,,,,,,,`.

use super::coord::{self, round_places, Hemisphere};
use super::data::FixFields;
use crate::error::{Result, TrackerError};
use log::{debug, warn};

/// Marker identifying the fix line in a reply
pub const FIX_MARKER: &[u8] = b"+CGPSINFO:";

/// Minimum number of comma-separated fields in a usable fix line
pub const MIN_FIELDS: usize = 8;

const KNOTS_TO_KMH: f64 = 1.852;

/// Split a raw reply snapshot into lines, dropping the line terminators
pub fn split_lines(raw: &[u8]) -> Vec<&[u8]> {
    raw.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .collect()
}

fn contains_marker(line: &[u8]) -> bool {
    line.windows(FIX_MARKER.len()).any(|w| w == FIX_MARKER)
}

/// Extract the fix from a modem reply.
///
/// Returns `None` when no line carries the fix marker, or when no marker line
/// holds a complete fix (fewer than eight fields or an empty coordinate).
pub fn parse_reply<L: AsRef<[u8]>>(lines: &[L]) -> Option<FixFields> {
    lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| contains_marker(line))
        .find_map(parse_fix_line)
}

fn parse_fix_line(line: &[u8]) -> Option<FixFields> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    let (_, payload) = text.split_once(':')?;
    let parts: Vec<&str> = payload.split(',').map(str::trim).collect();

    if parts.len() < MIN_FIELDS || parts[0].is_empty() || parts[2].is_empty() {
        debug!("No fix in reply: {}", text);
        return None;
    }

    match fields_from_parts(&parts) {
        Ok(fields) => Some(fields),
        Err(e) => {
            warn!("Ignoring unusable fix line '{}': {}", text, e);
            None
        }
    }
}

fn fields_from_parts(parts: &[&str]) -> Result<FixFields> {
    let latitude = decode_axis(parts[0], parts[1], true)?;
    let longitude = decode_axis(parts[2], parts[3], false)?;

    let altitude = if parts[6].is_empty() {
        None
    } else {
        Some(parse_number(parts[6], "altitude")?)
    };

    let speed_knots = if parts[7].is_empty() {
        0.0
    } else {
        parse_number(parts[7], "speed")?
    };
    if speed_knots < 0.0 {
        return Err(TrackerError::Parse(format!("negative speed '{}'", parts[7])));
    }

    Ok(FixFields {
        latitude,
        longitude,
        altitude,
        speed_kmh: round_places(speed_knots * KNOTS_TO_KMH, 2),
        date: parts[4].to_string(),
        time: parts[5].to_string(),
    })
}

fn decode_axis(dmm: &str, hemisphere: &str, latitude: bool) -> Result<f64> {
    let mut chars = hemisphere.chars();
    let letter = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => return Err(TrackerError::Parse(format!("invalid hemisphere '{}'", hemisphere))),
    };
    if Hemisphere::from_char(letter)?.is_latitude() != latitude {
        return Err(TrackerError::Parse(format!(
            "hemisphere '{}' does not qualify a {}",
            letter,
            if latitude { "latitude" } else { "longitude" }
        )));
    }

    let limit = if latitude { 90.0 } else { 180.0 };
    let value = coord::decode(dmm, letter)?
        .ok_or_else(|| TrackerError::Parse("empty coordinate".to_string()))?;
    if value.abs() > limit {
        return Err(TrackerError::Parse(format!("coordinate {} out of range", value)));
    }
    Ok(value)
}

fn parse_number(field: &str, name: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TrackerError::Parse(format!("invalid {} '{}'", name, field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIX_REPLY: &[u8] =
        b"AT+CGPSINFO\r\r\n+CGPSINFO: 3724.123456,N,12158.654321,W,151026,061023.0,10.5,,\r\n\r\nOK\r\n";

    #[test]
    fn test_split_lines() {
        let lines = split_lines(FIX_REPLY);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], b"AT+CGPSINFO\r");
        assert_eq!(lines[2], b"OK");
    }

    #[test]
    fn test_fix_without_speed() {
        let fix = parse_reply(&split_lines(FIX_REPLY)).unwrap();

        assert_eq!(fix.latitude, 37.402058);
        assert_eq!(fix.longitude, -121.977572);
        assert_eq!(fix.altitude, Some(10.5));
        assert_eq!(fix.speed_kmh, 0.0);
        assert_eq!(fix.date, "151026");
        assert_eq!(fix.time, "061023.0");
    }

    #[test]
    fn test_fix_with_speed() {
        let lines = ["+CGPSINFO: 3724.123456,N,12158.654321,W,151026,061023.0,10.5,2.0,"];
        let fix = parse_reply(&lines).unwrap();
        assert_eq!(fix.speed_kmh, 3.7);
    }

    #[test]
    fn test_missing_altitude() {
        let lines = ["+CGPSINFO: 3113.343286,N,12121.234064,E,250311,072809.3,,0.0,"];
        let fix = parse_reply(&lines).unwrap();
        assert_eq!(fix.altitude, None);
        assert_eq!(fix.latitude, 31.222388);
        assert_eq!(fix.longitude, 121.353901);
    }

    #[test]
    fn test_no_marker() {
        let lines = ["AT+CGPSINFO", "OK"];
        assert!(parse_reply(&lines).is_none());
        let empty: [&[u8]; 0] = [];
        assert!(parse_reply(&empty).is_none());
    }

    #[test]
    fn test_no_fix_reply() {
        let lines = ["+CGPSINFO: ,,,,,,,,", "OK"];
        assert!(parse_reply(&lines).is_none());
    }

    #[test]
    fn test_too_few_fields() {
        let lines = ["+CGPSINFO: 3724.123456,N,12158.654321,W,151026,061023.0,10.5"];
        assert!(parse_reply(&lines).is_none());
    }

    #[test]
    fn test_missing_one_coordinate() {
        let no_lat = ["+CGPSINFO: ,N,12158.654321,W,151026,061023.0,10.5,2.0,"];
        let no_lon = ["+CGPSINFO: 3724.123456,N,,W,151026,061023.0,10.5,2.0,"];
        assert!(parse_reply(&no_lat).is_none());
        assert!(parse_reply(&no_lon).is_none());
    }

    #[test]
    fn test_malformed_fields_rejected() {
        let swapped = ["+CGPSINFO: 3724.123456,E,12158.654321,N,151026,061023.0,10.5,2.0,"];
        let short_dmm = ["+CGPSINFO: 24.1234,N,12158.654321,W,151026,061023.0,10.5,2.0,"];
        let bad_alt = ["+CGPSINFO: 3724.123456,N,12158.654321,W,151026,061023.0,high,2.0,"];
        let bad_speed = ["+CGPSINFO: 3724.123456,N,12158.654321,W,151026,061023.0,10.5,-1,"];
        let out_of_range = ["+CGPSINFO: 9124.123456,N,12158.654321,W,151026,061023.0,10.5,2.0,"];

        for lines in [swapped, short_dmm, bad_alt, bad_speed, out_of_range] {
            assert!(parse_reply(&lines).is_none(), "accepted {}", lines[0]);
        }
    }

    #[test]
    fn test_first_valid_marker_line_wins() {
        let lines = [
            "+CGPSINFO: ,,,,,,,,",
            "+CGPSINFO: 3724.123456,N,12158.654321,W,151026,061023.0,10.5,2.0,",
        ];
        let fix = parse_reply(&lines).unwrap();
        assert_eq!(fix.latitude, 37.402058);
    }
}
