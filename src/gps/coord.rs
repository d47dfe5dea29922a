// src/gps/coord.rs
//! Degrees-and-minutes (DMM) to decimal degree conversion
//!
//! The modem reports coordinates as `dddmm.mmmmmm`: the integer degree count
//! followed by two integer minute digits and the minute fraction. Older firmware
//! prints four fraction digits, in which case the minutes field is exactly the
//! last seven characters.

use crate::error::{Result, TrackerError};

/// Width of the minutes field when the token has no decimal point
const MINUTES_WIDTH: usize = 7;

/// Decimal places kept in decoded coordinates
pub const COORDINATE_PLACES: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'N' => Ok(Hemisphere::North),
            'S' => Ok(Hemisphere::South),
            'E' => Ok(Hemisphere::East),
            'W' => Ok(Hemisphere::West),
            other => Err(TrackerError::Parse(format!("invalid hemisphere '{}'", other))),
        }
    }

    /// N/S hemispheres qualify a latitude, E/W a longitude
    pub fn is_latitude(self) -> bool {
        matches!(self, Hemisphere::North | Hemisphere::South)
    }

    fn sign(self) -> f64 {
        match self {
            Hemisphere::South | Hemisphere::West => -1.0,
            Hemisphere::North | Hemisphere::East => 1.0,
        }
    }
}

/// One axis of a DMM coordinate, split but not yet converted
struct RawFixToken<'a> {
    degrees: &'a str,
    minutes: &'a str,
}

impl<'a> RawFixToken<'a> {
    fn split(dmm: &'a str) -> Result<Self> {
        if !dmm.is_ascii() {
            return Err(TrackerError::Parse(format!("non-ASCII coordinate '{}'", dmm)));
        }

        let minutes_start = match dmm.find('.') {
            Some(dot) => dot.checked_sub(2),
            None => dmm.len().checked_sub(MINUTES_WIDTH),
        }
        .ok_or_else(|| TrackerError::Parse(format!("coordinate '{}' is too short", dmm)))?;

        let (degrees, minutes) = dmm.split_at(minutes_start);
        if degrees.is_empty() {
            return Err(TrackerError::Parse(format!("coordinate '{}' has no degree digits", dmm)));
        }

        Ok(Self { degrees, minutes })
    }

    fn to_decimal(&self) -> Result<f64> {
        if !self.degrees.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TrackerError::Parse(format!("invalid degrees '{}'", self.degrees)));
        }
        let degrees: u32 = self
            .degrees
            .parse()
            .map_err(|e| TrackerError::Parse(format!("invalid degrees '{}': {}", self.degrees, e)))?;

        // f64::from_str also accepts "inf", "1e3" and signs
        if !self.minutes.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            return Err(TrackerError::Parse(format!("invalid minutes '{}'", self.minutes)));
        }
        let minutes: f64 = self
            .minutes
            .parse()
            .map_err(|e| TrackerError::Parse(format!("invalid minutes '{}': {}", self.minutes, e)))?;
        if minutes >= 60.0 {
            return Err(TrackerError::Parse(format!("minutes out of range '{}'", self.minutes)));
        }

        Ok(degrees as f64 + minutes / 60.0)
    }
}

/// Round half away from zero to `places` decimals
pub fn round_places(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Convert a DMM token and hemisphere letter to signed decimal degrees.
///
/// An empty token means the modem has no fix yet and yields `Ok(None)`.
/// Malformed tokens are reported as [`TrackerError::Parse`].
pub fn decode(dmm: &str, hemisphere: char) -> Result<Option<f64>> {
    if dmm.is_empty() {
        return Ok(None);
    }

    let hemisphere = Hemisphere::from_char(hemisphere)?;
    let value = RawFixToken::split(dmm)?.to_decimal()?;

    Ok(Some(round_places(value * hemisphere.sign(), COORDINATE_PLACES)))
}
