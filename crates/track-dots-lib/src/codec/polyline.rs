//! Encoded polyline geometry
//!
//! Each coordinate is stored as the signed difference from the previous one,
//! scaled by `10^precision`, zig-zagged through the low bit and split into 5-bit
//! groups offset by 63 (`0x20` marks a continuation). Values are limited to the
//! 32-bit range the format is defined for.

use super::DecodeError;
use crate::{DataError, Result};
use geo::{Coord, Point};

/// Precision used by the common encoded-polyline format
pub const DEFAULT_PRECISION: u32 = 5;

const OFFSET: u8 = 63;
const CONTINUATION: i64 = 0x20;
const GROUP_MASK: i64 = 0x1f;
/// Shift of the last group a zig-zagged 32-bit value can need
const MAX_SHIFT: u32 = 30;

#[inline]
fn factor(precision: u32) -> f64 {
    10f64.powi(precision as i32)
}

/// Lazily decode `encoded` into `(lat, lng)` pairs.
///
/// The iterator is single-pass; call again to restart. It yields at most one
/// error and then stops.
pub fn decode(encoded: &str, precision: u32) -> Decoder<'_> {
    Decoder {
        bytes: encoded.as_bytes(),
        pos: 0,
        lat: 0,
        lng: 0,
        factor: factor(precision),
        failed: false,
    }
}

/// Number of coordinate pairs in `encoded`, counted from the group terminators
/// without decoding any value.
pub fn length_in_points(encoded: &str) -> usize {
    encoded
        .bytes()
        .filter(|&b| b.wrapping_sub(OFFSET) < CONTINUATION as u8)
        .count()
        / 2
}

/// Decode `encoded` into projected points.
///
/// `count` caps the output; without it the whole string is decoded into a buffer
/// presized with [`length_in_points`]. `project` maps `(lat, lng)` to the caller's
/// pixel space.
pub fn decode_to_buffer<F>(
    encoded: &str,
    count: Option<usize>,
    precision: u32,
    mut project: F,
) -> std::result::Result<Vec<Point<f64>>, DecodeError>
where
    F: FnMut(f64, f64) -> Point<f64>,
{
    let capacity = count.unwrap_or_else(|| length_in_points(encoded));
    let mut points = Vec::with_capacity(capacity);
    for pair in decode(encoded, precision).take(count.unwrap_or(usize::MAX)) {
        let (lat, lng) = pair?;
        points.push(project(lat, lng));
    }
    Ok(points)
}

/// Encode `(lat, lng)` pairs
///
/// Coordinates outside the valid latitude/longitude range are rejected.
pub fn encode<I>(coords: I, precision: u32) -> Result<String>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let line = coords.into_iter().map(|(lat, lng)| Coord { x: lng, y: lat });
    ::polyline::encode_coordinates(line, precision)
        .map_err(|e| DataError::InvalidCoordinate(e.to_string()))
}

/// Iterator returned by [`decode`]
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    lat: i64,
    lng: i64,
    factor: f64,
    failed: bool,
}

impl Decoder<'_> {
    fn read_value(&mut self) -> std::result::Result<i64, DecodeError> {
        let start = self.pos;
        let mut result: i64 = 0;
        let mut shift = 0u32;
        loop {
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Err(DecodeError::TruncatedPolyline { offset: self.pos });
            };
            if !(OFFSET..=OFFSET + 63).contains(&byte) {
                return Err(DecodeError::InvalidPolylineByte {
                    offset: self.pos,
                    byte,
                });
            }
            if shift > MAX_SHIFT {
                return Err(DecodeError::PolylineOverflow { offset: start });
            }
            let chunk = (byte - OFFSET) as i64;
            self.pos += 1;
            result |= (chunk & GROUP_MASK) << shift;
            shift += 5;
            if chunk < CONTINUATION {
                break;
            }
        }
        if result > i64::from(u32::MAX) {
            return Err(DecodeError::PolylineOverflow { offset: start });
        }
        Ok(if result & 1 != 0 {
            !(result >> 1)
        } else {
            result >> 1
        })
    }

    fn read_pair(&mut self) -> std::result::Result<(f64, f64), DecodeError> {
        let start = self.pos;
        let dlat = self.read_value()?;
        let dlng = self.read_value()?;
        let overflow = DecodeError::PolylineOverflow { offset: start };
        self.lat = self.lat.checked_add(dlat).ok_or(overflow)?;
        self.lng = self.lng.checked_add(dlng).ok_or(overflow)?;
        Ok((self.lat as f64 / self.factor, self.lng as f64 / self.factor))
    }
}

impl Iterator for Decoder<'_> {
    type Item = std::result::Result<(f64, f64), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        let pair = self.read_pair();
        self.failed = pair.is_err();
        Some(pair)
    }
}
