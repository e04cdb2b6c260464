//! Compact encodings for track geometry and timestamps
//!
//! - [`polyline`]: signed-varint delta encoding of lat/lng pairs (5-bit groups)
//! - [`vbyte`]: 7-bit variable-byte integers with zig-zag helpers
//! - [`rle`]: run-length coding of successive differences
//! - [`stream`]: [`TimeStream`], RLE + VByte composed, with indexed random access

pub mod polyline;
pub mod rle;
pub mod stream;
pub mod vbyte;

pub use stream::TimeStream;

/// Errors raised while decoding malformed or truncated input
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("polyline ends inside a value group at byte {offset}")]
    TruncatedPolyline { offset: usize },

    #[error("invalid polyline byte {byte:#04x} at offset {offset}")]
    InvalidPolylineByte { offset: usize, byte: u8 },

    #[error("polyline value at byte {offset} is out of range")]
    PolylineOverflow { offset: usize },

    #[error("variable-byte value starting at byte {offset} is truncated")]
    TruncatedVByte { offset: usize },

    #[error("variable-byte value starting at byte {offset} does not fit in 32 bits")]
    VByteOverflow { offset: usize },

    #[error("run marker at item {offset} is missing its length or value")]
    TruncatedRun { offset: usize },

    #[error("run at item {offset} has invalid length {length}")]
    InvalidRunLength { offset: usize, length: i64 },

    #[error("running sum overflows at value {index}")]
    SumOverflow { index: usize },
}
