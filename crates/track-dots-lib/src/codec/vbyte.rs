//! Variable-byte integer coding
//!
//! Seven payload bits per byte, least significant group first; the high bit is
//! set on every byte except the last of a value. Signed values go through
//! zig-zag mapping first so small magnitudes stay short.

use super::DecodeError;

const PAYLOAD_MASK: u8 = 0x7f;
const CONTINUE: u8 = 0x80;

/// Bytes needed for `value`
#[inline]
pub fn encoded_len(value: u32) -> usize {
    if value < 1 << 7 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 21 {
        3
    } else if value < 1 << 28 {
        4
    } else {
        5
    }
}

/// Size of `compress(values)` without producing it
pub fn compressed_size_in_bytes(values: &[u32]) -> usize {
    values.iter().map(|&v| encoded_len(v)).sum()
}

#[inline]
pub fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

#[inline]
pub fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Append one value to `out`
#[inline]
pub fn push(out: &mut Vec<u8>, mut value: u32) {
    while value >= CONTINUE as u32 {
        out.push((value as u8 & PAYLOAD_MASK) | CONTINUE);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn compress(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(compressed_size_in_bytes(values));
    for &v in values {
        push(&mut out, v);
    }
    out
}

pub fn uncompress(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    Reader::new(bytes).collect()
}

pub fn compress_signed(values: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len());
    for &v in values {
        push(&mut out, zigzag_encode(v));
    }
    out
}

pub fn uncompress_signed(bytes: &[u8]) -> Result<Vec<i32>, DecodeError> {
    Reader::new(bytes).map(|v| v.map(zigzag_decode)).collect()
}

/// Lazy value reader; stops after the first error
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Byte offset of the next value
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn read(&mut self) -> Result<u32, DecodeError> {
        let start = self.pos;
        let mut value: u32 = 0;
        let mut shift = 0u32;
        loop {
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Err(DecodeError::TruncatedVByte { offset: start });
            };
            self.pos += 1;
            let payload = (byte & PAYLOAD_MASK) as u32;
            if shift == 28 && (payload > 0x0f || byte & CONTINUE != 0) {
                return Err(DecodeError::VByteOverflow { offset: start });
            }
            value |= payload << shift;
            if byte & CONTINUE == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }
}

impl Iterator for Reader<'_> {
    type Item = Result<u32, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let value = self.read();
        if value.is_err() {
            self.pos = self.bytes.len();
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_thresholds() {
        for (value, len) in [
            (0, 1),
            (127, 1),
            (128, 2),
            ((1 << 14) - 1, 2),
            (1 << 14, 3),
            ((1 << 21) - 1, 3),
            (1 << 21, 4),
            ((1 << 28) - 1, 4),
            (1 << 28, 5),
            (u32::MAX, 5),
        ] {
            assert_eq!(encoded_len(value), len, "value {value}");
            assert_eq!(compress(&[value]).len(), len, "value {value}");
        }
    }

    #[test]
    fn test_compressed_size_matches_compress() {
        let values = [0, 1, 300, 70_000, 1 << 22, u32::MAX, 5];
        assert_eq!(compressed_size_in_bytes(&values), compress(&values).len());
    }

    #[test]
    fn test_roundtrip() {
        let values = vec![0, 1, 127, 128, 16_383, 16_384, 1 << 30, u32::MAX];
        assert_eq!(uncompress(&compress(&values)).unwrap(), values);
    }

    #[test]
    fn test_known_bytes() {
        assert_eq!(compress(&[300]), vec![0xac, 0x02]);
        assert_eq!(compress(&[1]), vec![0x01]);
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        for v in [0, 1, -1, 63, -64, i32::MAX, i32::MIN] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn test_signed_roundtrip() {
        let values = vec![0, -1, 5, -300, i32::MIN, i32::MAX];
        assert_eq!(uncompress_signed(&compress_signed(&values)).unwrap(), values);
    }

    #[test]
    fn test_truncated_buffer_is_an_error() {
        let mut bytes = compress(&[5, 300]);
        bytes.pop();
        assert_eq!(
            uncompress(&bytes),
            Err(DecodeError::TruncatedVByte { offset: 1 })
        );
    }

    #[test]
    fn test_overflow_is_an_error() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x7f];
        assert_eq!(
            uncompress(&bytes),
            Err(DecodeError::VByteOverflow { offset: 0 })
        );
    }

    #[test]
    fn test_reader_stops_after_error() {
        let mut reader = Reader::new(&[0x80]);
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }
}
