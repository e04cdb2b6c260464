//! Compressed timestamp streams
//!
//! A [`TimeStream`] stores a monotone non-decreasing integer sequence as its
//! first value plus the flat RLE stream of differences, zig-zagged and
//! variable-byte packed. The stream is validated once when built, so reading
//! it back never fails. [`TimeStream::select`] reads only the requested
//! indices, stepping over whole runs arithmetically.

use super::DecodeError;
use super::rle::{self, FlatItems, RleItem, RunningSum};
use super::vbyte;
use crate::bitset::{self, BitSet};
use crate::{DataError, Result};

/// Zig-zag decoded values of a variable-byte buffer
#[derive(Debug, Clone)]
struct SignedValues<'a>(vbyte::Reader<'a>);

impl Iterator for SignedValues<'_> {
    type Item = std::result::Result<i64, DecodeError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0
            .next()
            .map(|v| v.map(|u| vbyte::zigzag_decode(u) as i64))
    }
}

fn items(bytes: &[u8]) -> FlatItems<SignedValues<'_>> {
    FlatItems::new(SignedValues(vbyte::Reader::new(bytes)))
}

/// Monotone integer sequence in RLE + VByte form
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeStream {
    first: i64,
    last: i64,
    len: u32,
    bytes: Vec<u8>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TimeStream {
    /// Compress a plain, non-decreasing sequence
    pub fn encode(times: &[i64]) -> Result<Self> {
        let Some(&first) = times.first() else {
            return Ok(Self {
                first: 0,
                last: 0,
                len: 0,
                bytes: Vec::new(),
            });
        };
        if let Some(index) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(DataError::NonMonotonicTimes { index: index + 1 });
        }
        Self::from_items(first, &rle::encode(times))
    }

    /// Compress a sequence given in RLE list form
    pub fn from_items(first: i64, items: &[RleItem]) -> Result<Self> {
        let flat = rle::flatten(items);
        let mut bytes = Vec::with_capacity(flat.len());
        for (index, value) in flat.into_iter().enumerate() {
            let value = i32::try_from(value).map_err(|_| DataError::DeltaOverflow { index })?;
            vbyte::push(&mut bytes, vbyte::zigzag_encode(value));
        }
        Self::from_compressed(first, bytes)
    }

    /// Adopt an already compressed buffer, validating it in one pass
    pub fn from_compressed(first: i64, bytes: Vec<u8>) -> Result<Self> {
        let mut len: u32 = 0;
        let mut last = first;
        for (index, value) in RunningSum::new(first, items(&bytes)).enumerate() {
            let value = value?;
            if value < last {
                return Err(DataError::NonMonotonicTimes { index });
            }
            last = value;
            len = len.checked_add(1).ok_or(DataError::TooManyPoints)?;
        }
        Ok(Self {
            first,
            last,
            len,
            bytes,
        })
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn first(&self) -> i64 {
        self.first
    }

    #[inline]
    pub fn last(&self) -> i64 {
        self.last
    }

    /// `last - first`
    #[inline]
    pub fn duration(&self) -> i64 {
        self.last - self.first
    }

    /// Packed difference stream (without the first value)
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn compressed_size_in_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Lazy iterator over every value
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: RunningSum::new(self.first, items(&self.bytes)),
            remaining: self.len,
        }
    }

    pub fn to_vec(&self) -> Vec<i64> {
        self.iter().collect()
    }

    /// Values at the indices in `indices`, ascending, without materializing
    /// the others. Indices past the end stop the iteration.
    pub fn select<'a>(&'a self, indices: &'a BitSet) -> Select<'a> {
        Select {
            items: items(&self.bytes),
            targets: indices.imap(),
            pos: 0,
            value: self.first,
            run: None,
            len: self.len,
        }
    }

    /// Value at index `i`
    pub fn get(&self, i: u32) -> Option<i64> {
        let mut one = BitSet::new();
        one.add(i);
        self.select(&one).next()
    }
}

/// Iterator returned by [`TimeStream::iter`]
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    inner: RunningSum<FlatItems<SignedValues<'a>>>,
    remaining: u32,
}

impl Iterator for Iter<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let value = self.inner.next()?;
        debug_assert!(value.is_ok(), "validated time stream failed to decode");
        value.ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

/// Iterator returned by [`TimeStream::select`]
#[derive(Debug, Clone)]
pub struct Select<'a> {
    items: FlatItems<SignedValues<'a>>,
    targets: bitset::Iter<'a>,
    /// Index of `value` in the full sequence
    pos: u32,
    value: i64,
    /// Pending `(delta, remaining)` of a partially consumed run
    run: Option<(i64, u32)>,
    len: u32,
}

impl Iterator for Select<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let target = self.targets.next()?;
        if target >= self.len {
            return None;
        }
        debug_assert!(target >= self.pos, "selection must be ascending");
        loop {
            if self.pos == target {
                return Some(self.value);
            }
            if let Some((delta, remaining)) = self.run {
                let step = (target - self.pos).min(remaining);
                self.value = delta
                    .checked_mul(step as i64)
                    .and_then(|jump| self.value.checked_add(jump))?;
                self.pos += step;
                self.run = (remaining > step).then_some((delta, remaining - step));
                continue;
            }
            match self.items.next()? {
                Ok(RleItem::Delta(delta)) => {
                    self.value = self.value.checked_add(delta)?;
                    self.pos += 1;
                }
                Ok(RleItem::Run(delta, count)) => self.run = Some((delta, count)),
                Err(_) => return None,
            }
        }
    }
}
