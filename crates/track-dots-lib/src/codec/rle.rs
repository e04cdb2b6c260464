//! Run-length coding of successive differences
//!
//! A monotone sequence is stored as its first value plus the differences
//! between neighbours. Three or more equal differences collapse into a run.
//! In list form a run is `Run(delta, count)` (`[delta, count]` when
//! serialized); in the flat form it is the triple `0, count, delta`.
//!
//! `0` is reserved as the flat run marker. A literal zero difference (a
//! repeated timestamp) is therefore always written as a run of `0`s, even a
//! run of one, so the marker never appears as a plain value.

use super::DecodeError;

/// Flat-stream marker introducing `count, delta`
pub const RUN_MARKER: i64 = 0;

/// Shortest run of equal non-zero differences worth collapsing
pub const MIN_RUN: u32 = 3;

/// One element of the list form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum RleItem {
    Delta(i64),
    /// `count` repetitions of `delta`
    Run(i64, u32),
}

impl RleItem {
    /// Number of output values this item produces
    #[inline]
    pub fn len(&self) -> u32 {
        match self {
            RleItem::Delta(_) => 1,
            RleItem::Run(_, count) => *count,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode a sequence (its first value is implied and not part of the output)
///
/// Differences beyond the `i64` range saturate.
pub fn encode(values: &[i64]) -> Vec<RleItem> {
    let mut items = Vec::new();
    let mut deltas = values.windows(2).map(|w| w[1].saturating_sub(w[0])).peekable();
    while let Some(delta) = deltas.next() {
        let mut count = 1u32;
        while deltas.peek() == Some(&delta) {
            deltas.next();
            count += 1;
        }
        if delta == RUN_MARKER || count >= MIN_RUN {
            items.push(RleItem::Run(delta, count));
        } else {
            items.extend(std::iter::repeat_n(RleItem::Delta(delta), count as usize));
        }
    }
    items
}

/// Flat form of `items`
pub fn flatten(items: &[RleItem]) -> Vec<i64> {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match *item {
            RleItem::Delta(delta) => flat.push(delta),
            RleItem::Run(delta, count) => flat.extend([RUN_MARKER, count as i64, delta]),
        }
    }
    flat
}

/// Lazily rebuild the sequence `first, first + d0, ...` from list items
pub fn decode_list(first: i64, items: &[RleItem]) -> ListDecoder<'_> {
    RunningSum::new(first, ListItems(items.iter()))
}

/// Lazily rebuild the sequence from a flat stream. Yields an error if a run
/// marker is truncated or carries a non-positive length.
pub fn decode_buf(first: i64, flat: &[i64]) -> BufDecoder<'_> {
    let source: fn(&i64) -> Result<i64, DecodeError> = |v| Ok(*v);
    RunningSum::new(first, FlatItems::new(flat.iter().map(source)))
}

pub type ListDecoder<'a> = RunningSum<ListItems<'a>>;

pub type BufDecoder<'a> = RunningSum<
    FlatItems<std::iter::Map<std::slice::Iter<'a, i64>, fn(&i64) -> Result<i64, DecodeError>>>,
>;

/// Items of the list form as an infallible item source
#[derive(Debug, Clone)]
pub struct ListItems<'a>(std::slice::Iter<'a, RleItem>);

impl Iterator for ListItems<'_> {
    type Item = Result<RleItem, DecodeError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().copied().map(Ok)
    }
}

/// Parses flat values (`delta` or `0, count, delta`) into [`RleItem`]s
#[derive(Debug, Clone)]
pub struct FlatItems<I> {
    values: I,
    position: usize,
    failed: bool,
}

impl<I> FlatItems<I>
where
    I: Iterator<Item = Result<i64, DecodeError>>,
{
    pub fn new(values: I) -> Self {
        Self {
            values,
            position: 0,
            failed: false,
        }
    }

    fn take_value(&mut self, marker_at: usize) -> Result<i64, DecodeError> {
        self.position += 1;
        self.values
            .next()
            .unwrap_or(Err(DecodeError::TruncatedRun { offset: marker_at }))
    }

    fn parse(&mut self, first: i64) -> Result<RleItem, DecodeError> {
        if first != RUN_MARKER {
            return Ok(RleItem::Delta(first));
        }
        let marker_at = self.position - 1;
        let length = self.take_value(marker_at)?;
        let delta = self.take_value(marker_at)?;
        match u32::try_from(length) {
            Ok(count) if count > 0 => Ok(RleItem::Run(delta, count)),
            _ => Err(DecodeError::InvalidRunLength {
                offset: marker_at,
                length,
            }),
        }
    }
}

impl<I> Iterator for FlatItems<I>
where
    I: Iterator<Item = Result<i64, DecodeError>>,
{
    type Item = Result<RleItem, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let first = self.values.next()?;
        self.position += 1;
        let item = first.and_then(|v| self.parse(v));
        self.failed = item.is_err();
        Some(item)
    }
}

/// Running sum over an item source, starting with `first`
#[derive(Debug, Clone)]
pub struct RunningSum<S> {
    items: S,
    first: Option<i64>,
    value: i64,
    /// Index of `value` in the sequence
    index: usize,
    run: Option<(i64, u32)>,
    failed: bool,
}

impl<S> RunningSum<S>
where
    S: Iterator<Item = Result<RleItem, DecodeError>>,
{
    pub fn new(first: i64, items: S) -> Self {
        Self {
            items,
            first: Some(first),
            value: first,
            index: 0,
            run: None,
            failed: false,
        }
    }

    fn advance(&mut self, delta: i64) -> Result<i64, DecodeError> {
        self.index += 1;
        self.value = self
            .value
            .checked_add(delta)
            .ok_or(DecodeError::SumOverflow { index: self.index })?;
        Ok(self.value)
    }
}

impl<S> Iterator for RunningSum<S>
where
    S: Iterator<Item = Result<RleItem, DecodeError>>,
{
    type Item = Result<i64, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(first) = self.first.take() {
            return Some(Ok(first));
        }
        if self.failed {
            return None;
        }
        let next = match self.run {
            Some((delta, remaining)) => {
                self.run = (remaining > 1).then_some((delta, remaining - 1));
                self.advance(delta)
            }
            None => match self.items.next()? {
                Ok(RleItem::Delta(delta)) => self.advance(delta),
                Ok(RleItem::Run(delta, count)) => {
                    self.run = (count > 1).then_some((delta, count - 1));
                    self.advance(delta)
                }
                Err(e) => Err(e),
            },
        };
        self.failed = next.is_err();
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_list_reference() {
        let items = [RleItem::Delta(1), RleItem::Run(2, 6), RleItem::Delta(5)];
        let values: Vec<i64> = decode_list(0, &items).collect::<Result<_, _>>().unwrap();
        assert_eq!(values, vec![0, 1, 3, 5, 7, 9, 11, 13, 18]);
    }

    #[test]
    fn test_decode_buf_reference() {
        let flat = [1, 0, 6, 2, 5];
        let values: Vec<i64> = decode_buf(0, &flat).collect::<Result<_, _>>().unwrap();
        assert_eq!(values, vec![0, 1, 3, 5, 7, 9, 11, 13, 18]);
    }

    #[test]
    fn test_encode_reference() {
        let values = [0, 1, 3, 5, 7, 9, 11, 13, 18];
        let items = encode(&values);
        assert_eq!(
            items,
            vec![RleItem::Delta(1), RleItem::Run(2, 6), RleItem::Delta(5)]
        );
        assert_eq!(flatten(&items), vec![1, 0, 6, 2, 5]);
    }

    #[test]
    fn test_short_repeats_stay_literal() {
        let items = encode(&[0, 4, 8, 9]);
        assert_eq!(
            items,
            vec![RleItem::Delta(4), RleItem::Delta(4), RleItem::Delta(1)]
        );
    }

    #[test]
    fn test_zero_delta_is_always_a_run() {
        let values = [10, 10, 11];
        let items = encode(&values);
        assert_eq!(items, vec![RleItem::Run(0, 1), RleItem::Delta(1)]);
        let flat = flatten(&items);
        assert_eq!(flat, vec![0, 1, 0, 1]);
        let decoded: Vec<i64> = decode_buf(10, &flat).collect::<Result<_, _>>().unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_single_value_and_empty() {
        assert!(encode(&[42]).is_empty());
        assert!(encode(&[]).is_empty());
        let values: Vec<i64> = decode_list(42, &[]).collect::<Result<_, _>>().unwrap();
        assert_eq!(values, vec![42]);
    }

    #[test]
    fn test_truncated_run_is_an_error() {
        let results: Vec<_> = decode_buf(0, &[1, 0, 6]).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[2], Err(DecodeError::TruncatedRun { offset: 1 }));
    }

    #[test]
    fn test_invalid_run_length_is_an_error() {
        let err = decode_buf(0, &[0, -2, 1]).find_map(|r| r.err()).unwrap();
        assert_eq!(
            err,
            DecodeError::InvalidRunLength {
                offset: 0,
                length: -2
            }
        );
    }

    #[test]
    fn test_sum_overflow_is_an_error() {
        let items = [RleItem::Delta(1), RleItem::Delta(5)];
        let results: Vec<_> = decode_list(i64::MAX - 1, &items).collect();
        assert_eq!(
            results,
            vec![
                Ok(i64::MAX - 1),
                Ok(i64::MAX),
                Err(DecodeError::SumOverflow { index: 2 })
            ]
        );

        let err = decode_buf(i64::MIN, &[0, 3, -1]).find_map(|r| r.err()).unwrap();
        assert_eq!(err, DecodeError::SumOverflow { index: 1 });
    }

    #[test]
    fn test_item_len() {
        assert_eq!(RleItem::Delta(3).len(), 1);
        assert_eq!(RleItem::Run(3, 7).len(), 7);
    }
}
