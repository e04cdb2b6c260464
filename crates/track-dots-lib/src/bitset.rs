//! Growable bit set over `u32` indices
//!
//! [`BitSet`] is the membership structure used everywhere in the engine: retained
//! point indices per zoom level, visible tracks, color buckets and segment masks.
//! Storage is a vector of 32-bit words; words above the highest set bit may be
//! trimmed, so two sets compare equal regardless of trailing zero words.

use std::fmt;
use std::ops::Range;

const WORD_BITS: u32 = 32;

#[inline(always)]
fn word_index(i: u32) -> usize {
    (i / WORD_BITS) as usize
}

#[inline(always)]
fn bit_mask(i: u32) -> u32 {
    1 << (i % WORD_BITS)
}

/// Position of the `k`-th set bit (0-based) inside a single word.
#[inline]
fn select_in_word(mut word: u32, k: u32) -> u32 {
    for _ in 0..k {
        word &= word - 1;
    }
    word.trailing_zeros()
}

/// A set of non-negative integers stored as a bit vector
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitSet {
    words: Vec<u32>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl BitSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Create an empty set with storage preallocated for indices `0..bits`
    pub fn with_capacity(bits: u32) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(WORD_BITS) as usize),
        }
    }

    /// Create the set `{0, 1, ..., n - 1}`
    pub fn full(n: u32) -> Self {
        let mut words = vec![u32::MAX; (n / WORD_BITS) as usize];
        let rem = n % WORD_BITS;
        if rem > 0 {
            words.push((1 << rem) - 1);
        }
        Self { words }
    }

    /// Wrap raw words (bit `i` of word `w` represents `w * 32 + i`)
    pub fn from_words(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// Backing words
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[inline]
    fn ensure_word(&mut self, i: u32) -> &mut u32 {
        let w = word_index(i);
        if w >= self.words.len() {
            self.words.resize(w + 1, 0);
        }
        &mut self.words[w]
    }

    /// Insert `i`, growing storage as needed
    #[inline]
    pub fn add(&mut self, i: u32) -> &mut Self {
        *self.ensure_word(i) |= bit_mask(i);
        self
    }

    /// Remove `i` (no-op if absent)
    #[inline]
    pub fn remove(&mut self, i: u32) -> &mut Self {
        if let Some(word) = self.words.get_mut(word_index(i)) {
            *word &= !bit_mask(i);
        }
        self
    }

    /// Toggle membership of `i`, growing storage as needed
    #[inline]
    pub fn flip(&mut self, i: u32) -> &mut Self {
        *self.ensure_word(i) ^= bit_mask(i);
        self
    }

    /// Membership test
    #[inline]
    pub fn has(&self, i: u32) -> bool {
        self.words
            .get(word_index(i))
            .is_some_and(|word| word & bit_mask(i) != 0)
    }

    /// Number of elements (population count over all words)
    #[inline]
    pub fn size(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Drop zero words above the highest set bit
    pub fn trim(&mut self) -> &mut Self {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
        self
    }

    /// Smallest element
    pub fn min(&self) -> Option<u32> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i as u32 * WORD_BITS + w.trailing_zeros())
    }

    /// Largest element
    pub fn max(&self) -> Option<u32> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i as u32 * WORD_BITS + (WORD_BITS - 1 - w.leading_zeros()))
    }

    /// In-place union
    pub fn union(&mut self, other: &BitSet) -> &mut Self {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
        self
    }

    /// In-place intersection
    pub fn intersection(&mut self, other: &BitSet) -> &mut Self {
        for (i, a) in self.words.iter_mut().enumerate() {
            *a &= other.words.get(i).copied().unwrap_or(0);
        }
        self.trim()
    }

    /// In-place difference (`self \ other`)
    pub fn difference(&mut self, other: &BitSet) -> &mut Self {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !*b;
        }
        self.trim()
    }

    /// In-place symmetric difference
    pub fn symmetric_difference(&mut self, other: &BitSet) -> &mut Self {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a ^= *b;
        }
        self.trim()
    }

    pub fn new_union(&self, other: &BitSet) -> BitSet {
        let mut out = self.clone();
        out.union(other);
        out
    }

    pub fn new_intersection(&self, other: &BitSet) -> BitSet {
        let mut out = self.clone();
        out.intersection(other);
        out
    }

    pub fn new_difference(&self, other: &BitSet) -> BitSet {
        let mut out = self.clone();
        out.difference(other);
        out
    }

    pub fn new_symmetric_difference(&self, other: &BitSet) -> BitSet {
        let mut out = self.clone();
        out.symmetric_difference(other);
        out
    }

    /// True if the sets share at least one element (stops at the first shared word)
    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    /// True if every element of `self` is in `other`
    pub fn is_subset(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// True if any element lies in `range`
    pub fn any_in_range(&self, range: Range<u32>) -> bool {
        self.next_set_bit(range.start)
            .is_some_and(|i| i < range.end)
    }

    /// Smallest element `>= from`
    pub fn next_set_bit(&self, from: u32) -> Option<u32> {
        let mut w = word_index(from);
        let mut word = *self.words.get(w)? & (u32::MAX << (from % WORD_BITS));
        loop {
            if word != 0 {
                return Some(w as u32 * WORD_BITS + word.trailing_zeros());
            }
            w += 1;
            word = *self.words.get(w)?;
        }
    }

    /// Number of elements strictly below `i`
    pub fn rank(&self, i: u32) -> u32 {
        let w = word_index(i);
        let full: u32 = self.words.iter().take(w).map(|w| w.count_ones()).sum();
        let partial = self
            .words
            .get(w)
            .map_or(0, |word| (word & (bit_mask(i) - 1)).count_ones());
        full + partial
    }

    /// Element at ordinal position `k` of the ascending enumeration
    pub fn nth(&self, k: u32) -> Option<u32> {
        let mut remaining = k;
        for (i, &word) in self.words.iter().enumerate() {
            let count = word.count_ones();
            if remaining < count {
                return Some(i as u32 * WORD_BITS + select_in_word(word, remaining));
            }
            remaining -= count;
        }
        None
    }

    /// Call `f` with every element in ascending order
    pub fn for_each<F: FnMut(u32)>(&self, mut f: F) {
        for i in self.imap() {
            f(i);
        }
    }

    /// Lazy ascending iterator over the elements; each call starts from scratch
    #[inline]
    pub fn imap(&self) -> Iter<'_> {
        Iter::new(&self.words)
    }

    /// Translate ordinal positions through this set's enumeration.
    ///
    /// `subset` holds positions `k` within the ascending enumeration of `self`;
    /// the iterator yields the `k`-th element of `self` for each of them, in
    /// ascending order. Positions beyond `self.size()` end the iteration.
    /// Whole words of `self` are skipped by population count.
    pub fn imap_subset<'a>(&'a self, subset: &'a BitSet) -> SubsetIter<'a> {
        SubsetIter {
            words: &self.words,
            ordinals: subset.imap(),
            word_idx: 0,
            consumed: 0,
        }
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        let (short, long) = if self.words.len() <= other.words.len() {
            (&self.words, &other.words)
        } else {
            (&other.words, &self.words)
        };
        short == &long[..short.len()] && long[short.len()..].iter().all(|&w| w == 0)
    }
}

impl Eq for BitSet {}

impl BitSet {
    /// Alias of `==`, ignoring trailing zero words
    #[inline]
    pub fn equals(&self, other: &BitSet) -> bool {
        self == other
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.imap()).finish()
    }
}

impl FromIterator<u32> for BitSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = BitSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<u32> for BitSet {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        for i in iter {
            self.add(i);
        }
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = u32;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.imap()
    }
}

/// Ascending iterator over the elements of a [`BitSet`]
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    words: &'a [u32],
    word_idx: usize,
    current: u32,
}

impl<'a> Iter<'a> {
    fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            word_idx: 0,
            current: words.first().copied().unwrap_or(0),
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros();
                self.current &= self.current - 1;
                return Some(self.word_idx as u32 * WORD_BITS + bit);
            }
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
    }
}

impl std::iter::FusedIterator for Iter<'_> {}

/// Iterator returned by [`BitSet::imap_subset`]
#[derive(Clone, Debug)]
pub struct SubsetIter<'a> {
    words: &'a [u32],
    ordinals: Iter<'a>,
    word_idx: usize,
    /// Set bits in `words[..word_idx]`
    consumed: u32,
}

impl Iterator for SubsetIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let ordinal = self.ordinals.next()?;
        loop {
            let word = *self.words.get(self.word_idx)?;
            let count = word.count_ones();
            if ordinal < self.consumed + count {
                return Some(
                    self.word_idx as u32 * WORD_BITS
                        + select_in_word(word, ordinal - self.consumed),
                );
            }
            self.consumed += count;
            self.word_idx += 1;
        }
    }
}
