//! Point reduction and its per-zoom cache
//!
//! Simplification runs in two passes over an index domain. A radial pass keeps a point
//! only if it lies farther than the tolerance from the last kept one; geo's
//! Ramer-Douglas-Peucker ([`SimplifyIdx`]) then refines the survivors, reporting their
//! ordinal positions. The final set is the radial set translated through the refined
//! ordinals with [`BitSet::imap_subset`].

use crate::BitSet;
use crate::utils::sq_dist;
use geo::{Coord, LineString, Point, SimplifyIdx};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Tolerance for `zoom`, in zoom-0 pixel units (one screen pixel at that zoom)
#[inline]
pub fn tolerance_for_zoom(zoom: u8) -> f64 {
    0.5f64.powi(zoom as i32)
}

/// Reusable scratch state for simplification
///
/// Keeping one `Simplifier` around avoids reallocating the ordinal table for every
/// track.
#[derive(Debug, Default)]
pub struct Simplifier {
    /// Absolute indices of the radial pass, by ordinal
    kept: Vec<u32>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Simplifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simplify the points `0..n`
    ///
    /// The result always contains `0` and `n - 1`. With `n <= 2` or a non-positive
    /// tolerance every point is kept.
    ///
    /// Results for different tolerances are not guaranteed to nest. Use
    /// [`SimplificationCache`] when coarser levels must be subsets of finer ones.
    pub fn simplify<F>(&mut self, point: F, n: u32, tolerance: f64) -> BitSet
    where
        F: Fn(u32) -> Point<f64>,
    {
        if n <= 2 || tolerance <= 0.0 {
            return BitSet::full(n);
        }
        self.simplify_subset(point, &BitSet::full(n), tolerance)
    }

    /// Simplify only the points in `domain`, returning a subset of it that keeps
    /// `domain`'s first and last element
    pub fn simplify_subset<F>(&mut self, point: F, domain: &BitSet, tolerance: f64) -> BitSet
    where
        F: Fn(u32) -> Point<f64>,
    {
        if domain.size() <= 2 || tolerance <= 0.0 {
            return domain.clone();
        }
        let sq_tolerance = tolerance * tolerance;

        let radial = self.radial_pass(&point, domain, sq_tolerance);
        if radial.size() <= 2 {
            return radial;
        }
        let refined = self.douglas_peucker(&point, tolerance);

        radial.imap_subset(&refined).collect()
    }

    /// First pass; also fills `self.kept` with the survivors in order
    fn radial_pass<F>(&mut self, point: &F, domain: &BitSet, sq_tolerance: f64) -> BitSet
    where
        F: Fn(u32) -> Point<f64>,
    {
        self.kept.clear();
        let mut radial = BitSet::with_capacity(domain.max().map_or(0, |m| m + 1));
        let mut last_kept: Option<Point<f64>> = None;
        let mut last = 0;

        for i in domain.imap() {
            last = i;
            let p = point(i);
            let keep = last_kept.is_none_or(|prev| sq_dist(p, prev) > sq_tolerance);
            if keep {
                radial.add(i);
                self.kept.push(i);
                last_kept = Some(p);
            }
        }

        if !radial.has(last) {
            radial.add(last);
            self.kept.push(last);
        }
        radial
    }

    /// Second pass over the ordinals of `self.kept`
    fn douglas_peucker<F>(&self, point: &F, tolerance: f64) -> BitSet
    where
        F: Fn(u32) -> Point<f64>,
    {
        let coords: Vec<Coord<f64>> = self.kept.iter().map(|&i| point(i).0).collect();
        let linestring = LineString::from(coords);
        linestring
            .simplify_idx(tolerance)
            .into_iter()
            .map(|k| k as u32)
            .collect()
    }
}

/// Simplify a plain point slice
///
/// Each call stands alone: the sets for two tolerances need not nest. The per-zoom
/// nesting comes from [`SimplificationCache`].
pub fn simplify_points(points: &[Point<f64>], tolerance: f64) -> BitSet {
    Simplifier::new().simplify(|i| points[i as usize], points.len() as u32, tolerance)
}

/// Retained point indices per zoom level of one track
///
/// Levels are nested: a coarser (lower) zoom always holds a subset of every finer
/// level. New levels are derived from the nearest finer cached level when there is
/// one, and every inserted set is reconciled with its neighbours, so the nesting
/// holds whatever order levels arrive in.
#[derive(Debug, Clone, Default)]
pub struct SimplificationCache {
    levels: BTreeMap<u8, BitSet>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SimplificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, zoom: u8) -> Option<&BitSet> {
        self.levels.get(&zoom)
    }

    #[inline]
    pub fn contains(&self, zoom: u8) -> bool {
        self.levels.contains_key(&zoom)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Cached zoom levels, ascending
    pub fn zooms(&self) -> impl Iterator<Item = u8> + '_ {
        self.levels.keys().copied()
    }

    /// Closest cached level strictly finer than `zoom`
    pub fn finer(&self, zoom: u8) -> Option<(u8, &BitSet)> {
        self.levels
            .range((Bound::Excluded(zoom), Bound::Unbounded))
            .next()
            .map(|(&z, set)| (z, set))
    }

    /// Closest cached level strictly coarser than `zoom`
    pub fn coarser(&self, zoom: u8) -> Option<(u8, &BitSet)> {
        self.levels
            .range(..zoom)
            .next_back()
            .map(|(&z, set)| (z, set))
    }

    /// Cached level closest to `zoom`, preferring the finer one on ties
    pub fn nearest(&self, zoom: u8) -> Option<(u8, &BitSet)> {
        if let Some(set) = self.levels.get(&zoom) {
            return Some((zoom, set));
        }
        match (self.finer(zoom), self.coarser(zoom)) {
            (Some(f), Some(c)) if zoom - c.0 < f.0 - zoom => Some(c),
            (Some(f), _) => Some(f),
            (None, c) => c,
        }
    }

    /// Store `set` for `zoom` unless the level is already cached; returns the cached set
    pub fn insert(&mut self, zoom: u8, mut set: BitSet) -> &BitSet {
        if !self.levels.contains_key(&zoom) {
            if let Some((_, finer)) = self.finer(zoom) {
                set.intersection(finer);
            }
            if let Some((_, coarser)) = self.coarser(zoom) {
                set.union(coarser);
            }
            set.trim();
            self.levels.insert(zoom, set);
        }
        &self.levels[&zoom]
    }

    /// Cached level for `zoom`, computing it on a miss
    ///
    /// `point` and `n` describe the full-resolution track.
    pub fn get_or_compute<F>(
        &mut self,
        zoom: u8,
        simplifier: &mut Simplifier,
        point: F,
        n: u32,
    ) -> &BitSet
    where
        F: Fn(u32) -> Point<f64>,
    {
        if !self.levels.contains_key(&zoom) {
            let tolerance = tolerance_for_zoom(zoom);
            let set = match self.finer(zoom) {
                Some((_, finer)) => simplifier.simplify_subset(&point, finer, tolerance),
                None => simplifier.simplify(&point, n, tolerance),
            };
            tracing::trace!(zoom, retained = set.size(), of = n, "simplified");
            return self.insert(zoom, set);
        }
        &self.levels[&zoom]
    }
}
