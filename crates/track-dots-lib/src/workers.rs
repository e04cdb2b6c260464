//! Background simplification
//!
//! Simplification is pure, so cache levels can be computed off the frame path. Jobs run
//! on the rayon pool and deposit their result in a shared `DashMap` keyed by
//! `(track epoch, zoom)`; the owner polls with [`SimplifyWorkers::drain_ready`] and never
//! waits. Epochs are unique per loaded track, so a late result for a removed track can
//! never land on a track that reused its slot.

use crate::BitSet;
use crate::simplify::{Simplifier, tolerance_for_zoom};
use dashmap::DashMap;
use geo::Point;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

type JobKey = (u64, u8);

/// A finished job
#[derive(Debug, Clone)]
pub struct Ready {
    pub slot: u32,
    pub epoch: u64,
    pub zoom: u8,
    pub set: BitSet,
}

/// Request/response front end to the rayon pool
#[derive(Debug, Default)]
pub struct SimplifyWorkers {
    results: Arc<DashMap<JobKey, BitSet>>,
    /// In-flight jobs and the slot their track occupies
    pending: HashMap<JobKey, u32>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SimplifyWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue simplification of `points` for `zoom`, restricted to `domain` when given.
    /// Returns `false` if the same job is already in flight.
    pub fn request(
        &mut self,
        slot: u32,
        epoch: u64,
        zoom: u8,
        points: Arc<Vec<Point<f64>>>,
        domain: Option<BitSet>,
    ) -> bool {
        let key = (epoch, zoom);
        if self.pending.contains_key(&key) {
            return false;
        }
        self.pending.insert(key, slot);

        let results = Arc::clone(&self.results);
        rayon::spawn(move || {
            let tolerance = tolerance_for_zoom(zoom);
            let point = |i: u32| points[i as usize];
            let mut simplifier = Simplifier::new();
            let set = match domain {
                Some(domain) => simplifier.simplify_subset(point, &domain, tolerance),
                None => simplifier.simplify(point, points.len() as u32, tolerance),
            };
            results.insert(key, set);
        });
        true
    }

    /// Collect finished jobs without blocking
    pub fn drain_ready(&mut self) -> SmallVec<[Ready; 8]> {
        let done: SmallVec<[JobKey; 8]> = self
            .pending
            .keys()
            .filter(|key| self.results.contains_key(*key))
            .copied()
            .collect();

        let mut ready = SmallVec::new();
        for key in done {
            let slot = self.pending.remove(&key);
            if let (Some(slot), Some((_, set))) = (slot, self.results.remove(&key)) {
                ready.push(Ready {
                    slot,
                    epoch: key.0,
                    zoom: key.1,
                    set,
                });
            }
        }

        // results of forgotten jobs that finished after the fact
        if self.results.len() > self.pending.len() {
            self.results.retain(|key, _| self.pending.contains_key(key));
        }
        ready
    }

    /// Abandon every job of the track with `epoch`
    pub fn forget(&mut self, epoch: u64) {
        self.pending.retain(|key, _| key.0 != epoch);
        self.results.retain(|key, _| key.0 != epoch);
    }

    /// Abandon everything
    pub fn clear(&mut self) {
        self.pending.clear();
        self.results.clear();
    }

    /// Number of jobs in flight or not yet drained
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, epoch: u64, zoom: u8) -> bool {
        self.pending.contains_key(&(epoch, zoom))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    /// Drain until nothing is pending, or give up after a few seconds
    pub(crate) fn drain_all(workers: &mut SimplifyWorkers) -> Vec<Ready> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut all = Vec::new();
        while workers.pending() > 0 && Instant::now() < deadline {
            all.extend(workers.drain_ready());
            std::thread::sleep(Duration::from_millis(1));
        }
        all
    }

    fn line(n: usize) -> Arc<Vec<Point<f64>>> {
        Arc::new((0..n).map(|i| Point::new(i as f64, 0.0)).collect())
    }

    #[test]
    fn test_request_and_drain() {
        let mut workers = SimplifyWorkers::new();
        assert!(workers.request(3, 11, 4, line(50), None));
        assert!(!workers.request(3, 11, 4, line(50), None));
        assert!(workers.is_pending(11, 4));

        let ready = drain_all(&mut workers);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].slot, 3);
        assert_eq!(ready[0].epoch, 11);
        assert_eq!(ready[0].zoom, 4);
        assert_eq!(ready[0].set.imap().collect::<Vec<_>>(), vec![0, 49]);
        assert_eq!(workers.pending(), 0);
    }

    #[test]
    fn test_domain_respected() {
        let mut workers = SimplifyWorkers::new();
        let domain: BitSet = [0u32, 10, 20, 30].into_iter().collect();
        workers.request(0, 1, 0, line(40), Some(domain.clone()));
        let ready = drain_all(&mut workers);
        assert!(ready[0].set.is_subset(&domain));
        assert!(ready[0].set.has(30));
    }

    #[test]
    fn test_forget_drops_results() {
        let mut workers = SimplifyWorkers::new();
        workers.request(0, 5, 2, line(100), None);
        workers.forget(5);
        assert_eq!(workers.pending(), 0);
        std::thread::sleep(Duration::from_millis(50));
        assert!(workers.drain_ready().is_empty());
    }
}
