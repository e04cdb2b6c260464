//! Per-frame dot generation
//!
//! Every track carries one dot per animation period: dots sit at track times
//! `t = j * period + offset` for integer `j`, where the offset follows the shared clock
//! (`offset = (speed_scale * (now - track_start)) mod period`). A segment spanning
//! `[t_a, t_b)` owns the samples with `t_a <= t < t_b`, so a sample on a shared
//! endpoint is drawn exactly once, by the later segment. Segments with `t_b <= t_a`
//! own no samples.

use crate::track::SegmentSpan;
use crate::viewbox::Transform;
use geo::Point;

/// Shared animation clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotClock {
    /// Seconds of track time between consecutive dots
    pub period: f64,
    /// Track seconds advanced per clock second
    pub speed_scale: f64,
}

impl DotClock {
    pub fn new(period: f64, speed_scale: f64) -> Self {
        Self {
            period,
            speed_scale,
        }
    }

    /// Phase of the dot train in `[0, period)`; `0` for a non-positive period
    #[inline]
    pub fn time_offset(&self, now: f64, track_start: f64) -> f64 {
        if self.period <= 0.0 {
            return 0.0;
        }
        (self.speed_scale * (now - track_start)).rem_euclid(self.period)
    }
}

/// Sample times inside one segment
#[derive(Debug, Clone)]
pub struct SegmentSamples {
    next: i64,
    end: i64,
    period: f64,
    offset: f64,
}

impl SegmentSamples {
    pub fn new(t_a: f64, t_b: f64, period: f64, offset: f64) -> Self {
        if t_b <= t_a || period <= 0.0 || !(t_a.is_finite() && t_b.is_finite()) {
            return Self {
                next: 0,
                end: 0,
                period,
                offset,
            };
        }
        Self {
            next: ((t_a - offset) / period).ceil() as i64,
            end: ((t_b - offset) / period).ceil() as i64,
            period,
            offset,
        }
    }
}

impl Iterator for SegmentSamples {
    type Item = f64;

    #[inline]
    fn next(&mut self) -> Option<f64> {
        if self.next >= self.end {
            return None;
        }
        let t = self.next as f64 * self.period + self.offset;
        self.next += 1;
        Some(t)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end - self.next).max(0) as usize;
        (n, Some(n))
    }
}

/// One dot of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dot {
    /// Track time of the sample, seconds since track start
    pub t: f64,
    /// Screen position
    pub position: Point<f64>,
}

/// Linear position at `t` between the ends of `span`
#[inline]
fn interpolate(points: &[Point<f64>], span: &SegmentSpan, t: f64) -> Point<f64> {
    let p_a = points[span.a as usize];
    let p_b = points[span.b as usize];
    let ratio = (t - span.t_a as f64) / (span.t_b - span.t_a) as f64;
    p_a + (p_b - p_a) * ratio
}

/// Dots of one track for one frame
///
/// Only the given spans are read. The iterator is finite; build a new one for every
/// frame.
#[derive(Debug, Clone)]
pub struct Dots<'a> {
    spans: std::slice::Iter<'a, SegmentSpan>,
    points: &'a [Point<f64>],
    period: f64,
    offset: f64,
    transform: Transform,
    current: Option<(&'a SegmentSpan, SegmentSamples)>,
}

impl<'a> Dots<'a> {
    pub fn new(
        spans: &'a [SegmentSpan],
        points: &'a [Point<f64>],
        period: f64,
        offset: f64,
        transform: Transform,
    ) -> Self {
        Self {
            spans: spans.iter(),
            points,
            period,
            offset,
            transform,
            current: None,
        }
    }
}

impl Iterator for Dots<'_> {
    type Item = Dot;

    fn next(&mut self) -> Option<Dot> {
        loop {
            if let Some((span, samples)) = &mut self.current
                && let Some(t) = samples.next()
            {
                let position = self.transform.apply(interpolate(self.points, span, t));
                return Some(Dot { t, position });
            }
            let span = self.spans.next()?;
            let samples = SegmentSamples::new(
                span.t_a as f64,
                span.t_b as f64,
                self.period,
                self.offset,
            );
            self.current = Some((span, samples));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn identity() -> Transform {
        Transform {
            scale: 1.0,
            offset: Coord { x: 0.0, y: 0.0 },
        }
    }

    fn span(a: u32, b: u32, t_a: i64, t_b: i64) -> SegmentSpan {
        SegmentSpan { a, b, t_a, t_b }
    }

    #[test]
    fn test_time_offset_wraps() {
        let clock = DotClock::new(10.0, 1.0);
        assert_eq!(clock.time_offset(0.0, 0.0), 0.0);
        assert_eq!(clock.time_offset(13.0, 0.0), 3.0);
        assert_eq!(clock.time_offset(3.0, 5.0), 8.0);
        assert_eq!(DotClock::new(10.0, 2.0).time_offset(7.0, 0.0), 4.0);
        assert_eq!(DotClock::new(0.0, 1.0).time_offset(7.0, 0.0), 0.0);
    }

    #[test]
    fn test_samples_half_open() {
        let samples: Vec<f64> = SegmentSamples::new(0.0, 10.0, 5.0, 0.0).collect();
        assert_eq!(samples, vec![0.0, 5.0]);

        let samples: Vec<f64> = SegmentSamples::new(0.0, 10.0, 5.0, 2.0).collect();
        assert_eq!(samples, vec![2.0, 7.0]);

        let samples: Vec<f64> = SegmentSamples::new(3.0, 4.0, 5.0, 0.0).collect();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_samples_degenerate() {
        assert_eq!(SegmentSamples::new(4.0, 4.0, 5.0, 0.0).count(), 0);
        assert_eq!(SegmentSamples::new(5.0, 4.0, 5.0, 0.0).count(), 0);
        assert_eq!(SegmentSamples::new(0.0, 10.0, 0.0, 0.0).count(), 0);
    }

    #[test]
    fn test_two_segments_share_boundary_once() {
        // period 5, offset 0: samples at 0 and 5, one per segment
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 20.0),
        ];
        let spans = vec![span(0, 1, 0, 5), span(1, 2, 5, 10)];
        let dots: Vec<Dot> = Dots::new(&spans, &points, 5.0, 0.0, identity()).collect();
        assert_eq!(dots.len(), 2);
        assert_eq!(dots[0].t, 0.0);
        assert_eq!(dots[0].position, Point::new(0.0, 0.0));
        assert_eq!(dots[1].t, 5.0);
        assert_eq!(dots[1].position, Point::new(10.0, 0.0));
    }

    #[test]
    fn test_single_segment_period_ten() {
        let points = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let spans = vec![span(0, 1, 0, 5)];
        let dots: Vec<Dot> = Dots::new(&spans, &points, 10.0, 0.0, identity()).collect();
        assert_eq!(dots.len(), 1);
        assert_eq!(dots[0].t, 0.0);
    }

    #[test]
    fn test_linear_interpolation() {
        let points = vec![Point::new(0.0, 0.0), Point::new(10.0, 20.0)];
        let spans = vec![span(0, 1, 100, 110)];
        let dots: Vec<Dot> = Dots::new(&spans, &points, 4.0, 1.5, identity()).collect();
        // samples 101.5, 105.5, 109.5
        assert_eq!(dots.len(), 3);
        for dot in &dots {
            let f = (dot.t - 100.0) / 10.0;
            assert!((dot.position.x() - 10.0 * f).abs() < 1e-9);
            assert!((dot.position.y() - 20.0 * f).abs() < 1e-9);
        }
    }

    #[test]
    fn test_interpolation_continuity() {
        let points = vec![Point::new(3.0, -2.0), Point::new(7.0, 5.0)];
        let s = span(0, 1, 20, 30);
        for eps in [1e-3, 1e-6, 1e-9] {
            let near_a = interpolate(&points, &s, 20.0 + eps);
            let near_b = interpolate(&points, &s, 30.0 - eps);
            assert!((near_a - points[0]).x().abs() < eps * 10.0);
            assert!((near_a - points[0]).y().abs() < eps * 10.0);
            assert!((near_b - points[1]).x().abs() < eps * 10.0);
            assert!((near_b - points[1]).y().abs() < eps * 10.0);
        }
    }

    #[test]
    fn test_duplicate_timestamps_skipped() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
        ];
        let spans = vec![span(0, 1, 0, 0), span(1, 2, 0, 4)];
        let dots: Vec<Dot> = Dots::new(&spans, &points, 1.0, 0.0, identity()).collect();
        assert_eq!(dots.len(), 4);
        assert!(dots.iter().all(|d| d.position.x() >= 1.0));
    }

    #[test]
    fn test_transform_applied() {
        let points = vec![Point::new(1.0, 1.0), Point::new(2.0, 1.0)];
        let spans = vec![span(0, 1, 0, 2)];
        let transform = Transform {
            scale: 4.0,
            offset: Coord { x: 1.0, y: 2.0 },
        };
        let dots: Vec<Dot> = Dots::new(&spans, &points, 10.0, 0.0, transform).collect();
        assert_eq!(dots[0].position, Point::new(3.0, 2.0));
    }

    #[test]
    fn test_restartable_per_frame() {
        let points = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let spans = vec![span(0, 1, 0, 10)];
        let clock = DotClock::new(4.0, 1.0);
        let frame = |now: f64| -> Vec<f64> {
            Dots::new(&spans, &points, clock.period, clock.time_offset(now, 0.0), identity())
                .map(|d| d.t)
                .collect()
        };
        assert_eq!(frame(0.0), vec![0.0, 4.0, 8.0]);
        assert_eq!(frame(1.0), vec![1.0, 5.0, 9.0]);
        assert_eq!(frame(3.0), vec![3.0, 7.0]);
        assert_eq!(frame(4.0), frame(0.0));
    }
}
