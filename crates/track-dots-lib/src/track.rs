//! Track - One decoded GPS activity
//!
//! A [`Track`] owns its zoom-0 point buffer, the compressed timestamp stream, the
//! per-zoom simplification cache and, while visible, the segment mask and time spans of
//! the current viewport.

use crate::codec::polyline;
use crate::codec::rle::RleItem;
use crate::simplify::{SimplificationCache, Simplifier};
use crate::utils::{self, Projection};
use crate::viewbox::{ItemStyle, Transform, ViewItem};
use crate::{BitSet, Color, Config, DataError, DotClock, Dots, Result, TimeStream};
use geo::{Point, Rect};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable caller-assigned track identifier
pub type TrackId = u64;

/// Per-point timestamps as delivered by ingestion
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum TimeData {
    /// Plain seconds since track start
    Plain(Vec<i64>),
    /// First value plus run-length coded differences
    Rle { first: i64, items: Vec<RleItem> },
    /// First value plus the VByte packed flat difference stream
    Compressed { first: i64, bytes: Vec<u8> },
}

impl TimeData {
    pub fn into_stream(self) -> Result<TimeStream> {
        match self {
            TimeData::Plain(times) => TimeStream::encode(&times),
            TimeData::Rle { first, items } => TimeStream::from_items(first, &items),
            TimeData::Compressed { first, bytes } => TimeStream::from_compressed(first, bytes),
        }
    }
}

/// Raw input for one track
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackData {
    pub id: TrackId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Start of the activity, seconds since the Unix epoch
    #[cfg_attr(feature = "serde", serde(default))]
    pub start_time: i64,
    /// Encoded polyline of (lat, lng) pairs
    pub polyline: String,
    pub times: TimeData,
    /// Lat/lng bounding box (`x` = lng, `y` = lat); computed from the points when absent
    #[cfg_attr(feature = "serde", serde(default))]
    pub bounds: Option<Rect<f64>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub color: Option<Color>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dot_color: Option<Color>,
}

/// A visible segment between two retained points with their timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpan {
    /// Point index of the segment start
    pub a: u32,
    /// Point index of the segment end
    pub b: u32,
    pub t_a: i64,
    pub t_b: i64,
}

/// Per-viewport state of a visible track
#[derive(Debug, Clone, Default)]
struct TrackView {
    /// Cached zoom level the spans were derived from
    level: u8,
    /// Ordinal `k` set: segment between the `k`-th and `k+1`-th retained points is drawn
    seg_mask: BitSet,
    spans: Vec<SegmentSpan>,
}

/// One GPS activity ready for animation
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    name: String,
    start_time: i64,
    points: Arc<Vec<Point<f64>>>,
    times: TimeStream,
    bounds: Rect<f64>,
    /// Raw segment `i` (points `i`..`i+1`) is a data gap
    gaps: BitSet,
    cache: SimplificationCache,
    path_color: Color,
    dot_color: Color,
    selected: bool,
    highlighted: bool,
    /// Engine-assigned serial, unique for the lifetime of the engine
    pub(crate) epoch: u64,
    view: Option<TrackView>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Track {
    /// Decode and validate a track
    ///
    /// `palette_index` picks the default color when the data carries none.
    pub fn from_data(
        data: TrackData,
        config: &Config,
        projection: &dyn Projection,
        palette_index: usize,
    ) -> Result<Self> {
        let n = polyline::length_in_points(&data.polyline);
        if n == 0 {
            return Err(DataError::EmptyTrack);
        }
        if u32::try_from(n).is_err() {
            return Err(DataError::TooManyPoints);
        }

        let points = polyline::decode_to_buffer(
            &data.polyline,
            None,
            config.polyline_precision,
            |lat, lng| projection.project(lat, lng),
        )?;
        let times = data.times.into_stream()?;
        if times.len() as usize != points.len() {
            return Err(DataError::LengthMismatch {
                points: points.len(),
                times: times.len() as usize,
            });
        }

        let bounds = match data.bounds {
            Some(geo) => Rect::new(
                projection.project(geo.min().y, geo.min().x).0,
                projection.project(geo.max().y, geo.max().x).0,
            ),
            None => utils::bounds_of(points.iter().copied()).ok_or(DataError::EmptyTrack)?,
        };

        let gaps = detect_gaps(&points, &times, config.gap_seconds, config.gap_pixels);
        if !gaps.is_empty() {
            tracing::debug!(id = data.id, gaps = gaps.size(), "data gaps flagged");
        }

        let path_color = data.color.unwrap_or_else(|| Color::from_index(palette_index));
        Ok(Self {
            id: data.id,
            name: data.name,
            start_time: data.start_time,
            points: Arc::new(points),
            times,
            bounds,
            gaps,
            cache: SimplificationCache::new(),
            path_color,
            dot_color: data.dot_color.unwrap_or(path_color),
            selected: false,
            highlighted: false,
            epoch: 0,
            view: None,
        })
    }

    #[inline]
    pub fn id(&self) -> TrackId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Seconds between the first and last point
    #[inline]
    pub fn duration(&self) -> i64 {
        self.times.duration()
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.points.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Zoom-0 pixel coordinates at full resolution
    #[inline]
    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    pub(crate) fn shared_points(&self) -> Arc<Vec<Point<f64>>> {
        Arc::clone(&self.points)
    }

    #[inline]
    pub fn times(&self) -> &TimeStream {
        &self.times
    }

    /// Zoom-0 pixel bounding box
    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    #[inline]
    pub fn gaps(&self) -> &BitSet {
        &self.gaps
    }

    #[inline]
    pub fn cache(&self) -> &SimplificationCache {
        &self.cache
    }

    #[inline]
    pub fn path_color(&self) -> Color {
        self.path_color
    }

    #[inline]
    pub fn dot_color(&self) -> Color {
        self.dot_color
    }

    pub fn set_colors(&mut self, path_color: Color, dot_color: Color) {
        self.path_color = path_color;
        self.dot_color = dot_color;
    }

    #[inline]
    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    #[inline]
    pub fn highlighted(&self) -> bool {
        self.highlighted
    }

    pub fn set_highlighted(&mut self, highlighted: bool) {
        self.highlighted = highlighted;
    }

    #[inline]
    pub fn emphasis(&self) -> bool {
        self.selected || self.highlighted
    }

    /// Retained indices for `zoom`, simplifying on a miss
    pub fn ensure_level(&mut self, zoom: u8, simplifier: &mut Simplifier) -> &BitSet {
        let points = &self.points;
        let n = points.len() as u32;
        self.cache
            .get_or_compute(zoom, simplifier, |i| points[i as usize], n)
    }

    /// Store a level computed elsewhere
    pub fn insert_level(&mut self, zoom: u8, set: BitSet) {
        self.cache.insert(zoom, set);
    }

    /// Rebuild the segment mask and time spans for `world` (zoom-0 pixels) from the
    /// cached `level`. Returns `false`, leaving the track undrawn, if `level` is not cached.
    pub fn update_view(&mut self, level: u8, world: Rect<f64>) -> bool {
        let Some(retained) = self.cache.get(level) else {
            self.view = None;
            return false;
        };

        let mut seg_mask = BitSet::new();
        let mut endpoints = BitSet::new();
        let mut prev: Option<u32> = None;
        for (k, b) in retained.imap().enumerate() {
            if let Some(a) = prev {
                let k = k as u32 - 1;
                let crosses = utils::line_intersects_rect(
                    self.points[a as usize],
                    self.points[b as usize],
                    world,
                );
                if crosses && !self.gaps.any_in_range(a..b) {
                    seg_mask.add(k);
                    endpoints.add(k).add(k + 1);
                }
            }
            prev = Some(b);
        }

        let absolute: BitSet = retained.imap_subset(&endpoints).collect();
        let mut entries = endpoints
            .imap()
            .zip(absolute.imap())
            .zip(self.times.select(&absolute))
            .map(|((ordinal, index), time)| (ordinal, index, time));

        let mut spans = Vec::with_capacity(seg_mask.size() as usize);
        if let Some(mut last) = entries.next() {
            for entry in entries {
                if entry.0 == last.0 + 1 && seg_mask.has(last.0) {
                    spans.push(SegmentSpan {
                        a: last.1,
                        b: entry.1,
                        t_a: last.2,
                        t_b: entry.2,
                    });
                }
                last = entry;
            }
        }

        self.view = Some(TrackView {
            level,
            seg_mask,
            spans,
        });
        true
    }

    /// Drop the per-viewport state
    pub fn clear_view(&mut self) {
        self.view = None;
    }

    /// Level the current spans were derived from
    pub fn view_level(&self) -> Option<u8> {
        self.view.as_ref().map(|v| v.level)
    }

    pub fn seg_mask(&self) -> Option<&BitSet> {
        self.view.as_ref().map(|v| &v.seg_mask)
    }

    /// Visible segments, ascending
    pub fn spans(&self) -> &[SegmentSpan] {
        self.view.as_ref().map(|v| v.spans.as_slice()).unwrap_or_default()
    }

    /// Dots of this track at `now`, in screen coordinates
    pub fn dots(&self, clock: &DotClock, now: f64, transform: Transform) -> Dots<'_> {
        let offset = clock.time_offset(now, self.start_time as f64);
        Dots::new(self.spans(), &self.points, clock.period, offset, transform)
    }
}

impl ViewItem for Track {
    fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    fn style(&self) -> ItemStyle {
        ItemStyle {
            path_color: self.path_color,
            dot_color: self.dot_color,
            emphasis: self.emphasis(),
        }
    }
}

/// Flag raw segments whose time step exceeds `gap_seconds` or whose zoom-0 length
/// exceeds `gap_pixels`
fn detect_gaps(
    points: &[Point<f64>],
    times: &TimeStream,
    gap_seconds: Option<f64>,
    gap_pixels: Option<f64>,
) -> BitSet {
    let mut gaps = BitSet::new();
    if gap_seconds.is_none() && gap_pixels.is_none() {
        return gaps;
    }
    let sq_gap_pixels = gap_pixels.map(|d| d * d);

    let mut prev_time = times.first();
    for (i, (w, time)) in points.windows(2).zip(times.iter().skip(1)).enumerate() {
        let slow = gap_seconds.is_some_and(|s| (time - prev_time) as f64 > s);
        let far = sq_gap_pixels.is_some_and(|d| utils::sq_dist(w[0], w[1]) > d);
        if slow || far {
            gaps.add(i as u32);
        }
        prev_time = time;
    }
    gaps
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::WebMercator;
    use geo::Coord;

    /// Lat/lng rectangle (`x` = lng, `y` = lat)
    fn geo_rect(south: f64, west: f64, north: f64, east: f64) -> Rect<f64> {
        Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north })
    }

    /// Straight eastward track at the equator, one point per second
    pub(crate) fn straight(id: TrackId, n: usize, step_deg: f64) -> TrackData {
        let coords = (0..n).map(|i| (0.0, i as f64 * step_deg));
        TrackData {
            id,
            name: format!("track {id}"),
            start_time: 0,
            polyline: polyline::encode(coords, 5).unwrap(),
            times: TimeData::Plain((0..n as i64).collect()),
            bounds: None,
            color: None,
            dot_color: None,
        }
    }

    fn build(data: TrackData) -> Result<Track> {
        Track::from_data(data, &Config::default(), &WebMercator, 0)
    }

    fn world() -> Rect<f64> {
        Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 256.0, y: 256.0 })
    }

    #[test]
    fn test_from_data() {
        let track = build(straight(7, 10, 0.1)).unwrap();
        assert_eq!(track.id(), 7);
        assert_eq!(track.len(), 10);
        assert_eq!(track.duration(), 9);
        assert_eq!(track.dot_color(), track.path_color());
        assert!(track.gaps().is_empty());
        assert!((track.bounds().min().y - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_supplied_bounds_are_projected() {
        let mut data = straight(1, 4, 0.1);
        data.bounds = Some(geo_rect(-1.0, -1.0, 1.0, 1.0));
        let track = build(data).unwrap();
        let b = track.bounds();
        assert!(b.min().x < 128.0 && b.max().x > 128.0);
        assert!(b.min().y < 128.0 && b.max().y > 128.0);
    }

    #[test]
    fn test_rejects_malformed() {
        let mut data = straight(1, 4, 0.1);
        data.polyline.push('_');
        assert!(matches!(build(data), Err(DataError::Decode(_))));

        let mut data = straight(1, 4, 0.1);
        data.times = TimeData::Plain(vec![0, 1, 2]);
        assert!(matches!(
            build(data),
            Err(DataError::LengthMismatch {
                points: 4,
                times: 3
            })
        ));

        let mut data = straight(1, 4, 0.1);
        data.polyline.clear();
        assert!(matches!(build(data), Err(DataError::EmptyTrack)));

        let mut data = straight(1, 3, 0.1);
        data.times = TimeData::Compressed {
            first: 0,
            bytes: vec![0x82],
        };
        assert!(matches!(build(data), Err(DataError::Decode(_))));
    }

    #[test]
    fn test_rle_times() {
        let mut data = straight(1, 9, 0.1);
        data.times = TimeData::Rle {
            first: 0,
            items: vec![RleItem::Delta(1), RleItem::Run(2, 6), RleItem::Delta(5)],
        };
        let track = build(data).unwrap();
        assert_eq!(track.times().to_vec(), vec![0, 1, 3, 5, 7, 9, 11, 13, 18]);
    }

    #[test]
    fn test_gap_detection() {
        let mut data = straight(1, 5, 0.1);
        data.times = TimeData::Plain(vec![0, 10, 1000, 1010, 1020]);
        let track = build(data).unwrap();
        assert_eq!(track.gaps().imap().collect::<Vec<_>>(), vec![1]);

        let config = Config {
            gap_seconds: None,
            gap_pixels: Some(0.05),
            ..Config::default()
        };
        let mut data = straight(1, 4, 0.01);
        // the third point jumps a whole degree east
        data.polyline = polyline::encode([(0.0, 0.0), (0.0, 0.01), (0.0, 1.01), (0.0, 1.02)], 5).unwrap();
        let track = Track::from_data(data, &config, &WebMercator, 0).unwrap();
        assert_eq!(track.gaps().imap().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_view_spans_follow_mask() {
        let mut track = build(straight(1, 10, 0.1)).unwrap();
        track.insert_level(3, BitSet::full(10));
        assert!(track.update_view(3, world()));
        assert_eq!(track.seg_mask().unwrap().size(), 9);
        let spans = track.spans();
        assert_eq!(spans.len(), 9);
        assert_eq!(
            spans[4],
            SegmentSpan {
                a: 4,
                b: 5,
                t_a: 4,
                t_b: 5
            }
        );
    }

    #[test]
    fn test_view_uses_simplified_indices() {
        let mut track = build(straight(1, 10, 0.1)).unwrap();
        let mut simplifier = Simplifier::new();
        let kept = track.ensure_level(2, &mut simplifier).clone();
        // collinear points collapse to the endpoints
        assert_eq!(kept.imap().collect::<Vec<_>>(), vec![0, 9]);
        assert!(track.update_view(2, world()));
        assert_eq!(
            track.spans(),
            &[SegmentSpan {
                a: 0,
                b: 9,
                t_a: 0,
                t_b: 9
            }]
        );
    }

    #[test]
    fn test_view_skips_gaps_and_offscreen() {
        let mut data = straight(1, 6, 0.1);
        data.times = TimeData::Plain(vec![0, 1, 2, 1000, 1001, 1002]);
        let mut track = build(data).unwrap();
        track.insert_level(5, BitSet::full(6));

        // only the western half of the track is on screen
        let p2 = track.points()[2];
        let west = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: p2.x(), y: 256.0 });
        track.update_view(5, west);
        let mask: Vec<u32> = track.seg_mask().unwrap().imap().collect();
        // segment 2 touches the edge at its start but is a gap
        assert_eq!(mask, vec![0, 1]);

        track.update_view(5, world());
        let mask: Vec<u32> = track.seg_mask().unwrap().imap().collect();
        assert_eq!(mask, vec![0, 1, 3, 4]);
        assert!(track.spans().iter().all(|s| s.t_b - s.t_a == 1));
    }

    #[test]
    fn test_missing_level_clears_view() {
        let mut track = build(straight(1, 4, 0.1)).unwrap();
        track.insert_level(3, BitSet::full(4));
        assert!(track.update_view(3, world()));
        assert!(!track.update_view(9, world()));
        assert!(track.spans().is_empty());
        assert!(track.view_level().is_none());
    }

    #[test]
    fn test_style_tracks_emphasis() {
        let mut track = build(straight(1, 4, 0.1)).unwrap();
        assert!(!track.style().emphasis);
        track.set_highlighted(true);
        assert!(track.style().emphasis);
        track.set_highlighted(false);
        track.set_selected(true);
        assert!(track.style().emphasis);
    }
}
