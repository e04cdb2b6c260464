//! Engine - Top-level manager for tracks, viewport and frames
//!
//! This module provides the high-level API: loading and removing tracks, feeding the
//! host viewport, and turning a clock time into a recorded, style-grouped frame.

use crate::render::{Canvas, CommandBuffer, Frame, FrameStats};
use crate::simplify::Simplifier;
use crate::track::{Track, TrackData, TrackId};
use crate::utils::{self, Projection, WebMercator};
use crate::viewbox::{ViewBox, ViewItem, ViewportState};
use crate::workers::SimplifyWorkers;
use crate::{Color, DataError, Dot, DotClock, DotShape, Result};

use geo::{Coord, Point, Rect};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for the engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Config {
    /// Seconds of track time between consecutive dots of one track (default 30)
    pub period_seconds: f64,
    /// Track seconds advanced per clock second (default 1)
    pub speed_scale: f64,
    /// Dot size in screen pixels (default 3)
    pub dot_size: f64,
    /// Dot size for selected or highlighted tracks (default 5)
    pub emphasized_dot_size: f64,
    /// Path stroke width in screen pixels (default 2)
    pub line_width: f64,
    /// Draw the track paths under the dots (default true)
    pub draw_paths: bool,
    /// Time step above which a segment is a data gap (default 300 s)
    pub gap_seconds: Option<f64>,
    /// Zoom-0 pixel length above which a segment is a data gap (default none)
    pub gap_pixels: Option<f64>,
    /// Decimal precision of the encoded polylines (default 5)
    pub polyline_precision: u32,
    /// Finest zoom level simplified for; deeper zooms reuse it (default 22)
    pub max_zoom: u8,
    /// Compute missing zoom levels on the rayon pool instead of the frame path
    /// (default false)
    pub background_simplification: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_seconds: 30.0,
            speed_scale: 1.0,
            dot_size: 3.0,
            emphasized_dot_size: 5.0,
            line_width: 2.0,
            draw_paths: true,
            gap_seconds: Some(300.0),
            gap_pixels: None,
            polyline_precision: crate::codec::polyline::DEFAULT_PRECISION,
            max_zoom: 22,
            background_simplification: false,
        }
    }
}

/// Outcome of a batch load; one bad track never aborts the batch
#[derive(Debug, Default)]
pub struct LoadReport {
    pub accepted: Vec<TrackId>,
    pub rejected: Vec<(TrackId, DataError)>,
}

/// Information about the engine
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineInfo {
    /// Number of tracks loaded
    pub track_count: usize,
    /// Total number of track points
    pub total_points: usize,
    /// Bytes held by the compressed timestamp streams
    pub time_bytes: usize,
    /// Simplification levels cached across all tracks
    pub cached_levels: usize,
    /// Tracks overlapping the current viewport
    pub visible_tracks: u32,
    /// Background simplification jobs not yet drained
    pub pending_jobs: usize,
}

/// Result of a viewport update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewUpdate {
    /// Simplification level requested
    pub zoom: u8,
    pub visible: u32,
    /// Tracks whose visibility flipped
    pub changed: u32,
    /// Segments in the new segment masks
    pub segments: u32,
    /// Visible tracks with no usable level yet
    pub waiting: u32,
}

/// Cached statistics, updated incrementally on add and remove
#[derive(Debug, Clone, Default)]
struct CachedStats {
    total_points: usize,
    time_bytes: usize,
    /// Zoom-0 bounding box of every track (None if empty or needs recomputing)
    bounds: Option<Rect<f64>>,
}

/// Top-level manager for all tracks and frames
pub struct Engine {
    config: Config,
    projection: Box<dyn Projection>,
    /// Track slots; indices are the item ids used by the view box
    tracks: Vec<Option<Track>>,
    free: Vec<u32>,
    ids: HashMap<TrackId, u32>,
    view: ViewBox,
    simplifier: Simplifier,
    workers: Option<SimplifyWorkers>,
    /// Bumped on every viewport or collection change
    generation: u64,
    next_epoch: u64,
    next_palette: usize,
    cached_stats: CachedStats,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Engine {
    /// Create an engine projecting with Web Mercator
    pub fn new(config: Config) -> Self {
        Self::with_projection(config, Box::new(WebMercator))
    }

    /// Create an engine with a host-supplied projection
    pub fn with_projection(config: Config, projection: Box<dyn Projection>) -> Self {
        let workers = config
            .background_simplification
            .then(SimplifyWorkers::new);
        Self {
            config,
            projection,
            tracks: Vec::new(),
            free: Vec::new(),
            ids: HashMap::new(),
            view: ViewBox::new(),
            simplifier: Simplifier::new(),
            workers,
            generation: 0,
            next_epoch: 1,
            next_palette: 0,
            cached_stats: CachedStats::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Change the dot period and speed; takes effect on the next frame
    pub fn set_clock(&mut self, period_seconds: f64, speed_scale: f64) {
        self.config.period_seconds = period_seconds;
        self.config.speed_scale = speed_scale;
    }

    /// Add one track
    pub fn add_track(&mut self, data: TrackData) -> Result<TrackId> {
        if self.ids.contains_key(&data.id) {
            return Err(DataError::DuplicateTrack(data.id));
        }
        let track = Track::from_data(data, &self.config, &*self.projection, self.next_palette)?;
        self.next_palette += 1;
        Ok(self.insert(track))
    }

    /// Add many tracks, decoding them in parallel
    ///
    /// Tracks that fail to decode, or whose id is already taken, are reported and
    /// logged; the rest are loaded.
    pub fn add_tracks(&mut self, batch: Vec<TrackData>) -> LoadReport {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::add_tracks");

        let config = &self.config;
        let projection = &*self.projection;
        let first_palette = self.next_palette;

        let decoded: Vec<(TrackId, Result<Track>)> = batch
            .into_par_iter()
            .enumerate()
            .map(|(i, data)| {
                let id = data.id;
                (id, Track::from_data(data, config, projection, first_palette + i))
            })
            .collect();
        self.next_palette += decoded.len();

        let mut report = LoadReport::default();
        for (id, result) in decoded {
            let result = result.and_then(|track| {
                if self.ids.contains_key(&id) {
                    Err(DataError::DuplicateTrack(id))
                } else {
                    Ok(self.insert(track))
                }
            });
            match result {
                Ok(id) => report.accepted.push(id),
                Err(err) => {
                    tracing::warn!(id, error = %err, "rejected track");
                    report.rejected.push((id, err));
                }
            }
        }

        tracing::info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            total = self.ids.len(),
            "tracks loaded"
        );
        report
    }

    /// Remove a track from every set and cache
    pub fn remove_track(&mut self, id: TrackId) -> Result<Track> {
        let slot = self.ids.remove(&id).ok_or(DataError::UnknownTrack(id))?;
        let track = self
            .tracks
            .get_mut(slot as usize)
            .and_then(Option::take)
            .ok_or(DataError::UnknownTrack(id))?;
        self.free.push(slot);
        self.view.remove_item(slot);
        if let Some(workers) = self.workers.as_mut() {
            workers.forget(track.epoch);
        }

        self.cached_stats.total_points -= track.len() as usize;
        self.cached_stats.time_bytes -= track.times().compressed_size_in_bytes();
        self.cached_stats.bounds = self
            .tracks()
            .map(Track::bounds)
            .reduce(utils::rect_union);
        self.generation += 1;
        Ok(track)
    }

    /// Drop every track, keeping the viewport
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.free.clear();
        self.ids.clear();
        self.view.clear_items();
        if let Some(workers) = self.workers.as_mut() {
            workers.clear();
        }
        self.cached_stats = CachedStats::default();
        self.next_palette = 0;
        self.generation += 1;
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        let slot = *self.ids.get(&id)?;
        self.tracks.get(slot as usize)?.as_ref()
    }

    /// Loaded tracks in slot order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().flatten()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Replace the viewport; frames recorded for the previous one are discarded on commit
    pub fn set_viewport(&mut self, viewport: ViewportState) {
        self.view.set_viewport(viewport);
        if self.view.is_stale() {
            self.generation += 1;
        }
    }

    #[inline]
    pub fn viewport(&self) -> Option<&ViewportState> {
        self.view.viewport()
    }

    #[inline]
    pub fn view(&self) -> &ViewBox {
        &self.view
    }

    /// Current frame generation
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Recompute visibility, simplification levels and segment masks for the current
    /// viewport. Returns `None` before the first viewport.
    pub fn update(&mut self) -> Option<ViewUpdate> {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::update");

        self.absorb_ready();
        let zoom = self.level_zoom()?;
        let world = self.view.world_bounds()?;

        let items = self
            .tracks
            .iter()
            .enumerate()
            .filter_map(|(slot, track)| track.as_ref().map(|t| (slot as u32, t)));
        let changed = self.view.update(items)?.clone();

        for slot in changed.imap() {
            if !self.view.visible().has(slot)
                && let Some(Some(track)) = self.tracks.get_mut(slot as usize)
            {
                track.clear_view();
            }
        }

        let mut update = ViewUpdate {
            zoom,
            visible: self.view.visible().size(),
            changed: changed.size(),
            ..ViewUpdate::default()
        };
        for slot in self.view.visible().imap() {
            let Some(Some(track)) = self.tracks.get_mut(slot as usize) else {
                continue;
            };
            let drawn = refresh_view(
                track,
                slot,
                zoom,
                world,
                &mut self.simplifier,
                self.workers.as_mut(),
            );
            if drawn {
                update.segments += track.spans().len() as u32;
            } else {
                update.waiting += 1;
            }
        }

        tracing::debug!(?update, "viewport updated");
        Some(update)
    }

    /// Record the frame for clock time `now` without drawing it
    ///
    /// Returns `None` before the first viewport. A stale viewport is brought up to date
    /// first.
    pub fn render_frame(&mut self, now: f64) -> Option<Frame> {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::render_frame");

        self.view.viewport()?;
        if self.view.is_stale() {
            self.update()?;
        } else {
            self.absorb_ready();
        }
        let transform = self.view.transform()?;
        let clock = DotClock::new(self.config.period_seconds, self.config.speed_scale);

        let mut commands = CommandBuffer::new();
        let mut stats = FrameStats::default();

        for slot in self.view.visible().imap() {
            match self.slot(slot) {
                Some(track) if track.view_level().is_some() => stats.tracks += 1,
                Some(_) => stats.skipped_tracks += 1,
                None => {}
            }
        }

        if self.config.draw_paths {
            for ((_, color), members) in sorted_groups(self.view.path_groups().iter()) {
                let mut begun = false;
                for track in members.imap().filter_map(|slot| self.slot(slot)) {
                    for span in track.spans() {
                        if !begun {
                            commands.begin_path(color, self.config.line_width);
                            begun = true;
                        }
                        commands.move_to(transform.apply(track.points()[span.a as usize]));
                        commands.line_to(transform.apply(track.points()[span.b as usize]));
                        stats.segments += 1;
                    }
                }
                if begun {
                    commands.stroke();
                }
            }
        }

        for ((emphasis, color), members) in sorted_groups(self.view.dot_groups().iter()) {
            let shape = DotShape::for_emphasis(emphasis);
            let size = if emphasis {
                self.config.emphasized_dot_size
            } else {
                self.config.dot_size
            };
            let mut begun = false;
            for track in members.imap().filter_map(|slot| self.slot(slot)) {
                for dot in track.dots(&clock, now, transform) {
                    if !begun {
                        commands.set_fill(color);
                        begun = true;
                    }
                    commands.dot(dot.position, size, shape);
                    stats.dots += 1;
                }
            }
            if begun {
                commands.fill();
            }
        }

        tracing::trace!(?stats, generation = self.generation, "frame recorded");
        Some(Frame {
            generation: self.generation,
            now,
            commands,
            stats,
        })
    }

    /// Draw `frame` on `canvas` if it still belongs to the current viewport generation
    pub fn commit(&self, frame: &Frame, canvas: &mut dyn Canvas) -> bool {
        if frame.generation != self.generation {
            tracing::debug!(
                frame = frame.generation,
                current = self.generation,
                "discarding stale frame"
            );
            return false;
        }
        frame.commands.replay(canvas);
        true
    }

    /// Record and draw one frame; `None` if nothing was drawn
    pub fn tick(&mut self, now: f64, canvas: &mut dyn Canvas) -> Option<FrameStats> {
        let frame = self.render_frame(now)?;
        self.commit(&frame, canvas).then_some(frame.stats)
    }

    /// Dots of one track at `now`, in screen coordinates of the current viewport
    pub fn dots_for(&self, id: TrackId, now: f64) -> Result<Vec<Dot>> {
        let track = self.track(id).ok_or(DataError::UnknownTrack(id))?;
        let Some(transform) = self.view.transform() else {
            return Ok(Vec::new());
        };
        let clock = DotClock::new(self.config.period_seconds, self.config.speed_scale);
        Ok(track.dots(&clock, now, transform).collect())
    }

    pub fn set_selected(&mut self, id: TrackId, selected: bool) -> Result<()> {
        self.restyle(id, |track| track.set_selected(selected))
    }

    pub fn set_highlighted(&mut self, id: TrackId, highlighted: bool) -> Result<()> {
        self.restyle(id, |track| track.set_highlighted(highlighted))
    }

    pub fn set_colors(&mut self, id: TrackId, path_color: Color, dot_color: Color) -> Result<()> {
        self.restyle(id, |track| track.set_colors(path_color, dot_color))
    }

    /// Get information about the engine
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            track_count: self.len(),
            total_points: self.cached_stats.total_points,
            time_bytes: self.cached_stats.time_bytes,
            cached_levels: self.tracks().map(|t| t.cache().len()).sum(),
            visible_tracks: self.view.visible().size(),
            pending_jobs: self.workers.as_ref().map_or(0, SimplifyWorkers::pending),
        }
    }

    /// Zoom-0 pixel bounding box of every track
    #[inline]
    pub fn world_bounds(&self) -> Option<Rect<f64>> {
        self.cached_stats.bounds
    }

    /// Lat/lng bounding box of every track (`x` = lng, `y` = lat)
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let world = self.world_bounds()?;
        let (lat1, lng1) = self.projection.unproject(Point(world.min()));
        let (lat2, lng2) = self.projection.unproject(Point(world.max()));
        Some(Rect::new(
            Coord { x: lng1, y: lat1 },
            Coord { x: lng2, y: lat2 },
        ))
    }

    /// Center of all tracks as `(lat, lng)`
    pub fn center(&self) -> Option<(f64, f64)> {
        let world = self.world_bounds()?;
        Some(self.projection.unproject(Point(world.center())))
    }

    /// Viewport of `width` x `height` pixels at the deepest zoom showing every track
    pub fn fit_viewport(&self, width: f64, height: f64) -> Option<ViewportState> {
        let world = self.world_bounds()?;
        let fit = (width / world.width()).min(height / world.height());
        let zoom = if fit.is_finite() && fit >= 1.0 {
            (fit.log2().floor() as u8).min(self.config.max_zoom)
        } else if fit.is_finite() {
            0
        } else {
            self.config.max_zoom
        };
        Some(ViewportState::centered_on(
            Point(world.center()),
            zoom,
            width,
            height,
        ))
    }

    fn insert(&mut self, mut track: Track) -> TrackId {
        let id = track.id();
        track.epoch = self.next_epoch;
        self.next_epoch += 1;

        self.cached_stats.total_points += track.len() as usize;
        self.cached_stats.time_bytes += track.times().compressed_size_in_bytes();
        self.cached_stats.bounds = Some(match self.cached_stats.bounds {
            Some(bounds) => utils::rect_union(bounds, track.bounds()),
            None => track.bounds(),
        });

        let slot = match self.free.pop() {
            Some(slot) => {
                self.tracks[slot as usize] = Some(track);
                slot
            }
            None => {
                self.tracks.push(Some(track));
                self.tracks.len() as u32 - 1
            }
        };
        self.ids.insert(id, slot);
        self.view.invalidate();
        self.generation += 1;
        id
    }

    #[inline]
    fn slot(&self, slot: u32) -> Option<&Track> {
        self.tracks.get(slot as usize)?.as_ref()
    }

    /// Simplification level for the current viewport
    fn level_zoom(&self) -> Option<u8> {
        Some(self.view.zoom()?.min(self.config.max_zoom))
    }

    fn restyle(&mut self, id: TrackId, apply: impl FnOnce(&mut Track)) -> Result<()> {
        let slot = *self.ids.get(&id).ok_or(DataError::UnknownTrack(id))?;
        let track = self
            .tracks
            .get_mut(slot as usize)
            .and_then(Option::as_mut)
            .ok_or(DataError::UnknownTrack(id))?;
        apply(track);
        self.view.restyle(slot, track.style());
        Ok(())
    }

    /// Move finished background levels into their track caches, upgrading the views of
    /// visible tracks that were drawn from a fallback level
    fn absorb_ready(&mut self) {
        let Some(workers) = self.workers.as_mut() else {
            return;
        };
        let ready = workers.drain_ready();
        if ready.is_empty() {
            return;
        }
        let zoom = self.level_zoom();
        let world = self.view.world_bounds();

        for job in ready {
            let Some(Some(track)) = self.tracks.get_mut(job.slot as usize) else {
                continue;
            };
            if track.epoch != job.epoch {
                continue;
            }
            track.insert_level(job.zoom, job.set);

            if let (Some(zoom), Some(world)) = (zoom, world)
                && self.view.visible().has(job.slot)
                && track.view_level() != Some(zoom)
                && let Some((level, _)) = track.cache().nearest(zoom)
            {
                track.update_view(level, world);
            }
        }
    }
}

/// Refresh one visible track for `zoom`; returns whether it has something to draw from
fn refresh_view(
    track: &mut Track,
    slot: u32,
    zoom: u8,
    world: Rect<f64>,
    simplifier: &mut Simplifier,
    workers: Option<&mut SimplifyWorkers>,
) -> bool {
    let Some(workers) = workers else {
        track.ensure_level(zoom, simplifier);
        return track.update_view(zoom, world);
    };

    if !track.cache().contains(zoom) && !workers.is_pending(track.epoch, zoom) {
        let domain = track.cache().finer(zoom).map(|(_, set)| set.clone());
        workers.request(slot, track.epoch, zoom, track.shared_points(), domain);
    }
    match track.cache().nearest(zoom).map(|(level, _)| level) {
        Some(level) => track.update_view(level, world),
        None => {
            track.clear_view();
            false
        }
    }
}

/// Color buckets in a fixed order: plain before emphasized, then by color
fn sorted_groups<'a>(
    groups: impl Iterator<Item = ((bool, Color), &'a crate::BitSet)>,
) -> Vec<((bool, Color), &'a crate::BitSet)> {
    let mut groups: Vec<_> = groups.collect();
    groups.sort_unstable_by_key(|(key, _)| *key);
    groups
}
