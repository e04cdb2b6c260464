//! Viewport, visibility and color-grouping bookkeeping
//!
//! [`ViewBox`] receives a fresh [`ViewportState`] on every pan/zoom/resize and becomes
//! stale until [`ViewBox::update`] recomputes which items overlap it. Visibility is
//! diffed against the previous update so that only items whose visibility flipped
//! touch the [`ColorGroups`].
//!
//! Overlap and containment are closed on both ends: a box touching the viewport edge
//! is visible, and so is a point lying exactly on it.

use crate::utils::{self, rect_contains, rects_overlap};
use crate::{BitSet, Color};
use geo::{Coord, Point, Rect};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Host map state for one frame
///
/// `pixel_bounds` is the screen rectangle being drawn, and `offset` is the position of
/// the screen origin in zoom-`zoom` world pixels (the pan translation).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewportState {
    pub zoom: u8,
    pub pixel_bounds: Rect<f64>,
    pub offset: Coord<f64>,
}

impl ViewportState {
    pub fn new(zoom: u8, pixel_bounds: Rect<f64>, offset: Coord<f64>) -> Self {
        Self {
            zoom,
            pixel_bounds,
            offset,
        }
    }

    /// A `width` x `height` screen showing `center` (zoom-0 pixels) in its middle
    pub fn centered_on(center: Point<f64>, zoom: u8, width: f64, height: f64) -> Self {
        let scale = utils::zoom_scale(zoom);
        Self {
            zoom,
            pixel_bounds: Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: width, y: height }),
            offset: Coord {
                x: center.x() * scale - width / 2.0,
                y: center.y() * scale - height / 2.0,
            },
        }
    }

    /// Zoom-dependent scale from zoom-0 pixels to screen pixels
    #[inline]
    pub fn scale(&self) -> f64 {
        utils::zoom_scale(self.zoom)
    }

    /// The visible area in zoom-0 pixel space
    pub fn world_bounds(&self) -> Rect<f64> {
        let scale = self.scale();
        let to_world = |c: Coord<f64>| Coord {
            x: (c.x + self.offset.x) / scale,
            y: (c.y + self.offset.y) / scale,
        };
        Rect::new(
            to_world(self.pixel_bounds.min()),
            to_world(self.pixel_bounds.max()),
        )
    }

    pub fn transform(&self) -> Transform {
        Transform {
            scale: self.scale(),
            offset: self.offset,
        }
    }
}

/// Zoom-0 pixel to screen pixel mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f64,
    pub offset: Coord<f64>,
}

impl Transform {
    #[inline(always)]
    pub fn apply(&self, p: Point<f64>) -> Point<f64> {
        Point::new(
            p.x() * self.scale - self.offset.x,
            p.y() * self.scale - self.offset.y,
        )
    }
}

/// Presentation attributes deciding an item's color buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemStyle {
    pub path_color: Color,
    pub dot_color: Color,
    /// Selected or highlighted
    pub emphasis: bool,
}

impl ItemStyle {
    #[inline]
    pub fn path_key(&self) -> (bool, Color) {
        (self.emphasis, self.path_color)
    }

    #[inline]
    pub fn dot_key(&self) -> (bool, Color) {
        (self.emphasis, self.dot_color)
    }
}

/// Anything the view box can cull: a zoom-0 bounding box plus a style
pub trait ViewItem {
    fn bounds(&self) -> Rect<f64>;
    fn style(&self) -> ItemStyle;
}

/// Item indices bucketed by `(emphasis, color)`; empty buckets never survive
#[derive(Debug, Clone, Default)]
pub struct ColorGroups {
    buckets: HashMap<(bool, Color), BitSet>,
}

impl ColorGroups {
    pub fn insert(&mut self, key: (bool, Color), index: u32) {
        self.buckets.entry(key).or_default().add(index);
    }

    pub fn remove(&mut self, key: (bool, Color), index: u32) {
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.remove(index);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    pub fn get(&self, key: (bool, Color)) -> Option<&BitSet> {
        self.buckets.get(&key)
    }

    /// Buckets in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = ((bool, Color), &BitSet)> {
        self.buckets.iter().map(|(&key, set)| (key, set))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Total number of grouped items
    pub fn item_count(&self) -> u32 {
        self.buckets.values().map(BitSet::size).sum()
    }
}

/// Current viewport with per-item visibility and color groups
#[derive(Debug, Default)]
pub struct ViewBox {
    viewport: Option<ViewportState>,
    stale: bool,
    visible: BitSet,
    changed: BitSet,
    path_groups: ColorGroups,
    dot_groups: ColorGroups,
    /// Style each visible item was grouped under
    grouped: Vec<Option<ItemStyle>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ViewBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the viewport wholesale; visibility is stale until the next update
    pub fn set_viewport(&mut self, viewport: ViewportState) {
        if self.viewport != Some(viewport) {
            self.viewport = Some(viewport);
            self.stale = true;
        }
    }

    #[inline]
    pub fn viewport(&self) -> Option<&ViewportState> {
        self.viewport.as_ref()
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Mark visibility as needing recomputation (e.g. after items were added)
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn zoom(&self) -> Option<u8> {
        self.viewport.map(|v| v.zoom)
    }

    pub fn world_bounds(&self) -> Option<Rect<f64>> {
        self.viewport.map(|v| v.world_bounds())
    }

    pub fn transform(&self) -> Option<Transform> {
        self.viewport.map(|v| v.transform())
    }

    /// Recompute visibility for `items` and update the color groups for those whose
    /// visibility flipped. Returns the flipped set, or `None` before the first viewport.
    pub fn update<'a, T, I>(&mut self, items: I) -> Option<&BitSet>
    where
        T: ViewItem + 'a,
        I: IntoIterator<Item = (u32, &'a T)>,
    {
        let bounds = self.world_bounds()?;

        let mut visible = BitSet::with_capacity(self.visible.max().map_or(0, |m| m + 1));
        for (index, item) in items {
            if !rects_overlap(item.bounds(), bounds) {
                continue;
            }
            visible.add(index);
            if !self.visible.has(index) {
                self.group(index, item.style());
            }
        }

        self.changed = visible.new_symmetric_difference(&self.visible);
        let left: Vec<u32> = self.changed.imap().filter(|&i| !visible.has(i)).collect();
        for index in left {
            self.ungroup(index);
        }

        tracing::debug!(
            visible = visible.size(),
            changed = self.changed.size(),
            path_groups = self.path_groups.len(),
            dot_groups = self.dot_groups.len(),
            "view box updated"
        );

        self.visible = visible;
        self.stale = false;
        Some(&self.changed)
    }

    /// Move a visible item to the buckets of its new style
    pub fn restyle(&mut self, index: u32, style: ItemStyle) {
        if !self.visible.has(index) {
            return;
        }
        if self.grouped.get(index as usize).copied().flatten() == Some(style) {
            return;
        }
        self.ungroup(index);
        self.group(index, style);
    }

    /// Forget an item entirely
    pub fn remove_item(&mut self, index: u32) {
        if self.visible.has(index) {
            self.ungroup(index);
            self.visible.remove(index);
        }
        self.changed.remove(index);
    }

    /// Forget every item, keeping the viewport
    pub fn clear_items(&mut self) {
        self.visible.clear();
        self.changed.clear();
        self.path_groups.clear();
        self.dot_groups.clear();
        self.grouped.clear();
        self.stale = true;
    }

    /// Does the zoom-0 box `bbox` overlap the viewport (edges inclusive)?
    pub fn overlaps(&self, bbox: Rect<f64>) -> bool {
        self.world_bounds()
            .is_some_and(|bounds| rects_overlap(bbox, bounds))
    }

    /// Is the zoom-0 point `p` inside the viewport (edges inclusive)?
    pub fn contains(&self, p: Point<f64>) -> bool {
        self.world_bounds()
            .is_some_and(|bounds| rect_contains(bounds, p))
    }

    #[inline]
    pub fn visible(&self) -> &BitSet {
        &self.visible
    }

    /// Items whose visibility flipped in the last update
    #[inline]
    pub fn changed(&self) -> &BitSet {
        &self.changed
    }

    #[inline]
    pub fn path_groups(&self) -> &ColorGroups {
        &self.path_groups
    }

    #[inline]
    pub fn dot_groups(&self) -> &ColorGroups {
        &self.dot_groups
    }

    fn group(&mut self, index: u32, style: ItemStyle) {
        self.path_groups.insert(style.path_key(), index);
        self.dot_groups.insert(style.dot_key(), index);
        let slot = index as usize;
        if self.grouped.len() <= slot {
            self.grouped.resize(slot + 1, None);
        }
        self.grouped[slot] = Some(style);
    }

    fn ungroup(&mut self, index: u32) {
        let Some(style) = self.grouped.get_mut(index as usize).and_then(Option::take) else {
            return;
        };
        self.path_groups.remove(style.path_key(), index);
        self.dot_groups.remove(style.dot_key(), index);
    }
}
