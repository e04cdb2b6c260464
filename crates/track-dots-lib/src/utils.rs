//! Utility functions for projections and planar geometry
//!
//! Track geometry lives in zoom-0 pixel space: the Web Mercator world mapped onto a
//! [`TILE_SIZE`] square with `y` growing southwards. Zoom level `z` is a plain
//! `2^z` scale of that space.

use geo::{Coord, Point, Rect};

/// Side of the zoom-0 world square in pixels
pub const TILE_SIZE: f64 = 256.0;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Scale factor of zoom level `zoom` relative to zoom 0
#[inline(always)]
pub fn zoom_scale(zoom: u8) -> f64 {
    2f64.powi(zoom as i32)
}

/// Convert WGS84 (lat, lng) to zoom-0 pixel coordinates
///
/// # Arguments
/// * `lat` - Latitude in degrees, clamped to ±[`MAX_LATITUDE`]
/// * `lng` - Longitude in degrees (-180 to 180)
#[inline(always)]
pub fn project(lat: f64, lng: f64) -> Point<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = (lng + 180.0) / 360.0 * TILE_SIZE;

    let lat_rad = lat.to_radians();
    let merc = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln();
    let y = (1.0 - merc / std::f64::consts::PI) / 2.0 * TILE_SIZE;

    Point::new(x, y)
}

/// Convert zoom-0 pixel coordinates back to WGS84 (lat, lng)
#[inline(always)]
pub fn unproject(p: Point<f64>) -> (f64, f64) {
    let lng = p.x() / TILE_SIZE * 360.0 - 180.0;
    let n = std::f64::consts::PI * (1.0 - 2.0 * p.y() / TILE_SIZE);
    let lat = n.sinh().atan().to_degrees();
    (lat, lng)
}

/// Host-supplied mapping from geographic to zoom-0 pixel coordinates
pub trait Projection: Send + Sync {
    fn project(&self, lat: f64, lng: f64) -> Point<f64>;

    fn unproject(&self, p: Point<f64>) -> (f64, f64);

    /// Pixel coordinates at `zoom`
    fn project_at(&self, lat: f64, lng: f64, zoom: u8) -> Point<f64> {
        self.project(lat, lng) * zoom_scale(zoom)
    }
}

/// Spherical Web Mercator, the projection of every common slippy map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebMercator;

impl Projection for WebMercator {
    #[inline]
    fn project(&self, lat: f64, lng: f64) -> Point<f64> {
        project(lat, lng)
    }

    #[inline]
    fn unproject(&self, p: Point<f64>) -> (f64, f64) {
        unproject(p)
    }
}

#[inline(always)]
pub fn sq_dist(a: Point<f64>, b: Point<f64>) -> f64 {
    let dx = a.x() - b.x();
    let dy = a.y() - b.y();
    dx * dx + dy * dy
}

/// Bounding box of `points`, `None` when empty
pub fn bounds_of<I>(points: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = Point<f64>>,
{
    let mut iter = points.into_iter();
    let first = iter.next()?;
    let (mut min, mut max) = (first.0, first.0);
    for p in iter {
        min.x = min.x.min(p.x());
        min.y = min.y.min(p.y());
        max.x = max.x.max(p.x());
        max.y = max.y.max(p.y());
    }
    Some(Rect::new(min, max))
}

pub fn rect_union(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// Closed-interval overlap test (touching edges overlap)
#[inline]
pub fn rects_overlap(a: Rect<f64>, b: Rect<f64>) -> bool {
    let (amin, amax) = (a.min(), a.max());
    let (bmin, bmax) = (b.min(), b.max());
    !(amax.x < bmin.x || amin.x > bmax.x || amax.y < bmin.y || amin.y > bmax.y)
}

/// Closed-interval containment test (edges are inside)
#[inline]
pub fn rect_contains(rect: Rect<f64>, p: Point<f64>) -> bool {
    let (min, max) = (rect.min(), rect.max());
    p.x() >= min.x && p.x() <= max.x && p.y() >= min.y && p.y() <= max.y
}

/// Check if a line segment intersects a rectangle
pub fn line_intersects_rect(p1: Point<f64>, p2: Point<f64>, rect: Rect<f64>) -> bool {
    let min = rect.min();
    let max = rect.max();

    // Cohen-Sutherland outcodes
    let outcode = |p: Point<f64>| -> u8 {
        let mut code = 0u8;
        if p.x() < min.x {
            code |= 1;
        }
        if p.x() > max.x {
            code |= 2;
        }
        if p.y() < min.y {
            code |= 4;
        }
        if p.y() > max.y {
            code |= 8;
        }
        code
    };

    let code1 = outcode(p1);
    let code2 = outcode(p2);

    if code1 == 0 || code2 == 0 {
        return true;
    }
    if code1 & code2 != 0 {
        return false;
    }

    let edges = [
        (Point::new(min.x, min.y), Point::new(min.x, max.y)),
        (Point::new(max.x, min.y), Point::new(max.x, max.y)),
        (Point::new(min.x, min.y), Point::new(max.x, min.y)),
        (Point::new(min.x, max.y), Point::new(max.x, max.y)),
    ];

    edges
        .into_iter()
        .any(|(e1, e2)| segments_intersect(p1, p2, e1, e2))
}

/// Check if two line segments intersect
fn segments_intersect(p1: Point<f64>, p2: Point<f64>, p3: Point<f64>, p4: Point<f64>) -> bool {
    let d1 = direction(p3, p4, p1);
    let d2 = direction(p3, p4, p2);
    let d3 = direction(p1, p2, p3);
    let d4 = direction(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(p3, p4, p1))
        || (d2 == 0.0 && on_segment(p3, p4, p2))
        || (d3 == 0.0 && on_segment(p1, p2, p3))
        || (d4 == 0.0 && on_segment(p1, p2, p4))
}

/// Cross product sign of `p3` relative to `p1`-`p2`
fn direction(p1: Point<f64>, p2: Point<f64>, p3: Point<f64>) -> f64 {
    (p3.x() - p1.x()) * (p2.y() - p1.y()) - (p2.x() - p1.x()) * (p3.y() - p1.y())
}

fn on_segment(p1: Point<f64>, p2: Point<f64>, p: Point<f64>) -> bool {
    p.x() >= p1.x().min(p2.x())
        && p.x() <= p1.x().max(p2.x())
        && p.y() >= p1.y().min(p2.y())
        && p.y() <= p1.y().max(p2.y())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_origin() {
        let p = project(0.0, 0.0);
        assert!((p.x() - 128.0).abs() < 1e-9);
        assert!((p.y() - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_project_corners() {
        let west = project(0.0, -180.0);
        assert!(west.x().abs() < 1e-9);
        let north = project(90.0, 0.0);
        assert!(north.y().abs() < 1e-3);
        let south = project(-90.0, 0.0);
        assert!((south.y() - TILE_SIZE).abs() < 1e-3);
    }

    #[test]
    fn test_unproject_roundtrip() {
        let (lat, lng) = (51.5074, -0.1278);
        let (lat2, lng2) = unproject(project(lat, lng));
        assert!((lat - lat2).abs() < 1e-9);
        assert!((lng - lng2).abs() < 1e-9);
    }

    #[test]
    fn test_project_at_scales() {
        let p0 = WebMercator.project(10.0, 20.0);
        let p3 = WebMercator.project_at(10.0, 20.0, 3);
        assert!((p3.x() - p0.x() * 8.0).abs() < 1e-9);
        assert!((p3.y() - p0.y() * 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_of() {
        assert!(bounds_of(Vec::<Point<f64>>::new()).is_none());
        let rect = bounds_of([
            Point::new(1.0, 5.0),
            Point::new(-2.0, 3.0),
            Point::new(4.0, 4.0),
        ])
        .unwrap();
        assert_eq!(rect.min(), Coord { x: -2.0, y: 3.0 });
        assert_eq!(rect.max(), Coord { x: 4.0, y: 5.0 });
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let a = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 10.0 });
        let touching = Rect::new(Coord { x: 10.0, y: 10.0 }, Coord { x: 20.0, y: 20.0 });
        let apart = Rect::new(Coord { x: 10.1, y: 0.0 }, Coord { x: 20.0, y: 20.0 });
        assert!(rects_overlap(a, touching));
        assert!(!rects_overlap(a, apart));
        assert!(rect_contains(a, Point::new(10.0, 0.0)));
        assert!(!rect_contains(a, Point::new(10.0 + 1e-9, 0.0)));
    }

    #[test]
    fn test_line_intersects_rect() {
        let rect = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 10.0 });

        // Line fully inside
        assert!(line_intersects_rect(
            Point::new(2.0, 2.0),
            Point::new(8.0, 8.0),
            rect
        ));

        // One end inside
        assert!(line_intersects_rect(
            Point::new(5.0, 5.0),
            Point::new(50.0, 5.0),
            rect
        ));

        // Line crossing through
        assert!(line_intersects_rect(
            Point::new(-5.0, 5.0),
            Point::new(15.0, 5.0),
            rect
        ));

        // Diagonal missing a corner
        assert!(!line_intersects_rect(
            Point::new(-5.0, 8.0),
            Point::new(8.0, 21.0),
            rect
        ));

        // Line fully outside
        assert!(!line_intersects_rect(
            Point::new(20.0, 20.0),
            Point::new(30.0, 30.0),
            rect
        ));
    }
}
