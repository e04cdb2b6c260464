//! Track Dots Library - Data Engine for Animated GPS Track Dots
//!
//! This library keeps thousands of GPS tracks in a compact form and turns them, frame by
//! frame, into moving dots and path strokes for the currently visible part of the map. The
//! map widget and the drawing surface are external collaborators: the host supplies the
//! viewport and a frame clock, and receives style-grouped draw instructions through a
//! [`Canvas`].
//!
//! # Architecture
//!
//! - **[`BitSet`]**: Word-packed index set used for every membership question
//! - **[`codec`]**: Polyline geometry and RLE + VByte timestamp codecs
//! - **[`Simplifier`]**: Radial + Douglas-Peucker reduction, cached per zoom in a
//!   [`SimplificationCache`]
//! - **[`ViewBox`]**: Viewport, visibility diffing and color groups
//! - **[`Track`]**: One decoded activity with its per-viewport segment mask
//! - **[`DotClock`]** / [`Dots`]: Per-frame dot interpolation
//! - **[`Engine`]**: High-level manager tying the above to a [`Canvas`]
//!
//! # Performance Characteristics
//!
//! - **Load**: O(N) per track, parallel across tracks
//! - **Viewport update**: O(T) bounding-box tests plus O(changed) color-group edits
//! - **Frame**: O(visible segments + dots), timestamps read only for visible segment ends
//! - **Memory**: points are kept once; timestamps stay compressed

pub mod bitset;
pub mod codec;
pub mod utils;

mod animation;
mod engine;
mod render;
mod simplify;
mod style;
mod track;
mod viewbox;
mod workers;

#[cfg(test)]
mod tests;

// Public API exports
pub use animation::{Dot, DotClock, Dots, SegmentSamples};
pub use bitset::BitSet;
pub use codec::{DecodeError, TimeStream};
pub use engine::{Config, Engine, EngineInfo, LoadReport, ViewUpdate};
pub use render::{Canvas, CommandBuffer, DrawCommand, Frame, FrameStats};
pub use simplify::{SimplificationCache, Simplifier, simplify_points, tolerance_for_zoom};
pub use style::{Color, DotShape};
pub use track::{SegmentSpan, TimeData, Track, TrackData, TrackId};
pub use utils::{Projection, WebMercator};
pub use viewbox::{ColorGroups, ItemStyle, Transform, ViewBox, ViewItem, ViewportState};
pub use workers::SimplifyWorkers;

/// Error types for the data module
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Empty track")]
    EmptyTrack,

    #[error("Track has {points} points but {times} timestamps")]
    LengthMismatch { points: usize, times: usize },

    #[error("Timestamps decrease at index {index}")]
    NonMonotonicTimes { index: usize },

    #[error("Time delta at stream position {index} does not fit in 32 bits")]
    DeltaOverflow { index: usize },

    #[error("Track has more points than a u32 index can address")]
    TooManyPoints,

    #[error("Track {0} is already loaded")]
    DuplicateTrack(TrackId),

    #[error("Unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
