//! Drawing surface seam and recorded frames
//!
//! The engine never draws directly. It emits style-grouped instructions into a
//! [`Canvas`]; frames are first recorded into a [`CommandBuffer`] so that a frame whose
//! viewport went stale while it was built can be dropped instead of drawn.

use crate::{Color, DotShape};
use geo::Point;

/// Rendering collaborator
///
/// Calls arrive in batches: `begin_path`, any number of `move_to`/`line_to`, `stroke`;
/// or `set_fill`, any number of `dot`, `fill`. Coordinates are screen pixels.
pub trait Canvas {
    fn begin_path(&mut self, color: Color, width: f64);
    fn move_to(&mut self, p: Point<f64>);
    fn line_to(&mut self, p: Point<f64>);
    fn stroke(&mut self);
    fn set_fill(&mut self, color: Color);
    fn dot(&mut self, p: Point<f64>, size: f64, shape: DotShape);
    fn fill(&mut self);
}

/// One recorded [`Canvas`] call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    BeginPath { color: Color, width: f64 },
    MoveTo(Point<f64>),
    LineTo(Point<f64>),
    Stroke,
    SetFill(Color),
    Dot {
        position: Point<f64>,
        size: f64,
        shape: DotShape,
    },
    Fill,
}

/// A [`Canvas`] that records calls for later replay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBuffer {
    commands: Vec<DrawCommand>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Issue every recorded call, in order, on `canvas`
    pub fn replay<C: Canvas + ?Sized>(&self, canvas: &mut C) {
        for command in &self.commands {
            match *command {
                DrawCommand::BeginPath { color, width } => canvas.begin_path(color, width),
                DrawCommand::MoveTo(p) => canvas.move_to(p),
                DrawCommand::LineTo(p) => canvas.line_to(p),
                DrawCommand::Stroke => canvas.stroke(),
                DrawCommand::SetFill(color) => canvas.set_fill(color),
                DrawCommand::Dot {
                    position,
                    size,
                    shape,
                } => canvas.dot(position, size, shape),
                DrawCommand::Fill => canvas.fill(),
            }
        }
    }
}

impl Canvas for CommandBuffer {
    fn begin_path(&mut self, color: Color, width: f64) {
        self.commands.push(DrawCommand::BeginPath { color, width });
    }

    fn move_to(&mut self, p: Point<f64>) {
        self.commands.push(DrawCommand::MoveTo(p));
    }

    fn line_to(&mut self, p: Point<f64>) {
        self.commands.push(DrawCommand::LineTo(p));
    }

    fn stroke(&mut self) {
        self.commands.push(DrawCommand::Stroke);
    }

    fn set_fill(&mut self, color: Color) {
        self.commands.push(DrawCommand::SetFill(color));
    }

    fn dot(&mut self, position: Point<f64>, size: f64, shape: DotShape) {
        self.commands.push(DrawCommand::Dot {
            position,
            size,
            shape,
        });
    }

    fn fill(&mut self) {
        self.commands.push(DrawCommand::Fill);
    }
}

/// Counters for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameStats {
    /// Visible tracks that were drawn
    pub tracks: u32,
    /// Visible tracks without a usable simplification level yet
    pub skipped_tracks: u32,
    pub segments: u32,
    pub dots: u32,
}

/// A recorded frame, valid only for the viewport generation it was built for
#[derive(Debug, Clone)]
pub struct Frame {
    pub generation: u64,
    /// Clock time the frame was built for
    pub now: f64,
    pub commands: CommandBuffer,
    pub stats: FrameStats,
}
