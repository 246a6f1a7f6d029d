//! Seam between the replication session and the presentation layer.
//!
//! Raster capture, DOM/canvas rendering, and stroke rasterization are
//! external collaborators; the session only ever talks to them through
//! [`Presenter`].

use crate::protocol::{ShapeKind, StrokeTool};
use tacgrid_core::{FrameNumber, FrameSnapshot, Point};

/// What the session needs from the presentation layer.
///
/// Calls arrive from the session's event handling; implementations must be
/// cheap and non-blocking (queue work for the real renderer if needed).
pub trait Presenter: Send + Sync {
    /// Snapshot the view's current raster/elements/note so navigation can
    /// write it back into the store, or `None` when there is no live view
    /// to capture (headless sessions).
    fn capture(&self) -> Option<FrameSnapshot>;

    /// Clear the view and redraw it from `snapshot`.
    fn render(&self, frame_num: FrameNumber, snapshot: &FrameSnapshot);

    /// Draw a remote in-flight stroke segment on the current frame.
    /// Visual only; the authoritative content follows as a frame update.
    fn draw_segment(&self, tool: StrokeTool, start: Point, end: Point, color: &str);

    /// Draw a remote committed line/arrow on the current frame.
    fn draw_shape(&self, kind: ShapeKind, p1: Point, p2: Point, color: &str);
}

/// Presenter that renders nothing; for headless sessions and tests.
#[derive(Debug, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn capture(&self) -> Option<FrameSnapshot> {
        None
    }

    fn render(&self, _frame_num: FrameNumber, _snapshot: &FrameSnapshot) {}

    fn draw_segment(&self, _tool: StrokeTool, _start: Point, _end: Point, _color: &str) {}

    fn draw_shape(&self, _kind: ShapeKind, _p1: Point, _p2: Point, _color: &str) {}
}
