//! Route tracing across the track grid.
//!
//! Starting one cell inside an interlocking, the tracer walks cell by cell
//! in the direction of travel, following each segment's shape, until it
//! reaches a gapped block end (the route leaves into the next block) or
//! runs off the drawn track.
//!
//! Per-shape steps, as `(dx, dy)` with `y` growing downward:
//!
//! | Shape | walking left | walking right |
//! |-------|--------------|---------------|
//! | `Horizontal` | (-1, 0) | (+1, 0) |
//! | `DiagLeftUp` | (-1,-1) | (+1,+1) |
//! | `DiagRightUp` | (-1,+1) | (+1,-1) |
//! | `AngleLeftUp` | (-1,-1) | (+1, 0) |
//! | `AngleLeftDown` | (-1,+1) | (+1, 0) |
//! | `AngleRightUp` | (-1, 0) | (+1,-1) |
//! | `AngleRightDown` | (-1, 0) | (+1,+1) |
//! | `EndHorizRight` | (-1, 0) | block boundary |
//! | `EndHorizLeft` | block boundary | (+1, 0) |
//! | `SwitchRightUp` | (-1, 0) | (+1, -1 if reversed) |
//! | `SwitchRightDown` | (-1, 0) | (+1, +1 if reversed) |
//! | `SwitchLeftUp` | (-1, -1 if reversed) | (+1, 0) |
//! | `SwitchLeftDown` | (-1, +1 if reversed) | (+1, 0) |
//!
//! A switch only diverts a route entering from its throat; from the legs
//! every switch runs straight back toward the throat.
//!
//! Every step moves one column in the walking direction, so a trace never
//! revisits a cell and ends within the width of the drawing.

use crate::cells::{GridPos, SegmentType, SwitchPosition, TrackCell};
use crate::grid::TrackGrid;
use crate::railroad::BlockId;

/// Result of one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTrace {
    /// Cells on the route, in walking order.
    pub cells: Vec<GridPos>,
    /// Block the route continues into, if it left through a block gap
    /// that has an owned cell beyond it.
    pub next_block: Option<BlockId>,
}

/// What happens after standing on one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Advance(i32, i32),
    Boundary(i32),
}

fn step(cell: &TrackCell, walk_left: bool) -> Option<Step> {
    use SegmentType::*;

    let reversed = cell.switch_position == SwitchPosition::Reverse;
    let diverge = |dy: i32| if reversed { dy } else { 0 };

    let step = match (cell.segment, walk_left) {
        (Horizontal, true) => Step::Advance(-1, 0),
        (Horizontal, false) => Step::Advance(1, 0),

        (DiagLeftUp, true) => Step::Advance(-1, -1),
        (DiagLeftUp, false) => Step::Advance(1, 1),
        (DiagRightUp, true) => Step::Advance(-1, 1),
        (DiagRightUp, false) => Step::Advance(1, -1),

        (AngleLeftUp, true) => Step::Advance(-1, -1),
        (AngleLeftUp, false) => Step::Advance(1, 0),
        (AngleLeftDown, true) => Step::Advance(-1, 1),
        (AngleLeftDown, false) => Step::Advance(1, 0),
        (AngleRightUp, true) => Step::Advance(-1, 0),
        (AngleRightUp, false) => Step::Advance(1, -1),
        (AngleRightDown, true) => Step::Advance(-1, 0),
        (AngleRightDown, false) => Step::Advance(1, 1),

        (EndHorizRight, true) => Step::Advance(-1, 0),
        (EndHorizRight, false) => Step::Boundary(1),
        (EndHorizLeft, true) => Step::Boundary(-1),
        (EndHorizLeft, false) => Step::Advance(1, 0),

        (SwitchRightUp, true) => Step::Advance(-1, 0),
        (SwitchRightUp, false) => Step::Advance(1, diverge(-1)),
        (SwitchRightDown, true) => Step::Advance(-1, 0),
        (SwitchRightDown, false) => Step::Advance(1, diverge(1)),
        (SwitchLeftUp, true) => Step::Advance(-1, diverge(-1)),
        (SwitchLeftUp, false) => Step::Advance(1, 0),
        (SwitchLeftDown, true) => Step::Advance(-1, diverge(1)),
        (SwitchLeftDown, false) => Step::Advance(1, 0),

        (Unknown, _) => return None,
    };
    Some(step)
}

/// Walks the grid from `start` toward the left or right.
///
/// Stops without a next block when the next position has no cell or holds
/// an `Unknown` segment; neither is appended.
pub fn trace_route(grid: &TrackGrid, start: GridPos, walk_left: bool) -> RouteTrace {
    let mut trace = RouteTrace::default();
    let mut pos = start;

    loop {
        let Some(next) = grid.get(pos).and_then(|cell| step(cell, walk_left)) else {
            break;
        };
        trace.cells.push(pos);

        match next {
            Step::Advance(dx, dy) => pos = pos.offset(dx, dy),
            Step::Boundary(dx) => {
                trace.next_block = grid.owner_of(pos.offset(dx, 0));
                break;
            }
        }
    }

    log::debug!(
        "traced {} cells from {} {}, next block {:?}",
        trace.cells.len(),
        start,
        if walk_left { "left" } else { "right" },
        trace.next_block
    );
    trace
}
