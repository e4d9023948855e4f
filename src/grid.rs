//! Sparse coordinate index over track cells.

use std::collections::HashMap;

use crate::cells::{CellColor, GridPos, SegmentType, SwitchPosition, TrackCell};
use crate::railroad::BlockId;

/// Every track cell on the panel, keyed by position.
///
/// Blocks and switches own their state; the grid holds what is drawn and
/// what the route tracer reads: segment shape, paint, switch glyph and the
/// owning block.
#[derive(Debug, Default, Clone)]
pub struct TrackGrid {
    cells: HashMap<GridPos, TrackCell>,
}

impl TrackGrid {
    /// Creates an empty grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a cell. A cell already at that position is replaced and returned.
    pub fn insert(&mut self, cell: TrackCell) -> Option<TrackCell> {
        let replaced = self.cells.insert(cell.pos, cell);
        if let Some(old) = &replaced {
            log::warn!(
                "two track cells placed at {}; keeping the later {}",
                old.pos,
                old.segment.config_name()
            );
        }
        replaced
    }

    /// Cell at `pos`.
    pub fn get(&self, pos: GridPos) -> Option<&TrackCell> {
        self.cells.get(&pos)
    }

    /// Mutable cell at `pos`.
    pub fn get_mut(&mut self, pos: GridPos) -> Option<&mut TrackCell> {
        self.cells.get_mut(&pos)
    }

    /// Shape of the cell at `pos`.
    pub fn segment_at(&self, pos: GridPos) -> Option<SegmentType> {
        self.get(pos).map(|c| c.segment)
    }

    /// Block that owns the cell at `pos`.
    pub fn owner_of(&self, pos: GridPos) -> Option<BlockId> {
        self.get(pos).and_then(|c| c.owner)
    }

    /// Paints the cell at `pos`. Absent cells are ignored.
    pub fn set_color(&mut self, pos: GridPos, color: CellColor) {
        if let Some(cell) = self.cells.get_mut(&pos) {
            cell.color = color;
        }
    }

    /// Sets the position glyph of the switch cell at `pos`.
    pub fn set_switch_position(&mut self, pos: GridPos, position: SwitchPosition) {
        if let Some(cell) = self.cells.get_mut(&pos) {
            cell.switch_position = position;
        }
    }

    /// All cells, ordered top to bottom then left to right.
    pub fn cells(&self) -> Vec<&TrackCell> {
        let mut cells: Vec<_> = self.cells.values().collect();
        cells.sort_by_key(|c| (c.pos.y, c.pos.x));
        cells
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when no cells have been placed.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_position() {
        let mut grid = TrackGrid::new();
        grid.insert(TrackCell::track(
            GridPos::new(3, 4),
            SegmentType::Horizontal,
            Some(BlockId(2)),
        ));

        assert_eq!(grid.owner_of(GridPos::new(3, 4)), Some(BlockId(2)));
        assert_eq!(
            grid.segment_at(GridPos::new(3, 4)),
            Some(SegmentType::Horizontal)
        );
        assert!(grid.get(GridPos::new(4, 4)).is_none());
        assert_eq!(grid.owner_of(GridPos::new(4, 4)), None);
    }

    #[test]
    fn duplicate_position_replaces() {
        let mut grid = TrackGrid::new();
        let pos = GridPos::new(0, 0);
        assert!(grid
            .insert(TrackCell::track(pos, SegmentType::Horizontal, None))
            .is_none());
        let old = grid.insert(TrackCell::track(pos, SegmentType::DiagLeftUp, None));
        assert_eq!(old.map(|c| c.segment), Some(SegmentType::Horizontal));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.segment_at(pos), Some(SegmentType::DiagLeftUp));
    }

    #[test]
    fn paint_ignores_missing_cells() {
        let mut grid = TrackGrid::new();
        grid.set_color(GridPos::new(9, 9), CellColor::TrackLined);
        assert!(grid.is_empty());
    }

    #[test]
    fn cells_are_row_ordered() {
        let mut grid = TrackGrid::new();
        for (x, y) in [(2, 1), (0, 1), (5, 0)] {
            grid.insert(TrackCell::track(GridPos::new(x, y), SegmentType::Horizontal, None));
        }
        let order: Vec<_> = grid.cells().iter().map(|c| (c.pos.x, c.pos.y)).collect();
        assert_eq!(order, vec![(5, 0), (0, 1), (2, 1)]);
    }
}
