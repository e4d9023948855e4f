//! Track blocks: occupancy, power and manual-control state for one section.
//!
//! A block either stands alone between interlockings, in which case a route
//! lines the whole block, or hosts a control point, in which case only the
//! cells the route tracer walked through are lined.

use crate::cells::{CellColor, GridPos};
use crate::grid::TrackGrid;
use crate::packet::Packet;
use crate::railroad::BlockId;
use crate::route::trace_route;
use crate::sensor::SensorBit;

/// The three sensors a block reports through.
#[derive(Debug, Clone)]
pub struct BlockSensors {
    /// Local manual control.
    pub manual: SensorBit,
    /// Train detected.
    pub occupancy: SensorBit,
    /// Track power present. Starts true.
    pub power: SensorBit,
}

impl Default for BlockSensors {
    /// No sensors wired; the block reads powered and clear.
    fn default() -> Self {
        Self {
            manual: SensorBit::inert(false),
            occupancy: SensorBit::inert(false),
            power: SensorBit::inert(true),
        }
    }
}

impl BlockSensors {
    /// Builds the sensor set from optional layout patterns.
    pub fn configured(manual: Option<&str>, occupancy: Option<&str>, power: Option<&str>) -> Self {
        Self {
            manual: SensorBit::configured(manual, false),
            occupancy: SensorBit::configured(occupancy, false),
            power: SensorBit::configured(power, true),
        }
    }
}

/// One block of track.
#[derive(Debug, Clone)]
pub struct Block {
    name: String,
    cells: Vec<GridPos>,
    manual_control: bool,
    occupied: bool,
    power_on: bool,
    lined: bool,
    lined_left_bound: bool,
    lined_cells: Vec<GridPos>,
    left_neighbor: Option<BlockId>,
    right_neighbor: Option<BlockId>,
    control_point: Option<usize>,
    sensors: BlockSensors,
}

impl Block {
    /// Creates a block drawn over `cells`.
    pub fn new(name: impl Into<String>, cells: Vec<GridPos>, sensors: BlockSensors) -> Self {
        let power_on = sensors.power.state();
        Self {
            name: name.into(),
            cells,
            manual_control: false,
            occupied: false,
            power_on,
            lined: false,
            lined_left_bound: false,
            lined_cells: Vec::new(),
            left_neighbor: None,
            right_neighbor: None,
            control_point: None,
            sensors,
        }
    }

    /// Sets the blocks a route continues into past either end.
    pub fn set_neighbors(&mut self, left: Option<BlockId>, right: Option<BlockId>) {
        self.left_neighbor = left;
        self.right_neighbor = right;
    }

    /// Marks this block as the home of control point `index`.
    pub fn assoc_control_point(&mut self, index: usize) {
        self.control_point = Some(index);
    }

    /// Block name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cells this block is drawn over.
    pub fn cells(&self) -> &[GridPos] {
        &self.cells
    }

    /// True if a train is detected.
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    /// True if under local manual control.
    pub fn is_manual(&self) -> bool {
        self.manual_control
    }

    /// True if track power is on.
    pub fn is_powered(&self) -> bool {
        self.power_on
    }

    /// True if part of a lined route.
    pub fn is_lined(&self) -> bool {
        self.lined
    }

    /// Direction of the lined route.
    pub fn lined_left_bound(&self) -> bool {
        self.lined_left_bound
    }

    /// Cells on the lined route through this block.
    pub fn lined_cells(&self) -> &[GridPos] {
        &self.lined_cells
    }

    /// Index of the hosted control point.
    pub fn control_point(&self) -> Option<usize> {
        self.control_point
    }

    /// True if this block hosts a control point.
    pub fn hosts_control_point(&self) -> bool {
        self.control_point.is_some()
    }

    /// Configured neighbor in a direction.
    pub fn neighbor(&self, left_bound: bool) -> Option<BlockId> {
        if left_bound {
            self.left_neighbor
        } else {
            self.right_neighbor
        }
    }

    /// Feeds a packet to the block's sensors, repainting on any change.
    pub fn process_packet(&mut self, pkt: &Packet, grid: &mut TrackGrid) -> bool {
        let mut changed = self.sensors.manual.test_packet(pkt);
        changed |= self.sensors.occupancy.test_packet(pkt);
        changed |= self.sensors.power.test_packet(pkt);

        if changed {
            self.manual_control = self.sensors.manual.state();
            self.occupied = self.sensors.occupancy.state();
            self.power_on = self.sensors.power.state();
            self.recalculate_state(grid);
        }
        changed
    }

    /// Recomputes the paint of every cell in the block.
    ///
    /// Priority: no power, occupied, lined, manual, idle. Occupancy drops
    /// any lined route.
    pub fn recalculate_state(&mut self, grid: &mut TrackGrid) {
        if self.occupied && self.lined {
            log::debug!("block [{}] occupied, dropping lined route", self.name);
            self.lined = false;
            self.lined_cells.clear();
        }

        let color = if !self.power_on {
            CellColor::TrackNoPower
        } else if self.occupied {
            CellColor::TrackOccupied
        } else if self.lined {
            CellColor::TrackLined
        } else if self.manual_control {
            CellColor::TrackManual
        } else {
            CellColor::TrackIdle
        };

        for &pos in &self.cells {
            let paint = if color == CellColor::TrackLined
                && self.hosts_control_point()
                && !self.lined_cells.contains(&pos)
            {
                CellColor::TrackIdle
            } else {
                color
            };
            grid.set_color(pos, paint);
        }
    }

    /// Lines a route through this block and returns the block it continues into.
    ///
    /// An occupied block refuses and returns `None`. A control point block
    /// traces from `start` and lines only the walked cells; without a start
    /// there is nothing to trace. A plain block lines every cell and hands
    /// on to its configured neighbor.
    pub fn set_route(
        &mut self,
        left_bound: bool,
        start: Option<GridPos>,
        grid: &mut TrackGrid,
    ) -> Option<BlockId> {
        if self.occupied {
            return None;
        }

        let next = if self.hosts_control_point() {
            let start = start?;
            let trace = trace_route(grid, start, left_bound);
            self.lined_cells = trace.cells;
            trace.next_block
        } else {
            self.lined_cells = self.cells.clone();
            self.neighbor(left_bound)
        };

        self.lined = true;
        self.lined_left_bound = left_bound;
        self.recalculate_state(grid);
        next
    }

    /// Clears the lined route and returns the block it continued into.
    ///
    /// Does nothing while occupied or when not lined. A control point block
    /// finds the far end of its lined cells in the travel direction and
    /// hands on to whoever owns the cell one step beyond it.
    pub fn clear_route(&mut self, grid: &mut TrackGrid) -> Option<BlockId> {
        if self.occupied || !self.lined {
            return None;
        }
        self.lined = false;

        let next = if self.hosts_control_point() {
            let far_end = if self.lined_left_bound {
                self.lined_cells.iter().min_by_key(|p| p.x)
            } else {
                self.lined_cells.iter().max_by_key(|p| p.x)
            };
            let dx = if self.lined_left_bound { -1 } else { 1 };
            far_end.and_then(|end| grid.owner_of(end.offset(dx, 0)))
        } else {
            self.neighbor(self.lined_left_bound)
        };

        self.lined_cells.clear();
        self.recalculate_state(grid);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::{SegmentType, TrackCell};

    fn occupancy_packet(occupied: bool) -> Packet {
        Packet::new(0xFF, 0x20, b'S', vec![u8::from(occupied)])
    }

    fn plain_block(grid: &mut TrackGrid, id: usize, xs: core::ops::Range<i32>) -> Block {
        let cells: Vec<_> = xs.map(|x| GridPos::new(x, 0)).collect();
        for &pos in &cells {
            grid.insert(TrackCell::track(pos, SegmentType::Horizontal, Some(BlockId(id))));
        }
        let sensors = BlockSensors::configured(None, Some("0x20,S,6:0"), None);
        Block::new(format!("B{}", id), cells, sensors)
    }

    #[test]
    fn starts_idle_and_powered() {
        let mut grid = TrackGrid::new();
        let mut block = plain_block(&mut grid, 0, 0..3);
        assert!(block.is_powered());
        assert!(!block.is_occupied());
        block.recalculate_state(&mut grid);
        assert_eq!(grid.get(GridPos::new(1, 0)).unwrap().color, CellColor::TrackIdle);
    }

    #[test]
    fn occupancy_paints_and_drops_lining() {
        let mut grid = TrackGrid::new();
        let mut block = plain_block(&mut grid, 0, 0..3);
        block.set_route(false, None, &mut grid);
        assert!(block.is_lined());

        assert!(block.process_packet(&occupancy_packet(true), &mut grid));
        assert!(block.is_occupied());
        assert!(!block.is_lined());
        assert!(block.lined_cells().is_empty());
        assert_eq!(grid.get(GridPos::new(0, 0)).unwrap().color, CellColor::TrackOccupied);

        // Same telemetry again changes nothing.
        assert!(!block.process_packet(&occupancy_packet(true), &mut grid));
    }

    #[test]
    fn occupied_block_refuses_route() {
        let mut grid = TrackGrid::new();
        let mut block = plain_block(&mut grid, 0, 0..3);
        block.set_neighbors(Some(BlockId(5)), Some(BlockId(6)));
        block.process_packet(&occupancy_packet(true), &mut grid);

        assert_eq!(block.set_route(true, None, &mut grid), None);
        assert!(!block.is_lined());
    }

    #[test]
    fn plain_block_hands_on_to_neighbor() {
        let mut grid = TrackGrid::new();
        let mut block = plain_block(&mut grid, 0, 0..3);
        block.set_neighbors(Some(BlockId(5)), Some(BlockId(6)));

        assert_eq!(block.set_route(true, None, &mut grid), Some(BlockId(5)));
        assert!(block.lined_left_bound());
        assert_eq!(block.lined_cells().len(), 3);
        assert_eq!(grid.get(GridPos::new(2, 0)).unwrap().color, CellColor::TrackLined);

        assert_eq!(block.clear_route(&mut grid), Some(BlockId(5)));
        assert!(!block.is_lined());
        assert_eq!(grid.get(GridPos::new(2, 0)).unwrap().color, CellColor::TrackIdle);

        // Already clear.
        assert_eq!(block.clear_route(&mut grid), None);
    }

    #[test]
    fn control_point_block_lines_only_traced_cells() {
        let mut grid = TrackGrid::new();
        let mut block = plain_block(&mut grid, 0, 0..4);
        block.assoc_control_point(0);
        grid.insert(TrackCell::track(
            GridPos::new(3, 0),
            SegmentType::EndHorizRight,
            Some(BlockId(0)),
        ));
        grid.insert(TrackCell::track(
            GridPos::new(4, 0),
            SegmentType::EndHorizLeft,
            Some(BlockId(9)),
        ));

        let next = block.set_route(false, Some(GridPos::new(2, 0)), &mut grid);
        assert_eq!(next, Some(BlockId(9)));
        assert_eq!(block.lined_cells(), &[GridPos::new(2, 0), GridPos::new(3, 0)]);
        assert_eq!(grid.get(GridPos::new(0, 0)).unwrap().color, CellColor::TrackIdle);
        assert_eq!(grid.get(GridPos::new(3, 0)).unwrap().color, CellColor::TrackLined);

        assert_eq!(block.clear_route(&mut grid), Some(BlockId(9)));
        assert!(block.lined_cells().is_empty());
        assert_eq!(grid.get(GridPos::new(3, 0)).unwrap().color, CellColor::TrackIdle);
    }

    #[test]
    fn control_point_block_needs_a_start() {
        let mut grid = TrackGrid::new();
        let mut block = plain_block(&mut grid, 0, 0..2);
        block.assoc_control_point(0);
        assert_eq!(block.set_route(false, None, &mut grid), None);
        assert!(!block.is_lined());
    }

    #[test]
    fn power_loss_outranks_everything() {
        let mut grid = TrackGrid::new();
        let cells = vec![GridPos::new(0, 0)];
        grid.insert(TrackCell::track(cells[0], SegmentType::Horizontal, Some(BlockId(0))));
        let sensors = BlockSensors::configured(None, Some("0x20,S,6:0"), Some("0x20,S,6:1"));
        let mut block = Block::new("B0", cells, sensors);

        // Occupied, power bit clear.
        block.process_packet(&Packet::new(0xFF, 0x20, b'S', vec![0x01]), &mut grid);
        assert!(!block.is_powered());
        assert_eq!(grid.get(GridPos::new(0, 0)).unwrap().color, CellColor::TrackNoPower);
    }
}
