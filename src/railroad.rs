//! Entity arena: every block, switch and signal on the panel.
//!
//! Entities refer to each other through typed indices into this arena.
//! Names stay on the entities for lookup and diagnostics.
//!
//! # Route chains
//!
//! A control point lines a route by tracing its own block, then following
//! the "next block" each block hands back through the plain blocks beyond:
//!
//! ```text
//!   [CP block] --trace--> [plain] --neighbor--> [plain] --> [CP block] stop
//! ```
//!
//! The chain ends when a block hands back nothing, when it reaches another
//! control point's block, or when it would revisit a block.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockSensors};
use crate::cells::{GridPos, SegmentType, TrackCell};
use crate::grid::TrackGrid;
use crate::packet::Packet;
use crate::signal::Signal;
use crate::switch::Switch;

/// Index of a block in the [`Railroad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

/// Index of a switch in the [`Railroad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SwitchId(pub usize);

/// Index of a signal in the [`Railroad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(pub usize);

/// Entity category used by name lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Block,
    Switch,
    Signal,
}

impl EntityKind {
    /// Parses `"block"`, `"switch"` or `"signal"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "block" => Some(Self::Block),
            "switch" => Some(Self::Switch),
            "signal" => Some(Self::Signal),
            _ => None,
        }
    }

    /// Lowercase name, as accepted by [`EntityKind::from_name`].
    pub const fn name(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Switch => "switch",
            Self::Signal => "signal",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of [`Railroad::get_entity`].
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Block(BlockId, &'a Block),
    Switch(SwitchId, &'a Switch),
    Signal(SignalId, &'a Signal),
}

/// The panel's entities, the grid they are drawn on, and the outbound
/// packets they have queued.
#[derive(Debug, Default)]
pub struct Railroad {
    /// Track cells, shared by blocks, switches and the route tracer.
    pub grid: TrackGrid,
    blocks: Vec<Block>,
    switches: Vec<Switch>,
    signals: Vec<Signal>,
    outbox: Vec<Packet>,
}

impl Railroad {
    /// Creates an empty railroad.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Adds a block drawn over `segments`, placing its cells on the grid.
    pub fn add_block(
        &mut self,
        name: impl Into<String>,
        sensors: BlockSensors,
        segments: impl IntoIterator<Item = (GridPos, SegmentType)>,
    ) -> BlockId {
        let id = BlockId(self.blocks.len());
        let mut cells = Vec::new();
        for (pos, segment) in segments {
            self.grid.insert(TrackCell::track(pos, segment, Some(id)));
            cells.push(pos);
        }
        self.blocks.push(Block::new(name, cells, sensors));
        id
    }

    /// Adds a switch and its cell. `owner` is the block the points sit in,
    /// if any, so traces can hand on across them.
    pub fn add_switch(&mut self, switch: Switch, owner: Option<BlockId>) -> SwitchId {
        let id = SwitchId(self.switches.len());
        self.grid
            .insert(TrackCell::switch(switch.pos(), switch.segment(), id, owner));
        self.switches.push(switch);
        id
    }

    /// Adds a signal.
    pub fn add_signal(&mut self, signal: Signal) -> SignalId {
        let id = SignalId(self.signals.len());
        self.signals.push(signal);
        id
    }

    // ========================================================================
    // Access
    // ========================================================================

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    pub fn switch(&self, id: SwitchId) -> &Switch {
        &self.switches[id.0]
    }

    pub fn switch_mut(&mut self, id: SwitchId) -> &mut Switch {
        &mut self.switches[id.0]
    }

    pub fn signal(&self, id: SignalId) -> &Signal {
        &self.signals[id.0]
    }

    pub fn signal_mut(&mut self, id: SignalId) -> &mut Signal {
        &mut self.signals[id.0]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i), b))
    }

    pub fn switches(&self) -> impl Iterator<Item = (SwitchId, &Switch)> {
        self.switches.iter().enumerate().map(|(i, s)| (SwitchId(i), s))
    }

    pub fn signals(&self) -> impl Iterator<Item = (SignalId, &Signal)> {
        self.signals.iter().enumerate().map(|(i, s)| (SignalId(i), s))
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.name() == name).map(BlockId)
    }

    pub fn find_switch(&self, name: &str) -> Option<SwitchId> {
        self.switches.iter().position(|s| s.name() == name).map(SwitchId)
    }

    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.signals.iter().position(|s| s.name() == name).map(SignalId)
    }

    /// Looks an entity up by category and name.
    pub fn get_entity(&self, kind: EntityKind, name: &str) -> Option<EntityRef<'_>> {
        match kind {
            EntityKind::Block => self
                .find_block(name)
                .map(|id| EntityRef::Block(id, self.block(id))),
            EntityKind::Switch => self
                .find_switch(name)
                .map(|id| EntityRef::Switch(id, self.switch(id))),
            EntityKind::Signal => self
                .find_signal(name)
                .map(|id| EntityRef::Signal(id, self.signal(id))),
        }
    }

    // ========================================================================
    // Outbound traffic
    // ========================================================================

    /// Queues a packet for the transport.
    pub fn send(&mut self, pkt: Packet) {
        log::debug!("queueing outbound {}", pkt);
        self.outbox.push(pkt);
    }

    /// Drains queued outbound packets.
    pub fn take_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    // ========================================================================
    // Packet fan-out
    // ========================================================================

    /// Applies one packet to every block, then every switch, then every
    /// signal. Returns true if anything changed.
    pub fn apply_packet(&mut self, pkt: &Packet, now_ms: u64) -> bool {
        let mut changed = false;
        for block in &mut self.blocks {
            changed |= block.process_packet(pkt, &mut self.grid);
        }
        for switch in &mut self.switches {
            changed |= switch.process_packet(pkt, now_ms, &mut self.grid);
        }
        for signal in &mut self.signals {
            changed |= signal.process_packet(pkt);
        }
        changed
    }

    // ========================================================================
    // Route chains
    // ========================================================================

    /// Lines a route starting in control point block `start`, traced from
    /// `start_pos`, then on through plain blocks. Returns the blocks lined.
    ///
    /// An occupied block refuses the route and ends the chain without
    /// appearing in the result.
    pub fn set_route_trace(
        &mut self,
        start: BlockId,
        left_bound: bool,
        start_pos: GridPos,
    ) -> Vec<BlockId> {
        let mut lined = Vec::new();
        if self.blocks[start.0].is_occupied() {
            return lined;
        }
        lined.push(start);
        let mut seen = HashSet::from([start]);
        let mut next = self.blocks[start.0].set_route(left_bound, Some(start_pos), &mut self.grid);

        while let Some(id) = next {
            if self.blocks[id.0].hosts_control_point() || self.blocks[id.0].is_occupied() {
                break;
            }
            if !seen.insert(id) {
                log::warn!(
                    "route from [{}] loops back into [{}]",
                    self.blocks[start.0].name(),
                    self.blocks[id.0].name()
                );
                break;
            }
            lined.push(id);
            next = self.blocks[id.0].set_route(left_bound, None, &mut self.grid);
        }
        lined
    }

    /// Clears the route lined out of control point block `start`.
    pub fn clear_route_trace(&mut self, start: BlockId) {
        let mut seen = HashSet::from([start]);
        let mut next = self.blocks[start.0].clear_route(&mut self.grid);

        while let Some(id) = next {
            if self.blocks[id.0].hosts_control_point() || !seen.insert(id) {
                break;
            }
            next = self.blocks[id.0].clear_route(&mut self.grid);
        }
    }

    /// Marks each switch lined if its cell is on a traced route through any
    /// of `blocks`.
    pub fn refresh_switch_lining(&mut self, switches: &[SwitchId], blocks: &[BlockId]) {
        for &sw in switches {
            let pos = self.switches[sw.0].pos();
            let lined = blocks.iter().any(|&b| {
                let block = &self.blocks[b.0];
                block.is_lined() && block.lined_cells().contains(&pos)
            });
            self.switches[sw.0].set_lined(lined);
        }
    }

    /// Recomputes one switch's paint.
    pub fn recalculate_switch(&mut self, id: SwitchId) {
        self.switches[id.0].recalculate_state(&mut self.grid);
    }

    /// Recomputes one block's paint.
    pub fn recalculate_block(&mut self, id: BlockId) {
        self.blocks[id.0].recalculate_state(&mut self.grid);
    }

    /// Throws a switch by id.
    pub fn throw_switch(
        &mut self,
        id: SwitchId,
        now_ms: u64,
    ) -> Result<(), crate::switch::ThrowDenied> {
        let cmd = self.switches[id.0].throw(now_ms, &mut self.grid)?;
        self.send(cmd);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorBit;

    fn horiz(y: i32, xs: core::ops::Range<i32>) -> Vec<(GridPos, SegmentType)> {
        xs.map(|x| (GridPos::new(x, y), SegmentType::Horizontal)).collect()
    }

    /// CP block 0..4 with a right gap at 3, plain blocks beyond.
    fn chain() -> (Railroad, BlockId, BlockId, BlockId) {
        let mut rr = Railroad::new();
        let mut cp_cells = horiz(0, 0..3);
        cp_cells.push((GridPos::new(3, 0), SegmentType::EndHorizRight));
        let cp = rr.add_block("CP", BlockSensors::default(), cp_cells);
        let mut b1_cells = vec![(GridPos::new(4, 0), SegmentType::EndHorizLeft)];
        b1_cells.extend(horiz(0, 5..8));
        let b1 = rr.add_block("B1", BlockSensors::default(), b1_cells);
        let b2 = rr.add_block("B2", BlockSensors::default(), horiz(0, 8..12));
        rr.block_mut(cp).assoc_control_point(0);
        rr.block_mut(b1).set_neighbors(Some(cp), Some(b2));
        (rr, cp, b1, b2)
    }

    #[test]
    fn lookup_by_kind_and_name() {
        let (rr, _, b1, _) = chain();
        assert!(matches!(
            rr.get_entity(EntityKind::Block, "B1"),
            Some(EntityRef::Block(id, _)) if id == b1
        ));
        assert!(rr.get_entity(EntityKind::Signal, "B1").is_none());
        assert_eq!(EntityKind::from_name("switch"), Some(EntityKind::Switch));
        assert_eq!(EntityKind::from_name("turntable"), None);
    }

    #[test]
    fn chain_stops_at_end_of_neighbors() {
        let (mut rr, cp, b1, b2) = chain();
        let lined = rr.set_route_trace(cp, false, GridPos::new(1, 0));
        assert_eq!(lined, vec![cp, b1, b2]);
        assert!(rr.block(b2).is_lined());

        rr.clear_route_trace(cp);
        assert!(!rr.block(cp).is_lined());
        assert!(!rr.block(b1).is_lined());
        assert!(!rr.block(b2).is_lined());
    }

    #[test]
    fn chain_stops_at_next_interlocking() {
        let (mut rr, cp, b1, b2) = chain();
        rr.block_mut(b2).assoc_control_point(1);
        let lined = rr.set_route_trace(cp, false, GridPos::new(1, 0));
        assert_eq!(lined, vec![cp, b1]);
        assert!(!rr.block(b2).is_lined());
    }

    #[test]
    fn occupied_block_is_left_out_of_chain() {
        let mut rr = Railroad::new();
        let occupied = BlockSensors {
            occupancy: SensorBit::from_pattern("0x20,S,6:0").unwrap(),
            ..BlockSensors::default()
        };
        let mut cp_cells = horiz(0, 0..3);
        cp_cells.push((GridPos::new(3, 0), SegmentType::EndHorizRight));
        let cp = rr.add_block("CP", BlockSensors::default(), cp_cells);
        let mut b1_cells = vec![(GridPos::new(4, 0), SegmentType::EndHorizLeft)];
        b1_cells.extend(horiz(0, 5..8));
        let b1 = rr.add_block("B1", BlockSensors::default(), b1_cells);
        let b2 = rr.add_block("B2", occupied, horiz(0, 8..12));
        rr.block_mut(cp).assoc_control_point(0);
        rr.block_mut(b1).set_neighbors(Some(cp), Some(b2));
        rr.apply_packet(&Packet::new(0xFF, 0x20, b'S', vec![1]), 0);

        let lined = rr.set_route_trace(cp, false, GridPos::new(1, 0));
        assert_eq!(lined, vec![cp, b1]);
        assert!(!rr.block(b2).is_lined());
    }

    #[test]
    fn occupied_start_lines_nothing() {
        let mut rr = Railroad::new();
        let sensors = BlockSensors {
            occupancy: SensorBit::from_pattern("0x20,S,6:0").unwrap(),
            ..BlockSensors::default()
        };
        let cp = rr.add_block("CP", sensors, horiz(0, 0..3));
        rr.block_mut(cp).assoc_control_point(0);
        rr.apply_packet(&Packet::new(0xFF, 0x20, b'S', vec![1]), 0);

        assert!(rr.set_route_trace(cp, false, GridPos::new(1, 0)).is_empty());
        assert!(!rr.block(cp).is_lined());
    }

    #[test]
    fn chain_stops_on_loop() {
        let (mut rr, cp, b1, b2) = chain();
        rr.block_mut(b2).set_neighbors(None, Some(b1));
        let lined = rr.set_route_trace(cp, false, GridPos::new(1, 0));
        assert_eq!(lined, vec![cp, b1, b2]);
    }

    #[test]
    fn packets_reach_every_entity() {
        let mut rr = Railroad::new();
        let sensors = BlockSensors {
            occupancy: SensorBit::from_pattern("0x20,S,6:0").unwrap(),
            ..BlockSensors::default()
        };
        let b = rr.add_block("B", sensors, horiz(0, 0..2));
        assert!(rr.apply_packet(&Packet::new(0xFF, 0x20, b'S', vec![1]), 0));
        assert!(rr.block(b).is_occupied());
        assert!(!rr.apply_packet(&Packet::new(0xFF, 0x20, b'S', vec![1]), 0));
    }

    #[test]
    fn outbox_drains() {
        let mut rr = Railroad::new();
        rr.send(Packet::new(1, 0xFE, b'A', vec![]));
        assert_eq!(rr.take_outbox().len(), 1);
        assert!(rr.take_outbox().is_empty());
    }
}
