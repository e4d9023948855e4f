//! The panel tick loop.
//!
//! The [`Dispatcher`] owns the whole railroad and every control point. The
//! transport pushes decoded packets into its bounded inbound queue; each
//! tick drains the queue and applies packets one at a time:
//!
//! ```text
//!   packet --> blocks --> switches --> signals --> control points
//!                                                       |
//!                                    outbox <-- route/clear commands
//! ```
//!
//! Operator requests (clicking a signal or a switch) go through the same
//! dispatcher so they never interleave with a packet half applied.
//!
//! # Example
//!
//! ```rust
//! use rs_ctc::dispatcher::Dispatcher;
//! use rs_ctc::hal::MockClock;
//! use rs_ctc::packet::Packet;
//! use rs_ctc::railroad::Railroad;
//!
//! let mut dispatcher = Dispatcher::new(Railroad::default(), MockClock::new());
//! assert!(dispatcher.enqueue(Packet::new(0xFF, 0x50, b'S', vec![0x01])));
//!
//! assert_eq!(dispatcher.tick(), 1);
//! assert_eq!(dispatcher.queued(), 0);
//! ```

use serde::Serialize;

use crate::cells::{CellColor, GridPos, SegmentType, SignalKind, SwitchPosition};
use crate::control_point::{Interlocking, Lining, PlantKind, Role, RouteDenied};
use crate::fast_clock::FastClockStatus;
use crate::packet::Packet;
use crate::queue::PacketQueue;
use crate::railroad::{Railroad, SignalId};
use crate::switch::ThrowDenied;
use crate::traits::Clock;

/// Inbound packets held between ticks before new ones are dropped.
pub const INBOUND_CAPACITY: usize = 500;

/// Ticks per blink phase.
pub const DEFAULT_BLINK_TICKS: u32 = 6;

/// Nominal tick period.
pub const DEFAULT_TICK_MS: u64 = 100;

/// Why a switch could not be thrown from the panel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwitchRequestError {
    #[error("no switch named {0:?}")]
    UnknownSwitch(String),
    #[error(transparent)]
    Denied(#[from] ThrowDenied),
}

/// A text label drawn on the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelLabel {
    pub pos: GridPos,
    pub text: String,
}

/// Drives the railroad from inbound packets and operator requests.
pub struct Dispatcher<C: Clock> {
    railroad: Railroad,
    control_points: Vec<Box<dyn Interlocking>>,
    inbound: PacketQueue<INBOUND_CAPACITY>,
    clock: C,

    layout_name: String,
    labels: Vec<PanelLabel>,
    fast_clock_address: Option<u8>,
    fast_clock: Option<FastClockStatus>,

    blink_ticks: u32,
    blink_count: u32,
    blink_on: bool,

    rate_window_ticks: u32,
    rate_ticks: u32,
    rate_packets: u32,
    packets_per_second: u32,
}

impl<C: Clock> Dispatcher<C> {
    /// Creates a dispatcher with no control points.
    pub fn new(railroad: Railroad, clock: C) -> Self {
        Self {
            railroad,
            control_points: Vec::new(),
            inbound: PacketQueue::new(),
            clock,
            layout_name: String::new(),
            labels: Vec::new(),
            fast_clock_address: None,
            fast_clock: None,
            blink_ticks: DEFAULT_BLINK_TICKS,
            blink_count: 0,
            blink_on: true,
            rate_window_ticks: ticks_per_second(DEFAULT_TICK_MS),
            rate_ticks: 0,
            rate_packets: 0,
            packets_per_second: 0,
        }
    }

    // ========================================================================
    // Builders
    // ========================================================================

    /// Sets the layout name shown in the status bar.
    pub fn with_layout_name(mut self, name: impl Into<String>) -> Self {
        self.layout_name = name.into();
        self
    }

    /// Sets the panel labels.
    pub fn with_labels(mut self, labels: Vec<PanelLabel>) -> Self {
        self.labels = labels;
        self
    }

    /// Accepts fast-clock broadcasts from `address`.
    pub fn with_fast_clock_address(mut self, address: u8) -> Self {
        self.fast_clock_address = Some(address);
        self
    }

    /// Sets the number of ticks per blink phase.
    pub fn with_blink_ticks(mut self, ticks: u32) -> Self {
        self.blink_ticks = ticks.max(1);
        self
    }

    /// Sets the tick period used to scale the packet rate.
    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.rate_window_ticks = ticks_per_second(tick_ms);
        self
    }

    /// Installs a control point, attaching its entrance signals and blocks
    /// to it. Returns its index.
    pub fn add_control_point(&mut self, plant: Box<dyn Interlocking>) -> usize {
        let index = self.control_points.len();
        for (_, signal) in plant.entrances() {
            self.railroad.signal_mut(signal).assoc_control_point(index);
        }
        for block in plant.blocks() {
            self.railroad.block_mut(block).assoc_control_point(index);
        }
        log::debug!("control point [{}] installed at {}", plant.name(), index);
        self.control_points.push(plant);
        index
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn railroad(&self) -> &Railroad {
        &self.railroad
    }

    pub fn railroad_mut(&mut self) -> &mut Railroad {
        &mut self.railroad
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn control_points(&self) -> &[Box<dyn Interlocking>] {
        &self.control_points
    }

    /// Control point by name.
    pub fn control_point(&self, name: &str) -> Option<&dyn Interlocking> {
        self.control_points
            .iter()
            .find(|cp| cp.name() == name)
            .map(|cp| cp.as_ref())
    }

    pub fn layout_name(&self) -> &str {
        &self.layout_name
    }

    /// Current blink phase.
    pub fn blink_on(&self) -> bool {
        self.blink_on
    }

    /// Packets applied during the last full second.
    pub fn packets_per_second(&self) -> u32 {
        self.packets_per_second
    }

    /// Packets waiting for the next tick.
    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    /// Packets dropped because the inbound queue was full.
    pub fn dropped(&self) -> u64 {
        self.inbound.dropped()
    }

    /// Last fast-clock broadcast.
    pub fn fast_clock(&self) -> Option<&FastClockStatus> {
        self.fast_clock.as_ref()
    }

    // ========================================================================
    // Packet flow
    // ========================================================================

    /// Queues an inbound packet for the next tick. Returns false if the
    /// queue was full and the packet was dropped.
    pub fn enqueue(&mut self, pkt: Packet) -> bool {
        self.inbound.push(pkt)
    }

    /// Drains the inbound queue and advances the blink and rate counters.
    /// Returns the number of packets applied.
    pub fn tick(&mut self) -> usize {
        let mut applied = 0;
        while let Some(pkt) = self.inbound.pop() {
            self.apply_packet(&pkt);
            applied += 1;
        }

        self.blink_count += 1;
        if self.blink_count >= self.blink_ticks {
            self.blink_count = 0;
            self.blink_on = !self.blink_on;
        }

        self.rate_packets = self
            .rate_packets
            .saturating_add(u32::try_from(applied).unwrap_or(u32::MAX));
        self.rate_ticks += 1;
        if self.rate_ticks >= self.rate_window_ticks {
            self.packets_per_second = self.rate_packets;
            self.rate_packets = 0;
            self.rate_ticks = 0;
        }

        applied
    }

    /// Applies one packet immediately, bypassing the queue.
    pub fn apply_packet(&mut self, pkt: &Packet) {
        let now = self.clock.now_ms();
        log::trace!("applying {}", pkt);

        self.railroad.apply_packet(pkt, now);
        for cp in &mut self.control_points {
            if let Err(e) = cp.process_packet(&mut self.railroad, pkt, now) {
                log::error!("{}", e);
            }
        }

        if self.fast_clock_address == Some(pkt.src) {
            if let Some(status) = FastClockStatus::decode(pkt) {
                self.fast_clock = Some(status);
            }
        }
    }

    /// Recomputes every entity from its current sensor state. Run once at
    /// startup after the layout is built.
    pub fn recalculate_all(&mut self) {
        let ids: Vec<_> = self.railroad.blocks().map(|(id, _)| id).collect();
        for id in ids {
            self.railroad.recalculate_block(id);
        }
        let ids: Vec<_> = self.railroad.switches().map(|(id, _)| id).collect();
        for id in ids {
            self.railroad.recalculate_switch(id);
        }
        let ids: Vec<_> = self.railroad.signals().map(|(id, _)| id).collect();
        for id in ids {
            self.railroad.signal_mut(id).recalculate_state();
        }
        for cp in &mut self.control_points {
            if let Err(e) = cp.recalculate_state(&mut self.railroad) {
                log::error!("{}", e);
            }
        }
    }

    /// Drains commands queued for the transport.
    pub fn take_outbound(&mut self) -> Vec<Packet> {
        self.railroad.take_outbox()
    }

    // ========================================================================
    // Operator requests
    // ========================================================================

    /// A click on a signal: cancels its route with `ctrl` held, otherwise
    /// requests one. On success the signal shows unverified until the field
    /// confirms.
    pub fn click_signal(&mut self, name: &str, ctrl: bool) -> Result<(), RouteDenied> {
        let id = self
            .railroad
            .find_signal(name)
            .ok_or_else(|| RouteDenied::UnknownSignal(name.to_string()))?;

        let result = self.request(id, ctrl);
        match &result {
            Ok(()) => self.railroad.signal_mut(id).mark_unverified(),
            Err(e) => log::warn!("request at signal [{}] denied: {}", name, e),
        }
        result
    }

    /// Requests a route from signal `name`.
    pub fn line_route(&mut self, name: &str) -> Result<(), RouteDenied> {
        self.click_signal(name, false)
    }

    /// Cancels the route signal `name` is showing proceed for.
    pub fn clear_route(&mut self, name: &str) -> Result<(), RouteDenied> {
        self.click_signal(name, true)
    }

    fn request(&mut self, id: SignalId, cancel: bool) -> Result<(), RouteDenied> {
        let signal = self.railroad.signal(id);
        let no_cp = || RouteDenied::NoControlPoint(signal.name().to_string());
        let cp = signal.control_point().ok_or_else(no_cp)?;
        let plant = self.control_points.get_mut(cp).ok_or_else(no_cp)?;

        if cancel {
            let now = self.clock.now_ms();
            plant.remove_route(&mut self.railroad, id, now)
        } else {
            plant.line_route(&mut self.railroad, id)
        }
    }

    /// A click on a switch: throws it to the other position.
    pub fn throw_switch(&mut self, name: &str) -> Result<(), SwitchRequestError> {
        let id = self
            .railroad
            .find_switch(name)
            .ok_or_else(|| SwitchRequestError::UnknownSwitch(name.to_string()))?;
        let now = self.clock.now_ms();
        self.railroad.throw_switch(id, now).map_err(|e| {
            log::warn!("throw of switch [{}] denied: {}", name, e);
            SwitchRequestError::from(e)
        })
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Everything the panel shows, at the current blink phase.
    pub fn snapshot(&self) -> PanelSnapshot {
        let rr = &self.railroad;

        let blocks = rr
            .blocks()
            .map(|(_, b)| BlockView {
                name: b.name().to_string(),
                occupied: b.is_occupied(),
                manual: b.is_manual(),
                powered: b.is_powered(),
                lined: b.is_lined(),
                lined_left_bound: b.lined_left_bound(),
            })
            .collect();

        let switches = rr
            .switches()
            .map(|(_, s)| SwitchView {
                name: s.name().to_string(),
                pos: s.pos(),
                normal: s.is_normal(),
                reverse: s.is_reverse(),
                manual: s.is_manual(),
                occupied: s.is_occupied(),
                locked: s.is_locked(),
                lined: s.is_lined(),
                status: s.status_color(),
            })
            .collect();

        let signals = rr
            .signals()
            .map(|(_, s)| SignalView {
                name: s.name().to_string(),
                pos: s.pos(),
                kind: s.kind(),
                lined: s.is_lined(),
                unverified: s.is_unverified(),
                blinky: s.is_blinky(),
                color: s.display_color(self.blink_on),
            })
            .collect();

        let control_points = self
            .control_points
            .iter()
            .map(|cp| ControlPointView {
                name: cp.name().to_string(),
                kind: cp.kind(),
                lining: cp.lining(),
                entrances: cp
                    .entrances()
                    .into_iter()
                    .map(|(role, id)| (role, rr.signal(id).name().to_string()))
                    .collect(),
            })
            .collect();

        let mut cells: Vec<CellView> = rr
            .grid
            .cells()
            .into_iter()
            .map(|c| CellView {
                pos: c.pos,
                segment: c.segment,
                color: c.color,
                switch_position: c.segment.is_switch().then_some(c.switch_position),
            })
            .collect();
        cells.sort_by_key(|c| c.pos);

        PanelSnapshot {
            layout_name: self.layout_name.clone(),
            blink_on: self.blink_on,
            packets_per_second: self.packets_per_second,
            dropped_packets: self.dropped(),
            fast_clock: self.fast_clock.as_ref().map(FastClockStatus::status_line),
            blocks,
            switches,
            signals,
            control_points,
            cells,
            labels: self.labels.clone(),
        }
    }
}

impl<C: Clock> core::fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("layout_name", &self.layout_name)
            .field("control_points", &self.control_points.len())
            .field("inbound", &self.inbound)
            .field("blink_on", &self.blink_on)
            .finish_non_exhaustive()
    }
}

fn ticks_per_second(tick_ms: u64) -> u32 {
    u32::try_from(1000 / tick_ms.max(1)).unwrap_or(u32::MAX).max(1)
}

// ============================================================================
// Snapshot types
// ============================================================================

/// Serializable view of the whole panel.
#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub layout_name: String,
    pub blink_on: bool,
    pub packets_per_second: u32,
    pub dropped_packets: u64,
    pub fast_clock: Option<String>,
    pub blocks: Vec<BlockView>,
    pub switches: Vec<SwitchView>,
    pub signals: Vec<SignalView>,
    pub control_points: Vec<ControlPointView>,
    pub cells: Vec<CellView>,
    pub labels: Vec<PanelLabel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockView {
    pub name: String,
    pub occupied: bool,
    pub manual: bool,
    pub powered: bool,
    pub lined: bool,
    pub lined_left_bound: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchView {
    pub name: String,
    pub pos: GridPos,
    pub normal: bool,
    pub reverse: bool,
    pub manual: bool,
    pub occupied: bool,
    pub locked: bool,
    pub lined: bool,
    pub status: CellColor,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalView {
    pub name: String,
    pub pos: GridPos,
    pub kind: SignalKind,
    pub lined: bool,
    pub unverified: bool,
    pub blinky: bool,
    /// Color at the current blink phase.
    pub color: CellColor,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlPointView {
    pub name: String,
    pub kind: PlantKind,
    pub lining: Lining,
    pub entrances: Vec<(Role, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellView {
    pub pos: GridPos,
    pub segment: SegmentType,
    pub color: CellColor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_position: Option<SwitchPosition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockSensors;
    use crate::cells::GridPos;
    use crate::hal::MockClock;
    use crate::sensor::SensorBit;
    use crate::signal::Signal;
    use crate::switch::{Switch, SwitchSensors};

    fn occupancy_pkt(occupied: bool) -> Packet {
        Packet::new(0xFF, 0x20, b'S', vec![u8::from(occupied)])
    }

    fn dispatcher() -> Dispatcher<MockClock> {
        let mut rr = Railroad::new();
        let sensors = BlockSensors {
            occupancy: SensorBit::from_pattern("0x20,S,6:0").unwrap(),
            ..BlockSensors::default()
        };
        rr.add_block(
            "B1",
            sensors,
            (0..4).map(|x| (GridPos::new(x, 0), SegmentType::Horizontal)),
        );
        let switch = Switch::new(
            "SW1",
            GridPos::new(5, 2),
            SegmentType::SwitchRightDown,
            SwitchSensors::default(),
        )
        .with_commands(
            Some(Packet::new(0x30, 0xFE, b'N', vec![])),
            Some(Packet::new(0x30, 0xFE, b'R', vec![])),
        );
        rr.add_switch(switch, None);
        rr.add_signal(Signal::new(
            "LONE",
            GridPos::new(8, 1),
            SignalKind::SingleLeft,
            SensorBit::default(),
        ));
        Dispatcher::new(rr, MockClock::new()).with_layout_name("Test Layout")
    }

    #[test]
    fn tick_drains_in_order() {
        let mut d = dispatcher();
        assert!(d.enqueue(occupancy_pkt(true)));
        assert!(d.enqueue(occupancy_pkt(false)));
        assert_eq!(d.queued(), 2);

        assert_eq!(d.tick(), 2);
        let b1 = d.railroad().find_block("B1").unwrap();
        assert!(!d.railroad().block(b1).is_occupied());
        assert_eq!(d.tick(), 0);
    }

    #[test]
    fn blink_toggles_every_six_ticks() {
        let mut d = dispatcher();
        let start = d.blink_on();
        for _ in 0..5 {
            d.tick();
        }
        assert_eq!(d.blink_on(), start);
        d.tick();
        assert_eq!(d.blink_on(), !start);
        for _ in 0..6 {
            d.tick();
        }
        assert_eq!(d.blink_on(), start);
    }

    #[test]
    fn packet_rate_over_ten_ticks() {
        let mut d = dispatcher();
        for _ in 0..10 {
            for _ in 0..3 {
                assert!(d.enqueue(occupancy_pkt(true)));
            }
            d.tick();
        }
        assert_eq!(d.packets_per_second(), 30);
    }

    #[test]
    fn overflow_is_counted() {
        let mut d = dispatcher();
        for _ in 0..INBOUND_CAPACITY {
            assert!(d.enqueue(occupancy_pkt(true)));
        }
        assert!(!d.enqueue(occupancy_pkt(true)));
        assert_eq!(d.dropped(), 1);
        assert_eq!(d.tick(), INBOUND_CAPACITY);
    }

    #[test]
    fn signal_requests_need_a_control_point() {
        let mut d = dispatcher();
        assert_eq!(
            d.line_route("NOPE"),
            Err(RouteDenied::UnknownSignal("NOPE".into()))
        );
        assert_eq!(
            d.line_route("LONE"),
            Err(RouteDenied::NoControlPoint("LONE".into()))
        );
    }

    #[test]
    fn throw_switch_sends_command() {
        let mut d = dispatcher();
        d.throw_switch("SW1").unwrap();
        let out = d.take_outbound();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cmd, b'R');

        // Awaiting confirmation: the next click asks for normal.
        d.throw_switch("SW1").unwrap();
        assert_eq!(d.take_outbound()[0].cmd, b'N');

        assert_eq!(
            d.throw_switch("SW9"),
            Err(SwitchRequestError::UnknownSwitch("SW9".into()))
        );
    }

    #[test]
    fn fast_clock_only_from_configured_node() {
        let mut d = dispatcher().with_fast_clock_address(0x0C);
        let data = vec![9, 41, 7, 0, 14, 15, 0, 0, 4, 0x7E, 0x83, 15];

        d.apply_packet(&Packet::new(0xFF, 0x0D, b'T', data.clone()));
        assert!(d.fast_clock().is_none());

        d.apply_packet(&Packet::new(0xFF, 0x0C, b'T', data));
        let snap = d.snapshot();
        assert_eq!(snap.fast_clock.as_deref(), Some("FAST: 14:15:00   REAL: 09:41:07"));
    }

    #[test]
    fn snapshot_lists_everything() {
        let mut d = dispatcher();
        d.recalculate_all();
        let snap = d.snapshot();
        assert_eq!(snap.layout_name, "Test Layout");
        assert_eq!(snap.blocks.len(), 1);
        assert_eq!(snap.switches.len(), 1);
        assert_eq!(snap.signals.len(), 1);
        assert_eq!(snap.cells.len(), 5);
        assert_eq!(snap.cells[0].pos, GridPos::new(0, 0));
        assert!(snap.cells.iter().all(|c| c.color != CellColor::TrackOccupied));

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["signals"][0]["color"], "signal_unknown");
    }
}
