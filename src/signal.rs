//! Signals: the entry points operators click to request routes.

use crate::cells::{CellColor, GridPos, SignalKind};
use crate::packet::Packet;
use crate::sensor::SensorBit;

/// One signal head on the panel.
#[derive(Debug, Clone)]
pub struct Signal {
    name: String,
    pos: GridPos,
    kind: SignalKind,
    lined: bool,
    unverified: bool,
    blinky: bool,
    control_point: Option<usize>,
    sensor_lined: SensorBit,
    color: CellColor,
}

impl Signal {
    /// Creates a signal. It starts unverified until the field reports.
    pub fn new(name: impl Into<String>, pos: GridPos, kind: SignalKind, sensor_lined: SensorBit) -> Self {
        Self {
            name: name.into(),
            pos,
            kind,
            lined: false,
            unverified: true,
            blinky: false,
            control_point: None,
            sensor_lined,
            color: CellColor::SignalUnknown,
        }
    }

    /// Signal name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grid cell of the head.
    pub fn pos(&self) -> GridPos {
        self.pos
    }

    /// Head shape.
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Displaying proceed.
    pub fn is_lined(&self) -> bool {
        self.lined
    }

    /// A request is outstanding with no confirming telemetry yet.
    pub fn is_unverified(&self) -> bool {
        self.unverified
    }

    /// Flashing.
    pub fn is_blinky(&self) -> bool {
        self.blinky
    }

    /// Governs trains moving left.
    pub fn is_left_bound(&self) -> bool {
        self.kind.is_left_bound()
    }

    /// Index of the control point this signal belongs to.
    pub fn control_point(&self) -> Option<usize> {
        self.control_point
    }

    /// Attaches the signal to control point `index`.
    pub fn assoc_control_point(&mut self, index: usize) {
        self.control_point = Some(index);
    }

    /// The track cell one step into the interlocking from this head.
    ///
    /// Left-facing heads sit above their track, right-facing heads below.
    pub fn track_pos(&self) -> GridPos {
        if self.is_left_bound() {
            self.pos.offset(0, 1)
        } else {
            self.pos.offset(0, -1)
        }
    }

    /// Steady color, ignoring the blink phase.
    pub fn color(&self) -> CellColor {
        self.color
    }

    /// Color to draw in the given blink phase.
    pub fn display_color(&self, blink_on: bool) -> CellColor {
        if self.blinky && !blink_on {
            CellColor::SignalBlinkOff
        } else {
            self.color
        }
    }

    /// Feeds a packet to the lined sensor.
    ///
    /// While unverified, any telemetry from the sensor's node resolves the
    /// signal even if the bit did not flip.
    pub fn process_packet(&mut self, pkt: &Packet) -> bool {
        let mut changed = self.sensor_lined.test_packet(pkt);
        if self.unverified && self.sensor_lined.packet_applies(pkt) {
            changed = true;
        }

        if changed {
            self.unverified = false;
            self.lined = self.sensor_lined.state();
            self.recalculate_state();
        }
        changed
    }

    /// Sets the indication. Used by the owning control point.
    pub fn set_indication(&mut self, green: bool, unverified: bool, blinky: bool) {
        let changed = self.lined != green || self.unverified != unverified || self.blinky != blinky;
        self.lined = green;
        self.unverified = unverified;
        self.blinky = blinky;
        if changed {
            self.recalculate_state();
        }
    }

    /// Marks a request as sent and awaiting confirmation.
    pub fn mark_unverified(&mut self) {
        self.unverified = true;
        self.recalculate_state();
    }

    /// Recomputes the steady color.
    pub fn recalculate_state(&mut self) {
        self.color = if self.unverified {
            CellColor::SignalUnknown
        } else if self.lined {
            CellColor::SignalLined
        } else {
            CellColor::SignalNormal
        };
    }
}
