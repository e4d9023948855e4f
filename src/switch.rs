//! Switch (points) state: position, lock, occupancy and throw commands.

use crate::cells::{CellColor, GridPos, SegmentType, SwitchPosition};
use crate::grid::TrackGrid;
use crate::packet::Packet;
use crate::sensor::SensorBit;

/// How long a thrown switch may stay unconfirmed before the panel falls
/// back to the last reported position.
pub const POSITION_TIMEOUT_MS: u64 = 3_000;

/// Why a throw request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ThrowDenied {
    /// A train is on the points.
    #[error("switch is occupied")]
    Occupied,
    /// An interlocking holds the points for a lined route.
    #[error("switch is locked by its control point")]
    Locked,
    /// The points are under local manual control.
    #[error("switch is under manual control")]
    Manual,
    /// No command is configured for the requested position.
    #[error("no command configured to throw this switch")]
    NoCommand,
}

/// The four sensors a switch reports through.
#[derive(Debug, Clone, Default)]
pub struct SwitchSensors {
    /// Points confirmed normal.
    pub normal: SensorBit,
    /// Points confirmed reverse.
    pub reverse: SensorBit,
    /// Local manual control.
    pub manual: SensorBit,
    /// Train on the points.
    pub occupancy: SensorBit,
}

/// One switch drawn at a single grid cell.
#[derive(Debug, Clone)]
pub struct Switch {
    name: String,
    pos: GridPos,
    segment: SegmentType,
    position_normal: bool,
    position_reverse: bool,
    manual_control: bool,
    occupied: bool,
    locked: bool,
    lined: bool,
    command_normal: Option<Packet>,
    command_reverse: Option<Packet>,
    command_sent_at: Option<u64>,
    status_color: CellColor,
    sensors: SwitchSensors,
}

impl Switch {
    /// Creates a switch. It starts out believed normal.
    pub fn new(
        name: impl Into<String>,
        pos: GridPos,
        segment: SegmentType,
        sensors: SwitchSensors,
    ) -> Self {
        Self {
            name: name.into(),
            pos,
            segment,
            position_normal: true,
            position_reverse: false,
            manual_control: false,
            occupied: false,
            locked: false,
            lined: false,
            command_normal: None,
            command_reverse: None,
            command_sent_at: None,
            status_color: CellColor::SwitchUnknown,
            sensors,
        }
    }

    /// Sets the packets that throw the points each way.
    pub fn with_commands(mut self, normal: Option<Packet>, reverse: Option<Packet>) -> Self {
        self.command_normal = normal;
        self.command_reverse = reverse;
        self
    }

    /// Switch name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grid cell of the points.
    pub fn pos(&self) -> GridPos {
        self.pos
    }

    /// Shape of the points cell.
    pub fn segment(&self) -> SegmentType {
        self.segment
    }

    /// Confirmed normal.
    pub fn is_normal(&self) -> bool {
        self.position_normal
    }

    /// Confirmed reverse.
    pub fn is_reverse(&self) -> bool {
        self.position_reverse
    }

    /// Neither position confirmed.
    pub fn is_indeterminate(&self) -> bool {
        !self.position_normal && !self.position_reverse
    }

    /// Under local manual control.
    pub fn is_manual(&self) -> bool {
        self.manual_control
    }

    /// Train on the points.
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    /// Held by an interlocking.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// On a lined route.
    pub fn is_lined(&self) -> bool {
        self.lined
    }

    /// Time the last unconfirmed throw was sent.
    pub fn command_sent_at(&self) -> Option<u64> {
        self.command_sent_at
    }

    /// Color of the status square.
    pub fn status_color(&self) -> CellColor {
        self.status_color
    }

    /// Feeds a packet to the switch's sensors.
    ///
    /// A switch left indeterminate for longer than [`POSITION_TIMEOUT_MS`]
    /// after a throw reverts to what its sensors last reported, once.
    pub fn process_packet(&mut self, pkt: &Packet, now_ms: u64, grid: &mut TrackGrid) -> bool {
        let mut changed = self.sensors.normal.test_packet(pkt);
        changed |= self.sensors.reverse.test_packet(pkt);
        changed |= self.sensors.manual.test_packet(pkt);
        changed |= self.sensors.occupancy.test_packet(pkt);

        let timed_out = self.is_indeterminate()
            && self
                .command_sent_at
                .is_some_and(|sent| now_ms.saturating_sub(sent) > POSITION_TIMEOUT_MS);
        if timed_out && !changed {
            log::warn!(
                "switch [{}] did not confirm its throw within {} ms",
                self.name,
                POSITION_TIMEOUT_MS
            );
        }

        if changed || timed_out {
            self.position_normal = self.sensors.normal.state();
            self.position_reverse = self.sensors.reverse.state();
            self.manual_control = self.sensors.manual.state();
            self.occupied = self.sensors.occupancy.state();
            if !self.is_indeterminate() || timed_out {
                self.command_sent_at = None;
            }
            self.recalculate_state(grid);
        }
        changed || timed_out
    }

    /// Requests the points be thrown to the other position.
    ///
    /// On success the switch goes indeterminate until telemetry confirms the
    /// new position, and the command to send is returned.
    pub fn throw(&mut self, now_ms: u64, grid: &mut TrackGrid) -> Result<Packet, ThrowDenied> {
        if self.occupied {
            return Err(ThrowDenied::Occupied);
        }
        if self.locked {
            return Err(ThrowDenied::Locked);
        }
        if self.manual_control {
            return Err(ThrowDenied::Manual);
        }

        let command = if self.position_normal {
            self.command_reverse.clone()
        } else {
            self.command_normal.clone()
        };
        let command = command.ok_or(ThrowDenied::NoCommand)?;

        self.position_normal = false;
        self.position_reverse = false;
        self.command_sent_at = Some(now_ms);
        self.recalculate_state(grid);
        Ok(command)
    }

    /// Locks the points against throws.
    pub fn set_lock(&mut self) {
        self.locked = true;
    }

    /// Releases the lock.
    pub fn clear_lock(&mut self) {
        self.locked = false;
    }

    /// Marks whether a lined route runs over the points.
    pub fn set_lined(&mut self, lined: bool) {
        self.lined = lined;
    }

    /// Recomputes status color, track color and position glyph.
    pub fn recalculate_state(&mut self, grid: &mut TrackGrid) {
        // Manual comes first since manual control also shows the OS occupied.
        self.status_color = if self.manual_control {
            CellColor::SwitchManual
        } else if self.locked || self.occupied {
            CellColor::SwitchLocked
        } else if self.position_normal || self.position_reverse {
            CellColor::SwitchNormal
        } else {
            CellColor::SwitchUnknown
        };

        let track = if self.lined {
            CellColor::TrackLined
        } else if self.occupied {
            CellColor::TrackOccupied
        } else {
            CellColor::TrackIdle
        };
        grid.set_color(self.pos, track);

        if self.position_normal {
            grid.set_switch_position(self.pos, SwitchPosition::Normal);
        } else if self.position_reverse {
            grid.set_switch_position(self.pos, SwitchPosition::Reverse);
        }
    }
}
