//! Control points: the interlocking plants that grant and cancel routes.
//!
//! A control point owns a set of entrance signals, the switches and blocks
//! between them, and the sensors its field unit reports the lined route
//! through. Operators never line a route directly; they ask the plant, and
//! the plant sends a route command to the field. Lining happens when the
//! field reports it back.
//!
//! # Plants
//!
//! | Plant | Config type | Entrances | Lined state |
//! |-------|-------------|-----------|-------------|
//! | [`SidingPlant`] | `cp` | `points`, `main`, `siding` | one |
//! | [`ThreeWayPlant`] | `cp3` | `points`, `main_a`, `main_b`, `main_c` | one |
//! | [`CrossoverPlant`] | `xo3` | `main_1_w`, `main_1_e`, `main_2_w`, `main_2_e`, `main_3_w` | per main |
//!
//! # Lined State
//!
//! ```text
//!   none --(field reports lined)--> left | right
//!   left | right --(remove_route)--> run_time
//!   run_time --(timelock expires)--> none
//! ```
//!
//! While `run_time` every entrance signal shows blinking stop and the
//! traced route is cleared, so a train already past the signal has time to
//! clear the plant before the points can move.

mod crossover;
mod single;

pub use crossover::{CrossoverEntrance, CrossoverPlant, CrossoverSwitches};
pub use single::{SidingPlant, SidingThroat, SingleTrackPlant, ThreeWayPlant, ThreeWayThroat, Throat};

use serde::{Deserialize, Serialize};

use crate::packet::Packet;
use crate::railroad::{BlockId, Railroad, SignalId};
use crate::sensor::SensorBit;

/// Timelock applied when a layout does not set `timeoutSeconds`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

// ============================================================================
// State
// ============================================================================

/// Route state of one line through a plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinedState {
    /// Nothing lined; the points are free.
    #[default]
    None,
    /// Lined for a train moving left.
    Left,
    /// Lined for a train moving right.
    Right,
    /// Route cancelled, waiting out the timelock.
    RunTime,
}

/// A plant's lined state as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lining {
    /// Single-track plants.
    Single(LinedState),
    /// The crossover plant tracks each main separately.
    Pair {
        main_1: LinedState,
        main_2: LinedState,
    },
}

impl Lining {
    /// True when nothing at all is lined or timing out.
    pub fn is_idle(&self) -> bool {
        match *self {
            Self::Single(state) => state == LinedState::None,
            Self::Pair { main_1, main_2 } => {
                main_1 == LinedState::None && main_2 == LinedState::None
            }
        }
    }
}

/// Which interlocking a control point runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantKind {
    Siding,
    ThreeWay,
    Crossover,
}

impl PlantKind {
    /// Maps a layout `type`. Anything unrecognised is a siding plant.
    pub fn from_config(name: &str) -> Self {
        match name {
            "cp3" => Self::ThreeWay,
            "xo3" => Self::Crossover,
            _ => Self::Siding,
        }
    }
}

/// Role an entrance signal plays within its plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Points,
    Main,
    Siding,
    MainA,
    MainB,
    MainC,
    #[serde(rename = "main_1_w")]
    Main1W,
    #[serde(rename = "main_1_e")]
    Main1E,
    #[serde(rename = "main_2_w")]
    Main2W,
    #[serde(rename = "main_2_e")]
    Main2E,
    #[serde(rename = "main_3_w")]
    Main3W,
}

impl Role {
    /// Parses a layout role name.
    pub fn from_config(name: &str) -> Option<Self> {
        Some(match name {
            "points" => Self::Points,
            "main" => Self::Main,
            "siding" => Self::Siding,
            "main_a" => Self::MainA,
            "main_b" => Self::MainB,
            "main_c" => Self::MainC,
            "main_1_w" => Self::Main1W,
            "main_1_e" => Self::Main1E,
            "main_2_w" => Self::Main2W,
            "main_2_e" => Self::Main2E,
            "main_3_w" => Self::Main3W,
            _ => return None,
        })
    }

    /// Layout role name.
    pub fn config_name(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Main => "main",
            Self::Siding => "siding",
            Self::MainA => "main_a",
            Self::MainB => "main_b",
            Self::MainC => "main_c",
            Self::Main1W => "main_1_w",
            Self::Main1E => "main_1_e",
            Self::Main2W => "main_2_w",
            Self::Main2E => "main_2_e",
            Self::Main3W => "main_3_w",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.config_name())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a route request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteDenied {
    #[error("no signal named {0:?}")]
    UnknownSignal(String),
    #[error("signal is not an entrance to this control point")]
    NotAnEntrance,
    #[error("signal {0:?} does not belong to a control point")]
    NoControlPoint(String),
    #[error("a route is already lined through the control point")]
    AlreadyLined,
    #[error("the interlocking is occupied or under manual control")]
    InterlockingOccupied,
    #[error("points are lined against {role}")]
    PointsMisaligned { role: Role },
    #[error("no route is lined")]
    NoRouteLined,
    #[error("signal is not displaying proceed")]
    SignalNotLined,
}

/// Failure while recomputing a plant from telemetry. The plant keeps
/// whatever state it had reached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecomputeError {
    #[error("control point [{control_point}] is lined {direction} but no exit matches the points")]
    UnresolvedExit {
        control_point: String,
        direction: &'static str,
    },
}

/// A plant definition that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlantError {
    #[error("control point [{control_point}] has no {role} entrance")]
    MissingEntrance { control_point: String, role: Role },
    #[error("control point [{control_point}] does not use a {role} entrance")]
    UnexpectedEntrance { control_point: String, role: Role },
}

// ============================================================================
// Building blocks
// ============================================================================

/// An entrance signal with the commands that line and cancel its route.
#[derive(Debug, Clone)]
pub struct Entrance {
    pub role: Role,
    pub signal: SignalId,
    pub route_cmd: Packet,
    pub clear_cmd: Packet,
}

/// Post-cancel hold on the points.
#[derive(Debug, Clone, Copy)]
pub struct Timelock {
    timeout_ms: u64,
    started_at: u64,
}

impl Timelock {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            started_at: 0,
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(secs.saturating_mul(1000))
    }

    /// Restarts the hold at `now_ms`.
    pub fn start(&mut self, now_ms: u64) {
        self.started_at = now_ms;
    }

    /// True once the hold has run its full length.
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_at) >= self.timeout_ms
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

/// Feeds `pkt` to a plant sensor. True if the bit flipped or the packet
/// is a report from the sensor's field unit.
pub(crate) fn feed_sensor(bit: &mut SensorBit, pkt: &Packet) -> bool {
    let flipped = bit.test_packet(pkt);
    flipped || bit.packet_applies(pkt)
}

/// True if any of `blocks` is occupied or under manual control.
pub(crate) fn any_block_busy(rr: &Railroad, blocks: &[BlockId]) -> bool {
    blocks.iter().any(|&b| {
        let block = rr.block(b);
        block.is_occupied() || block.is_manual()
    })
}

// ============================================================================
// Trait
// ============================================================================

/// An interlocking plant.
///
/// Plants hold no references into the railroad; every call is handed the
/// [`Railroad`] to read and update. Outbound commands go to its outbox.
pub trait Interlocking: Send + core::fmt::Debug {
    /// Control point name.
    fn name(&self) -> &str;

    /// Plant type.
    fn kind(&self) -> PlantKind;

    /// Current lined state.
    fn lining(&self) -> Lining;

    /// Entrance signals, in configuration order.
    fn entrances(&self) -> Vec<(Role, SignalId)>;

    /// Blocks inside the plant.
    fn blocks(&self) -> Vec<BlockId>;

    /// Asks the plant to line a route from `signal`. On success the route
    /// command has been queued; the route lines when the field confirms.
    fn line_route(&mut self, rr: &mut Railroad, signal: SignalId) -> Result<(), RouteDenied>;

    /// Asks the plant to cancel the route `signal` is showing proceed for.
    /// On success the plant enters `run_time` and the clear command is queued.
    fn remove_route(
        &mut self,
        rr: &mut Railroad,
        signal: SignalId,
        now_ms: u64,
    ) -> Result<(), RouteDenied>;

    /// Expires the timelock if due, feeds the plant's sensors, and
    /// recomputes on any change.
    fn process_packet(
        &mut self,
        rr: &mut Railroad,
        pkt: &Packet,
        now_ms: u64,
    ) -> Result<(), RecomputeError>;

    /// Rebuilds signals, locks and traced routes from the lined sensors.
    fn recalculate_state(&mut self, rr: &mut Railroad) -> Result<(), RecomputeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plant_kind_defaults_to_siding() {
        assert_eq!(PlantKind::from_config("cp3"), PlantKind::ThreeWay);
        assert_eq!(PlantKind::from_config("xo3"), PlantKind::Crossover);
        assert_eq!(PlantKind::from_config("cp"), PlantKind::Siding);
        assert_eq!(PlantKind::from_config("whatever"), PlantKind::Siding);
    }

    #[test]
    fn role_names() {
        for name in ["points", "main_b", "main_3_w", "main_2_e"] {
            assert_eq!(Role::from_config(name).map(Role::config_name), Some(name));
        }
        assert_eq!(Role::from_config("switch_AB"), None);
        assert_eq!(
            serde_json::to_string(&Role::Main1E).unwrap(),
            "\"main_1_e\""
        );
    }

    #[test]
    fn timelock_runs_full_length() {
        let mut lock = Timelock::from_secs(20);
        lock.start(5_000);
        assert!(!lock.expired(24_999));
        assert!(lock.expired(25_000));
    }

    #[test]
    fn lining_idle() {
        assert!(Lining::Single(LinedState::None).is_idle());
        assert!(!Lining::Single(LinedState::RunTime).is_idle());
        assert!(!Lining::Pair {
            main_1: LinedState::None,
            main_2: LinedState::Left
        }
        .is_idle());
    }
}
