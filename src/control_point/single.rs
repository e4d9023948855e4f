//! Single-track plants: one set of points fanning out to two or three legs.
//!
//! The field unit reports a single lined direction. The exit signal is the
//! `points` signal when it faces the direction of travel, otherwise the leg
//! the points are set for.

use super::{
    any_block_busy, feed_sensor, Entrance, Interlocking, LinedState, Lining, PlantError,
    PlantKind, RecomputeError, Role, RouteDenied, Timelock, DEFAULT_TIMEOUT_SECS,
};
use crate::packet::Packet;
use crate::railroad::{BlockId, Railroad, SignalId, SwitchId};
use crate::sensor::SensorBit;

/// The switch arrangement behind the points signal.
pub trait Throat: core::fmt::Debug + Send {
    /// Plant type this throat makes.
    const KIND: PlantKind;

    /// Entrance roles other than `points`.
    const LEGS: &'static [Role];

    /// Every switch in the throat.
    fn switches(&self) -> Vec<SwitchId>;

    /// True if the points are set against a route from `role`.
    fn misaligned(&self, rr: &Railroad, role: Role) -> bool;

    /// The leg the points currently lead to, if they are confirmed.
    fn aligned_leg(&self, rr: &Railroad) -> Option<Role>;
}

/// One switch dividing main from siding.
#[derive(Debug, Clone, Copy)]
pub struct SidingThroat {
    pub main: SwitchId,
}

impl Throat for SidingThroat {
    const KIND: PlantKind = PlantKind::Siding;
    const LEGS: &'static [Role] = &[Role::Main, Role::Siding];

    fn switches(&self) -> Vec<SwitchId> {
        vec![self.main]
    }

    fn misaligned(&self, rr: &Railroad, role: Role) -> bool {
        let sw = rr.switch(self.main);
        match role {
            Role::Main => sw.is_reverse(),
            Role::Siding => sw.is_normal(),
            _ => false,
        }
    }

    fn aligned_leg(&self, rr: &Railroad) -> Option<Role> {
        let sw = rr.switch(self.main);
        if sw.is_normal() {
            Some(Role::Main)
        } else if sw.is_reverse() {
            Some(Role::Siding)
        } else {
            None
        }
    }
}

/// Two switches in series: AB reversed leads to A, otherwise BC picks B or C.
#[derive(Debug, Clone, Copy)]
pub struct ThreeWayThroat {
    pub ab: SwitchId,
    pub bc: SwitchId,
}

impl Throat for ThreeWayThroat {
    const KIND: PlantKind = PlantKind::ThreeWay;
    const LEGS: &'static [Role] = &[Role::MainA, Role::MainB, Role::MainC];

    fn switches(&self) -> Vec<SwitchId> {
        vec![self.ab, self.bc]
    }

    fn misaligned(&self, rr: &Railroad, role: Role) -> bool {
        let ab = rr.switch(self.ab);
        let bc = rr.switch(self.bc);
        match role {
            Role::MainA => ab.is_normal(),
            Role::MainB => !(ab.is_normal() && bc.is_normal()),
            Role::MainC => !(ab.is_normal() && bc.is_reverse()),
            _ => false,
        }
    }

    fn aligned_leg(&self, rr: &Railroad) -> Option<Role> {
        let ab = rr.switch(self.ab);
        let bc = rr.switch(self.bc);
        if ab.is_reverse() {
            Some(Role::MainA)
        } else if ab.is_normal() && bc.is_normal() {
            Some(Role::MainB)
        } else if ab.is_normal() && bc.is_reverse() {
            Some(Role::MainC)
        } else {
            None
        }
    }
}

/// Base control point with a single switch.
pub type SidingPlant = SingleTrackPlant<SidingThroat>;

/// Three-approach control point.
pub type ThreeWayPlant = SingleTrackPlant<ThreeWayThroat>;

/// A plant with one lined state, generic over its throat.
#[derive(Debug)]
pub struct SingleTrackPlant<T> {
    name: String,
    throat: T,
    points: Entrance,
    legs: Vec<Entrance>,
    block: BlockId,
    blocks: Vec<BlockId>,
    lined_left: SensorBit,
    lined_right: SensorBit,
    aux_sensors: Vec<SensorBit>,
    lined: LinedState,
    timelock: Timelock,
    debug: bool,
}

impl<T: Throat> SingleTrackPlant<T> {
    /// Builds a plant around `block`, the block routes are traced through.
    ///
    /// `entrances` must hold a `points` entrance and one for every leg of
    /// the throat, and nothing else.
    pub fn new(
        name: impl Into<String>,
        throat: T,
        entrances: Vec<Entrance>,
        block: BlockId,
        lined_left: SensorBit,
        lined_right: SensorBit,
    ) -> Result<Self, PlantError> {
        let name = name.into();
        let mut points = None;
        let mut legs = Vec::new();
        for entrance in entrances {
            if entrance.role == Role::Points {
                points = Some(entrance);
            } else if T::LEGS.contains(&entrance.role) {
                legs.push(entrance);
            } else {
                return Err(PlantError::UnexpectedEntrance {
                    control_point: name,
                    role: entrance.role,
                });
            }
        }

        let Some(points) = points else {
            return Err(PlantError::MissingEntrance {
                control_point: name,
                role: Role::Points,
            });
        };
        if let Some(&role) = T::LEGS
            .iter()
            .find(|&&role| !legs.iter().any(|e| e.role == role))
        {
            return Err(PlantError::MissingEntrance {
                control_point: name,
                role,
            });
        }

        Ok(Self {
            name,
            throat,
            points,
            legs,
            block,
            blocks: vec![block],
            lined_left,
            lined_right,
            aux_sensors: Vec::new(),
            lined: LinedState::None,
            timelock: Timelock::from_secs(DEFAULT_TIMEOUT_SECS),
            debug: false,
        })
    }

    /// Adds further blocks inside the plant limits.
    pub fn with_blocks(mut self, blocks: impl IntoIterator<Item = BlockId>) -> Self {
        for block in blocks {
            if !self.blocks.contains(&block) {
                self.blocks.push(block);
            }
        }
        self
    }

    /// Sets the timelock length.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timelock = Timelock::from_secs(secs);
        self
    }

    /// Adds sensors whose reports also trigger a recompute.
    pub fn with_sensors(mut self, sensors: impl IntoIterator<Item = SensorBit>) -> Self {
        self.aux_sensors.extend(sensors);
        self
    }

    /// Logs recomputes at info instead of debug.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Current lined state.
    pub fn lined(&self) -> LinedState {
        self.lined
    }

    fn level(&self) -> log::Level {
        if self.debug {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    fn all_entrances(&self) -> impl Iterator<Item = &Entrance> {
        core::iter::once(&self.points).chain(self.legs.iter())
    }

    fn entrance_for(&self, signal: SignalId) -> Option<&Entrance> {
        self.all_entrances().find(|e| e.signal == signal)
    }

    fn leg(&self, role: Role) -> Option<&Entrance> {
        self.legs.iter().find(|e| e.role == role)
    }

    fn indicate_all(&self, rr: &mut Railroad, green: Option<SignalId>, blinky: bool) {
        for entrance in self.all_entrances() {
            rr.signal_mut(entrance.signal)
                .set_indication(green == Some(entrance.signal), false, blinky);
        }
    }

    /// Lines toward `left_bound` from the field's report.
    fn line_toward(&mut self, rr: &mut Railroad, left_bound: bool) -> Result<(), RecomputeError> {
        self.lined = if left_bound {
            LinedState::Left
        } else {
            LinedState::Right
        };
        for sw in self.throat.switches() {
            rr.switch_mut(sw).set_lock();
        }

        // The points signal governs its own direction whatever the switches say.
        let exit = if rr.signal(self.points.signal).is_left_bound() == left_bound {
            Some(self.points.signal)
        } else {
            self.throat
                .aligned_leg(rr)
                .and_then(|role| self.leg(role))
                .map(|e| e.signal)
        };
        let Some(exit) = exit else {
            return Err(RecomputeError::UnresolvedExit {
                control_point: self.name.clone(),
                direction: if left_bound { "left" } else { "right" },
            });
        };

        self.indicate_all(rr, Some(exit), false);
        let start = rr.signal(exit).track_pos();
        let lined = rr.set_route_trace(self.block, left_bound, start);
        log::log!(
            self.level(),
            "[{}] lined {} from [{}] through {} blocks",
            self.name,
            if left_bound { "left" } else { "right" },
            rr.signal(exit).name(),
            lined.len()
        );
        Ok(())
    }

    fn refresh_switches(&self, rr: &mut Railroad) {
        let switches = self.throat.switches();
        rr.refresh_switch_lining(&switches, &self.blocks);
        for sw in switches {
            rr.recalculate_switch(sw);
        }
    }
}

impl<T: Throat> Interlocking for SingleTrackPlant<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PlantKind {
        T::KIND
    }

    fn lining(&self) -> Lining {
        Lining::Single(self.lined)
    }

    fn entrances(&self) -> Vec<(Role, SignalId)> {
        self.all_entrances().map(|e| (e.role, e.signal)).collect()
    }

    fn blocks(&self) -> Vec<BlockId> {
        self.blocks.clone()
    }

    fn line_route(&mut self, rr: &mut Railroad, signal: SignalId) -> Result<(), RouteDenied> {
        let entrance = self.entrance_for(signal).ok_or(RouteDenied::NotAnEntrance)?;
        let role = entrance.role;
        log::info!(
            "signal [{}] asks [{}] to line {}",
            rr.signal(signal).name(),
            self.name,
            role
        );

        if self.lined != LinedState::None {
            return Err(RouteDenied::AlreadyLined);
        }
        if any_block_busy(rr, &self.blocks) {
            return Err(RouteDenied::InterlockingOccupied);
        }
        if self.throat.misaligned(rr, role) {
            return Err(RouteDenied::PointsMisaligned { role });
        }

        let cmd = entrance.route_cmd.clone();
        rr.send(cmd);
        Ok(())
    }

    fn remove_route(
        &mut self,
        rr: &mut Railroad,
        signal: SignalId,
        now_ms: u64,
    ) -> Result<(), RouteDenied> {
        log::info!(
            "signal [{}] asks [{}] to cancel its route",
            rr.signal(signal).name(),
            self.name
        );
        if self.lined == LinedState::None {
            return Err(RouteDenied::NoRouteLined);
        }
        let entrance = self.entrance_for(signal).ok_or(RouteDenied::NotAnEntrance)?;
        if !rr.signal(signal).is_lined() {
            return Err(RouteDenied::SignalNotLined);
        }
        if any_block_busy(rr, &self.blocks) {
            return Err(RouteDenied::InterlockingOccupied);
        }

        let cmd = entrance.clear_cmd.clone();
        self.lined = LinedState::RunTime;
        self.timelock.start(now_ms);
        rr.send(cmd);
        Ok(())
    }

    fn process_packet(
        &mut self,
        rr: &mut Railroad,
        pkt: &Packet,
        now_ms: u64,
    ) -> Result<(), RecomputeError> {
        let mut changed = false;
        if self.lined == LinedState::RunTime && self.timelock.expired(now_ms) {
            log::info!("timelock on [{}] expired", self.name);
            self.lined = LinedState::None;
            changed = true;
        }

        changed |= feed_sensor(&mut self.lined_left, pkt);
        changed |= feed_sensor(&mut self.lined_right, pkt);
        for sensor in &mut self.aux_sensors {
            changed |= feed_sensor(sensor, pkt);
        }

        if changed {
            self.recalculate_state(rr)
        } else {
            Ok(())
        }
    }

    fn recalculate_state(&mut self, rr: &mut Railroad) -> Result<(), RecomputeError> {
        log::log!(self.level(), "recalculating [{}] from {:?}", self.name, self.lined);

        if self.lined == LinedState::RunTime {
            self.indicate_all(rr, None, true);
            rr.clear_route_trace(self.block);
        } else if self.lined_left.state() {
            self.line_toward(rr, true)?;
        } else if self.lined_right.state() {
            self.line_toward(rr, false)?;
        } else {
            self.lined = LinedState::None;
            for sw in self.throat.switches() {
                rr.switch_mut(sw).clear_lock();
            }
            self.indicate_all(rr, None, false);
            rr.clear_route_trace(self.block);
        }

        self.refresh_switches(rr);
        Ok(())
    }
}
