//! Double-crossover plant between two mains, with a third track joining
//! main 1 from the west.
//!
//! ```text
//!   West                                       East
//!                     W-XOVER   E-XOVER
//!      M2W-> |-O         |         |
//!   M2 ------------------+---------+---------------  M2
//!      M1W-> |-O          \       /     O-| <-M2E
//!   M1 ------------------+---------+---------------  M1
//!      M3W-> |-O     /  <- M1_M3        O-| <-M1E
//!   M3 -------------
//! ```
//!
//! Each main keeps its own lined state. A route through a reversed
//! crossover holds both mains. Every lined entrance has its own field
//! sensor; a sensor that is set while the switches match none of the
//! expected arrangements changes nothing.

use super::{
    any_block_busy, feed_sensor, Entrance, Interlocking, LinedState, Lining, PlantError,
    PlantKind, RecomputeError, Role, RouteDenied, Timelock, DEFAULT_TIMEOUT_SECS,
};
use crate::cells::GridPos;
use crate::packet::Packet;
use crate::railroad::{BlockId, Railroad, SignalId, SwitchId};
use crate::sensor::SensorBit;

/// The five switches of the plant.
#[derive(Debug, Clone, Copy)]
pub struct CrossoverSwitches {
    pub e_xover_1: SwitchId,
    pub e_xover_2: SwitchId,
    pub w_xover_1: SwitchId,
    pub w_xover_2: SwitchId,
    pub m1_m3: SwitchId,
}

impl CrossoverSwitches {
    fn all(&self) -> [SwitchId; 5] {
        [
            self.e_xover_1,
            self.e_xover_2,
            self.w_xover_1,
            self.w_xover_2,
            self.m1_m3,
        ]
    }
}

/// An entrance plus the field sensor reporting its route lined.
#[derive(Debug, Clone)]
pub struct CrossoverEntrance {
    pub entrance: Entrance,
    pub sensor: SensorBit,
}

#[derive(Debug, Clone, Copy)]
struct Aligned {
    n: bool,
    r: bool,
}

/// Switch positions read once at the start of a decision.
#[derive(Debug, Clone, Copy)]
struct Points {
    e1: Aligned,
    e2: Aligned,
    w1: Aligned,
    w2: Aligned,
    m13: Aligned,
}

impl Points {
    fn read(rr: &Railroad, sw: &CrossoverSwitches) -> Self {
        let get = |id: SwitchId| {
            let s = rr.switch(id);
            Aligned {
                n: s.is_normal(),
                r: s.is_reverse(),
            }
        };
        Self {
            e1: get(sw.e_xover_1),
            e2: get(sw.e_xover_2),
            w1: get(sw.w_xover_1),
            w2: get(sw.w_xover_2),
            m13: get(sw.m1_m3),
        }
    }

    fn any_crossover_reversed(&self) -> bool {
        self.e1.r || self.e2.r || self.w1.r || self.w2.r
    }

    fn crossovers_normal(&self) -> bool {
        self.e1.n && self.e2.n && self.w1.n && self.w2.n
    }

    fn crossovers_reversed(&self) -> bool {
        self.e1.r && self.e2.r && self.w1.r && self.w2.r
    }
}

/// Which main a route uses when the crossovers are not involved.
fn on_main_1(role: Role) -> bool {
    matches!(role, Role::Main1W | Role::Main1E | Role::Main3W)
}

/// Double-crossover interlocking.
#[derive(Debug)]
pub struct CrossoverPlant {
    name: String,
    switches: CrossoverSwitches,
    main_1_w: CrossoverEntrance,
    main_1_e: CrossoverEntrance,
    main_2_w: CrossoverEntrance,
    main_2_e: CrossoverEntrance,
    main_3_w: CrossoverEntrance,
    main_1: BlockId,
    main_2: BlockId,
    blocks: Vec<BlockId>,
    aux_sensors: Vec<SensorBit>,
    lined_1: LinedState,
    lined_2: LinedState,
    timelock: Timelock,
    debug: bool,
}

impl CrossoverPlant {
    /// Builds the plant. All five entrances are required.
    pub fn new(
        name: impl Into<String>,
        switches: CrossoverSwitches,
        entrances: Vec<CrossoverEntrance>,
        main_1: BlockId,
        main_2: BlockId,
    ) -> Result<Self, PlantError> {
        let name = name.into();
        let mut slots: [Option<CrossoverEntrance>; 5] = Default::default();
        for e in entrances {
            let slot = match e.entrance.role {
                Role::Main1W => 0,
                Role::Main1E => 1,
                Role::Main2W => 2,
                Role::Main2E => 3,
                Role::Main3W => 4,
                role => {
                    return Err(PlantError::UnexpectedEntrance {
                        control_point: name,
                        role,
                    })
                }
            };
            slots[slot] = Some(e);
        }

        let [m1w, m1e, m2w, m2e, m3w] = slots;
        let take = |slot: Option<CrossoverEntrance>, role: Role| {
            slot.ok_or_else(|| PlantError::MissingEntrance {
                control_point: name.clone(),
                role,
            })
        };
        let main_1_w = take(m1w, Role::Main1W)?;
        let main_1_e = take(m1e, Role::Main1E)?;
        let main_2_w = take(m2w, Role::Main2W)?;
        let main_2_e = take(m2e, Role::Main2E)?;
        let main_3_w = take(m3w, Role::Main3W)?;

        Ok(Self {
            name,
            switches,
            main_1_w,
            main_1_e,
            main_2_w,
            main_2_e,
            main_3_w,
            main_1,
            main_2,
            blocks: vec![main_1, main_2],
            aux_sensors: Vec::new(),
            lined_1: LinedState::None,
            lined_2: LinedState::None,
            timelock: Timelock::from_secs(DEFAULT_TIMEOUT_SECS),
            debug: false,
        })
    }

    /// Adds further blocks inside the plant limits, such as the main 3
    /// approach. They hold the plant against crossing routes and cancels.
    pub fn with_blocks(mut self, blocks: impl IntoIterator<Item = BlockId>) -> Self {
        for block in blocks {
            if !self.blocks.contains(&block) {
                self.blocks.push(block);
            }
        }
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timelock = Timelock::from_secs(secs);
        self
    }

    pub fn with_sensors(mut self, sensors: impl IntoIterator<Item = SensorBit>) -> Self {
        self.aux_sensors.extend(sensors);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Lined state of each main.
    pub fn lined(&self) -> (LinedState, LinedState) {
        (self.lined_1, self.lined_2)
    }

    fn level(&self) -> log::Level {
        if self.debug {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    fn all(&self) -> [&CrossoverEntrance; 5] {
        [
            &self.main_1_w,
            &self.main_1_e,
            &self.main_2_w,
            &self.main_2_e,
            &self.main_3_w,
        ]
    }

    fn entrance(&self, role: Role) -> Option<&CrossoverEntrance> {
        self.all().into_iter().find(|e| e.entrance.role == role)
    }

    fn entrance_for(&self, signal: SignalId) -> Option<&Entrance> {
        self.all()
            .into_iter()
            .map(|e| &e.entrance)
            .find(|e| e.signal == signal)
    }

    fn sensor(&self, role: Role) -> bool {
        self.entrance(role).is_some_and(|e| e.sensor.state())
    }

    fn signal(&self, role: Role) -> Option<SignalId> {
        self.entrance(role).map(|e| e.entrance.signal)
    }

    /// Sets the listed signals: `green` shows proceed, the rest stop.
    fn indicate(&self, rr: &mut Railroad, green: Option<Role>, stop: &[Role], blinky: bool) {
        for &role in green.iter().chain(stop) {
            if let Some(signal) = self.signal(role) {
                rr.signal_mut(signal)
                    .set_indication(Some(role) == green, false, blinky);
            }
        }
    }

    fn lock_all(&self, rr: &mut Railroad) {
        for sw in self.switches.all() {
            rr.switch_mut(sw).set_lock();
        }
    }

    fn unlock_all(&self, rr: &mut Railroad) {
        for sw in self.switches.all() {
            rr.switch_mut(sw).clear_lock();
        }
    }

    fn track_pos(&self, rr: &Railroad, role: Role) -> Option<GridPos> {
        self.signal(role).map(|s| rr.signal(s).track_pos())
    }

    /// Lines main 1, or both mains, from `role`'s signal.
    fn line(&mut self, rr: &mut Railroad, role: Role, left_bound: bool, both: bool) {
        let state = if left_bound {
            LinedState::Left
        } else {
            LinedState::Right
        };
        self.lined_1 = if both || on_main_1(role) { state } else { self.lined_1 };
        self.lined_2 = if both || !on_main_1(role) { state } else { self.lined_2 };

        let Some(start) = self.track_pos(rr, role) else {
            return;
        };
        if both || on_main_1(role) {
            rr.set_route_trace(self.main_1, left_bound, start);
        }
        if both || !on_main_1(role) {
            rr.set_route_trace(self.main_2, left_bound, start);
        }
        log::log!(
            self.level(),
            "[{}] lined {} from {} (main 1 {:?}, main 2 {:?})",
            self.name,
            if left_bound { "left" } else { "right" },
            role,
            self.lined_1,
            self.lined_2
        );
    }

    fn recompute_main_1(&mut self, rr: &mut Railroad, p: &Points) {
        use Role::{Main1E, Main1W, Main2E, Main2W, Main3W};

        if self.sensor(Main1E) {
            if p.crossovers_normal() && p.m13.n {
                self.lock_all(rr);
                self.indicate(rr, Some(Main1E), &[Main3W, Main1W], false);
                self.line(rr, Main1E, false, false);
            } else if p.e1.r && p.e2.r {
                self.lock_all(rr);
                self.indicate(rr, Some(Main1E), &[Main1W, Main3W, Main2W, Main2E], false);
                self.line(rr, Main1E, false, true);
            }
        } else if self.sensor(Main1W) {
            if p.crossovers_normal() && p.m13.n {
                self.lock_all(rr);
                self.indicate(rr, Some(Main1W), &[Main1E, Main3W], false);
                self.line(rr, Main1W, true, false);
            } else if p.w1.r && p.w2.r && ((p.e1.n && p.e2.n) || (p.e1.r && p.e2.r)) {
                self.lock_all(rr);
                self.indicate(rr, Some(Main1W), &[Main1E, Main2E, Main2W], false);
                self.line(rr, Main1W, true, true);
            }
        } else if self.sensor(Main3W) {
            if p.m13.r && p.crossovers_normal() {
                self.lock_all(rr);
                self.indicate(rr, Some(Main3W), &[Main1E, Main1W], false);
                self.line(rr, Main3W, true, false);
            } else if p.m13.r && p.e1.r && p.e2.r && p.w1.n && p.w2.n {
                self.lock_all(rr);
                self.indicate(rr, Some(Main3W), &[Main1E, Main1W, Main2E, Main2W], false);
                self.line(rr, Main3W, true, true);
            }
        } else if self.lined_1 == LinedState::RunTime {
            rr.clear_route_trace(self.main_1);
            self.indicate(rr, None, &[Main3W, Main1W, Main1E], true);
        } else {
            self.indicate(rr, None, &[Main3W, Main1W, Main1E], false);
            if p.e1.n && p.w1.n {
                self.lined_1 = LinedState::None;
                rr.clear_route_trace(self.main_1);
            } else if (p.e1.r || p.w1.r) && !(self.sensor(Main2W) || self.sensor(Main2E)) {
                // Lined over the crossover from main 2, which has dropped too.
                self.lined_1 = LinedState::None;
                self.lined_2 = LinedState::None;
                rr.clear_route_trace(self.main_1);
                rr.clear_route_trace(self.main_2);
            }
        }
    }

    fn recompute_main_2(&mut self, rr: &mut Railroad, p: &Points) {
        use Role::{Main1E, Main1W, Main2E, Main2W, Main3W};

        if self.sensor(Main2E) {
            if p.crossovers_normal() {
                self.lock_all(rr);
                self.indicate(rr, Some(Main2E), &[Main2W], false);
                self.line(rr, Main2E, false, false);
            } else if p.crossovers_reversed() || (p.e1.r && p.e2.r && p.w1.n && p.w2.n) {
                self.lock_all(rr);
                self.indicate(rr, Some(Main2E), &[Main2W, Main1W, Main1E], false);
                self.line(rr, Main2E, false, true);
            }
        } else if self.sensor(Main2W) {
            if p.crossovers_normal() {
                self.lock_all(rr);
                self.indicate(rr, Some(Main2W), &[Main2E], false);
                self.line(rr, Main2W, true, false);
            } else if p.crossovers_reversed() || (p.w1.r && p.w2.r && p.e1.n && p.e2.n) {
                self.lock_all(rr);
                self.indicate(rr, Some(Main2W), &[Main2E, Main1W, Main1E], false);
                self.line(rr, Main2W, true, true);
            }
        } else if self.lined_2 == LinedState::RunTime {
            rr.clear_route_trace(self.main_2);
            self.indicate(rr, None, &[Main2W, Main2E], true);
        } else {
            self.indicate(rr, None, &[Main2W, Main2E], false);
            if (p.e2.n && p.w2.n) || (p.e2.r && p.w2.r) {
                self.lined_2 = LinedState::None;
                rr.clear_route_trace(self.main_2);
            } else if (p.e2.r || p.w2.r)
                && !(self.sensor(Main1W) || self.sensor(Main3W) || self.sensor(Main1E))
            {
                self.lined_1 = LinedState::None;
                self.lined_2 = LinedState::None;
                rr.clear_route_trace(self.main_1);
                rr.clear_route_trace(self.main_2);
            }
        }
    }

    /// Points set against a route from `role`.
    fn conflicts(role: Role, p: &Points) -> bool {
        match role {
            Role::Main1E => p.e1.r,
            Role::Main2E => (p.w2.r && !p.e2.r) || (p.e2.n && p.w2.r),
            Role::Main1W => p.w2.r || p.m13.r,
            Role::Main3W => p.w2.r || p.m13.n,
            Role::Main2W => p.e2.r && !p.w2.r,
            _ => false,
        }
    }
}

impl Interlocking for CrossoverPlant {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PlantKind {
        PlantKind::Crossover
    }

    fn lining(&self) -> Lining {
        Lining::Pair {
            main_1: self.lined_1,
            main_2: self.lined_2,
        }
    }

    fn entrances(&self) -> Vec<(Role, SignalId)> {
        self.all()
            .into_iter()
            .map(|e| (e.entrance.role, e.entrance.signal))
            .collect()
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

        let p = Points::read(rr, &self.switches);
        let crossing = p.any_crossover_reversed();

        let already = if crossing {
            self.lined_1 != LinedState::None || self.lined_2 != LinedState::None
        } else if on_main_1(role) {
            self.lined_1 != LinedState::None
        } else {
            self.lined_2 != LinedState::None
        };
        if already {
            return Err(RouteDenied::AlreadyLined);
        }

        let scope = if crossing {
            self.blocks.clone()
        } else if on_main_1(role) {
            // Main 3 routes run onto main 1 through the m1_m3 switch.
            vec![self.main_1]
        } else {
            vec![self.main_2]
        };
        if any_block_busy(rr, &scope) {
            return Err(RouteDenied::InterlockingOccupied);
        }

        if Self::conflicts(role, &p) {
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
        let entrance = self.entrance_for(signal).ok_or(RouteDenied::NotAnEntrance)?;
        let role = entrance.role;
        log::info!(
            "signal [{}] asks [{}] to cancel {}",
            rr.signal(signal).name(),
            self.name,
            role
        );
        if !rr.signal(signal).is_lined() {
            return Err(RouteDenied::SignalNotLined);
        }
        if any_block_busy(rr, &self.blocks) {
            return Err(RouteDenied::InterlockingOccupied);
        }

        let cmd = entrance.clear_cmd.clone();
        if Points::read(rr, &self.switches).any_crossover_reversed() {
            self.lined_1 = LinedState::RunTime;
            self.lined_2 = LinedState::RunTime;
        } else if on_main_1(role) {
            self.lined_1 = LinedState::RunTime;
        } else {
            self.lined_2 = LinedState::RunTime;
        }
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
        // Both mains share one timelock.
        if self.timelock.expired(now_ms) {
            if self.lined_1 == LinedState::RunTime {
                self.lined_1 = LinedState::None;
                log::info!("timelock on [{}] main 1 expired", self.name);
                changed = true;
            }
            if self.lined_2 == LinedState::RunTime {
                self.lined_2 = LinedState::None;
                log::info!("timelock on [{}] main 2 expired", self.name);
                changed = true;
            }
        }

        for entrance in [
            &mut self.main_1_w,
            &mut self.main_1_e,
            &mut self.main_2_w,
            &mut self.main_2_e,
            &mut self.main_3_w,
        ] {
            changed |= feed_sensor(&mut entrance.sensor, pkt);
        }
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
        log::log!(
            self.level(),
            "recalculating [{}] from main 1 {:?}, main 2 {:?}",
            self.name,
            self.lined_1,
            self.lined_2
        );

        let p = Points::read(rr, &self.switches);
        self.recompute_main_1(rr, &p);
        self.recompute_main_2(rr, &p);

        if self.lined_1 == LinedState::None && self.lined_2 == LinedState::None {
            self.unlock_all(rr);
        }

        let switches = self.switches.all();
        rr.refresh_switch_lining(&switches, &[self.main_1, self.main_2]);
        for sw in switches {
            rr.recalculate_switch(sw);
        }
        Ok(())
    }
}
