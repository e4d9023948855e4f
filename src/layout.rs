//! Layout document: the `layout.json` file that describes a panel.
//!
//! The document names every block, switch, signal and control point, where
//! each is drawn, and which sensor bits and command packets belong to it.
//! [`LayoutDocument::build`] turns it into a ready [`Dispatcher`].
//!
//! # Shape
//!
//! ```text
//! {
//!   "layoutName": "Crescent Northwestern",
//!   "mqttHost": "localhost", "mqttPort": 1883,
//!   "fastClockAddress": "0x0C",
//!   "text":     [{"value": "EAST YARD", "x": 3, "y": 1, "type": "blockname"}],
//!   "blocks":   [{"name": "B1", "base_x": 10, "base_y": 4,
//!                 "sensorOccupancy": "0x30,S,6:0", "leftBlock": "B0",
//!                 "cells": [{"x": "+0", "x_end": "+6", "y": "+0", "type": "horiz"}]}],
//!   "switches": [{"name": "SW1", "x": 17, "y": 4, "type": "switch_right_down",
//!                 "sensorNormal": "0x30,S,6:3", "cmdNormal": "0x30,N"}],
//!   "signals":  [{"name": "S1", "x": 16, "y": 5, "type": "signal_right"}],
//!   "controlPoints": [{"name": "CP1", "type": "cp", "timeoutSeconds": 20,
//!                 "entranceSignals": [{"role": "points", "name": "S1",
//!                                      "cmd": "0x30,L,1", "clr_cmd": "0x30,L,0"}],
//!                 "switches": [{"role": "main", "name": "SW1"}],
//!                 "blocks":   [{"role": "main", "name": "B1"}],
//!                 "sensors":  [{"role": "sensorLinedLeft", "source": "0x30,S,6:1"}]}]
//! }
//! ```
//!
//! Cell coordinates are absolute numbers, or strings `"+N"`/`"-N"` relative
//! to the block's `base_x`/`base_y`. `x_end`/`y_end` fill an inclusive run
//! of cells.
//!
//! Sensor patterns that do not parse leave that sensor inert and are only
//! logged. Unknown entity names, missing roles and bad command specs fail
//! the build.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::block::BlockSensors;
use crate::cells::{GridPos, SegmentType, SignalKind};
use crate::control_point::{
    CrossoverEntrance, CrossoverPlant, CrossoverSwitches, Entrance, Interlocking, PlantError,
    PlantKind, Role, SidingPlant, SidingThroat, ThreeWayPlant, ThreeWayThroat,
    DEFAULT_TIMEOUT_SECS,
};
use crate::dispatcher::{Dispatcher, PanelLabel};
use crate::packet::{Packet, PacketError};
use crate::railroad::{BlockId, EntityKind, Railroad, SignalId, SwitchId};
use crate::sensor::SensorBit;
use crate::signal::Signal;
use crate::switch::{Switch, SwitchSensors};
use crate::traits::Clock;

/// Control point sensor role reporting a route lined leftward.
pub const SENSOR_LINED_LEFT: &str = "sensorLinedLeft";
/// Control point sensor role reporting a route lined rightward.
pub const SENSOR_LINED_RIGHT: &str = "sensorLinedRight";

// ============================================================================
// Errors
// ============================================================================

/// Why a layout could not be built.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("layout is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} [{name}] is defined twice")]
    Duplicate { kind: EntityKind, name: String },

    #[error("{context} refers to unknown {kind} [{name}]")]
    UnknownEntity {
        context: String,
        kind: EntityKind,
        name: String,
    },

    #[error("{context}: {value:?} is not a valid {what}")]
    BadValue {
        context: String,
        what: &'static str,
        value: String,
    },

    #[error("control point [{control_point}] has unknown role {role:?}")]
    UnknownRole { control_point: String, role: String },

    #[error("control point [{control_point}] is missing its {role} {kind}")]
    MissingRole {
        control_point: String,
        kind: EntityKind,
        role: &'static str,
    },

    #[error("control point [{control_point}] needs a {role} sensor")]
    MissingSensor {
        control_point: String,
        role: &'static str,
    },

    #[error("control point [{control_point}] {role} command: {source}")]
    BadCommand {
        control_point: String,
        role: Role,
        #[source]
        source: PacketError,
    },

    #[error(transparent)]
    Plant(#[from] PlantError),
}

// ============================================================================
// Document
// ============================================================================

/// A number, flag or string as found in hand-written layout files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl Scalar {
    /// Integer value. Strings may be decimal or carry a `0x`, `0o` or `0b`
    /// prefix.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(text) => parse_int(text),
        }
    }

    /// Truthiness: `1`, `true` and non-zero strings are set.
    pub fn as_flag(&self) -> bool {
        self.as_int().is_some_and(|n| n != 0)
    }

    /// Grid coordinate: `"+N"`/`"-N"` is relative to `base`, anything else
    /// absolute.
    pub fn coordinate(&self, base: i32) -> Option<i32> {
        let offset = match self {
            Self::Text(text) if text.trim().starts_with(&['+', '-'][..]) => parse_int(text)?,
            _ => return self.as_int().and_then(|n| i32::try_from(n).ok()),
        };
        i32::try_from(i64::from(base) + offset).ok()
    }

    fn describe(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Parses an integer with an optional sign and radix prefix.
fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = match digits.get(..2) {
        Some("0x" | "0X") => (16, &digits[2..]),
        Some("0o" | "0O") => (8, &digits[2..]),
        Some("0b" | "0B") => (2, &digits[2..]),
        _ => (10, digits),
    };
    let value = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

/// The whole `layout.json` document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    #[serde(default)]
    pub layout_name: Option<String>,
    #[serde(default)]
    pub mqtt_host: Option<String>,
    #[serde(default)]
    pub mqtt_port: Option<Scalar>,
    #[serde(default)]
    pub fast_clock_address: Option<Scalar>,
    #[serde(default)]
    pub text: Vec<TextConfig>,
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
    #[serde(default)]
    pub switches: Vec<SwitchConfig>,
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
    #[serde(default)]
    pub control_points: Vec<ControlPointConfig>,
}

/// A text label.
#[derive(Debug, Clone, Deserialize)]
pub struct TextConfig {
    pub value: String,
    pub x: Scalar,
    pub y: Scalar,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConfig {
    pub name: String,
    #[serde(default)]
    pub sensor_manual: Option<String>,
    #[serde(default)]
    pub sensor_occupancy: Option<String>,
    #[serde(default)]
    pub sensor_power: Option<String>,
    #[serde(rename = "base_x", default)]
    pub base_x: Option<Scalar>,
    #[serde(rename = "base_y", default)]
    pub base_y: Option<Scalar>,
    #[serde(default)]
    pub left_block: Option<String>,
    #[serde(default)]
    pub right_block: Option<String>,
    #[serde(default)]
    pub cells: Vec<CellConfig>,
}

/// A cell, or an inclusive rectangle of identical cells.
#[derive(Debug, Clone, Deserialize)]
pub struct CellConfig {
    pub x: Scalar,
    pub y: Scalar,
    #[serde(default)]
    pub x_end: Option<Scalar>,
    #[serde(default)]
    pub y_end: Option<Scalar>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchConfig {
    pub name: String,
    pub x: Scalar,
    pub y: Scalar,
    #[serde(rename = "type")]
    pub kind: String,
    /// Block the points sit in. Defaults to the primary block of the
    /// control point that names this switch.
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub sensor_normal: Option<String>,
    #[serde(default)]
    pub sensor_reverse: Option<String>,
    #[serde(default)]
    pub sensor_manual: Option<String>,
    #[serde(default)]
    pub sensor_occupancy: Option<String>,
    #[serde(default)]
    pub cmd_normal: Option<String>,
    #[serde(default)]
    pub cmd_reverse: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalConfig {
    pub name: String,
    pub x: Scalar,
    pub y: Scalar,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sensor_lined: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPointConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<Scalar>,
    #[serde(default)]
    pub debug: Option<Scalar>,
    #[serde(default)]
    pub entrance_signals: Vec<EntranceConfig>,
    #[serde(default)]
    pub switches: Vec<RoleBinding>,
    #[serde(default)]
    pub blocks: Vec<RoleBinding>,
    #[serde(default)]
    pub sensors: Vec<SensorBinding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntranceConfig {
    pub role: String,
    pub name: String,
    pub cmd: String,
    pub clr_cmd: String,
    /// Lined sensor for this entrance, used by crossover plants.
    #[serde(default)]
    pub sensor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleBinding {
    pub role: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorBinding {
    pub role: String,
    pub source: String,
}

impl LayoutDocument {
    /// Parses a layout document.
    pub fn from_json(text: &str) -> Result<Self, LayoutError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a layout file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read layout file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("cannot parse layout file {}", path.display()))
    }

    /// Broker port, if the layout sets one.
    pub fn mqtt_port(&self) -> Result<Option<u16>, LayoutError> {
        self.mqtt_port
            .as_ref()
            .map(|v| {
                v.as_int()
                    .and_then(|n| u16::try_from(n).ok())
                    .ok_or_else(|| bad_value("layout", "port", v))
            })
            .transpose()
    }

    /// Fast-clock node address, if the layout sets one.
    pub fn fast_clock_address(&self) -> Result<Option<u8>, LayoutError> {
        self.fast_clock_address
            .as_ref()
            .map(|v| {
                v.as_int()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| bad_value("fastClockAddress", "bus address", v))
            })
            .transpose()
    }

    /// Builds the railroad and every control point, and recomputes the
    /// initial state.
    pub fn build<C: Clock>(&self, clock: C) -> Result<Dispatcher<C>, LayoutError> {
        let mut rr = Railroad::new();

        self.add_blocks(&mut rr)?;
        self.add_switches(&mut rr)?;
        self.add_signals(&mut rr)?;

        let mut dispatcher = Dispatcher::new(rr, clock)
            .with_layout_name(self.layout_name.clone().unwrap_or_default())
            .with_labels(self.labels()?);
        if let Some(address) = self.fast_clock_address()? {
            dispatcher = dispatcher.with_fast_clock_address(address);
        }

        for cp in &self.control_points {
            let plant = build_control_point(cp, dispatcher.railroad())?;
            dispatcher.add_control_point(plant);
        }

        dispatcher.recalculate_all();
        log::info!(
            "layout [{}] built: {} blocks, {} switches, {} signals, {} control points",
            dispatcher.layout_name(),
            self.blocks.len(),
            self.switches.len(),
            self.signals.len(),
            self.control_points.len()
        );
        Ok(dispatcher)
    }

    fn labels(&self) -> Result<Vec<PanelLabel>, LayoutError> {
        self.text
            .iter()
            .map(|t| {
                let context = || format!("label {:?}", t.value);
                Ok(PanelLabel {
                    pos: GridPos::new(coordinate(&t.x, 0, &context)?, coordinate(&t.y, 0, &context)?),
                    text: t.value.clone(),
                })
            })
            .collect()
    }

    fn add_blocks(&self, rr: &mut Railroad) -> Result<(), LayoutError> {
        let mut names = HashSet::new();
        for cfg in &self.blocks {
            if !names.insert(cfg.name.as_str()) {
                return Err(duplicate(EntityKind::Block, &cfg.name));
            }
            let context = || format!("block [{}]", cfg.name);
            let base_x = cfg.base_x.as_ref().map_or(Ok(0), |v| coordinate(v, 0, &context))?;
            let base_y = cfg.base_y.as_ref().map_or(Ok(0), |v| coordinate(v, 0, &context))?;

            let mut segments = Vec::new();
            for cell in &cfg.cells {
                let segment = SegmentType::from_config(&cell.kind);
                if segment == SegmentType::Unknown || segment.is_switch() {
                    log::warn!("block [{}]: cell type {:?} not known", cfg.name, cell.kind);
                }
                let x = coordinate(&cell.x, base_x, &context)?;
                let y = coordinate(&cell.y, base_y, &context)?;
                let x_end = cell
                    .x_end
                    .as_ref()
                    .map_or(Ok(x), |v| coordinate(v, base_x, &context))?;
                let y_end = cell
                    .y_end
                    .as_ref()
                    .map_or(Ok(y), |v| coordinate(v, base_y, &context))?;
                for cx in x..=x_end {
                    for cy in y..=y_end {
                        segments.push((GridPos::new(cx, cy), segment));
                    }
                }
            }

            let sensors = BlockSensors::configured(
                cfg.sensor_manual.as_deref(),
                cfg.sensor_occupancy.as_deref(),
                cfg.sensor_power.as_deref(),
            );
            rr.add_block(cfg.name.as_str(), sensors, segments);
        }

        for cfg in &self.blocks {
            let context = format!("block [{}]", cfg.name);
            let left = lookup_block(rr, &context, cfg.left_block.as_deref())?;
            let right = lookup_block(rr, &context, cfg.right_block.as_deref())?;
            if let Some(id) = rr.find_block(&cfg.name) {
                rr.block_mut(id).set_neighbors(left, right);
            }
        }
        Ok(())
    }

    fn add_switches(&self, rr: &mut Railroad) -> Result<(), LayoutError> {
        let mut names = HashSet::new();
        for cfg in &self.switches {
            if !names.insert(cfg.name.as_str()) {
                return Err(duplicate(EntityKind::Switch, &cfg.name));
            }
            let context = || format!("switch [{}]", cfg.name);
            let segment = SegmentType::from_config(&cfg.kind);
            if !segment.is_switch() {
                return Err(LayoutError::BadValue {
                    context: context(),
                    what: "switch type",
                    value: cfg.kind.clone(),
                });
            }
            let pos = GridPos::new(coordinate(&cfg.x, 0, &context)?, coordinate(&cfg.y, 0, &context)?);

            let sensors = SwitchSensors {
                normal: SensorBit::configured(cfg.sensor_normal.as_deref(), false),
                reverse: SensorBit::configured(cfg.sensor_reverse.as_deref(), false),
                manual: SensorBit::configured(cfg.sensor_manual.as_deref(), false),
                occupancy: SensorBit::configured(cfg.sensor_occupancy.as_deref(), false),
            };
            let command = |spec: Option<&String>| -> Result<Option<Packet>, LayoutError> {
                spec.map(|s| {
                    Packet::from_command_spec(s).map_err(|_| LayoutError::BadValue {
                        context: context(),
                        what: "command spec",
                        value: s.clone(),
                    })
                })
                .transpose()
            };
            let switch = Switch::new(cfg.name.as_str(), pos, segment, sensors)
                .with_commands(command(cfg.cmd_normal.as_ref())?, command(cfg.cmd_reverse.as_ref())?);

            let owner_name = cfg.block.as_deref().or_else(|| self.owning_block(&cfg.name));
            let owner = lookup_block(rr, &context(), owner_name)?;
            rr.add_switch(switch, owner);
        }
        Ok(())
    }

    fn add_signals(&self, rr: &mut Railroad) -> Result<(), LayoutError> {
        let mut names = HashSet::new();
        for cfg in &self.signals {
            if !names.insert(cfg.name.as_str()) {
                return Err(duplicate(EntityKind::Signal, &cfg.name));
            }
            let context = || format!("signal [{}]", cfg.name);
            let kind = SignalKind::from_config(&cfg.kind).ok_or_else(|| LayoutError::BadValue {
                context: context(),
                what: "signal type",
                value: cfg.kind.clone(),
            })?;
            let pos = GridPos::new(coordinate(&cfg.x, 0, &context)?, coordinate(&cfg.y, 0, &context)?);
            let sensor = SensorBit::configured(cfg.sensor_lined.as_deref(), false);
            rr.add_signal(Signal::new(cfg.name.as_str(), pos, kind, sensor));
        }
        Ok(())
    }

    /// The primary block of the first control point binding `switch`.
    fn owning_block(&self, switch: &str) -> Option<&str> {
        self.control_points
            .iter()
            .find(|cp| cp.switches.iter().any(|b| b.name == switch))
            .and_then(|cp| cp.blocks.first())
            .map(|b| b.name.as_str())
    }
}

// ============================================================================
// Control points
// ============================================================================

fn build_control_point(
    cfg: &ControlPointConfig,
    rr: &Railroad,
) -> Result<Box<dyn Interlocking>, LayoutError> {
    let kind = PlantKind::from_config(cfg.kind.as_deref().unwrap_or("cp"));
    let context = format!("control point [{}]", cfg.name);

    let timeout = match &cfg.timeout_seconds {
        None => DEFAULT_TIMEOUT_SECS,
        Some(v) => v
            .as_int()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| bad_value(&context, "timeout", v))?,
    };
    let debug = cfg.debug.as_ref().is_some_and(Scalar::as_flag);

    let mut entrances = Vec::new();
    for e in &cfg.entrance_signals {
        let role = Role::from_config(&e.role).ok_or_else(|| LayoutError::UnknownRole {
            control_point: cfg.name.clone(),
            role: e.role.clone(),
        })?;
        let signal = lookup_signal(rr, &context, &e.name)?;
        let command = |spec: &str| {
            Packet::from_command_spec(spec).map_err(|source| LayoutError::BadCommand {
                control_point: cfg.name.clone(),
                role,
                source,
            })
        };
        entrances.push((
            Entrance {
                role,
                signal,
                route_cmd: command(&e.cmd)?,
                clear_cmd: command(&e.clr_cmd)?,
            },
            e.sensor.as_deref(),
        ));
    }

    let switch = |role: &'static str| -> Result<SwitchId, LayoutError> {
        let binding = cfg
            .switches
            .iter()
            .find(|b| switch_role(&b.role) == role)
            .ok_or_else(|| missing(cfg, EntityKind::Switch, role))?;
        lookup_switch(rr, &context, &binding.name)
    };
    let block = |role: &'static str| -> Result<BlockId, LayoutError> {
        let binding = cfg
            .blocks
            .iter()
            .find(|b| b.role == role)
            .ok_or_else(|| missing(cfg, EntityKind::Block, role))?;
        lookup_block(rr, &context, Some(binding.name.as_str()))?
            .ok_or_else(|| missing(cfg, EntityKind::Block, role))
    };
    let sensor = |role: &str| {
        cfg.sensors
            .iter()
            .find(|s| s.role == role)
            .map(|s| SensorBit::configured(Some(s.source.as_str()), false))
    };

    let plant: Box<dyn Interlocking> = match kind {
        PlantKind::Siding | PlantKind::ThreeWay => {
            let main = block("main")?;
            let mut extra = Vec::new();
            for b in cfg.blocks.iter().filter(|b| b.role != "main") {
                extra.extend(lookup_block(rr, &context, Some(b.name.as_str()))?);
            }
            let lined_left = sensor(SENSOR_LINED_LEFT).ok_or_else(|| LayoutError::MissingSensor {
                control_point: cfg.name.clone(),
                role: SENSOR_LINED_LEFT,
            })?;
            let lined_right = sensor(SENSOR_LINED_RIGHT).ok_or_else(|| LayoutError::MissingSensor {
                control_point: cfg.name.clone(),
                role: SENSOR_LINED_RIGHT,
            })?;
            let aux: Vec<SensorBit> = cfg
                .sensors
                .iter()
                .filter(|s| s.role != SENSOR_LINED_LEFT && s.role != SENSOR_LINED_RIGHT)
                .map(|s| SensorBit::configured(Some(s.source.as_str()), false))
                .collect();
            let entrances: Vec<Entrance> = entrances.into_iter().map(|(e, _)| e).collect();

            if kind == PlantKind::ThreeWay {
                let throat = ThreeWayThroat {
                    ab: switch("ab")?,
                    bc: switch("bc")?,
                };
                Box::new(
                    ThreeWayPlant::new(cfg.name.as_str(), throat, entrances, main, lined_left, lined_right)?
                        .with_blocks(extra)
                        .with_timeout_secs(timeout)
                        .with_sensors(aux)
                        .with_debug(debug),
                )
            } else {
                let throat = SidingThroat {
                    main: switch("main")?,
                };
                Box::new(
                    SidingPlant::new(cfg.name.as_str(), throat, entrances, main, lined_left, lined_right)?
                        .with_blocks(extra)
                        .with_timeout_secs(timeout)
                        .with_sensors(aux)
                        .with_debug(debug),
                )
            }
        }
        PlantKind::Crossover => {
            let switches = CrossoverSwitches {
                e_xover_1: switch("e_xover_1")?,
                e_xover_2: switch("e_xover_2")?,
                w_xover_1: switch("w_xover_1")?,
                w_xover_2: switch("w_xover_2")?,
                m1_m3: switch("m1_m3")?,
            };
            let entrances = entrances
                .into_iter()
                .map(|(entrance, pattern)| {
                    let sensor = sensor(entrance.role.config_name())
                        .unwrap_or_else(|| SensorBit::configured(pattern, false));
                    CrossoverEntrance { entrance, sensor }
                })
                .collect();
            let aux: Vec<SensorBit> = cfg
                .sensors
                .iter()
                .filter(|s| Role::from_config(&s.role).is_none())
                .map(|s| SensorBit::configured(Some(s.source.as_str()), false))
                .collect();
            let mut extra = Vec::new();
            for b in cfg.blocks.iter().filter(|b| b.role != "main_1" && b.role != "main_2") {
                extra.extend(lookup_block(rr, &context, Some(b.name.as_str()))?);
            }
            Box::new(
                CrossoverPlant::new(cfg.name.as_str(), switches, entrances, block("main_1")?, block("main_2")?)?
                    .with_blocks(extra)
                    .with_timeout_secs(timeout)
                    .with_sensors(aux)
                    .with_debug(debug),
            )
        }
    };
    Ok(plant)
}

/// Normalizes a switch role: `"switch_AB"` and `"ab"` are the same role.
fn switch_role(role: &str) -> String {
    let role = role.to_ascii_lowercase();
    match role.strip_prefix("switch_") {
        Some(rest) => rest.to_string(),
        None => role,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn coordinate(
    value: &Scalar,
    base: i32,
    context: &dyn Fn() -> String,
) -> Result<i32, LayoutError> {
    value
        .coordinate(base)
        .ok_or_else(|| bad_value(&context(), "coordinate", value))
}

fn bad_value(context: &str, what: &'static str, value: &Scalar) -> LayoutError {
    LayoutError::BadValue {
        context: context.to_string(),
        what,
        value: value.describe(),
    }
}

fn duplicate(kind: EntityKind, name: &str) -> LayoutError {
    LayoutError::Duplicate {
        kind,
        name: name.to_string(),
    }
}

fn missing(cfg: &ControlPointConfig, kind: EntityKind, role: &'static str) -> LayoutError {
    LayoutError::MissingRole {
        control_point: cfg.name.clone(),
        kind,
        role,
    }
}

fn unknown(context: &str, kind: EntityKind, name: &str) -> LayoutError {
    LayoutError::UnknownEntity {
        context: context.to_string(),
        kind,
        name: name.to_string(),
    }
}

fn lookup_block(
    rr: &Railroad,
    context: &str,
    name: Option<&str>,
) -> Result<Option<BlockId>, LayoutError> {
    name.filter(|n| !n.is_empty())
        .map(|n| rr.find_block(n).ok_or_else(|| unknown(context, EntityKind::Block, n)))
        .transpose()
}

fn lookup_switch(rr: &Railroad, context: &str, name: &str) -> Result<SwitchId, LayoutError> {
    rr.find_switch(name)
        .ok_or_else(|| unknown(context, EntityKind::Switch, name))
}

fn lookup_signal(rr: &Railroad, context: &str, name: &str) -> Result<SignalId, LayoutError> {
    rr.find_signal(name)
        .ok_or_else(|| unknown(context, EntityKind::Signal, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_coordinates() {
        let abs = Scalar::Int(7);
        let plus = Scalar::Text("+3".into());
        let minus = Scalar::Text("-2".into());
        let text = Scalar::Text("12".into());
        assert_eq!(abs.coordinate(10), Some(7));
        assert_eq!(plus.coordinate(10), Some(13));
        assert_eq!(minus.coordinate(10), Some(8));
        assert_eq!(text.coordinate(10), Some(12));
        assert_eq!(Scalar::Text("east".into()).coordinate(10), None);
    }

    #[test]
    fn scalar_numbers_and_flags() {
        assert_eq!(Scalar::Text("0x14".into()).as_int(), Some(20));
        assert_eq!(Scalar::Text("0b101".into()).as_int(), Some(5));
        assert_eq!(Scalar::Text(" 20 ".into()).as_int(), Some(20));
        assert!(Scalar::Int(1).as_flag());
        assert!(Scalar::Bool(true).as_flag());
        assert!(!Scalar::Int(0).as_flag());
    }

    #[test]
    fn switch_roles_normalize() {
        assert_eq!(switch_role("switch_AB"), "ab");
        assert_eq!(switch_role("switch_e_xover_1"), "e_xover_1");
        assert_eq!(switch_role("main"), "main");
    }

    #[test]
    fn cell_runs_and_relative_y_end() {
        let doc = LayoutDocument::from_json(
            r#"{"blocks": [{"name": "B", "base_x": 10, "base_y": 2,
                "cells": [{"x": "+0", "x_end": "+2", "y": "+0", "y_end": "+1", "type": "horiz"}]}]}"#,
        )
        .unwrap();
        let d = doc.build(crate::hal::MockClock::new()).unwrap();
        let b = d.railroad().find_block("B").unwrap();
        let cells = d.railroad().block(b).cells();
        assert_eq!(cells.len(), 6);
        assert!(cells.contains(&GridPos::new(12, 3)));
        assert!(!cells.contains(&GridPos::new(12, 11)));
    }

    #[test]
    fn duplicate_names_rejected() {
        let doc = LayoutDocument::from_json(
            r#"{"signals": [{"name": "S", "x": 0, "y": 0, "type": "signal_left"},
                            {"name": "S", "x": 1, "y": 0, "type": "signal_left"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            doc.build(crate::hal::MockClock::new()),
            Err(LayoutError::Duplicate { kind: EntityKind::Signal, .. })
        ));
    }
}
