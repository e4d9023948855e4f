//! # rs-ctc
//!
//! Interlocking core for a model railroad CTC dispatch panel. The panel
//! listens to MRBus traffic relayed over MQTT, keeps a live model of every
//! block, switch and signal, and lines or cancels routes through control
//! points on the dispatcher's request.
//!
//! ## Features
//!
//! - **Sensor decoding**: single bits out of MRBus status packets
//! - **Route tracing**: lined routes painted across the track grid
//! - **Control points**: siding (`cp`), three-way (`cp3`) and crossover (`xo3`) plants
//! - **Timelocks**: a cancelled route holds the plant until its running time expires
//! - **Layout files**: the whole panel built from one `layout.json`
//!
//! ## Architecture
//!
//! - `packet`, `sensor` - MRBus packets and the bits inside them
//! - `cells`, `grid`, `route` - the track diagram and route tracing
//! - `block`, `switch`, `signal`, `railroad` - field entities and their arena
//! - `control_point` - interlocking plants
//! - `dispatcher` - the tick loop that applies packets and operator requests
//! - `layout`, `config` - loading a panel and its runtime settings
//! - `traits`, `hal` - clock and transport abstractions, mocks for tests
//! - `services` - broker bridge and operator API
//!
//! ## Example
//!
//! ```rust
//! use rs_ctc::{hal::MockClock, LayoutDocument};
//!
//! let layout = LayoutDocument::from_json(r#"{
//!     "layoutName": "Demo",
//!     "blocks": [{"name": "B1", "base_x": 0, "base_y": 0,
//!                 "cells": [{"x": "+0", "x_end": "+4", "y": "+0", "type": "horiz"}]}],
//!     "switches": [{"name": "SW1", "x": 5, "y": 0, "type": "switch_right_down", "block": "B1",
//!                   "cmdNormal": "0x30,T,1,0", "cmdReverse": "0x30,T,1,1"}]
//! }"#).unwrap();
//!
//! let mut dispatcher = layout.build(MockClock::new()).unwrap();
//!
//! // Operator throws the switch; the command goes out on the bus
//! dispatcher.throw_switch("SW1").unwrap();
//! let outbound = dispatcher.take_outbound();
//! assert_eq!(outbound.len(), 1);
//! assert_eq!(outbound[0].dest, 0x30);
//! ```

/// MRBus packets, command specs and the MQTT wire record.
pub mod packet;
/// Single-bit sensors decoded from status packets.
pub mod sensor;

/// Track cell types, colors and grid positions.
pub mod cells;
/// The panel's track grid.
pub mod grid;
/// Route tracing across the grid.
pub mod route;

/// Track blocks.
pub mod block;
/// Field switches.
pub mod switch;
/// Signals.
pub mod signal;
/// Entity arena shared by the whole panel.
pub mod railroad;

/// Interlocking plants.
pub mod control_point;

/// Bounded inbound packet queue.
pub mod queue;
/// Fast-clock broadcast decoding.
pub mod fast_clock;
/// Panel tick loop and operator requests.
pub mod dispatcher;

/// Layout document loading.
pub mod layout;
/// Runtime configuration.
pub mod config;

/// Clock and transport abstractions.
pub mod traits;
/// Concrete clock and mock implementations.
pub mod hal;

/// Broker bridge and operator API.
pub mod services;

// Re-exports for convenience
pub use config::{BusConfig, Config, PanelConfig, WebConfig};
pub use control_point::{Interlocking, Lining, PlantKind, Role, RouteDenied};
pub use dispatcher::{Dispatcher, PanelSnapshot, SwitchRequestError};
pub use layout::{LayoutDocument, LayoutError};
pub use packet::{Packet, PacketError};
pub use railroad::{BlockId, EntityKind, Railroad, SignalId, SwitchId};
pub use sensor::SensorBit;
pub use traits::{Clock, MqttClient, MqttMessage};
