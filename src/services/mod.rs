//! Services that connect the panel to the outside world.
//!
//! - [`SharedPanel`]: the one dispatcher every service acts on
//! - [`BusRunner`]: MRBus gateway polling over any [`crate::traits::MqttClient`]
//! - `mqtt` feature: `rumqttc` broker bridge with its own tick task
//! - `web` feature: Axum operator API
//!
//! All services share one dispatcher through `Arc<SharedPanel<C>>`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use rs_ctc::services::SharedPanel;
//!
//! let panel = Arc::new(SharedPanel::new(dispatcher));
//!
//! let router = build_router(Arc::clone(&panel), &web_config);
//! let bridge = MqttBridge::new(Arc::clone(&panel), mqtt_config);
//! ```

pub mod api;
pub mod bus;
pub mod shared;

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "web")]
pub mod web;

pub use api::*;
pub use bus::*;
pub use shared::*;

#[cfg(feature = "mqtt")]
pub use mqtt::*;

#[cfg(feature = "web")]
pub use web::*;
