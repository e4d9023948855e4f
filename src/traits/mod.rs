//! Trait definitions for the panel's outside world.
//!
//! The interlocking core never reads a wall clock or touches a socket
//! directly. It is handed a [`Clock`] for timelocks and switch timeouts, and
//! the bus services talk through [`MqttClient`], so the same code runs
//! against a real broker or the mocks in [`crate::hal`].
//!
//! # Submodules
//!
//! - `clock`: millisecond time source
//! - `network`: publish/subscribe transport

pub mod clock;
pub mod network;

pub use clock::*;
pub use network::*;
