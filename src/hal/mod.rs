//! Concrete implementations of the traits in [`crate::traits`].
//!
//! - `mock`: test doubles with controllable time and a recording broker
//! - `system`: the host's monotonic clock

pub mod mock;
pub mod system;

pub use mock::*;
pub use system::*;
