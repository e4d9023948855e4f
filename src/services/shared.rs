//! Shared panel state for all services.
//!
//! `SharedPanel` wraps the single [`Dispatcher`] so the bus transport, the
//! tick loop and the operator API all act on the same railroad. Requests
//! take the lock for one operation, so an operator click never lands in
//! the middle of a packet being applied.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rs_ctc::dispatcher::Dispatcher;
//! use rs_ctc::hal::MockClock;
//! use rs_ctc::packet::Packet;
//! use rs_ctc::railroad::Railroad;
//! use rs_ctc::services::SharedPanel;
//!
//! let panel = Arc::new(SharedPanel::new(Dispatcher::new(Railroad::new(), MockClock::new())));
//!
//! // Transport side
//! assert!(panel.enqueue(Packet::new(0xFF, 0x40, b'S', vec![0x00])));
//!
//! // Tick side: applies queued packets and hands back commands to send
//! let outbound = panel.tick();
//! assert!(outbound.is_empty());
//! assert_eq!(panel.snapshot().dropped_packets, 0);
//! ```

use std::sync::{Mutex, PoisonError};

use crate::control_point::RouteDenied;
use crate::dispatcher::{Dispatcher, PanelSnapshot, SwitchRequestError};
use crate::packet::Packet;
use crate::traits::Clock;

/// Thread-safe handle on the dispatcher.
///
/// A `Mutex` rather than an `RwLock`: the tick loop writes ten times a
/// second and snapshots are cheap.
pub struct SharedPanel<C: Clock> {
    dispatcher: Mutex<Dispatcher<C>>,
}

impl<C: Clock> SharedPanel<C> {
    pub fn new(dispatcher: Dispatcher<C>) -> Self {
        Self {
            dispatcher: Mutex::new(dispatcher),
        }
    }

    /// Runs `f` with the dispatcher locked.
    ///
    /// A panic in another holder does not wedge the panel; the lock is
    /// recovered and the railroad state used as is.
    pub fn with_dispatcher<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut Dispatcher<C>) -> R,
    {
        let mut guard = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Current panel view.
    pub fn snapshot(&self) -> PanelSnapshot {
        self.with_dispatcher(|d| d.snapshot())
    }

    /// Queues an inbound packet. False if it was dropped.
    pub fn enqueue(&self, pkt: Packet) -> bool {
        self.with_dispatcher(|d| d.enqueue(pkt))
    }

    /// One dispatcher tick. Returns the commands queued for the bus,
    /// including those from operator requests since the last tick.
    pub fn tick(&self) -> Vec<Packet> {
        self.with_dispatcher(|d| {
            d.tick();
            d.take_outbound()
        })
    }

    pub fn line_route(&self, signal: &str) -> Result<(), RouteDenied> {
        self.with_dispatcher(|d| d.line_route(signal))
    }

    pub fn clear_route(&self, signal: &str) -> Result<(), RouteDenied> {
        self.with_dispatcher(|d| d.clear_route(signal))
    }

    pub fn throw_switch(&self, switch: &str) -> Result<(), SwitchRequestError> {
        self.with_dispatcher(|d| d.throw_switch(switch))
    }
}

impl<C: Clock> core::fmt::Debug for SharedPanel<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedPanel").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockClock;
    use crate::railroad::Railroad;

    fn panel() -> SharedPanel<MockClock> {
        SharedPanel::new(Dispatcher::new(Railroad::new(), MockClock::new()))
    }

    #[test]
    fn tick_applies_queued_packets() {
        let panel = panel();
        assert!(panel.enqueue(Packet::new(0xFF, 0x10, b'S', vec![1])));
        assert!(panel.enqueue(Packet::new(0xFF, 0x11, b'S', vec![2])));
        assert_eq!(panel.with_dispatcher(|d| d.queued()), 2);

        panel.tick();
        assert_eq!(panel.with_dispatcher(|d| d.queued()), 0);
    }

    #[test]
    fn unknown_names_are_reported() {
        let panel = panel();
        assert_eq!(
            panel.line_route("nowhere"),
            Err(RouteDenied::UnknownSignal("nowhere".into()))
        );
        assert_eq!(
            panel.throw_switch("nowhere"),
            Err(SwitchRequestError::UnknownSwitch("nowhere".into()))
        );
    }

    #[test]
    fn shared_across_threads() {
        let panel = std::sync::Arc::new(panel());
        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let panel = std::sync::Arc::clone(&panel);
                std::thread::spawn(move || panel.enqueue(Packet::new(0xFF, n, b'S', vec![n])))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(panel.with_dispatcher(|d| d.queued()), 4);
    }
}
