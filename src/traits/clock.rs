//! Time source.

/// Millisecond time source.
///
/// Control point timelocks and the switch throw timeout are polled against
/// this clock on every tick, so tests can step time with
/// [`MockClock`](crate::hal::MockClock) instead of sleeping.
///
/// ```rust
/// use rs_ctc::hal::MockClock;
/// use rs_ctc::traits::Clock;
///
/// let mut clock = MockClock::new();
/// clock.advance(20_000);
/// assert_eq!(clock.now_ms(), 20_000);
/// ```
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}
