//! Mock implementations for testing without a broker or real time.
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`MockMqtt`] | [`MqttClient`] | Captures pub/sub operations |
//!
//! # Example
//!
//! ```rust
//! use rs_ctc::dispatcher::Dispatcher;
//! use rs_ctc::hal::MockClock;
//! use rs_ctc::railroad::Railroad;
//!
//! let mut dispatcher = Dispatcher::new(Railroad::default(), MockClock::new());
//! dispatcher.clock_mut().advance(20_000);
//! dispatcher.tick();
//! assert!(dispatcher.take_outbound().is_empty());
//! ```

use crate::traits::{Clock, MqttClient, MqttMessage};

// ============================================================================
// Time
// ============================================================================

/// Mock clock for deterministic timing tests.
///
/// ```rust
/// use rs_ctc::hal::MockClock;
/// use rs_ctc::traits::Clock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.set(1000);
/// assert_eq!(clock.now_ms(), 1000);
///
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self { current_ms: 0 }
    }

    /// Sets the current time in milliseconds.
    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    /// Advances the clock by the given duration.
    pub fn advance(&mut self, ms: u64) {
        self.current_ms += ms;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

// ============================================================================
// Network
// ============================================================================

/// Mock MQTT client.
///
/// Records publishes and subscriptions; queued messages come back from
/// `try_recv` oldest first.
///
/// ```rust
/// use rs_ctc::hal::MockMqtt;
/// use rs_ctc::traits::MqttClient;
///
/// let mut mqtt = MockMqtt::new();
/// mqtt.queue_message("crnw/raw", br#"{"type":"pkt","src":80,"dst":255,"cmd":83,"data":[1]}"#.to_vec());
/// mqtt.subscribe("crnw/raw").unwrap();
///
/// assert!(mqtt.is_subscribed("crnw/raw"));
/// assert_eq!(mqtt.try_recv().unwrap().topic, "crnw/raw");
/// assert!(mqtt.try_recv().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MockMqtt {
    /// Messages that have been published (topic, payload, retain).
    pub published: Vec<(String, Vec<u8>, bool)>,
    /// Topics that have been subscribed to.
    pub subscriptions: Vec<String>,
    /// Incoming messages, oldest first.
    pub incoming: Vec<MqttMessage>,
    /// Whether the client is connected.
    pub connected: bool,
}

impl MockMqtt {
    /// Creates a new mock MQTT client in connected state.
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    /// Queue an incoming message.
    pub fn queue_message(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.incoming.push(MqttMessage::new(topic, payload));
    }

    /// Check if a topic was subscribed to.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|t| t == topic)
    }

    /// Published messages for a topic.
    pub fn published_to(&self, topic: &str) -> Vec<&(String, Vec<u8>, bool)> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .collect()
    }
}

impl MqttClient for MockMqtt {
    type Error = ();

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ()> {
        if !self.connected {
            return Err(());
        }
        self.published.push((topic.into(), payload.to_vec(), retain));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ()> {
        self.subscriptions.push(topic.into());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        if self.incoming.is_empty() {
            None
        } else {
            Some(self.incoming.remove(0))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
