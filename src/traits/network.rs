//! Publish/subscribe transport for the MRBus gateway.
//!
//! The panel never talks to the serial bus itself. A gateway bridges MRBus
//! onto a broker and the panel exchanges text packets with it:
//!
//! ```text
//! crnw/raw   - every packet seen on the bus (subscribe)
//! crnw/send  - packets for the gateway to transmit (publish)
//! ```
//!
//! The prefix comes from [`BusConfig`](crate::config::BusConfig).

/// MQTT client trait for pub/sub messaging.
///
/// Synchronous and non-blocking on receive, so the panel tick can poll it
/// between recomputes. [`MockMqtt`](crate::hal::MockMqtt) implements it
/// for tests; the `mqtt` feature drives a real broker through rumqttc.
///
/// # Example
///
/// ```rust
/// use rs_ctc::hal::MockMqtt;
/// use rs_ctc::packet::Packet;
/// use rs_ctc::traits::MqttClient;
///
/// fn send_packet<M: MqttClient>(client: &mut M, pkt: &Packet) -> Result<(), M::Error> {
///     client.publish("crnw/send", pkt.to_wire().as_bytes(), false)
/// }
///
/// let mut mqtt = MockMqtt::new();
/// send_packet(&mut mqtt, &Packet::new(0x50, 0xFE, b'L', vec![0x01])).unwrap();
/// assert_eq!(mqtt.published_to("crnw/send").len(), 1);
/// ```
pub trait MqttClient {
    /// Error type for MQTT operations.
    type Error;

    /// Publish a message to a topic.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;

    /// Subscribe to a topic. Wildcards follow MQTT rules.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Next received message, or `None` if nothing is waiting. Never blocks.
    fn try_recv(&mut self) -> Option<MqttMessage>;

    /// Check if connected to broker.
    fn is_connected(&self) -> bool;
}

/// A message received from a subscription.
#[derive(Clone, Debug)]
pub struct MqttMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload as raw bytes.
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Create a new MQTT message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as a UTF-8 string, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}
