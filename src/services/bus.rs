//! MRBus gateway runner over any [`MqttClient`].
//!
//! The gateway mirrors every bus packet to `<prefix>/raw` as a JSON record
//! and transmits whatever is published to `<prefix>/send`. The runner
//! decodes the first into the panel's inbound queue and publishes the
//! panel's outbox to the second.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rs_ctc::config::BusConfig;
//! use rs_ctc::dispatcher::Dispatcher;
//! use rs_ctc::hal::{MockClock, MockMqtt};
//! use rs_ctc::railroad::Railroad;
//! use rs_ctc::services::{BusRunner, SharedPanel};
//!
//! let panel = Arc::new(SharedPanel::new(Dispatcher::new(Railroad::new(), MockClock::new())));
//! let mut runner = BusRunner::new(panel, MockMqtt::new(), BusConfig::default());
//! runner.subscribe().unwrap();
//!
//! runner.client_mut().queue_message(
//!     "crnw/raw",
//!     r#"{"type":"pkt","src":80,"dst":255,"cmd":83,"data":[1]}"#,
//! );
//!
//! // In the main loop, once per tick:
//! assert_eq!(runner.step().unwrap(), 0);
//! assert_eq!(runner.decode_errors(), 0);
//! ```

use std::sync::Arc;

use crate::config::BusConfig;
use crate::packet::Packet;
use crate::traits::{Clock, MqttClient};

use super::SharedPanel;

/// Moves packets between a broker client and the shared panel.
pub struct BusRunner<C, M>
where
    C: Clock,
    M: MqttClient,
{
    panel: Arc<SharedPanel<C>>,
    client: M,
    config: BusConfig,
    decode_errors: u64,
}

impl<C, M> BusRunner<C, M>
where
    C: Clock,
    M: MqttClient,
{
    pub fn new(panel: Arc<SharedPanel<C>>, client: M, config: BusConfig) -> Self {
        Self {
            panel,
            client,
            config,
            decode_errors: 0,
        }
    }

    pub fn panel(&self) -> &Arc<SharedPanel<C>> {
        &self.panel
    }

    pub fn client(&self) -> &M {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut M {
        &mut self.client
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Messages on the raw topic that did not decode, since creation.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Subscribes to the raw packet topic.
    pub fn subscribe(&mut self) -> Result<(), M::Error> {
        let topic = self.config.raw_topic();
        self.client.subscribe(&topic)
    }

    /// Drains received messages into the inbound queue. Returns the number
    /// of packets queued.
    pub fn poll(&mut self) -> usize {
        let raw = self.config.raw_topic();
        let mut queued = 0;
        while let Some(msg) = self.client.try_recv() {
            if msg.topic != raw.as_str() {
                continue;
            }
            match Packet::from_wire(&msg.payload) {
                Ok(pkt) => {
                    if self.panel.enqueue(pkt) {
                        queued += 1;
                    }
                }
                Err(e) => {
                    self.decode_errors += 1;
                    log::warn!(
                        "undecodable bus record on {}: {} ({:?})",
                        msg.topic,
                        e,
                        msg.payload_str().unwrap_or("<binary>")
                    );
                }
            }
        }
        queued
    }

    /// Publishes packets to the send topic, in order.
    pub fn publish(&mut self, packets: &[Packet]) -> Result<(), M::Error> {
        let topic = self.config.send_topic();
        for pkt in packets {
            log::debug!("sending {}", pkt);
            self.client.publish(&topic, pkt.to_wire().as_bytes(), false)?;
        }
        Ok(())
    }

    /// One full cycle: poll, tick, publish. Returns the number of commands
    /// sent.
    pub fn step(&mut self) -> Result<usize, M::Error> {
        self.poll();
        let outbound = self.panel.tick();
        self.publish(&outbound)?;
        Ok(outbound.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockSensors;
    use crate::cells::{GridPos, SegmentType};
    use crate::dispatcher::Dispatcher;
    use crate::hal::{MockClock, MockMqtt};
    use crate::railroad::Railroad;
    use crate::sensor::SensorBit;
    use crate::switch::{Switch, SwitchSensors};

    fn raw(src: u8, data: &str) -> String {
        format!(
            r#"{{"type":"pkt","src":{},"dst":255,"cmd":83,"data":[{}]}}"#,
            src, data
        )
    }

    fn runner() -> BusRunner<MockClock, MockMqtt> {
        let mut rr = Railroad::new();
        let block = rr.add_block(
            "B1",
            BlockSensors {
                occupancy: SensorBit::from_pattern("0x30,S,6:0").unwrap(),
                ..BlockSensors::default()
            },
            vec![(GridPos::new(3, 2), SegmentType::Horizontal)],
        );
        let sw = Switch::new(
            "SW1",
            GridPos::new(4, 2),
            SegmentType::SwitchRightUp,
            SwitchSensors::default(),
        )
        .with_commands(
            Packet::from_command_spec("0x30,T,1,0").ok(),
            Packet::from_command_spec("0x30,T,1,1").ok(),
        );
        rr.add_switch(sw, Some(block));

        let dispatcher = Dispatcher::new(rr, MockClock::new());
        BusRunner::new(
            Arc::new(SharedPanel::new(dispatcher)),
            MockMqtt::new(),
            BusConfig::default(),
        )
    }

    #[test]
    fn subscribes_to_raw_topic() {
        let mut runner = runner();
        runner.subscribe().unwrap();
        assert!(runner.client().is_subscribed("crnw/raw"));
    }

    #[test]
    fn poll_queues_decoded_packets() {
        let mut runner = runner();
        runner.client_mut().queue_message("crnw/raw", raw(0x30, "1"));
        runner.client_mut().queue_message("crnw/raw", raw(0x31, "0"));
        runner.client_mut().queue_message("other/topic", raw(0x32, "0"));

        assert_eq!(runner.poll(), 2);
        assert_eq!(runner.panel().with_dispatcher(|d| d.queued()), 2);

        runner.panel().tick();
        let occupied = runner.panel().with_dispatcher(|d| {
            let rr = d.railroad();
            rr.find_block("B1").map(|id| rr.block(id).is_occupied())
        });
        assert_eq!(occupied, Some(true));
    }

    #[test]
    fn bad_records_are_counted() {
        let mut runner = runner();
        runner.client_mut().queue_message("crnw/raw", "not json");
        runner.client_mut().queue_message("crnw/raw", raw(0x30, "300"));

        assert_eq!(runner.poll(), 0);
        assert_eq!(runner.decode_errors(), 2);
    }

    #[test]
    fn step_publishes_switch_command() {
        let mut runner = runner();
        runner.panel().throw_switch("SW1").unwrap();

        assert_eq!(runner.step().unwrap(), 1);
        let sent = runner.client().published_to("crnw/send");
        assert_eq!(sent.len(), 1);
        let (_, payload, retain) = sent[0];
        assert!(!retain);

        let pkt = Packet::from_wire(payload).unwrap();
        assert_eq!(pkt.dest, 0x30);
        assert_eq!(pkt.cmd, b'T');
        assert_eq!(pkt.data, vec![0x01, 0x01]);

        // Nothing new on the next tick
        assert_eq!(runner.step().unwrap(), 0);
    }

    #[test]
    fn publish_fails_when_disconnected() {
        let mut runner = runner();
        runner.client_mut().connected = false;
        assert!(!runner.is_connected());
        let pkt = Packet::new(0x30, 0xFE, b'T', vec![1, 0]);
        assert!(runner.publish(&[pkt]).is_err());
    }
}
