//! Broker connection to the MRBus gateway, on `rumqttc` and tokio.
//!
//! **Subscribe:**
//! - `crnw/raw` - every packet seen on the bus, as a JSON record
//!
//! **Publish:**
//! - `crnw/send` - commands for the gateway to put on the bus
//!
//! The event loop decodes incoming records into the panel's queue. A
//! second task ticks the panel every `tick_ms` and publishes whatever the
//! tick produced. Dropped connections are retried after a pause.
//!
//! ```ignore
//! let panel = Arc::new(SharedPanel::new(dispatcher));
//! let bridge = MqttBridge::new(Arc::clone(&panel), MqttRuntimeConfig::from_config(&config.bus, 100));
//! bridge.run().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, QoS};

use crate::config::BusConfig;
use crate::packet::Packet;
use crate::traits::Clock;

use super::shared::SharedPanel;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// Configuration
// ============================================================================

/// Runtime broker configuration for `rumqttc`.
///
/// Owned strings, converted from the fixed-size [`BusConfig`] with
/// [`MqttRuntimeConfig::from_config`].
#[derive(Debug, Clone)]
pub struct MqttRuntimeConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic_prefix: String,
    pub keep_alive_secs: u16,
    /// Panel tick period in milliseconds
    pub tick_ms: u64,
}

impl Default for MqttRuntimeConfig {
    fn default() -> Self {
        Self::from_config(&BusConfig::default(), crate::dispatcher::DEFAULT_TICK_MS)
    }
}

impl MqttRuntimeConfig {
    /// Create a config with the given broker address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn from_config(config: &BusConfig, tick_ms: u64) -> Self {
        Self {
            host: config.host.as_str().to_string(),
            port: config.port,
            client_id: config.client_id.as_str().to_string(),
            topic_prefix: config.topic_prefix.as_str().to_string(),
            keep_alive_secs: config.keep_alive_secs,
            tick_ms: tick_ms.max(1),
        }
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn tick_ms(mut self, ms: u64) -> Self {
        self.tick_ms = ms.max(1);
        self
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.topic_prefix, suffix)
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Connects the shared panel to the broker.
pub struct MqttBridge<C: Clock + Send + 'static> {
    panel: Arc<SharedPanel<C>>,
    config: MqttRuntimeConfig,
}

impl<C: Clock + Send + 'static> MqttBridge<C> {
    pub fn new(panel: Arc<SharedPanel<C>>, config: MqttRuntimeConfig) -> Self {
        Self { panel, config }
    }

    pub fn panel(&self) -> Arc<SharedPanel<C>> {
        Arc::clone(&self.panel)
    }

    pub fn config(&self) -> &MqttRuntimeConfig {
        &self.config
    }

    /// Runs until the process exits. Only a failed subscribe request is
    /// returned as an error; broker outages are logged and retried.
    pub async fn run(self) -> Result<(), MqttError> {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(u64::from(self.config.keep_alive_secs)));

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        let raw_topic = self.config.topic("raw");
        client
            .subscribe(&raw_topic, QoS::AtMostOnce)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        log::info!(
            "connecting to {}:{}, listening on {}",
            self.config.host,
            self.config.port,
            raw_topic
        );

        // Tick and publish task
        let panel = Arc::clone(&self.panel);
        let send_topic = self.config.topic("send");
        let tick = Duration::from_millis(self.config.tick_ms);
        let publisher = client.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                for pkt in panel.tick() {
                    log::debug!("sending {}", pkt);
                    if let Err(e) = publisher
                        .publish(&send_topic, QoS::AtLeastOnce, false, pkt.to_wire())
                        .await
                    {
                        log::error!("publish of {} failed: {}", pkt, e);
                    }
                }
            }
        });

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                    self.handle_message(&publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    log::info!("broker connected");
                    // Session state is not kept across reconnects.
                    if let Err(e) = client.try_subscribe(&raw_topic, QoS::AtMostOnce) {
                        log::warn!("resubscribe to {} failed: {}", raw_topic, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("broker connection error: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Decodes one broker message into the panel queue. Returns true if a
    /// packet was queued.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) -> bool {
        if topic != self.config.topic("raw") {
            return false;
        }
        match Packet::from_wire(payload) {
            Ok(pkt) => self.panel.enqueue(pkt),
            Err(e) => {
                log::warn!("undecodable bus record on {}: {}", topic, e);
                false
            }
        }
    }
}

/// Broker errors.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}
