//! Application configuration: broker connection, panel timing, web API.
//!
//! Short fields use `heapless::String` so a config value has a fixed,
//! known size. Every section has defaults and `with_*` builders, and the
//! whole config can be read from a JSON file with any section omitted.
//!
//! # Example
//!
//! ```rust
//! use rs_ctc::config::{BusConfig, Config, PanelConfig};
//!
//! let config = Config::default()
//!     .with_bus(BusConfig::default().with_host("192.168.1.50"))
//!     .with_panel(PanelConfig::default().with_tick_ms(50));
//!
//! assert_eq!(config.bus.topic("raw").as_str(), "crnw/raw");
//! assert_eq!(config.panel.tick_ms, 50);
//! ```

use std::path::Path;

use anyhow::Context;
use heapless::String as HString;
use serde::{Deserialize, Serialize};

use crate::dispatcher::{DEFAULT_BLINK_TICKS, DEFAULT_TICK_MS, INBOUND_CAPACITY};

/// Maximum length for short config strings (hostnames, client IDs)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (topics, paths)
pub const MAX_LONG_STRING: usize = 128;

pub type ShortString = HString<MAX_SHORT_STRING>;
pub type LongString = HString<MAX_LONG_STRING>;

/// Create a ShortString from a &str, truncating at a char boundary if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let _ = hs.push_str(&s[..fit(s, MAX_SHORT_STRING)]);
    hs
}

/// Longest prefix of `s` within `max` bytes that ends on a char boundary.
fn fit(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: BusConfig,
    pub panel: PanelConfig,
    pub web: WebConfig,
}

impl Config {
    /// Reads a JSON config file. Missing sections and fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("cannot parse config file {}", path.display()))
    }

    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_panel(mut self, panel: PanelConfig) -> Self {
        self.panel = panel;
        self
    }

    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }
}

// ============================================================================
// Bus Config
// ============================================================================

/// Broker connection for the MRBus gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Broker hostname or IP
    pub host: ShortString,
    /// Broker port
    pub port: u16,
    /// Client ID (unique per panel)
    pub client_id: ShortString,
    /// Topic prefix, e.g. "crnw" -> "crnw/raw", "crnw/send"
    pub topic_prefix: ShortString,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: short_string("localhost"),
            port: 1883,
            client_id: short_string("rs-ctc"),
            topic_prefix: short_string("crnw"),
            keep_alive_secs: 30,
        }
    }
}

impl BusConfig {
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_client_id(mut self, id: &str) -> Self {
        self.client_id = short_string(id);
        self
    }

    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.topic_prefix = short_string(prefix);
        self
    }

    pub fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Build a full topic path from a suffix
    pub fn topic(&self, suffix: &str) -> LongString {
        let mut topic = LongString::new();
        let _ = topic.push_str(self.topic_prefix.as_str());
        let _ = topic.push('/');
        let _ = topic.push_str(suffix);
        topic
    }

    /// Topic carrying every packet seen on the bus.
    pub fn raw_topic(&self) -> LongString {
        self.topic("raw")
    }

    /// Topic the gateway transmits from.
    pub fn send_topic(&self) -> LongString {
        self.topic("send")
    }
}

// ============================================================================
// Panel Config
// ============================================================================

/// Dispatcher timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Tick period in milliseconds
    pub tick_ms: u64,
    /// Ticks per signal blink phase
    pub blink_ticks: u32,
    /// Inbound queue capacity. Informational; the queue is sized at compile time.
    pub inbound_capacity: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            blink_ticks: DEFAULT_BLINK_TICKS,
            inbound_capacity: INBOUND_CAPACITY,
        }
    }
}

impl PanelConfig {
    /// Set the tick period (minimum 1 ms)
    pub fn with_tick_ms(mut self, ms: u64) -> Self {
        self.tick_ms = ms.max(1);
        self
    }

    /// Set the blink phase length (minimum 1 tick)
    pub fn with_blink_ticks(mut self, ticks: u32) -> Self {
        self.blink_ticks = ticks.max(1);
        self
    }
}

// ============================================================================
// Web Config
// ============================================================================

/// Operator HTTP API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Port to listen on
    pub port: u16,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
    /// Whether the web API is enabled
    pub enabled: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_permissive: true,
            enabled: true,
        }
    }
}

impl WebConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.bus.port, 1883);
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.panel.tick_ms, 100);
        assert_eq!(config.panel.blink_ticks, 6);
        assert_eq!(config.panel.inbound_capacity, 500);
    }

    #[test]
    fn bus_topics() {
        let bus = BusConfig::default();
        assert_eq!(bus.raw_topic().as_str(), "crnw/raw");
        assert_eq!(bus.send_topic().as_str(), "crnw/send");

        let bus = bus.with_topic_prefix("club/mrbus");
        assert_eq!(bus.raw_topic().as_str(), "club/mrbus/raw");
    }

    #[test]
    fn short_string_truncation() {
        let s = short_string(&"a".repeat(100));
        assert_eq!(s.len(), MAX_SHORT_STRING);

        // Never splits a multi-byte char.
        let s = short_string(&"é".repeat(40));
        assert_eq!(s.len(), 64);
        let s = short_string(&format!("a{}", "é".repeat(40)));
        assert_eq!(s.len(), 63);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"bus": {"host": "broker.local"}, "panel": {"tick_ms": 50}}"#)
                .unwrap();
        assert_eq!(config.bus.host.as_str(), "broker.local");
        assert_eq!(config.bus.port, 1883);
        assert_eq!(config.panel.tick_ms, 50);
        assert!(config.web.enabled);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_bus(BusConfig::default().with_host("10.0.0.2").with_port(8883))
            .with_web(WebConfig::default().with_port(3000).with_cors(false));

        assert_eq!(config.bus.host.as_str(), "10.0.0.2");
        assert_eq!(config.bus.port, 8883);
        assert_eq!(config.web.port, 3000);
        assert!(!config.web.cors_permissive);
    }
}
