//! CTC panel server.
//!
//! Loads a layout, connects to the MRBus gateway's broker and runs the
//! dispatcher. With the `web` feature the operator API is served as well.
//!
//! ```sh
//! cargo run --bin ctc_panel --features mqtt,web -- layout.json --config panel.json
//! ```
//!
//! Broker host and port from the layout file override the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use rs_ctc::config::{short_string, Config};
use rs_ctc::hal::SystemClock;
use rs_ctc::services::{MqttBridge, MqttRuntimeConfig, SharedPanel};
use rs_ctc::LayoutDocument;

#[derive(Parser, Debug)]
#[command(name = "ctc_panel", about = "Model railroad CTC dispatch panel")]
struct Args {
    /// Layout document
    #[arg(default_value = "layout.json")]
    layout: PathBuf,

    /// Runtime config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let layout = LayoutDocument::load(&args.layout)?;
    if let Some(host) = &layout.mqtt_host {
        config.bus.host = short_string(host);
    }
    if let Some(port) = layout.mqtt_port().context("bad mqttPort in layout")? {
        config.bus.port = port;
    }

    let dispatcher = layout
        .build(SystemClock::new())
        .with_context(|| format!("cannot build layout {}", args.layout.display()))?
        .with_tick_ms(config.panel.tick_ms)
        .with_blink_ticks(config.panel.blink_ticks);
    log::info!(
        "panel [{}] ready with {} control points",
        dispatcher.layout_name(),
        dispatcher.control_points().len()
    );

    let panel = Arc::new(SharedPanel::new(dispatcher));

    #[cfg(feature = "web")]
    {
        if config.web.enabled {
            let web_config = rs_ctc::services::WebServerConfig::from_config(&config.web);
            let panel = Arc::clone(&panel);
            tokio::spawn(async move {
                if let Err(e) = rs_ctc::services::run_server(panel, web_config).await {
                    log::error!("web API stopped: {}", e);
                }
            });
        }
    }

    let bridge = MqttBridge::new(
        panel,
        MqttRuntimeConfig::from_config(&config.bus, config.panel.tick_ms),
    );
    bridge.run().await?;
    Ok(())
}

/// Initialize logging from verbosity flags; `RUST_LOG` still applies on top.
fn init_logging(verbose: u8, quiet: bool) {
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
