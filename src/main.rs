//! pinagent: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  SysfsBackend / SimulatedBackend   ReqwestHttp   SystemClock  │
//! │  (PinBackend)                      (HttpPort)    (Clock)      │
//! │  WsConnector ─▶ ConnectionAgent ─▶ OutboundQueue (EventSink)  │
//! │                                                              │
//! │  ─────────────────── Port trait boundary ─────────────────── │
//! │                                                              │
//! │   HardwareIo ◀── ActionEngine ◀── TriggerRegistry            │
//! │                                   (ControlHandler)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Shutdown on SIGINT/SIGTERM: stop the connection (heartbeat first),
//! then retire every trigger and release the pins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use tracing_subscriber::EnvFilter;

use pinagent::adapters::http::ReqwestHttp;
use pinagent::adapters::identity::HostIdentity;
use pinagent::adapters::log_sink::{LogEventSink, TeeSink};
use pinagent::adapters::sim_gpio::SimulatedBackend;
use pinagent::adapters::sysfs_gpio::SysfsBackend;
use pinagent::adapters::time::SystemClock;
use pinagent::app::actions::ActionEngine;
use pinagent::app::events::OutboundEvent;
use pinagent::app::ports::{ControlHandler, EventSink, PinBackend};
use pinagent::app::triggers::TriggerRegistry;
use pinagent::config::{AgentArgs, AgentConfig, HTTP_TIMEOUT};
use pinagent::drivers::gpio::HardwareIo;
use pinagent::link::ws::WsConnector;
use pinagent::link::{ConnectionAgent, OutboundQueue};

const WAIT_SLICE: Duration = Duration::from_millis(100);

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        eprintln!("logging already initialised");
    }
}

fn select_backend(config: &AgentConfig) -> Arc<dyn PinBackend> {
    if config.simulation {
        return Arc::new(SimulatedBackend::new());
    }
    if SysfsBackend::available() {
        return Arc::new(SysfsBackend::new(config.numbering, config.sysfs_base));
    }
    warn!("HW: /sys/class/gpio not present, falling back to simulation");
    Arc::new(SimulatedBackend::new())
}

fn dry_run(config: &AgentConfig) -> Result<()> {
    let rendered = serde_json::to_string_pretty(config).context("rendering configuration")?;
    println!("{rendered}");
    let server = url::Url::parse(&config.server_url).ok();
    let identity = HostIdentity::discover(
        server
            .as_ref()
            .and_then(|u| Some((u.host_str()?, u.port_or_known_default()?))),
    );
    LogEventSink::new().emit(OutboundEvent::Registration {
        hostname: identity.hostname,
        ip_address: identity.ip_address,
    });
    Ok(())
}

fn main() -> Result<()> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();
    let args = AgentArgs::parse();
    init_logging(&args.log_level);

    let dry = args.dry_run;
    let config = args.into_config().context("invalid configuration")?;

    info!("========================================");
    info!("  pinagent v{}", env!("CARGO_PKG_VERSION"));
    info!("  device:  {}", config.device_id);
    info!("  server:  {}", config.server_url);
    info!(
        "  mode:    {} / {:?}",
        if config.simulation { "simulation" } else { "hardware" },
        config.numbering
    );
    info!("========================================");

    if dry {
        return dry_run(&config);
    }

    // ── Hardware and actions ──────────────────────────────────
    let hw = Arc::new(HardwareIo::new(
        select_backend(&config),
        Duration::from_millis(config.input_sample_ms),
    ));
    let http = Arc::new(ReqwestHttp::new(HTTP_TIMEOUT).context("building HTTP client")?);
    let queue = Arc::new(OutboundQueue::new());
    let sink: Arc<dyn EventSink> = Arc::new(TeeSink(Arc::clone(&queue), LogEventSink::new()));

    let shutdown = Arc::new(AtomicBool::new(false));
    let engine = Arc::new(ActionEngine::new(
        Arc::clone(&hw),
        http,
        Arc::clone(&sink),
        Arc::clone(&shutdown),
    ));
    let registry = Arc::new(TriggerRegistry::new(
        Arc::clone(&hw),
        engine,
        sink,
        Arc::new(SystemClock::new()),
        config.schedule_poll(),
    ));
    registry.start().context("starting trigger services")?;

    // ── Server link ───────────────────────────────────────────
    let handler: Arc<dyn ControlHandler> = Arc::clone(&registry) as Arc<dyn ControlHandler>;
    let agent = ConnectionAgent::new(&config, Box::new(WsConnector::new()), handler, queue);
    let link = agent.handle();
    let link_thread = agent.spawn().context("starting connection thread")?;

    // ── Wait for a termination signal ─────────────────────────
    for sig in TERM_SIGNALS {
        flag::register(*sig, Arc::clone(&shutdown))
            .with_context(|| format!("registering handler for signal {sig}"))?;
    }
    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(WAIT_SLICE);
    }

    info!("Shutting down");
    link.disconnect();
    if link_thread.join().is_err() {
        warn!("Link: connection thread panicked");
    }
    registry.shutdown();
    info!("Stopped");
    Ok(())
}
