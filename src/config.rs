//! Agent configuration.
//!
//! Built exactly once at startup from command-line flags and environment
//! variables (an optional `.env` file is loaded first), validated, and then
//! handed by value or reference to each component constructor.  Nothing
//! else in the crate reads the process environment.

use core::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fixed timeout for `http-call` actions (part of the wire contract).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest reconnect delay `validate` accepts.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 24 * 60 * 60;

/// How pin numbers in trigger/action configs are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinNumbering {
    /// Broadcom SoC channel numbers.
    #[value(name = "BCM", alias = "bcm")]
    Bcm,
    /// Physical 40-pin header positions.
    #[value(name = "BOARD", alias = "board")]
    Board,
}

/// Core agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // --- Identity ---
    /// Device identifier registered with the server.
    pub device_id: String,

    // --- Link ---
    /// WebSocket endpoint of the control server.
    pub server_url: String,
    /// Seconds between heartbeat pings while active.
    pub heartbeat_interval_secs: u64,
    /// Seconds to wait after a disconnect before reconnecting.
    pub reconnect_delay_secs: u64,

    // --- Hardware ---
    /// Use the simulated pin backend instead of real GPIO.
    pub simulation: bool,
    /// Pin numbering scheme for configs received from the server.
    pub numbering: PinNumbering,
    /// Offset added to BCM numbers when addressing `/sys/class/gpio`.
    pub sysfs_base: u32,

    // --- Timing ---
    /// Schedule poll interval (milliseconds).
    pub schedule_poll_ms: u64,
    /// Input sampling interval for the real backend (milliseconds).
    pub input_sample_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),

            server_url: "ws://localhost:3001".into(),
            heartbeat_interval_secs: 30,
            reconnect_delay_secs: 5,

            simulation: false,
            numbering: PinNumbering::Bcm,
            sysfs_base: 0,

            schedule_poll_ms: 1000,
            input_sample_ms: 5,
        }
    }
}

impl AgentConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn schedule_poll(&self) -> Duration {
        Duration::from_millis(self.schedule_poll_ms)
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Missing("device id"));
        }
        let url = url::Url::parse(&self.server_url)
            .map_err(|e| ConfigError::Malformed(format!("server url: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Malformed(format!(
                "server url scheme must be ws or wss, got '{}'",
                url.scheme()
            )));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::OutOfRange("heartbeat interval"));
        }
        if self.schedule_poll_ms == 0 || self.input_sample_ms == 0 {
            return Err(ConfigError::OutOfRange("poll interval"));
        }
        if self.reconnect_delay_secs > MAX_RECONNECT_DELAY_SECS {
            return Err(ConfigError::OutOfRange("reconnect delay"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Command-line flags; each falls back to an environment variable.
#[derive(Debug, Parser)]
#[command(name = "pinagent", version, about = "GPIO trigger/action agent")]
pub struct AgentArgs {
    /// Device ID registered on the server.
    #[arg(short = 'd', long, env = "DEVICE_ID")]
    pub device_id: Option<String>,

    /// WebSocket URL of the control server.
    #[arg(long, env = "BACKEND_WS_URL", default_value = "ws://localhost:3001")]
    pub server_url: String,

    /// Heartbeat interval in seconds.
    #[arg(long, env = "HEARTBEAT_INTERVAL", default_value_t = 30)]
    pub heartbeat_interval: u64,

    /// Reconnect delay in seconds.
    #[arg(long, env = "RECONNECT_DELAY", default_value_t = 5)]
    pub reconnect_delay: u64,

    /// Simulate GPIO instead of driving real pins.
    #[arg(short = 's', long = "simulate", env = "SIMULATION_MODE")]
    pub simulate: bool,

    /// Pin numbering scheme (BCM or BOARD).
    #[arg(long, env = "GPIO_MODE", value_enum, default_value = "BCM")]
    pub gpio_mode: PinNumbering,

    /// Base offset of the GPIO chip in /sys/class/gpio.
    #[arg(long, env = "GPIO_SYSFS_BASE", default_value_t = 0)]
    pub sysfs_base: u32,

    /// Log filter (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print the resolved configuration and host identity, then exit.
    #[arg(long)]
    pub dry_run: bool,
}

impl AgentArgs {
    /// Turn parsed flags into a validated [`AgentConfig`].
    pub fn into_config(self) -> Result<AgentConfig, ConfigError> {
        let device_id = self
            .device_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::Missing("device id (--device-id or DEVICE_ID)"))?;

        let config = AgentConfig {
            device_id,
            server_url: self.server_url,
            heartbeat_interval_secs: self.heartbeat_interval,
            reconnect_delay_secs: self.reconnect_delay,
            simulation: self.simulate,
            numbering: self.gpio_mode,
            sysfs_base: self.sysfs_base,
            ..AgentConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}
