//! Configuration file handling for testbedd
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! stock three-ECU car with no mitigations:
//!
//! ```toml
//! ecu_binary = "penne_ecu/build/bin/penne_ecu"
//! fps = 20
//!
//! [mitigations]
//! encryption = true
//! observer = true
//!
//! # Only used with spawn_relays = false
//! [channels]
//! body = "/dev/pts/3"
//!
//! [logger]
//! path = "can.log"
//! transport = { type = "socketcan", interface = "vcan0" }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use testbed_can::TransportConfig;
use testbed_core::EcuRole;
use testbed_serial::DEFAULT_BAUD_RATE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    pub mitigations: Mitigations,
    /// ECU executable, started once per active role
    pub ecu_binary: PathBuf,
    /// Start a `socat` pty pair per ECU; otherwise `[channels]` must name
    /// the host end of every active channel
    pub spawn_relays: bool,
    pub channels: ChannelPaths,
    pub baud_rate: u32,
    /// Main loop ticks per second
    pub fps: u32,
    /// An ECU silent for longer than this is shown as disconnected
    pub liveness_timeout_ms: u64,
    /// Upper bound on one blocking channel read
    pub read_timeout_ms: u64,
    pub logger: LoggerConfig,
    /// Also write the daemon log here (appended)
    pub log_file: Option<PathBuf>,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            mitigations: Mitigations::default(),
            ecu_binary: PathBuf::from("penne_ecu/build/bin/penne_ecu"),
            spawn_relays: true,
            channels: ChannelPaths::default(),
            baud_rate: DEFAULT_BAUD_RATE,
            fps: 20,
            liveness_timeout_ms: 1000,
            read_timeout_ms: 500,
            logger: LoggerConfig::default(),
            log_file: None,
        }
    }
}

/// Optional security measures of the simulated car
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mitigations {
    /// Encrypt CAN payloads between ECUs (the key is handed to each ECU)
    pub encryption: bool,
    /// Run the observer ECU
    pub observer: bool,
    /// Run the gateway ECU; attacks via OBD2 then land on vcan1
    pub gateway: bool,
}

/// Host ends of pre-existing relays, keyed by role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPaths {
    pub body: Option<String>,
    pub chassis: Option<String>,
    pub powertrain: Option<String>,
    pub observer: Option<String>,
    pub gateway: Option<String>,
}

impl ChannelPaths {
    pub fn get(&self, role: EcuRole) -> Option<&str> {
        match role {
            EcuRole::Body => self.body.as_deref(),
            EcuRole::Chassis => self.chassis.as_deref(),
            EcuRole::Powertrain => self.powertrain.as_deref(),
            EcuRole::Observer => self.observer.as_deref(),
            EcuRole::Gateway => self.gateway.as_deref(),
        }
    }
}

/// Raw CAN traffic log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub transport: TransportConfig,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("can.log"),
            transport: TransportConfig::socketcan("vcan0"),
        }
    }
}

impl TestbedConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            bail!("fps must be at least 1");
        }
        if self.read_timeout_ms == 0 {
            bail!("read_timeout_ms must be at least 1");
        }
        if !self.spawn_relays {
            let missing: Vec<&str> = self
                .active_roles()
                .into_iter()
                .filter(|role| self.channels.get(*role).is_none())
                .map(EcuRole::name)
                .collect();
            if !missing.is_empty() {
                bail!(
                    "spawn_relays is off but no channel path is set for: {}",
                    missing.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Roles that get a relay, an ECU process and a reader
    pub fn active_roles(&self) -> Vec<EcuRole> {
        EcuRole::ALL
            .into_iter()
            .filter(|role| match role {
                EcuRole::Observer => self.mitigations.observer,
                EcuRole::Gateway => self.mitigations.gateway,
                _ => true,
            })
            .collect()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
