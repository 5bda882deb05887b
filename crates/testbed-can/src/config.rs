//! Transport configuration and bus interface selection

use serde::{Deserialize, Serialize};

/// Interface wired directly to the ECU buses
pub const BUS_INTERFACE: &str = "vcan0";
/// Interface behind the gateway's OBD-II port
pub const OBD2_INTERFACE: &str = "vcan1";

/// Pick the interface an attacker reaches
///
/// Only an OBD-II attacker on a car with a gateway lands on the gateway's
/// outer bus; everything else clips straight onto the ECU bus.
pub fn select_interface(using_gateway: bool, using_obd2: bool) -> &'static str {
    if using_gateway && using_obd2 {
        OBD2_INTERFACE
    } else {
        BUS_INTERFACE
    }
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Raw SocketCAN (Linux only)
    SocketCan(SocketCanConfig),
    /// In-memory transport for tests
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

impl TransportConfig {
    /// SocketCAN config for a named interface
    pub fn socketcan(interface: impl Into<String>) -> Self {
        Self::SocketCan(SocketCanConfig {
            interface: interface.into(),
            ..Default::default()
        })
    }

    pub fn interface(&self) -> &str {
        match self {
            Self::SocketCan(cfg) => &cfg.interface,
            Self::Mock(cfg) => &cfg.interface,
        }
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "vcan0")
    pub interface: String,
    /// Accept CAN-FD frames on receive and allow FD sends
    #[serde(default = "default_true")]
    pub fd: bool,
    /// How many times a send is retried while the kernel TX queue is full
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,
}

impl Default for SocketCanConfig {
    fn default() -> Self {
        Self {
            interface: BUS_INTERFACE.to_string(),
            fd: true,
            send_retries: default_send_retries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_send_retries() -> u32 {
    100
}

/// Mock transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    /// Name reported as the interface
    #[serde(default = "default_mock_interface")]
    pub interface: String,
    /// Make opening the transport fail, like a missing vcan
    #[serde(default)]
    pub fail_open: bool,
    /// Keep every sent frame for inspection
    #[serde(default = "default_true")]
    pub record: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            interface: default_mock_interface(),
            fail_open: false,
            record: true,
        }
    }
}

fn default_mock_interface() -> String {
    "mock0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_obd2_behind_gateway_uses_vcan1() {
        assert_eq!(select_interface(true, true), "vcan1");
        assert_eq!(select_interface(true, false), "vcan0");
        assert_eq!(select_interface(false, true), "vcan0");
        assert_eq!(select_interface(false, false), "vcan0");
    }

    #[test]
    fn transport_config_from_toml() {
        let cfg: TransportConfig = toml::from_str(
            r#"
            type = "socketcan"
            interface = "vcan1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg, TransportConfig::socketcan("vcan1"));

        let mock: TransportConfig = toml::from_str(r#"type = "mock""#).unwrap();
        assert_eq!(mock, TransportConfig::default());
        assert_eq!(mock.interface(), "mock0");
    }
}
