//! Relay and ECU child processes
//!
//! Each ECU talks to the daemon over a `socat` pty pair. The daemon opens the
//! first pty socat announces and hands the second one to the ECU process:
//!
//! ```text
//!   testbedd ── /dev/pts/N ══ socat ══ /dev/pts/M ── penne_ecu <role> /dev/pts/M [key]
//! ```

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use rand::Rng;
use testbed_core::EcuRole;

const SOCAT: &str = "socat";
const PTY_MARKER: &str = "PTY is ";
/// socat prints a few lines before the pty names; give up after this many
const MAX_BANNER_LINES: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to start socat relay for {role}: {reason}")]
    RelaySpawn { role: EcuRole, reason: String },

    #[error("socat relay for {role} did not report two ptys")]
    RelayOutput { role: EcuRole },

    #[error("Failed to start {role} ECU: {reason}")]
    EcuSpawn { role: EcuRole, reason: String },
}

/// Both ends of one relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPair {
    /// Opened by the daemon's reader/sender
    pub host_end: String,
    /// Passed to the ECU process
    pub ecu_end: String,
}

/// 256-bit key shared by all ECUs when encryption is on
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Random key without zero bytes, so it survives as a C string argument
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let mut key = [0u8; 32];
        for byte in key.iter_mut() {
            *byte = rng.gen_range(1..=u8::MAX);
        }
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Pull the pty path out of a socat `-d -d` log line
pub fn parse_pty_line(line: &str) -> Option<&str> {
    let start = line.find(PTY_MARKER)? + PTY_MARKER.len();
    let path = line[start..].trim();
    (!path.is_empty()).then_some(path)
}

/// Arguments for one ECU process
pub fn ecu_args(role: EcuRole, endpoint: &str, key: Option<&EncryptionKey>) -> Vec<String> {
    let mut args = vec![role.name().to_string(), endpoint.to_string()];
    if let Some(key) = key {
        args.push(key.to_hex());
    }
    args
}

/// Owns every child process started for the car
#[derive(Debug, Default)]
pub struct Supervisor {
    relays: Vec<(EcuRole, Child)>,
    ecus: Vec<(EcuRole, Child)>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }

    pub fn ecu_count(&self) -> usize {
        self.ecus.len()
    }

    /// Start `socat` and wait for it to announce its two ptys
    pub fn start_relay(&mut self, role: EcuRole) -> Result<RelayPair, SupervisorError> {
        tracing::info!(ecu = %role, "Starting socat relay");
        let mut child = Command::new(SOCAT)
            .args(["-d", "-d", "pty,raw,echo=0", "pty,raw,echo=0"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SupervisorError::RelaySpawn {
                role,
                reason: e.to_string(),
            })?;

        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            return Err(SupervisorError::RelayOutput { role });
        };

        let mut lines = BufReader::new(stderr).lines();
        let mut ptys = Vec::with_capacity(2);
        for line in lines.by_ref().take(MAX_BANNER_LINES) {
            let Ok(line) = line else { break };
            if let Some(pty) = parse_pty_line(&line) {
                ptys.push(pty.to_string());
                if ptys.len() == 2 {
                    break;
                }
            }
        }

        if ptys.len() != 2 {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SupervisorError::RelayOutput { role });
        }

        // Keep draining so socat never blocks on a full stderr pipe
        std::thread::spawn(move || {
            for line in lines.map_while(Result::ok) {
                tracing::trace!(ecu = %role, line = %line, "socat");
            }
        });

        let ecu_end = ptys.pop().unwrap_or_default();
        let host_end = ptys.pop().unwrap_or_default();
        tracing::info!(ecu = %role, host = %host_end, ecu_end = %ecu_end, "Relay ready");
        self.relays.push((role, child));
        Ok(RelayPair { host_end, ecu_end })
    }

    /// Start one ECU process on its end of the relay
    pub fn start_ecu(
        &mut self,
        binary: &Path,
        role: EcuRole,
        endpoint: &str,
        key: Option<&EncryptionKey>,
    ) -> Result<u32, SupervisorError> {
        tracing::info!(ecu = %role, endpoint, binary = %binary.display(), "Starting ECU");
        let child = Command::new(binary)
            .args(ecu_args(role, endpoint, key))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SupervisorError::EcuSpawn {
                role,
                reason: format!("{}: {}", binary.display(), e),
            })?;

        let pid = child.id();
        self.ecus.push((role, child));
        Ok(pid)
    }

    /// Kill ECUs first, then their relays
    pub fn kill_all(&mut self) {
        for (role, mut child) in self.ecus.drain(..).chain(self.relays.drain(..)) {
            tracing::info!(ecu = %role, pid = child.id(), "Killing process");
            if let Err(e) = child.kill() {
                tracing::debug!(ecu = %role, error = %e, "Process already gone");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.kill_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parses_socat_banner() {
        let line = "2024/05/01 10:00:00 socat[4242] N PTY is /dev/pts/7";
        assert_eq!(parse_pty_line(line), Some("/dev/pts/7"));
        assert_eq!(
            parse_pty_line("2024/05/01 10:00:00 socat[4242] N starting data transfer loop"),
            None
        );
        assert_eq!(parse_pty_line("PTY is   "), None);
    }

    #[test]
    fn key_has_no_zero_bytes() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let key = EncryptionKey::generate(&mut rng);
            assert!(key.as_bytes().iter().all(|&b| b != 0));
            assert_eq!(key.to_hex().len(), 64);
        }
    }

    #[test]
    fn ecu_arguments() {
        assert_eq!(ecu_args(EcuRole::Body, "/dev/pts/3", None), vec!["body", "/dev/pts/3"]);

        let key = EncryptionKey([0xAB; 32]);
        let args = ecu_args(EcuRole::Gateway, "/dev/pts/9", Some(&key));
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], "gateway");
        assert_eq!(args[2], "ab".repeat(32));
    }

    #[test]
    fn missing_ecu_binary_is_reported() {
        let mut supervisor = Supervisor::new();
        let err = supervisor
            .start_ecu(Path::new("/nonexistent/penne_ecu"), EcuRole::Body, "/dev/pts/1", None)
            .unwrap_err();
        assert!(matches!(err, SupervisorError::EcuSpawn { role: EcuRole::Body, .. }));
        assert_eq!(supervisor.ecu_count(), 0);
    }
}
