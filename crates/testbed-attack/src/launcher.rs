//! Fire-and-forget attack execution

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use testbed_can::{create_transport, select_interface, TransportConfig};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalogue::Attack;
use crate::error::{AttackError, AttackResult};

/// Binary started by [`Attack::Sniff`]
const SNIFFER_BIN: &str = "can-sniff";

/// Where the attacker is plugged in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackTarget {
    /// The car runs the gateway mitigation
    pub using_gateway: bool,
    /// Attacker uses the OBD-II port rather than clipping onto the bus
    pub using_obd2: bool,
}

impl Default for AttackTarget {
    fn default() -> Self {
        Self {
            using_gateway: false,
            using_obd2: true,
        }
    }
}

impl AttackTarget {
    pub fn interface(&self) -> &'static str {
        select_interface(self.using_gateway, self.using_obd2)
    }
}

/// Start `attack` against the target's SocketCAN interface
pub fn launch(attack: Attack, target: AttackTarget) -> JoinHandle<Option<usize>> {
    launch_with(attack, target, TransportConfig::socketcan(target.interface()))
}

/// Start `attack` on its own task using an explicit transport
///
/// Never fails from the caller's point of view: a transport that cannot be
/// opened or a send error is logged and the task resolves to `None`.
pub fn launch_with(
    attack: Attack,
    target: AttackTarget,
    config: TransportConfig,
) -> JoinHandle<Option<usize>> {
    tokio::spawn(async move {
        let interface = config.interface().to_string();
        info!(%attack, %interface, "Launching attack");
        match run(attack, target, &config).await {
            Ok(sent) => {
                info!(%attack, %interface, frames = sent, "Attack finished");
                Some(sent)
            }
            Err(e) => {
                error!(
                    %attack,
                    %interface,
                    error = %e,
                    "Attack failed. Is the CAN interface up?"
                );
                None
            }
        }
    })
}

async fn run(attack: Attack, target: AttackTarget, config: &TransportConfig) -> AttackResult<usize> {
    let Some(plan) = attack.plan()? else {
        let child = spawn_sniffer(&sniffer_program(), target)?;
        info!(pid = child.id(), "Sniffer started");
        reap_detached(child);
        return Ok(0);
    };

    let transport = create_transport(config).await?;
    plan.execute(transport.as_ref()).await
}

/// Start the sniffing tool on the target interface
///
/// The child is detached; it lives until the user closes it.
pub fn spawn_sniffer(program: &Path, target: AttackTarget) -> AttackResult<Child> {
    let mut cmd = Command::new(program);
    cmd.arg("--interface").arg(target.interface());
    if target.using_obd2 {
        cmd.arg("--use-odb2");
    }
    cmd.stdin(Stdio::null());

    cmd.spawn()
        .map_err(|e| AttackError::SnifferSpawn(format!("{}: {}", program.display(), e)))
}

/// Wait for `child` on a background thread so it is reaped when it exits
pub fn reap_detached(mut child: Child) -> thread::JoinHandle<Option<ExitStatus>> {
    thread::spawn(move || {
        let pid = child.id();
        match child.wait() {
            Ok(status) => {
                debug!(pid, %status, "Sniffer exited");
                Some(status)
            }
            Err(e) => {
                warn!(pid, error = %e, "Failed to wait for sniffer");
                None
            }
        }
    })
}

/// `can-sniff` next to the running binary, else whatever is on `PATH`
fn sniffer_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(SNIFFER_BIN)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(SNIFFER_BIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use testbed_can::MockConfig;

    #[test]
    fn default_target_is_obd2_on_bus() {
        let target = AttackTarget::default();
        assert!(target.using_obd2);
        assert_eq!(target.interface(), "vcan0");

        let behind_gateway = AttackTarget {
            using_gateway: true,
            ..target
        };
        assert_eq!(behind_gateway.interface(), "vcan1");
    }

    #[tokio::test]
    async fn open_failure_is_logged_not_raised() {
        let config = TransportConfig::Mock(MockConfig {
            fail_open: true,
            ..Default::default()
        });
        let handle = launch_with(Attack::Unlock, AttackTarget::default(), config);
        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn launched_attack_reports_frame_count() {
        let handle = launch_with(
            Attack::EngineOff,
            AttackTarget::default(),
            TransportConfig::default(),
        );
        assert_eq!(handle.await.unwrap(), Some(1));
    }

    #[test]
    fn missing_sniffer_binary_is_an_error() {
        let err = spawn_sniffer(Path::new("/nonexistent/can-sniff"), AttackTarget::default())
            .unwrap_err();
        assert!(matches!(err, AttackError::SnifferSpawn(_)));
    }

    #[cfg(unix)]
    #[test]
    fn finished_sniffer_is_reaped() {
        let child = Command::new("true").spawn().unwrap();
        let status = reap_detached(child).join().unwrap();
        assert!(status.is_some_and(|s| s.success()));
    }
}
