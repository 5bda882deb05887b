//! Per-channel reader task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use testbed_core::{EcuRole, FieldUpdate};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::BoxedReader;
use crate::protocol::{decode_for, FrameAccumulator};

/// Upper bound on one blocking read; also the stop latency
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// How long the orchestrator gets to drain a full event queue
const POST_TIMEOUT: Duration = Duration::from_millis(100);

/// Decoded status frame from one ECU
#[derive(Debug, Clone)]
pub struct EcuEvent {
    pub role: EcuRole,
    pub updates: Vec<FieldUpdate>,
    pub received_at: Instant,
}

/// Handle to a running reader task
pub struct Reader {
    role: EcuRole,
    running: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl Reader {
    /// Start reading `stream`, posting one [`EcuEvent`] per EXU frame
    pub fn spawn(
        role: EcuRole,
        stream: BoxedReader,
        events: mpsc::Sender<EcuEvent>,
        read_timeout: Duration,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run(role, stream, events, read_timeout, running.clone()));
        tracing::info!(channel = %role, "Reader started");
        Self {
            role,
            running,
            handle,
        }
    }

    pub fn role(&self) -> EcuRole {
        self.role
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the task to stop after its current read
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the task; returns the number of events posted
    pub async fn join(self, grace: Duration) -> Option<u64> {
        self.stop();
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(posted)) => Some(posted),
            Ok(Err(e)) => {
                tracing::warn!(channel = %self.role, error = %e, "Reader task failed");
                None
            }
            Err(_) => {
                tracing::warn!(channel = %self.role, "Reader did not stop in time, aborting");
                abort.abort();
                None
            }
        }
    }
}

async fn run(
    role: EcuRole,
    mut stream: BoxedReader,
    events: mpsc::Sender<EcuEvent>,
    read_timeout: Duration,
    running: Arc<AtomicBool>,
) -> u64 {
    let mut acc = FrameAccumulator::new();
    let mut buf = [0u8; 256];
    let mut posted = 0u64;

    'outer: while running.load(Ordering::SeqCst) {
        let n = match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
            // Read timed out; re-check the stop flag
            Err(_) => continue,
            Ok(Ok(0)) => {
                tracing::info!(channel = %role, "Channel closed by peer");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::warn!(channel = %role, error = %e, "Channel read failed");
                break;
            }
        };

        for frame in acc.feed(&buf[..n]) {
            if !running.load(Ordering::SeqCst) {
                break 'outer;
            }
            let Some(updates) = decode_for(role, &frame) else {
                tracing::debug!(channel = %role, frame = %frame, "Ignoring non-EXU frame");
                continue;
            };

            let event = EcuEvent {
                role,
                updates,
                received_at: Instant::now(),
            };
            match events.send_timeout(event, POST_TIMEOUT).await {
                Ok(()) => posted += 1,
                Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                    tracing::debug!(channel = %role, "Event queue full, dropping frame");
                }
                Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                    tracing::debug!(channel = %role, "Event consumer gone");
                    break 'outer;
                }
            }
        }
    }

    tracing::info!(channel = %role, posted, "Reader stopped");
    posted
}
