//! Per-topic sender task
//!
//! The task is the only writer of its handle, so concurrent publishers can
//! never interleave partial EXD lines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use testbed_core::FieldUpdate;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::channel::BoxedWriter;
use crate::protocol::encode_exd;

/// Idle tick between stop-flag checks
const IDLE_TICK: Duration = Duration::from_millis(10);

/// Handle to a running sender task
pub struct Sender {
    topic: String,
    running: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl Sender {
    /// Start writing every update published on `updates` to `stream`
    pub fn spawn(
        topic: &str,
        stream: BoxedWriter,
        updates: broadcast::Receiver<Vec<FieldUpdate>>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run(
            topic.to_string(),
            stream,
            updates,
            running.clone(),
        ));
        tracing::info!(channel = topic, "Sender started");
        Self {
            topic: topic.to_string(),
            running,
            handle,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the task; returns the number of lines written
    pub async fn join(self, grace: Duration) -> Option<u64> {
        self.stop();
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(written)) => Some(written),
            Ok(Err(e)) => {
                tracing::warn!(channel = %self.topic, error = %e, "Sender task failed");
                None
            }
            Err(_) => {
                tracing::warn!(channel = %self.topic, "Sender did not stop in time, aborting");
                abort.abort();
                None
            }
        }
    }
}

async fn run(
    topic: String,
    mut stream: BoxedWriter,
    mut updates: broadcast::Receiver<Vec<FieldUpdate>>,
    running: Arc<AtomicBool>,
) -> u64 {
    let mut written = 0u64;

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            msg = updates.recv() => match msg {
                Ok(update) => {
                    let line = encode_exd(&update);
                    let result = async {
                        stream.write_all(line.as_bytes()).await?;
                        stream.flush().await
                    }
                    .await;
                    if let Err(e) = result {
                        tracing::warn!(channel = %topic, error = %e, "Channel write failed");
                        break;
                    }
                    written += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(channel = %topic, skipped, "Sender lagging, skipped updates");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::time::sleep(IDLE_TICK) => {}
        }
    }

    if let Err(e) = stream.shutdown().await {
        tracing::debug!(channel = %topic, error = %e, "Channel shutdown failed");
    }
    tracing::info!(channel = %topic, written, "Sender stopped");
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicHub;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, AsyncWrite};

    /// Accepts writes but cannot be shut down, like a pty whose ECU is gone
    struct NoShutdown;

    impl AsyncWrite for NoShutdown {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }
    }

    #[tokio::test]
    async fn writes_exact_exd_line() {
        let hub = TopicHub::new();
        let (mut ecu, dashboard) = tokio::io::duplex(256);
        let sender = Sender::spawn("chassis", Box::new(dashboard), hub.subscribe("chassis"));

        hub.publish("chassis", vec![FieldUpdate::new(0x00, 0x64)]);

        let mut buf = [0u8; 9];
        ecu.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"EXD 0064\r");

        assert_eq!(sender.join(Duration::from_secs(1)).await, Some(1));
    }

    #[tokio::test]
    async fn concurrent_publishers_never_interleave() {
        let hub = Arc::new(TopicHub::new());
        let (mut ecu, dashboard) = tokio::io::duplex(64 * 1024);
        let sender = Sender::spawn("chassis", Box::new(dashboard), hub.subscribe("chassis"));

        let mut producers = Vec::new();
        for code in 0..4u8 {
            let hub = hub.clone();
            producers.push(tokio::spawn(async move {
                for value in 0..10u32 {
                    hub.publish("chassis", vec![FieldUpdate::new(code, value); 3]);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        sender.join(Duration::from_secs(1)).await;

        let mut out = String::new();
        ecu.read_to_string(&mut out).await.unwrap();
        let lines: Vec<&str> = out.split_terminator('\r').collect();
        assert_eq!(lines.len(), 40);
        for line in lines {
            let tokens: Vec<&str> = line.split(' ').collect();
            assert_eq!(tokens[0], "EXD");
            assert_eq!(tokens.len(), 4);
            assert!(tokens[1..].iter().all(|t| *t == tokens[1]));
        }
    }

    #[tokio::test]
    async fn stops_while_idle() {
        let hub = TopicHub::new();
        let (_ecu, dashboard) = tokio::io::duplex(64);
        let sender = Sender::spawn("chassis", Box::new(dashboard), hub.subscribe("chassis"));

        sender.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sender.is_finished());
        assert_eq!(sender.join(Duration::from_secs(1)).await, Some(0));
    }

    #[tokio::test]
    async fn failed_shutdown_still_reports_written() {
        let hub = TopicHub::new();
        let sender = Sender::spawn("chassis", Box::new(NoShutdown), hub.subscribe("chassis"));

        hub.publish("chassis", vec![FieldUpdate::new(0x00, 0x64)]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        sender.stop();

        assert_eq!(sender.join(Duration::from_secs(1)).await, Some(1));
    }
}
