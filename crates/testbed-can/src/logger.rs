//! Raw frame logger
//!
//! Writes one candump-style line per received frame:
//!
//! ```text
//! (1712345678.123456) vcan0      043   [8]  FF 00 00 00 00 00 00 00
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::transport::{CanTransport, TransportError};

/// Receive poll interval; bounds how long `stop` takes to be noticed
const DEFAULT_POLL: Duration = Duration::from_millis(100);

pub struct CanLogger {
    path: PathBuf,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl CanLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval: DEFAULT_POLL,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flag checked between receives; clear it to stop the logger
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Log until stopped. The file is truncated on start.
    ///
    /// Returns the number of frames written.
    pub async fn run(&self, transport: Arc<dyn CanTransport>) -> Result<u64, TransportError> {
        let mut file = File::create(&self.path).await.map_err(|e| {
            TransportError::LogFile(format!("{}: {}", self.path.display(), e))
        })?;

        tracing::info!(
            interface = transport.interface(),
            path = %self.path.display(),
            "CAN logger started"
        );

        let mut logged = 0u64;
        while self.running.load(Ordering::SeqCst) {
            let Some(frame) = transport.recv(self.poll_interval).await? else {
                continue;
            };

            let ts = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
            let line = format!("({:.6}) {} {}\n", ts, transport.interface(), frame);
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| TransportError::LogFile(e.to_string()))?;
            logged += 1;
        }

        file.flush()
            .await
            .map_err(|e| TransportError::LogFile(e.to_string()))?;
        tracing::info!(frames = logged, "CAN logger stopped");
        Ok(logged)
    }

    /// Run on a background task; failures end the logger only
    pub fn spawn(self, transport: Arc<dyn CanTransport>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run(transport).await {
                tracing::error!(error = %e, "CAN logger failed. Is the CAN interface up?");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::transport::mock::MockCanTransport;
    use testbed_core::CanFrame;

    #[tokio::test]
    async fn writes_one_line_per_frame_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("can.log");

        let mock = Arc::new(MockCanTransport::new(&MockConfig::default()));
        mock.inject_incoming(CanFrame::new(0x43, &[0xFF, 0x00]).unwrap());
        mock.inject_incoming(CanFrame::new(0x1A, &[0x00, 0x64]).unwrap());

        let logger = CanLogger::new(&path).with_poll_interval(Duration::from_millis(10));
        let running = logger.running_flag();
        let transport: Arc<dyn CanTransport> = mock.clone();
        let handle = tokio::spawn(async move { logger.run(transport).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        running.store(false, Ordering::SeqCst);
        let logged = handle.await.unwrap().unwrap();
        assert_eq!(logged, 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("mock0      043   [2]  FF 00"));
        assert!(lines[1].ends_with("01A   [2]  00 64"));
    }

    #[tokio::test]
    async fn unwritable_path_fails_without_panicking() {
        let mock: Arc<dyn CanTransport> = Arc::new(MockCanTransport::new(&MockConfig::default()));
        let logger = CanLogger::new("/nonexistent-dir/can.log");
        assert!(matches!(
            logger.run(mock).await,
            Err(TransportError::LogFile(_))
        ));
    }
}
