//! Mock CAN transport for testing

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use testbed_core::CanFrame;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{CanTransport, TransportError};
use crate::config::MockConfig;

/// In-memory transport
///
/// Sent frames are recorded with the (tokio) instant they were sent so tests
/// can check pacing; incoming frames are queued with [`inject_incoming`].
///
/// [`inject_incoming`]: MockCanTransport::inject_incoming
pub struct MockCanTransport {
    config: MockConfig,
    connected: AtomicBool,
    sent: Mutex<Vec<(Instant, CanFrame)>>,
    sent_count: AtomicUsize,
    incoming_tx: mpsc::UnboundedSender<CanFrame>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<CanFrame>>,
}

impl MockCanTransport {
    pub fn new(config: &MockConfig) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            sent_count: AtomicUsize::new(0),
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
        }
    }

    /// Open the mock, honouring `fail_open`
    pub fn open(config: &MockConfig) -> Result<Self, TransportError> {
        if config.fail_open {
            return Err(TransportError::ConnectionFailed(format!(
                "No such device: {}",
                config.interface
            )));
        }
        Ok(Self::new(config))
    }

    /// Queue a frame for the next `recv`
    pub fn inject_incoming(&self, frame: CanFrame) {
        let _ = self.incoming_tx.send(frame);
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Frames sent so far (empty when recording is off)
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent.lock().iter().map(|(_, f)| f.clone()).collect()
    }

    /// Send instants, in order
    pub fn sent_instants(&self) -> Vec<Instant> {
        self.sent.lock().iter().map(|(t, _)| *t).collect()
    }

    /// Number of frames sent, counted even when recording is off
    pub fn sent_count(&self) -> usize {
        self.sent_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CanTransport for MockCanTransport {
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.sent_count.fetch_add(1, Ordering::SeqCst);
        if self.config.record {
            self.sent.lock().push((Instant::now(), frame.clone()));
        }
        tracing::trace!(%frame, "Mock transport: sent frame");
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let mut rx = self.incoming_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            // Sender half lives in self, so the channel never closes
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    fn interface(&self) -> &str {
        &self.config.interface
    }
}
