//! Filtered bus capture
//!
//! A [`SniffSession`] owns one capture task at a time. Frames whose id is
//! switched on in the filter become [`SniffRow`]s in a queue the display side
//! drains at its own pace. The sequence counter lives in the session, so
//! stopping and restarting capture continues the numbering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use testbed_can::CanTransport;
use testbed_core::{CanFrame, MessageRegistry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AttackError, AttackResult};

/// Characters of the hex string shown in the preview column
const PREVIEW_CHARS: usize = 5;

const DEFAULT_POLL: Duration = Duration::from_millis(100);

/// One captured frame as shown in the sniffer table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SniffRow {
    pub sequence: u64,
    pub id: u32,
    pub name: &'static str,
    pub len: usize,
    /// First bytes of `data_full`, e.g. `"FF 00"`
    pub data_preview: String,
    /// Whole payload as space separated hex
    pub data_full: String,
}

impl SniffRow {
    pub fn from_frame(sequence: u64, frame: &CanFrame) -> Self {
        let data_full = frame.hex_data();
        let data_preview = data_full.chars().take(PREVIEW_CHARS).collect();
        Self {
            sequence,
            id: frame.id(),
            name: MessageRegistry::global().lookup(frame.id()),
            len: frame.len(),
            data_preview,
            data_full,
        }
    }

    /// Id formatted as `0x43`
    pub fn id_hex(&self) -> String {
        format!("{:#x}", self.id)
    }
}

pub struct SniffSession {
    transport: Arc<dyn CanTransport>,
    filter: Arc<RwLock<HashMap<u32, bool>>>,
    counter: Arc<AtomicU64>,
    rows_tx: mpsc::UnboundedSender<SniffRow>,
    rows_rx: Mutex<mpsc::UnboundedReceiver<SniffRow>>,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl SniffSession {
    pub fn new(transport: Arc<dyn CanTransport>) -> Self {
        let (rows_tx, rows_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            filter: Arc::new(RwLock::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(0)),
            rows_tx,
            rows_rx: Mutex::new(rows_rx),
            running: Arc::new(AtomicBool::new(false)),
            task: None,
            poll_interval: DEFAULT_POLL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn interface(&self) -> &str {
        self.transport.interface()
    }

    /// Include or exclude one id; ids never set are excluded
    pub fn set_filter(&self, id: u32, included: bool) {
        self.filter.write().insert(id, included);
    }

    /// Switch every registered id (and every id set before) on or off
    pub fn select_all(&self, included: bool) {
        let mut filter = self.filter.write();
        for def in MessageRegistry::global().iter() {
            filter.insert(def.id, included);
        }
        for value in filter.values_mut() {
            *value = included;
        }
    }

    pub fn is_included(&self, id: u32) -> bool {
        self.filter.read().get(&id).copied().unwrap_or(false)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Rows captured so far (the next row gets this number plus one)
    pub fn captured(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn start(&mut self) -> AttackResult<()> {
        if self.is_running() {
            return Err(AttackError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let transport = self.transport.clone();
        let filter = self.filter.clone();
        let counter = self.counter.clone();
        let rows = self.rows_tx.clone();
        let running = self.running.clone();
        let poll = self.poll_interval;

        self.task = Some(tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let frame = match transport.recv(poll).await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::error!(
                            interface = transport.interface(),
                            error = %e,
                            "Sniffer receive failed"
                        );
                        break;
                    }
                };

                let included = filter.read().get(&frame.id()).copied().unwrap_or(false);
                if !included || !running.load(Ordering::SeqCst) {
                    continue;
                }
                let sequence = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if rows.send(SniffRow::from_frame(sequence, &frame)).is_err() {
                    break;
                }
            }
        }));

        tracing::info!(interface = self.interface(), "Sniffer started");
        Ok(())
    }

    /// Stop capture and wait for the task
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Sniffer task failed");
            }
        }
        tracing::info!(captured = self.captured(), "Sniffer stopped");
    }

    pub async fn restart(&mut self) -> AttackResult<()> {
        self.stop().await;
        self.start()
    }

    /// Take up to `max` queued rows, oldest first, without waiting
    pub fn drain(&self, max: usize) -> Vec<SniffRow> {
        let mut rx = self.rows_rx.lock();
        let mut rows = Vec::new();
        while rows.len() < max {
            match rx.try_recv() {
                Ok(row) => rows.push(row),
                Err(_) => break,
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testbed_can::{MockCanTransport, MockConfig};

    const POLL: Duration = Duration::from_millis(5);

    fn frame(id: u32, data: &[u8]) -> CanFrame {
        CanFrame::new(id, data).unwrap()
    }

    #[test]
    fn row_columns() {
        let row = SniffRow::from_frame(7, &frame(0x43, &[0xFF, 0, 0, 0, 0, 0, 0, 0]));
        assert_eq!(row.sequence, 7);
        assert_eq!(row.id_hex(), "0x43");
        assert_eq!(row.name, "ENGINE_RPM_MSG");
        assert_eq!(row.len, 8);
        assert_eq!(row.data_preview, "FF 00");
        assert_eq!(row.data_full, "FF 00 00 00 00 00 00 00");

        let unknown = SniffRow::from_frame(1, &frame(0x7FF, &[]));
        assert_eq!(unknown.name, "UNKNOWN ID");
        assert_eq!(unknown.data_preview, "");
    }

    #[tokio::test]
    async fn only_included_ids_are_captured() {
        let mock = Arc::new(MockCanTransport::new(&MockConfig::default()));
        let mut session = SniffSession::new(mock.clone()).with_poll_interval(POLL);
        session.set_filter(0x43, true);
        session.start().unwrap();

        mock.inject_incoming(frame(0x43, &[1]));
        mock.inject_incoming(frame(0x1A, &[2]));
        mock.inject_incoming(frame(0x43, &[3]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let rows = session.drain(100);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sequence, 1);
        assert_eq!(rows[1].sequence, 2);
        assert!(rows.iter().all(|r| r.id == 0x43));
        session.stop().await;
    }

    #[tokio::test]
    async fn counter_survives_restart() {
        let mock = Arc::new(MockCanTransport::new(&MockConfig::default()));
        let mut session = SniffSession::new(mock.clone()).with_poll_interval(POLL);
        session.select_all(true);
        session.start().unwrap();

        mock.inject_incoming(frame(0x98, &[1]));
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.restart().await.unwrap();
        mock.inject_incoming(frame(0x98, &[1]));
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.stop().await;

        let seq: Vec<u64> = session.drain(10).iter().map(|r| r.sequence).collect();
        assert_eq!(seq, vec![1, 2]);
    }

    #[tokio::test]
    async fn select_none_excludes_everything() {
        let mock = Arc::new(MockCanTransport::new(&MockConfig::default()));
        let session = SniffSession::new(mock);
        session.set_filter(0x123, true);
        session.select_all(false);
        assert!(!session.is_included(0x123));
        assert!(!session.is_included(0x43));
        session.select_all(true);
        assert!(session.is_included(0x43));
        assert!(!session.is_included(0x555));
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mock = Arc::new(MockCanTransport::new(&MockConfig::default()));
        let mut session = SniffSession::new(mock).with_poll_interval(POLL);
        session.start().unwrap();
        assert!(matches!(session.start(), Err(AttackError::AlreadyRunning)));
        session.stop().await;
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn drain_respects_max() {
        let mock = Arc::new(MockCanTransport::new(&MockConfig::default()));
        let mut session = SniffSession::new(mock.clone()).with_poll_interval(POLL);
        session.set_filter(0x24, true);
        session.start().unwrap();
        for _ in 0..5 {
            mock.inject_incoming(frame(0x24, &[0]));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.drain(3).len(), 3);
        assert_eq!(session.drain(3).len(), 2);
        session.stop().await;
    }
}
