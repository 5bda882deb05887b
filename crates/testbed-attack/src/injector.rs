//! Paced replay of a single frame

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use testbed_can::CanTransport;
use testbed_core::CanFrame;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{AttackError, AttackResult};

/// Replay rates offered to the user, in Hz
pub const REPLAY_FREQUENCIES: [u32; 4] = [2, 10, 20, 100];

/// Upper bound on injections per replay
pub const MAX_INJECTIONS: u32 = 1000;

/// A validated replay job
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRequest {
    pub frame: CanFrame,
    pub frequency_hz: u32,
    pub count: u32,
}

impl ReplayRequest {
    pub fn new(frame: CanFrame, frequency_hz: u32, count: u32) -> AttackResult<Self> {
        if !REPLAY_FREQUENCIES.contains(&frequency_hz) {
            return Err(AttackError::InvalidFrequency(frequency_hz));
        }
        if !(1..=MAX_INJECTIONS).contains(&count) {
            return Err(AttackError::InvalidCount(count));
        }
        Ok(Self {
            frame,
            frequency_hz,
            count,
        })
    }

    /// Build from user input: hex id (`"43"` or `"0x43"`), hex payload with
    /// optional spaces (`"FF 00"`), and a rate such as `"100 Hz"`.
    ///
    /// Payloads of 8 bytes or more go out as CAN-FD frames.
    pub fn parse(id: &str, data: &str, frequency: &str, count: &str) -> AttackResult<Self> {
        let id_str = id.trim().trim_start_matches("0x").trim_start_matches("0X");
        let id = u32::from_str_radix(id_str, 16)
            .map_err(|_| AttackError::InvalidHex(id.to_string()))?;

        let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        let payload = hex::decode(&compact).map_err(|e| AttackError::InvalidHex(e.to_string()))?;

        let freq_str = frequency.trim().trim_end_matches("Hz").trim();
        let frequency_hz = freq_str
            .parse()
            .map_err(|_| AttackError::InvalidFrequency(0))?;
        let count = count
            .trim()
            .parse()
            .map_err(|_| AttackError::InvalidCount(0))?;

        Self::new(CanFrame::for_payload(id, &payload)?, frequency_hz, count)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(1) / self.frequency_hz
    }

    /// Nominal run time of the whole replay
    pub fn duration(&self) -> Duration {
        self.interval() * self.count
    }
}

/// Running replay, cancellable at any point between sends
pub struct Injector {
    request: ReplayRequest,
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
    sent: Arc<AtomicUsize>,
    handle: JoinHandle<AttackResult<usize>>,
}

impl Injector {
    pub fn start(transport: Arc<dyn CanTransport>, request: ReplayRequest) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let sent = Arc::new(AtomicUsize::new(0));

        let task_request = request.clone();
        let task_cancelled = cancelled.clone();
        let task_wake = wake.clone();
        let task_sent = sent.clone();
        let handle = tokio::spawn(async move {
            let interval = task_request.interval();
            for i in 0..task_request.count {
                if i > 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = task_wake.notified() => break,
                    }
                }
                if task_cancelled.load(Ordering::SeqCst) {
                    break;
                }
                transport.send(&task_request.frame).await?;
                task_sent.fetch_add(1, Ordering::SeqCst);
            }
            Ok(task_sent.load(Ordering::SeqCst))
        });

        tracing::info!(
            frame = %request.frame,
            frequency_hz = request.frequency_hz,
            count = request.count,
            "Injection started"
        );

        Self {
            request,
            cancelled,
            wake,
            sent,
            handle,
        }
    }

    pub fn request(&self) -> &ReplayRequest {
        &self.request
    }

    /// Frames sent so far, for progress display
    pub fn progress(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop before the next send, cutting short the wait for it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Stores a permit if the task is mid-send, so the next wait ends at once
        self.wake.notify_one();
    }

    /// Wait for the replay to end; returns the number of frames sent
    pub async fn join(self) -> AttackResult<usize> {
        let result = match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Injector task failed");
                Ok(self.sent.load(Ordering::SeqCst))
            }
        };
        tracing::info!(sent = self.sent.load(Ordering::SeqCst), "Injection finished");
        result
    }
}
