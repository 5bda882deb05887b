//! Raw SocketCAN transport (CAN-FD capable socket)

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{
    CanAnyFrame, CanFdFrame, CanFdSocket, CanFrame as RawCanFrame, EmbeddedFrame, ExtendedId,
    Frame, Id, Socket, StandardId,
};
use testbed_core::CanFrame;

use super::{CanTransport, TransportError};
use crate::config::SocketCanConfig;

/// Linux `ENOBUFS`: the interface TX queue is full
const ENOBUFS: i32 = 105;

/// Raw CAN socket bound to one interface
pub struct SocketCanTransport {
    config: SocketCanConfig,
    socket: Arc<Mutex<CanFdSocket>>,
}

impl SocketCanTransport {
    pub async fn open(config: &SocketCanConfig) -> Result<Self, TransportError> {
        let socket = CanFdSocket::open(&config.interface).map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to open CAN socket on {}: {} (is the interface up?)",
                config.interface, e
            ))
        })?;

        socket.set_nonblocking(true).map_err(|e| {
            TransportError::InvalidConfig(format!("Failed to set non-blocking: {}", e))
        })?;

        tracing::debug!(interface = %config.interface, "Opened raw CAN socket");

        Ok(Self {
            config: config.clone(),
            socket: Arc::new(Mutex::new(socket)),
        })
    }

    fn write_once(&self, frame: &CanFrame) -> io::Result<()> {
        let id = raw_id(frame)?;
        let socket = self.socket.lock();
        if frame.is_fd() {
            let raw = CanFdFrame::new(id, frame.data())
                .ok_or_else(|| invalid_frame("FD payload rejected"))?;
            socket.write_frame(&raw)
        } else {
            let raw = RawCanFrame::new(id, frame.data())
                .ok_or_else(|| invalid_frame("classic payload rejected"))?;
            socket.write_frame(&raw)
        }
    }
}

#[async_trait]
impl CanTransport for SocketCanTransport {
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        if frame.is_fd() && !self.config.fd {
            return Err(TransportError::InvalidConfig(format!(
                "CAN-FD disabled on {}",
                self.config.interface
            )));
        }

        let mut attempts = 0;
        loop {
            match self.write_once(frame) {
                Ok(()) => return Ok(()),
                Err(e) if is_queue_full(&e) && attempts < self.config.send_retries => {
                    attempts += 1;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => {
                    return Err(TransportError::SendFailed(format!(
                        "{} on {}: {}",
                        frame, self.config.interface, e
                    )))
                }
            }
        }
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        let socket = self.socket.clone();
        let accept_fd = self.config.fd;

        tokio::task::spawn_blocking(move || {
            let deadline = Instant::now() + timeout;
            loop {
                let result = socket.lock().read_frame();
                match result {
                    Ok(CanAnyFrame::Normal(raw)) => {
                        if let Some(frame) = convert(raw.raw_id(), raw.data(), false) {
                            return Ok(Some(frame));
                        }
                    }
                    Ok(CanAnyFrame::Fd(raw)) if accept_fd => {
                        if let Some(frame) = convert(raw.raw_id(), raw.data(), true) {
                            return Ok(Some(frame));
                        }
                    }
                    // Remote, error and (when disabled) FD frames are skipped
                    Ok(_) => {}
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        if Instant::now() >= deadline {
                            return Ok(None);
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
                }
            }
        })
        .await
        .map_err(|e| TransportError::ReceiveFailed(format!("Receive task join error: {}", e)))?
    }

    fn interface(&self) -> &str {
        &self.config.interface
    }
}

fn raw_id(frame: &CanFrame) -> io::Result<Id> {
    let id = if frame.is_extended() {
        ExtendedId::new(frame.id()).map(Id::Extended)
    } else {
        StandardId::new(frame.id() as u16).map(Id::Standard)
    };
    id.ok_or_else(|| invalid_frame("identifier out of range"))
}

/// Frames the kernel hands us are always well formed; anything our model
/// refuses is logged and dropped.
fn convert(id: u32, data: &[u8], fd: bool) -> Option<CanFrame> {
    let frame = if fd {
        CanFrame::new_fd(id, data)
    } else {
        CanFrame::new(id, data)
    };
    match frame {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping received frame");
            None
        }
    }
}

fn is_queue_full(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(ENOBUFS)
}

fn invalid_frame(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_string())
}
