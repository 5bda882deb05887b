//! Byte-stream endpoints for ECU channels

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialPortBuilderExt;

use crate::error::{ChannelError, ChannelResult};

/// Nominal line rate of the ECU relays (not part of the logical contract)
pub const DEFAULT_BAUD_RATE: u32 = 9600;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One opened byte stream, split into halves that are handed out once each
///
/// The reader task takes the read half and the sender task (if the channel
/// has one) takes the write half. Each half is dropped by the task that owns
/// it, so the handle is released only after both tasks have finished.
pub struct ChannelEndpoint {
    name: String,
    reader: Option<BoxedReader>,
    writer: Option<BoxedWriter>,
}

impl ChannelEndpoint {
    /// Open a serial device or pty (e.g. `/dev/pts/4`)
    pub fn open_serial(name: &str, path: &str, baud_rate: u32) -> ChannelResult<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| ChannelError::OpenFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(channel = name, path, baud_rate, "Opened ECU channel");
        Ok(Self::from_stream(name, port))
    }

    /// Wrap any duplex byte stream
    pub fn from_stream<S>(name: &str, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            name: name.to_string(),
            reader: Some(Box::new(reader)),
            writer: Some(Box::new(writer)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn take_reader(&mut self) -> ChannelResult<BoxedReader> {
        self.reader
            .take()
            .ok_or_else(|| ChannelError::HalfTaken(self.name.clone(), "read"))
    }

    pub fn take_writer(&mut self) -> ChannelResult<BoxedWriter> {
        self.writer
            .take()
            .ok_or_else(|| ChannelError::HalfTaken(self.name.clone(), "write"))
    }
}

impl std::fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("name", &self.name)
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn halves_are_handed_out_once() {
        let (a, _b) = tokio::io::duplex(64);
        let mut endpoint = ChannelEndpoint::from_stream("chassis", a);

        assert!(endpoint.take_reader().is_ok());
        assert!(endpoint.take_writer().is_ok());
        assert!(matches!(
            endpoint.take_reader(),
            Err(ChannelError::HalfTaken(_, "read"))
        ));
    }

    #[tokio::test]
    async fn missing_device_fails_to_open() {
        let err = ChannelEndpoint::open_serial("body", "/dev/does-not-exist", DEFAULT_BAUD_RATE)
            .unwrap_err();
        assert!(matches!(err, ChannelError::OpenFailed { .. }));
    }
}
