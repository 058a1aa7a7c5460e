//! Outbound byte channels.
//!
//! The protocol never owns a socket. It hands framed bytes to a [`Channel`];
//! whoever owns the transport feeds received bytes back through
//! [`BoltProtocol::handle_bytes`](crate::bolt::protocol::BoltProtocol::handle_bytes).

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::error::BoltError;

/// Sink for framed protocol bytes.
pub trait Channel: Send {
    /// Queue bytes for the transport.
    fn write(&mut self, bytes: Bytes) -> Result<(), BoltError>;

    /// Release the transport once GOODBYE has been written.
    fn close(&mut self) {}
}

#[derive(Debug, Default)]
struct MemoryState {
    writes: Vec<Bytes>,
    closed: bool,
    failure: Option<BoltError>,
}

/// In-memory channel recording every write.
///
/// Clones share the same buffer so a test can keep a handle after moving
/// the channel into a protocol.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every byte written so far, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .flat_map(|b| b.iter().copied())
            .collect()
    }

    /// Number of `write` calls.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    /// Drain the recorded writes.
    pub fn take(&self) -> Vec<u8> {
        let writes = std::mem::take(&mut self.state.lock().writes);
        writes.iter().flat_map(|b| b.iter().copied()).collect()
    }

    /// Make every following write fail with `error`.
    pub fn fail_with(&self, error: BoltError) {
        self.state.lock().failure = Some(error);
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Channel for MemoryChannel {
    fn write(&mut self, bytes: Bytes) -> Result<(), BoltError> {
        let mut state = self.state.lock();
        if let Some(error) = &state.failure {
            return Err(error.clone());
        }
        if state.closed {
            return Err(BoltError::ConnectionClosed);
        }
        state.writes.push(bytes);
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }
}

/// Channel forwarding writes to a tokio mpsc receiver.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    sender: Option<mpsc::UnboundedSender<Bytes>>,
}

impl MpscChannel {
    /// Create a channel and the receiver draining it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }
}

impl Channel for MpscChannel {
    fn write(&mut self, bytes: Bytes) -> Result<(), BoltError> {
        let sender = self.sender.as_ref().ok_or(BoltError::ConnectionClosed)?;
        sender
            .send(bytes)
            .map_err(|_| BoltError::Connection("writer task has stopped".to_string()))
    }

    fn close(&mut self) {
        // Dropping the sender ends the writer loop once it drains.
        self.sender = None;
    }
}

/// Spawn a task copying channel writes into `writer`.
///
/// The task ends when the channel is closed or dropped, or on the first
/// I/O error, which it returns.
pub fn spawn_writer<W>(mut writer: W) -> (MpscChannel, JoinHandle<Result<(), BoltError>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (channel, mut receiver) = MpscChannel::new();
    let handle = tokio::spawn(async move {
        while let Some(bytes) = receiver.recv().await {
            trace!(bytes = bytes.len(), "writing to transport");
            writer.write_all(&bytes).await?;
            writer.flush().await?;
        }
        debug!("writer task finished");
        writer.shutdown().await?;
        Ok::<(), BoltError>(())
    });
    (channel, handle)
}
