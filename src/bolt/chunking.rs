//! Chunked message framing.
//!
//! A serialized message travels as one or more chunks, each prefixed with a
//! 2-byte big-endian length, followed by a zero-length chunk marking the end
//! of the message. A lone end marker is a NOOP (keep-alive) and carries no
//! message.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use super::BoltError;

/// Default maximum chunk size (16KB)
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Largest chunk the 16-bit prefix can describe
pub const CHUNK_SIZE_LIMIT: usize = u16::MAX as usize;

/// Default maximum message size (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Splits serialized messages into chunks and buffers them until flushed.
#[derive(Debug)]
pub struct Chunker {
    max_chunk_size: usize,
    buffer: BytesMut,
}

impl Chunker {
    /// Create a chunker with the default chunk size.
    pub fn new() -> Self {
        Self::with_chunk_size(MAX_CHUNK_SIZE)
    }

    /// Create a chunker; the size is clamped to `1..=65535`.
    pub fn with_chunk_size(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.clamp(1, CHUNK_SIZE_LIMIT),
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Maximum payload of a single chunk.
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Append one complete message, chunked and terminated.
    pub fn write_message(&mut self, message: &[u8]) {
        encode_chunked(message, self.max_chunk_size, &mut self.buffer);
    }

    /// Number of framed bytes waiting to be flushed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Take every buffered byte, leaving the chunker empty.
    pub fn take(&mut self) -> Bytes {
        trace!(bytes = self.buffer.len(), "flushing chunks");
        self.buffer.split().freeze()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Bytes> for Chunker {
    type Error = BoltError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_chunked(&item, self.max_chunk_size, dst);
        Ok(())
    }
}

fn encode_chunked(data: &[u8], max_chunk_size: usize, dst: &mut BytesMut) {
    dst.reserve(data.len() + 2 * (data.len() / max_chunk_size + 2));
    for chunk in data.chunks(max_chunk_size) {
        // Write chunk header (2-byte big-endian length)
        dst.put_u16(chunk.len() as u16);
        dst.put_slice(chunk);
    }
    dst.put_slice(&END_MARKER);
}

/// Reassembles messages from chunks, whatever the fragmentation of the
/// incoming bytes.
#[derive(Debug)]
pub struct Dechunker {
    max_message_size: usize,
    message: BytesMut,
    inbound: BytesMut,
}

impl Dechunker {
    /// Create a dechunker with the default size limit.
    pub fn new() -> Self {
        Self::with_max_size(MAX_MESSAGE_SIZE)
    }

    /// Create a dechunker rejecting messages above `max_message_size`.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message: BytesMut::with_capacity(4096),
            inbound: BytesMut::new(),
        }
    }

    /// Feed received bytes and collect every message they complete.
    ///
    /// Bytes of an incomplete chunk or message are kept for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Bytes>, BoltError> {
        self.inbound.extend_from_slice(data);
        let mut inbound = std::mem::take(&mut self.inbound);
        let mut messages = Vec::new();
        let result = loop {
            match self.decode(&mut inbound) {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => break Ok(messages),
                Err(e) => break Err(e),
            }
        };
        self.inbound = inbound;
        result
    }

    /// Whether part of a message has been received.
    pub fn in_message(&self) -> bool {
        !self.message.is_empty() || !self.inbound.is_empty()
    }
}

impl Default for Dechunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Dechunker {
    type Item = Bytes;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Need at least 2 bytes for chunk header
            if src.len() < 2 {
                return Ok(None);
            }

            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);
                if self.message.is_empty() {
                    trace!("received NOOP chunk");
                    continue;
                }
                return Ok(Some(self.message.split().freeze()));
            }

            if src.len() < 2 + chunk_size {
                return Ok(None);
            }

            if self.message.len() + chunk_size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size: self.message.len() + chunk_size,
                    max: self.max_message_size,
                });
            }

            src.advance(2);
            self.message.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}
