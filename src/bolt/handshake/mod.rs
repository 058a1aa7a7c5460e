//! Bolt protocol handshake, client side.
//!
//! The Bolt handshake consists of:
//! 1. Client sends 4-byte magic number (0x6060B017)
//! 2. Client sends 4 x 4-byte version proposals (highest first)
//! 3. Server responds with 4-byte agreed version (or 0 if none)

mod version;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub use version::ProtocolVersion;

pub use super::error::HandshakeError;
use super::error::BoltError;

/// Bolt protocol magic number: 0x6060B017
/// This identifies a Bolt connection.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the complete handshake message from client (magic + 4 versions)
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of server response (negotiated version)
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// "HTTP" read as a version: the server speaks HTTP, not Bolt.
const HTTP_MAGIC: u32 = 0x4854_5450;

/// One of the four version slots, covering `minor - range ..= minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProposal {
    /// Highest version of the slot
    pub version: ProtocolVersion,
    /// How many minor versions below `version` are also accepted
    pub range: u8,
}

impl VersionProposal {
    /// Exact version.
    pub fn exact(version: ProtocolVersion) -> Self {
        Self { version, range: 0 }
    }

    /// Version plus `range` lower minors.
    pub fn with_range(version: ProtocolVersion, range: u8) -> Self {
        Self { version, range }
    }

    /// Whether `version` falls in this slot.
    pub fn covers(&self, version: ProtocolVersion) -> bool {
        version.major == self.version.major
            && version.minor <= self.version.minor
            && version.minor >= self.version.minor.saturating_sub(self.range)
    }
}

/// Proposals covering every supported version: 5.5-5.0, 4.4-4.2, 4.1-4.0, 3.0.
pub fn default_proposals() -> [VersionProposal; 4] {
    [
        VersionProposal::with_range(ProtocolVersion::V5_5, 5),
        VersionProposal::with_range(ProtocolVersion::V4_4, 2),
        VersionProposal::with_range(ProtocolVersion::V4_1, 1),
        VersionProposal::exact(ProtocolVersion::V3_0),
    ]
}

/// Build the 20 byte client handshake. Missing slots are zero filled.
pub fn handshake_request(proposals: &[VersionProposal]) -> Result<Bytes, HandshakeError> {
    if proposals.len() > 4 {
        return Err(HandshakeError::InvalidData(format!(
            "At most 4 version proposals fit in a handshake, got {}",
            proposals.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(HANDSHAKE_SIZE);
    buf.put_slice(&BOLT_MAGIC);
    for proposal in proposals {
        buf.put_u32(proposal.version.encode_with_range(proposal.range));
    }
    for _ in proposals.len()..4 {
        buf.put_u32(0);
    }
    Ok(buf.freeze())
}

/// Interpret the server's 4 byte answer.
pub fn parse_response(
    response: [u8; 4],
    proposals: &[VersionProposal],
) -> Result<ProtocolVersion, HandshakeError> {
    match u32::from_be_bytes(response) {
        0 => Err(HandshakeError::NoCompatibleVersion),
        HTTP_MAGIC => Err(HandshakeError::HttpServer),
        raw => {
            let version = ProtocolVersion::from_u32(raw);
            if proposals.iter().any(|p| p.covers(version)) {
                Ok(version)
            } else {
                Err(HandshakeError::UnexpectedVersion(version.to_string()))
            }
        }
    }
}

/// Run the handshake over a fresh stream.
pub async fn perform<S>(
    stream: &mut S,
    proposals: &[VersionProposal],
) -> Result<ProtocolVersion, BoltError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = handshake_request(proposals)?;
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut response = [0u8; HANDSHAKE_RESPONSE_SIZE];
    stream.read_exact(&mut response).await?;
    let version = parse_response(response, proposals)?;
    debug!(%version, "negotiated protocol version");
    Ok(version)
}
