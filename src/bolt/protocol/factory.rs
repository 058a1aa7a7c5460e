//! Protocol construction from a negotiated version.

use tracing::debug;

use super::capabilities::VersionCapabilities;
use super::config::ProtocolConfig;
use super::machine::BoltProtocol;
use crate::bolt::channel::Channel;
use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::handshake::ProtocolVersion;

/// Build the protocol for `version` over `channel`.
///
/// Fails with [`BoltError::UnsupportedVersion`] when the handshake agreed on a
/// version this crate does not implement.
///
/// ```
/// use bolt_protocol::bolt::channel::MemoryChannel;
/// use bolt_protocol::bolt::handshake::ProtocolVersion;
/// use bolt_protocol::bolt::protocol::{factory, ProtocolConfig};
///
/// let protocol = factory::create(
///     ProtocolVersion::V5_4,
///     MemoryChannel::new(),
///     ProtocolConfig::default(),
/// )
/// .unwrap();
/// assert!(protocol.capabilities().telemetry);
/// ```
pub fn create<C: Channel>(
    version: ProtocolVersion,
    channel: C,
    config: ProtocolConfig,
) -> BoltResult<BoltProtocol<C>> {
    let caps = VersionCapabilities::for_version(version)
        .ok_or_else(|| BoltError::UnsupportedVersion(version.to_string()))?;
    debug!(%version, "creating protocol");
    Ok(BoltProtocol::new(caps, channel, config))
}

/// Versions [`create`] accepts, newest first.
pub fn supported_versions() -> &'static [ProtocolVersion] {
    &ProtocolVersion::ALL
}
