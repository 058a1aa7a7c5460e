//! # Bolt Protocol Implementation
//!
//! Client side core of the Bolt protocol spoken by graph database servers.
//!
//! ## Overview
//!
//! Bolt is a binary request/response protocol. Requests are PackStream
//! structures split into chunks; the server answers each request, in order,
//! with zero or more RECORDs followed by one summary (SUCCESS, FAILURE or
//! IGNORED). This module provides:
//!
//! - **PackStream** - Value codec with per-version structure transformers
//! - **Chunking** - Message framing in both directions
//! - **Messages** - Typed requests and responses
//! - **Handshake** - Version negotiation
//! - **Protocol** - The versioned state machine and its observer queue
//!
//! ## Protocol Versions
//!
//! Bolt 3.0, 4.0 to 4.4 and 5.0 to 5.5 are supported. Differences between
//! versions are captured in
//! [`VersionCapabilities`](protocol::VersionCapabilities).
//!
//! ## Submodules
//!
//! - [`packstream`] - Binary serialization/deserialization
//! - [`chunking`] - Chunker and dechunker
//! - [`message`] - Bolt message types (HELLO, RUN, PULL, etc.)
//! - [`handshake`] - Version negotiation
//! - [`channel`] - Outbound byte sinks
//! - [`protocol`] - State machine, observers and factory
//! - [`error`] - Protocol error types

pub mod channel;
pub mod chunking;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod protocol;

pub use channel::{Channel, MemoryChannel, MpscChannel};
pub use chunking::{Chunker, Dechunker};
pub use error::{BoltError, BoltResult, HandshakeError};
pub use handshake::{ProtocolVersion, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE};
pub use message::{
    AccessMode, AuthToken, BoltAgent, FailureMessage, NotificationFilter, NotificationSeverity,
    Request, Response, RoutingTable, SuccessMessage, TelemetryApi, TxConfig,
};
pub use packstream::{CodecConfig, IntegerMode, PackStreamError, TransformerRegistry, Value};
pub use protocol::{factory, BoltProtocol, ProtocolConfig, ProtocolState};
