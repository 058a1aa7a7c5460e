//! # Bolt Protocol
//!
//! Versioned client core of the Bolt protocol used by graph databases.
//!
//! ## Features
//!
//! - **PackStream** - Binary codec with temporal, spatial and graph types
//! - **Bolt 3.0 to 5.5** - One state machine parameterized by version capabilities
//! - **Observers** - Every response is routed, in order, to the observer of its request
//! - **Transport agnostic** - Requests are written to a [`Channel`], responses are fed as bytes
//!
//! ## Basic Usage
//!
//! The crate does no I/O of its own. The caller performs the handshake,
//! writes what the protocol hands to its channel and feeds received bytes
//! back:
//!
//! ```rust
//! use std::collections::HashMap;
//! use bolt_protocol::{factory, AuthToken, MemoryChannel, ProtocolConfig, ProtocolVersion};
//! use bolt_protocol::bolt::protocol::{
//!     AuthenticateOptions, LoginObserver, ResultStreamObserver, RunOptions,
//! };
//!
//! let channel = MemoryChannel::new();
//! let mut protocol =
//!     factory::create(ProtocolVersion::V4_4, channel.clone(), ProtocolConfig::default())?;
//!
//! protocol.authenticate(
//!     AuthenticateOptions::new(AuthToken::basic("neo4j", "secret")),
//!     LoginObserver::new().on_complete(|meta| println!("connected: {:?}", meta.get("server"))),
//! )?;
//! protocol.run(
//!     "MATCH (n) RETURN n LIMIT 10",
//!     HashMap::new(),
//!     RunOptions::new().with_database("movies").with_fetch_size(1000),
//!     ResultStreamObserver::new().on_record(|values| println!("{:?}", values)),
//! )?;
//!
//! // Send `channel.take()` to the server, then feed its answer:
//! // protocol.handle_bytes(&received)?;
//! # Ok::<(), bolt_protocol::BoltError>(())
//! ```
//!
//! ## Async Transports
//!
//! [`bolt::channel::spawn_writer`] drives any `AsyncWrite` from a Tokio task,
//! and [`ResultStreamObserver::channel`](bolt::protocol::ResultStreamObserver::channel)
//! exposes records as a `Stream`.
//!
//! ## Modules
//!
//! - [`bolt`] - Codec, framing, messages, handshake and protocol

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;

// Re-exports for convenience
pub use bolt::{
    factory, AccessMode, AuthToken, BoltError, BoltProtocol, BoltResult, Channel, CodecConfig,
    MemoryChannel, ProtocolConfig, ProtocolState, ProtocolVersion, Value,
};
