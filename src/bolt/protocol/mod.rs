//! Versioned Bolt protocol.
//!
//! A connection negotiates a version with the [handshake](super::handshake),
//! then [`factory::create`] builds a [`BoltProtocol`] for it. The protocol
//! packs requests with the version's codec, chunks them onto a
//! [`Channel`](super::channel::Channel), and routes every response to the
//! observer registered for its request.
//!
//! ```
//! use std::collections::HashMap;
//! use bolt_protocol::bolt::channel::MemoryChannel;
//! use bolt_protocol::bolt::handshake::ProtocolVersion;
//! use bolt_protocol::bolt::message::AuthToken;
//! use bolt_protocol::bolt::protocol::{
//!     factory, AuthenticateOptions, LoginObserver, ProtocolConfig, ResultStreamObserver,
//!     RunOptions,
//! };
//!
//! let channel = MemoryChannel::new();
//! let mut protocol =
//!     factory::create(ProtocolVersion::V5_4, channel.clone(), ProtocolConfig::default()).unwrap();
//!
//! protocol
//!     .authenticate(
//!         AuthenticateOptions::new(AuthToken::basic("neo4j", "secret")),
//!         LoginObserver::new(),
//!     )
//!     .unwrap();
//! protocol
//!     .run("RETURN 1", HashMap::new(), RunOptions::new(), ResultStreamObserver::new())
//!     .unwrap();
//!
//! // HELLO, LOGON, RUN and PULL are waiting on the channel.
//! assert_eq!(protocol.pending(), 3);
//! assert!(!channel.written().is_empty());
//! ```

pub mod capabilities;
pub mod config;
pub mod factory;
pub mod machine;
pub mod observer;
pub mod options;
pub mod queue;

pub use capabilities::VersionCapabilities;
pub use config::{ProtocolConfig, ProtocolConfigBuilder};
pub use factory::{create, supported_versions};
pub use machine::{BoltProtocol, ProtocolState};
pub use observer::{
    LoginObserver, LogoffObserver, ResetObserver, ResponseObserver, ResultStreamObserver,
    RouteObserver, StreamControl, StreamEvent, SummaryObserver, TelemetryObserver,
};
pub use options::{
    AuthenticateOptions, BeginOptions, RouteOptions, RunOptions, TelemetryOptions,
    DEFAULT_USER_AGENT,
};
pub use queue::{DispatchOutcome, ObserverQueue};
