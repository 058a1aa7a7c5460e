//! Typed options of the protocol operations.
//!
//! Each operation takes one struct with a `Default` and `with_*` builders.
//! Options a negotiated version cannot carry are rejected before anything is
//! written.

use crate::bolt::message::{
    AccessMode, AuthToken, BoltAgent, NotificationFilter, TelemetryApi, TxConfig, FETCH_ALL,
};
use crate::bolt::packstream::Metadata;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("bolt-protocol/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// AuthenticateOptions
// ============================================================================

/// Options of [`authenticate`](super::BoltProtocol::authenticate).
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticateOptions {
    /// Credentials
    pub auth: AuthToken,
    /// `user_agent` of HELLO
    pub user_agent: String,
    /// Routing context; `None` for a direct connection
    pub routing_context: Option<Metadata>,
    /// Connection wide notification filter
    pub notification_filter: Option<NotificationFilter>,
    /// Driver identification (5.3+)
    pub bolt_agent: BoltAgent,
    /// Write the requests to the channel at once; `false` leaves them
    /// buffered until the next flushing operation or
    /// [`flush`](super::BoltProtocol::flush)
    pub flush: bool,
}

impl AuthenticateOptions {
    /// Options authenticating with `auth`.
    pub fn new(auth: AuthToken) -> Self {
        Self {
            auth,
            ..Self::default()
        }
    }

    /// Set user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set routing context.
    pub fn with_routing_context(mut self, routing: Metadata) -> Self {
        self.routing_context = Some(routing);
        self
    }

    /// Set notification filter.
    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.notification_filter = Some(filter);
        self
    }

    /// Set bolt agent.
    pub fn with_bolt_agent(mut self, agent: BoltAgent) -> Self {
        self.bolt_agent = agent;
        self
    }

    /// Set whether to flush.
    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }
}

impl Default for AuthenticateOptions {
    fn default() -> Self {
        Self {
            auth: AuthToken::none(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            routing_context: None,
            notification_filter: None,
            bolt_agent: BoltAgent::default(),
            flush: true,
        }
    }
}

// ============================================================================
// Transaction options
// ============================================================================

/// Options of [`run`](super::BoltProtocol::run).
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Bookmarks to wait for (auto-commit only)
    pub bookmarks: Vec<String>,
    /// Timeout and metadata (auto-commit only)
    pub tx_config: TxConfig,
    /// Access mode
    pub mode: AccessMode,
    /// Target database (4.0+)
    pub database: Option<String>,
    /// Impersonated user (4.4+)
    pub impersonated_user: Option<String>,
    /// Notification filter (5.2+)
    pub notification_filter: Option<NotificationFilter>,
    /// Records per PULL; [`FETCH_ALL`] pulls everything at once
    pub fetch_size: i64,
    /// Whether the RUN is part of an explicit transaction; transaction
    /// extras are then carried by BEGIN instead
    pub in_transaction: bool,
    /// Write RUN and PULL to the channel at once
    pub flush: bool,
}

impl RunOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bookmarks.
    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Set transaction config.
    pub fn with_tx_config(mut self, config: TxConfig) -> Self {
        self.tx_config = config;
        self
    }

    /// Set access mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set impersonated user.
    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.impersonated_user = Some(user.into());
        self
    }

    /// Set notification filter.
    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.notification_filter = Some(filter);
        self
    }

    /// Set fetch size.
    pub fn with_fetch_size(mut self, fetch_size: i64) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Mark the RUN as part of an open transaction.
    pub fn in_transaction(mut self) -> Self {
        self.in_transaction = true;
        self
    }

    /// Set whether to flush.
    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            bookmarks: Vec::new(),
            tx_config: TxConfig::default(),
            mode: AccessMode::default(),
            database: None,
            impersonated_user: None,
            notification_filter: None,
            fetch_size: FETCH_ALL,
            in_transaction: false,
            flush: true,
        }
    }
}

/// Options of [`begin_transaction`](super::BoltProtocol::begin_transaction).
///
/// BEGIN is often followed right away by a RUN; with `flush` off both reach
/// the channel in one write.
#[derive(Debug, Clone, PartialEq)]
pub struct BeginOptions {
    /// Bookmarks to wait for
    pub bookmarks: Vec<String>,
    /// Timeout and metadata
    pub tx_config: TxConfig,
    /// Access mode
    pub mode: AccessMode,
    /// Target database (4.0+)
    pub database: Option<String>,
    /// Impersonated user (4.4+)
    pub impersonated_user: Option<String>,
    /// Notification filter (5.2+)
    pub notification_filter: Option<NotificationFilter>,
    /// Write BEGIN to the channel at once
    pub flush: bool,
}

impl BeginOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bookmarks.
    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Set transaction config.
    pub fn with_tx_config(mut self, config: TxConfig) -> Self {
        self.tx_config = config;
        self
    }

    /// Set access mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set impersonated user.
    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.impersonated_user = Some(user.into());
        self
    }

    /// Set notification filter.
    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.notification_filter = Some(filter);
        self
    }

    /// Set whether to flush.
    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }
}

impl Default for BeginOptions {
    fn default() -> Self {
        Self {
            bookmarks: Vec::new(),
            tx_config: TxConfig::default(),
            mode: AccessMode::default(),
            database: None,
            impersonated_user: None,
            notification_filter: None,
            flush: true,
        }
    }
}

// ============================================================================
// RouteOptions / TelemetryOptions
// ============================================================================

/// Options of
/// [`request_routing_information`](super::BoltProtocol::request_routing_information).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOptions {
    /// Routing context, usually the query parameters of the routing URI
    pub routing_context: Metadata,
    /// Bookmarks
    pub bookmarks: Vec<String>,
    /// Database whose table is requested; `None` for the default database
    pub database: Option<String>,
    /// Impersonated user (4.4+)
    pub impersonated_user: Option<String>,
}

impl RouteOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set routing context.
    pub fn with_routing_context(mut self, routing: Metadata) -> Self {
        self.routing_context = routing;
        self
    }

    /// Set bookmarks.
    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Set database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set impersonated user.
    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.impersonated_user = Some(user.into());
        self
    }
}

/// Options of [`telemetry`](super::BoltProtocol::telemetry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryOptions {
    /// API being reported
    pub api: TelemetryApi,
}

impl TelemetryOptions {
    /// Report `api`.
    pub fn new(api: TelemetryApi) -> Self {
        Self { api }
    }
}
