//! Bolt protocol request messages.
//!
//! Request messages are sent from the client to the server. Each message
//! struct holds its fields already in wire form; version differences are
//! applied by the builder methods the protocol chooses to call.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::metadata::{NotificationFilter, NotificationKeys};
use super::tag;
use crate::bolt::error::BoltError;
use crate::bolt::packstream::{Metadata, Value};

/// Fetch size meaning "everything".
pub const FETCH_ALL: i64 = -1;

/// `qid` referring to the last statement of the transaction.
pub const NO_STATEMENT_ID: i64 = -1;

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Read-write access (default)
    #[default]
    Write,
    /// Read-only access
    Read,
}

impl AccessMode {
    /// Convert to string for metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

/// Authentication token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    /// Authentication scheme (e.g., "basic", "bearer")
    pub scheme: String,
    /// Principal (username)
    pub principal: Option<String>,
    /// Credentials (password or token)
    pub credentials: Option<String>,
    /// Realm
    pub realm: Option<String>,
    /// Additional parameters
    pub parameters: Metadata,
}

impl AuthToken {
    /// Create a basic auth token.
    pub fn basic(principal: &str, credentials: &str) -> Self {
        Self {
            scheme: "basic".to_string(),
            principal: Some(principal.to_string()),
            credentials: Some(credentials.to_string()),
            realm: None,
            parameters: HashMap::new(),
        }
    }

    /// Create a bearer (SSO) token.
    pub fn bearer(token: &str) -> Self {
        Self {
            scheme: "bearer".to_string(),
            principal: None,
            credentials: Some(token.to_string()),
            realm: None,
            parameters: HashMap::new(),
        }
    }

    /// Create an anonymous auth token (no auth).
    pub fn none() -> Self {
        Self {
            scheme: "none".to_string(),
            principal: None,
            credentials: None,
            realm: None,
            parameters: HashMap::new(),
        }
    }

    /// Create a token for a custom scheme.
    pub fn custom(scheme: &str, principal: &str, credentials: &str, realm: Option<&str>) -> Self {
        Self {
            scheme: scheme.to_string(),
            principal: Some(principal.to_string()),
            credentials: Some(credentials.to_string()),
            realm: realm.map(str::to_string),
            parameters: HashMap::new(),
        }
    }

    /// Add a scheme specific parameter.
    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Convert to PackStream map.
    pub fn to_map(&self) -> Metadata {
        let mut map = HashMap::new();
        map.insert("scheme".to_string(), Value::String(self.scheme.clone()));
        if let Some(ref p) = self.principal {
            map.insert("principal".to_string(), Value::String(p.clone()));
        }
        if let Some(ref c) = self.credentials {
            map.insert("credentials".to_string(), Value::String(c.clone()));
        }
        if let Some(ref r) = self.realm {
            map.insert("realm".to_string(), Value::String(r.clone()));
        }
        if !self.parameters.is_empty() {
            map.insert("parameters".to_string(), Value::Map(self.parameters.clone()));
        }
        map
    }
}

/// Client identification sent in HELLO (Bolt 5.3+).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoltAgent {
    /// Product and version, e.g. `bolt-protocol/0.1.0`
    pub product: String,
    /// Operating system and architecture
    pub platform: Option<String>,
    /// Implementation language
    pub language: Option<String>,
    /// Language runtime details
    pub language_details: Option<String>,
}

impl BoltAgent {
    /// Agent describing this crate and the host it runs on.
    pub fn from_env() -> Self {
        Self {
            product: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            platform: Some(format!("{}; {}", std::env::consts::OS, std::env::consts::ARCH)),
            language: Some("Rust".to_string()),
            language_details: None,
        }
    }

    /// Convert to PackStream map; absent parts are omitted.
    pub fn to_map(&self) -> Metadata {
        let mut map = HashMap::new();
        map.insert("product".to_string(), Value::String(self.product.clone()));
        for (key, value) in [
            ("platform", &self.platform),
            ("language", &self.language),
            ("language_details", &self.language_details),
        ] {
            if let Some(v) = value {
                map.insert(key.to_string(), Value::String(v.clone()));
            }
        }
        map
    }
}

impl Default for BoltAgent {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Transaction timeout and metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxConfig {
    /// Server side timeout; `None` uses the server default
    pub timeout: Option<Duration>,
    /// Metadata attached to the transaction
    pub metadata: Metadata,
}

impl TxConfig {
    /// Whether nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.timeout.is_none() && self.metadata.is_empty()
    }

    /// Timeout as sent in `tx_timeout`, in whole milliseconds.
    ///
    /// Sub-millisecond timeouts round up so they do not become "no timeout".
    /// A timeout beyond `i64::MAX` milliseconds cannot be sent.
    pub fn timeout_millis(&self) -> Result<Option<i64>, BoltError> {
        let Some(timeout) = self.timeout else {
            return Ok(None);
        };
        let millis = i64::try_from(timeout.as_millis()).map_err(|_| {
            BoltError::contract(format!(
                "Transaction timeout {:?} does not fit in 64-bit milliseconds",
                timeout
            ))
        })?;
        if millis == 0 && !timeout.is_zero() {
            return Ok(Some(1));
        }
        Ok(Some(millis))
    }
}

/// Telemetry API kinds reported with TELEMETRY (Bolt 5.4+).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryApi {
    /// Managed transaction functions
    ManagedTransaction,
    /// Explicit transactions
    UnmanagedTransaction,
    /// Auto-commit transactions
    AutoCommitTransaction,
    /// Driver level query execution
    ExecuteQuery,
}

impl TelemetryApi {
    /// Wire value.
    pub fn as_int(&self) -> i64 {
        match self {
            TelemetryApi::ManagedTransaction => 0,
            TelemetryApi::UnmanagedTransaction => 1,
            TelemetryApi::AutoCommitTransaction => 2,
            TelemetryApi::ExecuteQuery => 3,
        }
    }
}

/// Builders shared by the messages carrying transaction extras (RUN, BEGIN).
///
/// Defaults are omitted from the map.
pub trait TransactionExtra: Sized {
    /// Extra map being built.
    fn extra_mut(&mut self) -> &mut Metadata;

    /// Set bookmarks.
    fn with_bookmarks(mut self, bookmarks: &[String]) -> Self {
        if !bookmarks.is_empty() {
            let list = bookmarks.iter().cloned().map(Value::String).collect();
            self.extra_mut().insert("bookmarks".to_string(), Value::List(list));
        }
        self
    }

    /// Set timeout and metadata. Fails when the timeout cannot be encoded.
    fn with_tx_config(mut self, config: &TxConfig) -> Result<Self, BoltError> {
        if let Some(millis) = config.timeout_millis()? {
            self.extra_mut()
                .insert("tx_timeout".to_string(), Value::Integer(millis));
        }
        if !config.metadata.is_empty() {
            self.extra_mut()
                .insert("tx_metadata".to_string(), Value::Map(config.metadata.clone()));
        }
        Ok(self)
    }

    /// Set access mode.
    fn with_mode(mut self, mode: AccessMode) -> Self {
        if mode == AccessMode::Read {
            self.extra_mut()
                .insert("mode".to_string(), Value::String(mode.as_str().to_string()));
        }
        self
    }

    /// Set database name.
    fn with_database(mut self, database: Option<&str>) -> Self {
        if let Some(db) = database.filter(|db| !db.is_empty()) {
            self.extra_mut()
                .insert("db".to_string(), Value::String(db.to_string()));
        }
        self
    }

    /// Set impersonated user.
    fn with_impersonated_user(mut self, user: Option<&str>) -> Self {
        if let Some(user) = user.filter(|user| !user.is_empty()) {
            self.extra_mut()
                .insert("imp_user".to_string(), Value::String(user.to_string()));
        }
        self
    }

    /// Set notification filter.
    fn with_notification_filter(
        mut self,
        filter: Option<&NotificationFilter>,
        keys: NotificationKeys,
    ) -> Self {
        if let Some(filter) = filter.filter(|filter| !filter.is_empty()) {
            filter.write_to(self.extra_mut(), keys);
        }
        self
    }
}

/// All Bolt request messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// HELLO - Initialize connection
    Hello(HelloMessage),
    /// LOGON - Authenticate (Bolt 5.1+)
    Logon(LogonMessage),
    /// LOGOFF - Deauthenticate (Bolt 5.1+)
    Logoff,
    /// RUN - Execute a query
    Run(RunMessage),
    /// PULL - Pull results (Bolt 4.0+)
    Pull(PullMessage),
    /// PULL_ALL - Pull every result (Bolt 3)
    PullAll,
    /// DISCARD - Discard results (Bolt 4.0+)
    Discard(PullMessage),
    /// DISCARD_ALL - Discard every result (Bolt 3)
    DiscardAll,
    /// BEGIN - Start transaction
    Begin(BeginMessage),
    /// COMMIT - Commit transaction
    Commit,
    /// ROLLBACK - Rollback transaction
    Rollback,
    /// RESET - Reset connection state
    Reset,
    /// ROUTE - Request routing information (Bolt 4.3+)
    Route(RouteMessage),
    /// TELEMETRY - Report API usage (Bolt 5.4+)
    Telemetry(TelemetryApi),
    /// GOODBYE - Close connection gracefully
    Goodbye,
}

impl Request {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            Request::Hello(_) => tag::HELLO,
            Request::Logon(_) => tag::LOGON,
            Request::Logoff => tag::LOGOFF,
            Request::Run(_) => tag::RUN,
            Request::Pull(_) | Request::PullAll => tag::PULL,
            Request::Discard(_) | Request::DiscardAll => tag::DISCARD,
            Request::Begin(_) => tag::BEGIN,
            Request::Commit => tag::COMMIT,
            Request::Rollback => tag::ROLLBACK,
            Request::Reset => tag::RESET,
            Request::Route(_) => tag::ROUTE,
            Request::Telemetry(_) => tag::TELEMETRY,
            Request::Goodbye => tag::GOODBYE,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello(_) => "HELLO",
            Request::Logon(_) => "LOGON",
            Request::Logoff => "LOGOFF",
            Request::Run(_) => "RUN",
            Request::Pull(_) => "PULL",
            Request::PullAll => "PULL_ALL",
            Request::Discard(_) => "DISCARD",
            Request::DiscardAll => "DISCARD_ALL",
            Request::Begin(_) => "BEGIN",
            Request::Commit => "COMMIT",
            Request::Rollback => "ROLLBACK",
            Request::Reset => "RESET",
            Request::Route(_) => "ROUTE",
            Request::Telemetry(_) => "TELEMETRY",
            Request::Goodbye => "GOODBYE",
        }
    }

    /// Fields in wire order.
    pub fn fields(&self) -> Vec<Value> {
        match self {
            Request::Hello(msg) => vec![Value::Map(msg.extra.clone())],
            Request::Logon(msg) => vec![Value::Map(msg.auth.to_map())],
            Request::Run(msg) => vec![
                Value::String(msg.query.clone()),
                Value::Map(msg.parameters.clone()),
                Value::Map(msg.extra.clone()),
            ],
            Request::Pull(msg) | Request::Discard(msg) => vec![Value::Map(msg.to_map())],
            Request::Begin(msg) => vec![Value::Map(msg.extra.clone())],
            Request::Route(msg) => msg.fields(),
            Request::Telemetry(api) => {
                let mut map = HashMap::new();
                map.insert("api".to_string(), Value::Integer(api.as_int()));
                vec![Value::Map(map)]
            }
            Request::Logoff
            | Request::PullAll
            | Request::DiscardAll
            | Request::Commit
            | Request::Rollback
            | Request::Reset
            | Request::Goodbye => Vec::new(),
        }
    }
}

fn masked(map: &Metadata) -> Value {
    let mut map = map.clone();
    if map.contains_key("credentials") {
        map.insert("credentials".to_string(), Value::from("*******"));
    }
    Value::Map(map)
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Hello(msg) => write!(f, "HELLO {}", masked(&msg.extra)),
            Request::Logon(msg) => write!(f, "LOGON {}", masked(&msg.auth.to_map())),
            Request::Run(msg) => write!(
                f,
                "RUN {} {} {}",
                msg.query,
                Value::Map(msg.parameters.clone()),
                Value::Map(msg.extra.clone())
            ),
            other => {
                let fields = other.fields();
                write!(f, "{}", other.name())?;
                for field in &fields {
                    write!(f, " {}", field)?;
                }
                Ok(())
            }
        }
    }
}

/// HELLO message - Initialize connection.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// Extra map sent as the only field
    pub extra: Metadata,
}

impl HelloMessage {
    /// Create a new HELLO message.
    pub fn new(user_agent: &str) -> Self {
        let mut extra = HashMap::new();
        extra.insert("user_agent".to_string(), Value::String(user_agent.to_string()));
        Self { extra }
    }

    /// Merge authentication into the map (Bolt < 5.1).
    pub fn with_auth(mut self, auth: &AuthToken) -> Self {
        self.extra.extend(auth.to_map());
        self
    }

    /// Set routing context (Bolt 4.1+). `None` means a direct connection.
    pub fn with_routing(mut self, routing: Option<&Metadata>) -> Self {
        if let Some(routing) = routing {
            self.extra
                .insert("routing".to_string(), Value::Map(routing.clone()));
        }
        self
    }

    /// Request protocol patches (Bolt 4.3/4.4).
    pub fn with_patch_bolt(mut self, patches: &[&str]) -> Self {
        if !patches.is_empty() {
            let list = patches.iter().map(|p| Value::from(*p)).collect();
            self.extra.insert("patch_bolt".to_string(), Value::List(list));
        }
        self
    }

    /// Set notification filter (Bolt 5.2+).
    pub fn with_notification_filter(
        mut self,
        filter: Option<&NotificationFilter>,
        keys: NotificationKeys,
    ) -> Self {
        if let Some(filter) = filter {
            filter.write_to(&mut self.extra, keys);
        }
        self
    }

    /// Set bolt agent (Bolt 5.3+).
    pub fn with_bolt_agent(mut self, agent: &BoltAgent) -> Self {
        self.extra
            .insert("bolt_agent".to_string(), Value::Map(agent.to_map()));
        self
    }
}

/// LOGON message - Authenticate (Bolt 5.1+).
#[derive(Debug, Clone, PartialEq)]
pub struct LogonMessage {
    /// Authentication token
    pub auth: AuthToken,
}

impl LogonMessage {
    /// Create a new LOGON message.
    pub fn new(auth: AuthToken) -> Self {
        Self { auth }
    }
}

/// RUN message - Execute a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    /// Cypher query string
    pub query: String,
    /// Query parameters
    pub parameters: Metadata,
    /// Extra metadata (Bolt 3+)
    pub extra: Metadata,
}

impl RunMessage {
    /// Create a new RUN message.
    pub fn new(query: &str, parameters: Metadata) -> Self {
        Self {
            query: query.to_string(),
            parameters,
            extra: HashMap::new(),
        }
    }
}

impl TransactionExtra for RunMessage {
    fn extra_mut(&mut self) -> &mut Metadata {
        &mut self.extra
    }
}

/// PULL / DISCARD message (Bolt 4.0+).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullMessage {
    /// Number of records (-1 for all)
    pub n: i64,
    /// Statement id; [`NO_STATEMENT_ID`] targets the last one
    pub qid: i64,
}

impl PullMessage {
    /// Every remaining record of the last statement.
    pub fn all() -> Self {
        Self {
            n: FETCH_ALL,
            qid: NO_STATEMENT_ID,
        }
    }

    /// Create with a batch size.
    pub fn with_n(n: i64) -> Self {
        Self {
            n,
            qid: NO_STATEMENT_ID,
        }
    }

    /// Target a specific statement.
    pub fn with_qid(mut self, qid: i64) -> Self {
        self.qid = qid;
        self
    }

    fn to_map(self) -> Metadata {
        let mut extra = HashMap::new();
        extra.insert("n".to_string(), Value::Integer(self.n));
        if self.qid != NO_STATEMENT_ID {
            extra.insert("qid".to_string(), Value::Integer(self.qid));
        }
        extra
    }
}

/// BEGIN message - Start transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeginMessage {
    /// Extra metadata
    pub extra: Metadata,
}

impl BeginMessage {
    /// Create a new BEGIN message.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionExtra for BeginMessage {
    fn extra_mut(&mut self) -> &mut Metadata {
        &mut self.extra
    }
}

/// Third field of ROUTE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Bolt 4.3: database name or null
    Database(Option<String>),
    /// Bolt 4.4+: `{db, imp_user}` map
    Extra {
        /// Database name
        database: Option<String>,
        /// Impersonated user
        impersonated_user: Option<String>,
    },
}

/// ROUTE message - Request routing information (Bolt 4.3+).
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMessage {
    /// Routing context
    pub routing: Metadata,
    /// Bookmarks
    pub bookmarks: Vec<String>,
    /// Database selection
    pub target: RouteTarget,
}

impl RouteMessage {
    /// Create a new ROUTE message.
    pub fn new(routing: Metadata, bookmarks: Vec<String>, target: RouteTarget) -> Self {
        Self {
            routing,
            bookmarks,
            target,
        }
    }

    fn fields(&self) -> Vec<Value> {
        let bookmarks = self.bookmarks.iter().cloned().map(Value::String).collect();
        let target = match &self.target {
            RouteTarget::Database(db) => Value::from(db.clone()),
            RouteTarget::Extra {
                database,
                impersonated_user,
            } => {
                let mut extra = HashMap::new();
                if let Some(db) = database {
                    extra.insert("db".to_string(), Value::String(db.clone()));
                }
                if let Some(user) = impersonated_user.as_ref().filter(|user| !user.is_empty()) {
                    extra.insert("imp_user".to_string(), Value::String(user.clone()));
                }
                Value::Map(extra)
            }
        };
        vec![Value::Map(self.routing.clone()), Value::List(bookmarks), target]
    }
}
