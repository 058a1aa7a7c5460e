//! Bolt protocol error types.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Bolt protocol errors.
///
/// Cloneable because a fatal error is delivered to every pending observer.
#[derive(Error, Debug, Clone)]
pub enum BoltError {
    /// I/O error on the transport
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// Handshake error
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// PackStream serialization error
    #[error("{0}")]
    PackStream(#[from] PackStreamError),

    /// The caller used an operation or option the negotiated version lacks
    #[error("{0}")]
    ContractViolation(String),

    /// The server broke the protocol (unexpected message, malformed data)
    #[error("{0}")]
    Protocol(String),

    /// FAILURE reported by the server
    #[error("{message} ({code})")]
    Server {
        /// Status code, e.g. `Neo.ClientError.Statement.SyntaxError`
        code: String,
        /// Human readable message
        message: String,
    },

    /// Connection level error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Protocol version outside the supported set
    #[error("Unknown Bolt protocol version: {0}")]
    UnsupportedVersion(String),

    /// Message above the configured size limit
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Size reached
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Request skipped by the server after an earlier failure or a RESET
    #[error("Ignored either because of an error or RESET")]
    Ignored,

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,
}

impl BoltError {
    /// Protocol violation by the server.
    pub fn protocol(msg: impl Into<String>) -> Self {
        BoltError::Protocol(msg.into())
    }

    /// Operation not supported by the negotiated version.
    pub fn contract(msg: impl Into<String>) -> Self {
        BoltError::ContractViolation(msg.into())
    }

    /// Status code of this error.
    ///
    /// Server failures carry their own code; errors raised on the client map
    /// to [`BoltErrorCode::PROTOCOL_ERROR`] or
    /// [`BoltErrorCode::SERVICE_UNAVAILABLE`].
    pub fn code(&self) -> &str {
        match self {
            BoltError::Server { code, .. } => code,
            BoltError::Io(_) | BoltError::Connection(_) | BoltError::ConnectionClosed => {
                BoltErrorCode::SERVICE_UNAVAILABLE
            }
            BoltError::ContractViolation(_) => BoltErrorCode::CLIENT_ERROR,
            _ => BoltErrorCode::PROTOCOL_ERROR,
        }
    }

    /// Whether the error leaves the connection unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BoltError::Server { .. } | BoltError::ContractViolation(_) | BoltError::Ignored
        )
    }

    /// Whether retrying the work on a fresh connection may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BoltError::Server { code, .. } => code.starts_with("Neo.TransientError"),
            BoltError::Io(_) | BoltError::Connection(_) | BoltError::ConnectionClosed => true,
            _ => false,
        }
    }
}

impl From<io::Error> for BoltError {
    fn from(err: io::Error) -> Self {
        BoltError::Io(Arc::new(err))
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Server answered with the HTTP preamble
    HttpServer,

    /// The server accepted none of the proposed versions
    NoCompatibleVersion,

    /// The server picked a version that was never proposed
    UnexpectedVersion(String),

    /// Invalid handshake data (wrong size, etc.)
    InvalidData(String),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::HttpServer => write!(
                f,
                "Server responded HTTP. Make sure you are not trying to connect to the http endpoint"
            ),
            HandshakeError::NoCompatibleVersion => {
                write!(f, "The server does not support any of the protocol versions proposed")
            }
            HandshakeError::UnexpectedVersion(v) => {
                write!(f, "Server selected version {} which was not proposed", v)
            }
            HandshakeError::InvalidData(msg) => {
                write!(f, "Invalid handshake data: {}", msg)
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Status code constants.
pub struct BoltErrorCode;

impl BoltErrorCode {
    // Client side
    /// The server or the client broke the protocol
    pub const PROTOCOL_ERROR: &'static str = "ProtocolError";
    /// The connection is gone
    pub const SERVICE_UNAVAILABLE: &'static str = "ServiceUnavailable";
    /// An operation was used against a version that lacks it
    pub const CLIENT_ERROR: &'static str = "ClientError";

    // Server side
    /// Authentication failed
    pub const AUTHENTICATION_FAILED: &'static str = "Neo.ClientError.Security.AuthenticationFailed";
    /// Credentials expired; re-authentication needed
    pub const TOKEN_EXPIRED: &'static str = "Neo.ClientError.Security.TokenExpired";
    /// Authorization expired; the connection must be replaced
    pub const AUTHORIZATION_EXPIRED: &'static str =
        "Neo.ClientError.Security.AuthorizationExpired";
    /// Cypher syntax error
    pub const SYNTAX_ERROR: &'static str = "Neo.ClientError.Statement.SyntaxError";
    /// Transaction terminated by the server
    pub const TRANSACTION_TERMINATED: &'static str =
        "Neo.ClientError.Transaction.Terminated";
    /// Transaction locked client stopped
    pub const LOCK_CLIENT_STOPPED: &'static str =
        "Neo.TransientError.Transaction.LockClientStopped";
    /// Database unavailable
    pub const DATABASE_UNAVAILABLE: &'static str =
        "Neo.TransientError.General.DatabaseUnavailable";
    /// Unknown failure on the server
    pub const GENERAL_ERROR: &'static str = "Neo.DatabaseError.General.UnknownError";
}
