//! Bolt protocol response messages.
//!
//! Response messages are sent from the server to the client.

use std::collections::HashMap;
use std::fmt;

use super::tag;
use crate::bolt::error::BoltError;
use crate::bolt::packstream::{Metadata, PackStreamError, Structure, Value};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// SUCCESS - Operation completed successfully
    Success(SuccessMessage),
    /// RECORD - Query result record
    Record(Vec<Value>),
    /// FAILURE - Operation failed
    Failure(FailureMessage),
    /// IGNORED - Message was ignored (connection in FAILED state)
    Ignored,
}

impl Response {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            Response::Success(_) => tag::SUCCESS,
            Response::Record(_) => tag::RECORD,
            Response::Failure(_) => tag::FAILURE,
            Response::Ignored => tag::IGNORED,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Response::Success(_) => "SUCCESS",
            Response::Record(_) => "RECORD",
            Response::Failure(_) => "FAILURE",
            Response::Ignored => "IGNORED",
        }
    }

    /// Check if this is a record response.
    pub fn is_record(&self) -> bool {
        matches!(self, Response::Record(_))
    }

    /// Parse from an unpacked message structure.
    pub fn from_structure(s: Structure) -> Result<Self, PackStreamError> {
        match s.tag {
            tag::SUCCESS => Ok(Response::Success(SuccessMessage::from_structure(s)?)),
            tag::RECORD => {
                let mut fields = s.fields.into_iter();
                match fields.next() {
                    Some(Value::List(values)) => Ok(Response::Record(values)),
                    _ => Err(PackStreamError::InvalidStructure(
                        "RECORD requires a list of values".to_string(),
                    )),
                }
            }
            tag::FAILURE => Ok(Response::Failure(FailureMessage::from_structure(s)?)),
            tag::IGNORED => Ok(Response::Ignored),
            _ => Err(PackStreamError::InvalidStructure(format!(
                "Unknown response message tag: 0x{:02X}",
                s.tag
            ))),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Success(msg) => write!(f, "SUCCESS {}", Value::Map(msg.metadata.clone())),
            Response::Record(values) => write!(f, "RECORD {}", Value::List(values.clone())),
            Response::Failure(msg) => write!(f, "FAILURE {}", msg),
            Response::Ignored => write!(f, "IGNORED"),
        }
    }
}

/// SUCCESS message - Operation completed successfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: Metadata,
}

impl SuccessMessage {
    /// Create a SUCCESS message with metadata.
    pub fn with_metadata(metadata: Metadata) -> Self {
        Self { metadata }
    }

    /// Get metadata entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Get server agent.
    pub fn server(&self) -> Option<&str> {
        self.metadata.get("server").and_then(|v| v.as_str())
    }

    /// Get connection ID.
    pub fn connection_id(&self) -> Option<&str> {
        self.metadata.get("connection_id").and_then(|v| v.as_str())
    }

    /// Get field names from RUN success.
    pub fn fields(&self) -> Option<Vec<String>> {
        self.metadata.get("fields").and_then(Value::as_string_list)
    }

    /// Check if there are more results.
    pub fn has_more(&self) -> bool {
        self.metadata
            .get("has_more")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Get bookmark.
    pub fn bookmark(&self) -> Option<&str> {
        self.metadata.get("bookmark").and_then(|v| v.as_str())
    }

    /// Get database name.
    pub fn db(&self) -> Option<&str> {
        self.metadata.get("db").and_then(|v| v.as_str())
    }

    /// Get query ID.
    pub fn qid(&self) -> Option<i64> {
        self.metadata.get("qid").and_then(|v| v.as_int())
    }

    /// Server hints (HELLO success, Bolt 4.3+).
    pub fn hints(&self) -> Option<&HashMap<String, Value>> {
        self.metadata.get("hints").and_then(|v| v.as_map())
    }

    /// Patches the server agreed to apply (Bolt 4.3/4.4).
    pub fn patch_bolt(&self) -> Vec<String> {
        self.metadata
            .get("patch_bolt")
            .and_then(Value::as_string_list)
            .unwrap_or_default()
    }

    /// Rename the timing keys to their driver facing names:
    /// `t_first` becomes `result_available_after` and `t_last` becomes
    /// `result_consumed_after`.
    pub fn normalize(&mut self) {
        for (from, to) in [
            ("t_first", "result_available_after"),
            ("t_last", "result_consumed_after"),
        ] {
            if let Some(value) = self.metadata.remove(from) {
                self.metadata.insert(to.to_string(), value);
            }
        }
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: Structure) -> Result<Self, PackStreamError> {
        let metadata = match s.fields.into_iter().next() {
            Some(Value::Map(map)) => map,
            None => HashMap::new(),
            Some(_) => {
                return Err(PackStreamError::InvalidStructure(
                    "SUCCESS metadata must be a map".to_string(),
                ))
            }
        };
        Ok(Self { metadata })
    }
}

/// FAILURE message - Operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    /// Status code
    pub code: String,
    /// Error message
    pub message: String,
}

impl FailureMessage {
    /// Create a new FAILURE message.
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Get error classification from code (`ClientError`, `TransientError`,
    /// `DatabaseError`).
    pub fn classification(&self) -> &str {
        self.code.split('.').nth(1).unwrap_or("Unknown")
    }

    /// Get error category from code.
    pub fn category(&self) -> &str {
        self.code.split('.').nth(2).unwrap_or("Unknown")
    }

    /// Check if this is a client error.
    pub fn is_client_error(&self) -> bool {
        self.classification() == "ClientError"
    }

    /// Check if this is a transient error.
    pub fn is_transient(&self) -> bool {
        self.classification() == "TransientError"
    }

    /// Check if this is a database error.
    pub fn is_database_error(&self) -> bool {
        self.classification() == "DatabaseError"
    }

    /// Convert into the error delivered to observers.
    pub fn to_error(&self) -> BoltError {
        BoltError::Server {
            code: self.code.clone(),
            message: self.message.clone(),
        }
    }

    /// Parse from PackStream structure.
    ///
    /// Two transient codes that are not worth retrying are reported as client
    /// errors.
    pub fn from_structure(s: Structure) -> Result<Self, PackStreamError> {
        let metadata = s
            .fields
            .first()
            .and_then(|v| v.as_map())
            .ok_or_else(|| {
                PackStreamError::InvalidStructure("FAILURE requires metadata map".to_string())
            })?;

        let code = metadata
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("Neo.DatabaseError.General.UnknownError");
        let code = match code {
            "Neo.TransientError.Transaction.Terminated" => "Neo.ClientError.Transaction.Terminated",
            "Neo.TransientError.Transaction.LockClientStopped" => {
                "Neo.ClientError.Transaction.LockClientStopped"
            }
            other => other,
        };

        let message = metadata
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        Ok(Self::new(code, message))
    }
}

impl fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: &str) -> Structure {
        let mut meta = HashMap::new();
        meta.insert("code".to_string(), Value::from(code));
        meta.insert("message".to_string(), Value::from("boom"));
        Structure::new(tag::FAILURE, vec![Value::Map(meta)])
    }

    #[test]
    fn test_success_accessors() {
        let mut meta = HashMap::new();
        meta.insert("server".to_string(), Value::from("Neo4j/5.0"));
        meta.insert("has_more".to_string(), Value::Boolean(true));
        meta.insert("qid".to_string(), Value::Integer(3));
        let Response::Success(msg) =
            Response::from_structure(Structure::new(tag::SUCCESS, vec![Value::Map(meta)])).unwrap()
        else {
            panic!("expected success");
        };
        assert_eq!(msg.server(), Some("Neo4j/5.0"));
        assert!(msg.has_more());
        assert_eq!(msg.qid(), Some(3));
    }

    #[test]
    fn test_success_without_fields() {
        let response = Response::from_structure(Structure::new(tag::SUCCESS, vec![])).unwrap();
        assert_eq!(response, Response::Success(SuccessMessage::default()));
    }

    #[test]
    fn test_normalize_timings() {
        let mut msg = SuccessMessage::default();
        msg.metadata.insert("t_first".to_string(), Value::Integer(5));
        msg.metadata.insert("t_last".to_string(), Value::Integer(7));
        msg.normalize();
        assert_eq!(msg.get("result_available_after"), Some(&Value::Integer(5)));
        assert_eq!(msg.get("result_consumed_after"), Some(&Value::Integer(7)));
        assert!(msg.get("t_first").is_none());
    }

    #[test]
    fn test_record() {
        let s = Structure::new(tag::RECORD, vec![Value::List(vec![1.into()])]);
        assert_eq!(Response::from_structure(s).unwrap(), Response::Record(vec![1.into()]));

        let bad = Structure::new(tag::RECORD, vec![]);
        assert!(Response::from_structure(bad).is_err());
    }

    #[test]
    fn test_failure_classification() {
        let Response::Failure(msg) =
            Response::from_structure(failure("Neo.ClientError.Statement.SyntaxError")).unwrap()
        else {
            panic!("expected failure");
        };
        assert!(msg.is_client_error());
        assert_eq!(msg.category(), "Statement");
        assert_eq!(msg.to_string(), "Neo.ClientError.Statement.SyntaxError: boom");
    }

    #[test]
    fn test_terminated_is_not_transient() {
        let Response::Failure(msg) =
            Response::from_structure(failure("Neo.TransientError.Transaction.Terminated")).unwrap()
        else {
            panic!("expected failure");
        };
        assert_eq!(msg.code, "Neo.ClientError.Transaction.Terminated");
        assert!(!msg.is_transient());
    }

    #[test]
    fn test_unknown_tag() {
        let err = Response::from_structure(Structure::new(0x01, vec![])).unwrap_err();
        assert!(err.to_string().contains("0x01"));
    }
}
