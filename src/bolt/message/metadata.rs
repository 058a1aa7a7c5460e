//! Structured metadata carried by requests and summaries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bolt::packstream::{Metadata, Value};

/// Minimum severity of the notifications the server should send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationSeverity {
    /// No notifications at all
    Off,
    /// Warnings only
    Warning,
    /// Warnings and informational notifications
    Information,
}

impl NotificationSeverity {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationSeverity::Off => "OFF",
            NotificationSeverity::Warning => "WARNING",
            NotificationSeverity::Information => "INFORMATION",
        }
    }
}

/// Which keys carry the disabled notification groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKeys {
    /// `notifications_disabled_categories` (Bolt 5.2 to 5.4)
    Categories,
    /// `notifications_disabled_classifications` (Bolt 5.5+)
    Classifications,
}

/// Notification filter (Bolt 5.2+).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilter {
    /// Minimum severity; `None` keeps the server default
    pub minimum_severity: Option<NotificationSeverity>,
    /// Categories to suppress, e.g. `HINT`, `DEPRECATION`
    pub disabled_categories: Option<Vec<String>>,
    /// GQL classifications to suppress; takes precedence over categories
    pub disabled_classifications: Option<Vec<String>>,
}

impl NotificationFilter {
    /// Filter disabling every notification.
    pub fn disabled() -> Self {
        Self {
            minimum_severity: Some(NotificationSeverity::Off),
            ..Self::default()
        }
    }

    /// Whether the filter leaves everything at the server default.
    pub fn is_empty(&self) -> bool {
        self.minimum_severity.is_none()
            && self.disabled_categories.is_none()
            && self.disabled_classifications.is_none()
    }

    /// Write the filter into an extra map.
    pub fn write_to(&self, extra: &mut Metadata, keys: NotificationKeys) {
        if let Some(severity) = self.minimum_severity {
            extra.insert(
                "notifications_minimum_severity".to_string(),
                Value::from(severity.as_str()),
            );
        }
        let disabled = self
            .disabled_classifications
            .as_ref()
            .or(self.disabled_categories.as_ref());
        if let Some(disabled) = disabled {
            let key = match keys {
                NotificationKeys::Categories => "notifications_disabled_categories",
                NotificationKeys::Classifications => "notifications_disabled_classifications",
            };
            let list = disabled.iter().cloned().map(Value::String).collect();
            extra.insert(key.to_string(), Value::List(list));
        }
    }
}

/// Routing table returned by ROUTE or the routing procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    /// Time to live in seconds
    pub ttl: i64,
    /// Database name, when the server reported it
    pub db: Option<String>,
    /// Servers
    pub servers: Vec<RoutingServer>,
}

/// Server role in routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    /// Read server
    Read,
    /// Write server
    Write,
    /// Route server (for routing queries)
    Route,
}

impl ServerRole {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Read => "READ",
            ServerRole::Write => "WRITE",
            ServerRole::Route => "ROUTE",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "READ" => Some(ServerRole::Read),
            "WRITE" => Some(ServerRole::Write),
            "ROUTE" => Some(ServerRole::Route),
            _ => None,
        }
    }
}

/// Server in routing table.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingServer {
    /// Server addresses
    pub addresses: Vec<String>,
    /// Server role
    pub role: ServerRole,
}

impl RoutingTable {
    /// Parse the `{ttl, db, servers}` map.
    ///
    /// Servers with an unknown role are skipped.
    pub fn from_map(map: &Metadata) -> Result<Self, String> {
        let ttl = map
            .get("ttl")
            .and_then(Value::as_int)
            .ok_or_else(|| "routing table without ttl".to_string())?;
        let servers = map
            .get("servers")
            .and_then(Value::as_list)
            .ok_or_else(|| "routing table without servers".to_string())?;

        let servers = servers
            .iter()
            .filter_map(Value::as_map)
            .filter_map(|server| {
                let role = server
                    .get("role")
                    .and_then(Value::as_str)
                    .and_then(ServerRole::parse)?;
                let addresses = server
                    .get("addresses")
                    .and_then(Value::as_string_list)
                    .unwrap_or_default();
                Some(RoutingServer { addresses, role })
            })
            .collect();

        Ok(Self {
            ttl,
            db: map.get("db").and_then(Value::as_str).map(str::to_string),
            servers,
        })
    }

    /// Parse a routing procedure record (`ttl`, `servers` columns).
    pub fn from_record(keys: &[String], values: &[Value]) -> Result<Self, String> {
        let map: HashMap<String, Value> = keys.iter().cloned().zip(values.iter().cloned()).collect();
        Self::from_map(&map)
    }

    /// Addresses serving `role`.
    pub fn addresses(&self, role: ServerRole) -> Vec<&str> {
        self.servers
            .iter()
            .filter(|s| s.role == role)
            .flat_map(|s| s.addresses.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(role: &str, addresses: &[&str]) -> Value {
        let mut map = HashMap::new();
        map.insert("role".to_string(), Value::from(role));
        map.insert(
            "addresses".to_string(),
            Value::List(addresses.iter().map(|a| Value::from(*a)).collect()),
        );
        Value::Map(map)
    }

    #[test]
    fn test_routing_table_from_map() {
        let mut map = HashMap::new();
        map.insert("ttl".to_string(), Value::Integer(300));
        map.insert("db".to_string(), Value::from("movies"));
        map.insert(
            "servers".to_string(),
            Value::List(vec![
                server("WRITE", &["a:7687"]),
                server("READ", &["b:7687", "c:7687"]),
                server("ROUTE", &["a:7687"]),
                server("UNKNOWN", &["d:7687"]),
            ]),
        );
        let table = RoutingTable::from_map(&map).unwrap();
        assert_eq!(table.ttl, 300);
        assert_eq!(table.db.as_deref(), Some("movies"));
        assert_eq!(table.servers.len(), 3);
        assert_eq!(table.addresses(ServerRole::Read), vec!["b:7687", "c:7687"]);
    }

    #[test]
    fn test_routing_table_requires_ttl() {
        let map = HashMap::new();
        assert!(RoutingTable::from_map(&map).is_err());
    }

    #[test]
    fn test_routing_table_from_record() {
        let keys = vec!["ttl".to_string(), "servers".to_string()];
        let values = vec![Value::Integer(10), Value::List(vec![server("write", &["x:1"])])];
        let table = RoutingTable::from_record(&keys, &values).unwrap();
        assert_eq!(table.addresses(ServerRole::Write), vec!["x:1"]);
        assert_eq!(table.db, None);
    }

    #[test]
    fn test_server_role() {
        assert_eq!(ServerRole::Read.as_str(), "READ");
        assert_eq!(ServerRole::parse("WRITE"), Some(ServerRole::Write));
        assert_eq!(ServerRole::parse("unknown"), None);
    }

    #[test]
    fn test_notification_filter_keys() {
        let filter = NotificationFilter {
            minimum_severity: Some(NotificationSeverity::Warning),
            disabled_categories: Some(vec!["HINT".into()]),
            disabled_classifications: None,
        };

        let mut legacy = HashMap::new();
        filter.write_to(&mut legacy, NotificationKeys::Categories);
        assert_eq!(
            legacy.get("notifications_minimum_severity"),
            Some(&Value::from("WARNING"))
        );
        assert!(legacy.contains_key("notifications_disabled_categories"));

        let mut gql = HashMap::new();
        filter.write_to(&mut gql, NotificationKeys::Classifications);
        assert!(gql.contains_key("notifications_disabled_classifications"));
        assert!(!gql.contains_key("notifications_disabled_categories"));
    }

    #[test]
    fn test_disabled_filter() {
        let filter = NotificationFilter::disabled();
        assert!(!filter.is_empty());
        assert!(NotificationFilter::default().is_empty());
    }
}
