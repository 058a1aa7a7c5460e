//! Per-connection protocol settings.

use serde::{Deserialize, Serialize};

use crate::bolt::chunking::{CHUNK_SIZE_LIMIT, MAX_CHUNK_SIZE, MAX_MESSAGE_SIZE};
use crate::bolt::packstream::IntegerMode;

// ============================================================================
// ProtocolConfig
// ============================================================================

/// Settings of one protocol instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// How integers are surfaced when unpacking
    pub integer_mode: IntegerMode,
    /// Largest outgoing chunk
    pub max_chunk_size: usize,
    /// Largest accepted incoming message
    pub max_message_size: usize,
    /// Send RESET automatically after a FAILURE
    pub reset_on_failure: bool,
    /// Never send TELEMETRY, even when the server asks for it
    pub telemetry_disabled: bool,
    /// Label recorded on every log line of the connection
    pub connection_label: Option<String>,
}

impl ProtocolConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a builder.
    pub fn builder() -> ProtocolConfigBuilder {
        ProtocolConfigBuilder::default()
    }

    /// Label used in log output.
    pub fn log_id(&self) -> &str {
        self.connection_label.as_deref().unwrap_or("bolt")
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            integer_mode: IntegerMode::default(),
            max_chunk_size: MAX_CHUNK_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            reset_on_failure: true,
            telemetry_disabled: false,
            connection_label: None,
        }
    }
}

// ============================================================================
// ProtocolConfigBuilder
// ============================================================================

/// Builder for [`ProtocolConfig`].
#[derive(Debug, Default)]
pub struct ProtocolConfigBuilder {
    config: ProtocolConfig,
}

impl ProtocolConfigBuilder {
    /// Set the integer mode.
    pub fn with_integer_mode(mut self, mode: IntegerMode) -> Self {
        self.config.integer_mode = mode;
        self
    }

    /// Set the outgoing chunk size, clamped to `1..=65535`.
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.config.max_chunk_size = size.clamp(1, CHUNK_SIZE_LIMIT);
        self
    }

    /// Set the incoming message limit.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Enable or disable the automatic RESET after a FAILURE.
    pub fn with_reset_on_failure(mut self, reset: bool) -> Self {
        self.config.reset_on_failure = reset;
        self
    }

    /// Disable TELEMETRY.
    pub fn with_telemetry_disabled(mut self, disabled: bool) -> Self {
        self.config.telemetry_disabled = disabled;
        self
    }

    /// Set the log label.
    pub fn with_connection_label(mut self, label: impl Into<String>) -> Self {
        self.config.connection_label = Some(label.into());
        self
    }

    /// Build
    pub fn build(self) -> ProtocolConfig {
        self.config
    }
}
