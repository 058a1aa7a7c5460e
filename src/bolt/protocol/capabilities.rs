//! What each protocol version can do.

use crate::bolt::handshake::ProtocolVersion;
use crate::bolt::message::NotificationKeys;
use crate::bolt::packstream::{CodecConfig, IntegerMode, TransformerRegistry};

/// Feature set of one negotiated protocol version.
///
/// Every version shares the same [`BoltProtocol`](super::BoltProtocol); only
/// this descriptor differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCapabilities {
    /// Version described
    pub version: ProtocolVersion,
    /// Database selection in RUN/BEGIN (4.0+)
    pub database: bool,
    /// `PULL {n, qid}` instead of PULL_ALL (4.0+)
    pub reactive_pull: bool,
    /// Routing context in HELLO (4.1+)
    pub routing_context: bool,
    /// ROUTE message (4.3+)
    pub route_message: bool,
    /// ROUTE carries a `{db, imp_user}` map (4.4+)
    pub route_extra_map: bool,
    /// HELLO proposes `patch_bolt: ["utc"]` (4.3, 4.4)
    pub utc_patch: bool,
    /// Date times are encoded in UTC seconds natively (5.0+)
    pub utc_date_times: bool,
    /// Impersonated users (4.4+)
    pub impersonation: bool,
    /// Graph element ids (5.0+)
    pub element_ids: bool,
    /// LOGON/LOGOFF and credential rotation (5.1+)
    pub logon: bool,
    /// Notification filter keys, when filters are supported (5.2+)
    pub notification_filter: Option<NotificationKeys>,
    /// `bolt_agent` in HELLO (5.3+)
    pub bolt_agent: bool,
    /// TELEMETRY message (5.4+)
    pub telemetry: bool,
}

impl VersionCapabilities {
    /// Capabilities of `version`, or `None` when it is not supported.
    pub fn for_version(version: ProtocolVersion) -> Option<Self> {
        if !version.is_supported() {
            return None;
        }
        let at_least = |major: u8, minor: u8| version >= ProtocolVersion::new(major, minor);
        let notification_filter = if at_least(5, 5) {
            Some(NotificationKeys::Classifications)
        } else if at_least(5, 2) {
            Some(NotificationKeys::Categories)
        } else {
            None
        };

        Some(Self {
            version,
            database: at_least(4, 0),
            reactive_pull: at_least(4, 0),
            routing_context: at_least(4, 1),
            route_message: at_least(4, 3),
            route_extra_map: at_least(4, 4),
            utc_patch: version == ProtocolVersion::V4_3 || version == ProtocolVersion::V4_4,
            utc_date_times: at_least(5, 0),
            impersonation: at_least(4, 4),
            element_ids: at_least(5, 0),
            logon: at_least(5, 1),
            notification_filter,
            bolt_agent: at_least(5, 3),
            telemetry: at_least(5, 4),
        })
    }

    /// Initial codec configuration of a connection speaking this version.
    pub fn codec_config(&self, integer_mode: IntegerMode) -> CodecConfig {
        let mut transformers = TransformerRegistry::base();
        if self.element_ids {
            transformers = transformers.with_element_ids();
        }
        if self.utc_date_times {
            CodecConfig::utc(integer_mode, transformers)
        } else {
            CodecConfig::new(integer_mode, transformers)
        }
    }
}
