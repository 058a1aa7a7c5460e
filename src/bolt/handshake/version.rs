//! Bolt protocol version definitions.

use std::fmt;

/// Bolt protocol version.
///
/// On the wire a version is a 4-byte big-endian integer laid out as
/// `[reserved, range, minor, major]`, so 4.3 is `00 00 03 04`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl ProtocolVersion {
    /// Bolt 3 (Neo4j 3.5)
    pub const V3_0: Self = Self::new(3, 0);
    /// Bolt 4.0 (Neo4j 4.0): databases, reactive PULL
    pub const V4_0: Self = Self::new(4, 0);
    /// Bolt 4.1: routing context in HELLO
    pub const V4_1: Self = Self::new(4, 1);
    /// Bolt 4.2
    pub const V4_2: Self = Self::new(4, 2);
    /// Bolt 4.3: ROUTE message, UTC patch
    pub const V4_3: Self = Self::new(4, 3);
    /// Bolt 4.4: impersonation
    pub const V4_4: Self = Self::new(4, 4);
    /// Bolt 5.0: element ids, UTC date times
    pub const V5_0: Self = Self::new(5, 0);
    /// Bolt 5.1: LOGON/LOGOFF
    pub const V5_1: Self = Self::new(5, 1);
    /// Bolt 5.2: notification filters
    pub const V5_2: Self = Self::new(5, 2);
    /// Bolt 5.3: bolt agent
    pub const V5_3: Self = Self::new(5, 3);
    /// Bolt 5.4: TELEMETRY
    pub const V5_4: Self = Self::new(5, 4);
    /// Bolt 5.5: GQL notification classifications
    pub const V5_5: Self = Self::new(5, 5);

    /// All supported versions in order of preference (newest first).
    pub const ALL: [ProtocolVersion; 12] = [
        Self::V5_5,
        Self::V5_4,
        Self::V5_3,
        Self::V5_2,
        Self::V5_1,
        Self::V5_0,
        Self::V4_4,
        Self::V4_3,
        Self::V4_2,
        Self::V4_1,
        Self::V4_0,
        Self::V3_0,
    ];

    /// Create a version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether this crate can speak the version.
    pub fn is_supported(self) -> bool {
        Self::ALL.contains(&self)
    }

    /// Encode with a minor range: the proposal covers `minor - range ..= minor`.
    pub fn encode_with_range(self, range: u8) -> u32 {
        (range as u32) << 16 | (self.minor as u32) << 8 | self.major as u32
    }

    /// Encode without a range.
    pub fn as_u32(self) -> u32 {
        self.encode_with_range(0)
    }

    /// Decode a version answered by the server; the range byte is ignored.
    pub fn from_u32(value: u32) -> Self {
        Self::new((value & 0xFF) as u8, ((value >> 8) & 0xFF) as u8)
    }

    /// Convert to big-endian bytes.
    pub fn to_bytes(self) -> [u8; 4] {
        self.as_u32().to_be_bytes()
    }

    /// Parse from big-endian bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::from_u32(u32::from_be_bytes(bytes))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
