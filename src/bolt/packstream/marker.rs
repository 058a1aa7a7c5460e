//! PackStream marker bytes and structure signatures.
//!
//! Every packed value starts with a marker byte. Small strings, lists, maps
//! and structures carry their size in the low nibble of the marker.

/// Null marker
pub const NULL: u8 = 0xC0;
/// 64-bit IEEE 754 float marker
pub const FLOAT_64: u8 = 0xC1;
/// Boolean false
pub const FALSE: u8 = 0xC2;
/// Boolean true
pub const TRUE: u8 = 0xC3;

/// Integer markers. Values in `-16..=127` are packed inline.
pub const INT_8: u8 = 0xC8;
/// 16-bit integer marker
pub const INT_16: u8 = 0xC9;
/// 32-bit integer marker
pub const INT_32: u8 = 0xCA;
/// 64-bit integer marker
pub const INT_64: u8 = 0xCB;

/// Byte array markers
pub const BYTES_8: u8 = 0xCC;
/// Byte array with 16-bit length
pub const BYTES_16: u8 = 0xCD;
/// Byte array with 32-bit length
pub const BYTES_32: u8 = 0xCE;

/// Tiny string base (0x80-0x8F)
pub const TINY_STRING: u8 = 0x80;
/// String with 8-bit length
pub const STRING_8: u8 = 0xD0;
/// String with 16-bit length
pub const STRING_16: u8 = 0xD1;
/// String with 32-bit length
pub const STRING_32: u8 = 0xD2;

/// Tiny list base (0x90-0x9F)
pub const TINY_LIST: u8 = 0x90;
/// List with 8-bit size
pub const LIST_8: u8 = 0xD4;
/// List with 16-bit size
pub const LIST_16: u8 = 0xD5;
/// List with 32-bit size
pub const LIST_32: u8 = 0xD6;

/// Tiny map base (0xA0-0xAF)
pub const TINY_MAP: u8 = 0xA0;
/// Map with 8-bit size
pub const MAP_8: u8 = 0xD8;
/// Map with 16-bit size
pub const MAP_16: u8 = 0xD9;
/// Map with 32-bit size
pub const MAP_32: u8 = 0xDA;

/// Tiny structure base (0xB0-0xBF)
pub const TINY_STRUCT: u8 = 0xB0;
/// Structure with 8-bit field count
pub const STRUCT_8: u8 = 0xDC;
/// Structure with 16-bit field count
pub const STRUCT_16: u8 = 0xDD;

/// Largest size that fits in a tiny marker nibble.
pub const TINY_MAX: usize = 0x0F;

/// Structure signatures for the value types carried inside records and
/// parameters.
pub mod signature {
    /// Node
    pub const NODE: u8 = 0x4E;
    /// Relationship
    pub const RELATIONSHIP: u8 = 0x52;
    /// Relationship inside a path
    pub const UNBOUND_RELATIONSHIP: u8 = 0x72;
    /// Path
    pub const PATH: u8 = 0x50;

    /// Date: days since epoch
    pub const DATE: u8 = 0x44;
    /// Time with offset
    pub const TIME: u8 = 0x54;
    /// Local time
    pub const LOCAL_TIME: u8 = 0x74;
    /// Date time with offset, seconds counted in local time
    pub const DATE_TIME_WITH_OFFSET: u8 = 0x46;
    /// Date time with zone id, seconds counted in local time
    pub const DATE_TIME_WITH_ZONE_ID: u8 = 0x66;
    /// Date time with offset, seconds counted in UTC
    pub const DATE_TIME_WITH_OFFSET_UTC: u8 = 0x49;
    /// Date time with zone id, seconds counted in UTC
    pub const DATE_TIME_WITH_ZONE_ID_UTC: u8 = 0x69;
    /// Local date time
    pub const LOCAL_DATE_TIME: u8 = 0x64;
    /// Duration
    pub const DURATION: u8 = 0x45;

    /// Two dimensional point
    pub const POINT_2D: u8 = 0x58;
    /// Three dimensional point
    pub const POINT_3D: u8 = 0x59;
}

/// Check whether `value` can be packed into the marker byte itself.
#[inline]
pub fn is_tiny_int(value: i64) -> bool {
    (-16..=127).contains(&value)
}

/// Split a marker into its high nibble and the tiny size it carries.
#[inline]
pub fn split_tiny(marker: u8) -> (u8, usize) {
    (marker & 0xF0, (marker & 0x0F) as usize)
}
