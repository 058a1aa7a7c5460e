//! PackStream serialization format.
//!
//! PackStream is the binary format Bolt uses to encode values and message
//! structures. This module is the message codec of the protocol core:
//!
//! - [`Packer`] writes [`Value`]s into a byte buffer
//! - [`Unpacker`] reads them back
//! - [`TransformerRegistry`] maps structure signatures to rich value types
//!   (temporal, spatial, graph), one registry per protocol version
//! - [`CodecConfig`] bundles the registry with the numeric [`IntegerMode`];
//!   it is immutable and shared behind an `Arc`, replaced wholesale when a
//!   connection negotiates the UTC patch
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**, **Integer** (tiny to 64-bit), **Float** (64-bit)
//! - **String**, **Bytes**, **List**, **Map**
//! - **Structure**: signature byte plus up to 65535 fields

pub mod graph;
pub mod marker;
pub mod packer;
pub mod spatial;
pub mod temporal;
pub mod transformer;
pub mod unpacker;
pub mod value;

pub use packer::{pack, Packer};
pub use transformer::{CodecConfig, IntegerMode, Transformer, TransformerRegistry};
pub use unpacker::{unpack, Unpacker};
pub use value::{
    Duration, EpochBasis, Metadata, Node, OffsetTime, Path, PathSegment, Point, Relationship,
    StructKind, Structure, UnboundRelationship, Value, ZonedDateTime,
};

use std::fmt;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Unexpected end of input
    UnexpectedEof,
    /// Unknown marker byte
    UnknownMarker(u8),
    /// Invalid UTF-8 in string
    InvalidUtf8(String),
    /// Map key that is not a string
    InvalidMapKey,
    /// Collection too large to encode
    ValueTooLarge(&'static str, usize),
    /// Big integer outside the 64-bit range
    IntegerOutOfRange(i128),
    /// Structure with the wrong number of fields
    WrongStructSize {
        /// Structure name
        name: &'static str,
        /// Field count the signature requires
        expected: usize,
        /// Field count received
        actual: usize,
    },
    /// Structure with malformed field content
    InvalidStructure(String),
    /// Value that cannot be sent to the server
    NotPackable(String),
    /// Bytes left over after a complete message
    TrailingBytes(usize),
    /// Lists, maps and structures nested deeper than the decoder allows
    NestingTooDeep(usize),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => {
                write!(f, "Unknown packed value with marker 0x{:02X}", m)
            }
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(t, s) => write!(f, "{} too large: {}", t, s),
            PackStreamError::IntegerOutOfRange(i) => {
                write!(f, "Integer {} does not fit in 64 bits", i)
            }
            PackStreamError::WrongStructSize {
                name,
                expected,
                actual,
            } => write!(
                f,
                "Wrong struct size for {}, expected {} but was {}",
                name, expected, actual
            ),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            PackStreamError::NotPackable(msg) => write!(f, "{}", msg),
            PackStreamError::TrailingBytes(n) => {
                write!(f, "{} unexpected bytes after the end of a message", n)
            }
            PackStreamError::NestingTooDeep(max) => {
                write!(f, "Values nested deeper than {} levels", max)
            }
        }
    }
}

impl std::error::Error for PackStreamError {}
