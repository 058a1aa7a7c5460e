//! Structure transformers and codec configuration.
//!
//! A [`Transformer`] converts between a raw [`Structure`] and a rich
//! [`Value`] variant. Protocol versions differ in which transformers they
//! register, so each connection owns a [`TransformerRegistry`] built by
//! layering version-specific transformers on top of the base set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::graph::{
    NodeTransformer, PathTransformer, RelationshipTransformer, UnboundRelationshipTransformer,
};
use super::spatial::{Point2DTransformer, Point3DTransformer};
use super::temporal::{
    DateTimeWithOffsetTransformer, DateTimeWithZoneIdTransformer, DateTransformer,
    DurationTransformer, LocalDateTimeTransformer, LocalTimeTransformer, TimeTransformer,
};
use super::value::{StructKind, Structure, Value};
use super::PackStreamError;

/// Converts one structure signature to and from a [`Value`] variant.
pub trait Transformer: fmt::Debug + Send + Sync {
    /// Signature byte written for this structure.
    fn signature(&self) -> u8;

    /// The value kind this transformer packs.
    fn kind(&self) -> StructKind;

    /// Structure name used in error messages.
    fn name(&self) -> &'static str;

    /// Convert a value into its wire structure.
    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError>;

    /// Convert a received structure into a value.
    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError>;
}

/// Check the field count of a received structure.
pub(crate) fn verify_struct_size(
    name: &'static str,
    structure: &Structure,
    expected: usize,
) -> Result<(), PackStreamError> {
    if structure.fields.len() != expected {
        return Err(PackStreamError::WrongStructSize {
            name,
            expected,
            actual: structure.fields.len(),
        });
    }
    Ok(())
}

pub(crate) fn int_field(
    name: &'static str,
    structure: &Structure,
    index: usize,
) -> Result<i64, PackStreamError> {
    structure.fields[index].as_int().ok_or_else(|| {
        PackStreamError::InvalidStructure(format!("{} field {} must be an integer", name, index))
    })
}

pub(crate) fn float_field(
    name: &'static str,
    structure: &Structure,
    index: usize,
) -> Result<f64, PackStreamError> {
    structure.fields[index].as_float().ok_or_else(|| {
        PackStreamError::InvalidStructure(format!("{} field {} must be a float", name, index))
    })
}

pub(crate) fn string_field(
    name: &'static str,
    structure: &Structure,
    index: usize,
) -> Result<String, PackStreamError> {
    structure.fields[index]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            PackStreamError::InvalidStructure(format!("{} field {} must be a string", name, index))
        })
}

pub(crate) fn unexpected(name: &'static str, value: &Value) -> PackStreamError {
    PackStreamError::InvalidStructure(format!(
        "{} transformer cannot pack {}",
        name,
        value.type_name()
    ))
}

/// Signature and kind lookup of the active transformers.
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    by_signature: HashMap<u8, Arc<dyn Transformer>>,
    by_kind: HashMap<StructKind, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    /// Empty registry: every structure stays raw.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transformers shared by every version: legacy graph structures,
    /// temporal types with local-second date times, and points.
    pub fn base() -> Self {
        Self::new()
            .with(NodeTransformer::legacy())
            .with(RelationshipTransformer::legacy())
            .with(UnboundRelationshipTransformer::legacy())
            .with(PathTransformer)
            .with(Point2DTransformer)
            .with(Point3DTransformer)
            .with(DateTransformer)
            .with(TimeTransformer)
            .with(LocalTimeTransformer)
            .with(LocalDateTimeTransformer)
            .with(DurationTransformer)
            .with(DateTimeWithOffsetTransformer::legacy())
            .with(DateTimeWithZoneIdTransformer::legacy())
    }

    /// Replace the graph transformers by the element-id aware ones (Bolt 5.0+).
    pub fn with_element_ids(self) -> Self {
        self.with(NodeTransformer::with_element_id())
            .with(RelationshipTransformer::with_element_id())
            .with(UnboundRelationshipTransformer::with_element_id())
    }

    /// Replace the date time transformers by the UTC-second ones.
    pub fn with_utc_date_times(self) -> Self {
        self.with(DateTimeWithOffsetTransformer::utc())
            .with(DateTimeWithZoneIdTransformer::utc())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.register(Arc::new(transformer));
        self
    }

    /// Register a transformer. A transformer for the same kind is replaced,
    /// and its signature stops being decoded.
    pub fn register(&mut self, transformer: Arc<dyn Transformer>) {
        if let Some(previous) = self.by_kind.insert(transformer.kind(), transformer.clone()) {
            self.by_signature.remove(&previous.signature());
        }
        self.by_signature.insert(transformer.signature(), transformer);
    }

    /// Transformer decoding `signature`.
    pub fn decoder(&self, signature: u8) -> Option<&Arc<dyn Transformer>> {
        self.by_signature.get(&signature)
    }

    /// Transformer packing values of `kind`.
    pub fn encoder(&self, kind: StructKind) -> Option<&Arc<dyn Transformer>> {
        self.by_kind.get(&kind)
    }

    /// Number of registered transformers.
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut signatures: Vec<String> = self
            .by_signature
            .iter()
            .map(|(sig, t)| format!("0x{:02X}={}", sig, t.name()))
            .collect();
        signatures.sort();
        f.debug_struct("TransformerRegistry")
            .field("signatures", &signatures)
            .finish()
    }
}

/// How integers are surfaced when unpacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegerMode {
    /// 64-bit integers, no precision loss
    #[default]
    Lossless,
    /// Convert to `f64`, losing precision above 2^53
    Float,
    /// Widen to `i128`
    BigInt,
}

/// Immutable codec configuration of one connection.
///
/// Shared behind an `Arc`; applying the UTC patch builds a new configuration
/// with [`with_utc_patch`](Self::with_utc_patch) instead of mutating this one.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    integer_mode: IntegerMode,
    transformers: TransformerRegistry,
    utc_date_times: bool,
}

impl CodecConfig {
    /// Create a configuration from its parts.
    pub fn new(integer_mode: IntegerMode, transformers: TransformerRegistry) -> Self {
        Self {
            integer_mode,
            transformers,
            utc_date_times: false,
        }
    }

    /// Configuration whose date times are encoded in UTC seconds from the start.
    pub fn utc(integer_mode: IntegerMode, transformers: TransformerRegistry) -> Self {
        Self {
            integer_mode,
            transformers: transformers.with_utc_date_times(),
            utc_date_times: true,
        }
    }

    /// Numeric mode.
    pub fn integer_mode(&self) -> IntegerMode {
        self.integer_mode
    }

    /// Active transformers.
    pub fn transformers(&self) -> &TransformerRegistry {
        &self.transformers
    }

    /// Whether date times use the UTC encodings.
    pub fn uses_utc_date_times(&self) -> bool {
        self.utc_date_times
    }

    /// A copy with a different numeric mode.
    pub fn with_integer_mode(&self, integer_mode: IntegerMode) -> Self {
        Self {
            integer_mode,
            ..self.clone()
        }
    }

    /// A copy using the UTC date time encodings.
    pub fn with_utc_patch(&self) -> Self {
        Self::utc(self.integer_mode, self.transformers.clone())
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::new(IntegerMode::default(), TransformerRegistry::base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::packstream::marker::signature;

    #[test]
    fn test_base_registry_decodes_legacy_date_times() {
        let registry = TransformerRegistry::base();
        assert!(registry.decoder(signature::DATE_TIME_WITH_OFFSET).is_some());
        assert!(registry.decoder(signature::DATE_TIME_WITH_ZONE_ID).is_some());
        assert!(registry.decoder(signature::DATE_TIME_WITH_OFFSET_UTC).is_none());
    }

    #[test]
    fn test_utc_replaces_legacy_signatures() {
        let registry = TransformerRegistry::base().with_utc_date_times();
        assert!(registry.decoder(signature::DATE_TIME_WITH_OFFSET).is_none());
        assert!(registry.decoder(signature::DATE_TIME_WITH_ZONE_ID).is_none());
        assert!(registry.decoder(signature::DATE_TIME_WITH_OFFSET_UTC).is_some());
        assert!(registry.decoder(signature::DATE_TIME_WITH_ZONE_ID_UTC).is_some());
        assert_eq!(registry.len(), TransformerRegistry::base().len());
    }

    #[test]
    fn test_with_utc_patch_leaves_original_untouched() {
        let original = CodecConfig::default();
        let patched = original.with_utc_patch();
        assert!(!original.uses_utc_date_times());
        assert!(patched.uses_utc_date_times());
        assert!(original
            .transformers()
            .decoder(signature::DATE_TIME_WITH_OFFSET)
            .is_some());
    }

    #[test]
    fn test_empty_registry_has_no_decoders() {
        let registry = TransformerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.decoder(signature::DATE).is_none());
    }
}
