//! Graph structure transformers.
//!
//! Graph values are only ever received. Packing one fails with a
//! [`PackStreamError::NotPackable`] naming the offending value.

use std::collections::HashMap;

use super::marker::signature;
use super::transformer::{int_field, string_field, verify_struct_size, Transformer};
use super::value::{
    Node, Path, PathSegment, Relationship, StructKind, Structure, UnboundRelationship, Value,
};
use super::PackStreamError;

fn not_packable(what: &str, value: &Value) -> PackStreamError {
    PackStreamError::NotPackable(format!(
        "It is not allowed to pass {} in query parameters, given: {}",
        what, value
    ))
}

fn map_field(
    name: &'static str,
    structure: &Structure,
    index: usize,
) -> Result<HashMap<String, Value>, PackStreamError> {
    match &structure.fields[index] {
        Value::Map(map) => Ok(map.clone()),
        _ => Err(PackStreamError::InvalidStructure(format!(
            "{} field {} must be a map",
            name, index
        ))),
    }
}

fn optional_string_field(structure: &Structure, index: usize) -> Option<String> {
    structure.fields[index].as_str().map(str::to_string)
}

/// `Node` (`0x4E`): 3 fields, 4 with element ids.
#[derive(Debug, Clone, Copy)]
pub struct NodeTransformer {
    element_id: bool,
}

impl NodeTransformer {
    /// `[id, labels, properties]`
    pub fn legacy() -> Self {
        Self { element_id: false }
    }

    /// `[id, labels, properties, element_id]`
    pub fn with_element_id() -> Self {
        Self { element_id: true }
    }
}

impl Transformer for NodeTransformer {
    fn signature(&self) -> u8 {
        signature::NODE
    }

    fn kind(&self) -> StructKind {
        StructKind::Node
    }

    fn name(&self) -> &'static str {
        "Node"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        Err(not_packable("nodes", value))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, if self.element_id { 4 } else { 3 })?;
        let labels = structure.fields[1].as_string_list().ok_or_else(|| {
            PackStreamError::InvalidStructure("Node labels must be a list".to_string())
        })?;
        Ok(Value::Node(Node {
            id: int_field(self.name(), &structure, 0)?,
            labels,
            properties: map_field(self.name(), &structure, 2)?,
            element_id: if self.element_id {
                optional_string_field(&structure, 3)
            } else {
                None
            },
        }))
    }
}

/// `Relationship` (`0x52`): 5 fields, 8 with element ids.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipTransformer {
    element_id: bool,
}

impl RelationshipTransformer {
    /// `[id, start, end, type, properties]`
    pub fn legacy() -> Self {
        Self { element_id: false }
    }

    /// Legacy fields followed by `element_id`, `start_node_element_id` and
    /// `end_node_element_id`.
    pub fn with_element_id() -> Self {
        Self { element_id: true }
    }
}

impl Transformer for RelationshipTransformer {
    fn signature(&self) -> u8 {
        signature::RELATIONSHIP
    }

    fn kind(&self) -> StructKind {
        StructKind::Relationship
    }

    fn name(&self) -> &'static str {
        "Relationship"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        Err(not_packable("relationships", value))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, if self.element_id { 8 } else { 5 })?;
        let (element_id, start_node_element_id, end_node_element_id) = if self.element_id {
            (
                optional_string_field(&structure, 5),
                optional_string_field(&structure, 6),
                optional_string_field(&structure, 7),
            )
        } else {
            (None, None, None)
        };
        Ok(Value::Relationship(Relationship {
            id: int_field(self.name(), &structure, 0)?,
            start_node_id: int_field(self.name(), &structure, 1)?,
            end_node_id: int_field(self.name(), &structure, 2)?,
            rel_type: string_field(self.name(), &structure, 3)?,
            properties: map_field(self.name(), &structure, 4)?,
            element_id,
            start_node_element_id,
            end_node_element_id,
        }))
    }
}

/// `UnboundRelationship` (`0x72`): 3 fields, 4 with element ids.
#[derive(Debug, Clone, Copy)]
pub struct UnboundRelationshipTransformer {
    element_id: bool,
}

impl UnboundRelationshipTransformer {
    /// `[id, type, properties]`
    pub fn legacy() -> Self {
        Self { element_id: false }
    }

    /// `[id, type, properties, element_id]`
    pub fn with_element_id() -> Self {
        Self { element_id: true }
    }
}

impl Transformer for UnboundRelationshipTransformer {
    fn signature(&self) -> u8 {
        signature::UNBOUND_RELATIONSHIP
    }

    fn kind(&self) -> StructKind {
        StructKind::UnboundRelationship
    }

    fn name(&self) -> &'static str {
        "UnboundRelationship"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        Err(not_packable("relationships", value))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, if self.element_id { 4 } else { 3 })?;
        Ok(Value::UnboundRelationship(UnboundRelationship {
            id: int_field(self.name(), &structure, 0)?,
            rel_type: string_field(self.name(), &structure, 1)?,
            properties: map_field(self.name(), &structure, 2)?,
            element_id: if self.element_id {
                optional_string_field(&structure, 3)
            } else {
                None
            },
        }))
    }
}

/// `Path` (`0x50`): distinct nodes, distinct unbound relationships, and
/// the index sequence walking them.
///
/// The sequence alternates relationship and node indices. A positive
/// relationship index `i` traverses `rels[i - 1]` forwards; a negative one
/// traverses `rels[-i - 1]` against its stored direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathTransformer;

impl PathTransformer {
    fn invalid(detail: impl Into<String>) -> PackStreamError {
        PackStreamError::InvalidStructure(format!("Path: {}", detail.into()))
    }
}

impl Transformer for PathTransformer {
    fn signature(&self) -> u8 {
        signature::PATH
    }

    fn kind(&self) -> StructKind {
        StructKind::Path
    }

    fn name(&self) -> &'static str {
        "Path"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        Err(not_packable("paths", value))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 3)?;
        let mut fields = structure.fields.into_iter();
        let (Some(Value::List(nodes)), Some(Value::List(rels)), Some(Value::List(sequence))) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(Self::invalid("fields must be lists"));
        };

        let nodes = nodes
            .into_iter()
            .map(|n| match n {
                Value::Node(node) => Ok(node),
                other => Err(Self::invalid(format!("expected a node, got {}", other.type_name()))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rels = rels
            .into_iter()
            .map(|r| match r {
                Value::UnboundRelationship(rel) => Ok(rel),
                other => Err(Self::invalid(format!(
                    "expected an unbound relationship, got {}",
                    other.type_name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if sequence.len() % 2 != 0 {
            return Err(Self::invalid("index sequence must have even length"));
        }

        let start = nodes
            .first()
            .cloned()
            .ok_or_else(|| Self::invalid("path without nodes"))?;
        let mut prev = start.clone();
        let mut segments = Vec::with_capacity(sequence.len() / 2);

        for pair in sequence.chunks(2) {
            let rel_index = pair[0]
                .as_int()
                .ok_or_else(|| Self::invalid("relationship index must be an integer"))?;
            let next = pair[1]
                .as_int()
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| nodes.get(i))
                .cloned()
                .ok_or_else(|| Self::invalid("node index out of range"))?;

            let bound = match rel_index {
                i if i > 0 => rels.get((i - 1) as usize).map(|rel| rel.bind(&prev, &next)),
                i if i < 0 => rels.get((-i - 1) as usize).map(|rel| rel.bind(&next, &prev)),
                _ => None,
            };
            let relationship = bound.ok_or_else(|| {
                Self::invalid(format!("relationship index {} out of range", rel_index))
            })?;

            segments.push(PathSegment {
                start: prev,
                relationship,
                end: next.clone(),
            });
            prev = next;
        }

        Ok(Value::Path(Path {
            start,
            end: prev,
            segments,
        }))
    }
}
