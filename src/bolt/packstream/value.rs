//! Values carried by Bolt messages.
//!
//! [`Value`] is what the [`Packer`](super::Packer) accepts and what the
//! [`Unpacker`](super::Unpacker) produces. Structures known to the active
//! [`TransformerRegistry`](super::TransformerRegistry) are surfaced as rich
//! variants (temporal, spatial, graph); unknown ones stay [`Value::Structure`].

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Metadata map attached to requests and summaries.
pub type Metadata = HashMap<String, Value>;

/// A value that can travel over the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// Integer surfaced in big-integer mode
    BigInteger(i128),
    /// 64-bit float
    Float(f64),
    /// Byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// List
    List(Vec<Value>),
    /// Map with string keys
    Map(HashMap<String, Value>),
    /// Graph node
    Node(Node),
    /// Graph relationship
    Relationship(Relationship),
    /// Relationship as found inside a path
    UnboundRelationship(UnboundRelationship),
    /// Graph path
    Path(Path),
    /// Spatial point
    Point(Point),
    /// Date
    Date(NaiveDate),
    /// Time with UTC offset
    Time(OffsetTime),
    /// Local time
    LocalTime(NaiveTime),
    /// Date time with a fixed offset
    DateTime(DateTime<FixedOffset>),
    /// Date time with a named zone
    ZonedDateTime(ZonedDateTime),
    /// Local date time
    LocalDateTime(NaiveDateTime),
    /// Temporal amount
    Duration(Duration),
    /// Structure with no registered transformer
    Structure(Structure),
}

/// Structure kinds that have a transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    /// [`Node`]
    Node,
    /// [`Relationship`]
    Relationship,
    /// [`UnboundRelationship`]
    UnboundRelationship,
    /// [`Path`]
    Path,
    /// Point without `z`
    Point2D,
    /// Point with `z`
    Point3D,
    /// [`NaiveDate`]
    Date,
    /// [`OffsetTime`]
    Time,
    /// [`NaiveTime`]
    LocalTime,
    /// `DateTime<FixedOffset>`
    DateTimeWithOffset,
    /// [`ZonedDateTime`]
    DateTimeWithZoneId,
    /// [`NaiveDateTime`]
    LocalDateTime,
    /// [`Duration`]
    Duration,
}

/// A raw structure: signature byte plus fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Structure {
    /// Signature byte
    pub tag: u8,
    /// Fields in wire order
    pub fields: Vec<Value>,
}

impl Structure {
    /// Create a structure.
    pub fn new(tag: u8, fields: Vec<Value>) -> Self {
        Self { tag, fields }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the structure has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Graph node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Legacy numeric id
    pub id: i64,
    /// Labels
    pub labels: Vec<String>,
    /// Properties
    pub properties: HashMap<String, Value>,
    /// Element id (Bolt 5.0+)
    pub element_id: Option<String>,
}

/// Graph relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    /// Legacy numeric id
    pub id: i64,
    /// Start node id
    pub start_node_id: i64,
    /// End node id
    pub end_node_id: i64,
    /// Relationship type
    pub rel_type: String,
    /// Properties
    pub properties: HashMap<String, Value>,
    /// Element id (Bolt 5.0+)
    pub element_id: Option<String>,
    /// Start node element id (Bolt 5.0+)
    pub start_node_element_id: Option<String>,
    /// End node element id (Bolt 5.0+)
    pub end_node_element_id: Option<String>,
}

/// Relationship without its end points, as sent inside a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnboundRelationship {
    /// Legacy numeric id
    pub id: i64,
    /// Relationship type
    pub rel_type: String,
    /// Properties
    pub properties: HashMap<String, Value>,
    /// Element id (Bolt 5.0+)
    pub element_id: Option<String>,
}

impl UnboundRelationship {
    /// Attach end points, producing a full relationship.
    pub fn bind(&self, start: &Node, end: &Node) -> Relationship {
        Relationship {
            id: self.id,
            start_node_id: start.id,
            end_node_id: end.id,
            rel_type: self.rel_type.clone(),
            properties: self.properties.clone(),
            element_id: self.element_id.clone(),
            start_node_element_id: start.element_id.clone(),
            end_node_element_id: end.element_id.clone(),
        }
    }
}

/// One hop of a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSegment {
    /// Node the hop leaves from
    pub start: Node,
    /// Relationship traversed, bound in its stored direction
    pub relationship: Relationship,
    /// Node the hop arrives at
    pub end: Node,
}

/// Graph path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    /// First node
    pub start: Node,
    /// Last node
    pub end: Node,
    /// Hops in traversal order
    pub segments: Vec<PathSegment>,
}

/// Spatial point; `z` is present for 3D points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    /// Spatial reference system id
    pub srid: i64,
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: Option<f64>,
}

/// Time of day with a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OffsetTime {
    /// Local time of day
    pub time: NaiveTime,
    /// Offset from UTC in seconds
    pub offset_seconds: i32,
}

/// Date time in a named zone.
///
/// Without a zone database the crate cannot move between local and UTC
/// seconds, so the value records which of the two `seconds` counts. Legacy
/// encodings (Bolt < 5.0 without the UTC patch) count local seconds; the UTC
/// encodings count UTC seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZonedDateTime {
    /// Seconds since the epoch, local or UTC according to `basis`
    pub seconds: i64,
    /// Nanoseconds within the second
    pub nanoseconds: u32,
    /// IANA zone id
    pub zone_id: String,
    /// What `seconds` counts
    pub basis: EpochBasis,
}

/// What the seconds of a [`ZonedDateTime`] are counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EpochBasis {
    /// Wall-clock seconds in the zone
    Local,
    /// Seconds since the UTC epoch
    Utc,
}

/// Temporal amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Duration {
    /// Months
    pub months: i64,
    /// Days
    pub days: i64,
    /// Seconds
    pub seconds: i64,
    /// Nanoseconds
    pub nanoseconds: i64,
}

impl Duration {
    /// Create a duration.
    pub fn new(months: i64, days: i64, seconds: i64, nanoseconds: i64) -> Self {
        Self {
            months,
            days,
            seconds,
            nanoseconds,
        }
    }
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean content.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content regardless of the numeric mode it was decoded in.
    ///
    /// Floats are accepted when they hold an integral value, so structures
    /// decoded in float mode can still be read.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::BigInteger(i) => i64::try_from(*i).ok(),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Float content; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            Value::BigInteger(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String content.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// List content.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Map content.
    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Raw structure content.
    pub fn as_structure(&self) -> Option<&Structure> {
        match self {
            Value::Structure(s) => Some(s),
            _ => None,
        }
    }

    /// List of strings, skipping non-string items.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_list().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }

    /// The transformer kind that packs this value, if any.
    pub fn struct_kind(&self) -> Option<StructKind> {
        match self {
            Value::Node(_) => Some(StructKind::Node),
            Value::Relationship(_) => Some(StructKind::Relationship),
            Value::UnboundRelationship(_) => Some(StructKind::UnboundRelationship),
            Value::Path(_) => Some(StructKind::Path),
            Value::Point(p) if p.z.is_some() => Some(StructKind::Point3D),
            Value::Point(_) => Some(StructKind::Point2D),
            Value::Date(_) => Some(StructKind::Date),
            Value::Time(_) => Some(StructKind::Time),
            Value::LocalTime(_) => Some(StructKind::LocalTime),
            Value::DateTime(_) => Some(StructKind::DateTimeWithOffset),
            Value::ZonedDateTime(_) => Some(StructKind::DateTimeWithZoneId),
            Value::LocalDateTime(_) => Some(StructKind::LocalDateTime),
            Value::Duration(_) => Some(StructKind::Duration),
            _ => None,
        }
    }

    /// Type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::BigInteger(_) => "BigInteger",
            Value::Float(_) => "Float",
            Value::Bytes(_) => "Bytes",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::UnboundRelationship(_) => "UnboundRelationship",
            Value::Path(_) => "Path",
            Value::Point(_) => "Point",
            Value::Date(_) => "Date",
            Value::Time(_) => "Time",
            Value::LocalTime(_) => "LocalTime",
            Value::DateTime(_) => "DateTime",
            Value::ZonedDateTime(_) => "ZonedDateTime",
            Value::LocalDateTime(_) => "LocalDateTime",
            Value::Duration(_) => "Duration",
            Value::Structure(_) => "Structure",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::BigInteger(i) => write!(f, "{}n", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bytes(b) => write!(f, "#[{} bytes]", b.len()),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                // Sorted so log lines are stable.
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, map[key])?;
                }
                write!(f, "}}")
            }
            Value::Date(d) => write!(f, "{}", d),
            Value::LocalTime(t) => write!(f, "{}", t),
            Value::Time(t) => write!(f, "{}{:+}s", t.time, t.offset_seconds),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::LocalDateTime(dt) => write!(f, "{}", dt),
            Value::ZonedDateTime(z) => write!(f, "{}s[{}]", z.seconds, z.zone_id),
            Value::Duration(d) => write!(
                f,
                "P{}M{}DT{}.{:09}S",
                d.months, d.days, d.seconds, d.nanoseconds
            ),
            Value::Point(p) => match p.z {
                Some(z) => write!(f, "Point{{srid={}, x={}, y={}, z={}}}", p.srid, p.x, p.y, z),
                None => write!(f, "Point{{srid={}, x={}, y={}}}", p.srid, p.x, p.y),
            },
            Value::Node(n) => write!(f, "({}:{})", n.id, n.labels.join(":")),
            Value::Relationship(r) => {
                write!(f, "({})-[{}:{}]->({})", r.start_node_id, r.id, r.rel_type, r.end_node_id)
            }
            Value::UnboundRelationship(r) => write!(f, "-[{}:{}]-", r.id, r.rel_type),
            Value::Path(p) => write!(f, "<path of {} segments>", p.segments.len()),
            Value::Structure(s) => write!(f, "Structure(0x{:02X}, {} fields)", s.tag, s.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Point> for Value {
    fn from(v: Point) -> Self {
        Value::Point(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<Structure> for Value {
    fn from(v: Structure) -> Self {
        Value::Structure(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
