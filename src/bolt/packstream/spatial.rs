//! Point structure transformers.

use super::marker::signature;
use super::transformer::{float_field, int_field, unexpected, verify_struct_size, Transformer};
use super::value::{Point, StructKind, Structure, Value};
use super::PackStreamError;

/// `Point2D` (`0x58`): srid, x, y.
#[derive(Debug, Clone, Copy, Default)]
pub struct Point2DTransformer;

impl Transformer for Point2DTransformer {
    fn signature(&self) -> u8 {
        signature::POINT_2D
    }

    fn kind(&self) -> StructKind {
        StructKind::Point2D
    }

    fn name(&self) -> &'static str {
        "Point2D"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        match value {
            Value::Point(p) if p.z.is_none() => Ok(Structure::new(
                self.signature(),
                vec![Value::Integer(p.srid), Value::Float(p.x), Value::Float(p.y)],
            )),
            other => Err(unexpected(self.name(), other)),
        }
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 3)?;
        Ok(Value::Point(Point {
            srid: int_field(self.name(), &structure, 0)?,
            x: float_field(self.name(), &structure, 1)?,
            y: float_field(self.name(), &structure, 2)?,
            z: None,
        }))
    }
}

/// `Point3D` (`0x59`): srid, x, y, z.
#[derive(Debug, Clone, Copy, Default)]
pub struct Point3DTransformer;

impl Transformer for Point3DTransformer {
    fn signature(&self) -> u8 {
        signature::POINT_3D
    }

    fn kind(&self) -> StructKind {
        StructKind::Point3D
    }

    fn name(&self) -> &'static str {
        "Point3D"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        match value {
            Value::Point(Point {
                srid,
                x,
                y,
                z: Some(z),
            }) => Ok(Structure::new(
                self.signature(),
                vec![
                    Value::Integer(*srid),
                    Value::Float(*x),
                    Value::Float(*y),
                    Value::Float(*z),
                ],
            )),
            other => Err(unexpected(self.name(), other)),
        }
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 4)?;
        Ok(Value::Point(Point {
            srid: int_field(self.name(), &structure, 0)?,
            x: float_field(self.name(), &structure, 1)?,
            y: float_field(self.name(), &structure, 2)?,
            z: Some(float_field(self.name(), &structure, 3)?),
        }))
    }
}
