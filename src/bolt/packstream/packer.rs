//! PackStream packer.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use super::marker::*;
use super::transformer::CodecConfig;
use super::value::{Structure, Value};
use super::PackStreamError;

/// Writes values into a byte buffer using the transformers of a
/// [`CodecConfig`].
pub struct Packer<'a> {
    buf: &'a mut BytesMut,
    config: &'a CodecConfig,
}

impl<'a> Packer<'a> {
    /// Create a packer appending to `buf`.
    pub fn new(buf: &'a mut BytesMut, config: &'a CodecConfig) -> Self {
        Self { buf, config }
    }

    /// Pack a message structure. The outer structure is never routed through
    /// a transformer: message signatures share byte values with value
    /// structures (ROUTE and zoned date times are both `0x66`).
    pub fn pack_message(&mut self, signature: u8, fields: &[Value]) -> Result<(), PackStreamError> {
        self.pack_struct(signature, fields)
    }

    /// Pack a single value.
    pub fn pack(&mut self, value: &Value) -> Result<(), PackStreamError> {
        match value {
            Value::Null => {
                self.buf.put_u8(NULL);
                Ok(())
            }
            Value::Boolean(b) => {
                self.buf.put_u8(if *b { TRUE } else { FALSE });
                Ok(())
            }
            Value::Integer(i) => {
                self.pack_int(*i);
                Ok(())
            }
            Value::BigInteger(i) => {
                let narrowed =
                    i64::try_from(*i).map_err(|_| PackStreamError::IntegerOutOfRange(*i))?;
                self.pack_int(narrowed);
                Ok(())
            }
            Value::Float(f) => {
                self.buf.put_u8(FLOAT_64);
                self.buf.put_f64(*f);
                Ok(())
            }
            Value::Bytes(b) => self.pack_bytes(b),
            Value::String(s) => self.pack_string(s),
            Value::List(items) => self.pack_list(items),
            Value::Map(map) => self.pack_map(map),
            Value::Structure(s) => self.pack_struct(s.tag, &s.fields),
            other => self.pack_transformed(other),
        }
    }

    fn pack_transformed(&mut self, value: &Value) -> Result<(), PackStreamError> {
        let transformer = value
            .struct_kind()
            .and_then(|kind| self.config.transformers().encoder(kind))
            .ok_or_else(|| {
                PackStreamError::NotPackable(format!(
                    "Unable to pack the given value: {}",
                    value.type_name()
                ))
            })?;
        let Structure { tag, fields } = transformer.to_structure(value)?;
        self.pack_struct(tag, &fields)
    }

    /// Pack an integer using the smallest representation.
    pub fn pack_int(&mut self, value: i64) {
        if is_tiny_int(value) {
            self.buf.put_i8(value as i8);
        } else if let Ok(v) = i8::try_from(value) {
            self.buf.put_u8(INT_8);
            self.buf.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.buf.put_u8(INT_16);
            self.buf.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.buf.put_u8(INT_32);
            self.buf.put_i32(v);
        } else {
            self.buf.put_u8(INT_64);
            self.buf.put_i64(value);
        }
    }

    fn pack_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        let len = value.len();
        if len <= u8::MAX as usize {
            self.buf.put_u8(BYTES_8);
            self.buf.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.put_u8(BYTES_16);
            self.buf.put_u16(len as u16);
        } else if len <= i32::MAX as usize {
            self.buf.put_u8(BYTES_32);
            self.buf.put_u32(len as u32);
        } else {
            return Err(PackStreamError::ValueTooLarge("Byte array", len));
        }
        self.buf.put_slice(value);
        Ok(())
    }

    fn pack_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        let bytes = value.as_bytes();
        self.pack_header(
            bytes.len(),
            TINY_STRING,
            [STRING_8, STRING_16, STRING_32],
            "String",
        )?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    fn pack_list(&mut self, items: &[Value]) -> Result<(), PackStreamError> {
        self.pack_header(items.len(), TINY_LIST, [LIST_8, LIST_16, LIST_32], "List")?;
        for item in items {
            self.pack(item)?;
        }
        Ok(())
    }

    fn pack_map(&mut self, map: &HashMap<String, Value>) -> Result<(), PackStreamError> {
        self.pack_header(map.len(), TINY_MAP, [MAP_8, MAP_16, MAP_32], "Map")?;
        for (key, value) in map {
            self.pack_string(key)?;
            self.pack(value)?;
        }
        Ok(())
    }

    fn pack_struct(&mut self, tag: u8, fields: &[Value]) -> Result<(), PackStreamError> {
        let len = fields.len();
        if len <= TINY_MAX {
            self.buf.put_u8(TINY_STRUCT | len as u8);
        } else if len <= u8::MAX as usize {
            self.buf.put_u8(STRUCT_8);
            self.buf.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.put_u8(STRUCT_16);
            self.buf.put_u16(len as u16);
        } else {
            return Err(PackStreamError::ValueTooLarge("Structure", len));
        }
        self.buf.put_u8(tag);
        for field in fields {
            self.pack(field)?;
        }
        Ok(())
    }

    fn pack_header(
        &mut self,
        len: usize,
        tiny: u8,
        sized: [u8; 3],
        what: &'static str,
    ) -> Result<(), PackStreamError> {
        if len <= TINY_MAX {
            self.buf.put_u8(tiny | len as u8);
        } else if len <= u8::MAX as usize {
            self.buf.put_u8(sized[0]);
            self.buf.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.put_u8(sized[1]);
            self.buf.put_u16(len as u16);
        } else if len <= i32::MAX as usize {
            self.buf.put_u8(sized[2]);
            self.buf.put_u32(len as u32);
        } else {
            return Err(PackStreamError::ValueTooLarge(what, len));
        }
        Ok(())
    }
}

/// Pack a single value into a fresh buffer.
pub fn pack(value: &Value, config: &CodecConfig) -> Result<BytesMut, PackStreamError> {
    let mut buf = BytesMut::with_capacity(64);
    Packer::new(&mut buf, config).pack(value)?;
    Ok(buf)
}
