//! PackStream unpacker.

use bytes::Buf;
use std::collections::HashMap;

use super::marker::*;
use super::transformer::{CodecConfig, IntegerMode};
use super::value::{Structure, Value};
use super::PackStreamError;

/// Deepest nesting of lists, maps and structures accepted when decoding.
pub const MAX_DEPTH: usize = 128;

/// Reads values from a byte slice, applying the numeric mode and structure
/// transformers of a [`CodecConfig`].
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    config: &'a CodecConfig,
}

impl<'a> Unpacker<'a> {
    /// Create an unpacker over `data`.
    pub fn new(data: &'a [u8], config: &'a CodecConfig) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            config,
        }
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Read a complete message: one outer structure whose signature is not
    /// passed to any transformer, followed by nothing.
    pub fn unpack_message(&mut self) -> Result<Structure, PackStreamError> {
        let marker = self.read_u8()?;
        let size = match split_tiny(marker) {
            (TINY_STRUCT, size) => size,
            _ if marker == STRUCT_8 => self.read_u8()? as usize,
            _ if marker == STRUCT_16 => self.read_u16()? as usize,
            _ => {
                return Err(PackStreamError::InvalidStructure(format!(
                    "expected a message structure, found marker 0x{:02X}",
                    marker
                )))
            }
        };
        let structure = self.read_struct(size)?;
        if self.remaining() > 0 {
            return Err(PackStreamError::TrailingBytes(self.remaining()));
        }
        Ok(structure)
    }

    /// Read the next value.
    pub fn unpack(&mut self) -> Result<Value, PackStreamError> {
        let marker = self.read_u8()?;

        // Tiny ints cover 0x00-0x7F and 0xF0-0xFF.
        if marker <= 0x7F || marker >= 0xF0 {
            return Ok(self.integer(marker as i8 as i64));
        }

        match split_tiny(marker) {
            (TINY_STRING, len) => return self.read_string(len),
            (TINY_LIST, len) => return self.read_list(len),
            (TINY_MAP, len) => return self.read_map(len),
            (TINY_STRUCT, len) => return self.read_transformed(len),
            _ => {}
        }

        match marker {
            NULL => Ok(Value::Null),
            TRUE => Ok(Value::Boolean(true)),
            FALSE => Ok(Value::Boolean(false)),
            FLOAT_64 => Ok(Value::Float(self.read_f64()?)),

            INT_8 => {
                let v = self.read_u8()? as i8 as i64;
                Ok(self.integer(v))
            }
            INT_16 => {
                let v = self.read_i16()? as i64;
                Ok(self.integer(v))
            }
            INT_32 => {
                let v = self.read_i32()? as i64;
                Ok(self.integer(v))
            }
            INT_64 => {
                let v = self.read_i64()?;
                Ok(self.integer(v))
            }

            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.read_size(marker - BYTES_8)?;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.read_size(marker - STRING_8)?;
                self.read_string(len)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.read_size(marker - LIST_8)?;
                self.read_list(len)
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.read_size(marker - MAP_8)?;
                self.read_map(len)
            }
            STRUCT_8 => {
                let len = self.read_u8()? as usize;
                self.read_transformed(len)
            }
            STRUCT_16 => {
                let len = self.read_u16()? as usize;
                self.read_transformed(len)
            }

            _ => Err(PackStreamError::UnknownMarker(marker)),
        }
    }

    fn integer(&self, value: i64) -> Value {
        match self.config.integer_mode() {
            IntegerMode::Lossless => Value::Integer(value),
            IntegerMode::Float => Value::Float(value as f64),
            IntegerMode::BigInt => Value::BigInteger(value as i128),
        }
    }

    /// Read an 8, 16 or 32-bit size; `width` is 0, 1 or 2 respectively.
    fn read_size(&mut self, width: u8) -> Result<usize, PackStreamError> {
        match width {
            0 => Ok(self.read_u8()? as usize),
            1 => Ok(self.read_u16()? as usize),
            _ => Ok(self.read_u32()? as usize),
        }
    }

    fn read_string(&mut self, len: usize) -> Result<Value, PackStreamError> {
        let bytes = self.read_bytes(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(Value::String(s.to_string()))
    }

    /// Run `read` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, PackStreamError>,
    ) -> Result<T, PackStreamError> {
        if self.depth >= MAX_DEPTH {
            return Err(PackStreamError::NestingTooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn read_list(&mut self, len: usize) -> Result<Value, PackStreamError> {
        self.nested(|this| {
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(this.unpack()?);
            }
            Ok(Value::List(items))
        })
    }

    fn read_map(&mut self, len: usize) -> Result<Value, PackStreamError> {
        self.nested(|this| {
            let mut map = HashMap::with_capacity(len.min(1024));
            for _ in 0..len {
                let key = match this.unpack()? {
                    Value::String(s) => s,
                    _ => return Err(PackStreamError::InvalidMapKey),
                };
                let value = this.unpack()?;
                map.insert(key, value);
            }
            Ok(Value::Map(map))
        })
    }

    fn read_struct(&mut self, size: usize) -> Result<Structure, PackStreamError> {
        self.nested(|this| {
            let tag = this.read_u8()?;
            let mut fields = Vec::with_capacity(size.min(64));
            for _ in 0..size {
                fields.push(this.unpack()?);
            }
            Ok(Structure::new(tag, fields))
        })
    }

    fn read_transformed(&mut self, size: usize) -> Result<Value, PackStreamError> {
        let structure = self.read_struct(size)?;
        match self.config.transformers().decoder(structure.tag) {
            Some(transformer) => transformer.from_structure(structure),
            None => Ok(Value::Structure(structure)),
        }
    }

    fn ensure(&self, n: usize) -> Result<(), PackStreamError> {
        if self.remaining() < n {
            Err(PackStreamError::UnexpectedEof)
        } else {
            Ok(())
        }
    }

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        self.ensure(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn read_u16(&mut self) -> Result<u16, PackStreamError> {
        self.ensure(2)?;
        let value = (&self.data[self.pos..]).get_u16();
        self.pos += 2;
        Ok(value)
    }

    fn read_i16(&mut self) -> Result<i16, PackStreamError> {
        self.ensure(2)?;
        let value = (&self.data[self.pos..]).get_i16();
        self.pos += 2;
        Ok(value)
    }

    fn read_u32(&mut self) -> Result<u32, PackStreamError> {
        self.ensure(4)?;
        let value = (&self.data[self.pos..]).get_u32();
        self.pos += 4;
        Ok(value)
    }

    fn read_i32(&mut self) -> Result<i32, PackStreamError> {
        self.ensure(4)?;
        let value = (&self.data[self.pos..]).get_i32();
        self.pos += 4;
        Ok(value)
    }

    fn read_i64(&mut self) -> Result<i64, PackStreamError> {
        self.ensure(8)?;
        let value = (&self.data[self.pos..]).get_i64();
        self.pos += 8;
        Ok(value)
    }

    fn read_f64(&mut self) -> Result<f64, PackStreamError> {
        self.ensure(8)?;
        let value = (&self.data[self.pos..]).get_f64();
        self.pos += 8;
        Ok(value)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        self.ensure(len)?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Unpack a single value from `data`.
pub fn unpack(data: &[u8], config: &CodecConfig) -> Result<Value, PackStreamError> {
    Unpacker::new(data, config).unpack()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(data: &[u8]) -> Value {
        unpack(data, &CodecConfig::default()).unwrap()
    }

    #[test]
    fn test_unpack_tiny_ints() {
        assert_eq!(decoded(&[0x00]), Value::Integer(0));
        assert_eq!(decoded(&[0x7F]), Value::Integer(127));
        assert_eq!(decoded(&[0xF0]), Value::Integer(-16));
        assert_eq!(decoded(&[0xFF]), Value::Integer(-1));
    }

    #[test]
    fn test_unpack_sized_ints() {
        assert_eq!(decoded(&[0xC8, 0x80]), Value::Integer(-128));
        assert_eq!(decoded(&[0xC9, 0x03, 0xE8]), Value::Integer(1000));
        assert_eq!(decoded(&[0xCA, 0x00, 0x01, 0x86, 0xA0]), Value::Integer(100_000));
        assert_eq!(
            decoded(&[0xCB, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
            Value::Integer(i64::MAX)
        );
    }

    #[test]
    fn test_integer_modes() {
        let float = CodecConfig::default().with_integer_mode(IntegerMode::Float);
        assert_eq!(unpack(&[0xC9, 0x03, 0xE8], &float).unwrap(), Value::Float(1000.0));

        let big = CodecConfig::default().with_integer_mode(IntegerMode::BigInt);
        assert_eq!(unpack(&[0x05], &big).unwrap(), Value::BigInteger(5));
    }

    #[test]
    fn test_unpack_strings_and_bytes() {
        assert_eq!(decoded(&[0x80]), Value::String(String::new()));
        assert_eq!(decoded(&[0x82, b'h', b'i']), Value::from("hi"));
        assert_eq!(decoded(&[0xCC, 0x02, 9, 8]), Value::Bytes(vec![9, 8]));
    }

    #[test]
    fn test_unpack_map() {
        let value = decoded(&[0xA1, 0x81, b'a', 0x01]);
        assert_eq!(value.as_map().unwrap().get("a"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_unpack_unknown_marker() {
        let err = unpack(&[0xE0], &CodecConfig::default()).unwrap_err();
        assert_eq!(err, PackStreamError::UnknownMarker(0xE0));
        assert!(err.to_string().contains("0xE0"));
    }

    #[test]
    fn test_unpack_eof_and_utf8() {
        let config = CodecConfig::default();
        assert_eq!(unpack(&[0xC9], &config).unwrap_err(), PackStreamError::UnexpectedEof);
        assert!(matches!(
            unpack(&[0x82, 0xFF, 0xFE], &config).unwrap_err(),
            PackStreamError::InvalidUtf8(_)
        ));
    }

    #[test]
    fn test_unpack_non_string_map_key() {
        let err = unpack(&[0xA1, 0x01, 0x01], &CodecConfig::default()).unwrap_err();
        assert_eq!(err, PackStreamError::InvalidMapKey);
    }

    #[test]
    fn test_unpack_message_ignores_transformers() {
        // 0x44 is the Date signature, but as an outer message it stays raw.
        let config = CodecConfig::default();
        let message = Unpacker::new(&[0xB1, 0x44, 0x01], &config)
            .unpack_message()
            .unwrap();
        assert_eq!(message.tag, 0x44);
        assert_eq!(message.fields, vec![Value::Integer(1)]);
    }

    #[test]
    fn test_unpack_message_rejects_trailing_bytes() {
        let config = CodecConfig::default();
        let err = Unpacker::new(&[0xB0, 0x70, 0xC0], &config)
            .unpack_message()
            .unwrap_err();
        assert_eq!(err, PackStreamError::TrailingBytes(1));
    }

    #[test]
    fn test_unpack_rejects_deep_nesting() {
        let config = CodecConfig::default();

        let mut data = vec![0x91; MAX_DEPTH];
        data.push(0x01);
        let mut value = unpack(&data, &config).unwrap();
        for _ in 0..MAX_DEPTH {
            value = match value {
                Value::List(mut items) => items.remove(0),
                other => panic!("expected a list, got {other:?}"),
            };
        }
        assert_eq!(value, Value::Integer(1));

        let mut data = vec![0x91; 1_000_000];
        data.push(0x01);
        assert_eq!(
            unpack(&data, &config).unwrap_err(),
            PackStreamError::NestingTooDeep(MAX_DEPTH)
        );

        // Maps and structures count towards the same limit.
        let mut data = Vec::new();
        for _ in 0..MAX_DEPTH {
            data.extend_from_slice(&[0xA1, 0x81, b'k', 0xB1, 0x00]);
        }
        data.push(0xC0);
        assert!(matches!(
            unpack(&data, &config).unwrap_err(),
            PackStreamError::NestingTooDeep(_)
        ));
    }

    #[test]
    fn test_struct_size_is_verified() {
        // Date with two fields
        let err = unpack(&[0xB2, 0x44, 0x01, 0x02], &CodecConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "Wrong struct size for Date, expected 1 but was 2");
    }
}
