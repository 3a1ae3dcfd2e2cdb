//! MessagePack values: the self-describing encoding carried in every YATE
//! datagram. Only the scalar, array and map families are supported; the
//! extension and timestamp types are rejected.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::codec::ensure_remaining;
use crate::error::ProtoError;
use crate::types::BlockPos;

/// Maximum nesting depth to prevent stack overflow.
const MAX_DEPTH: usize = 64;

/// Any MessagePack value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    /// Only produced for unsigned values above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|v| u32::try_from(v).ok())
    }

    /// Numeric value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret `[x, y, z]` as a position. Float components are floored;
    /// anything outside the `i32` range is rejected rather than clamped.
    pub fn as_block_pos(&self) -> Option<BlockPos> {
        let items = self.as_array()?;
        if items.len() != 3 {
            return None;
        }
        let coord = |v: &Value| match v {
            Value::Float(f) => float_to_i32(f.floor()),
            other => other.as_i32(),
        };
        Some(BlockPos::new(
            coord(&items[0])?,
            coord(&items[1])?,
            coord(&items[2])?,
        ))
    }
}

/// `v` as an `i32` if it is an integral value inside the `i32` range.
pub fn float_to_i32(v: f64) -> Option<i32> {
    (v.is_finite() && v.fract() == 0.0 && v >= i32::MIN as f64 && v <= i32::MAX as f64)
        .then_some(v as i32)
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BlockPos> for Value {
    fn from(pos: BlockPos) -> Self {
        Value::Array(vec![pos.x.into(), pos.y.into(), pos.z.into()])
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Bin(v) => write!(f, "<{} bytes>", v.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => write!(f, "{{{} entries}}", entries.len()),
        }
    }
}

// -----------------------------------------------------------------------
// Writing
// -----------------------------------------------------------------------

/// Encode a value using the smallest representation for each item.
pub fn write_value(buf: &mut impl BufMut, value: &Value) {
    match value {
        Value::Nil => buf.put_u8(0xC0),
        Value::Bool(false) => buf.put_u8(0xC2),
        Value::Bool(true) => buf.put_u8(0xC3),
        Value::Int(v) => write_int(buf, *v),
        Value::UInt(v) => {
            if *v <= i64::MAX as u64 {
                write_int(buf, *v as i64);
            } else {
                buf.put_u8(0xCF);
                buf.put_u64(*v);
            }
        }
        Value::Float(v) => {
            buf.put_u8(0xCB);
            buf.put_f64(*v);
        }
        Value::Str(s) => {
            let len = s.len();
            if len < 32 {
                buf.put_u8(0xA0 | len as u8);
            } else if len <= u8::MAX as usize {
                buf.put_u8(0xD9);
                buf.put_u8(len as u8);
            } else if len <= u16::MAX as usize {
                buf.put_u8(0xDA);
                buf.put_u16(len as u16);
            } else {
                buf.put_u8(0xDB);
                buf.put_u32(len as u32);
            }
            buf.put_slice(s.as_bytes());
        }
        Value::Bin(data) => {
            let len = data.len();
            if len <= u8::MAX as usize {
                buf.put_u8(0xC4);
                buf.put_u8(len as u8);
            } else if len <= u16::MAX as usize {
                buf.put_u8(0xC5);
                buf.put_u16(len as u16);
            } else {
                buf.put_u8(0xC6);
                buf.put_u32(len as u32);
            }
            buf.put_slice(data);
        }
        Value::Array(items) => {
            write_container_len(buf, items.len(), 0x90, 0xDC, 0xDD);
            for item in items {
                write_value(buf, item);
            }
        }
        Value::Map(entries) => {
            write_container_len(buf, entries.len(), 0x80, 0xDE, 0xDF);
            for (k, v) in entries {
                write_value(buf, k);
                write_value(buf, v);
            }
        }
    }
}

fn write_int(buf: &mut impl BufMut, v: i64) {
    if (0..=0x7F).contains(&v) {
        buf.put_u8(v as u8);
    } else if (-32..0).contains(&v) {
        buf.put_i8(v as i8);
    } else if v > 0 {
        if v <= u8::MAX as i64 {
            buf.put_u8(0xCC);
            buf.put_u8(v as u8);
        } else if v <= u16::MAX as i64 {
            buf.put_u8(0xCD);
            buf.put_u16(v as u16);
        } else if v <= u32::MAX as i64 {
            buf.put_u8(0xCE);
            buf.put_u32(v as u32);
        } else {
            buf.put_u8(0xCF);
            buf.put_u64(v as u64);
        }
    } else if v >= i8::MIN as i64 {
        buf.put_u8(0xD0);
        buf.put_i8(v as i8);
    } else if v >= i16::MIN as i64 {
        buf.put_u8(0xD1);
        buf.put_i16(v as i16);
    } else if v >= i32::MIN as i64 {
        buf.put_u8(0xD2);
        buf.put_i32(v as i32);
    } else {
        buf.put_u8(0xD3);
        buf.put_i64(v);
    }
}

fn write_container_len(buf: &mut impl BufMut, len: usize, fix: u8, marker16: u8, marker32: u8) {
    if len < 16 {
        buf.put_u8(fix | len as u8);
    } else if len <= u16::MAX as usize {
        buf.put_u8(marker16);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(marker32);
        buf.put_u32(len as u32);
    }
}

/// Encode a value into a fresh byte vector.
pub fn to_vec(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    write_value(&mut buf, value);
    buf
}

// -----------------------------------------------------------------------
// Reading
// -----------------------------------------------------------------------

/// Decode one value from the front of the buffer.
pub fn read_value(buf: &mut impl Buf) -> Result<Value, ProtoError> {
    read_value_at(buf, 0)
}

/// Decode exactly one value; trailing bytes are an error.
pub fn from_slice(data: &[u8]) -> Result<Value, ProtoError> {
    let mut cursor = data;
    let value = read_value(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(ProtoError::TrailingBytes(cursor.len()));
    }
    Ok(value)
}

fn read_value_at(buf: &mut impl Buf, depth: usize) -> Result<Value, ProtoError> {
    if depth > MAX_DEPTH {
        return Err(ProtoError::NestingTooDeep { limit: MAX_DEPTH });
    }
    ensure_remaining(buf, 1)?;
    let marker = buf.get_u8();
    match marker {
        0x00..=0x7F => Ok(Value::Int(marker as i64)),
        0x80..=0x8F => read_map(buf, (marker & 0x0F) as usize, depth),
        0x90..=0x9F => read_array(buf, (marker & 0x0F) as usize, depth),
        0xA0..=0xBF => read_str(buf, (marker & 0x1F) as usize),
        0xC0 => Ok(Value::Nil),
        0xC2 => Ok(Value::Bool(false)),
        0xC3 => Ok(Value::Bool(true)),
        0xC4 => {
            let len = read_len(buf, 1)?;
            read_bin(buf, len)
        }
        0xC5 => {
            let len = read_len(buf, 2)?;
            read_bin(buf, len)
        }
        0xC6 => {
            let len = read_len(buf, 4)?;
            read_bin(buf, len)
        }
        0xCA => {
            ensure_remaining(buf, 4)?;
            Ok(Value::Float(buf.get_f32() as f64))
        }
        0xCB => {
            ensure_remaining(buf, 8)?;
            Ok(Value::Float(buf.get_f64()))
        }
        0xCC => {
            ensure_remaining(buf, 1)?;
            Ok(Value::Int(buf.get_u8() as i64))
        }
        0xCD => {
            ensure_remaining(buf, 2)?;
            Ok(Value::Int(buf.get_u16() as i64))
        }
        0xCE => {
            ensure_remaining(buf, 4)?;
            Ok(Value::Int(buf.get_u32() as i64))
        }
        0xCF => {
            ensure_remaining(buf, 8)?;
            let v = buf.get_u64();
            Ok(match i64::try_from(v) {
                Ok(signed) => Value::Int(signed),
                Err(_) => Value::UInt(v),
            })
        }
        0xD0 => {
            ensure_remaining(buf, 1)?;
            Ok(Value::Int(buf.get_i8() as i64))
        }
        0xD1 => {
            ensure_remaining(buf, 2)?;
            Ok(Value::Int(buf.get_i16() as i64))
        }
        0xD2 => {
            ensure_remaining(buf, 4)?;
            Ok(Value::Int(buf.get_i32() as i64))
        }
        0xD3 => {
            ensure_remaining(buf, 8)?;
            Ok(Value::Int(buf.get_i64()))
        }
        0xD9 => {
            let len = read_len(buf, 1)?;
            read_str(buf, len)
        }
        0xDA => {
            let len = read_len(buf, 2)?;
            read_str(buf, len)
        }
        0xDB => {
            let len = read_len(buf, 4)?;
            read_str(buf, len)
        }
        0xDC => {
            let len = read_len(buf, 2)?;
            read_array(buf, len, depth)
        }
        0xDD => {
            let len = read_len(buf, 4)?;
            read_array(buf, len, depth)
        }
        0xDE => {
            let len = read_len(buf, 2)?;
            read_map(buf, len, depth)
        }
        0xDF => {
            let len = read_len(buf, 4)?;
            read_map(buf, len, depth)
        }
        0xE0..=0xFF => Ok(Value::Int((marker as i8) as i64)),
        other => Err(ProtoError::UnsupportedMarker(other)),
    }
}

fn read_len(buf: &mut impl Buf, width: usize) -> Result<usize, ProtoError> {
    ensure_remaining(buf, width)?;
    Ok(match width {
        1 => buf.get_u8() as usize,
        2 => buf.get_u16() as usize,
        _ => buf.get_u32() as usize,
    })
}

fn read_str(buf: &mut impl Buf, len: usize) -> Result<Value, ProtoError> {
    ensure_remaining(buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec())
        .map(Value::Str)
        .map_err(|_| ProtoError::InvalidUtf8)
}

fn read_bin(buf: &mut impl Buf, len: usize) -> Result<Value, ProtoError> {
    ensure_remaining(buf, len)?;
    Ok(Value::Bin(buf.copy_to_bytes(len).to_vec()))
}

fn read_array(buf: &mut impl Buf, len: usize, depth: usize) -> Result<Value, ProtoError> {
    // Every element takes at least one byte.
    ensure_remaining(buf, len)?;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(read_value_at(buf, depth + 1)?);
    }
    Ok(Value::Array(items))
}

fn read_map(buf: &mut impl Buf, len: usize, depth: usize) -> Result<Value, ProtoError> {
    ensure_remaining(buf, len.saturating_mul(2))?;
    let mut entries = Vec::with_capacity(len);
    for _ in 0..len {
        let key = read_value_at(buf, depth + 1)?;
        let value = read_value_at(buf, depth + 1)?;
        entries.push((key, value));
    }
    Ok(Value::Map(entries))
}
