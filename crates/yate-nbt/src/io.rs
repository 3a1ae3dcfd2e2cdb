//! Big-endian NBT reader and writer, as sent by the game server.

use bytes::{Buf, BufMut};

use crate::error::NbtError;
use crate::tag::{NbtCompound, NbtRoot, NbtTag};

/// Maximum nesting depth to prevent stack overflow.
const MAX_DEPTH: usize = 512;

const TAG_END: u8 = 0;
const TAG_COMPOUND: u8 = 10;

// -----------------------------------------------------------------------
// Reading
// -----------------------------------------------------------------------

pub(crate) fn read_nbt(buf: &mut impl Buf) -> Result<NbtRoot, NbtError> {
    read_optional_nbt(buf)?.ok_or(NbtError::ExpectedCompound { got: TAG_END })
}

/// A lone TAG_End in place of the root means "no data".
pub(crate) fn read_optional_nbt(buf: &mut impl Buf) -> Result<Option<NbtRoot>, NbtError> {
    ensure_remaining(buf, 1)?;
    let tag_type = buf.get_u8();
    if tag_type == TAG_END {
        return Ok(None);
    }
    if tag_type != TAG_COMPOUND {
        return Err(NbtError::ExpectedCompound { got: tag_type });
    }
    let name = read_string(buf)?;
    let compound = read_compound(buf, 0)?;
    Ok(Some(NbtRoot { name, compound }))
}

fn read_tag(buf: &mut impl Buf, tag_type: u8, depth: usize) -> Result<NbtTag, NbtError> {
    if depth > MAX_DEPTH {
        return Err(NbtError::NestingTooDeep { limit: MAX_DEPTH });
    }

    match tag_type {
        1 => {
            ensure_remaining(buf, 1)?;
            Ok(NbtTag::Byte(buf.get_i8()))
        }
        2 => {
            ensure_remaining(buf, 2)?;
            Ok(NbtTag::Short(buf.get_i16()))
        }
        3 => {
            ensure_remaining(buf, 4)?;
            Ok(NbtTag::Int(buf.get_i32()))
        }
        4 => {
            ensure_remaining(buf, 8)?;
            Ok(NbtTag::Long(buf.get_i64()))
        }
        5 => {
            ensure_remaining(buf, 4)?;
            Ok(NbtTag::Float(buf.get_f32()))
        }
        6 => {
            ensure_remaining(buf, 8)?;
            Ok(NbtTag::Double(buf.get_f64()))
        }
        7 => {
            let len = read_len(buf)?;
            ensure_remaining(buf, len)?;
            let mut arr = Vec::with_capacity(len);
            for _ in 0..len {
                arr.push(buf.get_i8());
            }
            Ok(NbtTag::ByteArray(arr))
        }
        8 => Ok(NbtTag::String(read_string(buf)?)),
        9 => {
            ensure_remaining(buf, 1)?;
            let element_type = buf.get_u8();
            let len = read_len(buf)?;
            let mut list = Vec::with_capacity(len.min(buf.remaining()));
            for _ in 0..len {
                list.push(read_tag(buf, element_type, depth + 1)?);
            }
            Ok(NbtTag::List(list))
        }
        10 => Ok(NbtTag::Compound(read_compound(buf, depth + 1)?)),
        11 => {
            let len = read_len(buf)?;
            ensure_remaining(buf, len.saturating_mul(4))?;
            let mut arr = Vec::with_capacity(len);
            for _ in 0..len {
                arr.push(buf.get_i32());
            }
            Ok(NbtTag::IntArray(arr))
        }
        12 => {
            let len = read_len(buf)?;
            ensure_remaining(buf, len.saturating_mul(8))?;
            let mut arr = Vec::with_capacity(len);
            for _ in 0..len {
                arr.push(buf.get_i64());
            }
            Ok(NbtTag::LongArray(arr))
        }
        _ => Err(NbtError::UnknownTagType(tag_type)),
    }
}

fn read_compound(buf: &mut impl Buf, depth: usize) -> Result<NbtCompound, NbtError> {
    if depth > MAX_DEPTH {
        return Err(NbtError::NestingTooDeep { limit: MAX_DEPTH });
    }
    let mut map = NbtCompound::new();
    loop {
        ensure_remaining(buf, 1)?;
        let tag_type = buf.get_u8();
        if tag_type == TAG_END {
            break;
        }
        let name = read_string(buf)?;
        let tag = read_tag(buf, tag_type, depth)?;
        map.insert(name, tag);
    }
    Ok(map)
}

fn read_len(buf: &mut impl Buf) -> Result<usize, NbtError> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_i32();
    if len < 0 {
        return Err(NbtError::NegativeLength(len));
    }
    Ok(len as usize)
}

fn read_string(buf: &mut impl Buf) -> Result<String, NbtError> {
    ensure_remaining(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure_remaining(buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| NbtError::InvalidUtf8)
}

fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), NbtError> {
    if buf.remaining() < needed {
        Err(NbtError::UnexpectedEof)
    } else {
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Writing
// -----------------------------------------------------------------------

pub(crate) fn write_nbt(buf: &mut impl BufMut, root: &NbtRoot) {
    buf.put_u8(TAG_COMPOUND);
    write_string(buf, &root.name);
    write_compound(buf, &root.compound);
}

fn write_tag(buf: &mut impl BufMut, tag: &NbtTag) {
    match tag {
        NbtTag::Byte(v) => buf.put_i8(*v),
        NbtTag::Short(v) => buf.put_i16(*v),
        NbtTag::Int(v) => buf.put_i32(*v),
        NbtTag::Long(v) => buf.put_i64(*v),
        NbtTag::Float(v) => buf.put_f32(*v),
        NbtTag::Double(v) => buf.put_f64(*v),
        NbtTag::ByteArray(arr) => {
            buf.put_i32(arr.len() as i32);
            for &b in arr {
                buf.put_i8(b);
            }
        }
        NbtTag::String(s) => write_string(buf, s),
        NbtTag::List(list) => {
            let element_type = list.first().map(NbtTag::tag_type_id).unwrap_or(TAG_END);
            buf.put_u8(element_type);
            buf.put_i32(list.len() as i32);
            for item in list {
                write_tag(buf, item);
            }
        }
        NbtTag::Compound(map) => write_compound(buf, map),
        NbtTag::IntArray(arr) => {
            buf.put_i32(arr.len() as i32);
            for &v in arr {
                buf.put_i32(v);
            }
        }
        NbtTag::LongArray(arr) => {
            buf.put_i32(arr.len() as i32);
            for &v in arr {
                buf.put_i64(v);
            }
        }
    }
}

fn write_compound(buf: &mut impl BufMut, map: &NbtCompound) {
    for (name, tag) in map {
        buf.put_u8(tag.tag_type_id());
        write_string(buf, name);
        write_tag(buf, tag);
    }
    buf.put_u8(TAG_END);
}

fn write_string(buf: &mut impl BufMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}
