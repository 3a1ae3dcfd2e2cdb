//! NBT tag types.

use std::collections::BTreeMap;
use std::fmt;

/// A compound tag: map of name -> tag, iterated in name order.
pub type NbtCompound = BTreeMap<String, NbtTag>;

/// A named root compound (the root always has a name, often empty string).
#[derive(Debug, Clone, PartialEq)]
pub struct NbtRoot {
    pub name: String,
    pub compound: NbtCompound,
}

impl NbtRoot {
    pub fn new(name: impl Into<String>, compound: NbtCompound) -> Self {
        Self {
            name: name.into(),
            compound,
        }
    }

    pub fn get(&self, key: &str) -> Option<&NbtTag> {
        self.compound.get(key)
    }
}

/// Represents any NBT value.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtTag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<NbtTag>),
    Compound(NbtCompound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl NbtTag {
    /// Returns the numeric tag type ID (1-12).
    pub fn tag_type_id(&self) -> u8 {
        match self {
            NbtTag::Byte(_) => 1,
            NbtTag::Short(_) => 2,
            NbtTag::Int(_) => 3,
            NbtTag::Long(_) => 4,
            NbtTag::Float(_) => 5,
            NbtTag::Double(_) => 6,
            NbtTag::ByteArray(_) => 7,
            NbtTag::String(_) => 8,
            NbtTag::List(_) => 9,
            NbtTag::Compound(_) => 10,
            NbtTag::IntArray(_) => 11,
            NbtTag::LongArray(_) => 12,
        }
    }

    /// Any integer tag widened to i64. The server is loose about which
    /// integer width it uses for the same field across versions.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            NbtTag::Byte(v) => Some(*v as i64),
            NbtTag::Short(v) => Some(*v as i64),
            NbtTag::Int(v) => Some(*v as i64),
            NbtTag::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            NbtTag::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&NbtCompound> {
        match self {
            NbtTag::Compound(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[NbtTag]> {
        match self {
            NbtTag::List(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for NbtTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NbtTag::Byte(v) => write!(f, "{v}b"),
            NbtTag::Short(v) => write!(f, "{v}s"),
            NbtTag::Int(v) => write!(f, "{v}"),
            NbtTag::Long(v) => write!(f, "{v}L"),
            NbtTag::Float(v) => write!(f, "{v}f"),
            NbtTag::Double(v) => write!(f, "{v}d"),
            NbtTag::ByteArray(v) => write!(f, "[B; {} elements]", v.len()),
            NbtTag::String(v) => write!(f, "\"{v}\""),
            NbtTag::List(v) => write!(f, "[{} elements]", v.len()),
            NbtTag::Compound(v) => {
                write!(f, "{{")?;
                for (i, (k, tag)) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}:{tag}")?;
                }
                write!(f, "}}")
            }
            NbtTag::IntArray(v) => write!(f, "[I; {} elements]", v.len()),
            NbtTag::LongArray(v) => write!(f, "[L; {} elements]", v.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widening() {
        assert_eq!(NbtTag::Byte(-2).as_integer(), Some(-2));
        assert_eq!(NbtTag::Short(300).as_integer(), Some(300));
        assert_eq!(NbtTag::Long(1 << 40).as_integer(), Some(1 << 40));
        assert_eq!(NbtTag::Float(1.0).as_integer(), None);
    }

    #[test]
    fn compound_display_is_ordered() {
        let mut c = NbtCompound::new();
        c.insert("b".into(), NbtTag::Int(2));
        c.insert("a".into(), NbtTag::String("x".into()));
        assert_eq!(NbtTag::Compound(c).to_string(), "{a:\"x\",b:2}");
    }
}
