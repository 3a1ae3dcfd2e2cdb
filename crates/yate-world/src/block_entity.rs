//! Typed side data for blocks that carry extra state.

use std::fmt;

use yate_nbt::{NbtRoot, NbtTag};

use crate::error::CodecError;

/// Block-entity action codes sent with an update.
pub mod action {
    pub const SPAWNER: u8 = 1;
    pub const COMMAND_BLOCK: u8 = 2;
    pub const BEACON: u8 = 3;
    pub const HEAD: u8 = 4;
    pub const FLOWER_POT: u8 = 5;
    pub const BANNER: u8 = 6;
}

/// What sits in a flower pot. Older servers send a numeric id, newer ones a name.
#[derive(Debug, Clone, PartialEq)]
pub enum PotItem {
    Id(i64),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockEntity {
    Spawner(NbtRoot),
    CommandBlock(NbtRoot),
    Beacon(NbtRoot),
    Head(NbtRoot),
    FlowerPot { item: PotItem, data: i64 },
    Banner(NbtRoot),
    Sign { lines: [String; 4] },
    /// An action code this side does not know.
    Generic { action: u8, nbt: NbtRoot },
}

const SIGN_LINE_KEYS: [&str; 4] = ["line_1", "line_2", "line_3", "line_4"];

impl BlockEntity {
    /// Build the variant selected by `action` from its NBT compound.
    pub fn from_action(action: u8, nbt: NbtRoot) -> Result<Self, CodecError> {
        Ok(match action {
            action::SPAWNER => Self::Spawner(nbt),
            action::COMMAND_BLOCK => Self::CommandBlock(nbt),
            action::BEACON => Self::Beacon(nbt),
            action::HEAD => Self::Head(nbt),
            action::FLOWER_POT => {
                let item = match nbt.get("Item") {
                    Some(NbtTag::String(name)) => PotItem::Name(name.clone()),
                    Some(tag) => PotItem::Id(tag.as_integer().ok_or(CodecError::MissingField("Item"))?),
                    None => return Err(CodecError::MissingField("Item")),
                };
                let data = nbt
                    .get("Data")
                    .and_then(NbtTag::as_integer)
                    .ok_or(CodecError::MissingField("Data"))?;
                Self::FlowerPot { item, data }
            }
            action::BANNER => Self::Banner(nbt),
            _ => Self::Generic { action, nbt },
        })
    }

    pub fn sign(lines: [String; 4]) -> Self {
        Self::Sign { lines }
    }

    /// A sign from a keyed record holding `line_1` through `line_4`.
    /// Other keys are ignored.
    pub fn sign_from_fields<'a>(
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, CodecError> {
        let mut lines: [Option<String>; 4] = Default::default();
        for (key, value) in fields {
            if let Some(i) = SIGN_LINE_KEYS.iter().position(|k| *k == key) {
                lines[i] = Some(value.to_string());
            }
        }
        let mut out: [String; 4] = Default::default();
        for (i, line) in lines.into_iter().enumerate() {
            out[i] = line.ok_or(CodecError::MissingField(SIGN_LINE_KEYS[i]))?;
        }
        Ok(Self::Sign { lines: out })
    }

    /// The raw compound, for variants that keep one.
    pub fn nbt(&self) -> Option<&NbtRoot> {
        match self {
            Self::Spawner(nbt)
            | Self::CommandBlock(nbt)
            | Self::Beacon(nbt)
            | Self::Head(nbt)
            | Self::Banner(nbt)
            | Self::Generic { nbt, .. } => Some(nbt),
            Self::FlowerPot { .. } | Self::Sign { .. } => None,
        }
    }
}

impl fmt::Display for BlockEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sign { lines } => write!(f, "Sign{lines:?}"),
            Self::FlowerPot { item, data } => write!(f, "FlowerPot({item:?}, {data})"),
            Self::Spawner(nbt) => write!(f, "Spawner{}", NbtTag::Compound(nbt.compound.clone())),
            Self::CommandBlock(nbt) => write!(f, "CommandBlock{}", NbtTag::Compound(nbt.compound.clone())),
            Self::Beacon(nbt) => write!(f, "Beacon{}", NbtTag::Compound(nbt.compound.clone())),
            Self::Head(nbt) => write!(f, "Head{}", NbtTag::Compound(nbt.compound.clone())),
            Self::Banner(nbt) => write!(f, "Banner{}", NbtTag::Compound(nbt.compound.clone())),
            Self::Generic { action, nbt } => {
                write!(f, "BlockEntity#{action}{}", NbtTag::Compound(nbt.compound.clone()))
            }
        }
    }
}
