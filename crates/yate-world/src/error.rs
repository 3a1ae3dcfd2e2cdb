//! Chunk payload decode errors.

use thiserror::Error;
use yate_nbt::NbtError;
use yate_proto::ProtoError;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed chunk payload: {0}")]
    Proto(#[from] ProtoError),

    #[error("primary bitmap 0x{bitmap:08X} names a section above 15")]
    SectionOutOfRange { bitmap: u32 },

    #[error("unsupported bits-per-block: {0}")]
    BitsPerBlock(u8),

    #[error("word stream too short: {bits} bits per block needs {needed} words, got {got}")]
    WordStreamTooShort { bits: u32, needed: usize, got: usize },

    #[error("palette index {index} out of range (palette has {len} entries)")]
    PaletteIndex { index: u64, len: usize },

    #[error("palette entry {0} does not fit a block value")]
    PaletteEntry(i32),

    #[error("malformed block entity NBT: {0}")]
    Nbt(#[from] NbtError),

    #[error("block entity is missing field {0:?}")]
    MissingField(&'static str),
}
