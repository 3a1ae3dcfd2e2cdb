//! NBT (Named Binary Tag) for the game's block-entity payloads.
//!
//! Big-endian throughout: ints are i32_be, string lengths are u16_be, array
//! and list lengths are i32_be.

pub mod error;
mod io;
pub mod tag;

pub use error::NbtError;
pub use tag::{NbtCompound, NbtRoot, NbtTag};

use bytes::{Buf, BufMut};

/// Read a root compound.
pub fn read_nbt(buf: &mut impl Buf) -> Result<NbtRoot, NbtError> {
    io::read_nbt(buf)
}

/// Read a root compound, or `None` if the server sent a bare TAG_End.
pub fn read_optional_nbt(buf: &mut impl Buf) -> Result<Option<NbtRoot>, NbtError> {
    io::read_optional_nbt(buf)
}

/// Write a root compound.
pub fn write_nbt(buf: &mut impl BufMut, root: &NbtRoot) {
    io::write_nbt(buf, root)
}
