//! Chunk data structures for the proxy-side world.

use bytes::{Buf, BufMut};
use yate_proto::codec::ensure_remaining;
use yate_proto::ProtoError;

/// Cells in one 16x16x16 chunk.
pub const CHUNK_CELLS: usize = 16 * 16 * 16;

/// Bytes in one 4-bit light plane.
pub const NIBBLE_BYTES: usize = CHUNK_CELLS / 2;

/// Cell index in YZX order: `(y*16 + z)*16 + x`.
#[inline]
pub fn cell_index(x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < 16 && y < 16 && z < 16);
    (y * 16 + z) * 16 + x
}

/// Combine a 12-bit block id and 4-bit aux value.
#[inline]
pub fn join_block(id: u16, aux: u8) -> u16 {
    (id << 4) | (aux & 0x0F) as u16
}

/// Split a packed block value into `(id, aux)`.
#[inline]
pub fn split_block(packed: u16) -> (u16, u8) {
    (packed >> 4, (packed & 0x0F) as u8)
}

/// A 16x16x16 chunk: one packed block value per cell plus block-light and
/// sky-light nibble planes.
pub struct Chunk {
    blocks: Box<[u16; CHUNK_CELLS]>,
    block_light: NibblePlane,
    sky_light: NibblePlane,
}

impl Default for Chunk {
    fn default() -> Self {
        Self {
            blocks: Box::new([0; CHUNK_CELLS]),
            block_light: NibblePlane::default(),
            sky_light: NibblePlane::default(),
        }
    }
}

impl Chunk {
    /// Packed block value (`id << 4 | aux`) at local coordinates.
    pub fn block(&self, x: usize, y: usize, z: usize) -> u16 {
        self.blocks[cell_index(x, y, z)]
    }

    /// Store a packed block value and return the previous one.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, packed: u16) -> u16 {
        std::mem::replace(&mut self.blocks[cell_index(x, y, z)], packed)
    }

    pub fn block_light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.block_light.get(cell_index(x, y, z))
    }

    pub fn set_block_light(&mut self, x: usize, y: usize, z: usize, level: u8) {
        self.block_light.set(cell_index(x, y, z), level);
    }

    pub fn sky_light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.sky_light.get(cell_index(x, y, z))
    }

    pub fn set_sky_light(&mut self, x: usize, y: usize, z: usize, level: u8) {
        self.sky_light.set(cell_index(x, y, z), level);
    }

    pub fn blocks(&self) -> &[u16; CHUNK_CELLS] {
        &self.blocks
    }

    pub(crate) fn replace_blocks(&mut self, blocks: Box<[u16; CHUNK_CELLS]>) {
        self.blocks = blocks;
    }

    pub(crate) fn replace_block_light(&mut self, plane: NibblePlane) {
        self.block_light = plane;
    }

    pub(crate) fn replace_sky_light(&mut self, plane: NibblePlane) {
        self.sky_light = plane;
    }

    /// Write the fixed-width representation: 2 bytes per cell, big-endian.
    pub fn pack_blocks(&self, buf: &mut impl BufMut) {
        for &packed in self.blocks.iter() {
            buf.put_u16(packed);
        }
    }

    /// Read blocks written by [`pack_blocks`](Self::pack_blocks). Light is
    /// left untouched.
    pub fn unpack_blocks(&mut self, buf: &mut impl Buf) -> Result<(), ProtoError> {
        ensure_remaining(buf, CHUNK_CELLS * 2)?;
        for packed in self.blocks.iter_mut() {
            *packed = buf.get_u16();
        }
        Ok(())
    }
}

/// 4096 four-bit values packed two per byte. The even cell of a pair is the
/// low nibble.
#[derive(Clone)]
pub struct NibblePlane(Box<[u8; NIBBLE_BYTES]>);

impl Default for NibblePlane {
    fn default() -> Self {
        Self(Box::new([0; NIBBLE_BYTES]))
    }
}

impl NibblePlane {
    pub(crate) fn read(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ensure_remaining(buf, NIBBLE_BYTES)?;
        let mut plane = Self::default();
        buf.copy_to_slice(&mut plane.0[..]);
        Ok(plane)
    }

    #[inline]
    pub fn get(&self, index: usize) -> u8 {
        let byte = self.0[index >> 1];
        if index & 1 == 0 {
            byte & 0x0F
        } else {
            byte >> 4
        }
    }

    /// Store the low 4 bits of `value`.
    #[inline]
    pub fn set(&mut self, index: usize, value: u8) {
        let byte = &mut self.0[index >> 1];
        let value = value & 0x0F;
        *byte = if index & 1 == 0 {
            (*byte & 0xF0) | value
        } else {
            (*byte & 0x0F) | (value << 4)
        };
    }

    pub fn as_bytes(&self) -> &[u8; NIBBLE_BYTES] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn yzx_ordering() {
        assert_eq!(cell_index(0, 0, 0), 0);
        assert_eq!(cell_index(1, 0, 0), 1);
        assert_eq!(cell_index(0, 0, 1), 16);
        assert_eq!(cell_index(0, 1, 0), 256);
        assert_eq!(cell_index(15, 15, 15), 4095);
    }

    #[test]
    fn join_split() {
        assert_eq!(join_block(1, 0), 0x10);
        assert_eq!(join_block(4095, 15), 0xFFFF);
        assert_eq!(join_block(3, 0x1F), 0x3F);
        assert_eq!(split_block(0x0123), (0x12, 3));
    }

    #[test]
    fn set_returns_previous() {
        let mut chunk = Chunk::default();
        assert_eq!(chunk.set_block(1, 2, 3, join_block(5, 1)), 0);
        assert_eq!(chunk.set_block(1, 2, 3, join_block(6, 2)), join_block(5, 1));
        assert_eq!(split_block(chunk.block(1, 2, 3)), (6, 2));
        assert_eq!(chunk.block(3, 2, 1), 0);
    }

    #[test]
    fn nibble_pairs() {
        let mut plane = NibblePlane::default();
        plane.set(0, 0x3);
        plane.set(1, 0xA);
        assert_eq!(plane.as_bytes()[0], 0xA3);
        assert_eq!(plane.get(0), 0x3);
        assert_eq!(plane.get(1), 0xA);
        plane.set(0, 0xFF);
        assert_eq!(plane.get(0), 0xF);
        assert_eq!(plane.get(1), 0xA);
    }

    #[test]
    fn light_channels_independent() {
        let mut chunk = Chunk::default();
        chunk.set_block_light(4, 4, 4, 12);
        chunk.set_sky_light(4, 4, 4, 7);
        chunk.set_block_light(5, 4, 4, 0x1F);
        assert_eq!(chunk.block_light(4, 4, 4), 12);
        assert_eq!(chunk.sky_light(4, 4, 4), 7);
        assert_eq!(chunk.block_light(5, 4, 4), 0xF);
        assert_eq!(chunk.sky_light(5, 4, 4), 0);
    }

    #[test]
    fn fixed_width_roundtrip() {
        let mut chunk = Chunk::default();
        for i in 0..CHUNK_CELLS {
            let (x, z, y) = (i % 16, (i / 16) % 16, i / 256);
            chunk.set_block(x, y, z, join_block((i % 4096) as u16, (i % 16) as u8));
        }
        let mut buf = BytesMut::new();
        chunk.pack_blocks(&mut buf);
        assert_eq!(buf.len(), CHUNK_CELLS * 2);
        // cell 1 = id 1, aux 1 = 0x0011, big-endian
        assert_eq!(&buf[2..4], &[0x00, 0x11]);

        let mut decoded = Chunk::default();
        decoded.unpack_blocks(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.blocks(), chunk.blocks());
    }

    #[test]
    fn fixed_width_truncated() {
        let mut chunk = Chunk::default();
        assert!(chunk.unpack_blocks(&mut &[0u8; 100][..]).is_err());
    }
}
