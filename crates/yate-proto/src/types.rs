//! Base data types: the game's VarInt and integer voxel positions.

use std::fmt;

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum VarIntError {
    #[error("buffer too short")]
    BufferTooShort,
    #[error("VarInt is too long (more than {max_bytes} bytes)")]
    TooManyBytes { max_bytes: usize },
}

// ---------------------------------------------------------------------------
// VarInt (i32, two's complement LEB128, no ZigZag)
// ---------------------------------------------------------------------------

/// Signed variable-length integer as used by the game server.
/// Negative values always take the full five bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarInt(pub i32);

impl VarInt {
    /// Maximum bytes a VarInt can occupy.
    pub const MAX_BYTES: usize = 5;
}

impl ProtoEncode for VarInt {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        let mut value = self.0 as u32;
        loop {
            if value & !0x7F == 0 {
                buf.put_u8(value as u8);
                return;
            }
            buf.put_u8((value & 0x7F | 0x80) as u8);
            value >>= 7;
        }
    }
}

impl ProtoDecode for VarInt {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let mut result: u32 = 0;
        let mut shift: u32 = 0;
        for _ in 0..Self::MAX_BYTES {
            if !buf.has_remaining() {
                return Err(VarIntError::BufferTooShort.into());
            }
            let byte = buf.get_u8();
            result |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(VarInt(result as i32));
            }
            shift += 7;
        }
        Err(VarIntError::TooManyBytes {
            max_bytes: Self::MAX_BYTES,
        }
        .into())
    }
}

impl From<i32> for VarInt {
    fn from(v: i32) -> Self {
        VarInt(v)
    }
}

impl From<VarInt> for i32 {
    fn from(v: VarInt) -> Self {
        v.0
    }
}

impl fmt::Debug for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarInt({})", self.0)
    }
}

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read a VarInt that must be a non-negative count.
pub fn read_count(buf: &mut impl Buf) -> Result<usize, ProtoError> {
    let n = VarInt::proto_decode(buf)?.0;
    if n < 0 {
        return Err(ProtoError::InvalidData(format!("negative count {n}")));
    }
    Ok(n as usize)
}

// ---------------------------------------------------------------------------
// BlockPos
// ---------------------------------------------------------------------------

/// Integer voxel coordinates in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk coordinates `(cx, cy, cz)` containing this position.
    #[inline]
    pub fn chunk(&self) -> (i32, i32, i32) {
        (
            self.x.div_euclid(16),
            self.y.div_euclid(16),
            self.z.div_euclid(16),
        )
    }

    /// Coordinates inside the owning chunk, each in `[0, 15]`.
    #[inline]
    pub fn local(&self) -> (usize, usize, usize) {
        (
            self.x.rem_euclid(16) as usize,
            self.y.rem_euclid(16) as usize,
            self.z.rem_euclid(16) as usize,
        )
    }

    /// `None` if any axis leaves the `i32` range.
    pub fn checked_offset(&self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    pub fn to_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Anything that names a voxel. Fractional coordinates are floored, so callers
/// tracking sub-voxel positions can pass them straight through.
pub trait IntoBlockPos {
    fn into_block_pos(self) -> BlockPos;
}

impl IntoBlockPos for BlockPos {
    fn into_block_pos(self) -> BlockPos {
        self
    }
}

impl IntoBlockPos for (i32, i32, i32) {
    fn into_block_pos(self) -> BlockPos {
        BlockPos::new(self.0, self.1, self.2)
    }
}

impl IntoBlockPos for [i32; 3] {
    fn into_block_pos(self) -> BlockPos {
        BlockPos::new(self[0], self[1], self[2])
    }
}

impl IntoBlockPos for (f64, f64, f64) {
    fn into_block_pos(self) -> BlockPos {
        BlockPos::new(
            self.0.floor() as i32,
            self.1.floor() as i32,
            self.2.floor() as i32,
        )
    }
}

impl IntoBlockPos for [f64; 3] {
    fn into_block_pos(self) -> BlockPos {
        (self[0], self[1], self[2]).into_block_pos()
    }
}

impl IntoBlockPos for (f32, f32, f32) {
    fn into_block_pos(self) -> BlockPos {
        (self.0 as f64, self.1 as f64, self.2 as f64).into_block_pos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encode(v: i32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        VarInt(v).proto_encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn varint_known_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(127), vec![0x7F]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xAC, 0x02]);
        assert_eq!(encode(-1), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn varint_decode_values() {
        for v in [0, 1, 127, 128, 255, 25565, 2_097_151, i32::MAX, -1, i32::MIN] {
            let bytes = encode(v);
            let decoded = VarInt::proto_decode(&mut &bytes[..]).unwrap();
            assert_eq!(decoded.0, v);
        }
    }

    #[test]
    fn varint_truncated() {
        let err = VarInt::proto_decode(&mut &[0x80u8, 0x80][..]).unwrap_err();
        assert!(matches!(err, ProtoError::VarInt(VarIntError::BufferTooShort)));
    }

    #[test]
    fn varint_too_long() {
        let bytes = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x01];
        let err = VarInt::proto_decode(&mut &bytes[..]).unwrap_err();
        assert!(matches!(
            err,
            ProtoError::VarInt(VarIntError::TooManyBytes { max_bytes: 5 })
        ));
    }

    #[test]
    fn negative_count_rejected() {
        let bytes = encode(-3);
        assert!(read_count(&mut &bytes[..]).is_err());
    }

    #[test]
    fn chunk_and_local_floor_negatives() {
        let pos = BlockPos::new(-1, 17, -16);
        assert_eq!(pos.chunk(), (-1, 1, -1));
        assert_eq!(pos.local(), (15, 1, 0));
    }

    #[test]
    fn fractional_positions_floor() {
        assert_eq!((1.9, -0.1, 15.999).into_block_pos(), BlockPos::new(1, -1, 15));
        assert_eq!([-2.5, 64.0, 0.5].into_block_pos(), BlockPos::new(-3, 64, 0));
        assert_eq!((3.5f32, 4.0f32, -4.5f32).into_block_pos(), BlockPos::new(3, 4, -5));
    }

    #[test]
    fn offset_stops_at_i32_range() {
        let pos = BlockPos::new(i32::MAX - 1, 0, i32::MIN);
        assert_eq!(pos.checked_offset(1, 5, 0), Some(BlockPos::new(i32::MAX, 5, i32::MIN)));
        assert_eq!(pos.checked_offset(2, 0, 0), None);
        assert_eq!(pos.checked_offset(0, 0, -1), None);
    }
}
