//! Protocol encoding/decoding traits and helpers.

use bytes::{Buf, BufMut};

use crate::error::ProtoError;

/// Encode a value onto a buffer.
pub trait ProtoEncode {
    fn proto_encode(&self, buf: &mut impl BufMut);
}

/// Decode a value from a buffer.
pub trait ProtoDecode: Sized {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError>;
}

/// Fail with `BufferTooShort` unless `needed` bytes are left.
pub fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), ProtoError> {
    if buf.remaining() < needed {
        return Err(ProtoError::BufferTooShort {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Read `count` big-endian 64-bit words.
pub fn read_u64_be_words(buf: &mut impl Buf, count: usize) -> Result<Vec<u64>, ProtoError> {
    let needed = count.checked_mul(8).ok_or(ProtoError::BufferTooShort {
        needed: usize::MAX,
        remaining: buf.remaining(),
    })?;
    ensure_remaining(buf, needed)?;
    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        words.push(buf.get_u64());
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn words_roundtrip() {
        let mut buf = BytesMut::new();
        buf.put_u64(0x0123_4567_89AB_CDEF);
        buf.put_u64(u64::MAX);
        let words = read_u64_be_words(&mut buf.freeze(), 2).unwrap();
        assert_eq!(words, vec![0x0123_4567_89AB_CDEF, u64::MAX]);
    }

    #[test]
    fn words_truncated() {
        let mut buf = BytesMut::new();
        buf.put_u64(1);
        buf.put_u32(2);
        let err = read_u64_be_words(&mut buf.freeze(), 2).unwrap_err();
        assert!(matches!(
            err,
            ProtoError::BufferTooShort {
                needed: 16,
                remaining: 12
            }
        ));
    }

    #[test]
    fn absurd_word_count_is_rejected() {
        let err = read_u64_be_words(&mut &[0u8; 4][..], usize::MAX).unwrap_err();
        assert!(matches!(err, ProtoError::BufferTooShort { .. }));
    }
}
