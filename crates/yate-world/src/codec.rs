//! Decoder for the game server's chunk-column payloads.
//!
//! A column carries its present sections grouped by kind: block data for
//! every section in ascending order, then every block-light plane, then every
//! sky-light plane (only when sky light is enabled), then the biome plane
//! (only when the column is continuous). Block data is bit-packed into
//! big-endian 64-bit words with an optional local palette.
//!
//! Decoding never touches a store. A column or bulk payload is decoded in full
//! into [`ColumnUpdate`]s that the caller commits afterwards, so a bad payload
//! leaves previously decoded columns intact.

use bytes::Buf;
use tracing::trace;
use yate_proto::codec::{ensure_remaining, read_u64_be_words, ProtoDecode};
use yate_proto::types::{read_count, VarInt};

use crate::chunk::{NibblePlane, CHUNK_CELLS};
use crate::column::SECTIONS_PER_COLUMN;
use crate::error::CodecError;

/// Width of a global block value when the section has no palette.
pub const GLOBAL_BITS_PER_BLOCK: u32 = 13;

/// Largest bits-per-block a section may declare.
const MAX_BITS_PER_BLOCK: u8 = 32;

const BIOME_BYTES: usize = 256;

/// A single-column chunk packet.
#[derive(Debug, Clone)]
pub struct ColumnPayload {
    pub chunk_x: i32,
    pub chunk_z: i32,
    /// Whether a biome plane trails the section data.
    pub continuous: bool,
    /// Bit `n` set means section `n` is present.
    pub primary_bitmap: u32,
    pub data: Vec<u8>,
}

/// Per-column metadata inside a bulk packet.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMeta {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub primary_bitmap: u32,
}

/// A bulk chunk packet: column metadata plus one concatenated data stream.
/// Every bulk column is continuous.
#[derive(Debug, Clone)]
pub struct BulkPayload {
    pub sky_light: bool,
    pub columns: Vec<ColumnMeta>,
    pub data: Vec<u8>,
}

/// One decoded section.
pub struct SectionUpdate {
    pub y: usize,
    pub blocks: Box<[u16; CHUNK_CELLS]>,
    pub block_light: NibblePlane,
    /// `None` when the payload carried no sky light. Existing sky light
    /// should then be kept.
    pub sky_light: Option<NibblePlane>,
}

/// Everything decoded for one column, ready to be committed.
pub struct ColumnUpdate {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub sections: Vec<SectionUpdate>,
    pub biomes: Option<[u8; BIOME_BYTES]>,
}

/// Decode a single-column payload.
pub fn decode_column(payload: &ColumnPayload, sky_light: bool) -> Result<ColumnUpdate, CodecError> {
    let mut buf = &payload.data[..];
    let sections = decode_sections(&mut buf, payload.primary_bitmap, sky_light)?;
    let biomes = if payload.continuous {
        Some(read_biomes(&mut buf)?)
    } else {
        None
    };
    if buf.has_remaining() {
        trace!(
            chunk_x = payload.chunk_x,
            chunk_z = payload.chunk_z,
            trailing = buf.remaining(),
            "Column payload has trailing bytes"
        );
    }
    Ok(ColumnUpdate {
        chunk_x: payload.chunk_x,
        chunk_z: payload.chunk_z,
        sections,
        biomes,
    })
}

/// Decode every column of a bulk payload. Fails as a whole if any column is bad.
pub fn decode_bulk(payload: &BulkPayload) -> Result<Vec<ColumnUpdate>, CodecError> {
    let mut buf = &payload.data[..];
    let mut updates = Vec::with_capacity(payload.columns.len());
    for meta in &payload.columns {
        let sections = decode_sections(&mut buf, meta.primary_bitmap, payload.sky_light)?;
        let biomes = read_biomes(&mut buf)?;
        updates.push(ColumnUpdate {
            chunk_x: meta.chunk_x,
            chunk_z: meta.chunk_z,
            sections,
            biomes: Some(biomes),
        });
    }
    Ok(updates)
}

fn decode_sections(
    buf: &mut impl Buf,
    primary_bitmap: u32,
    sky_light: bool,
) -> Result<Vec<SectionUpdate>, CodecError> {
    if primary_bitmap >> SECTIONS_PER_COLUMN != 0 {
        return Err(CodecError::SectionOutOfRange {
            bitmap: primary_bitmap,
        });
    }
    let present: Vec<usize> = (0..SECTIONS_PER_COLUMN)
        .filter(|y| primary_bitmap & (1 << y) != 0)
        .collect();

    let mut blocks = Vec::with_capacity(present.len());
    for _ in &present {
        blocks.push(decode_block_data(buf)?);
    }
    let mut block_light = Vec::with_capacity(present.len());
    for _ in &present {
        block_light.push(NibblePlane::read(buf)?);
    }
    let mut sky = Vec::with_capacity(present.len());
    if sky_light {
        for _ in &present {
            sky.push(Some(NibblePlane::read(buf)?));
        }
    } else {
        sky.resize_with(present.len(), || None);
    }

    Ok(present
        .into_iter()
        .zip(blocks)
        .zip(block_light)
        .zip(sky)
        .map(|(((y, blocks), block_light), sky_light)| SectionUpdate {
            y,
            blocks,
            block_light,
            sky_light,
        })
        .collect())
}

/// Decode one section's bit-packed block array.
pub fn decode_block_data(buf: &mut impl Buf) -> Result<Box<[u16; CHUNK_CELLS]>, CodecError> {
    ensure_remaining(buf, 1)?;
    let declared = buf.get_u8();
    if declared > MAX_BITS_PER_BLOCK {
        return Err(CodecError::BitsPerBlock(declared));
    }

    let palette = if declared > 0 {
        let len = read_count(buf)?;
        // Each entry takes at least one byte.
        ensure_remaining(buf, len)?;
        let mut palette = Vec::with_capacity(len);
        for _ in 0..len {
            let entry = VarInt::proto_decode(buf)?.0;
            let value = u16::try_from(entry).map_err(|_| CodecError::PaletteEntry(entry))?;
            palette.push(value);
        }
        Some(palette)
    } else {
        None
    };
    let bits = if declared > 0 {
        declared as u32
    } else {
        GLOBAL_BITS_PER_BLOCK
    };

    let word_count = read_count(buf)?;
    let words = read_u64_be_words(buf, word_count)?;
    let needed = CHUNK_CELLS * bits as usize / 64;
    if words.len() < needed {
        return Err(CodecError::WordStreamTooShort {
            bits,
            needed,
            got: words.len(),
        });
    }

    let mut blocks = Box::new([0u16; CHUNK_CELLS]);
    for (i, slot) in blocks.iter_mut().enumerate() {
        let raw = read_packed(&words, i, bits);
        *slot = match &palette {
            Some(palette) => *palette.get(raw as usize).ok_or(CodecError::PaletteIndex {
                index: raw,
                len: palette.len(),
            })?,
            None => raw as u16,
        };
    }
    Ok(blocks)
}

/// Read cell `index` from an LSB-first packed stream. A value that crosses a
/// word boundary takes its low bits from the top of the first word and its
/// high bits from the bottom of the next.
#[inline]
fn read_packed(words: &[u64], index: usize, bits: u32) -> u64 {
    let mask = (1u64 << bits) - 1;
    let bit = index * bits as usize;
    let start = bit / 64;
    let offset = (bit % 64) as u32;
    let end = (bit + bits as usize - 1) / 64;
    if start == end {
        (words[start] >> offset) & mask
    } else {
        ((words[start] >> offset) | (words[end] << (64 - offset))) & mask
    }
}

fn read_biomes(buf: &mut impl Buf) -> Result<[u8; BIOME_BYTES], CodecError> {
    ensure_remaining(buf, BIOME_BYTES)?;
    let mut biomes = [0u8; BIOME_BYTES];
    buf.copy_to_slice(&mut biomes);
    Ok(biomes)
}
