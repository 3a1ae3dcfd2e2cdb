//! Proxy-side world store, filled from the game server's chunk packets.

use std::collections::HashMap;

use tracing::debug;
use yate_nbt::NbtRoot;
use yate_proto::{BlockPos, IntoBlockPos};

use crate::block_entity::BlockEntity;
use crate::chunk::{join_block, split_block, Chunk};
use crate::codec::{self, BulkPayload, ColumnPayload, ColumnUpdate};
use crate::column::{ColumnStore, IntoColumnPos};
use crate::error::CodecError;

/// Which world a [`Dimension`] holds. The discriminant is the server's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DimensionKind {
    Nether = -1,
    Overworld = 0,
    End = 1,
}

impl DimensionKind {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            -1 => Some(Self::Nether),
            0 => Some(Self::Overworld),
            1 => Some(Self::End),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    /// Whether single-column packets in this dimension carry sky light.
    pub fn has_sky_light(self) -> bool {
        self == Self::Overworld
    }
}

/// Chunk columns and block entities for one dimension.
pub struct Dimension {
    kind: DimensionKind,
    columns: ColumnStore<Chunk>,
    block_entities: HashMap<BlockPos, BlockEntity>,
}

impl Dimension {
    pub fn new(kind: DimensionKind) -> Self {
        Self {
            kind,
            columns: ColumnStore::new(),
            block_entities: HashMap::new(),
        }
    }

    pub fn kind(&self) -> DimensionKind {
        self.kind
    }

    pub fn columns(&self) -> &ColumnStore<Chunk> {
        &self.columns
    }

    // -----------------------------------------------------------------------
    // Chunk packets
    // -----------------------------------------------------------------------

    /// Decode and commit a single-column packet.
    pub fn unpack_column(&mut self, payload: &ColumnPayload) -> Result<(), CodecError> {
        let update = codec::decode_column(payload, self.kind.has_sky_light())?;
        self.apply(update);
        Ok(())
    }

    /// Decode and commit a bulk packet. Returns the number of columns applied.
    /// Nothing is committed if any column fails to decode.
    pub fn unpack_bulk(&mut self, payload: &BulkPayload) -> Result<usize, CodecError> {
        let updates = codec::decode_bulk(payload)?;
        let count = updates.len();
        for update in updates {
            self.apply(update);
        }
        Ok(count)
    }

    /// Commit a decoded column.
    pub fn apply(&mut self, update: ColumnUpdate) {
        let column = self.columns.column_or_insert(update.chunk_x, update.chunk_z);
        for section in update.sections {
            let Some(chunk) = column.section_or_insert(section.y) else {
                continue;
            };
            chunk.replace_blocks(section.blocks);
            chunk.replace_block_light(section.block_light);
            if let Some(sky) = section.sky_light {
                chunk.replace_sky_light(sky);
            }
        }
        if let Some(biomes) = update.biomes {
            column.set_biomes(biomes);
        }
        debug!(
            chunk_x = update.chunk_x,
            chunk_z = update.chunk_z,
            sections = column.section_count(),
            "Column updated"
        );
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    /// `(id, aux)` at `pos`, or `(0, 0)` on any miss.
    pub fn get_block(&self, pos: impl IntoBlockPos) -> (u16, u8) {
        self.columns
            .section_at(pos.into_block_pos())
            .map(|(chunk, (x, y, z))| split_block(chunk.block(x, y, z)))
            .unwrap_or((0, 0))
    }

    /// Store a block and return the previous `(id, aux)`. Writes outside the
    /// vertical range are ignored and return `None`.
    pub fn set_block(&mut self, pos: impl IntoBlockPos, id: u16, aux: u8) -> Option<(u16, u8)> {
        self.set_block_raw(pos, join_block(id, aux))
    }

    /// Like [`set_block`](Self::set_block) with a pre-packed `id << 4 | aux`.
    pub fn set_block_raw(&mut self, pos: impl IntoBlockPos, packed: u16) -> Option<(u16, u8)> {
        let (chunk, (x, y, z)) = self.columns.section_at_mut(pos.into_block_pos())?;
        Some(split_block(chunk.set_block(x, y, z, packed)))
    }

    // -----------------------------------------------------------------------
    // Light and biomes
    // -----------------------------------------------------------------------

    /// `(block_light, sky_light)` at `pos`, or `(0, 0)` on any miss.
    pub fn get_light(&self, pos: impl IntoBlockPos) -> (u8, u8) {
        self.columns
            .section_at(pos.into_block_pos())
            .map(|(chunk, (x, y, z))| (chunk.block_light(x, y, z), chunk.sky_light(x, y, z)))
            .unwrap_or((0, 0))
    }

    /// Set either light channel. A `None` channel is left as is; values are
    /// masked to 4 bits.
    pub fn set_light(&mut self, pos: impl IntoBlockPos, block_light: Option<u8>, sky_light: Option<u8>) {
        let Some((chunk, (x, y, z))) = self.columns.section_at_mut(pos.into_block_pos()) else {
            return;
        };
        if let Some(level) = block_light {
            chunk.set_block_light(x, y, z, level);
        }
        if let Some(level) = sky_light {
            chunk.set_sky_light(x, y, z, level);
        }
    }

    pub fn get_biome(&self, pos: impl IntoColumnPos) -> u8 {
        self.columns.biome(pos)
    }

    pub fn set_biome(&mut self, pos: impl IntoColumnPos, id: u8) {
        self.columns.set_biome(pos, id);
    }

    // -----------------------------------------------------------------------
    // Block entities
    // -----------------------------------------------------------------------

    pub fn get_block_entity(&self, pos: impl IntoBlockPos) -> Option<&BlockEntity> {
        self.block_entities.get(&pos.into_block_pos())
    }

    /// Store a block entity and return whatever was there before.
    pub fn set_block_entity(&mut self, pos: impl IntoBlockPos, entity: BlockEntity) -> Option<BlockEntity> {
        self.block_entities.insert(pos.into_block_pos(), entity)
    }

    /// Apply a block-entity update packet. An absent compound clears the entry.
    pub fn update_block_entity(
        &mut self,
        pos: impl IntoBlockPos,
        action: u8,
        nbt: Option<NbtRoot>,
    ) -> Result<Option<BlockEntity>, CodecError> {
        let pos = pos.into_block_pos();
        match nbt {
            Some(nbt) => {
                let entity = BlockEntity::from_action(action, nbt)?;
                Ok(self.block_entities.insert(pos, entity))
            }
            None => Ok(self.block_entities.remove(&pos)),
        }
    }

    /// Like [`update_block_entity`](Self::update_block_entity), but decodes the
    /// compound from the packet bytes first. A bare TAG_End clears the entry.
    pub fn update_block_entity_raw(
        &mut self,
        pos: impl IntoBlockPos,
        action: u8,
        mut data: &[u8],
    ) -> Result<Option<BlockEntity>, CodecError> {
        let nbt = yate_nbt::read_optional_nbt(&mut data)?;
        self.update_block_entity(pos, action, nbt)
    }

    /// Apply a sign update packet.
    pub fn update_sign(&mut self, pos: impl IntoBlockPos, lines: [String; 4]) -> Option<BlockEntity> {
        self.set_block_entity(pos, BlockEntity::sign(lines))
    }

    /// Apply a sign update whose lines arrive as `line_1`..`line_4` fields.
    pub fn update_sign_fields<'a>(
        &mut self,
        pos: impl IntoBlockPos,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Option<BlockEntity>, CodecError> {
        let sign = BlockEntity::sign_from_fields(fields)?;
        Ok(self.set_block_entity(pos, sign))
    }
}
