//! Agent-side voxel store, filled from `voxel_update` messages.

use yate_proto::{BlockPos, IntoBlockPos, VoxelRecord};

use crate::chunk::{cell_index, CHUNK_CELLS};
use crate::column::{section_index, ColumnStore};

/// One 16x16x16 section of known voxels.
pub struct VoxelSection {
    cells: Box<[Option<VoxelRecord>]>,
}

impl Default for VoxelSection {
    fn default() -> Self {
        Self {
            cells: vec![None; CHUNK_CELLS].into_boxed_slice(),
        }
    }
}

/// Sparse map from position to the last [`VoxelRecord`] received for it.
#[derive(Default)]
pub struct VoxelStore {
    columns: ColumnStore<VoxelSection>,
    known: usize,
}

impl VoxelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `pos` falls inside the store's vertical range.
    pub fn in_range(pos: impl IntoBlockPos) -> bool {
        section_index(pos.into_block_pos().chunk().1).is_some()
    }

    pub fn get(&self, pos: impl IntoBlockPos) -> Option<VoxelRecord> {
        let (section, (x, y, z)) = self.columns.section_at(pos.into_block_pos())?;
        section.cells[cell_index(x, y, z)]
    }

    pub fn contains(&self, pos: impl IntoBlockPos) -> bool {
        self.get(pos).is_some()
    }

    /// Overwrite the record at its own position. Returns `false` if the
    /// position is outside the vertical range and nothing was stored.
    pub fn insert(&mut self, record: VoxelRecord) -> bool {
        let Some((section, (x, y, z))) = self.columns.section_at_mut(record.pos()) else {
            return false;
        };
        if section.cells[cell_index(x, y, z)].replace(record).is_none() {
            self.known += 1;
        }
        true
    }

    /// Number of positions with a record.
    pub fn len(&self) -> usize {
        self.known
    }

    pub fn is_empty(&self) -> bool {
        self.known == 0
    }

    /// Records inside the half-open box `[start, end)`.
    pub fn within(&self, start: BlockPos, end: BlockPos) -> Vec<VoxelRecord> {
        self.iter()
            .filter(|r| {
                let p = r.pos();
                (start.x..end.x).contains(&p.x)
                    && (start.y..end.y).contains(&p.y)
                    && (start.z..end.z).contains(&p.z)
            })
            .copied()
            .collect()
    }

    /// Every known record, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &VoxelRecord> {
        self.columns.iter().flat_map(|column| {
            (0..16)
                .filter_map(move |cy| column.section(cy))
                .flat_map(|section| section.cells.iter().flatten())
        })
    }
}

impl std::fmt::Debug for VoxelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelStore")
            .field("columns", &self.columns.len())
            .field("known", &self.known)
            .finish()
    }
}
