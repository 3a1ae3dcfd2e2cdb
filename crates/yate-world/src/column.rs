//! Sparse column arena shared by the proxy-side and agent-side stores.
//!
//! Columns live in a `Vec` and are found through a packed `(cx, cz)` key.
//! Each column is a stack of 16 optional sections plus a 16x16 biome plane.
//! Entries are allocated on first write and never freed.

use std::collections::HashMap;

use yate_proto::BlockPos;

/// Vertical sections per column.
pub const SECTIONS_PER_COLUMN: usize = 16;

/// Pack chunk coordinates into one map key.
#[inline]
pub fn column_key(cx: i32, cz: i32) -> u64 {
    ((cx as u32 as u64) << 32) | cz as u32 as u64
}

/// Horizontal coordinates for the biome accessors. Fractional input is floored.
pub trait IntoColumnPos {
    fn into_column_pos(self) -> (i32, i32);
}

impl IntoColumnPos for (i32, i32) {
    fn into_column_pos(self) -> (i32, i32) {
        self
    }
}

impl IntoColumnPos for [i32; 2] {
    fn into_column_pos(self) -> (i32, i32) {
        (self[0], self[1])
    }
}

impl IntoColumnPos for (f64, f64) {
    fn into_column_pos(self) -> (i32, i32) {
        (self.0.floor() as i32, self.1.floor() as i32)
    }
}

impl IntoColumnPos for BlockPos {
    fn into_column_pos(self) -> (i32, i32) {
        (self.x, self.z)
    }
}

/// One column: 16 optional sections and a biome plane indexed `z*16 + x`.
pub struct Column<S> {
    pub x: i32,
    pub z: i32,
    sections: [Option<Box<S>>; SECTIONS_PER_COLUMN],
    biomes: [u8; 256],
}

impl<S: Default> Column<S> {
    pub fn new(x: i32, z: i32) -> Self {
        Self {
            x,
            z,
            sections: std::array::from_fn(|_| None),
            biomes: [0; 256],
        }
    }

    pub fn section(&self, cy: usize) -> Option<&S> {
        self.sections.get(cy)?.as_deref()
    }

    pub fn section_mut(&mut self, cy: usize) -> Option<&mut S> {
        self.sections.get_mut(cy)?.as_deref_mut()
    }

    /// The section at `cy`, allocated if absent. `None` only if `cy >= 16`.
    pub fn section_or_insert(&mut self, cy: usize) -> Option<&mut S> {
        let slot = self.sections.get_mut(cy)?;
        Some(slot.get_or_insert_with(Box::default))
    }

    /// Number of allocated sections.
    pub fn section_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_some()).count()
    }

    pub fn biome(&self, lx: usize, lz: usize) -> u8 {
        self.biomes[lz * 16 + lx]
    }

    pub fn set_biome(&mut self, lx: usize, lz: usize, id: u8) {
        self.biomes[lz * 16 + lx] = id;
    }

    pub fn biomes(&self) -> &[u8; 256] {
        &self.biomes
    }

    pub fn set_biomes(&mut self, biomes: [u8; 256]) {
        self.biomes = biomes;
    }
}

/// Arena of columns indexed by packed chunk coordinates.
pub struct ColumnStore<S> {
    columns: Vec<Column<S>>,
    index: HashMap<u64, usize>,
}

impl<S: Default> Default for ColumnStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Default> ColumnStore<S> {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, cx: i32, cz: i32) -> Option<&Column<S>> {
        let &slot = self.index.get(&column_key(cx, cz))?;
        self.columns.get(slot)
    }

    pub fn column_mut(&mut self, cx: i32, cz: i32) -> Option<&mut Column<S>> {
        let &slot = self.index.get(&column_key(cx, cz))?;
        self.columns.get_mut(slot)
    }

    pub fn column_or_insert(&mut self, cx: i32, cz: i32) -> &mut Column<S> {
        let slot = match self.index.get(&column_key(cx, cz)) {
            Some(&slot) => slot,
            None => {
                self.columns.push(Column::new(cx, cz));
                let slot = self.columns.len() - 1;
                self.index.insert(column_key(cx, cz), slot);
                slot
            }
        };
        &mut self.columns[slot]
    }

    /// The section holding `pos` plus the local cell coordinates, or `None`
    /// on any miss (absent column, absent section, vertical index out of range).
    pub fn section_at(&self, pos: BlockPos) -> Option<(&S, (usize, usize, usize))> {
        let (cx, cy, cz) = pos.chunk();
        let cy = section_index(cy)?;
        let section = self.column(cx, cz)?.section(cy)?;
        Some((section, pos.local()))
    }

    /// Like [`section_at`](Self::section_at) but allocates the column and
    /// section. Still `None` when the vertical index is out of range.
    pub fn section_at_mut(&mut self, pos: BlockPos) -> Option<(&mut S, (usize, usize, usize))> {
        let (cx, cy, cz) = pos.chunk();
        let cy = section_index(cy)?;
        let local = pos.local();
        let section = self.column_or_insert(cx, cz).section_or_insert(cy)?;
        Some((section, local))
    }

    pub fn biome(&self, pos: impl IntoColumnPos) -> u8 {
        let (x, z) = pos.into_column_pos();
        self.column(x.div_euclid(16), z.div_euclid(16))
            .map(|c| c.biome(x.rem_euclid(16) as usize, z.rem_euclid(16) as usize))
            .unwrap_or(0)
    }

    pub fn set_biome(&mut self, pos: impl IntoColumnPos, id: u8) {
        let (x, z) = pos.into_column_pos();
        self.column_or_insert(x.div_euclid(16), z.div_euclid(16)).set_biome(
            x.rem_euclid(16) as usize,
            z.rem_euclid(16) as usize,
            id,
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column<S>> {
        self.columns.iter()
    }
}

/// Map a chunk-space Y to a section slot, rejecting anything outside `[0, 15]`.
#[inline]
pub fn section_index(cy: i32) -> Option<usize> {
    usize::try_from(cy)
        .ok()
        .filter(|&cy| cy < SECTIONS_PER_COLUMN)
}
