//! The agent's view of the world, as pushed by the proxy.

use std::time::{SystemTime, UNIX_EPOCH};

use yate_proto::pack::float_to_i32;
use yate_proto::{BlockPos, IntoBlockPos, VoxelRecord};
use yate_world::VoxelStore;

use crate::driver::Driver;
use crate::error::ClientError;

/// Axis-aligned box `[start, end)` around the avatar inside which voxel
/// knowledge is expected to arrive eventually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisualWindow {
    pub start: BlockPos,
    pub end: BlockPos,
}

impl VisualWindow {
    /// The window of `size` centred on a possibly fractional `center`, or
    /// `None` if its bounds do not fit in `i32`.
    ///
    /// The exact box runs from `center - size/2` to `center + size/2`. A
    /// voxel `p` lies in it iff `ceil(lo) <= p < ceil(hi)`, so the integer
    /// bounds are the ceilings of the exact ones.
    pub fn around(center: (f64, f64, f64), size: [i32; 3]) -> Option<Self> {
        let axis = |c: f64, s: i32| {
            let lo = c - f64::from(s / 2);
            let hi = lo + f64::from(s);
            Some((float_to_i32(lo.ceil())?, float_to_i32(hi.ceil())?))
        };
        let (x0, x1) = axis(center.0, size[0])?;
        let (y0, y1) = axis(center.1, size[1])?;
        let (z0, z1) = axis(center.2, size[2])?;
        Some(Self {
            start: BlockPos::new(x0, y0, z0),
            end: BlockPos::new(x1, y1, z1),
        })
    }

    /// The window a driver's current pose and vision range imply.
    pub fn from_driver(driver: &impl Driver) -> Option<Self> {
        Self::around(driver.position(), driver.vision_range())
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.start.x..self.end.x).contains(&pos.x)
            && (self.start.y..self.end.y).contains(&pos.y)
            && (self.start.z..self.end.z).contains(&pos.z)
    }
}

/// Known voxels plus the avatar's position and visual window. Only the
/// protocol handlers mutate it.
#[derive(Debug, Default)]
pub struct WorldModel {
    voxels: VoxelStore,
    /// Exact avatar position as last reported; may be fractional.
    avatar: (f64, f64, f64),
    range_size: [i32; 3],
    window: VisualWindow,
    /// Seconds since the Unix epoch of the last handled world update.
    last_update: f64,
}

impl WorldModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the window size. Every axis must be even and non-negative, and the
    /// resulting window must be representable. Nothing changes on error.
    pub fn set_visual_range(&mut self, size: [i32; 3]) -> Result<(), ClientError> {
        if size.iter().any(|&s| s < 0 || s % 2 != 0) {
            return Err(ClientError::InvalidParams(format!(
                "visual range must be even and non-negative, got {size:?}"
            )));
        }
        self.window = VisualWindow::around(self.avatar, size).ok_or_else(|| {
            ClientError::InvalidParams(format!(
                "visual range {size:?} around {:?} leaves the coordinate range",
                self.avatar
            ))
        })?;
        self.range_size = size;
        Ok(())
    }

    /// Move the avatar and recompute the window. Returns the voxel the avatar
    /// stands in. Nothing changes on error.
    pub fn set_avatar_pos(&mut self, pos: (f64, f64, f64)) -> Result<BlockPos, ClientError> {
        let out_of_range = || ClientError::InvalidParams(format!("avatar position {pos:?} out of range"));
        let voxel = BlockPos::new(
            float_to_i32(pos.0.floor()).ok_or_else(out_of_range)?,
            float_to_i32(pos.1.floor()).ok_or_else(out_of_range)?,
            float_to_i32(pos.2.floor()).ok_or_else(out_of_range)?,
        );
        self.window = VisualWindow::around(pos, self.range_size).ok_or_else(out_of_range)?;
        self.avatar = pos;
        Ok(voxel)
    }

    /// Store a voxel. Returns `false` if its position cannot be represented.
    pub fn set_voxel(&mut self, record: VoxelRecord) -> bool {
        self.voxels.insert(record)
    }

    pub fn voxel(&self, pos: impl IntoBlockPos) -> Option<VoxelRecord> {
        self.voxels.get(pos)
    }

    pub fn voxels(&self) -> &VoxelStore {
        &self.voxels
    }

    /// Whether a query for `pos` should wait for the proxy. Positions the
    /// store cannot hold never count as visible, since they could never
    /// arrive.
    pub fn is_visible(&self, pos: BlockPos) -> bool {
        self.window.contains(pos) && VoxelStore::in_range(pos)
    }

    /// The voxel the avatar stands in.
    pub fn avatar_pos(&self) -> BlockPos {
        self.avatar.into_block_pos()
    }

    pub fn avatar_exact(&self) -> (f64, f64, f64) {
        self.avatar
    }

    pub fn visual_range(&self) -> [i32; 3] {
        self.range_size
    }

    pub fn window(&self) -> VisualWindow {
        self.window
    }

    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    pub fn mark_updated(&mut self) {
        self.last_update = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
    }
}
