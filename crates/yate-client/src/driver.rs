//! The boundary to whatever drives the avatar in-game.
//!
//! Pathfinding and interaction live behind this trait and are not
//! implemented here. The agent side only needs the avatar's pose and vision
//! range to derive its visual window.

use yate_proto::{BlockPos, VoxelRecord};

pub trait Driver {
    /// Voxels the avatar can perceive per axis. Each component must be even.
    fn vision_range(&self) -> [i32; 3];

    fn position(&self) -> (f64, f64, f64);

    /// Rotation per axis in degrees, each within `[0, 360)`.
    fn rotation(&self) -> (f64, f64, f64);

    fn destroy_voxel(&mut self, pos: BlockPos);

    fn interact_voxel(&mut self, pos: BlockPos);

    /// Walk as close as possible to `pos`. Failing is acceptable.
    fn walk_to_space(&mut self, pos: BlockPos);

    /// Try to move along `vector`, breaking and opening things as needed.
    fn move_vector(&mut self, vector: (f64, f64, f64));

    /// What the avatar sees at `pos`, or `None` if it is out of sight.
    fn get_voxel(&self, pos: BlockPos) -> Option<VoxelRecord>;
}
