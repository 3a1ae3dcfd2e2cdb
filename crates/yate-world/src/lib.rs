//! World storage: chunk decoding, the proxy-side dimension store and the
//! agent-side voxel store.

pub mod block_entity;
pub mod chunk;
pub mod codec;
pub mod column;
pub mod dimension;
pub mod error;
pub mod voxel_store;

pub use block_entity::BlockEntity;
pub use codec::{BulkPayload, ColumnMeta, ColumnPayload, ColumnUpdate};
pub use dimension::{Dimension, DimensionKind};
pub use error::CodecError;
pub use voxel_store::VoxelStore;
