//! YATE wire types: varints, positions, the MessagePack envelope, and the
//! voxel record shared by proxy and agent.

pub mod codec;
pub mod error;
pub mod message;
pub mod msgtype;
pub mod pack;
pub mod types;
pub mod voxel;

pub use error::ProtoError;
pub use message::Message;
pub use msgtype::MsgType;
pub use pack::Value;
pub use types::{BlockPos, IntoBlockPos};
pub use voxel::{ActiveState, BasicType, IntactState, VoxelRecord};
