//! Voxel records and the traversal policy derived from their basic type.

use std::fmt;

use crate::error::ProtoError;
use crate::pack::Value;
use crate::types::BlockPos;

/// Game-independent classification of a voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BasicType {
    Empty = 0,
    TotalObstacle = 1,
    EasyObstacle = 2,
    DoorObstacle = 3,
    DoorEasyDestroy = 4,
    DoorHardDestroy = 5,
    HardObstacle = 6,
    Unknown = 7,
}

impl BasicType {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Empty,
            1 => Self::TotalObstacle,
            2 => Self::EasyObstacle,
            3 => Self::DoorObstacle,
            4 => Self::DoorEasyDestroy,
            5 => Self::DoorHardDestroy,
            6 => Self::HardObstacle,
            7 => Self::Unknown,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether this type is some kind of door.
    pub fn is_door(self) -> bool {
        matches!(
            self,
            Self::DoorObstacle | Self::DoorEasyDestroy | Self::DoorHardDestroy
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ActiveState {
    #[default]
    Inactive = 0,
    Active = 1,
}

impl ActiveState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Inactive),
            1 => Some(Self::Active),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IntactState {
    #[default]
    Intact = 0,
    Damaged = 1,
}

impl IntactState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Intact),
            1 => Some(Self::Damaged),
            _ => None,
        }
    }
}

/// One voxel as seen by the agent. Replaced wholesale on every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelRecord {
    pos: BlockPos,
    basic_type: BasicType,
    specific_type: i32,
    active_state: ActiveState,
    intact_state: IntactState,
}

impl VoxelRecord {
    /// Build a record. Non-door voxels are always stored inactive.
    pub fn new(
        pos: BlockPos,
        basic_type: BasicType,
        specific_type: i32,
        active_state: ActiveState,
        intact_state: IntactState,
    ) -> Self {
        let active_state = if basic_type.is_door() {
            active_state
        } else {
            ActiveState::Inactive
        };
        Self {
            pos,
            basic_type,
            specific_type,
            active_state,
            intact_state,
        }
    }

    /// Placeholder for a voxel nothing is known about.
    pub fn unknown(pos: BlockPos) -> Self {
        Self::new(
            pos,
            BasicType::Unknown,
            0,
            ActiveState::Inactive,
            IntactState::Intact,
        )
    }

    /// Parse `[pos, basic_type, specific_type, active_state, intact_state]`.
    pub fn from_params(params: &[Value]) -> Result<Self, ProtoError> {
        if params.len() != 5 {
            return Err(ProtoError::InvalidData(format!(
                "voxel update needs 5 params, got {}",
                params.len()
            )));
        }
        let pos = params[0]
            .as_block_pos()
            .ok_or_else(|| ProtoError::InvalidData("voxel position".into()))?;
        let basic_type = params[1]
            .as_i64()
            .and_then(BasicType::from_code)
            .ok_or_else(|| ProtoError::InvalidData(format!("basic type {}", params[1])))?;
        let specific_type = params[2]
            .as_i32()
            .ok_or_else(|| ProtoError::InvalidData(format!("specific type {}", params[2])))?;
        let active_state = params[3]
            .as_i64()
            .and_then(ActiveState::from_code)
            .ok_or_else(|| ProtoError::InvalidData(format!("active state {}", params[3])))?;
        let intact_state = params[4]
            .as_i64()
            .and_then(IntactState::from_code)
            .ok_or_else(|| ProtoError::InvalidData(format!("intact state {}", params[4])))?;
        Ok(Self::new(
            pos,
            basic_type,
            specific_type,
            active_state,
            intact_state,
        ))
    }

    /// The `voxel_update` parameter list for this record.
    pub fn to_params(&self) -> Vec<Value> {
        vec![
            self.pos.into(),
            Value::Int(self.basic_type.code() as i64),
            Value::Int(self.specific_type as i64),
            Value::Int(self.active_state as i64),
            Value::Int(self.intact_state as i64),
        ]
    }

    pub fn pos(&self) -> BlockPos {
        self.pos
    }

    pub fn basic_type(&self) -> BasicType {
        self.basic_type
    }

    pub fn specific_type(&self) -> i32 {
        self.specific_type
    }

    pub fn active_state(&self) -> ActiveState {
        self.active_state
    }

    pub fn intact_state(&self) -> IntactState {
        self.intact_state
    }

    pub fn is_intact(&self) -> bool {
        self.intact_state == IntactState::Intact
    }

    pub fn is_active(&self) -> bool {
        self.active_state == ActiveState::Active
    }

    /// A door that is currently open. Never true for anything else.
    pub fn is_open(&self) -> bool {
        self.can_open() && self.is_active()
    }

    /// Whether the voxel can be opened. Damaged destructible doors can't.
    pub fn can_open(&self) -> bool {
        match self.basic_type {
            BasicType::DoorObstacle => true,
            BasicType::DoorEasyDestroy | BasicType::DoorHardDestroy => self.is_intact(),
            _ => false,
        }
    }

    /// Whether the pathfinder may move through this voxel.
    ///
    /// `no_destroy` forbids breaking easy obstacles on the way; `no_interact`
    /// forbids opening doors. Unknown voxels are never traversable.
    pub fn can_traverse(&self, no_destroy: bool, no_interact: bool) -> bool {
        if self.is_open() {
            return true;
        }
        match self.basic_type {
            BasicType::Empty => true,
            BasicType::EasyObstacle => !no_destroy,
            BasicType::DoorObstacle | BasicType::DoorHardDestroy => !no_interact,
            BasicType::DoorEasyDestroy => !no_destroy || !no_interact,
            BasicType::TotalObstacle | BasicType::HardObstacle | BasicType::Unknown => false,
        }
    }

    /// Whether the pathfinder may break this voxel without special effort.
    /// Doors are never destroyed automatically.
    pub fn can_destroy(&self) -> bool {
        self.basic_type == BasicType::EasyObstacle
    }
}

impl fmt::Display for VoxelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VOXEL@{}: basic_type:{:?},specific_type:{}",
            self.pos, self.basic_type, self.specific_type
        )
    }
}
