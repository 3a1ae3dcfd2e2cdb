//! Message type registry.

use std::fmt;

/// Every message type understood on the proxy/agent link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Connect = 1,
    ConnectAck = 2,
    Keepalive = 3,
    KeepaliveAck = 4,
    UnknownPeer = 5,
    VisualRange = 6,
    VoxelUpdate = 7,
    AvatarPos = 8,
    RequestVoxel = 9,
    RequestVisual = 10,
}

/// Code and diagnostic name for each registered type.
pub const REGISTRY: &[(MsgType, &str)] = &[
    (MsgType::Connect, "connect"),
    (MsgType::ConnectAck, "connect_ack"),
    (MsgType::Keepalive, "keepalive"),
    (MsgType::KeepaliveAck, "keepalive_ack"),
    (MsgType::UnknownPeer, "unknown_peer"),
    (MsgType::VisualRange, "visual_range"),
    (MsgType::VoxelUpdate, "voxel_update"),
    (MsgType::AvatarPos, "avatar_pos"),
    (MsgType::RequestVoxel, "request_voxel"),
    (MsgType::RequestVisual, "request_visual"),
];

impl MsgType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: i64) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(ty, _)| ty.code() as i64 == code)
            .map(|(ty, _)| *ty)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(ty, _)| *ty)
    }

    pub fn name(self) -> &'static str {
        REGISTRY
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, n)| *n)
            .unwrap_or("unregistered")
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_resolvable() {
        for (ty, name) in REGISTRY {
            assert_eq!(MsgType::from_code(ty.code() as i64), Some(*ty));
            assert_eq!(MsgType::from_name(name), Some(*ty));
            assert_eq!(ty.name(), *name);
        }
        let mut codes: Vec<u8> = REGISTRY.iter().map(|(ty, _)| ty.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), REGISTRY.len());
    }

    #[test]
    fn unknown_code() {
        assert_eq!(MsgType::from_code(0), None);
        assert_eq!(MsgType::from_code(200), None);
        assert_eq!(MsgType::from_name("teleport"), None);
    }
}
