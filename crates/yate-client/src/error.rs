use std::net::SocketAddr;

use thiserror::Error;
use yate_proto::{BlockPos, ProtoError};

use crate::state::ConnectionState;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("undecodable datagram: {0}")]
    ProtocolDecode(#[from] ProtoError),

    #[error("datagram from {got}, expected {expected:?}")]
    PeerMismatch {
        expected: Option<SocketAddr>,
        got: SocketAddr,
    },

    #[error("keepalive {keepalive_id} was not acknowledged in time")]
    LivenessTimeout { keepalive_id: i64 },

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected")]
    NotConnected,

    #[error("cannot connect while {0}")]
    AlreadyConnected(ConnectionState),

    #[error("query for {0} was cancelled")]
    QueryCancelled(BlockPos),

    #[error("query for {0} timed out")]
    QueryTimedOut(BlockPos),
}
