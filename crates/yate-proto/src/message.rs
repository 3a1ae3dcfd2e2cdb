//! The datagram envelope: `[type, params, id]`.

use std::fmt;

use bytes::BufMut;

use crate::error::ProtoError;
use crate::msgtype::MsgType;
use crate::pack::{self, Value};

/// One decoded datagram. The type code is kept raw so that messages of an
/// unregistered type can still be logged before they are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub code: i64,
    pub params: Vec<Value>,
    pub id: i64,
}

impl Message {
    pub fn new(msg_type: MsgType, params: Vec<Value>, id: i64) -> Self {
        Self {
            code: msg_type.code() as i64,
            params,
            id,
        }
    }

    /// The registered type, if the code is known.
    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_code(self.code)
    }

    pub fn type_name(&self) -> &'static str {
        self.msg_type().map(MsgType::name).unwrap_or("unknown")
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        let envelope = Value::Array(vec![
            Value::Int(self.code),
            Value::Array(self.params.clone()),
            Value::Int(self.id),
        ]);
        pack::write_value(buf, &envelope);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        self.encode(&mut buf);
        buf
    }

    /// Decode a whole datagram.
    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        let value = pack::from_slice(data)?;
        let Value::Array(mut parts) = value else {
            return Err(ProtoError::MalformedEnvelope("envelope is not an array"));
        };
        if parts.len() != 3 {
            return Err(ProtoError::MalformedEnvelope("envelope must have 3 elements"));
        }
        let id = parts[2]
            .as_i64()
            .ok_or(ProtoError::MalformedEnvelope("id is not an integer"))?;
        let code = parts[0]
            .as_i64()
            .ok_or(ProtoError::MalformedEnvelope("type is not an integer"))?;
        let params = match parts.swap_remove(1) {
            Value::Array(items) => items,
            Value::Nil => Vec::new(),
            _ => return Err(ProtoError::MalformedEnvelope("params is not an array")),
        };
        Ok(Self { code, params, id })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} {}", self.type_name(), self.id, Value::Array(self.params.clone()))
    }
}
