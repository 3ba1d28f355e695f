//! # Reply Envelope
//!
//! Normalizes the outcome of a command, transport failure included, into a
//! single typed value so callers can branch on one enum.

use bytes::Bytes;
use hkv_conn::Value;

use crate::error::PoolResult;

/// Typed result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status reply such as `OK` or `PONG`.
    Status(String),
    /// Bulk string payload.
    Bulk(Bytes),
    Integer(i64),
    /// Null bulk string or null array.
    Nil,
    Array(Vec<Reply>),
    /// Server error reply, or a pool/connection failure.
    Error(String),
}

impl Reply {
    pub fn from_result(result: PoolResult<Value>) -> Self {
        match result {
            Ok(value) => Reply::from(value),
            Err(err) => Reply::Error(err.to_string()),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Payload bytes of a bulk or status reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(data) => Some(data.as_ref()),
            Reply::Status(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    /// UTF-8 view of a bulk, status or error reply.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Bulk(data) => std::str::from_utf8(data).ok(),
            Reply::Status(text) | Reply::Error(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        match value {
            Value::Simple(text) => Reply::Status(String::from_utf8_lossy(&text).into_owned()),
            Value::Error(text) => Reply::Error(String::from_utf8_lossy(&text).into_owned()),
            Value::Integer(value) => Reply::Integer(value),
            Value::Bulk(Some(data)) => Reply::Bulk(data),
            Value::Bulk(None) => Reply::Nil,
            Value::Array(items) => Reply::Array(items.into_iter().map(Reply::from).collect()),
        }
    }
}
