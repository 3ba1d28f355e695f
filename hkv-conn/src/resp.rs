//! # RESP2 Framing
//!
//! Purpose: Frame outgoing commands and parse server replies for `TcpConn`.
//!
//! ## Design Principles
//! 1. **Append-Only Encoding**: Commands are appended to a caller buffer so
//!    several can be pipelined into one write.
//! 2. **Binary-Safe**: Bulk strings are raw bytes (`Bytes`), never text.
//! 3. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::BufRead;

use bytes::Bytes;

use crate::error::{ConnError, ConnResult};

/// Arrays nested deeper than this are treated as malformed input.
const MAX_ARRAY_DEPTH: usize = 32;

/// RESP2 reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// +OK or +PONG style status replies.
    Simple(Bytes),
    /// -ERR ... replies.
    Error(Bytes),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings, with None for the null bulk string.
    Bulk(Option<Bytes>),
    /// *... arrays.
    Array(Vec<Value>),
}

impl Value {
    /// Returns true for a server error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

/// Appends one command, framed as a RESP2 array of bulk strings, to `out`.
pub fn encode_command(command: &str, args: &[&[u8]], out: &mut Vec<u8>) {
    push_header(out, b'*', args.len() + 1);
    push_bulk(out, command.as_bytes());
    for arg in args {
        push_bulk(out, arg);
    }
}

/// Reads one RESP value from the buffered reader.
///
/// `line_buf` is scratch space reused across calls.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ConnResult<Value> {
    read_value(reader, line_buf, 0)
}

fn read_value<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> ConnResult<Value> {
    read_line(reader, line_buf)?;
    let (&marker, rest) = line_buf
        .split_first()
        .ok_or(ConnError::Protocol("empty reply line"))?;

    match marker {
        b'+' => Ok(Value::Simple(Bytes::copy_from_slice(rest))),
        b'-' => Ok(Value::Error(Bytes::copy_from_slice(rest))),
        b':' => Ok(Value::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            if depth >= MAX_ARRAY_DEPTH {
                return Err(ConnError::Protocol("array nesting too deep"));
            }
            if len < 0 {
                return Ok(Value::Array(Vec::new()));
            }
            let mut items = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                items.push(read_value(reader, line_buf, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        _ => Err(ConnError::Protocol("unknown reply type")),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ConnResult<Value> {
    if len < 0 {
        return Ok(Value::Bulk(None));
    }
    let mut data = vec![0u8; len as usize + 2];
    reader.read_exact(&mut data)?;
    if !data.ends_with(b"\r\n") {
        return Err(ConnError::Protocol("bulk string missing CRLF"));
    }
    data.truncate(len as usize);
    Ok(Value::Bulk(Some(Bytes::from(data))))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ConnResult<()> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Err(ConnError::Protocol("connection closed by peer"));
    }
    if !buf.ends_with(b"\r\n") {
        return Err(ConnError::Protocol("reply line missing CRLF"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ConnResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ConnError::Protocol("invalid integer"))
}

fn push_header(out: &mut Vec<u8>, marker: u8, len: usize) {
    out.push(marker);
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    push_header(out, b'$', data.len());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}
