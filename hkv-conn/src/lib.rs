//! # HybridKV Connection Layer
//!
//! Purpose: Define the connection capability set consumed by the pool and
//! provide a blocking RESP2-over-TCP implementation of it.
//!
//! ## Design Principles
//! 1. **Capability Trait**: The pool depends only on `Conn`, never on sockets.
//! 2. **Sticky Failure**: The first IO or framing error marks a connection dead.
//! 3. **Minimal Allocation**: Command framing and line parsing reuse buffers.
//! 4. **Pipelining**: `send`/`flush`/`receive` expose the raw request stream.

mod conn;
mod error;
mod resp;

pub use conn::{Conn, ConnConfig, TcpConn};
pub use error::{ConnError, ConnResult};
pub use resp::{encode_command, read_response, Value};
