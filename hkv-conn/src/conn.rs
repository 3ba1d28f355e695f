//! # Connection Capability Set
//!
//! Purpose: Describe what the pool needs from a live connection and
//! implement it over a blocking TCP socket speaking RESP2.
//!
//! ## Design Principles
//! 1. **Trait Seam**: `Conn` is the only thing the pool core depends on.
//! 2. **Sticky Failure**: `TcpConn` records its first fatal error and every
//!    later call returns it; `err()` is the liveness probe.
//! 3. **Buffer Reuse**: Framing and line buffers live on the connection.

use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{ConnError, ConnResult};
use crate::resp::{encode_command, read_response, Value};

/// Capability set of one live connection.
///
/// `exec` is a full round trip. `send` queues a command, `flush` writes
/// everything queued, and `receive` reads the next pending reply, which
/// together allow pipelining. `err` reports a non-`None` value once the
/// connection is unusable.
pub trait Conn: Send + 'static {
    /// Sends one command and waits for its reply.
    fn exec(&mut self, command: &str, args: &[&[u8]]) -> ConnResult<Value> {
        self.send(command, args)?;
        self.flush()?;
        self.receive()
    }

    /// Queues one command without writing it.
    fn send(&mut self, command: &str, args: &[&[u8]]) -> ConnResult<()>;

    /// Writes all queued commands.
    fn flush(&mut self) -> ConnResult<()>;

    /// Reads the next reply.
    fn receive(&mut self) -> ConnResult<Value>;

    /// Closes the connection. Closing twice is a no-op.
    fn close(&mut self) -> ConnResult<()>;

    /// Returns the fatal error that broke this connection, if any.
    fn err(&self) -> Option<&ConnError>;
}

/// Dial settings for `TcpConn`.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl ConnConfig {
    /// Creates a config for `addr` without timeouts.
    pub fn new(addr: impl Into<String>) -> Self {
        ConnConfig {
            addr: addr.into(),
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

impl Default for ConnConfig {
    fn default() -> Self {
        ConnConfig::new("127.0.0.1:6379")
    }
}

/// Blocking RESP2 connection over TCP.
pub struct TcpConn {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    /// Commands sent whose replies have not been received yet.
    pending: usize,
    broken: Option<ConnError>,
}

impl TcpConn {
    /// Dials `config.addr` and applies the configured socket options.
    pub fn connect(config: &ConnConfig) -> ConnResult<Self> {
        let stream = connect_stream(config)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;
        debug!(addr = %config.addr, "connected");

        Ok(TcpConn {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
            pending: 0,
            broken: None,
        })
    }

    /// Returns a dial callback bound to `config`, suitable for a pool.
    pub fn dialer(config: ConnConfig) -> impl Fn() -> ConnResult<TcpConn> + Send + Sync + 'static {
        move || TcpConn::connect(&config)
    }

    fn check(&self) -> ConnResult<()> {
        match &self.broken {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Keeps the first fatal error and hands it back for propagation.
    fn fail(&mut self, err: ConnError) -> ConnError {
        debug!(error = %err, "connection broken");
        self.broken.get_or_insert(err).clone()
    }
}

impl Conn for TcpConn {
    fn exec(&mut self, command: &str, args: &[&[u8]]) -> ConnResult<Value> {
        self.send(command, args)?;
        self.flush()?;
        // Replies to earlier pipelined sends come first; the last one is ours.
        let mut reply = self.receive()?;
        while self.pending > 0 {
            reply = self.receive()?;
        }
        Ok(reply)
    }

    fn send(&mut self, command: &str, args: &[&[u8]]) -> ConnResult<()> {
        self.check()?;
        encode_command(command, args, &mut self.write_buf);
        self.pending += 1;
        Ok(())
    }

    fn flush(&mut self) -> ConnResult<()> {
        self.check()?;
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let stream = self.reader.get_mut();
        let result = stream.write_all(&self.write_buf).and_then(|_| stream.flush());
        self.write_buf.clear();
        result.map_err(|err| self.fail(err.into()))
    }

    fn receive(&mut self) -> ConnResult<Value> {
        self.check()?;
        match read_response(&mut self.reader, &mut self.line_buf) {
            Ok(value) => {
                self.pending = self.pending.saturating_sub(1);
                Ok(value)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn close(&mut self) -> ConnResult<()> {
        if matches!(self.broken, Some(ConnError::Closed)) {
            return Ok(());
        }
        self.broken = Some(ConnError::Closed);
        self.write_buf.clear();
        match self.reader.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already went away; nothing left to tear down.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn err(&self) -> Option<&ConnError> {
        self.broken.as_ref()
    }
}

fn connect_stream(config: &ConnConfig) -> ConnResult<TcpStream> {
    let addr: SocketAddr = config
        .addr
        .to_socket_addrs()
        .map_err(|_| ConnError::InvalidAddress(config.addr.clone()))?
        .next()
        .ok_or_else(|| ConnError::InvalidAddress(config.addr.clone()))?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}
