#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hkv_conn::{Conn, ConnError, ConnResult, Value};
use hkv_pool::{Pool, PoolConfig};
use parking_lot::Mutex;

/// Shared counters and switches for every connection a mock dialer creates.
#[derive(Default)]
pub struct MockServer {
    pub dials: AtomicUsize,
    pub closes: AtomicUsize,
    pub pings: AtomicUsize,
    pub fail_dial: AtomicBool,
    links: Mutex<Vec<Arc<AtomicBool>>>,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(MockServer::default())
    }

    /// Simulates the server dropping every connection dialed so far.
    pub fn kill_all(&self) {
        for link in self.links.lock().iter() {
            link.store(true, Ordering::SeqCst);
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

/// In-memory connection.
///
/// `PING` answers `PONG`, `ECHO x` answers `x`, `FAIL` breaks the connection,
/// `ERR` answers with a server error reply; anything else answers `OK`.
pub struct MockConn {
    pub id: usize,
    server: Arc<MockServer>,
    dead: Arc<AtomicBool>,
    dead_err: ConnError,
    replies: VecDeque<Value>,
    closed: bool,
}

impl MockConn {
    fn reply_for(&mut self, command: &str, args: &[&[u8]]) -> ConnResult<Value> {
        match command {
            "PING" => {
                self.server.pings.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Simple(Bytes::from_static(b"PONG")))
            }
            "ECHO" => Ok(Value::Bulk(args.first().map(|arg| Bytes::copy_from_slice(arg)))),
            "ERR" => Ok(Value::Error(Bytes::from_static(b"ERR mock"))),
            "FAIL" => {
                self.dead.store(true, Ordering::SeqCst);
                Err(self.dead_err.clone())
            }
            _ => Ok(Value::Simple(Bytes::from_static(b"OK"))),
        }
    }
}

impl Conn for MockConn {
    fn send(&mut self, command: &str, args: &[&[u8]]) -> ConnResult<()> {
        if let Some(err) = self.err() {
            return Err(err.clone());
        }
        let reply = self.reply_for(command, args)?;
        self.replies.push_back(reply);
        Ok(())
    }

    fn flush(&mut self) -> ConnResult<()> {
        match self.err() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn receive(&mut self) -> ConnResult<Value> {
        if let Some(err) = self.err() {
            return Err(err.clone());
        }
        self.replies
            .pop_front()
            .ok_or(ConnError::Protocol("no pending reply"))
    }

    fn close(&mut self) -> ConnResult<()> {
        if !self.closed {
            self.closed = true;
            self.server.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn err(&self) -> Option<&ConnError> {
        if self.closed || self.dead.load(Ordering::SeqCst) {
            Some(&self.dead_err)
        } else {
            None
        }
    }
}

pub fn dialer(server: Arc<MockServer>) -> impl Fn() -> ConnResult<MockConn> + Send + Sync + 'static {
    move || {
        if server.fail_dial.load(Ordering::SeqCst) {
            return Err(ConnError::InvalidAddress("mock:0".into()));
        }
        let id = server.dials.fetch_add(1, Ordering::SeqCst) + 1;
        let dead = Arc::new(AtomicBool::new(false));
        server.links.lock().push(Arc::clone(&dead));
        Ok(MockConn {
            id,
            server: Arc::clone(&server),
            dead,
            dead_err: ConnError::Closed,
            replies: VecDeque::new(),
            closed: false,
        })
    }
}

/// Config whose background maintenance never fires during a test.
pub fn quiet_config(max_idle: usize, max_active: usize) -> PoolConfig {
    PoolConfig::new(max_idle, max_active).with_tick_interval(Duration::from_secs(3600))
}

pub fn mock_pool(config: PoolConfig) -> (Pool<MockConn>, Arc<MockServer>) {
    init_tracing();
    let server = MockServer::new();
    let pool = Pool::with_config(dialer(Arc::clone(&server)), config).expect("pool");
    (pool, server)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
