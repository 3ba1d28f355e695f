//! # HybridKV Connection Pool
//!
//! Purpose: Amortize TCP handshakes to a Redis-compatible store by keeping a
//! bounded set of reusable, health-checked connections for concurrent
//! callers.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse connections through a bounded idle cache.
//! 2. **Hard Ceiling**: At most `max_active` connections are ever dialed;
//!    callers at the ceiling wait (optionally bounded) for a release.
//! 3. **RAII Release**: `PooledConn` returns itself to the pool on drop.
//! 4. **Background Hygiene**: A maintenance thread trims idle excess and
//!    renews idle connections.
//! 5. **Live Resize**: Capacities can change while connections are in use.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hkv_conn::ConnConfig;
//! use hkv_pool::{Pool, PoolConfig};
//!
//! let pool = Pool::connect(ConnConfig::new("127.0.0.1:6379"), PoolConfig::new(8, 16))?;
//! pool.exec("SET", &[b"key", b"value"])?;
//! let mut conn = pool.get()?;
//! let reply = conn.command("GET", &[b"key"]);
//! assert_eq!(reply.as_str(), Some("value"));
//! # Ok::<(), hkv_pool::PoolError>(())
//! ```

mod command;
mod config;
mod error;
mod handle;
mod maintenance;
mod pool;
mod reply;
mod shard;

pub use command::{Command, Commands};
pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use handle::PooledConn;
pub use maintenance::TickReport;
pub use pool::{Pool, PoolStats};
pub use reply::Reply;
pub use shard::ShardedPool;
