//! # Shard Router
//!
//! Spreads keys over several independent pools. The router only chooses a
//! pool; each pool keeps its own limits, maintenance and accounting.
//!
//! Routing uses FNV-1a so every client process maps a key to the same shard
//! for a given address list.

use hkv_conn::{Conn, ConnConfig, TcpConn, Value};

use crate::command::Command;
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::pool::Pool;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Fixed set of pools addressed by key hash.
pub struct ShardedPool<C: Conn> {
    shards: Vec<Pool<C>>,
}

impl<C: Conn> ShardedPool<C> {
    pub fn new(shards: Vec<Pool<C>>) -> PoolResult<Self> {
        if shards.is_empty() {
            return Err(PoolError::Config("sharded pool needs at least one shard".into()));
        }
        Ok(ShardedPool { shards })
    }

    /// Index of the shard owning `key`.
    pub fn shard_index(&self, key: &[u8]) -> usize {
        (fnv1a(key) % self.shards.len() as u64) as usize
    }

    pub fn pool_for_key(&self, key: &[u8]) -> &Pool<C> {
        &self.shards[self.shard_index(key)]
    }

    /// Runs a command on the shard owning `args[0]`; keyless commands go to
    /// the first shard.
    pub fn exec(&self, command: &str, args: &[&[u8]]) -> PoolResult<Value> {
        let pool = match args.first() {
            Some(key) => self.pool_for_key(key),
            None => &self.shards[0],
        };
        pool.exec(command, args)
    }

    pub fn exec_command(&self, command: &Command) -> PoolResult<Value> {
        let pool = match command.key() {
            Some(key) => self.pool_for_key(key),
            None => &self.shards[0],
        };
        pool.exec_command(command)
    }

    /// Smoke-tests every shard, stopping at the first failure.
    pub fn test_all(&self) -> PoolResult<()> {
        self.shards.iter().try_for_each(Pool::test_conn)
    }

    pub fn shards(&self) -> &[Pool<C>] {
        &self.shards
    }

    pub fn close(&self) {
        for pool in &self.shards {
            pool.close();
        }
    }
}

impl ShardedPool<TcpConn> {
    /// One TCP pool per address, all sharing `pool` and the timeouts in
    /// `conn` (its `addr` is replaced per shard).
    pub fn connect<S: AsRef<str>>(addrs: &[S], pool: &PoolConfig, conn: &ConnConfig) -> PoolResult<Self> {
        let shards = addrs
            .iter()
            .map(|addr| {
                let conn = ConnConfig {
                    addr: addr.as_ref().to_string(),
                    ..conn.clone()
                };
                Pool::connect(conn, pool.clone())
            })
            .collect::<PoolResult<Vec<_>>>()?;
        Self::new(shards)
    }
}

fn fnv1a(key: &[u8]) -> u64 {
    key.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a(b"foobar"), 0x8594_4171_f739_67e8);
    }
}
