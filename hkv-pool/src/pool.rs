//! # Pool Engine
//!
//! Purpose: Hand out reusable connections to concurrent callers while never
//! dialing more than `max_active` of them at once.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Idle connections sit in a bounded MPMC queue.
//! 2. **Lock-Free Accounting**: `cur_active`/`idle_count` are atomics; the slot
//!    for a new dial is reserved with a CAS so the ceiling is never overshot.
//! 3. **Short Critical Sections**: The cache lock is shared for one queue
//!    operation at a time and exclusive only while `close`/`update` swap it.
//!    Waiters block on a cloned receiver with the lock released.
//! 4. **Errors as Values**: Exhaustion, dial failure and closure come back as
//!    `PoolError`; dead connections are dropped silently and replaced.
//!
//! ## Structure Overview
//!
//! ```text
//! Pool (Clone, Arc)
//!   └── PoolInner
//!         ├── dialer: Fn() -> ConnResult<C>
//!         ├── idle: RwLock<IdleCache>  (crossbeam bounded channel)
//!         ├── cur_active / idle_count  (atomics)
//!         ├── limits + policy          (atomics, live-tunable)
//!         └── maintenance thread       (Weak<PoolInner>, see maintenance.rs)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use hkv_conn::{Conn, ConnConfig, ConnResult, TcpConn, Value};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::{duration_millis, PoolConfig};
use crate::error::{PoolError, PoolResult};
use crate::handle::PooledConn;
use crate::maintenance::{self, MaintenanceState, TickReport};

/// Longest a waiter blocks before re-checking capacity and the closed flag.
const WAIT_SLICE: Duration = Duration::from_millis(50);

type Dialer<C> = dyn Fn() -> ConnResult<C> + Send + Sync;

/// Bounded queue of idle connections.
///
/// Replaced wholesale by `update` (new capacity) and `close`.
struct IdleCache<C> {
    tx: Sender<C>,
    rx: Receiver<C>,
}

impl<C> IdleCache<C> {
    fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        IdleCache { tx, rx }
    }
}

/// Point-in-time view of pool accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections currently dialed, idle or checked out.
    pub cur_active: usize,
    /// Connections sitting in the idle cache.
    pub idle: usize,
    pub max_active: usize,
    pub max_idle: usize,
    pub closed: bool,
}

pub(crate) struct PoolInner<C: Conn> {
    dialer: Box<Dialer<C>>,
    idle: RwLock<IdleCache<C>>,
    cur_active: AtomicUsize,
    idle_count: AtomicUsize,
    max_idle: AtomicUsize,
    max_active: AtomicUsize,
    /// Zero means wait forever.
    wait_timeout_ms: AtomicU64,
    idle_life_ticks: AtomicU32,
    ping_period: AtomicUsize,
    closed: AtomicBool,
    maintenance: Mutex<MaintenanceState>,
    /// Dropping the sender stops the maintenance thread.
    stop_tx: Mutex<Option<Sender<()>>>,
    maintenance_thread: Mutex<Option<JoinHandle<()>>>,
}

/// Bounded, health-checked connection pool.
///
/// Cloning is cheap and every clone drives the same pool; `close` on any
/// clone closes it for all of them.
pub struct Pool<C: Conn> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Conn> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Pool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Conn> Pool<C> {
    /// Creates a pool with default policy and the given capacities.
    pub fn new<F>(dialer: F, max_idle: usize, max_active: usize) -> PoolResult<Self>
    where
        F: Fn() -> ConnResult<C> + Send + Sync + 'static,
    {
        Self::with_config(dialer, PoolConfig::new(max_idle, max_active))
    }

    /// Creates a pool from a full configuration and starts its maintenance
    /// thread.
    pub fn with_config<F>(dialer: F, config: PoolConfig) -> PoolResult<Self>
    where
        F: Fn() -> ConnResult<C> + Send + Sync + 'static,
    {
        config.validate()?;
        let (stop_tx, stop_rx) = bounded(0);
        let inner = Arc::new(PoolInner {
            dialer: Box::new(dialer),
            idle: RwLock::new(IdleCache::with_capacity(config.max_active)),
            cur_active: AtomicUsize::new(0),
            idle_count: AtomicUsize::new(0),
            max_idle: AtomicUsize::new(config.max_idle),
            max_active: AtomicUsize::new(config.max_active),
            wait_timeout_ms: AtomicU64::new(config.wait_timeout_ms),
            idle_life_ticks: AtomicU32::new(config.idle_life_ticks),
            ping_period: AtomicUsize::new(config.ping_period),
            closed: AtomicBool::new(false),
            maintenance: Mutex::new(MaintenanceState::default()),
            stop_tx: Mutex::new(Some(stop_tx)),
            maintenance_thread: Mutex::new(None),
        });

        let join = maintenance::spawn(Arc::downgrade(&inner), config.tick_interval(), stop_rx)
            .map_err(PoolError::Spawn)?;
        *inner.maintenance_thread.lock() = Some(join);

        Ok(Pool { inner })
    }

    /// Acquires a connection.
    ///
    /// Returns an idle one if available, dials a new one while under the
    /// active ceiling, and otherwise waits for a release (forever, or up to
    /// the wait timeout). Idle connections that turn out to be broken are
    /// closed and acquisition starts over.
    pub fn get(&self) -> PoolResult<PooledConn<C>> {
        // A timeout too large to represent as an instant waits forever.
        let deadline = self
            .inner
            .wait_timeout()
            .and_then(|timeout| Instant::now().checked_add(timeout));
        loop {
            let conn = self.inner.acquire(deadline)?;
            if let Some(err) = conn.err() {
                debug!(error = %err, "discarding broken connection on acquire");
                self.inner.discard(conn);
                continue;
            }
            return Ok(PooledConn::new(conn, Arc::downgrade(&self.inner)));
        }
    }

    /// Returns a handle to its pool. Same as `PooledConn::close`.
    pub fn put(&self, conn: PooledConn<C>) {
        conn.close();
    }

    /// Runs one command on a pooled connection and releases it.
    pub fn exec(&self, command: &str, args: &[&[u8]]) -> PoolResult<Value> {
        let mut conn = self.get()?;
        conn.exec(command, args)
    }

    /// Runs a prepared `Command`.
    pub fn exec_command(&self, command: &Command) -> PoolResult<Value> {
        self.exec(command.name(), &command.arg_slices())
    }

    /// Acquires and immediately releases a connection.
    pub fn test_conn(&self) -> PoolResult<()> {
        let conn = self.get()?;
        let result = match conn.err() {
            Some(err) => Err(PoolError::Conn(err.clone())),
            None => Ok(()),
        };
        conn.close();
        result
    }

    /// Closes the pool: idle connections are closed, waiters and later
    /// acquisitions fail with `PoolError::Closed`, and checked-out
    /// connections are closed when released. Idempotent.
    pub fn close(&self) {
        let drained = {
            let mut cache = self.inner.idle.write();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::replace(&mut *cache, IdleCache::with_capacity(1))
        };
        self.inner.idle_count.store(0, Ordering::Release);

        let mut closed = 0usize;
        for conn in drained.rx.try_iter() {
            self.inner.discard(conn);
            closed += 1;
        }

        self.inner.stop_tx.lock().take();
        if let Some(join) = self.inner.maintenance_thread.lock().take() {
            if join.join().is_err() {
                warn!("maintenance thread panicked");
            }
        }
        info!(closed, "pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Changes capacities at runtime.
    ///
    /// Idle connections migrate into a fresh cache sized `max_active`; those
    /// that do not fit are closed. Connections checked out right now stay
    /// counted and are judged against the new limits when released, so
    /// `cur_active` may sit above a shrunken `max_active` until they return.
    /// `cur_active` is only reduced by the closed overflow, so dials and
    /// discards racing with the resize keep their counts.
    pub fn update(&self, max_idle: usize, max_active: usize) {
        let max_active = max_active.max(1);
        let inner = &self.inner;

        let mut cache = inner.idle.write();
        if inner.is_closed() {
            return;
        }
        if inner.max_idle.load(Ordering::Acquire) == max_idle
            && inner.max_active.load(Ordering::Acquire) == max_active
        {
            return;
        }

        let old = std::mem::replace(&mut *cache, IdleCache::with_capacity(max_active));
        let mut migrated = 0usize;
        let mut overflow = Vec::new();
        for conn in old.rx.try_iter() {
            match cache.tx.try_send(conn) {
                Ok(()) => migrated += 1,
                Err(err) => overflow.push(err.into_inner()),
            }
        }

        // Holding the write lock keeps every other idle_count writer out.
        inner.idle_count.store(migrated, Ordering::Release);
        saturating_sub(&inner.cur_active, overflow.len());
        inner.max_idle.store(max_idle, Ordering::Release);
        inner.max_active.store(max_active, Ordering::Release);
        drop(cache);

        let dropped = overflow.len();
        for conn in overflow {
            close_conn(conn);
        }
        info!(max_idle, max_active, migrated, dropped, "pool resized");
    }

    /// Sets how long `get` waits at the ceiling; `Duration::ZERO` waits
    /// forever.
    pub fn set_wait_timeout(&self, timeout: Duration) {
        self.inner
            .wait_timeout_ms
            .store(duration_millis(timeout), Ordering::Release);
    }

    /// Sets how many consecutive over-limit ticks precede an eviction.
    pub fn set_idle_life_ticks(&self, ticks: u32) {
        self.inner.idle_life_ticks.store(ticks, Ordering::Release);
    }

    /// Sets the keepalive divisor; zero is treated as one.
    pub fn set_ping_period(&self, period: usize) {
        self.inner.ping_period.store(period.max(1), Ordering::Release);
    }

    /// Runs one maintenance tick on the calling thread.
    pub fn run_maintenance(&self) -> TickReport {
        self.inner.maintain()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            cur_active: self.inner.cur_active.load(Ordering::Acquire),
            idle: self.inner.idle_count.load(Ordering::Acquire),
            max_active: self.inner.max_active.load(Ordering::Acquire),
            max_idle: self.inner.max_idle.load(Ordering::Acquire),
            closed: self.inner.is_closed(),
        }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &PoolInner<C> {
        &self.inner
    }
}

impl Pool<TcpConn> {
    /// Creates a pool of RESP2 TCP connections to `conn.addr`.
    pub fn connect(conn: ConnConfig, config: PoolConfig) -> PoolResult<Self> {
        Self::with_config(TcpConn::dialer(conn), config)
    }
}

impl<C: Conn> PoolInner<C> {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn max_idle(&self) -> usize {
        self.max_idle.load(Ordering::Acquire)
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle_count.load(Ordering::Acquire)
    }

    pub(crate) fn idle_life_ticks(&self) -> u32 {
        self.idle_life_ticks.load(Ordering::Acquire)
    }

    pub(crate) fn ping_period(&self) -> usize {
        self.ping_period.load(Ordering::Acquire).max(1)
    }

    pub(crate) fn maintenance_state(&self) -> &Mutex<MaintenanceState> {
        &self.maintenance
    }

    fn wait_timeout(&self) -> Option<Duration> {
        match self.wait_timeout_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Obtains a raw connection; `deadline` of `None` waits forever at the
    /// ceiling.
    fn acquire(&self, deadline: Option<Instant>) -> PoolResult<C> {
        let mut warned = false;
        loop {
            if let Some(conn) = self.pop_idle()? {
                return Ok(conn);
            }
            if self.try_reserve() {
                return self.dial();
            }

            if !warned {
                warn!(
                    max_active = self.max_active.load(Ordering::Acquire),
                    "too many active connections, waiting for a release"
                );
                warned = true;
            }

            let slice = match deadline {
                None => WAIT_SLICE,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(PoolError::Timeout);
                    }
                    remaining.min(WAIT_SLICE)
                }
            };

            let rx = {
                let cache = self.idle.read();
                if self.is_closed() {
                    return Err(PoolError::Closed);
                }
                cache.rx.clone()
            };
            // A swap drops the old sender, so a stale receiver disconnects
            // once drained and the loop picks up the new cache.
            match rx.recv_timeout(slice) {
                Ok(conn) => return self.claim_received(conn, &rx),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
        }
    }

    /// Accounts for a connection a waiter received outside the lock.
    fn claim_received(&self, conn: C, rx: &Receiver<C>) -> PoolResult<C> {
        let cache = self.idle.read();
        if self.is_closed() {
            drop(cache);
            self.discard(conn);
            return Err(PoolError::Closed);
        }
        // Taken from a swapped-out cache: the swap already recounted idle.
        if cache.rx.same_channel(rx) {
            saturating_dec(&self.idle_count);
        }
        Ok(conn)
    }

    /// Non-blocking pop from the idle cache.
    pub(crate) fn pop_idle(&self) -> PoolResult<Option<C>> {
        let cache = self.idle.read();
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        Ok(cache.rx.try_recv().ok().map(|conn| {
            saturating_dec(&self.idle_count);
            conn
        }))
    }

    fn try_reserve(&self) -> bool {
        let max_active = self.max_active.load(Ordering::Acquire);
        self.cur_active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur < max_active).then_some(cur + 1)
            })
            .is_ok()
    }

    /// Dials into a slot already reserved by `try_reserve`.
    fn dial(&self) -> PoolResult<C> {
        match (self.dialer)() {
            Ok(conn) => {
                debug!(
                    cur_active = self.cur_active.load(Ordering::Acquire),
                    "dialed new connection"
                );
                Ok(conn)
            }
            Err(err) => {
                saturating_dec(&self.cur_active);
                warn!(error = %err, "dial failed");
                Err(PoolError::Dial(err))
            }
        }
    }

    /// Takes back a checked-out connection. Never blocks.
    pub(crate) fn release(&self, conn: C, failed: bool) {
        let cache = self.idle.read();
        if self.is_closed() {
            drop(cache);
            self.discard(conn);
            return;
        }
        if failed || conn.err().is_some() {
            drop(cache);
            debug!("discarding failed connection on release");
            self.discard(conn);
            return;
        }

        // Count first so a concurrent pop never decrements ahead of us.
        self.idle_count.fetch_add(1, Ordering::AcqRel);
        match cache.tx.try_send(conn) {
            Ok(()) => {}
            Err(TrySendError::Full(conn)) | Err(TrySendError::Disconnected(conn)) => {
                saturating_dec(&self.idle_count);
                drop(cache);
                self.discard(conn);
            }
        }
    }

    /// Closes a connection that was counted in `cur_active`.
    pub(crate) fn discard(&self, conn: C) {
        saturating_dec(&self.cur_active);
        close_conn(conn);
    }
}

impl<C: Conn> Drop for PoolInner<C> {
    fn drop(&mut self) {
        self.stop_tx.get_mut().take();
        for conn in self.idle.get_mut().rx.try_iter() {
            close_conn(conn);
        }
    }
}

/// Closes a connection outside of any pool accounting.
pub(crate) fn close_conn<C: Conn>(mut conn: C) {
    if let Err(err) = conn.close() {
        debug!(error = %err, "error while closing connection");
    }
}

/// Returns a handle's connection to `pool`, or closes it if the pool is gone.
pub(crate) fn return_to<C: Conn>(pool: &Weak<PoolInner<C>>, conn: C, failed: bool) {
    match pool.upgrade() {
        Some(pool) => pool.release(conn, failed),
        None => close_conn(conn),
    }
}

fn saturating_dec(counter: &AtomicUsize) {
    saturating_sub(counter, 1);
}

fn saturating_sub(counter: &AtomicUsize, amount: usize) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
        Some(value.saturating_sub(amount))
    });
}
