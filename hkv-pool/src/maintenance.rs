//! # Idle Maintenance
//!
//! Purpose: Trim idle connections that linger above `max_idle` and renew
//! idle connections before the server or a middlebox silently drops them.
//!
//! ## Design Principles
//! 1. **Hysteresis**: An excess must persist for more than `idle_life_ticks`
//!    consecutive ticks before one connection is evicted, so short bursts of
//!    idleness do not cause churn.
//! 2. **Renewal over Reuse**: Probed connections get a `PING` and are closed
//!    rather than put back; a fresh dial replaces them on demand.
//! 3. **Never Wait**: Every pop is non-blocking; an empty cache ends the step.
//! 4. **Weak Ownership**: The thread holds a `Weak` pool so it never keeps a
//!    dropped pool alive.
//!
//! ## Accounting
//! Every discard here decrements both `idle_count` (on pop) and `cur_active`
//! (on close), the same as any other discard path.

use std::io;
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};
use hkv_conn::Conn;
use serde::Serialize;
use tracing::{debug, trace};

use crate::pool::PoolInner;

/// Per-pool hysteresis counter.
#[derive(Debug, Default)]
pub(crate) struct MaintenanceState {
    over_ticks: u32,
}

/// What one maintenance tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Whether an excess idle connection was evicted.
    pub evicted: bool,
    /// Idle connections pinged and closed.
    pub probed: usize,
}

/// Starts the maintenance thread. It exits when `stop` disconnects, the pool
/// is closed, or the pool has been dropped.
pub(crate) fn spawn<C: Conn>(
    pool: Weak<PoolInner<C>>,
    interval: Duration,
    stop: Receiver<()>,
) -> io::Result<JoinHandle<()>> {
    let interval = if interval.is_zero() {
        Duration::from_millis(1)
    } else {
        interval
    };

    std::thread::Builder::new()
        .name("hkv-pool-maintenance".into())
        .spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let Some(pool) = pool.upgrade() else { break };
                        if pool.is_closed() {
                            break;
                        }
                        pool.maintain();
                    }
                    recv(stop) -> _ => break,
                }
            }
            debug!("maintenance thread stopped");
        })
}

impl<C: Conn> PoolInner<C> {
    /// One tick: excess eviction, then keepalive probing.
    pub(crate) fn maintain(&self) -> TickReport {
        let mut state = self.maintenance_state().lock();
        let evicted = self.evict_idle_excess(&mut state);
        let probed = self.probe_idle();
        TickReport { evicted, probed }
    }

    fn evict_idle_excess(&self, state: &mut MaintenanceState) -> bool {
        if self.idle_count() <= self.max_idle() {
            state.over_ticks = 0;
            return false;
        }

        state.over_ticks = state.over_ticks.saturating_add(1);
        if state.over_ticks <= self.idle_life_ticks() {
            return false;
        }
        state.over_ticks = 0;

        match self.pop_idle() {
            Ok(Some(conn)) => {
                self.discard(conn);
                debug!(idle = self.idle_count(), "evicted excess idle connection");
                true
            }
            _ => false,
        }
    }

    fn probe_idle(&self) -> usize {
        let budget = self.idle_count() / self.ping_period() + 1;
        let mut probed = 0;
        while probed < budget {
            let Ok(Some(mut conn)) = self.pop_idle() else { break };
            if let Err(err) = conn.exec("PING", &[]) {
                trace!(error = %err, "keepalive probe failed");
            }
            self.discard(conn);
            probed += 1;
        }
        if probed > 0 {
            trace!(probed, "renewed idle connections");
        }
        probed
    }
}
