//! # Connection Handle
//!
//! A checked-out connection. Every call is delegated to the underlying
//! connection until one fails; that first failure becomes the handle's
//! terminal error and is returned from every later call without touching the
//! socket. The connection goes back to its pool on `close` or on drop, or is
//! discarded if it failed or the pool is gone.

use std::sync::Weak;

use hkv_conn::{Conn, ConnError, ConnResult, Value};

use crate::command::{Command, Commands};
use crate::error::{PoolError, PoolResult};
use crate::pool::{return_to, PoolInner};
use crate::reply::Reply;

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConn<C: Conn> {
    /// Always `Some` until released.
    conn: Option<C>,
    /// Only used to give the connection back, never to keep the pool alive.
    pool: Weak<PoolInner<C>>,
    err: Option<ConnError>,
}

impl<C: Conn> PooledConn<C> {
    pub(crate) fn new(conn: C, pool: Weak<PoolInner<C>>) -> Self {
        PooledConn {
            conn: Some(conn),
            pool,
            err: None,
        }
    }

    /// Sends one command and waits for its reply.
    pub fn exec(&mut self, command: &str, args: &[&[u8]]) -> PoolResult<Value> {
        self.call(|conn| conn.exec(command, args))
    }

    /// Queues a command for a later `flush`.
    pub fn send(&mut self, command: &str, args: &[&[u8]]) -> PoolResult<()> {
        self.call(|conn| conn.send(command, args))
    }

    pub fn flush(&mut self) -> PoolResult<()> {
        self.call(|conn| conn.flush())
    }

    /// Reads the next pending reply.
    pub fn receive(&mut self) -> PoolResult<Value> {
        self.call(|conn| conn.receive())
    }

    /// Runs a command and normalizes the outcome into a `Reply`.
    pub fn command(&mut self, command: &str, args: &[&[u8]]) -> Reply {
        Reply::from_result(self.exec(command, args))
    }

    /// Runs a prepared `Command`.
    pub fn exec_command(&mut self, command: &Command) -> PoolResult<Value> {
        self.exec(command.name(), &command.arg_slices())
    }

    /// Sends every command, flushes once, then reads one reply per command
    /// in order.
    pub fn pipeline(&mut self, commands: &Commands) -> PoolResult<Vec<Value>> {
        for command in commands.iter() {
            self.send(command.name(), &command.arg_slices())?;
        }
        self.flush()?;
        commands.iter().map(|_| self.receive()).collect()
    }

    /// Terminal error of this handle, or the connection's own failure.
    pub fn err(&self) -> Option<&ConnError> {
        self.err
            .as_ref()
            .or_else(|| self.conn.as_ref().and_then(|conn| conn.err()))
    }

    /// Borrows the underlying connection.
    pub fn get_ref(&self) -> Option<&C> {
        self.conn.as_ref()
    }

    /// Releases the handle back to its pool.
    pub fn close(mut self) {
        self.release();
    }

    fn call<T>(&mut self, op: impl FnOnce(&mut C) -> ConnResult<T>) -> PoolResult<T> {
        if let Some(err) = &self.err {
            return Err(PoolError::Conn(err.clone()));
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(PoolError::Conn(ConnError::Closed));
        };
        op(conn).map_err(|err| {
            self.err = Some(err.clone());
            PoolError::Conn(err)
        })
    }

    fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            return_to(&self.pool, conn, self.err.is_some());
        }
    }
}

impl<C: Conn> Drop for PooledConn<C> {
    fn drop(&mut self) {
        self.release();
    }
}
