//! Handle-based surface over connections and statements.
//!
//! Hosts that cannot hold Rust references (foreign runtimes, C callers)
//! address resources through plain integers. Each [`DbHandle`] and
//! [`StmtHandle`] resolves through a generational registry, so a closed,
//! finalized or forged handle fails with [`Error::StaleHandle`] instead of
//! touching freed memory.

use crate::callback::{TraceCallback, TraceMask};
use crate::config::{DatabaseConfig, OpenFlags};
use crate::connection::Connection;
use crate::context::{FunctionContext, ValueRef};
use crate::registry::{Handle, Registry};
use crate::statement::{Statement, StepResult};
use sqlbridge_core::{Error, HandleKind, Result, StaleHandleError, Value};
use std::cmp::Ordering;

/// Opaque reference to an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DbHandle(Handle);

/// Opaque reference to a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtHandle(Handle);

impl DbHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(Handle::from_raw(raw))
    }

    pub const fn as_raw(self) -> u64 {
        self.0.as_raw()
    }
}

impl StmtHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(Handle::from_raw(raw))
    }

    pub const fn as_raw(self) -> u64 {
        self.0.as_raw()
    }
}

struct StatementSlot {
    statement: Statement,
    owner: DbHandle,
    /// Set once a step reported completion; cleared by reset.
    done: bool,
}

/// Registry of every connection and statement opened through handles.
///
/// Dropping the bridge finalizes all statements before closing their
/// connections.
#[derive(Default)]
pub struct Bridge {
    // Declared first so statements drop before connections.
    statements: Registry<StatementSlot>,
    connections: Registry<Connection>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("connections", &self.connections.len())
            .field("statements", &self.statements.len())
            .finish()
    }
}

fn stale_db(db: DbHandle) -> Error {
    Error::StaleHandle(StaleHandleError {
        kind: HandleKind::Connection,
        handle: db.as_raw(),
    })
}

fn stale_stmt(stmt: StmtHandle) -> Error {
    Error::StaleHandle(StaleHandleError {
        kind: HandleKind::Statement,
        handle: stmt.as_raw(),
    })
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    fn connection(&self, db: DbHandle) -> Result<&Connection> {
        self.connections.get(db.0).ok_or_else(|| stale_db(db))
    }

    fn connection_mut(&mut self, db: DbHandle) -> Result<&mut Connection> {
        self.connections.get_mut(db.0).ok_or_else(|| stale_db(db))
    }

    fn slot(&self, stmt: StmtHandle) -> Result<&StatementSlot> {
        self.statements.get(stmt.0).ok_or_else(|| stale_stmt(stmt))
    }

    /// Run `op` on a statement. If the statement ends up finalized (a failed
    /// step finalizes it) its handle is retired.
    fn with_statement<T>(
        &mut self,
        stmt: StmtHandle,
        op: impl FnOnce(&mut StatementSlot) -> Result<T>,
    ) -> Result<T> {
        let slot = self
            .statements
            .get_mut(stmt.0)
            .ok_or_else(|| stale_stmt(stmt))?;
        let outcome = op(slot);
        if slot.statement.is_finalized() {
            self.statements.remove(stmt.0);
        }
        outcome
    }

    // Database operations

    /// Open a database and return its handle.
    pub fn open(&mut self, path: &str, flags: OpenFlags, busy_timeout_ms: u32) -> Result<DbHandle> {
        let config = DatabaseConfig::file(path)
            .flags(flags)
            .busy_timeout(busy_timeout_ms);
        self.open_with(&config)
    }

    pub fn open_with(&mut self, config: &DatabaseConfig) -> Result<DbHandle> {
        let conn = Connection::open(config)?;
        Ok(DbHandle(self.connections.insert(conn)))
    }

    /// Close a connection. Refused with [`Error::Close`] while statements
    /// prepared on it are live; the handle stays valid in that case.
    pub fn close(&mut self, db: DbHandle) -> Result<()> {
        self.connection_mut(db)?.close()?;
        self.connections.remove(db.0);
        Ok(())
    }

    pub fn is_read_only(&self, db: DbHandle) -> Result<bool> {
        self.connection(db)?.is_read_only()
    }

    pub fn get_autocommit(&self, db: DbHandle) -> Result<bool> {
        self.connection(db)?.get_autocommit()
    }

    pub fn exec(&self, db: DbHandle, sql: &str) -> Result<()> {
        self.connection(db)?.exec(sql)
    }

    pub fn exec_for_double(&self, db: DbHandle, sql: &str) -> Result<f64> {
        self.connection(db)?.exec_for_double(sql)
    }

    pub fn prepare(&mut self, db: DbHandle, sql: &str) -> Result<StmtHandle> {
        let statement = self.connection(db)?.prepare(sql)?;
        Ok(StmtHandle(self.statements.insert(StatementSlot {
            statement,
            owner: db,
            done: false,
        })))
    }

    pub fn set_trace(
        &mut self,
        db: DbHandle,
        callback: Option<TraceCallback>,
        mask: TraceMask,
    ) -> Result<()> {
        self.connection_mut(db)?.set_trace(callback, mask)
    }

    pub fn create_collation<F>(&self, db: DbHandle, name: &str, compare: F) -> Result<()>
    where
        F: Fn(&[u8], &[u8]) -> Result<Ordering> + Send + 'static,
    {
        self.connection(db)?.create_collation(name, compare)
    }

    pub fn create_function<F>(&self, db: DbHandle, name: &str, arity: i32, function: F) -> Result<()>
    where
        F: Fn(&mut FunctionContext<'_>, &[ValueRef<'_>]) -> Result<()> + Send + 'static,
    {
        self.connection(db)?.create_function(name, arity, function)
    }

    /// Statement handles prepared on `db` that are still live.
    pub fn statements_of(&self, db: DbHandle) -> Vec<StmtHandle> {
        self.statements
            .handles()
            .into_iter()
            .filter(|h| self.statements.get(*h).is_some_and(|s| s.owner == db))
            .map(StmtHandle)
            .collect()
    }

    /// Finalize every statement prepared on `db`, then close it.
    pub fn close_all(&mut self, db: DbHandle) -> Result<()> {
        self.connection(db)?;
        let dropped = self.statements.drain_where(|s| s.owner == db);
        tracing::debug!(count = dropped.len(), "Finalizing statements before close");
        drop(dropped);
        self.close(db)
    }

    // Statement operations

    pub fn bind_null(&mut self, stmt: StmtHandle, index: i32) -> Result<()> {
        self.with_statement(stmt, |s| s.statement.bind_null(index))
    }

    pub fn bind_integer(&mut self, stmt: StmtHandle, index: i32, value: i64) -> Result<()> {
        self.with_statement(stmt, |s| s.statement.bind_integer(index, value))
    }

    pub fn bind_real(&mut self, stmt: StmtHandle, index: i32, value: f64) -> Result<()> {
        self.with_statement(stmt, |s| s.statement.bind_real(index, value))
    }

    pub fn bind_text(&mut self, stmt: StmtHandle, index: i32, value: &str) -> Result<()> {
        self.with_statement(stmt, |s| s.statement.bind_text(index, value))
    }

    pub fn bind_blob(&mut self, stmt: StmtHandle, index: i32, value: &[u8]) -> Result<()> {
        self.with_statement(stmt, |s| s.statement.bind_blob(index, value))
    }

    pub fn bind_value(&mut self, stmt: StmtHandle, index: i32, value: &Value) -> Result<()> {
        self.with_statement(stmt, |s| s.statement.bind_value(index, value))
    }

    pub fn clear_bindings(&mut self, stmt: StmtHandle) -> Result<()> {
        self.with_statement(stmt, |s| {
            s.done = false;
            s.statement.clear_bindings()
        })
    }

    /// Run an INSERT. A failure finalizes the statement and retires its handle.
    pub fn execute_insert(&mut self, stmt: StmtHandle) -> Result<i64> {
        self.with_statement(stmt, |s| s.statement.execute_insert())
    }

    /// Run an UPDATE or DELETE. A failure finalizes the statement and retires
    /// its handle.
    pub fn execute_update_delete(&mut self, stmt: StmtHandle) -> Result<i32> {
        self.with_statement(stmt, |s| s.statement.execute_update_delete())
    }

    pub fn reset(&mut self, stmt: StmtHandle) -> Result<()> {
        self.with_statement(stmt, |s| {
            s.done = false;
            s.statement.reset()
        })
    }

    pub fn finalize(&mut self, stmt: StmtHandle) -> Result<()> {
        let mut slot = self
            .statements
            .remove(stmt.0)
            .ok_or_else(|| stale_stmt(stmt))?;
        slot.statement.finalize()
    }

    pub fn sql(&self, stmt: StmtHandle) -> Result<String> {
        self.slot(stmt)?.statement.sql()
    }

    pub fn expanded_sql(&self, stmt: StmtHandle) -> Result<Option<String>> {
        self.slot(stmt)?.statement.expanded_sql()
    }

    // Cursor operations

    /// Advance the statement. After completion further calls keep returning
    /// [`StepResult::Done`] until the statement is reset.
    pub fn step(&mut self, stmt: StmtHandle) -> Result<StepResult> {
        self.with_statement(stmt, |s| {
            if s.done {
                return Ok(StepResult::Done);
            }
            let result = s.statement.step()?;
            s.done = result == StepResult::Done;
            Ok(result)
        })
    }

    pub fn column_count(&self, stmt: StmtHandle) -> Result<usize> {
        self.slot(stmt)?.statement.column_count()
    }

    pub fn column_name(&self, stmt: StmtHandle, index: usize) -> Result<String> {
        self.slot(stmt)?.statement.column_name(index)
    }

    pub fn column_long(&self, stmt: StmtHandle, index: usize) -> Result<i64> {
        self.slot(stmt)?.statement.column_long(index)
    }

    pub fn column_double(&self, stmt: StmtHandle, index: usize) -> Result<f64> {
        self.slot(stmt)?.statement.column_double(index)
    }

    pub fn column_string(&self, stmt: StmtHandle, index: usize) -> Result<Option<String>> {
        self.slot(stmt)?.statement.column_string(index)
    }

    pub fn column_blob(&self, stmt: StmtHandle, index: usize) -> Result<Vec<u8>> {
        self.slot(stmt)?.statement.column_blob(index)
    }

    pub fn column_value(&self, stmt: StmtHandle, index: usize) -> Result<Value> {
        self.slot(stmt)?.statement.column_value(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(bridge: &mut Bridge) -> DbHandle {
        bridge
            .open(":memory:", OpenFlags::create_read_write(), 0)
            .unwrap()
    }

    #[test]
    fn handles_go_stale_after_release() {
        let mut bridge = Bridge::new();
        let db = memory(&mut bridge);
        let stmt = bridge.prepare(db, "SELECT 1").unwrap();
        bridge.finalize(stmt).unwrap();

        assert!(matches!(
            bridge.step(stmt),
            Err(Error::StaleHandle(StaleHandleError {
                kind: HandleKind::Statement,
                ..
            }))
        ));
        assert!(matches!(bridge.finalize(stmt), Err(Error::StaleHandle(_))));

        bridge.close(db).unwrap();
        assert!(matches!(
            bridge.exec(db, "SELECT 1"),
            Err(Error::StaleHandle(StaleHandleError {
                kind: HandleKind::Connection,
                ..
            }))
        ));
        assert!(bridge.close(db).is_err());
        assert!(bridge.exec(DbHandle::from_raw(0xdead_beef), "SELECT 1").is_err());
    }

    #[test]
    fn close_with_live_statement_is_refused() {
        let mut bridge = Bridge::new();
        let db = memory(&mut bridge);
        let stmt = bridge.prepare(db, "SELECT 1").unwrap();

        let err = bridge.close(db).unwrap_err();
        assert!(matches!(err, Error::Close(_)));
        assert_eq!(bridge.connection_count(), 1);
        assert_eq!(bridge.statements_of(db), vec![stmt]);

        bridge.close_all(db).unwrap();
        assert_eq!(bridge.connection_count(), 0);
        assert_eq!(bridge.statement_count(), 0);
    }

    #[test]
    fn step_stays_done() {
        let mut bridge = Bridge::new();
        let db = memory(&mut bridge);
        let stmt = bridge.prepare(db, "SELECT 7").unwrap();
        assert_eq!(bridge.step(stmt).unwrap(), StepResult::Row);
        assert_eq!(bridge.column_long(stmt, 0).unwrap(), 7);
        assert_eq!(bridge.step(stmt).unwrap(), StepResult::Done);
        assert_eq!(bridge.step(stmt).unwrap(), StepResult::Done);
        bridge.reset(stmt).unwrap();
        assert_eq!(bridge.step(stmt).unwrap(), StepResult::Row);
    }

    #[test]
    fn failed_execute_retires_statement() {
        let mut bridge = Bridge::new();
        let db = memory(&mut bridge);
        bridge
            .exec(db, "CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();
        let stmt = bridge.prepare(db, "INSERT INTO t (id) VALUES (?)").unwrap();
        bridge.bind_integer(stmt, 1, 1).unwrap();
        assert_eq!(bridge.execute_insert(stmt).unwrap(), 1);

        // Same id again: unique violation finalizes the statement.
        let err = bridge.execute_insert(stmt).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(bridge.statement_count(), 0);
        assert!(matches!(bridge.execute_insert(stmt), Err(Error::StaleHandle(_))));
        bridge.close(db).unwrap();
    }
}
