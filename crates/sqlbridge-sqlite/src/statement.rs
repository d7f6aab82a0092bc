//! Prepared statements.
//!
//! A [`Statement`] owns its native handle outright. It does not borrow the
//! [`Connection`](crate::Connection) it came from: dropping a connection
//! with live statements defers the real close until the last statement is
//! finalized, and an explicit close is refused while statements exist.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

use crate::callback;
use crate::cursor::Cursor;
use crate::error::{bind_error, step_error};
use crate::ffi;
use crate::types;
use sqlbridge_core::{Error, MisuseError, MisuseKind, Result, Row, Value, ValueType};
use std::ffi::c_int;
use std::ptr;
use std::sync::Arc;

/// Outcome of one successful `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available.
    Row,
    /// The statement ran to completion.
    Done,
}

/// A compiled SQL statement.
pub struct Statement {
    stmt: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql: String,
}

// SAFETY: the owning connection was opened with SQLITE_OPEN_FULLMUTEX, so
// stepping here and using the connection on another thread are serialized by
// the engine's handle mutex.
unsafe impl Send for Statement {}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("finalized", &self.stmt.is_null())
            .finish()
    }
}

impl Statement {
    pub(crate) fn new(stmt: *mut ffi::sqlite3_stmt, db: *mut ffi::sqlite3, sql: String) -> Self {
        Self { stmt, db, sql }
    }

    fn raw(&self) -> Result<*mut ffi::sqlite3_stmt> {
        if self.stmt.is_null() {
            Err(Error::statement_finalized())
        } else {
            Ok(self.stmt)
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.stmt.is_null()
    }

    /// Text this statement was compiled from (trailing SQL excluded).
    pub fn sql(&self) -> Result<String> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live; the returned text is owned by stmt
        Ok(unsafe { ffi::to_owned_string(ffi::sqlite3_sql(stmt)) }.unwrap_or_default())
    }

    /// Statement text with the current bindings interpolated.
    pub fn expanded_sql(&self) -> Result<Option<String>> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live; no fallback text is needed here
        Ok(unsafe { callback::expanded_sql(stmt, ptr::null()) })
    }

    /// Number of SQL parameters.
    pub fn parameter_count(&self) -> Result<usize> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let n = unsafe { ffi::sqlite3_bind_parameter_count(stmt) };
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn check_bind(&self, index: c_int, rc: c_int) -> Result<()> {
        tracing::trace!(index, rc, "bind");
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(bind_error(self.db, rc, index))
        }
    }

    /// Bind NULL to a 1-based parameter.
    pub fn bind_null(&mut self, index: i32) -> Result<()> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_bind_null(stmt, index) };
        self.check_bind(index, rc)
    }

    pub fn bind_integer(&mut self, index: i32, value: i64) -> Result<()> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_bind_int64(stmt, index, value) };
        self.check_bind(index, rc)
    }

    pub fn bind_real(&mut self, index: i32, value: f64) -> Result<()> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_bind_double(stmt, index, value) };
        self.check_bind(index, rc)
    }

    /// Bind text by byte length; embedded NULs are kept.
    pub fn bind_text(&mut self, index: i32, value: &str) -> Result<()> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { types::bind_text(stmt, index, value.as_bytes()) };
        self.check_bind(index, rc)
    }

    pub fn bind_blob(&mut self, index: i32, value: &[u8]) -> Result<()> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { types::bind_blob(stmt, index, value) };
        self.check_bind(index, rc)
    }

    pub fn bind_value(&mut self, index: i32, value: &Value) -> Result<()> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { types::bind_value(stmt, index, value) };
        self.check_bind(index, rc)
    }

    /// Bind `values` to parameters 1..=n.
    pub fn bind_all(&mut self, values: &[Value]) -> Result<()> {
        for (i, value) in values.iter().enumerate() {
            let index = c_int::try_from(i + 1)
                .map_err(|_| Error::invalid_argument("too many parameters"))?;
            self.bind_value(index, value)?;
        }
        Ok(())
    }

    /// Advance the statement.
    ///
    /// Any status other than a row or completion finalizes the statement and
    /// is returned as [`Error::Step`]. Busy and locked results arrive only
    /// after the connection's busy timeout has elapsed and are not retried.
    pub fn step(&mut self) -> Result<StepResult> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        tracing::trace!(rc, sql = %self.sql, "step");
        match rc {
            ffi::SQLITE_ROW => Ok(StepResult::Row),
            ffi::SQLITE_DONE => Ok(StepResult::Done),
            _ => Err(self.fail(rc)),
        }
    }

    /// Capture the engine's error for `rc`, then finalize.
    fn fail(&mut self, rc: c_int) -> Error {
        let err = step_error(self.db, rc, &self.sql);
        tracing::debug!(error = %err, "Statement failed; finalizing");
        self.release();
        err
    }

    /// Run an INSERT and return the last inserted rowid.
    ///
    /// On success the statement is reset so it can be rebound and run again.
    pub fn execute_insert(&mut self) -> Result<i64> {
        self.execute_once()?;
        // SAFETY: db outlives every statement prepared on it
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(self.db) })
    }

    /// Run an UPDATE or DELETE and return the number of changed rows.
    pub fn execute_update_delete(&mut self) -> Result<i32> {
        self.execute_once()?;
        // SAFETY: db outlives every statement prepared on it
        Ok(unsafe { ffi::sqlite3_changes(self.db) })
    }

    fn execute_once(&mut self) -> Result<()> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        tracing::trace!(rc, sql = %self.sql, "execute");
        if rc != ffi::SQLITE_DONE {
            return Err(self.fail(rc));
        }
        // SAFETY: stmt is live; reset after DONE cannot fail
        unsafe { ffi::sqlite3_reset(stmt) };
        Ok(())
    }

    /// Start iterating result rows.
    pub fn execute_select(&mut self) -> Result<Cursor<'_>> {
        self.raw()?;
        Ok(Cursor::new(self))
    }

    /// Rewind the statement; bindings are kept.
    pub fn reset(&mut self) -> Result<()> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_reset(stmt) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(step_error(self.db, rc, &self.sql))
        }
    }

    /// Reset the statement and set every parameter back to NULL.
    pub fn clear_bindings(&mut self) -> Result<()> {
        self.reset()?;
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        unsafe { ffi::sqlite3_clear_bindings(stmt) };
        Ok(())
    }

    /// Release the native statement. A second call fails with
    /// [`MisuseKind::StatementFinalized`].
    pub fn finalize(&mut self) -> Result<()> {
        self.raw()?;
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        if self.stmt.is_null() {
            return;
        }
        // SAFETY: stmt is live and never used again after this
        unsafe { ffi::sqlite3_finalize(self.stmt) };
        self.stmt = ptr::null_mut();
        tracing::debug!(sql = %self.sql, "Finalized statement");
    }

    pub fn column_count(&self) -> Result<usize> {
        let stmt = self.raw()?;
        // SAFETY: stmt is live
        let n = unsafe { ffi::sqlite3_column_count(stmt) };
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Validate a 0-based column index against the result width.
    fn column(&self, index: usize) -> Result<(*mut ffi::sqlite3_stmt, c_int)> {
        let count = self.column_count()?;
        if index >= count {
            return Err(Error::Misuse(MisuseError::new(
                MisuseKind::ColumnOutOfRange,
                format!("column index {index} out of range (count {count})"),
            )));
        }
        Ok((self.stmt, index as c_int))
    }

    pub fn column_name(&self, index: usize) -> Result<String> {
        let (stmt, i) = self.column(index)?;
        // SAFETY: stmt is live and i is in range
        Ok(unsafe { types::column_name(stmt, i) }.unwrap_or_default())
    }

    /// Names of all result columns.
    pub fn column_names(&self) -> Result<Vec<String>> {
        (0..self.column_count()?)
            .map(|i| self.column_name(i))
            .collect()
    }

    pub fn column_type(&self, index: usize) -> Result<ValueType> {
        let (stmt, i) = self.column(index)?;
        // SAFETY: stmt is live and i is in range
        Ok(types::value_type_from_code(unsafe {
            ffi::sqlite3_column_type(stmt, i)
        }))
    }

    pub fn column_long(&self, index: usize) -> Result<i64> {
        let (stmt, i) = self.column(index)?;
        // SAFETY: stmt is live and i is in range
        Ok(unsafe { ffi::sqlite3_column_int64(stmt, i) })
    }

    pub fn column_double(&self, index: usize) -> Result<f64> {
        let (stmt, i) = self.column(index)?;
        // SAFETY: stmt is live and i is in range
        Ok(unsafe { ffi::sqlite3_column_double(stmt, i) })
    }

    /// Text of a column, `None` for NULL. Invalid UTF-8 is replaced.
    pub fn column_string(&self, index: usize) -> Result<Option<String>> {
        Ok(self
            .column_text_bytes(index)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Exact text bytes of a column, `None` for NULL.
    pub fn column_text_bytes(&self, index: usize) -> Result<Option<Vec<u8>>> {
        let (stmt, i) = self.column(index)?;
        // SAFETY: stmt is live and i is in range
        Ok(unsafe { types::column_text_bytes(stmt, i) })
    }

    /// Blob bytes of a column; NULL reads as empty.
    pub fn column_blob(&self, index: usize) -> Result<Vec<u8>> {
        let (stmt, i) = self.column(index)?;
        // SAFETY: stmt is live and i is in range
        Ok(unsafe { types::column_blob(stmt, i) })
    }

    pub fn column_value(&self, index: usize) -> Result<Value> {
        let (stmt, i) = self.column(index)?;
        // SAFETY: stmt is live and i is in range
        Ok(unsafe { types::read_column(stmt, i) })
    }

    /// Copy the current row.
    pub(crate) fn read_row(&self, columns: &Arc<[String]>) -> Result<Row> {
        let stmt = self.raw()?;
        let values = (0..columns.len())
            // SAFETY: stmt is live and every index is below column_count
            .map(|i| unsafe { types::read_column(stmt, i as c_int) })
            .collect();
        Ok(Row::new(Arc::clone(columns), values))
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        self.release();
    }
}
