//! Database connections.
//!
//! A [`Connection`] owns one native handle plus the trace registration
//! installed on it. Collation and function registrations are owned by the
//! engine once installed and released through their destroy hooks.
//!
//! ```rust,ignore
//! use sqlbridge_sqlite::{Connection, TraceEvent, TraceMask};
//!
//! let mut conn = Connection::open_memory()?;
//! conn.set_trace(
//!     Some(Box::new(|event: &TraceEvent| {
//!         println!("{event:?}");
//!         Ok(())
//!     })),
//!     TraceMask::STATEMENT,
//! )?;
//! conn.exec("CREATE TABLE t (x)")?;
//! ```

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]

use crate::callback::{
    self, CollationRegistration, ExecRow, ExecState, FunctionRegistration, TraceCallback,
    TraceMask, TraceRegistration,
};
use crate::config::DatabaseConfig;
use crate::context::{FunctionContext, ValueRef};
use crate::error::{close_error, exec_error, native_error, open_error, prepare_error, runtime_error};
use crate::ffi;
use crate::runtime;
use crate::statement::{Statement, StepResult};
use sqlbridge_core::{Error, NativeError, Result};
use std::cmp::Ordering;
use std::ffi::{CString, c_int, c_void};
use std::ops::ControlFlow;
use std::ptr;

/// Locking behavior of `BEGIN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionBehavior {
    /// Locks are taken on first read/write.
    #[default]
    Deferred,
    /// A write lock is taken immediately.
    Immediate,
    /// No other connection may read or write until commit.
    Exclusive,
}

impl TransactionBehavior {
    fn begin_sql(self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// A connection to a SQLite database.
pub struct Connection {
    db: *mut ffi::sqlite3,
    path: String,
    trace: Option<Box<TraceRegistration>>,
}

// SAFETY: every handle is opened with SQLITE_OPEN_FULLMUTEX, so the engine
// serializes all entry into it, including from statements moved to other
// threads. Registered callbacks therefore never run concurrently.
unsafe impl Send for Connection {}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("closed", &self.db.is_null())
            .field("trace", &self.trace.as_ref().map(|t| t.mask))
            .finish()
    }
}

/// Release a handle on a failed open.
fn abandon(db: *mut ffi::sqlite3) {
    if !db.is_null() {
        // SAFETY: db came from open_v2 and has no statements yet
        unsafe { ffi::sqlite3_close(db) };
    }
}

impl Connection {
    /// Open a database.
    ///
    /// Fails if the engine cannot open the path, if a writable open was
    /// requested but the database is read-only, or if the busy timeout
    /// cannot be applied. No native handle outlives a failed open.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        runtime::global();

        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Open(NativeError::new(
                ffi::SQLITE_MISUSE,
                "Invalid path: contains null byte",
            ))
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &raw mut db, flags, ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let err = open_error(db, rc, &config.path);
            abandon(db);
            tracing::debug!(path = %config.path, error = %err, "Failed to open database");
            return Err(err);
        }

        // SAFETY: db is valid
        let read_only = unsafe { ffi::sqlite3_db_readonly(db, c"main".as_ptr()) } == 1;
        if config.flags.wants_write() && read_only {
            abandon(db);
            return Err(Error::Open(NativeError::new(
                ffi::SQLITE_READONLY,
                "Could not open the database in read/write mode.",
            )));
        }

        let timeout = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
        // SAFETY: db is valid
        let rc = unsafe { ffi::sqlite3_busy_timeout(db, timeout) };
        if rc != ffi::SQLITE_OK {
            let mut native = native_error(db, rc);
            native.message = format!("Could not set busy timeout: {}", native.message);
            abandon(db);
            return Err(Error::Open(native));
        }

        tracing::debug!(
            path = %config.path,
            flags,
            busy_timeout_ms = config.busy_timeout_ms,
            "Opened SQLite database"
        );

        Ok(Self {
            db,
            path: config.path.clone(),
            trace: None,
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&DatabaseConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.db.is_null()
    }

    fn raw(&self) -> Result<*mut ffi::sqlite3> {
        if self.db.is_null() {
            Err(Error::connection_closed())
        } else {
            Ok(self.db)
        }
    }

    /// Is the main database read-only?
    pub fn is_read_only(&self) -> Result<bool> {
        let db = self.raw()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_db_readonly(db, c"main".as_ptr()) } == 1)
    }

    /// Is the connection in autocommit mode (no open transaction)?
    pub fn get_autocommit(&self) -> Result<bool> {
        let db = self.raw()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_get_autocommit(db) } != 0)
    }

    pub fn in_transaction(&self) -> Result<bool> {
        Ok(!self.get_autocommit()?)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let db = self.raw()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(db) })
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> Result<i32> {
        let db = self.raw()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_changes(db) })
    }

    fn c_sql(sql: &str) -> Result<CString> {
        CString::new(sql).map_err(|_| {
            Error::Exec(NativeError::new(ffi::SQLITE_MISUSE, "SQL contains null byte").with_sql(sql))
        })
    }

    /// Execute one or more SQL statements, discarding any rows.
    pub fn exec(&self, sql: &str) -> Result<()> {
        let db = self.raw()?;
        let c_sql = Self::c_sql(sql)?;

        // SAFETY: All pointers are valid
        let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), ptr::null_mut()) };
        tracing::trace!(rc, sql, "exec");
        if rc != ffi::SQLITE_OK {
            return Err(exec_error(db, rc, sql));
        }
        Ok(())
    }

    /// Execute SQL, handing each result row to `callback`.
    ///
    /// Returning [`ControlFlow::Break`] stops execution early; that is not an
    /// error. A panicking callback aborts the exec and its panic is returned
    /// as [`Error::Callback`].
    pub fn exec_with<F>(&self, sql: &str, mut callback: F) -> Result<()>
    where
        F: FnMut(&ExecRow) -> ControlFlow<()>,
    {
        let db = self.raw()?;
        let c_sql = Self::c_sql(sql)?;
        let mut state = ExecState {
            callback: &mut callback,
            stopped: false,
            failure: None,
        };

        // SAFETY: state lives on this frame for the whole call
        let rc = unsafe {
            ffi::sqlite3_exec(
                db,
                c_sql.as_ptr(),
                Some(callback::exec_trampoline),
                (&raw mut state).cast::<c_void>(),
                ptr::null_mut(),
            )
        };
        if let Some(failure) = state.failure {
            return Err(failure);
        }
        if rc == ffi::SQLITE_OK || (rc == ffi::SQLITE_ABORT && state.stopped) {
            Ok(())
        } else {
            Err(exec_error(db, rc, sql))
        }
    }

    /// Run a query and return the first column of its first row as a double,
    /// or `0.0` when it returns no rows.
    pub fn exec_for_double(&self, sql: &str) -> Result<f64> {
        let mut stmt = self.prepare(sql)?;
        let value = match stmt.step()? {
            StepResult::Row => stmt.column_double(0)?,
            StepResult::Done => 0.0,
        };
        stmt.finalize()?;
        Ok(value)
    }

    /// Compile the first statement in `sql`; trailing text is ignored.
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        let db = self.raw()?;
        let len = c_int::try_from(sql.len()).map_err(|_| prepare_error(db, ffi::SQLITE_TOOBIG, sql))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: sql is valid for len bytes; no NUL terminator is needed
        // when the length is given
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, sql.as_ptr().cast(), len, &raw mut stmt, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            return Err(prepare_error(db, rc, sql));
        }
        if stmt.is_null() {
            return Err(Error::Prepare(
                NativeError::new(ffi::SQLITE_MISUSE, "SQL contains no statement").with_sql(sql),
            ));
        }
        tracing::debug!(sql, "Prepared statement");
        Ok(Statement::new(stmt, db, sql.to_string()))
    }

    /// Install, replace or remove (`None`) the trace hook.
    ///
    /// The previous hook is uninstalled and released before the new one goes
    /// in. An empty mask removes the hook.
    pub fn set_trace(&mut self, callback: Option<TraceCallback>, mask: TraceMask) -> Result<()> {
        let db = self.raw()?;
        if let Some(old) = self.trace.take() {
            // SAFETY: db is valid; clearing the hook cannot fail
            unsafe { ffi::sqlite3_trace_v2(db, 0, None, ptr::null_mut()) };
            drop(old);
        }
        let Some(callback) = callback else {
            return Ok(());
        };
        if mask.is_empty() {
            return Ok(());
        }

        let registration = Box::new(TraceRegistration { callback, mask });
        let user = ptr::from_ref::<TraceRegistration>(&registration)
            .cast_mut()
            .cast::<c_void>();
        // SAFETY: the registration is kept alive in self.trace for as long as
        // the hook is installed
        let rc = unsafe {
            ffi::sqlite3_trace_v2(db, mask.bits(), Some(callback::trace_trampoline), user)
        };
        if rc != ffi::SQLITE_OK {
            return Err(runtime_error(db, rc, "Could not install trace hook"));
        }
        tracing::debug!(mask = ?mask, "Installed trace hook");
        self.trace = Some(registration);
        Ok(())
    }

    /// Register a collation comparing raw UTF-8 bytes.
    ///
    /// If `compare` fails or panics, the two inputs are compared byte-wise
    /// instead.
    pub fn create_collation<F>(&self, name: &str, compare: F) -> Result<()>
    where
        F: Fn(&[u8], &[u8]) -> Result<Ordering> + Send + 'static,
    {
        let db = self.raw()?;
        let c_name = CString::new(name)
            .map_err(|_| Error::invalid_argument("collation name contains null byte"))?;
        let boxed = Box::into_raw(Box::new(CollationRegistration {
            name: name.to_string(),
            compare,
        }));

        // SAFETY: boxed is released either by the engine's destroy hook or
        // below, never both
        let rc = unsafe {
            ffi::sqlite3_create_collation_v2(
                db,
                c_name.as_ptr(),
                ffi::SQLITE_UTF8,
                boxed.cast(),
                Some(callback::compare_trampoline::<F>),
                Some(callback::destroy_boxed::<CollationRegistration<F>>),
            )
        };
        if rc != ffi::SQLITE_OK {
            // The engine does not run xDestroy when collation registration fails.
            // SAFETY: boxed was not taken over by the engine
            unsafe { callback::destroy_boxed::<CollationRegistration<F>>(boxed.cast()) };
            return Err(runtime_error(db, rc, &format!("Could not create collation '{name}'")));
        }
        tracing::debug!(name, "Created collation");
        Ok(())
    }

    /// Register a collation over text. Inputs that are not valid UTF-8 fall
    /// back to byte-wise comparison.
    pub fn create_collation_str<F>(&self, name: &str, compare: F) -> Result<()>
    where
        F: Fn(&str, &str) -> Ordering + Send + 'static,
    {
        self.create_collation(name, move |lhs, rhs| {
            let lhs = std::str::from_utf8(lhs).map_err(|e| Error::Custom(e.to_string()))?;
            let rhs = std::str::from_utf8(rhs).map_err(|e| Error::Custom(e.to_string()))?;
            Ok(compare(lhs, rhs))
        })
    }

    /// Register a scalar SQL function. `arity` of -1 accepts any number of
    /// arguments; otherwise it is capped by the connection's
    /// `SQLITE_LIMIT_FUNCTION_ARG`.
    ///
    /// If `function` fails or panics the call returns NULL.
    pub fn create_function<F>(&self, name: &str, arity: i32, function: F) -> Result<()>
    where
        F: Fn(&mut FunctionContext<'_>, &[ValueRef<'_>]) -> Result<()> + Send + 'static,
    {
        let db = self.raw()?;
        // SAFETY: db is valid; a negative new value only reads the limit
        let max_args = unsafe { ffi::sqlite3_limit(db, ffi::SQLITE_LIMIT_FUNCTION_ARG, -1) };
        if arity < -1 || arity > max_args {
            return Err(Error::Runtime(NativeError::new(
                ffi::SQLITE_MISUSE,
                format!("Invalid arity {arity} for function '{name}' (at most {max_args})"),
            )));
        }
        let c_name = CString::new(name)
            .map_err(|_| Error::invalid_argument("function name contains null byte"))?;
        let boxed = Box::into_raw(Box::new(FunctionRegistration {
            name: name.to_string(),
            function,
        }));

        // SAFETY: the engine owns boxed from here on and runs xDestroy even
        // when registration fails
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                db,
                c_name.as_ptr(),
                arity,
                ffi::SQLITE_UTF8,
                boxed.cast(),
                Some(callback::function_trampoline::<F>),
                None,
                None,
                Some(callback::destroy_boxed::<FunctionRegistration<F>>),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(runtime_error(db, rc, &format!("Could not create function '{name}'")));
        }
        tracing::debug!(name, arity, "Created function");
        Ok(())
    }

    /// Read `PRAGMA user_version`.
    pub fn user_version(&self) -> Result<i32> {
        let mut stmt = self.prepare("PRAGMA user_version")?;
        let version = match stmt.step()? {
            StepResult::Row => stmt.column_long(0)?,
            StepResult::Done => 0,
        };
        Ok(version as i32)
    }

    pub fn set_user_version(&self, version: i32) -> Result<()> {
        self.exec(&format!("PRAGMA user_version = {version}"))
    }

    /// Begin a deferred transaction.
    pub fn begin(&self) -> Result<()> {
        self.begin_with(TransactionBehavior::Deferred)
    }

    pub fn begin_with(&self, behavior: TransactionBehavior) -> Result<()> {
        if self.in_transaction()? {
            return Err(Error::invalid_argument("Already in a transaction"));
        }
        self.exec(behavior.begin_sql())
    }

    /// Commit the current transaction.
    pub fn commit(&self) -> Result<()> {
        if !self.in_transaction()? {
            return Err(Error::invalid_argument("Not in a transaction"));
        }
        self.exec("COMMIT")
    }

    /// Rollback the current transaction.
    pub fn rollback(&self) -> Result<()> {
        if !self.in_transaction()? {
            return Err(Error::invalid_argument("Not in a transaction"));
        }
        self.exec("ROLLBACK")
    }

    /// Close the connection.
    ///
    /// The engine refuses while statements prepared on this connection are
    /// still live; that refusal is returned as [`Error::Close`] and the
    /// connection stays open.
    pub fn close(&mut self) -> Result<()> {
        let db = self.raw()?;
        // SAFETY: db is valid; on success it must not be used again
        let rc = unsafe { ffi::sqlite3_close(db) };
        if rc != ffi::SQLITE_OK {
            let err = close_error(db, rc);
            tracing::debug!(path = %self.path, error = %err, "Close refused");
            return Err(err);
        }
        self.db = ptr::null_mut();
        // The CLOSE trace event has fired by now.
        self.trace = None;
        tracing::debug!(path = %self.path, "Closed SQLite database");
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.db.is_null() {
            return;
        }
        if self.trace.is_some() {
            // SAFETY: db is valid
            unsafe { ffi::sqlite3_trace_v2(self.db, 0, None, ptr::null_mut()) };
        }
        // Deferred close: live statements keep the handle alive until they
        // are finalized.
        // SAFETY: db is valid and not used again
        let rc = unsafe { ffi::sqlite3_close_v2(self.db) };
        if rc != ffi::SQLITE_OK {
            tracing::error!(path = %self.path, rc, "Failed to close SQLite database");
        }
        self.db = ptr::null_mut();
        self.trace = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::TraceEvent;
    use crate::config::OpenFlags;
    use sqlbridge_core::{MisuseError, MisuseKind};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_open_memory() {
        let conn = Connection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(!conn.is_read_only().unwrap());
        assert!(conn.get_autocommit().unwrap());
    }

    #[test]
    fn test_exec() {
        let conn = Connection::open_memory().unwrap();
        conn.exec("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn.exec("INSERT INTO test (name) VALUES ('Alice')").unwrap();
        assert_eq!(conn.changes().unwrap(), 1);
        assert_eq!(conn.last_insert_rowid().unwrap(), 1);
    }

    #[test]
    fn exec_error_carries_sql() {
        let conn = Connection::open_memory().unwrap();
        let err = conn.exec("INSERT INTO missing VALUES (1)").unwrap_err();
        assert!(matches!(err, Error::Exec(_)));
        assert_eq!(err.sql(), Some("INSERT INTO missing VALUES (1)"));
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn prepare_ignores_trailing_sql_and_rejects_empty() {
        let conn = Connection::open_memory().unwrap();
        let stmt = conn.prepare("SELECT 1; SELECT 2").unwrap();
        assert_eq!(stmt.sql().unwrap(), "SELECT 1;");

        let err = conn.prepare("  -- nothing here\n").unwrap_err();
        assert!(matches!(err, Error::Prepare(_)));
        assert_eq!(err.sql(), Some("  -- nothing here\n"));
    }

    #[test]
    fn exec_with_stops_on_break() {
        let conn = Connection::open_memory().unwrap();
        conn.exec("CREATE TABLE t (x); INSERT INTO t VALUES (1), (2), (NULL), (4)")
            .unwrap();

        let mut seen = Vec::new();
        conn.exec_with("SELECT x FROM t ORDER BY rowid", |row| {
            assert_eq!(row.columns(), ["x".to_string()]);
            seen.push(row.get(0).map(str::to_string));
            if seen.len() == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(seen, vec![Some("1".into()), Some("2".into()), None]);
    }

    #[test]
    fn exec_with_panic_aborts() {
        let conn = Connection::open_memory().unwrap();
        let err = conn
            .exec_with("SELECT 1 UNION ALL SELECT 2", |_| panic!("row callback"))
            .unwrap_err();
        assert!(matches!(err, Error::Callback(_)));
        // The connection is still usable afterwards.
        conn.exec("SELECT 1").unwrap();
    }

    #[test]
    fn exec_for_double_reads_first_column() {
        let conn = Connection::open_memory().unwrap();
        assert!((conn.exec_for_double("SELECT 1.5, 7").unwrap() - 1.5).abs() < f64::EPSILON);
        assert!(conn.exec_for_double("SELECT 1 WHERE 0").unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn transactions_track_autocommit() {
        let conn = Connection::open_memory().unwrap();
        conn.exec("CREATE TABLE t (x)").unwrap();
        conn.begin().unwrap();
        assert!(conn.in_transaction().unwrap());
        assert!(conn.begin().is_err());
        conn.exec("INSERT INTO t VALUES (1)").unwrap();
        conn.rollback().unwrap();
        assert!(!conn.in_transaction().unwrap());
        assert!(conn.commit().is_err());
        assert!(conn.exec_for_double("SELECT count(*) FROM t").unwrap().abs() < f64::EPSILON);

        conn.begin_with(TransactionBehavior::Immediate).unwrap();
        conn.exec("INSERT INTO t VALUES (1)").unwrap();
        conn.commit().unwrap();
        assert!((conn.exec_for_double("SELECT count(*) FROM t").unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn user_version_round_trip() {
        let conn = Connection::open_memory().unwrap();
        assert_eq!(conn.user_version().unwrap(), 0);
        conn.set_user_version(42).unwrap();
        assert_eq!(conn.user_version().unwrap(), 42);
    }

    #[test]
    fn close_refused_with_live_statement() {
        let mut conn = Connection::open_memory().unwrap();
        let mut stmt = conn.prepare("SELECT 1").unwrap();

        let err = conn.close().unwrap_err();
        assert!(matches!(err, Error::Close(_)));
        assert!(err.is_busy());
        assert!(!conn.is_closed());

        stmt.finalize().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());

        let err = conn.close().unwrap_err();
        assert!(matches!(
            err,
            Error::Misuse(MisuseError {
                kind: MisuseKind::ConnectionClosed,
                ..
            })
        ));
        assert!(conn.prepare("SELECT 1").is_err());
    }

    #[test]
    fn statement_outlives_dropped_connection() {
        let conn = Connection::open_memory().unwrap();
        let mut stmt = conn.prepare("SELECT 41 + 1").unwrap();
        drop(conn);
        // The handle is kept alive until the last statement goes away.
        assert_eq!(stmt.sql().unwrap(), "SELECT 41 + 1");
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        assert_eq!(stmt.column_long(0).unwrap(), 42);
        stmt.finalize().unwrap();
        assert!(stmt.is_finalized());
    }

    #[test]
    fn trace_replacement_releases_old_hook() {
        let mut conn = Connection::open_memory().unwrap();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        conn.set_trace(
            Some(Box::new(move |ev: &TraceEvent| {
                sink.lock().unwrap().push(ev.clone());
                Ok(())
            })),
            TraceMask::STATEMENT,
        )
        .unwrap();
        conn.exec("SELECT 1").unwrap();

        let sink = Arc::clone(&second);
        conn.set_trace(
            Some(Box::new(move |ev: &TraceEvent| {
                sink.lock().unwrap().push(ev.clone());
                Ok(())
            })),
            TraceMask::STATEMENT,
        )
        .unwrap();
        conn.exec("SELECT 2").unwrap();

        conn.set_trace(None, TraceMask::ALL).unwrap();
        conn.exec("SELECT 3").unwrap();

        // The first closure was dropped when it was replaced.
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn arity_is_validated_before_registration() {
        let conn = Connection::open_memory().unwrap();
        // SAFETY: db is valid; -1 only reads the limit
        let max_args =
            unsafe { ffi::sqlite3_limit(conn.raw().unwrap(), ffi::SQLITE_LIMIT_FUNCTION_ARG, -1) };
        assert!(max_args >= 127);

        let err = conn
            .create_function("f", max_args + 1, |ctx, _| ctx.result_null())
            .unwrap_err();
        assert!(matches!(err, Error::Runtime(ref e) if e.code == ffi::SQLITE_MISUSE));
        conn.create_function("widest", max_args, |ctx, _| ctx.result_null())
            .unwrap();
        assert!(conn.create_function("f", -2, |ctx, _| ctx.result_null()).is_err());
        conn.create_function("f", -1, |ctx, args| {
            ctx.result_long(args.len() as i64)
        })
        .unwrap();
        assert!((conn.exec_for_double("SELECT f(1, 2, 3)").unwrap() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn read_only_flags_open_read_only() {
        let path = std::env::temp_dir().join(format!("sqlbridge_ro_{}.db", std::process::id()));
        let path_str = path.to_string_lossy().into_owned();
        {
            let conn = Connection::open_file(path_str.clone()).unwrap();
            conn.exec("CREATE TABLE t (x)").unwrap();
        }
        let conn =
            Connection::open(&DatabaseConfig::file(path_str.clone()).flags(OpenFlags::read_only()))
                .unwrap();
        assert!(conn.is_read_only().unwrap());
        assert!(conn.exec("INSERT INTO t VALUES (1)").is_err());
        drop(conn);
        let _ = std::fs::remove_file(&path);
    }
}
