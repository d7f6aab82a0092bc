//! Low-level FFI surface of libsqlite3.
//!
//! The raw declarations come from `libsqlite3-sys` (bundled amalgamation).
//! Only the items the bridge actually calls are re-exported here, so the rest
//! of the crate never names the sys crate directly and the native surface the
//! bridge depends on is visible in one place.

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use std::ffi::{CStr, c_char, c_int};

pub use libsqlite3_sys::{
    // Opaque handles
    sqlite3,
    sqlite3_context,
    sqlite3_stmt,
    sqlite3_value,
    // Result codes
    SQLITE_ABORT,
    SQLITE_BUSY,
    SQLITE_DONE,
    SQLITE_ERROR,
    SQLITE_MISUSE,
    SQLITE_OK,
    SQLITE_RANGE,
    SQLITE_READONLY,
    SQLITE_ROW,
    SQLITE_TOOBIG,
    // sqlite3_open_v2 flags
    SQLITE_OPEN_CREATE,
    SQLITE_OPEN_FULLMUTEX,
    SQLITE_OPEN_MEMORY,
    SQLITE_OPEN_PRIVATECACHE,
    SQLITE_OPEN_READONLY,
    SQLITE_OPEN_READWRITE,
    SQLITE_OPEN_SHAREDCACHE,
    SQLITE_OPEN_URI,
    // Run-time limits
    SQLITE_LIMIT_FUNCTION_ARG,
    // Fundamental data types
    SQLITE_BLOB,
    SQLITE_FLOAT,
    SQLITE_INTEGER,
    SQLITE_NULL,
    SQLITE_TEXT,
    // Text encoding for user functions and collations
    SQLITE_UTF8,
    // sqlite3_trace_v2 event codes
    SQLITE_TRACE_CLOSE,
    SQLITE_TRACE_PROFILE,
    SQLITE_TRACE_ROW,
    SQLITE_TRACE_STMT,
    // Destructor sentinels
    SQLITE_TRANSIENT,
    // Library lifecycle and version info
    sqlite3_initialize,
    sqlite3_libversion,
    sqlite3_libversion_number,
    sqlite3_soft_heap_limit64,
    // Connection management
    sqlite3_busy_timeout,
    sqlite3_close,
    sqlite3_db_readonly,
    sqlite3_get_autocommit,
    sqlite3_limit,
    sqlite3_open_v2,
    // Error handling
    sqlite3_errcode,
    sqlite3_errmsg,
    sqlite3_errstr,
    sqlite3_extended_errcode,
    // Statement lifecycle
    sqlite3_clear_bindings,
    sqlite3_expanded_sql,
    sqlite3_finalize,
    sqlite3_prepare_v2,
    sqlite3_reset,
    sqlite3_sql,
    sqlite3_step,
    // Parameter binding
    sqlite3_bind_blob,
    sqlite3_bind_double,
    sqlite3_bind_int64,
    sqlite3_bind_null,
    sqlite3_bind_parameter_count,
    sqlite3_bind_text,
    // Result columns
    sqlite3_column_blob,
    sqlite3_column_bytes,
    sqlite3_column_count,
    sqlite3_column_double,
    sqlite3_column_int64,
    sqlite3_column_name,
    sqlite3_column_text,
    sqlite3_column_type,
    // Execution helpers and metadata
    sqlite3_changes,
    sqlite3_exec,
    sqlite3_free,
    sqlite3_last_insert_rowid,
    // Hooks and user-defined functions
    sqlite3_create_collation_v2,
    sqlite3_create_function_v2,
    sqlite3_trace_v2,
    sqlite3_user_data,
    // Function arguments
    sqlite3_value_blob,
    sqlite3_value_bytes,
    sqlite3_value_double,
    sqlite3_value_int64,
    sqlite3_value_text,
    sqlite3_value_type,
    // Function results
    sqlite3_result_blob,
    sqlite3_result_double,
    sqlite3_result_int64,
    sqlite3_result_null,
    sqlite3_result_text,
};

// libsqlite3-sys leaves sqlite3_close_v2 out of its generated bindings; the
// bundled amalgamation still provides the symbol.
unsafe extern "C" {
    /// Close a connection, deferring the release until its last statement
    /// is finalized.
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// Get the SQLite library version as a string.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = sqlite3_libversion();
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// Get the SQLite library version as a number.
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { sqlite3_libversion_number() }
}

/// Convert an SQLite result code to a human-readable string.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe {
        let ptr = sqlite3_errstr(code);
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}

/// Copy a nullable C string into an owned `String`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid for
/// the duration of the call.
pub unsafe fn to_owned_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: caller guarantees a valid NUL-terminated string
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Most recent error message of a connection, copied out.
///
/// # Safety
/// `db` must be null or a valid connection handle.
pub unsafe fn errmsg(db: *mut sqlite3) -> String {
    if db.is_null() {
        return error_string(SQLITE_MISUSE).to_string();
    }
    // SAFETY: db is valid; errmsg never returns a dangling pointer
    unsafe { to_owned_string(sqlite3_errmsg(db)) }.unwrap_or_default()
}
