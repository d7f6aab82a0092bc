//! Translation of native result codes into [`Error`] values.

use crate::ffi;
use sqlbridge_core::{BindError, Error, NativeError};
use std::ffi::c_int;

/// Build a [`NativeError`] for a failing call on `db` that returned `rc`.
///
/// The connection's message is used when it describes `rc`; otherwise (the
/// status was synthesized by the bridge or the connection is unavailable)
/// the engine's generic text for the code is used.
pub(crate) fn native_error(db: *mut ffi::sqlite3, rc: c_int) -> NativeError {
    if db.is_null() {
        return NativeError::new(rc, ffi::error_string(rc));
    }
    // SAFETY: db is a valid connection handle
    let (errcode, extended) =
        unsafe { (ffi::sqlite3_errcode(db), ffi::sqlite3_extended_errcode(db)) };
    if errcode & 0xff == rc & 0xff {
        // SAFETY: db is valid
        let message = unsafe { ffi::errmsg(db) };
        NativeError::new(rc, message).with_extended_code(extended)
    } else {
        NativeError::new(rc, ffi::error_string(rc))
    }
}

pub(crate) fn open_error(db: *mut ffi::sqlite3, rc: c_int, path: &str) -> Error {
    let mut native = native_error(db, rc);
    native.message = format!("Failed to open '{}': {}", path, native.message);
    Error::Open(native)
}

pub(crate) fn prepare_error(db: *mut ffi::sqlite3, rc: c_int, sql: &str) -> Error {
    Error::Prepare(native_error(db, rc).with_sql(sql))
}

pub(crate) fn bind_error(db: *mut ffi::sqlite3, rc: c_int, index: c_int) -> Error {
    Error::Bind(BindError {
        index,
        native: native_error(db, rc),
    })
}

pub(crate) fn step_error(db: *mut ffi::sqlite3, rc: c_int, sql: &str) -> Error {
    Error::Step(native_error(db, rc).with_sql(sql))
}

pub(crate) fn exec_error(db: *mut ffi::sqlite3, rc: c_int, sql: &str) -> Error {
    Error::Exec(native_error(db, rc).with_sql(sql))
}

pub(crate) fn runtime_error(db: *mut ffi::sqlite3, rc: c_int, what: &str) -> Error {
    let mut native = native_error(db, rc);
    native.message = format!("{}: {}", what, native.message);
    Error::Runtime(native)
}

pub(crate) fn close_error(db: *mut ffi::sqlite3, rc: c_int) -> Error {
    Error::Close(native_error(db, rc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_connection_uses_generic_text() {
        let err = native_error(std::ptr::null_mut(), ffi::SQLITE_BUSY);
        assert_eq!(err.code, ffi::SQLITE_BUSY);
        assert_eq!(err.message, "database is locked");
        assert_eq!(err.sql, None);
    }

    #[test]
    fn builders_pick_variants() {
        let db = std::ptr::null_mut();
        assert!(matches!(
            prepare_error(db, ffi::SQLITE_ERROR, "SELEC 1"),
            Error::Prepare(ref e) if e.sql.as_deref() == Some("SELEC 1")
        ));
        assert!(matches!(
            bind_error(db, ffi::SQLITE_RANGE, 4),
            Error::Bind(BindError { index: 4, .. })
        ));
        let open = open_error(db, ffi::SQLITE_ERROR, "/nope/x.db");
        assert!(open.to_string().contains("/nope/x.db"));
        assert!(matches!(close_error(db, ffi::SQLITE_BUSY), Error::Close(_)));
    }
}
