//! Marshaling between [`Value`] and engine storage.
//!
//! Text and blob parameters are bound with an explicit byte length and
//! `SQLITE_TRANSIENT`, so the engine takes its own copy and embedded NUL
//! bytes survive. Column and argument payloads are copied out of engine
//! buffers before any of these functions return.

use crate::ffi;
use sqlbridge_core::{Value, ValueType};
use std::ffi::{CStr, c_int};

/// Map an engine type code to a storage class.
pub(crate) fn value_type_from_code(code: c_int) -> ValueType {
    match code {
        ffi::SQLITE_INTEGER => ValueType::Integer,
        ffi::SQLITE_FLOAT => ValueType::Real,
        ffi::SQLITE_TEXT => ValueType::Text,
        ffi::SQLITE_BLOB => ValueType::Blob,
        _ => ValueType::Null,
    }
}

/// Copy `len` bytes at `ptr`; null or non-positive lengths give an empty vec.
///
/// # Safety
/// `ptr` must be null or valid for reads of `len` bytes.
unsafe fn copy_bytes(ptr: *const u8, len: c_int) -> Vec<u8> {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !ptr.is_null() => {
            // SAFETY: caller guarantees ptr is valid for len bytes
            unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec()
        }
        _ => Vec::new(),
    }
}

/// Bind UTF-8 text by byte length.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub(crate) unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &[u8]) -> c_int {
    let Ok(len) = c_int::try_from(text.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: stmt is valid; the engine copies the bytes before returning
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            text.as_ptr().cast(),
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Bind a blob by byte length.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub(crate) unsafe fn bind_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int, blob: &[u8]) -> c_int {
    let Ok(len) = c_int::try_from(blob.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: stmt is valid; the engine copies the bytes before returning
    unsafe {
        ffi::sqlite3_bind_blob(
            stmt,
            index,
            blob.as_ptr().cast(),
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Bind a Value to a prepared statement parameter.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub(crate) unsafe fn bind_value(
    stmt: *mut ffi::sqlite3_stmt,
    index: c_int,
    value: &Value,
) -> c_int {
    // SAFETY: stmt validity is forwarded from the caller
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Integer(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Real(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Text(s) => bind_text(stmt, index, s.as_bytes()),
            Value::Blob(b) => bind_blob(stmt, index, b),
        }
    }
}

/// Raw text bytes of a column, or `None` for NULL.
///
/// # Safety
/// `stmt` must be positioned on a row and `index` must be in range.
pub(crate) unsafe fn column_text_bytes(
    stmt: *mut ffi::sqlite3_stmt,
    index: c_int,
) -> Option<Vec<u8>> {
    // SAFETY: text must be fetched before bytes so the length matches
    unsafe {
        let ptr = ffi::sqlite3_column_text(stmt, index);
        if ptr.is_null() {
            return None;
        }
        let len = ffi::sqlite3_column_bytes(stmt, index);
        Some(copy_bytes(ptr, len))
    }
}

/// Blob bytes of a column; NULL reads as empty.
///
/// # Safety
/// `stmt` must be positioned on a row and `index` must be in range.
pub(crate) unsafe fn column_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Vec<u8> {
    // SAFETY: blob must be fetched before bytes so the length matches
    unsafe {
        let ptr = ffi::sqlite3_column_blob(stmt, index);
        let len = ffi::sqlite3_column_bytes(stmt, index);
        copy_bytes(ptr.cast(), len)
    }
}

/// Read a column value from a result row.
///
/// # Safety
/// `stmt` must be positioned on a row and `index` must be in range.
pub(crate) unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: forwarded from the caller
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => column_text_bytes(stmt, index).map_or(Value::Null, |bytes| {
                Value::Text(String::from_utf8_lossy(&bytes).into_owned())
            }),
            ffi::SQLITE_BLOB => Value::Blob(column_blob(stmt, index)),
            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// `stmt` must be a valid prepared statement and `index` must be in range.
pub(crate) unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from the caller
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}

/// Raw text bytes of a function argument, or `None` for NULL.
///
/// # Safety
/// `value` must be a valid protected value for the current invocation.
pub(crate) unsafe fn value_text_bytes(value: *mut ffi::sqlite3_value) -> Option<Vec<u8>> {
    // SAFETY: text must be fetched before bytes so the length matches
    unsafe {
        let ptr = ffi::sqlite3_value_text(value);
        if ptr.is_null() {
            return None;
        }
        let len = ffi::sqlite3_value_bytes(value);
        Some(copy_bytes(ptr, len))
    }
}

/// Blob bytes of a function argument; NULL reads as empty.
///
/// # Safety
/// `value` must be a valid protected value for the current invocation.
pub(crate) unsafe fn value_blob(value: *mut ffi::sqlite3_value) -> Vec<u8> {
    // SAFETY: blob must be fetched before bytes so the length matches
    unsafe {
        let ptr = ffi::sqlite3_value_blob(value);
        let len = ffi::sqlite3_value_bytes(value);
        copy_bytes(ptr.cast(), len)
    }
}

/// Copy a function argument into a [`Value`].
///
/// # Safety
/// `value` must be a valid protected value for the current invocation.
pub(crate) unsafe fn read_value(value: *mut ffi::sqlite3_value) -> Value {
    // SAFETY: forwarded from the caller
    unsafe {
        match ffi::sqlite3_value_type(value) {
            ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_value_int64(value)),
            ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_value_double(value)),
            ffi::SQLITE_TEXT => value_text_bytes(value).map_or(Value::Null, |bytes| {
                Value::Text(String::from_utf8_lossy(&bytes).into_owned())
            }),
            ffi::SQLITE_BLOB => Value::Blob(value_blob(value)),
            _ => Value::Null,
        }
    }
}
