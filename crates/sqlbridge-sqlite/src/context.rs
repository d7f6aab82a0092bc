//! Scalar function invocation context and argument views.
//!
//! Both types borrow engine memory that is only valid for one invocation;
//! the `'a` lifetime ties them to the trampoline's stack frame so they cannot
//! be stashed away by the callback.

use crate::ffi;
use crate::types;
use sqlbridge_core::{Error, MisuseError, MisuseKind, NativeError, Result, Value, ValueType};
use std::ffi::c_int;
use std::fmt;
use std::marker::PhantomData;

/// Result slot of one scalar function call.
///
/// Exactly one `result_*` call is accepted; further calls fail with
/// [`MisuseKind::ResultAlreadySet`]. A call that sets nothing yields NULL.
pub struct FunctionContext<'a> {
    ctx: *mut ffi::sqlite3_context,
    name: &'a str,
    result_set: bool,
    _invocation: PhantomData<&'a mut ffi::sqlite3_context>,
}

impl<'a> FunctionContext<'a> {
    /// # Safety
    /// `ctx` must be the live context of the current invocation.
    pub(crate) unsafe fn new(ctx: *mut ffi::sqlite3_context, name: &'a str) -> Self {
        Self {
            ctx,
            name,
            result_set: false,
            _invocation: PhantomData,
        }
    }

    /// Name the function was registered under.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Has a result been set during this invocation?
    pub fn is_result_set(&self) -> bool {
        self.result_set
    }

    fn claim(&mut self) -> Result<()> {
        if self.result_set {
            return Err(Error::Misuse(MisuseError::new(
                MisuseKind::ResultAlreadySet,
                format!("result of function '{}' is already set", self.name),
            )));
        }
        self.result_set = true;
        Ok(())
    }

    fn length(&self, len: usize) -> Result<c_int> {
        c_int::try_from(len).map_err(|_| {
            Error::Runtime(NativeError::new(
                ffi::SQLITE_TOOBIG,
                format!("result of function '{}' is too large", self.name),
            ))
        })
    }

    pub fn result_null(&mut self) -> Result<()> {
        self.claim()?;
        // SAFETY: ctx is live for this invocation
        unsafe { ffi::sqlite3_result_null(self.ctx) };
        Ok(())
    }

    pub fn result_long(&mut self, value: i64) -> Result<()> {
        self.claim()?;
        // SAFETY: ctx is live for this invocation
        unsafe { ffi::sqlite3_result_int64(self.ctx, value) };
        Ok(())
    }

    pub fn result_double(&mut self, value: f64) -> Result<()> {
        self.claim()?;
        // SAFETY: ctx is live for this invocation
        unsafe { ffi::sqlite3_result_double(self.ctx, value) };
        Ok(())
    }

    /// Set a text result. Embedded NULs are kept.
    pub fn result_text(&mut self, value: &str) -> Result<()> {
        let len = self.length(value.len())?;
        self.claim()?;
        // SAFETY: ctx is live; the engine copies the bytes
        unsafe {
            ffi::sqlite3_result_text(
                self.ctx,
                value.as_ptr().cast(),
                len,
                ffi::SQLITE_TRANSIENT(),
            );
        }
        Ok(())
    }

    pub fn result_blob(&mut self, value: &[u8]) -> Result<()> {
        let len = self.length(value.len())?;
        self.claim()?;
        // SAFETY: ctx is live; the engine copies the bytes
        unsafe {
            ffi::sqlite3_result_blob(
                self.ctx,
                value.as_ptr().cast(),
                len,
                ffi::SQLITE_TRANSIENT(),
            );
        }
        Ok(())
    }

    /// Set the result from a dynamic value.
    pub fn result_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.result_null(),
            Value::Integer(v) => self.result_long(*v),
            Value::Real(v) => self.result_double(*v),
            Value::Text(s) => self.result_text(s),
            Value::Blob(b) => self.result_blob(b),
        }
    }
}

impl fmt::Debug for FunctionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionContext")
            .field("name", &self.name)
            .field("result_set", &self.result_set)
            .finish()
    }
}

/// Borrowed view of one function argument.
///
/// Accessors use the engine's own conversions: reading an integer argument
/// as text yields its decimal rendering, reading text as a number parses a
/// numeric prefix.
#[derive(Clone, Copy)]
pub struct ValueRef<'a> {
    raw: *mut ffi::sqlite3_value,
    _invocation: PhantomData<&'a ffi::sqlite3_value>,
}

impl ValueRef<'_> {
    /// # Safety
    /// `raw` must be a protected argument of the current invocation.
    pub(crate) unsafe fn new(raw: *mut ffi::sqlite3_value) -> Self {
        Self {
            raw,
            _invocation: PhantomData,
        }
    }

    /// Storage class of the argument.
    pub fn value_type(&self) -> ValueType {
        // SAFETY: raw is valid for the invocation
        types::value_type_from_code(unsafe { ffi::sqlite3_value_type(self.raw) })
    }

    pub fn is_null(&self) -> bool {
        self.value_type() == ValueType::Null
    }

    pub fn long_value(&self) -> i64 {
        // SAFETY: raw is valid for the invocation
        unsafe { ffi::sqlite3_value_int64(self.raw) }
    }

    pub fn double_value(&self) -> f64 {
        // SAFETY: raw is valid for the invocation
        unsafe { ffi::sqlite3_value_double(self.raw) }
    }

    /// Text rendering of the argument, `None` for NULL.
    /// Invalid UTF-8 is replaced; use [`ValueRef::text_bytes`] for exact bytes.
    pub fn string_value(&self) -> Option<String> {
        self.text_bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Exact text bytes of the argument, `None` for NULL.
    pub fn text_bytes(&self) -> Option<Vec<u8>> {
        // SAFETY: raw is valid for the invocation
        unsafe { types::value_text_bytes(self.raw) }
    }

    /// Blob bytes of the argument; NULL reads as empty.
    pub fn blob_value(&self) -> Vec<u8> {
        // SAFETY: raw is valid for the invocation
        unsafe { types::value_blob(self.raw) }
    }

    /// Copy the argument into an owned [`Value`].
    pub fn to_value(&self) -> Value {
        // SAFETY: raw is valid for the invocation
        unsafe { types::read_value(self.raw) }
    }
}

impl fmt::Debug for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueRef").field(&self.value_type()).finish()
    }
}
