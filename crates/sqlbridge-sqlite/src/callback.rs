//! Native entry points for host callbacks.
//!
//! Every trampoline in here follows the same shape: look up the boxed
//! registration behind the user-data pointer, attach the thread through the
//! runtime, run the host closure under `catch_unwind`, then turn the outcome
//! into whatever the engine expects. Host failures never unwind into C; each
//! kind of callback has a fixed fallback:
//!
//! - trace: logged and dropped
//! - collation: byte-wise comparison of the two inputs
//! - scalar function: no result set, which the engine reads as NULL
//! - exec row: the exec is aborted and the failure is returned to the caller

use crate::context::{FunctionContext, ValueRef};
use crate::ffi;
use crate::runtime;
use sqlbridge_core::{CallbackError, CallbackKind, Error, Result};
use std::any::Any;
use std::cmp::Ordering;
use std::ffi::{CStr, c_char, c_int, c_uint, c_void};
use std::fmt;
use std::ops::{BitOr, BitOrAssign, ControlFlow};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

/// Host closure receiving trace events.
pub type TraceCallback = Box<dyn Fn(&TraceEvent) -> Result<()> + Send + 'static>;

/// Set of trace event kinds to subscribe to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceMask(u32);

impl TraceMask {
    /// A statement starts running (also fires for each trigger sub-program).
    pub const STATEMENT: TraceMask = TraceMask(ffi::SQLITE_TRACE_STMT);
    /// A statement finished; carries the elapsed wall time.
    pub const PROFILE: TraceMask = TraceMask(ffi::SQLITE_TRACE_PROFILE);
    /// A statement produced a row.
    pub const ROW: TraceMask = TraceMask(ffi::SQLITE_TRACE_ROW);
    /// The connection is closing.
    pub const CLOSE: TraceMask = TraceMask(ffi::SQLITE_TRACE_CLOSE);
    pub const ALL: TraceMask = TraceMask(
        ffi::SQLITE_TRACE_STMT
            | ffi::SQLITE_TRACE_PROFILE
            | ffi::SQLITE_TRACE_ROW
            | ffi::SQLITE_TRACE_CLOSE,
    );

    pub const fn empty() -> Self {
        TraceMask(0)
    }

    /// Build a mask from raw event bits; unknown bits are dropped.
    pub const fn from_bits(bits: u32) -> Self {
        TraceMask(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: TraceMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for TraceMask {
    fn default() -> Self {
        TraceMask::STATEMENT
    }
}

impl BitOr for TraceMask {
    type Output = TraceMask;

    fn bitor(self, rhs: TraceMask) -> TraceMask {
        TraceMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: TraceMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for TraceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (TraceMask::STATEMENT, "STATEMENT"),
            (TraceMask::PROFILE, "PROFILE"),
            (TraceMask::ROW, "ROW"),
            (TraceMask::CLOSE, "CLOSE"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(m, _)| self.contains(*m))
            .map(|(_, n)| *n)
            .collect();
        write!(f, "TraceMask({})", set.join(" | "))
    }
}

/// One trace notification, copied out of engine memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A statement started; `sql` has bound parameters expanded.
    Statement { sql: String },
    /// A trigger sub-program started; `comment` is the engine's `-- TRIGGER`
    /// line.
    Trigger { comment: String },
    /// A statement finished.
    Profile { sql: String, elapsed: Duration },
    /// A statement produced a row.
    Row { sql: String },
    /// The connection is closing.
    Close,
}

pub(crate) struct TraceRegistration {
    pub(crate) callback: TraceCallback,
    pub(crate) mask: TraceMask,
}

pub(crate) struct CollationRegistration<F> {
    pub(crate) name: String,
    pub(crate) compare: F,
}

pub(crate) struct FunctionRegistration<F> {
    pub(crate) name: String,
    pub(crate) function: F,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Run host code for one callback invocation.
///
/// Panics are turned into [`Error::Callback`]; the thread stays attached
/// for exactly the duration of `body`.
pub(crate) fn dispatch<T>(
    kind: CallbackKind,
    name: &str,
    body: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let runtime = runtime::global();
    runtime.record_call(kind);
    let _attached = runtime.attach_current_thread()?;
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(Error::Callback(CallbackError {
            kind,
            name: name.to_string(),
            message: panic_message(payload.as_ref()),
        })),
    }
}

fn suppress(kind: CallbackKind, name: &str, error: &Error, fallback: &str) {
    runtime::global().record_suppressed();
    tracing::warn!(
        kind = %kind,
        name = name,
        error = %error,
        fallback = fallback,
        "Host callback failed"
    );
}

/// Comparison used when a comparator fails: memcmp over the common prefix,
/// then the shorter input sorts first.
pub(crate) fn byte_compare(lhs: &[u8], rhs: &[u8]) -> Ordering {
    lhs.cmp(rhs)
}

fn ordering_to_c(ordering: Ordering) -> c_int {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// # Safety
/// `ptr` must be null or valid for `len` bytes.
unsafe fn slice_from<'a>(ptr: *const c_void, len: c_int) -> &'a [u8] {
    match usize::try_from(len) {
        // SAFETY: caller guarantees validity
        Ok(len) if len > 0 && !ptr.is_null() => unsafe {
            std::slice::from_raw_parts(ptr.cast::<u8>(), len)
        },
        _ => &[],
    }
}

/// # Safety
/// `stmt` must be a live statement.
unsafe fn statement_sql(stmt: *mut ffi::sqlite3_stmt) -> String {
    // SAFETY: stmt is live; sqlite3_sql returns memory owned by stmt
    unsafe { ffi::to_owned_string(ffi::sqlite3_sql(stmt)) }.unwrap_or_default()
}

/// Statement text with bound parameters interpolated, falling back to the
/// unexpanded text when expansion is unavailable.
///
/// # Safety
/// `stmt` must be a live statement and `fallback` null or a valid C string.
pub(crate) unsafe fn expanded_sql(
    stmt: *mut ffi::sqlite3_stmt,
    fallback: *const c_char,
) -> Option<String> {
    // SAFETY: stmt is live; the expanded copy is owned by us until freed
    unsafe {
        let expanded = ffi::sqlite3_expanded_sql(stmt);
        if expanded.is_null() {
            return ffi::to_owned_string(fallback);
        }
        let sql = CStr::from_ptr(expanded).to_string_lossy().into_owned();
        ffi::sqlite3_free(expanded.cast());
        Some(sql)
    }
}

/// # Safety
/// Arguments must be those passed by `sqlite3_trace_v2` for event `event`.
unsafe fn trace_event(event: c_uint, p: *mut c_void, x: *mut c_void) -> Option<TraceEvent> {
    // SAFETY: the meaning of p and x is fixed per event code
    unsafe {
        match event {
            ffi::SQLITE_TRACE_STMT => {
                let stmt = p.cast::<ffi::sqlite3_stmt>();
                let unexpanded = x.cast::<c_char>().cast_const();
                let raw = ffi::to_owned_string(unexpanded).unwrap_or_default();
                if raw.starts_with("--") {
                    Some(TraceEvent::Trigger { comment: raw })
                } else {
                    let sql = expanded_sql(stmt, unexpanded).unwrap_or(raw);
                    Some(TraceEvent::Statement { sql })
                }
            }
            ffi::SQLITE_TRACE_PROFILE => {
                let nanos = if x.is_null() { 0 } else { *x.cast::<i64>() };
                Some(TraceEvent::Profile {
                    sql: statement_sql(p.cast()),
                    elapsed: Duration::from_nanos(u64::try_from(nanos).unwrap_or(0)),
                })
            }
            ffi::SQLITE_TRACE_ROW => Some(TraceEvent::Row {
                sql: statement_sql(p.cast()),
            }),
            ffi::SQLITE_TRACE_CLOSE => Some(TraceEvent::Close),
            _ => None,
        }
    }
}

pub(crate) unsafe extern "C" fn trace_trampoline(
    event: c_uint,
    user: *mut c_void,
    p: *mut c_void,
    x: *mut c_void,
) -> c_int {
    if user.is_null() {
        return 0;
    }
    // SAFETY: user points at the connection's boxed registration, which
    // outlives the installed hook
    let registration = unsafe { &*user.cast::<TraceRegistration>() };
    let outcome = dispatch(CallbackKind::Trace, "trace", || {
        // SAFETY: arguments come straight from sqlite3_trace_v2
        match unsafe { trace_event(event, p, x) } {
            Some(ev) => (registration.callback)(&ev),
            None => Ok(()),
        }
    });
    if let Err(e) = outcome {
        suppress(CallbackKind::Trace, "trace", &e, "event dropped");
    }
    0
}

pub(crate) unsafe extern "C" fn compare_trampoline<F>(
    user: *mut c_void,
    lhs_len: c_int,
    lhs_ptr: *const c_void,
    rhs_len: c_int,
    rhs_ptr: *const c_void,
) -> c_int
where
    F: Fn(&[u8], &[u8]) -> Result<Ordering> + Send + 'static,
{
    // SAFETY: the engine passes exact lengths for both inputs
    let (lhs, rhs) = unsafe { (slice_from(lhs_ptr, lhs_len), slice_from(rhs_ptr, rhs_len)) };
    if user.is_null() {
        return ordering_to_c(byte_compare(lhs, rhs));
    }
    // SAFETY: user is the registration boxed at create_collation time
    let registration = unsafe { &*user.cast::<CollationRegistration<F>>() };
    let outcome = dispatch(CallbackKind::Collation, &registration.name, || {
        (registration.compare)(lhs, rhs)
    });
    match outcome {
        Ok(ordering) => ordering_to_c(ordering),
        Err(e) => {
            suppress(
                CallbackKind::Collation,
                &registration.name,
                &e,
                "byte-wise comparison",
            );
            ordering_to_c(byte_compare(lhs, rhs))
        }
    }
}

pub(crate) unsafe extern "C" fn function_trampoline<F>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) where
    F: Fn(&mut FunctionContext<'_>, &[ValueRef<'_>]) -> Result<()> + Send + 'static,
{
    // SAFETY: ctx is live for this call
    let user = unsafe { ffi::sqlite3_user_data(ctx) };
    if user.is_null() {
        return;
    }
    // SAFETY: user is the registration boxed at create_function time
    let registration = unsafe { &*user.cast::<FunctionRegistration<F>>() };
    let name = registration.name.as_str();
    let outcome = dispatch(CallbackKind::Function, name, || {
        let args: Vec<ValueRef<'_>> = match usize::try_from(argc) {
            Ok(n) if n > 0 && !argv.is_null() => {
                // SAFETY: argv holds argc protected values for this call
                unsafe { std::slice::from_raw_parts(argv, n) }
                    .iter()
                    // SAFETY: each entry is a protected value of this call
                    .map(|v| unsafe { ValueRef::new(*v) })
                    .collect()
            }
            _ => Vec::new(),
        };
        // SAFETY: ctx is the live context of this call
        let mut context = unsafe { FunctionContext::new(ctx, name) };
        (registration.function)(&mut context, &args)
    });
    if let Err(e) = outcome {
        suppress(CallbackKind::Function, name, &e, "NULL result");
    }
}

/// Releases a registration boxed with `Box::into_raw`.
pub(crate) unsafe extern "C" fn destroy_boxed<T>(data: *mut c_void) {
    if data.is_null() {
        return;
    }
    let runtime = runtime::global();
    runtime.record_call(CallbackKind::Destroy);
    let _attached = runtime.attach_current_thread().ok();
    // SAFETY: data came from Box::into_raw::<T> and is released exactly once
    let boxed = unsafe { Box::from_raw(data.cast::<T>()) };
    if catch_unwind(AssertUnwindSafe(move || drop(boxed))).is_err() {
        runtime.record_suppressed();
        tracing::warn!("Dropping a callback registration panicked");
    }
}

/// One row delivered to an [`exec_with`](crate::Connection::exec_with)
/// callback. Values are the engine's text rendering of each column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRow {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl ExecRow {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Text of column `index`; `None` for NULL or out of range.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(Option::as_deref)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.get(i))
    }
}

pub(crate) struct ExecState<'f> {
    pub(crate) callback: &'f mut dyn FnMut(&ExecRow) -> ControlFlow<()>,
    pub(crate) stopped: bool,
    pub(crate) failure: Option<Error>,
}

/// # Safety
/// `ptrs` must be null or hold `n` nullable C strings.
unsafe fn copy_strings(n: usize, ptrs: *mut *mut c_char) -> Vec<Option<String>> {
    if n == 0 || ptrs.is_null() {
        return Vec::new();
    }
    // SAFETY: the engine passes n entries
    unsafe { std::slice::from_raw_parts(ptrs, n) }
        .iter()
        // SAFETY: each entry is null or a valid C string
        .map(|p| unsafe { ffi::to_owned_string(*p) })
        .collect()
}

pub(crate) unsafe extern "C" fn exec_trampoline(
    user: *mut c_void,
    ncols: c_int,
    values: *mut *mut c_char,
    names: *mut *mut c_char,
) -> c_int {
    if user.is_null() {
        return 0;
    }
    // SAFETY: user is the ExecState on exec_with's stack frame
    let state = unsafe { &mut *user.cast::<ExecState<'_>>() };
    let n = usize::try_from(ncols).unwrap_or(0);
    let outcome = dispatch(CallbackKind::Exec, "exec", || {
        // SAFETY: the engine passes ncols names and values
        let row = unsafe {
            ExecRow {
                columns: copy_strings(n, names).into_iter().map(Option::unwrap_or_default).collect(),
                values: copy_strings(n, values),
            }
        };
        Ok((state.callback)(&row))
    });
    match outcome {
        Ok(ControlFlow::Continue(())) => 0,
        Ok(ControlFlow::Break(())) => {
            state.stopped = true;
            1
        }
        Err(e) => {
            state.failure = Some(e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_compare_is_memcmp_then_length() {
        assert_eq!(byte_compare(b"abc", b"abd"), Ordering::Less);
        assert_eq!(byte_compare(b"ab", b"abc"), Ordering::Less);
        assert_eq!(byte_compare(b"b", b"abc"), Ordering::Greater);
        assert_eq!(byte_compare(b"", b""), Ordering::Equal);
        assert_eq!(byte_compare(&[0xff], &[0x00, 0x01]), Ordering::Greater);
    }

    #[test]
    fn trace_mask_bits() {
        let mask = TraceMask::STATEMENT | TraceMask::PROFILE;
        assert!(mask.contains(TraceMask::STATEMENT));
        assert!(!mask.contains(TraceMask::ROW));
        assert_eq!(TraceMask::from_bits(0xff), TraceMask::ALL);
        assert!(TraceMask::empty().is_empty());
        assert_eq!(format!("{mask:?}"), "TraceMask(STATEMENT | PROFILE)");
    }

    #[test]
    fn dispatch_converts_panics() {
        let err = dispatch::<()>(CallbackKind::Function, "boom", || panic!("nope")).unwrap_err();
        match err {
            Error::Callback(e) => {
                assert_eq!(e.kind, CallbackKind::Function);
                assert_eq!(e.name, "boom");
                assert!(e.message.contains("nope"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dispatch_passes_results_through() {
        let ok = dispatch(CallbackKind::Collation, "c", || Ok(Ordering::Less)).unwrap();
        assert_eq!(ok, Ordering::Less);
        let err = dispatch::<()>(CallbackKind::Trace, "t", || {
            Err(Error::Custom("bad".into()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Custom(_)));
    }

    #[test]
    fn exec_row_lookup() {
        let row = ExecRow {
            columns: vec!["a".into(), "b".into()],
            values: vec![Some("1".into()), None],
        };
        assert_eq!(row.get(0), Some("1"));
        assert_eq!(row.get_by_name("b"), None);
        assert_eq!(row.len(), 2);
    }
}
