//! Error types for bridge operations.
//!
//! Every non-success status reported by the engine is translated into one
//! [`Error`] value carrying the native numeric code, the engine's message and,
//! when known, the SQL that was being executed. Errors that originate on the
//! host side (misuse of a closed object, stale handles, configuration) get
//! their own variants so callers can tell them apart from engine failures.

use std::fmt;

/// Primary result code for "the database file is locked".
pub const SQLITE_BUSY: i32 = 5;
/// Primary result code for "a table in the database is locked".
pub const SQLITE_LOCKED: i32 = 6;
/// Primary result code for constraint violations.
pub const SQLITE_CONSTRAINT: i32 = 19;

/// The primary error type for all bridge operations.
#[derive(Debug)]
pub enum Error {
    /// Opening a database failed (bad path, permissions, read-only conflict,
    /// busy timeout could not be applied).
    Open(NativeError),
    /// Compiling SQL failed. Always carries the offending SQL.
    Prepare(NativeError),
    /// Binding a parameter failed.
    Bind(BindError),
    /// Executing a statement failed. The statement has been finalized.
    Step(NativeError),
    /// A one-shot `exec` call failed.
    Exec(NativeError),
    /// Registering a function, collation or trace hook failed.
    Runtime(NativeError),
    /// The engine refused to close the connection.
    Close(NativeError),
    /// A host callback failed while being dispatched from native code.
    Callback(CallbackError),
    /// An object was used outside of its valid lifecycle state.
    Misuse(MisuseError),
    /// An opaque handle did not resolve to a live resource.
    StaleHandle(StaleHandleError),
    /// Configuration errors
    Config(ConfigError),
    /// Custom error with message, typically returned by host callbacks.
    Custom(String),
}

/// A native status translated into host terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// Result code returned by the failing call.
    pub code: i32,
    /// Extended result code reported by the connection, if any.
    pub extended_code: i32,
    /// Human-readable message from the engine.
    pub message: String,
    /// SQL that was being prepared or executed.
    pub sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindError {
    /// 1-based parameter index.
    pub index: i32,
    pub native: NativeError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// Trace/profile hook
    Trace,
    /// Collation comparator
    Collation,
    /// Scalar function
    Function,
    /// Row callback of `exec`
    Exec,
    /// Release of a registration's host reference
    Destroy,
}

#[derive(Debug, Clone)]
pub struct CallbackError {
    pub kind: CallbackKind,
    /// Name of the function or collation, or the hook name.
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MisuseKind {
    /// The connection was already closed
    ConnectionClosed,
    /// The statement was already finalized
    StatementFinalized,
    /// A function result was set more than once
    ResultAlreadySet,
    /// Column index past the end of the result row
    ColumnOutOfRange,
    /// Argument rejected before reaching the engine
    InvalidArgument,
}

#[derive(Debug, Clone)]
pub struct MisuseError {
    pub kind: MisuseKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Connection,
    Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleHandleError {
    pub kind: HandleKind,
    pub handle: u64,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl NativeError {
    /// Create a native error without SQL context.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            extended_code: code,
            message: message.into(),
            sql: None,
        }
    }

    /// Attach the SQL text that was being executed.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Attach the extended result code.
    pub fn with_extended_code(mut self, extended_code: i32) -> Self {
        self.extended_code = extended_code;
        self
    }

    /// Primary result code (the low byte of the extended code).
    pub fn primary_code(&self) -> i32 {
        self.code & 0xff
    }
}

impl MisuseError {
    pub fn new(kind: MisuseKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl Error {
    /// The native error behind this error, if it came from the engine.
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            Error::Open(e)
            | Error::Prepare(e)
            | Error::Step(e)
            | Error::Exec(e)
            | Error::Runtime(e)
            | Error::Close(e) => Some(e),
            Error::Bind(e) => Some(&e.native),
            _ => None,
        }
    }

    /// Native result code, if this error came from the engine.
    pub fn code(&self) -> Option<i32> {
        self.native().map(|e| e.code)
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        self.native().and_then(|e| e.sql.as_deref())
    }

    /// Did the engine give up waiting on a lock?
    ///
    /// The bridge never retries these; the busy timeout has already elapsed.
    pub fn is_busy(&self) -> bool {
        self.native()
            .is_some_and(|e| matches!(e.primary_code(), SQLITE_BUSY | SQLITE_LOCKED))
    }

    /// Is this a constraint violation (unique, not null, foreign key, ...)?
    pub fn is_constraint_violation(&self) -> bool {
        self.native()
            .is_some_and(|e| e.primary_code() == SQLITE_CONSTRAINT)
    }

    pub(crate) fn misuse(kind: MisuseKind, message: impl Into<String>) -> Self {
        Error::Misuse(MisuseError::new(kind, message))
    }

    /// Error for an operation on a closed connection.
    pub fn connection_closed() -> Self {
        Self::misuse(MisuseKind::ConnectionClosed, "connection is closed")
    }

    /// Error for an operation on a finalized statement.
    pub fn statement_finalized() -> Self {
        Self::misuse(MisuseKind::StatementFinalized, "statement is finalized")
    }

    /// Error for an argument rejected before reaching the engine.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::misuse(MisuseKind::InvalidArgument, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Open(e) => write!(f, "Open error: {}", e),
            Error::Prepare(e) => write!(f, "Prepare error: {}", e),
            Error::Bind(e) => write!(f, "Bind error: {}", e),
            Error::Step(e) => write!(f, "Step error: {}", e),
            Error::Exec(e) => write!(f, "Exec error: {}", e),
            Error::Runtime(e) => write!(f, "Runtime error: {}", e),
            Error::Close(e) => write!(f, "Close error: {}", e),
            Error::Callback(e) => write!(f, "Callback error: {}", e),
            Error::Misuse(e) => write!(f, "Misuse: {}", e.message),
            Error::StaleHandle(e) => write!(f, "Stale handle: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.extended_code)?;
        if let Some(sql) = &self.sql {
            write!(f, ", while executing: {}", sql)?;
        }
        Ok(())
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter {}: {}", self.index, self.native)
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallbackKind::Trace => "trace",
            CallbackKind::Collation => "collation",
            CallbackKind::Function => "function",
            CallbackKind::Exec => "exec",
            CallbackKind::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' failed: {}", self.kind, self.name, self.message)
    }
}

impl fmt::Display for StaleHandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            HandleKind::Connection => "connection",
            HandleKind::Statement => "statement",
        };
        write!(f, "{} handle {:#x} does not refer to a live resource", kind, self.handle)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<BindError> for Error {
    fn from(err: BindError) -> Self {
        Error::Bind(err)
    }
}

impl From<CallbackError> for Error {
    fn from(err: CallbackError) -> Self {
        Error::Callback(err)
    }
}

impl From<MisuseError> for Error {
    fn from(err: MisuseError) -> Self {
        Error::Misuse(err)
    }
}

impl From<StaleHandleError> for Error {
    fn from(err: StaleHandleError) -> Self {
        Error::StaleHandle(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(ConfigError {
            message: format!("invalid configuration: {err}"),
            source: Some(Box::new(err)),
        })
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
