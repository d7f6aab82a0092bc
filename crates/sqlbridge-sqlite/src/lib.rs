//! Safe bridge over the SQLite C API.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate wraps libsqlite3 (bundled through `libsqlite3-sys`) with owned
//! connection and statement types, lossless value marshaling and host
//! callbacks that can never unwind into C.
//!
//! # Features
//!
//! - Open with flags and busy timeout; read-only conflicts are reported
//! - Prepare, bind, step and read columns; text and blobs keep embedded NULs
//! - Trace hook with expanded SQL, trigger, profile, row and close events
//! - Custom collations and scalar functions with fixed failure fallbacks
//! - Opaque integer handles through [`Bridge`] for foreign hosts
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlbridge_sqlite::{Connection, StepResult};
//!
//! let conn = Connection::open_memory()?;
//! conn.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let mut insert = conn.prepare("INSERT INTO users (name) VALUES (?)")?;
//! insert.bind_text(1, "Alice")?;
//! let id = insert.execute_insert()?;
//!
//! let mut select = conn.prepare("SELECT name FROM users WHERE id = ?")?;
//! select.bind_integer(1, id)?;
//! for row in select.execute_select()? {
//!     println!("{:?}", row?.get_by_name("name"));
//! }
//! ```
//!
//! # Thread Safety
//!
//! `Connection` and `Statement` are `Send` but not `Sync`. Registered
//! callbacks must be `Send + 'static`; the engine may invoke them on
//! whichever thread currently drives the connection.

pub mod bridge;
pub mod callback;
pub mod config;
pub mod connection;
pub mod context;
pub mod cursor;
mod error;
pub mod ffi;
pub mod registry;
pub mod runtime;
pub mod statement;
mod types;

pub use bridge::{Bridge, DbHandle, StmtHandle};
pub use callback::{ExecRow, TraceCallback, TraceEvent, TraceMask};
pub use config::{DatabaseConfig, OpenFlags};
pub use connection::{Connection, TransactionBehavior};
pub use context::{FunctionContext, ValueRef};
pub use cursor::Cursor;
pub use runtime::{RuntimeConfig, ThreadAttach};
pub use statement::{Statement, StepResult};

pub use sqlbridge_core::{Error, Result, Row, Value, ValueType};

/// Re-export the SQLite library version.
pub fn version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
    }

    #[test]
    fn test_sqlite_version_number() {
        let num = version_number();
        assert!(
            num >= 3_000_000,
            "Expected SQLite 3.x.x (>= 3000000), got {}",
            num
        );
    }
}
