//! Open-time configuration.

use crate::ffi;
use crate::runtime::{self, DEFAULT_BUSY_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use sqlbridge_core::Result;
use std::ffi::c_int;

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open as an in-memory database named by the path.
    pub memory: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Enable URI filenames on top of the current flags.
    pub fn with_uri(mut self) -> Self {
        self.uri = true;
        self
    }

    /// Decode a raw `sqlite3_open_v2` bitmask. Unknown bits are ignored, and
    /// so are the threading-mode bits: connections always open serialized.
    pub fn from_bits(bits: c_int) -> Self {
        let has = |flag: c_int| bits & flag != 0;
        Self {
            read_only: has(ffi::SQLITE_OPEN_READONLY),
            read_write: has(ffi::SQLITE_OPEN_READWRITE),
            create: has(ffi::SQLITE_OPEN_CREATE),
            uri: has(ffi::SQLITE_OPEN_URI),
            memory: has(ffi::SQLITE_OPEN_MEMORY),
            shared_cache: has(ffi::SQLITE_OPEN_SHAREDCACHE),
            private_cache: has(ffi::SQLITE_OPEN_PRIVATECACHE),
        }
    }

    /// Does opening with these flags require a writable database?
    ///
    /// Mirrors the defaulting in [`OpenFlags::to_sqlite_flags`].
    pub fn wants_write(self) -> bool {
        self.read_write || !self.read_only
    }

    pub(crate) fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.memory {
            flags |= ffi::SQLITE_OPEN_MEMORY;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        if self.private_cache {
            flags |= ffi::SQLITE_OPEN_PRIVATECACHE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        // Statements are Send and do not borrow their connection, so the
        // engine must serialize every entry into one handle.
        flags | ffi::SQLITE_OPEN_FULLMUTEX
    }
}

/// Configuration for opening a database connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds. Zero disables the busy handler.
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: runtime::try_global()
                .map_or(DEFAULT_BUSY_TIMEOUT_MS, |rt| rt.config().busy_timeout_ms),
        }
    }
}

impl DatabaseConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    ///
    /// ```rust,ignore
    /// let config = DatabaseConfig::from_json(r#"{"path": "app.db", "busy_timeout_ms": 1000}"#)?;
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_read_write_create() {
        let flags = OpenFlags::default().to_sqlite_flags();
        assert_eq!(
            flags,
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_FULLMUTEX
        );
        assert!(OpenFlags::default().wants_write());
        assert!(!OpenFlags::read_only().wants_write());
    }

    #[test]
    fn bits_round_trip_through_struct() {
        let bits = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_URI;
        let flags = OpenFlags::from_bits(bits);
        assert!(flags.read_write && flags.create && flags.uri);
        assert!(!flags.read_only);
        assert_eq!(flags.to_sqlite_flags(), bits | ffi::SQLITE_OPEN_FULLMUTEX);
    }

    #[test]
    fn threading_mode_is_always_serialized() {
        let flags = OpenFlags::from_bits(ffi::SQLITE_OPEN_READWRITE | libsqlite3_sys::SQLITE_OPEN_NOMUTEX);
        let bits = flags.to_sqlite_flags();
        assert_eq!(bits & libsqlite3_sys::SQLITE_OPEN_NOMUTEX, 0);
        assert_ne!(bits & ffi::SQLITE_OPEN_FULLMUTEX, 0);
        assert_ne!(OpenFlags::read_only().to_sqlite_flags() & ffi::SQLITE_OPEN_FULLMUTEX, 0);
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config =
            DatabaseConfig::from_json(r#"{"path": "app.db", "flags": {"read_only": true}}"#)
                .unwrap();
        assert_eq!(config.path, "app.db");
        assert_eq!(config.flags, OpenFlags::read_only());
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }

    #[test]
    fn config_from_bad_json_is_config_error() {
        let err = DatabaseConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, sqlbridge_core::Error::Config(_)));
    }
}
