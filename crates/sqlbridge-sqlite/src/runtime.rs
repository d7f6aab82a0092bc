//! Process-wide bridge context.
//!
//! The engine is configured once per process: library initialization and the
//! soft heap limit are applied by whichever of [`initialize`],
//! [`initialize_with`] or [`global`] runs first. Later explicit initialization
//! attempts fail instead of silently reconfiguring a live process.
//!
//! The context also owns the thread-attachment hook used by every native
//! callback entry point. Callbacks can arrive on threads the host never saw
//! (background checkpoints, connections opened on worker threads), so each
//! entry point takes an [`AttachGuard`] before running host code. A guard
//! attaches the thread only if it is not attached yet and detaches only what
//! it attached itself.

use crate::ffi;
use serde::{Deserialize, Serialize};
use sqlbridge_core::{CallbackKind, ConfigError, Error, NativeError, Result};
use std::cell::Cell;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Soft heap limit applied at initialization (8 MiB).
pub const DEFAULT_SOFT_HEAP_LIMIT: i64 = 8 * 1024 * 1024;

/// Busy timeout applied to new connections unless configured otherwise.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 2500;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

thread_local! {
    static ATTACHED: Cell<bool> = const { Cell::new(false) };
}

/// Process-wide settings applied once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Soft heap limit in bytes; zero or negative disables the limit.
    pub soft_heap_limit: i64,
    /// Busy timeout picked up by [`crate::DatabaseConfig::default`] once the
    /// runtime is initialized.
    pub busy_timeout_ms: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            soft_heap_limit: DEFAULT_SOFT_HEAP_LIMIT,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl RuntimeConfig {
    /// Parse a runtime config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Makes a thread able to run host callbacks.
///
/// Plain Rust hosts need no attachment at all; an embedding that forwards
/// callbacks into a foreign VM implements this to attach native threads to
/// that VM.
pub trait ThreadAttach: Send + Sync {
    /// Is the current thread already attached?
    fn is_attached(&self) -> bool;

    /// Attach the current thread.
    fn attach(&self) -> Result<()>;

    /// Detach the current thread. Only called after a successful `attach` on
    /// the same thread.
    fn detach(&self);
}

/// Default attachment: per-thread bookkeeping only.
#[derive(Debug, Default)]
pub struct InProcessAttach;

impl ThreadAttach for InProcessAttach {
    fn is_attached(&self) -> bool {
        ATTACHED.with(Cell::get)
    }

    fn attach(&self) -> Result<()> {
        ATTACHED.with(|a| a.set(true));
        Ok(())
    }

    fn detach(&self) {
        ATTACHED.with(|a| a.set(false));
    }
}

/// Counters describing callback traffic since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackStats {
    pub trace_calls: u64,
    pub collation_calls: u64,
    pub function_calls: u64,
    pub exec_rows: u64,
    pub releases: u64,
    /// Host failures caught at the boundary and replaced by a fallback.
    pub suppressed_failures: u64,
    /// Times a callback had to attach its thread first.
    pub thread_attaches: u64,
}

#[derive(Default)]
struct Counters {
    trace_calls: AtomicU64,
    collation_calls: AtomicU64,
    function_calls: AtomicU64,
    exec_rows: AtomicU64,
    releases: AtomicU64,
    suppressed_failures: AtomicU64,
    thread_attaches: AtomicU64,
}

/// The process-wide bridge context.
pub struct Runtime {
    config: RuntimeConfig,
    attach: Box<dyn ThreadAttach>,
    counters: Counters,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Initialize the bridge with `config` and the default thread attachment.
///
/// Fails with [`Error::Config`] if the runtime was already initialized,
/// explicitly or implicitly by opening a connection.
pub fn initialize(config: RuntimeConfig) -> Result<&'static Runtime> {
    initialize_with(config, InProcessAttach)
}

/// Initialize the bridge with a custom thread attachment hook.
pub fn initialize_with(
    config: RuntimeConfig,
    attach: impl ThreadAttach + 'static,
) -> Result<&'static Runtime> {
    let mut fresh = false;
    let runtime = RUNTIME.get_or_init(|| {
        fresh = true;
        Runtime::new(config, Box::new(attach))
    });
    if !fresh {
        return Err(Error::Config(ConfigError::new(
            "bridge runtime is already initialized",
        )));
    }
    runtime.configure_engine()?;
    Ok(runtime)
}

/// The process-wide runtime, initialized with defaults on first use.
pub fn global() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let runtime = Runtime::new(RuntimeConfig::default(), Box::new(InProcessAttach));
        if let Err(e) = runtime.configure_engine() {
            tracing::error!(error = %e, "Failed to configure SQLite engine");
        }
        runtime
    })
}

/// The runtime if it has been initialized.
pub fn try_global() -> Option<&'static Runtime> {
    RUNTIME.get()
}

impl Runtime {
    fn new(config: RuntimeConfig, attach: Box<dyn ThreadAttach>) -> Self {
        Self {
            config,
            attach,
            counters: Counters::default(),
        }
    }

    fn configure_engine(&self) -> Result<()> {
        // SAFETY: sqlite3_initialize is idempotent and thread-safe
        let rc = unsafe { ffi::sqlite3_initialize() };
        if rc != ffi::SQLITE_OK {
            return Err(Error::Runtime(NativeError::new(
                rc,
                format!("Failed to initialize SQLite: {}", ffi::error_string(rc)),
            )));
        }
        if self.config.soft_heap_limit > 0 {
            // SAFETY: always safe to call after initialization
            unsafe { ffi::sqlite3_soft_heap_limit64(self.config.soft_heap_limit) };
        }
        tracing::debug!(
            version = ffi::version(),
            soft_heap_limit = self.config.soft_heap_limit,
            "SQLite engine initialized"
        );
        Ok(())
    }

    /// Settings this runtime was initialized with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Make sure the current thread may run host code.
    pub fn attach_current_thread(&self) -> Result<AttachGuard<'_>> {
        if self.attach.is_attached() {
            return Ok(AttachGuard {
                runtime: self,
                attached_here: false,
            });
        }
        self.attach.attach()?;
        self.counters.thread_attaches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(thread = ?std::thread::current().id(), "Attached callback thread");
        Ok(AttachGuard {
            runtime: self,
            attached_here: true,
        })
    }

    pub(crate) fn record_call(&self, kind: CallbackKind) {
        let counter = match kind {
            CallbackKind::Trace => &self.counters.trace_calls,
            CallbackKind::Collation => &self.counters.collation_calls,
            CallbackKind::Function => &self.counters.function_calls,
            CallbackKind::Exec => &self.counters.exec_rows,
            CallbackKind::Destroy => &self.counters.releases,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.counters
            .suppressed_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the callback counters.
    pub fn stats(&self) -> CallbackStats {
        let c = &self.counters;
        CallbackStats {
            trace_calls: c.trace_calls.load(Ordering::Relaxed),
            collation_calls: c.collation_calls.load(Ordering::Relaxed),
            function_calls: c.function_calls.load(Ordering::Relaxed),
            exec_rows: c.exec_rows.load(Ordering::Relaxed),
            releases: c.releases.load(Ordering::Relaxed),
            suppressed_failures: c.suppressed_failures.load(Ordering::Relaxed),
            thread_attaches: c.thread_attaches.load(Ordering::Relaxed),
        }
    }
}

/// Keeps the current thread attached for the duration of one callback.
#[must_use = "the thread is detached again when the guard drops"]
pub struct AttachGuard<'rt> {
    runtime: &'rt Runtime,
    attached_here: bool,
}

impl AttachGuard<'_> {
    /// Did this guard attach the thread (and will it detach on drop)?
    pub fn attached_here(&self) -> bool {
        self.attached_here
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if self.attached_here {
            self.runtime.attach.detach();
            tracing::trace!(thread = ?std::thread::current().id(), "Detached callback thread");
        }
    }
}
