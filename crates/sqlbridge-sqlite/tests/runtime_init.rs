//! Runs in its own test binary so nothing else touches the global runtime
//! first.

use sqlbridge_sqlite::runtime::{self, RuntimeConfig};
use sqlbridge_sqlite::{Connection, DatabaseConfig, Error};

#[test]
fn runtime_initializes_exactly_once() {
    assert!(runtime::try_global().is_none());

    let config = RuntimeConfig::from_json(r#"{"soft_heap_limit": 4194304, "busy_timeout_ms": 750}"#).unwrap();
    let rt = runtime::initialize(config.clone()).expect("first initialize");
    assert_eq!(rt.config().soft_heap_limit, 4 * 1024 * 1024);

    let err = runtime::initialize(config).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err}");

    assert_eq!(DatabaseConfig::default().busy_timeout_ms, 750);

    // Connections pick up the already-initialized runtime.
    let conn = Connection::open_memory().unwrap();
    conn.exec("SELECT 1").unwrap();
    assert!(std::ptr::eq(runtime::global(), rt));
}
