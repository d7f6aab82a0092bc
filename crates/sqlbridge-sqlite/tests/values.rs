use sqlbridge_core::{MisuseError, MisuseKind};
use sqlbridge_sqlite::{Connection, Error, StepResult, Value, ValueType};

fn table(conn: &Connection) {
    conn.exec("CREATE TABLE v (id INTEGER PRIMARY KEY, x)")
        .expect("create table");
}

#[test]
fn every_storage_class_round_trips() {
    let conn = Connection::open_memory().expect("open sqlite memory db");
    table(&conn);

    let values = vec![
        Value::Null,
        Value::Integer(i64::MIN),
        Value::Integer(i64::MAX),
        Value::Real(-0.125),
        Value::Text(String::new()),
        Value::Text("héllo\0wörld\0".to_string()),
        Value::Blob(Vec::new()),
        Value::Blob(vec![0x00, 0xff, 0x00, 0x80, 0x7f]),
    ];

    let mut insert = conn.prepare("INSERT INTO v (x) VALUES (?)").unwrap();
    for value in &values {
        insert.bind_value(1, value).unwrap();
        insert.execute_insert().unwrap();
    }

    let mut select = conn.prepare("SELECT x FROM v ORDER BY id").unwrap();
    let read: Vec<Value> = select
        .execute_select()
        .unwrap()
        .map(|row| row.unwrap().into_values().remove(0))
        .collect();

    // An empty blob bound with a non-null pointer stays a zero-length blob.
    assert_eq!(read, values);
}

#[test]
fn typed_binds_and_reads() {
    let conn = Connection::open_memory().unwrap();
    let mut stmt = conn.prepare("SELECT ?, ?, ?, ?, ?").unwrap();
    stmt.bind_null(1).unwrap();
    stmt.bind_integer(2, 42).unwrap();
    stmt.bind_real(3, 2.5).unwrap();
    stmt.bind_text(4, "a\0b").unwrap();
    stmt.bind_blob(5, &[1, 0, 2]).unwrap();

    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_count().unwrap(), 5);
    assert_eq!(stmt.column_type(0).unwrap(), ValueType::Null);
    assert_eq!(stmt.column_type(1).unwrap(), ValueType::Integer);
    assert_eq!(stmt.column_type(2).unwrap(), ValueType::Real);
    assert_eq!(stmt.column_type(3).unwrap(), ValueType::Text);
    assert_eq!(stmt.column_type(4).unwrap(), ValueType::Blob);

    assert_eq!(stmt.column_string(0).unwrap(), None);
    assert!(stmt.column_blob(0).unwrap().is_empty());
    assert_eq!(stmt.column_long(1).unwrap(), 42);
    assert!((stmt.column_double(2).unwrap() - 2.5).abs() < f64::EPSILON);
    assert_eq!(stmt.column_string(3).unwrap().as_deref(), Some("a\0b"));
    assert_eq!(stmt.column_text_bytes(3).unwrap(), Some(b"a\0b".to_vec()));
    assert_eq!(stmt.column_blob(4).unwrap(), vec![1, 0, 2]);
    assert_eq!(stmt.step().unwrap(), StepResult::Done);
}

#[test]
fn engine_conversions_apply_to_column_reads() {
    let conn = Connection::open_memory().unwrap();
    let mut stmt = conn.prepare("SELECT 12, '7 apples', 3.75").unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_string(0).unwrap().as_deref(), Some("12"));
    assert_eq!(stmt.column_long(1).unwrap(), 7);
    assert_eq!(stmt.column_long(2).unwrap(), 3);
}

#[test]
fn invalid_utf8_text_is_readable_as_bytes() {
    let conn = Connection::open_memory().unwrap();
    let mut stmt = conn.prepare("SELECT CAST(? AS TEXT)").unwrap();
    stmt.bind_blob(1, &[0x61, 0xff, 0x62]).unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(
        stmt.column_text_bytes(0).unwrap(),
        Some(vec![0x61, 0xff, 0x62])
    );
    assert_eq!(stmt.column_string(0).unwrap().as_deref(), Some("a\u{fffd}b"));
}

#[test]
fn column_names_and_rows() {
    let conn = Connection::open_memory().unwrap();
    conn.exec(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO users (name) VALUES ('Alice'), ('Bob');",
    )
    .unwrap();

    let mut stmt = conn
        .prepare("SELECT id, name AS who FROM users ORDER BY id")
        .unwrap();
    assert_eq!(stmt.column_names().unwrap(), vec!["id", "who"]);

    let rows: Vec<_> = stmt
        .execute_select()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_by_name("who"), Some(&Value::Text("Alice".into())));
    assert_eq!(rows[1].get(0), Some(&Value::Integer(2)));
    assert_eq!(rows[1].columns(), ["id".to_string(), "who".to_string()]);
}

#[test]
fn cursor_stays_done() {
    let conn = Connection::open_memory().unwrap();
    let mut stmt = conn.prepare("SELECT 1").unwrap();
    let mut cursor = stmt.execute_select().unwrap();
    assert_eq!(cursor.step().unwrap(), StepResult::Row);
    assert_eq!(cursor.column_long(0).unwrap(), 1);
    assert_eq!(cursor.step().unwrap(), StepResult::Done);
    assert_eq!(cursor.step().unwrap(), StepResult::Done);
    assert!(cursor.is_done());
    assert!(cursor.next().is_none());
}

#[test]
fn column_index_out_of_range_is_misuse() {
    let conn = Connection::open_memory().unwrap();
    let mut stmt = conn.prepare("SELECT 1").unwrap();
    stmt.step().unwrap();
    let err = stmt.column_long(1).unwrap_err();
    assert!(matches!(
        err,
        Error::Misuse(MisuseError {
            kind: MisuseKind::ColumnOutOfRange,
            ..
        })
    ));
}

#[test]
fn bind_index_out_of_range_reports_range() {
    let conn = Connection::open_memory().unwrap();
    let mut stmt = conn.prepare("SELECT ?").unwrap();
    assert_eq!(stmt.parameter_count().unwrap(), 1);

    let err = stmt.bind_integer(2, 1).unwrap_err();
    match err {
        Error::Bind(e) => {
            assert_eq!(e.index, 2);
            assert_eq!(e.native.code, 25);
        }
        other => panic!("expected bind error, got {other}"),
    }
    assert!(stmt.bind_text(0, "x").is_err());
}

#[test]
fn bind_all_and_clear_bindings() {
    let conn = Connection::open_memory().unwrap();
    let mut stmt = conn.prepare("SELECT ?1, ?2").unwrap();
    stmt.bind_all(&[Value::from(1), Value::from("two")]).unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_value(1).unwrap(), Value::Text("two".into()));

    stmt.clear_bindings().unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_value(0).unwrap(), Value::Null);
    assert_eq!(stmt.column_value(1).unwrap(), Value::Null);
}
