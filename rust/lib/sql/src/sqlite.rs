use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::types::{Null, ToSql, ValueRef};
use tracing::debug;

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, Value};

/// How long a statement waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
///
/// A single connection guarded by a mutex: statements from concurrent
/// handlers are serialised, and every statement commits on its own.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SQLError::Connection(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| SQLError::Connection(e.to_string()))?;

        // WAL for concurrent readers while a write is in flight.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        debug!("SqliteStore: opened {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SQLError> {
        self.conn
            .lock()
            .map_err(|e| SQLError::Connection(format!("connection poisoned: {e}")))
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<&dyn ToSql> {
    params.iter().map(as_sql).collect()
}

fn as_sql(v: &Value) -> &dyn ToSql {
    match v {
        Value::Null => &Null,
        Value::Integer(i) => i,
        Value::Text(s) => s,
    }
}

impl SQLStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self.lock()?;
        let bound = bind_params(params);

        let mut stmt = conn.prepare(sql).map_err(|e| SQLError::Query(e.to_string()))?;

        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt
            .query(bound.as_slice())
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(|e| SQLError::Execution(e.to_string()))? {
            let mut columns = Vec::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                let raw = row.get_ref(i).map_err(|e| SQLError::Query(e.to_string()))?;
                columns.push((name.clone(), value_from_ref(name, raw)?));
            }
            result.push(Row { columns });
        }
        Ok(result)
    }

    fn exec_batch(&self, sql: &str) -> Result<(), SQLError> {
        let conn = self.lock()?;
        conn.execute_batch(sql).map_err(|e| SQLError::Execution(e.to_string()))
    }
}

/// Only NULL, INTEGER and TEXT columns are read back.
fn value_from_ref(column: &str, v: ValueRef<'_>) -> Result<Value, SQLError> {
    match v {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Integer(i)),
        ValueRef::Text(t) => Ok(Value::Text(String::from_utf8_lossy(t).into_owned())),
        ValueRef::Real(_) | ValueRef::Blob(_) => Err(SQLError::Query(format!(
            "column {column}: unsupported type {}",
            v.data_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec_batch(
                "CREATE TABLE t (k TEXT PRIMARY KEY, n INTEGER, r REAL);
                 CREATE INDEX idx_t_n ON t(n);",
            )
            .unwrap();
        store
    }

    fn insert(store: &SqliteStore, k: &str, n: Value) -> Vec<Row> {
        store
            .query(
                "INSERT INTO t (k, n) VALUES (?1, ?2) RETURNING k, n",
                &[Value::from(k), n],
            )
            .unwrap()
    }

    #[test]
    fn insert_returning_and_select() {
        let store = store_with_table();
        let rows = insert(&store, "a", Value::Integer(7));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("n"), Some(7));

        let rows = store
            .query("SELECT k, n FROM t WHERE k = ?1", &[Value::from("a")])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("k"), Some("a"));
        assert_eq!(rows[0].get_i64("n"), Some(7));
    }

    #[test]
    fn null_columns_come_back_null() {
        let store = store_with_table();
        insert(&store, "x", Value::Null);
        let rows = store.query("SELECT n FROM t", &[]).unwrap();
        assert_eq!(rows[0].get("n"), Some(&Value::Null));
    }

    #[test]
    fn unsupported_column_type_is_query_error() {
        let store = store_with_table();
        let err = store.query("SELECT 1.5 AS r", &[]).unwrap_err();
        assert!(matches!(err, SQLError::Query(_)), "got {err:?}");
    }

    #[test]
    fn unique_violation_is_execution_error() {
        let store = store_with_table();
        insert(&store, "dup", Value::Null);
        let err = store
            .query("INSERT INTO t (k) VALUES ('dup')", &[])
            .unwrap_err();
        assert!(matches!(err, SQLError::Execution(_)), "got {err:?}");
    }

    #[test]
    fn bad_sql_is_query_error() {
        let store = store_with_table();
        let err = store.query("SELEC nonsense", &[]).unwrap_err();
        assert!(matches!(err, SQLError::Query(_)));
    }

    #[test]
    fn open_on_disk_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .exec_batch(
                    "CREATE TABLE IF NOT EXISTS t (k TEXT PRIMARY KEY, n INTEGER);
                     INSERT INTO t (k) VALUES ('persisted');",
                )
                .unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        let rows = reopened.query("SELECT k FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_str("k"), Some("persisted"));
    }
}
