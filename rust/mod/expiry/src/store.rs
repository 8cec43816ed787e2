use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use expirysignal_core::ServiceError;
use expirysignal_core::time::{from_epoch_millis, to_epoch_millis};
use expirysignal_sql::{Row, SQLStore, Value};

use crate::model::{ExpiryRecord, ExpiryUpsert, Identity};

/// Durable storage of expiry records keyed by identity.
///
/// Implementations must make `upsert` atomic per identity: concurrent
/// writers to the same identity leave exactly one record behind, holding
/// the values of whichever call committed last. Nothing above the store
/// takes a lock.
pub trait SignalStore: Send + Sync {
    /// Create or replace the record for `upsert.identity`.
    ///
    /// Every mutable field is overwritten, so an optional left `None`
    /// clears the stored value. `written_at` stamps `updated_at` (and
    /// `created_at` on first write).
    fn upsert(
        &self,
        upsert: &ExpiryUpsert,
        written_at: DateTime<Utc>,
    ) -> Result<ExpiryRecord, ServiceError>;

    /// Point lookup. `Ok(None)` means no record, which is not an error.
    fn lookup(&self, identity: &Identity) -> Result<Option<ExpiryRecord>, ServiceError>;
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

/// SQL schema for the expiry_records table.
///
/// `scope_key` is the scope, or `''` for "no scope"; it exists so the
/// primary key can cover the scopeless identity (NULLs never conflict).
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS expiry_records (
    subject     TEXT NOT NULL CHECK (length(subject) > 0),
    scope_key   TEXT NOT NULL,
    scope       TEXT,
    expires_at  INTEGER NOT NULL,
    cause_code  TEXT,
    renewable   INTEGER,
    note        TEXT,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (subject, scope_key)
);
";

const COLUMNS: &str =
    "subject, scope, expires_at, cause_code, renewable, note, created_at, updated_at";

/// Persistent expiry records, backed by SQLStore (SQLite).
pub struct SqlSignalStore {
    db: Arc<dyn SQLStore>,
}

impl SqlSignalStore {
    /// Create a new SqlSignalStore and initialise the schema.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("expiry schema init: {e}")))?;
        Ok(Self { db })
    }
}

impl SignalStore for SqlSignalStore {
    fn upsert(
        &self,
        upsert: &ExpiryUpsert,
        written_at: DateTime<Utc>,
    ) -> Result<ExpiryRecord, ServiceError> {
        let sql = format!(
            "INSERT INTO expiry_records \
                 (subject, scope_key, scope, expires_at, cause_code, \
                  renewable, note, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
             ON CONFLICT (subject, scope_key) DO UPDATE SET \
                 expires_at = excluded.expires_at, \
                 cause_code = excluded.cause_code, \
                 renewable  = excluded.renewable, \
                 note       = excluded.note, \
                 updated_at = excluded.updated_at \
             RETURNING {COLUMNS}"
        );

        let rows = self
            .db
            .query(
                &sql,
                &[
                    Value::from(upsert.identity.subject.as_str()),
                    Value::from(upsert.identity.scope_key()),
                    Value::from(upsert.identity.scope.clone()),
                    Value::Integer(to_epoch_millis(upsert.expires_at)),
                    Value::from(upsert.cause_code.clone()),
                    Value::from(upsert.renewable),
                    Value::from(upsert.note.clone()),
                    Value::Integer(to_epoch_millis(written_at)),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let row = rows
            .first()
            .ok_or_else(|| ServiceError::Storage("upsert returned no row".into()))?;
        row_to_record(row)
    }

    fn lookup(&self, identity: &Identity) -> Result<Option<ExpiryRecord>, ServiceError> {
        let sql =
            format!("SELECT {COLUMNS} FROM expiry_records WHERE subject = ?1 AND scope_key = ?2");
        let rows = self
            .db
            .query(
                &sql,
                &[
                    Value::from(identity.subject.as_str()),
                    Value::from(identity.scope_key()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        rows.first().map(row_to_record).transpose()
    }
}

/// Decode an ExpiryRecord from a row of [`COLUMNS`].
fn row_to_record(row: &Row) -> Result<ExpiryRecord, ServiceError> {
    let instant = |name: &str| -> Result<DateTime<Utc>, ServiceError> {
        row.get_i64(name)
            .and_then(from_epoch_millis)
            .ok_or_else(|| ServiceError::Storage(format!("bad expiry row: {name}")))
    };

    Ok(ExpiryRecord {
        subject: row
            .get_str("subject")
            .ok_or_else(|| ServiceError::Storage("bad expiry row: subject".into()))?
            .to_string(),
        scope: row.get_str("scope").map(String::from),
        expires_at: instant("expires_at")?,
        cause_code: row.get_str("cause_code").map(String::from),
        renewable: row.get_bool("renewable"),
        note: row.get_str("note").map(String::from),
        created_at: instant("created_at")?,
        updated_at: instant("updated_at")?,
    })
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store. Used by tests and `memory:` database URLs.
#[derive(Default)]
pub struct MemorySignalStore {
    records: RwLock<BTreeMap<Identity, ExpiryRecord>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SignalStore for MemorySignalStore {
    fn upsert(
        &self,
        upsert: &ExpiryUpsert,
        written_at: DateTime<Utc>,
    ) -> Result<ExpiryRecord, ServiceError> {
        if upsert.identity.subject.is_empty() {
            return Err(ServiceError::Storage("subject must not be empty".into()));
        }

        let mut records = self
            .records
            .write()
            .map_err(|e| ServiceError::Storage(format!("memory store poisoned: {e}")))?;

        let created_at = records
            .get(&upsert.identity)
            .map(|r| r.created_at)
            .unwrap_or(written_at);

        let record = ExpiryRecord {
            subject: upsert.identity.subject.clone(),
            scope: upsert.identity.scope.clone(),
            expires_at: upsert.expires_at,
            cause_code: upsert.cause_code.clone(),
            renewable: upsert.renewable,
            note: upsert.note.clone(),
            created_at,
            updated_at: written_at,
        };
        records.insert(upsert.identity.clone(), record.clone());
        Ok(record)
    }

    fn lookup(&self, identity: &Identity) -> Result<Option<ExpiryRecord>, ServiceError> {
        let records = self
            .records
            .read()
            .map_err(|e| ServiceError::Storage(format!("memory store poisoned: {e}")))?;
        Ok(records.get(identity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expirysignal_core::parse_instant;
    use expirysignal_sql::SqliteStore;

    fn at(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    fn sql_store() -> SqlSignalStore {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        SqlSignalStore::new(db).unwrap()
    }

    fn upsert(subject: &str, scope: Option<&str>, expires_at: &str) -> ExpiryUpsert {
        ExpiryUpsert {
            identity: Identity::new(subject, scope.map(String::from)),
            expires_at: at(expires_at),
            cause_code: None,
            renewable: None,
            note: None,
        }
    }

    /// Run the same contract checks against every implementation.
    fn stores() -> Vec<(&'static str, Box<dyn SignalStore>)> {
        vec![
            ("sql", Box::new(sql_store())),
            ("memory", Box::new(MemorySignalStore::new())),
        ]
    }

    #[test]
    fn lookup_missing_is_none() {
        for (name, store) in stores() {
            let got = store.lookup(&Identity::new("ghost", None)).unwrap();
            assert!(got.is_none(), "{name}");
        }
    }

    #[test]
    fn upsert_then_lookup() {
        for (name, store) in stores() {
            let mut u = upsert("user-42", Some("billing"), "2025-01-01T00:00:00Z");
            u.cause_code = Some("TRIAL_END".into());
            u.renewable = Some(true);
            u.note = Some("from ops".into());

            let written = store.upsert(&u, at("2024-06-01T00:00:00Z")).unwrap();
            assert_eq!(written.subject, "user-42", "{name}");
            assert_eq!(written.created_at, at("2024-06-01T00:00:00Z"), "{name}");

            let got = store.lookup(&u.identity).unwrap().unwrap();
            assert_eq!(got, written, "{name}");
            assert_eq!(got.scope.as_deref(), Some("billing"), "{name}");
            assert_eq!(got.renewable, Some(true), "{name}");
            assert_eq!(got.note.as_deref(), Some("from ops"), "{name}");
        }
    }

    #[test]
    fn second_write_replaces_not_merges() {
        for (name, store) in stores() {
            let mut first = upsert("u", None, "2025-01-01T00:00:00Z");
            first.cause_code = Some("A".into());
            first.renewable = Some(false);
            first.note = Some("first".into());
            store.upsert(&first, at("2024-01-01T00:00:00Z")).unwrap();

            let second = upsert("u", None, "2026-01-01T00:00:00Z");
            store.upsert(&second, at("2024-02-01T00:00:00Z")).unwrap();

            let got = store.lookup(&second.identity).unwrap().unwrap();
            assert_eq!(got.expires_at, at("2026-01-01T00:00:00Z"), "{name}");
            assert_eq!(got.cause_code, None, "{name}");
            assert_eq!(got.renewable, None, "{name}");
            assert_eq!(got.note, None, "{name}");
            assert_eq!(got.created_at, at("2024-01-01T00:00:00Z"), "{name}");
            assert_eq!(got.updated_at, at("2024-02-01T00:00:00Z"), "{name}");
        }
    }

    #[test]
    fn absent_scope_is_its_own_identity() {
        for (name, store) in stores() {
            store
                .upsert(&upsert("u", None, "2025-01-01T00:00:00Z"), at("2024-01-01T00:00:00Z"))
                .unwrap();
            store
                .upsert(&upsert("u", Some("a"), "2030-01-01T00:00:00Z"), at("2024-01-01T00:00:00Z"))
                .unwrap();

            let unscoped = store.lookup(&Identity::new("u", None)).unwrap().unwrap();
            let scoped = store.lookup(&Identity::new("u", Some("a".into()))).unwrap().unwrap();
            assert_eq!(unscoped.scope, None, "{name}");
            assert_eq!(unscoped.expires_at, at("2025-01-01T00:00:00Z"), "{name}");
            assert_eq!(scoped.expires_at, at("2030-01-01T00:00:00Z"), "{name}");
            let other = store.lookup(&Identity::new("u", Some("b".into()))).unwrap();
            assert!(other.is_none(), "{name}");
        }
    }

    #[test]
    fn empty_subject_rejected_by_storage() {
        for (name, store) in stores() {
            let err = store
                .upsert(&upsert("", None, "2025-01-01T00:00:00Z"), at("2024-01-01T00:00:00Z"))
                .unwrap_err();
            assert!(matches!(err, ServiceError::Storage(_)), "{name}");
            assert!(store.lookup(&Identity::new("", None)).unwrap().is_none(), "{name}");
        }
    }

    #[test]
    fn concurrent_upserts_leave_one_record() {
        let store: Arc<dyn SignalStore> = Arc::new(sql_store());
        let expiries: Vec<String> = (0..8).map(|i| format!("203{i}-01-01T00:00:00Z")).collect();

        std::thread::scope(|s| {
            for expiry in &expiries {
                let store = Arc::clone(&store);
                s.spawn(move || {
                    store
                        .upsert(&upsert("racer", None, expiry), at("2024-01-01T00:00:00Z"))
                        .unwrap();
                });
            }
        });

        let got = store.lookup(&Identity::new("racer", None)).unwrap().unwrap();
        assert!(expiries.iter().any(|e| at(e) == got.expires_at));
    }

    #[test]
    fn sql_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expiry.sqlite");
        {
            let store = SqlSignalStore::new(Arc::new(SqliteStore::open(&path).unwrap())).unwrap();
            store
                .upsert(
                    &upsert("durable", None, "2025-01-01T00:00:00Z"),
                    at("2024-01-01T00:00:00Z"),
                )
                .unwrap();
        }
        let store = SqlSignalStore::new(Arc::new(SqliteStore::open(&path).unwrap())).unwrap();
        let got = store.lookup(&Identity::new("durable", None)).unwrap().unwrap();
        assert_eq!(got.expires_at, at("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn memory_store_counts_identities() {
        let store = MemorySignalStore::new();
        assert!(store.is_empty());
        store
            .upsert(&upsert("a", None, "2025-01-01T00:00:00Z"), at("2024-01-01T00:00:00Z"))
            .unwrap();
        store
            .upsert(&upsert("a", None, "2026-01-01T00:00:00Z"), at("2024-01-01T00:00:00Z"))
            .unwrap();
        store
            .upsert(&upsert("a", Some("x"), "2026-01-01T00:00:00Z"), at("2024-01-01T00:00:00Z"))
            .unwrap();
        assert_eq!(store.len(), 2);
    }
}
