//! In-memory SQLite rule store for tests
//!
//! Runs the same statements as the MySQL store against an in-memory SQLite
//! database with an equivalent `audit_rules` table.

use super::rules::{AuditRule, RuleFields, RuleStatements, RuleStore, StoreError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const SQLITE_AUDIT_RULES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        dbname TEXT NOT NULL,
        object TEXT NOT NULL,
        operation TEXT NOT NULL,
        op_result TEXT NOT NULL
    );
"#;

pub(crate) struct SqliteRuleStore {
    conn: Mutex<Connection>,
}

impl SqliteRuleStore {
    pub(crate) fn new() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SQLITE_AUDIT_RULES_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Make every following statement fail
    pub(crate) fn drop_table(&self) {
        self.conn
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE audit_rules")
            .unwrap();
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRule> {
        Ok(AuditRule {
            id: row.get(0)?,
            fields: RuleFields {
                username: row.get(1)?,
                dbname: row.get(2)?,
                object: row.get(3)?,
                operation: row.get(4)?,
                op_result: row.get(5)?,
            },
        })
    }
}

#[async_trait]
impl RuleStore for SqliteRuleStore {
    async fn find_id_by_fields(&self, f: &RuleFields) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            RuleStatements::FIND_ID_BY_FIELDS,
            params![f.username, f.dbname, f.object, f.operation, f.op_result],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::Query(e.to_string()))?
        .ok_or(StoreError::NotFound)
    }

    async fn create(&self, f: &RuleFields) -> Result<Option<i64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            RuleStatements::INSERT,
            params![f.username, f.dbname, f.object, f.operation, f.op_result],
        )
        .map_err(|e| StoreError::Insert(e.to_string()))?;
        Ok(Some(conn.last_insert_rowid()))
    }

    async fn read_by_id(&self, id: i64) -> Result<AuditRule, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(RuleStatements::READ_BY_ID, params![id], Self::read_row)
            .optional()
            .map_err(|e| StoreError::Query(e.to_string()))?
            .ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> Result<Vec<AuditRule>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(RuleStatements::LIST_ALL)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::read_row)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn update_by_id(&self, id: i64, f: &RuleFields) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            RuleStatements::UPDATE_BY_ID,
            params![f.username, f.dbname, f.object, f.operation, f.op_result, id],
        )
        .map_err(|e| StoreError::Update(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(RuleStatements::DELETE_BY_ID, params![id])
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        Ok(())
    }
}

/// Store whose inserts report no generated id, like a driver that does not
/// return `LAST_INSERT_ID()`
pub(crate) struct NoInsertIdStore {
    inner: SqliteRuleStore,
    /// Fail `find_id_by_fields` calls made after an insert
    fail_lookup_after_insert: bool,
    inserted: AtomicBool,
}

impl NoInsertIdStore {
    pub(crate) fn new(fail_lookup_after_insert: bool) -> rusqlite::Result<Self> {
        Ok(Self {
            inner: SqliteRuleStore::new()?,
            fail_lookup_after_insert,
            inserted: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RuleStore for NoInsertIdStore {
    async fn find_id_by_fields(&self, f: &RuleFields) -> Result<i64, StoreError> {
        if self.fail_lookup_after_insert && self.inserted.load(Ordering::SeqCst) {
            return Err(StoreError::Query("lost connection".to_string()));
        }
        self.inner.find_id_by_fields(f).await
    }

    async fn create(&self, f: &RuleFields) -> Result<Option<i64>, StoreError> {
        self.inner.create(f).await?;
        self.inserted.store(true, Ordering::SeqCst);
        Ok(None)
    }

    async fn read_by_id(&self, id: i64) -> Result<AuditRule, StoreError> {
        self.inner.read_by_id(id).await
    }

    async fn list_all(&self) -> Result<Vec<AuditRule>, StoreError> {
        self.inner.list_all().await
    }

    async fn update_by_id(&self, id: i64, f: &RuleFields) -> Result<(), StoreError> {
        self.inner.update_by_id(id, f).await
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete_by_id(id).await
    }
}
