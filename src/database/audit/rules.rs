//! Audit log rule repository
//!
//! Six parameterized statements against the `audit_rules` table in the
//! `mysql` schema. The table is owned by the database server; this module
//! never creates or migrates it.

use crate::database::core::ConnectionHandle;
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{from_value_opt, Conn, Pool, Row};
use serde::Serialize;
use tracing::debug;

/// SQL statements shared by every [`RuleStore`] implementation
pub struct RuleStatements;

impl RuleStatements {
    pub const TABLE: &'static str = "audit_rules";

    pub const FIND_ID_BY_FIELDS: &'static str = r#"
        SELECT id FROM audit_rules
        WHERE username = ? AND dbname = ? AND object = ? AND operation = ? AND op_result = ?
        LIMIT 1
    "#;

    pub const INSERT: &'static str = r#"
        INSERT INTO audit_rules (username, dbname, object, operation, op_result)
        VALUES (?, ?, ?, ?, ?)
    "#;

    pub const READ_BY_ID: &'static str = r#"
        SELECT id, username, dbname, object, operation, op_result
        FROM audit_rules WHERE id = ?
    "#;

    pub const LIST_ALL: &'static str = r#"
        SELECT id, username, dbname, object, operation, op_result
        FROM audit_rules ORDER BY id
    "#;

    pub const UPDATE_BY_ID: &'static str = r#"
        UPDATE audit_rules
        SET username = ?, dbname = ?, object = ?, operation = ?, op_result = ?
        WHERE id = ?
    "#;

    pub const DELETE_BY_ID: &'static str = "DELETE FROM audit_rules WHERE id = ?";
}

/// The five user-supplied fields of a rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleFields {
    pub username: String,
    pub dbname: String,
    pub object: String,
    pub operation: String,
    pub op_result: String,
}

impl RuleFields {
    pub fn new(
        username: impl Into<String>,
        dbname: impl Into<String>,
        object: impl Into<String>,
        operation: impl Into<String>,
        op_result: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            dbname: dbname.into(),
            object: object.into(),
            operation: operation.into(),
            op_result: op_result.into(),
        }
    }

    fn params(&self) -> (String, String, String, String, String) {
        (
            self.username.clone(),
            self.dbname.clone(),
            self.object.clone(),
            self.operation.clone(),
            self.op_result.clone(),
        )
    }
}

/// A stored rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRule {
    pub id: i64,
    #[serde(flatten)]
    pub fields: RuleFields,
}

impl AuditRule {
    /// Convert the column values of a `READ_BY_ID`/`LIST_ALL` row.
    ///
    /// A NULL or non-text column is a query error rather than a panic.
    fn from_values(values: Vec<mysql_async::Value>) -> Result<Self, StoreError> {
        let mut columns = values.into_iter();
        let id = next_column(&mut columns, "id")?;
        Ok(AuditRule {
            id,
            fields: RuleFields {
                username: next_column(&mut columns, "username")?,
                dbname: next_column(&mut columns, "dbname")?,
                object: next_column(&mut columns, "object")?,
                operation: next_column(&mut columns, "operation")?,
                op_result: next_column(&mut columns, "op_result")?,
            },
        })
    }
}

fn next_column<T: FromValue>(
    columns: &mut impl Iterator<Item = mysql_async::Value>,
    name: &str,
) -> Result<T, StoreError> {
    let value = columns
        .next()
        .ok_or_else(|| StoreError::Query(format!("missing column {}", name)))?;
    from_value_opt(value).map_err(|e| StoreError::Query(format!("column {}: {}", name, e)))
}

/// Column values of a fetched row, in select order
fn row_values(mut row: Row) -> Vec<mysql_async::Value> {
    (0..row.len())
        .filter_map(|idx| row.take_opt::<mysql_async::Value, usize>(idx))
        .filter_map(Result::ok)
        .collect()
}

/// Errors from rule store operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The statement matched no row
    NotFound,
    /// No connection could be taken from the pool
    Connection(String),
    /// A select failed
    Query(String),
    Insert(String),
    Update(String),
    Delete(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "no matching audit rule"),
            StoreError::Connection(msg) => write!(f, "connection error: {}", msg),
            StoreError::Query(msg) => write!(f, "query error: {}", msg),
            StoreError::Insert(msg) => write!(f, "insert error: {}", msg),
            StoreError::Update(msg) => write!(f, "update error: {}", msg),
            StoreError::Delete(msg) => write!(f, "delete error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Operations on the `audit_rules` table
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Id of a rule matching all five fields
    async fn find_id_by_fields(&self, fields: &RuleFields) -> Result<i64, StoreError>;

    /// Insert a rule, returning the generated id when the driver reports one
    async fn create(&self, fields: &RuleFields) -> Result<Option<i64>, StoreError>;

    async fn read_by_id(&self, id: i64) -> Result<AuditRule, StoreError>;

    /// Every rule, ordered by id
    async fn list_all(&self) -> Result<Vec<AuditRule>, StoreError>;

    /// Replace all five fields; a missing id is not an error
    async fn update_by_id(&self, id: i64, fields: &RuleFields) -> Result<(), StoreError>;

    /// Delete by id; a missing id is not an error
    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError>;
}

/// [`RuleStore`] backed by the shared MySQL pool
#[derive(Clone)]
pub struct MySqlRuleStore {
    pool: Pool,
}

impl MySqlRuleStore {
    pub fn new(handle: &ConnectionHandle) -> Self {
        Self {
            pool: handle.pool().clone(),
        }
    }

    async fn conn(&self) -> Result<Conn, StoreError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl RuleStore for MySqlRuleStore {
    async fn find_id_by_fields(&self, fields: &RuleFields) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        let row: Option<Row> = conn
            .exec_first(RuleStatements::FIND_ID_BY_FIELDS, fields.params())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let row = row.ok_or(StoreError::NotFound)?;
        next_column(&mut row_values(row).into_iter(), "id")
    }

    async fn create(&self, fields: &RuleFields) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn().await?;
        conn.exec_drop(RuleStatements::INSERT, fields.params())
            .await
            .map_err(|e| StoreError::Insert(e.to_string()))?;
        let id = conn
            .last_insert_id()
            .filter(|id| *id > 0)
            .and_then(|id| i64::try_from(id).ok());
        debug!("Inserted audit rule {:?} (id: {:?})", fields, id);
        Ok(id)
    }

    async fn read_by_id(&self, id: i64) -> Result<AuditRule, StoreError> {
        let mut conn = self.conn().await?;
        let row: Option<Row> = conn
            .exec_first(RuleStatements::READ_BY_ID, (id,))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let row = row.ok_or(StoreError::NotFound)?;
        AuditRule::from_values(row_values(row))
    }

    async fn list_all(&self) -> Result<Vec<AuditRule>, StoreError> {
        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .query(RuleStatements::LIST_ALL)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.into_iter()
            .map(|row| AuditRule::from_values(row_values(row)))
            .collect()
    }

    async fn update_by_id(&self, id: i64, fields: &RuleFields) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let (username, dbname, object, operation, op_result) = fields.params();
        conn.exec_drop(
            RuleStatements::UPDATE_BY_ID,
            (username, dbname, object, operation, op_result, id),
        )
        .await
        .map_err(|e| StoreError::Update(e.to_string()))?;
        debug!("Updated audit rule {} ({} rows)", id, conn.affected_rows());
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.exec_drop(RuleStatements::DELETE_BY_ID, (id,))
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        debug!("Deleted audit rule {} ({} rows)", id, conn.affected_rows());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::audit::testing::SqliteRuleStore;

    fn fields(user: &str) -> RuleFields {
        RuleFields::new(user, "*", "*", "*", "*")
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let store = SqliteRuleStore::new().unwrap();
        let f = RuleFields::new("alice", "sales", "orders", "select", "succeed");

        let id = store.create(&f).await.unwrap().unwrap();
        let rule = store.read_by_id(id).await.unwrap();
        assert_eq!(rule.id, id);
        assert_eq!(rule.fields, f);
    }

    #[tokio::test]
    async fn test_find_id_by_fields() {
        let store = SqliteRuleStore::new().unwrap();
        let id = store.create(&fields("alice")).await.unwrap().unwrap();
        store.create(&fields("bob")).await.unwrap();

        assert_eq!(store.find_id_by_fields(&fields("alice")).await, Ok(id));
        assert_eq!(
            store.find_id_by_fields(&fields("carol")).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let store = SqliteRuleStore::new().unwrap();
        let err = store.read_by_id(42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let store = SqliteRuleStore::new().unwrap();
        let id = store.create(&fields("alice")).await.unwrap().unwrap();

        let updated = RuleFields::new("alice", "hr", "salaries", "update", "fail");
        store.update_by_id(id, &updated).await.unwrap();

        let rule = store.read_by_id(id).await.unwrap();
        assert_eq!(rule.id, id);
        assert_eq!(rule.fields, updated);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_id_succeed() {
        let store = SqliteRuleStore::new().unwrap();
        store.update_by_id(99, &fields("ghost")).await.unwrap();
        store.delete_by_id(99).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_then_read() {
        let store = SqliteRuleStore::new().unwrap();
        let id = store.create(&fields("alice")).await.unwrap().unwrap();
        store.delete_by_id(id).await.unwrap();
        assert_eq!(store.read_by_id(id).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_list_all_ordered_by_id() {
        let store = SqliteRuleStore::new().unwrap();
        assert!(store.list_all().await.unwrap().is_empty());

        let mut ids = Vec::new();
        for user in ["carol", "alice", "bob"] {
            ids.push(store.create(&fields(user)).await.unwrap().unwrap());
        }

        let rules = store.list_all().await.unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
        assert_eq!(rules[0].fields.username, "carol");
    }

    #[tokio::test]
    async fn test_errors_are_classified() {
        let store = SqliteRuleStore::new().unwrap();
        store.drop_table();

        assert!(matches!(
            store.find_id_by_fields(&fields("a")).await,
            Err(StoreError::Query(_))
        ));
        assert!(matches!(
            store.create(&fields("a")).await,
            Err(StoreError::Insert(_))
        ));
        assert!(matches!(store.list_all().await, Err(StoreError::Query(_))));
        assert!(matches!(
            store.update_by_id(1, &fields("a")).await,
            Err(StoreError::Update(_))
        ));
        assert!(matches!(
            store.delete_by_id(1).await,
            Err(StoreError::Delete(_))
        ));
    }

    fn mysql_row(op_result: mysql_async::Value) -> Vec<mysql_async::Value> {
        use mysql_async::Value::{Bytes, Int};
        vec![
            Int(7),
            Bytes(b"alice".to_vec()),
            Bytes(b"sales".to_vec()),
            Bytes(b"*".to_vec()),
            Bytes(b"select".to_vec()),
            op_result,
        ]
    }

    #[test]
    fn test_mysql_row_conversion() {
        let rule = AuditRule::from_values(mysql_row(mysql_async::Value::Bytes(b"B".to_vec())))
            .unwrap();
        assert_eq!(rule.id, 7);
        assert_eq!(
            rule.fields,
            RuleFields::new("alice", "sales", "*", "select", "B")
        );

        // text protocol rows carry the id as bytes
        let mut text = mysql_row(mysql_async::Value::Bytes(b"B".to_vec()));
        text[0] = mysql_async::Value::Bytes(b"7".to_vec());
        assert_eq!(AuditRule::from_values(text).unwrap().id, 7);
    }

    #[test]
    fn test_mysql_row_conversion_errors() {
        let null = AuditRule::from_values(mysql_row(mysql_async::Value::NULL)).unwrap_err();
        assert!(matches!(&null, StoreError::Query(msg) if msg.contains("op_result")));

        let invalid_utf8 =
            AuditRule::from_values(mysql_row(mysql_async::Value::Bytes(vec![0xff, 0xfe])));
        assert!(matches!(invalid_utf8, Err(StoreError::Query(_))));

        let short = AuditRule::from_values(vec![mysql_async::Value::Int(1)]).unwrap_err();
        assert_eq!(short, StoreError::Query("missing column username".to_string()));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(StoreError::NotFound.to_string(), "no matching audit rule");
        assert_eq!(
            StoreError::Insert("duplicate".to_string()).to_string(),
            "insert error: duplicate"
        );
    }

    #[test]
    fn test_audit_rule_serializes_flat() {
        let rule = AuditRule {
            id: 7,
            fields: fields("alice"),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["username"], "alice");
        assert_eq!(json["op_result"], "*");
    }
}
