//! The `audit_log_rules` data source

use super::error::{ProviderError, Step};
use super::schema::{audit_log_rules_schema, Schema};
use super::value::Value;
use crate::database::{AuditRule, RuleStore};
use std::sync::Arc;
use tracing::debug;

/// Suffix appended to the provider type name
pub const DATA_SOURCE_TYPE_SUFFIX: &str = "_audit_log_rules";

fn rule_element(rule: &AuditRule) -> Value {
    Value::object([
        ("id", Value::Number(rule.id)),
        ("username", Value::string(&rule.fields.username)),
        ("dbname", Value::string(&rule.fields.dbname)),
        ("object", Value::string(&rule.fields.object)),
        ("operation", Value::string(&rule.fields.operation)),
        ("op_result", Value::string(&rule.fields.op_result)),
    ])
}

#[derive(Clone)]
pub struct AuditLogRulesDataSource {
    store: Arc<dyn RuleStore>,
}

impl AuditLogRulesDataSource {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    pub fn schema() -> Schema {
        audit_log_rules_schema()
    }

    /// Every stored rule as `{audit_log_rules = [...]}`
    pub async fn read(&self) -> Result<Value, ProviderError> {
        let rules = self
            .store
            .list_all()
            .await
            .map_err(|e| ProviderError::driver(Step::List, e))?;
        debug!("Listed {} audit log rules", rules.len());

        Ok(Value::object([(
            "audit_log_rules",
            Value::List(rules.iter().map(rule_element).collect()),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::audit::testing::SqliteRuleStore;
    use crate::database::RuleFields;

    #[tokio::test]
    async fn test_empty_table_yields_empty_list() {
        let ds = AuditLogRulesDataSource::new(Arc::new(SqliteRuleStore::new().unwrap()));
        let state = ds.read().await.unwrap();
        assert_eq!(state.get("audit_log_rules").as_list(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_lists_every_created_rule() {
        let store = Arc::new(SqliteRuleStore::new().unwrap());
        for user in ["alice", "bob", "carol"] {
            store
                .create(&RuleFields::new(user, "*", "*", "*", "*"))
                .await
                .unwrap();
        }

        let ds = AuditLogRulesDataSource::new(store);
        let state = ds.read().await.unwrap();
        let rules = state.get("audit_log_rules").as_list().unwrap();
        assert_eq!(rules.len(), 3);

        let users: Vec<_> = rules
            .iter()
            .map(|r| r.get("username").as_str().unwrap())
            .collect();
        assert_eq!(users, vec!["alice", "bob", "carol"]);
        assert!(rules.iter().all(|r| r.get("id").as_i64().is_some()));
    }

    #[tokio::test]
    async fn test_query_failure() {
        let store = Arc::new(SqliteRuleStore::new().unwrap());
        store.drop_table();
        let err = AuditLogRulesDataSource::new(store).read().await.unwrap_err();
        assert_eq!(err.to_diagnostic().summary, "Unable to query audit rules");
    }
}
