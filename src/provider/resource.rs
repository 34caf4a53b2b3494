//! The `audit_log_rule` resource
//!
//! Maps Terraform's resource lifecycle onto the rule store. State is the
//! object `{id, username, dbname, object, operation, op_result}` with `id` a
//! decimal string.

use super::error::{ProviderError, Step};
use super::schema::{audit_log_rule_schema, Schema, RULE_FIELDS};
use super::value::Value;
use crate::database::{RuleFields, RuleStore, StoreError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Suffix appended to the provider type name
pub const RESOURCE_TYPE_SUFFIX: &str = "_audit_log_rule";

/// Read the five rule fields of a plan or state object
pub fn rule_fields(value: &Value) -> Result<RuleFields, ProviderError> {
    let field = |name: &'static str| {
        value
            .get(name)
            .as_str()
            .map(str::to_string)
            .ok_or(ProviderError::MissingAttribute(name))
    };
    let [username, dbname, object, operation, op_result] = RULE_FIELDS;
    Ok(RuleFields {
        username: field(username)?,
        dbname: field(dbname)?,
        object: field(object)?,
        operation: field(operation)?,
        op_result: field(op_result)?,
    })
}

/// State object for a stored rule
pub fn rule_state(id: Value, fields: &RuleFields) -> Value {
    Value::object([
        ("id", id),
        ("username", Value::string(&fields.username)),
        ("dbname", Value::string(&fields.dbname)),
        ("object", Value::string(&fields.object)),
        ("operation", Value::string(&fields.operation)),
        ("op_result", Value::string(&fields.op_result)),
    ])
}

fn parse_id(value: &Value) -> Result<i64, ProviderError> {
    let raw = value.get("id").as_str().unwrap_or_default();
    raw.parse::<i64>().map_err(|e| ProviderError::Conversion {
        id: raw.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Clone)]
pub struct AuditLogRuleResource {
    store: Arc<dyn RuleStore>,
}

impl AuditLogRuleResource {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    pub fn schema() -> Schema {
        audit_log_rule_schema()
    }

    /// Planned state for a change.
    ///
    /// Destroy plans null. Create plans an unknown `id`. Update keeps the
    /// prior `id`; every field change is an in-place update.
    pub fn plan(prior: &Value, proposed: &Value) -> Value {
        if proposed.is_null() {
            return Value::Null;
        }
        if prior.is_null() {
            return proposed.with_attribute("id", Value::Unknown);
        }
        proposed.with_attribute("id", prior.get("id").clone())
    }

    /// Create a rule, refusing a duplicate of an existing 5-tuple.
    ///
    /// The duplicate check and the insert are separate statements; two
    /// concurrent creates of the same tuple can both pass the check.
    pub async fn create(&self, planned: &Value) -> Result<Value, ProviderError> {
        let fields = rule_fields(planned)?;

        match self.store.find_id_by_fields(&fields).await {
            Ok(existing_id) => return Err(ProviderError::Conflict { existing_id }),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(ProviderError::driver(Step::CheckExisting, e)),
        }

        let inserted = self
            .store
            .create(&fields)
            .await
            .map_err(|e| ProviderError::driver(Step::Create, e))?;

        let id = match inserted {
            Some(id) => id,
            None => {
                debug!("Driver reported no insert id, looking the rule up");
                self.store
                    .find_id_by_fields(&fields)
                    .await
                    .map_err(|e| ProviderError::driver(Step::LookupAfterCreate, e))?
            }
        };

        info!("Created audit log rule {} for user {}", id, fields.username);
        Ok(rule_state(Value::string(id.to_string()), &fields))
    }

    /// Refresh state from the store; `None` when the rule no longer exists
    pub async fn read(&self, state: &Value) -> Result<Option<Value>, ProviderError> {
        let id = parse_id(state)?;
        match self.store.read_by_id(id).await {
            Ok(rule) => Ok(Some(rule_state(
                Value::string(rule.id.to_string()),
                &rule.fields,
            ))),
            Err(StoreError::NotFound) => {
                warn!("Audit log rule {} not found, removing from state", id);
                Ok(None)
            }
            Err(e) => Err(ProviderError::driver(Step::Read, e)),
        }
    }

    /// Replace all five fields of the rule; the id stays
    pub async fn update(&self, prior: &Value, planned: &Value) -> Result<Value, ProviderError> {
        let source = if planned.get("id").as_str().is_some() {
            planned
        } else {
            prior
        };
        let id = parse_id(source)?;
        let fields = rule_fields(planned)?;

        self.store
            .update_by_id(id, &fields)
            .await
            .map_err(|e| ProviderError::driver(Step::Update, e))?;

        info!("Updated audit log rule {}", id);
        Ok(rule_state(Value::string(id.to_string()), &fields))
    }

    pub async fn delete(&self, prior: &Value) -> Result<(), ProviderError> {
        let id = parse_id(prior)?;
        self.store
            .delete_by_id(id)
            .await
            .map_err(|e| ProviderError::driver(Step::Delete, e))?;
        info!("Deleted audit log rule {}", id);
        Ok(())
    }

    /// State for `terraform import`; the next read fills the fields
    pub fn import(id: &str) -> Value {
        let mut attrs = vec![("id", Value::string(id))];
        attrs.extend(RULE_FIELDS.into_iter().map(|name| (name, Value::Null)));
        Value::object(attrs)
    }
}
