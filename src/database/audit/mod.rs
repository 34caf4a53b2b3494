//! Audit log rule storage
//!
//! The [`RuleStore`] trait is the seam between the Terraform lifecycle code
//! and the database. [`MySqlRuleStore`] runs against the configured pool.

mod rules;

#[cfg(test)]
pub(crate) mod testing;

pub use rules::{AuditRule, MySqlRuleStore, RuleFields, RuleStatements, RuleStore, StoreError};
