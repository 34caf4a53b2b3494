//! Database module
//!
//! This module provides all database functionality, organized into:
//!
//! - **core**: Connection building (engine, endpoint, TLS, pooled handle)
//! - **audit**: The audit rule repository
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   └── connection  # Engine/TLS parsing and the mysql_async pool handle
//! │
//! └── audit/          # Persistent storage
//!     └── rules       # audit_rules statements and the RuleStore trait
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use cloudsql_auditlog::database::{build, ConnectionSettings, Engine, MySqlRuleStore, RuleStore, TlsMode};
//!
//! let settings = ConnectionSettings {
//!     engine: Engine::MySql,
//!     endpoint: "127.0.0.1:3306".to_string(),
//!     username: "root".to_string(),
//!     password: None,
//!     tls: TlsMode::Disabled,
//! };
//! let handle = build(&settings, &Default::default())?;
//! let store = MySqlRuleStore::new(&handle);
//!
//! for rule in store.list_all().await? {
//!     println!("{} {}", rule.id, rule.fields.username);
//! }
//! ```

pub mod audit;
pub mod core;

pub use audit::{AuditRule, MySqlRuleStore, RuleFields, RuleStatements, RuleStore, StoreError};
pub use core::{
    build, ConnectError, ConnectionHandle, ConnectionSettings, Endpoint, Engine, TlsMode,
    DEFAULT_MYSQL_PORT, RULE_SCHEMA,
};
