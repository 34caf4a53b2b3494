#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Cloud SQL audit log provider - A Terraform provider for MySQL audit log rules
//!
//! The provider manages rows of the `mysql.audit_rules` table, which the
//! Cloud SQL audit plugin reads to decide which statements to log. It runs as
//! a Terraform plugin binary speaking protocol version 6 over gRPC, and can
//! also be used as a library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `cli` | Plugin binary with argument parsing and stderr logging | `clap`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - **[`database`]**: MySQL access
//!   - `core`: Connection settings, endpoint parsing, and the connection pool
//!   - `audit`: Audit log rule statements and the [`RuleStore`] trait
//!
//! - **[`provider`]**: Terraform semantics independent of the wire protocol
//!   - Schemas, the dynamic [`Value`] tree, and diagnostics
//!   - The `audit_log_rule` resource and `audit_log_rules` data source
//!
//! - **[`server`]**: The plugin process
//!   - go-plugin handshake, AutoMTLS, and the tfplugin6 gRPC service
//!
//! - **[`config`]**: Plugin process configuration
//!
//! # Quick Start Examples
//!
//! ## Serving the Plugin
//!
//! ```rust,ignore
//! use cloudsql_auditlog::server::{serve, ServeOptions};
//! use cloudsql_auditlog::PluginConfig;
//!
//! let config = PluginConfig::new(&None)?;
//! serve(&config, ServeOptions::new()).await?;
//! ```
//!
//! ## Using the Rule Store Directly
//!
//! ```rust,ignore
//! use cloudsql_auditlog::database::{build, ConnectionSettings, Engine, TlsMode};
//! use cloudsql_auditlog::{MySqlRuleStore, RuleFields, RuleStore};
//!
//! let handle = build(&settings, &config.tls_profiles)?;
//! let store = MySqlRuleStore::new(&handle);
//!
//! let fields = RuleFields::new("user@%", "*", "*", "*", "B");
//! let id = store.create(&fields).await?;
//! for rule in store.list_all().await? {
//!     println!("{}: {}", rule.id, rule.fields.username);
//! }
//! ```

pub mod config;
pub mod database;
pub mod provider;
pub mod server;

// =============================================================================
// Configuration
// =============================================================================

pub use config::{PluginConfig, TlsProfile};

// =============================================================================
// Database Module - Re-export commonly used types
// =============================================================================

pub use database::{
    AuditRule, ConnectError, ConnectionHandle, ConnectionSettings, Endpoint, Engine,
    MySqlRuleStore, RuleFields, RuleStore, StoreError, TlsMode,
};

// =============================================================================
// Provider Module
// =============================================================================

pub use provider::{
    AuditLogProvider, AuditLogRuleResource, AuditLogRulesDataSource, Diagnostic, Diagnostics,
    ProviderError, Value,
};

// =============================================================================
// Server Module
// =============================================================================

pub use server::{serve, ServeOptions};
