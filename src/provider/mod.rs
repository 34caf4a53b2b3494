//! Provider module
//!
//! Protocol-independent provider logic:
//!
//! - **config**: validation of the Terraform `provider` block
//! - **resource**: the `audit_log_rule` resource lifecycle
//! - **data_source**: the `audit_log_rules` list
//! - **schema** / **value** / **diagnostics**: the shapes exchanged with Terraform
//!
//! [`AuditLogProvider`] owns the configured state. It starts unconfigured;
//! `ConfigureProvider` builds the connection once and every resource and data
//! source built afterwards shares it.

pub mod config;
pub mod data_source;
pub mod diagnostics;
pub mod error;
pub mod resource;
pub mod schema;
pub mod value;

pub use config::ProviderConnectionConfig;
pub use data_source::{AuditLogRulesDataSource, DATA_SOURCE_TYPE_SUFFIX};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{ProviderError, Step};
pub use resource::{AuditLogRuleResource, RESOURCE_TYPE_SUFFIX};
pub use schema::{Attribute, AttributeKind, AttributeType, Schema};
pub use value::Value;

use crate::config::{PluginConfig, TlsProfile};
use crate::database::{build, ConnectionHandle, Engine, MySqlRuleStore, RuleStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Provider type name; resource and data source names are prefixed with it
pub const PROVIDER_TYPE_NAME: &str = "cloudsql-auditlog";

/// State produced by a successful configure
pub struct ConfiguredProvider {
    pub engine: Engine,
    pub store: Arc<dyn RuleStore>,
    handle: Option<ConnectionHandle>,
}

impl ConfiguredProvider {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            engine: handle.engine(),
            store: Arc::new(MySqlRuleStore::new(&handle)),
            handle: Some(handle),
        }
    }

    /// Configured state over an arbitrary store, without a pool to close
    pub fn with_store(engine: Engine, store: Arc<dyn RuleStore>) -> Self {
        Self {
            engine,
            store,
            handle: None,
        }
    }
}

pub struct AuditLogProvider {
    tls_profiles: HashMap<String, TlsProfile>,
    configured: RwLock<Option<Arc<ConfiguredProvider>>>,
}

impl AuditLogProvider {
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            tls_profiles: config.tls_profiles.clone(),
            configured: RwLock::new(None),
        }
    }

    pub fn resource_type_name() -> String {
        format!("{}{}", PROVIDER_TYPE_NAME, RESOURCE_TYPE_SUFFIX)
    }

    pub fn data_source_type_name() -> String {
        format!("{}{}", PROVIDER_TYPE_NAME, DATA_SOURCE_TYPE_SUFFIX)
    }

    pub fn schema() -> Schema {
        schema::provider_schema()
    }

    /// Validate a provider block that may still contain unknown values
    pub fn validate_config(config: &Value) -> Diagnostics {
        if !config.is_fully_known() {
            return Diagnostics::new();
        }
        match ProviderConnectionConfig::from_value(config) {
            Ok(_) => Diagnostics::new(),
            Err(diags) => diags,
        }
    }

    /// Build the connection from the provider block.
    ///
    /// On any error the provider stays unconfigured.
    pub async fn configure(&self, config: &Value) -> Diagnostics {
        let parsed = match ProviderConnectionConfig::from_value(config) {
            Ok(parsed) => parsed,
            Err(diags) => {
                warn!("Provider configuration rejected: {:?}", diags.summaries());
                return diags;
            }
        };

        let handle = match build(&parsed.settings, &self.tls_profiles) {
            Ok(handle) => handle,
            Err(err) => {
                warn!("Unable to build connection: {}", err);
                return ProviderError::from(err).to_diagnostic().into();
            }
        };

        info!(
            "Configured {} provider for {}@{} (tls: {})",
            handle.engine(),
            parsed.settings.username,
            handle.endpoint(),
            parsed.settings.tls
        );
        self.install(ConfiguredProvider::new(handle)).await;
        Diagnostics::new()
    }

    /// Replace the configured state
    pub async fn install(&self, configured: ConfiguredProvider) {
        let previous = self.configured.write().await.replace(Arc::new(configured));
        if let Some(previous) = previous {
            close(previous).await;
        }
    }

    pub async fn is_configured(&self) -> bool {
        self.configured.read().await.is_some()
    }

    async fn configured(&self) -> Result<Arc<ConfiguredProvider>, ProviderError> {
        self.configured
            .read()
            .await
            .clone()
            .ok_or(ProviderError::NotConfigured)
    }

    pub async fn resource(&self) -> Result<AuditLogRuleResource, ProviderError> {
        let configured = self.configured().await?;
        Ok(AuditLogRuleResource::new(configured.store.clone()))
    }

    pub async fn data_source(&self) -> Result<AuditLogRulesDataSource, ProviderError> {
        let configured = self.configured().await?;
        Ok(AuditLogRulesDataSource::new(configured.store.clone()))
    }

    /// Drop the configured state and close the pool
    pub async fn shutdown(&self) {
        let configured = self.configured.write().await.take();
        if let Some(configured) = configured {
            close(configured).await;
        }
    }
}

async fn close(configured: Arc<ConfiguredProvider>) {
    if let Some(handle) = configured.handle.clone() {
        let endpoint = handle.endpoint().to_string();
        match handle.disconnect().await {
            Ok(()) => info!("Closed connection pool for {}", endpoint),
            Err(e) => warn!("{}", e),
        }
    }
}
