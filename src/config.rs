//! Plugin process configuration
//!
//! This is the configuration of the plugin binary itself, separate from the
//! Terraform `provider` block (see [`crate::provider::ProviderConnectionConfig`]).
//! Settings are layered from an optional TOML file and `CLOUDSQL_AUDITLOG_*`
//! environment variables.

use anyhow::{anyhow, Result};
use config::Config;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable prefix for plugin settings
pub const ENV_PREFIX: &str = "CLOUDSQL_AUDITLOG";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "CLOUDSQL_AUDITLOG_CONFIG";

/// Registry address used for `TF_REATTACH_PROVIDERS` in debug mode
pub const DEFAULT_PROVIDER_ADDRESS: &str = "registry.terraform.io/local/cloudsql-auditlog";

const DEFAULT_LOG_LEVEL: &str = "info";

/// A named TLS profile that the provider block can select with `tls = "<name>"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TlsProfile {
    /// PEM bundle of CA certificates trusted for the server certificate
    pub ca_cert: Option<PathBuf>,

    /// Accept any server certificate
    pub skip_verify: bool,

    /// Verify the chain but not the host name
    pub skip_domain_validation: bool,
}

/// Raw shape of the configuration sources
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    log_level: Option<String>,
    provider_address: Option<String>,
    tls_profiles: HashMap<String, TlsProfile>,
}

#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Log level used when `TF_LOG_PROVIDER`/`TF_LOG` are not set
    pub log_level: String,

    /// Provider source address printed for debug-mode reattach
    pub provider_address: String,

    /// Custom TLS profiles by name
    pub tls_profiles: HashMap<String, TlsProfile>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            provider_address: DEFAULT_PROVIDER_ADDRESS.to_string(),
            tls_profiles: HashMap::new(),
        }
    }
}

impl PluginConfig {
    /// Load the configuration.
    ///
    /// The file is taken from `path`, then `CLOUDSQL_AUDITLOG_CONFIG`, then
    /// `$HOME/.cloudsql-auditlog.toml`. A missing default file is not an
    /// error; a missing explicit file is.
    pub fn new(path: &Option<String>) -> Result<PluginConfig> {
        let mut builder = Config::builder();

        let explicit = path
            .clone()
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .filter(|p| !p.is_empty());

        match explicit {
            Some(p) => {
                if !Path::new(p.as_str()).exists() {
                    return Err(anyhow!("Configuration file '{}' does not exist", p));
                }
                builder = builder.add_source(config::File::with_name(p.as_str()));
            }
            None => {
                if let Some(p) = Self::default_file_path() {
                    if p.exists() {
                        builder = builder.add_source(config::File::from(p));
                    }
                }
            }
        }

        // E.g., `CLOUDSQL_AUDITLOG_LOG_LEVEL=debug` overrides the file
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let raw = settings
            .try_deserialize::<RawConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> PluginConfig {
        let defaults = PluginConfig::default();
        PluginConfig {
            log_level: raw
                .log_level
                .filter(|l| !l.trim().is_empty())
                .unwrap_or(defaults.log_level),
            provider_address: raw
                .provider_address
                .filter(|a| !a.trim().is_empty())
                .unwrap_or(defaults.provider_address),
            tls_profiles: raw.tls_profiles,
        }
    }

    /// Default configuration file location, `$HOME/.cloudsql-auditlog.toml`
    pub fn default_file_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".cloudsql-auditlog.toml"))
    }

    /// Log level, honoring Terraform's `TF_LOG_PROVIDER` then `TF_LOG`
    pub fn effective_log_level(&self) -> String {
        ["TF_LOG_PROVIDER", "TF_LOG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.log_level.clone())
    }

    /// Look up a TLS profile by name
    pub fn tls_profile(&self, name: &str) -> Option<&TlsProfile> {
        self.tls_profiles.get(name)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut names: Vec<&str> = self.tls_profiles.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        [
            format!("Log Level:          {}", self.log_level),
            format!("Provider Address:   {}", self.provider_address),
            format!("TLS Profiles:       {}", names.join(", ")),
        ]
        .join("\n")
    }
}
