//! The Terraform `provider` block

use super::diagnostics::{Diagnostic, Diagnostics};
use super::error::ProviderError;
use super::value::Value;
use crate::database::{ConnectError, ConnectionSettings, Engine, TlsMode};

/// Validated contents of the provider block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConnectionConfig {
    pub settings: ConnectionSettings,
}

impl ProviderConnectionConfig {
    /// Validate the provider block.
    ///
    /// Every problem is reported, not just the first. Unknown values are
    /// rejected before emptiness is checked.
    pub fn from_value(config: &Value) -> Result<Self, Diagnostics> {
        let mut diags = Diagnostics::new();

        for (attr, what) in [
            ("endpoint", "mysql endpoint"),
            ("username", "mysql username"),
            ("password", "mysql password"),
            ("engine", "engine type"),
            ("tls", "tls mode"),
        ] {
            if config.get(attr).is_unknown() {
                diags.push(Diagnostic::attribute_error(
                    attr,
                    format!("Unknown {}", attr),
                    format!("Must set {}", what),
                ));
            }
        }
        if diags.has_errors() {
            return Err(diags);
        }

        let string_of = |attr: &str| config.get(attr).as_str().unwrap_or_default().to_string();
        let endpoint = string_of("endpoint");
        let username = string_of("username");
        let engine = string_of("engine");

        if endpoint.trim().is_empty() {
            diags.push(ProviderError::from(ConnectError::MissingField("endpoint")).to_diagnostic());
        }
        if username.is_empty() {
            diags.push(ProviderError::from(ConnectError::MissingField("username")).to_diagnostic());
        }
        let engine = match Engine::parse(&engine) {
            Ok(engine) => Some(engine),
            Err(err) => {
                diags.push(ProviderError::from(err).to_diagnostic());
                None
            }
        };

        match engine {
            Some(engine) if !diags.has_errors() => Ok(Self {
                settings: ConnectionSettings {
                    engine,
                    endpoint,
                    username,
                    password: config.get("password").as_str().map(str::to_string),
                    tls: TlsMode::parse(config.get("tls").as_str()),
                },
            }),
            _ => Err(diags),
        }
    }
}
