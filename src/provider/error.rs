//! Provider errors and their diagnostics

use super::diagnostics::Diagnostic;
use crate::database::{ConnectError, StoreError};

/// Rule store step a driver error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CheckExisting,
    Create,
    LookupAfterCreate,
    Read,
    Update,
    Delete,
    List,
}

impl Step {
    fn summary(&self) -> &'static str {
        match self {
            Step::CheckExisting => "Unable to check rule existence",
            Step::Create => "Unable to call audit rule create",
            Step::LookupAfterCreate => "Unable to call read after create",
            Step::Read => "Error reading audit log rule",
            Step::Update => "Unable to call audit rule update",
            Step::Delete => "Unable to call audit rule delete",
            Step::List => "Unable to query audit rules",
        }
    }
}

/// Errors raised while serving provider calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider block could not be turned into a connection
    Configuration(ConnectError),
    /// A resource or data source was used before ConfigureProvider
    NotConfigured,
    /// A rule with the same five fields already exists
    Conflict { existing_id: i64 },
    /// A stored id is not a decimal integer
    Conversion { id: String, reason: String },
    /// A required attribute is null or unknown at apply time
    MissingAttribute(&'static str),
    /// The database driver failed
    Driver { step: Step, source: StoreError },
}

impl ProviderError {
    pub fn driver(step: Step, source: StoreError) -> Self {
        ProviderError::Driver { step, source }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ProviderError::Configuration(err) => configuration_diagnostic(err),
            ProviderError::NotConfigured => Diagnostic::error(
                "Unconfigured provider",
                "The provider must be configured before managing audit log rules",
            ),
            ProviderError::Conflict { existing_id } => Diagnostic::error(
                "Rule already exists",
                format!("existing ID: {}", existing_id),
            ),
            ProviderError::Conversion { id, reason } => Diagnostic::attribute_error(
                "id",
                "Error converting id to int",
                format!("Could not convert rule with id {}: {}", id, reason),
            ),
            ProviderError::MissingAttribute(attr) => Diagnostic::attribute_error(
                *attr,
                "Missing attribute value",
                format!("Attribute {} must be set", attr),
            ),
            ProviderError::Driver { step, source } => {
                Diagnostic::error(step.summary(), source.to_string())
            }
        }
    }
}

fn configuration_diagnostic(err: &ConnectError) -> Diagnostic {
    let detail = err.to_string();
    match err {
        ConnectError::MissingField("endpoint") => Diagnostic::attribute_error(
            "endpoint",
            "Missing mysql endpoint",
            "Must set mysql endpoint",
        ),
        ConnectError::MissingField("username") => Diagnostic::attribute_error(
            "username",
            "Missing mysql username",
            "Must set mysql username",
        ),
        ConnectError::MissingField(field) => {
            Diagnostic::attribute_error(*field, format!("Missing {}", field), detail)
        }
        ConnectError::UnknownEngine(_) => {
            Diagnostic::attribute_error("engine", "Invalid engine", detail)
        }
        ConnectError::UnsupportedEngine(_) => {
            Diagnostic::attribute_error("engine", "Unsupported engine", detail)
        }
        ConnectError::InvalidEndpoint(_) => {
            Diagnostic::attribute_error("endpoint", "Invalid mysql endpoint", detail)
        }
        ConnectError::UnknownTlsProfile(_) => {
            Diagnostic::attribute_error("tls", "Invalid tls", detail)
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_diagnostic())
    }
}

impl std::error::Error for ProviderError {}

impl From<ConnectError> for ProviderError {
    fn from(err: ConnectError) -> Self {
        ProviderError::Configuration(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Engine;

    #[test]
    fn test_conflict_names_existing_id() {
        let d = ProviderError::Conflict { existing_id: 12 }.to_diagnostic();
        assert_eq!(d.summary, "Rule already exists");
        assert_eq!(d.detail, "existing ID: 12");
        assert!(d.is_error());
    }

    #[test]
    fn test_configuration_diagnostics_name_the_field() {
        let d = ProviderError::from(ConnectError::MissingField("endpoint")).to_diagnostic();
        assert_eq!(d.summary, "Missing mysql endpoint");
        assert_eq!(d.attribute.as_deref(), Some("endpoint"));

        let d = ProviderError::from(ConnectError::MissingField("username")).to_diagnostic();
        assert_eq!(d.summary, "Missing mysql username");
        assert_eq!(d.attribute.as_deref(), Some("username"));

        let d = ProviderError::from(ConnectError::UnsupportedEngine(Engine::PostgreSql))
            .to_diagnostic();
        assert_eq!(d.detail, "postgresql not implemented yet");

        let d = ProviderError::from(ConnectError::UnknownEngine("oracle".to_string()))
            .to_diagnostic();
        assert_eq!(d.summary, "Invalid engine");
        assert!(d.detail.contains("\"oracle\""));
    }

    #[test]
    fn test_driver_diagnostic_carries_driver_message() {
        let d = ProviderError::driver(Step::Update, StoreError::Update("lock wait".to_string()))
            .to_diagnostic();
        assert_eq!(d.summary, "Unable to call audit rule update");
        assert_eq!(d.detail, "update error: lock wait");
    }

    #[test]
    fn test_conversion_diagnostic() {
        let d = ProviderError::Conversion {
            id: "abc".to_string(),
            reason: "invalid digit found in string".to_string(),
        }
        .to_diagnostic();
        assert_eq!(d.summary, "Error converting id to int");
        assert_eq!(
            d.detail,
            "Could not convert rule with id abc: invalid digit found in string"
        );
    }
}
