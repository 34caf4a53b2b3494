//! Database connection building
//!
//! Turns the provider block's engine, endpoint, credentials, and TLS mode into
//! a pooled connection handle. The pool is created lazily; no connection is
//! opened until the first statement runs.

use crate::config::TlsProfile;
use mysql_async::{Opts, OptsBuilder, PathOrBuf, Pool, SslOpts};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, info};

/// Schema the audit rule table lives in
pub const RULE_SCHEMA: &str = "mysql";

/// Port used when the endpoint omits one
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

// =============================================================================
// Engine
// =============================================================================

/// Relational engine selected by the provider block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    MySql,
    /// Accepted in configuration, not implemented
    PostgreSql,
}

impl Engine {
    /// Parse the `engine` attribute
    pub fn parse(value: &str) -> Result<Engine, ConnectError> {
        match value {
            "mysql" => Ok(Engine::MySql),
            "postgresql" => Ok(Engine::PostgreSql),
            "" => Err(ConnectError::MissingField("engine")),
            other => Err(ConnectError::UnknownEngine(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::MySql => "mysql",
            Engine::PostgreSql => "postgresql",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Engine::MySql)
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// TLS mode
// =============================================================================

/// TLS mode of the database connection, as written in the `tls` attribute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// `false` or absent
    #[default]
    Disabled,
    /// `true`: TLS with full server certificate verification
    Verified,
    /// `skip-verify`: TLS without certificate verification
    SkipVerify,
    /// `preferred`: TLS without certificate verification
    Preferred,
    /// Any other value names a custom profile from the plugin configuration
    Profile(String),
}

impl TlsMode {
    /// Boolean spellings match case-insensitively; profile names are taken
    /// verbatim
    pub fn parse(value: Option<&str>) -> TlsMode {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return TlsMode::Disabled;
        };
        match value.to_ascii_lowercase().as_str() {
            "false" | "0" => TlsMode::Disabled,
            "true" | "1" => TlsMode::Verified,
            "skip-verify" => TlsMode::SkipVerify,
            "preferred" => TlsMode::Preferred,
            _ => TlsMode::Profile(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TlsMode::Disabled => "false",
            TlsMode::Verified => "true",
            TlsMode::SkipVerify => "skip-verify",
            TlsMode::Preferred => "preferred",
            TlsMode::Profile(name) => name.as_str(),
        }
    }

    /// Driver TLS options for this mode
    ///
    /// `preferred` behaves like `skip-verify`: the driver has no opportunistic
    /// mode, so a server without TLS support fails at connect time.
    pub fn ssl_opts(
        &self,
        profiles: &HashMap<String, TlsProfile>,
    ) -> Result<Option<SslOpts>, ConnectError> {
        let opts = match self {
            TlsMode::Disabled => return Ok(None),
            TlsMode::Verified => SslOpts::default(),
            TlsMode::SkipVerify | TlsMode::Preferred => SslOpts::default()
                .with_danger_accept_invalid_certs(true)
                .with_danger_skip_domain_validation(true),
            TlsMode::Profile(name) => {
                let profile = profiles
                    .get(name)
                    .ok_or_else(|| ConnectError::UnknownTlsProfile(name.clone()))?;
                let mut opts = SslOpts::default()
                    .with_danger_accept_invalid_certs(profile.skip_verify)
                    .with_danger_skip_domain_validation(profile.skip_domain_validation);
                if let Some(ca_cert) = &profile.ca_cert {
                    opts = opts.with_root_certs(vec![PathOrBuf::Path(Cow::Owned(ca_cert.clone()))]);
                }
                opts
            }
        };
        Ok(Some(opts))
    }
}

impl std::fmt::Display for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Endpoint
// =============================================================================

/// Database endpoint, `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `host`, `host:port`, or `[v6addr]:port`
    pub fn parse(value: &str) -> Result<Endpoint, ConnectError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConnectError::MissingField("endpoint"));
        }
        let invalid = || ConnectError::InvalidEndpoint(value.to_string());

        let (host, port) = if let Some(rest) = value.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            match after {
                "" => (host, None),
                _ => (host, Some(after.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else if value.matches(':').count() > 1 {
            // bare IPv6 address without a port
            (value, None)
        } else {
            match value.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (value, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_MYSQL_PORT,
        };

        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// =============================================================================
// Settings and handle
// =============================================================================

/// Everything needed to build a connection handle
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub engine: Engine,
    pub endpoint: String,
    pub username: String,
    pub password: Option<String>,
    pub tls: TlsMode,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("engine", &self.engine)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// Pooled database handle shared by every resource and data source
#[derive(Clone)]
pub struct ConnectionHandle {
    engine: Engine,
    endpoint: Endpoint,
    pool: Pool,
}

impl ConnectionHandle {
    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The driver pool; safe for concurrent use
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Close idle connections and stop the pool
    pub async fn disconnect(self) -> anyhow::Result<()> {
        self.pool
            .disconnect()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to disconnect from {}: {}", self.endpoint, e))
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("engine", &self.engine)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Build a connection handle
///
/// Validates the settings, resolves the TLS mode, and creates the pool for
/// the `mysql` schema. Fails for empty endpoint/username and for engines that
/// are not implemented.
pub fn build(
    settings: &ConnectionSettings,
    tls_profiles: &HashMap<String, TlsProfile>,
) -> Result<ConnectionHandle, ConnectError> {
    if settings.endpoint.trim().is_empty() {
        return Err(ConnectError::MissingField("endpoint"));
    }
    if settings.username.is_empty() {
        return Err(ConnectError::MissingField("username"));
    }

    match settings.engine {
        Engine::MySql => build_mysql(settings, tls_profiles),
        Engine::PostgreSql => Err(ConnectError::UnsupportedEngine(settings.engine)),
    }
}

fn build_mysql(
    settings: &ConnectionSettings,
    tls_profiles: &HashMap<String, TlsProfile>,
) -> Result<ConnectionHandle, ConnectError> {
    let endpoint = Endpoint::parse(&settings.endpoint)?;
    let ssl_opts = settings.tls.ssl_opts(tls_profiles)?;

    debug!(
        "Building MySQL options for {}@{} (tls: {})",
        settings.username, endpoint, settings.tls
    );

    // An empty password means no password, e.g. behind cloud-sql-proxy
    let password = settings.password.clone().filter(|p| !p.is_empty());

    let builder = OptsBuilder::default()
        .ip_or_hostname(endpoint.host.clone())
        .tcp_port(endpoint.port)
        .user(Some(settings.username.clone()))
        .pass(password)
        .db_name(Some(RULE_SCHEMA))
        .prefer_socket(false)
        .ssl_opts(ssl_opts);

    let pool = Pool::new(Opts::from(builder));
    info!("Created MySQL connection pool for {}", endpoint);

    Ok(ConnectionHandle {
        engine: settings.engine,
        endpoint,
        pool,
    })
}

// =============================================================================
// Errors
// =============================================================================

/// Errors building a connection handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// A required setting is empty
    MissingField(&'static str),
    /// Engine string is not one of the known engines
    UnknownEngine(String),
    /// Engine is known but not implemented
    UnsupportedEngine(Engine),
    /// Endpoint is not `host[:port]`
    InvalidEndpoint(String),
    /// `tls` names a profile that the plugin configuration does not define
    UnknownTlsProfile(String),
}

impl ConnectError {
    /// The provider attribute the error is about, if any
    pub fn attribute(&self) -> Option<&'static str> {
        match self {
            ConnectError::MissingField(field) => Some(field),
            ConnectError::UnknownEngine(_) | ConnectError::UnsupportedEngine(_) => Some("engine"),
            ConnectError::InvalidEndpoint(_) => Some("endpoint"),
            ConnectError::UnknownTlsProfile(_) => Some("tls"),
        }
    }
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::MissingField(field) => write!(f, "Missing required field: {}", field),
            ConnectError::UnknownEngine(engine) => write!(
                f,
                "Invalid engine type {:?}, allowed values: mysql, postgresql",
                engine
            ),
            ConnectError::UnsupportedEngine(engine) => {
                write!(f, "{} not implemented yet", engine)
            }
            ConnectError::InvalidEndpoint(endpoint) => {
                write!(f, "Invalid endpoint {:?}, expected host:port", endpoint)
            }
            ConnectError::UnknownTlsProfile(name) => {
                write!(f, "Unknown TLS config name {:?}", name)
            }
        }
    }
}

impl std::error::Error for ConnectError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(engine: Engine, endpoint: &str, username: &str) -> ConnectionSettings {
        ConnectionSettings {
            engine,
            endpoint: endpoint.to_string(),
            username: username.to_string(),
            password: None,
            tls: TlsMode::Disabled,
        }
    }

    #[test]
    fn test_engine_parse() {
        assert_eq!(Engine::parse("mysql"), Ok(Engine::MySql));
        assert_eq!(Engine::parse("postgresql"), Ok(Engine::PostgreSql));
        assert_eq!(Engine::parse(""), Err(ConnectError::MissingField("engine")));
        assert_eq!(
            Engine::parse("MySQL"),
            Err(ConnectError::UnknownEngine("MySQL".to_string()))
        );
        assert!(Engine::MySql.is_supported());
        assert!(!Engine::PostgreSql.is_supported());
    }

    #[test]
    fn test_tls_mode_parse() {
        assert_eq!(TlsMode::parse(None), TlsMode::Disabled);
        assert_eq!(TlsMode::parse(Some("false")), TlsMode::Disabled);
        assert_eq!(TlsMode::parse(Some("true")), TlsMode::Verified);
        assert_eq!(TlsMode::parse(Some("skip-verify")), TlsMode::SkipVerify);
        assert_eq!(TlsMode::parse(Some("preferred")), TlsMode::Preferred);
        assert_eq!(
            TlsMode::parse(Some("cloudsql")),
            TlsMode::Profile("cloudsql".to_string())
        );
        assert_eq!(TlsMode::parse(Some("cloudsql")).as_str(), "cloudsql");
    }

    #[test]
    fn test_tls_mode_boolean_spellings() {
        for value in ["1", "TRUE", "True", " true "] {
            assert_eq!(TlsMode::parse(Some(value)), TlsMode::Verified, "{}", value);
        }
        for value in ["0", "FALSE", "False", ""] {
            assert_eq!(TlsMode::parse(Some(value)), TlsMode::Disabled, "{}", value);
        }
        assert_eq!(TlsMode::parse(Some("SKIP-VERIFY")), TlsMode::SkipVerify);
        assert_eq!(
            TlsMode::parse(Some("CorpProfile")),
            TlsMode::Profile("CorpProfile".to_string())
        );
        assert!(TlsMode::parse(Some("1"))
            .ssl_opts(&HashMap::new())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_tls_profile_resolution() {
        let mut profiles = HashMap::new();
        profiles.insert(
            "cloudsql".to_string(),
            TlsProfile {
                ca_cert: Some(PathBuf::from("/etc/ssl/ca.pem")),
                skip_verify: false,
                skip_domain_validation: true,
            },
        );

        assert!(TlsMode::Disabled.ssl_opts(&profiles).unwrap().is_none());
        assert!(TlsMode::Verified.ssl_opts(&profiles).unwrap().is_some());

        let opts = TlsMode::Profile("cloudsql".to_string())
            .ssl_opts(&profiles)
            .unwrap()
            .unwrap();
        assert!(opts.skip_domain_validation());
        assert!(!opts.accept_invalid_certs());

        let err = TlsMode::Profile("missing".to_string())
            .ssl_opts(&profiles)
            .unwrap_err();
        assert_eq!(err, ConnectError::UnknownTlsProfile("missing".to_string()));
    }

    #[test]
    fn test_endpoint_parse() {
        let ep = Endpoint::parse("10.0.0.5:3307").unwrap();
        assert_eq!(ep.host, "10.0.0.5");
        assert_eq!(ep.port, 3307);

        let ep = Endpoint::parse("db.internal").unwrap();
        assert_eq!(ep.port, DEFAULT_MYSQL_PORT);

        let ep = Endpoint::parse("[::1]:3306").unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.to_string(), "[::1]:3306");

        let ep = Endpoint::parse("::1").unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, DEFAULT_MYSQL_PORT);

        assert!(matches!(
            Endpoint::parse("host:notaport"),
            Err(ConnectError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse(":3306"),
            Err(ConnectError::InvalidEndpoint(_))
        ));
        assert_eq!(
            Endpoint::parse("  "),
            Err(ConnectError::MissingField("endpoint"))
        );
    }

    #[tokio::test]
    async fn test_build_requires_endpoint_and_username() {
        let profiles = HashMap::new();

        let err = build(&settings(Engine::MySql, "", "root"), &profiles).unwrap_err();
        assert_eq!(err, ConnectError::MissingField("endpoint"));
        assert_eq!(err.attribute(), Some("endpoint"));

        let err = build(&settings(Engine::MySql, "127.0.0.1:3306", ""), &profiles).unwrap_err();
        assert_eq!(err, ConnectError::MissingField("username"));
        assert!(err.to_string().contains("username"));
    }

    #[tokio::test]
    async fn test_build_rejects_postgresql() {
        let err = build(
            &settings(Engine::PostgreSql, "127.0.0.1:5432", "postgres"),
            &HashMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, ConnectError::UnsupportedEngine(Engine::PostgreSql));
        assert!(err.to_string().contains("not implemented"));
    }

    #[tokio::test]
    async fn test_build_mysql_is_lazy() {
        // Nothing listens on this port; building must still succeed
        let mut s = settings(Engine::MySql, "127.0.0.1:1", "root");
        s.password = Some(String::new());
        let handle = build(&s, &HashMap::new()).unwrap();
        assert_eq!(handle.engine(), Engine::MySql);
        assert_eq!(handle.endpoint().to_string(), "127.0.0.1:1");
        handle.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_build_unknown_tls_profile() {
        let mut s = settings(Engine::MySql, "127.0.0.1:3306", "root");
        s.tls = TlsMode::Profile("nope".to_string());
        let err = build(&s, &HashMap::new()).unwrap_err();
        assert_eq!(err.attribute(), Some("tls"));
    }

    #[test]
    fn test_settings_debug_redacts_password() {
        let mut s = settings(Engine::MySql, "127.0.0.1:3306", "root");
        s.password = Some("hunter2".to_string());
        let rendered = format!("{:?}", s);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
