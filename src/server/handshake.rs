//! go-plugin handshake
//!
//! The plugin client starts this binary with a magic cookie and the protocol
//! versions it speaks, then reads one line from stdout naming the address to
//! dial and, with AutoMTLS, the server certificate.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use std::net::SocketAddr;

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// go-plugin core protocol version
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Terraform plugin protocol version served
pub const PLUGIN_PROTOCOL_VERSION: u32 = 6;

pub const PROTOCOL_VERSIONS_ENV: &str = "PLUGIN_PROTOCOL_VERSIONS";
pub const MIN_PORT_ENV: &str = "PLUGIN_MIN_PORT";
pub const MAX_PORT_ENV: &str = "PLUGIN_MAX_PORT";
pub const CLIENT_CERT_ENV: &str = "PLUGIN_CLIENT_CERT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Not started by a plugin client
    MissingCookie,
    /// The client offers no version this plugin speaks
    UnsupportedVersions(String),
    InvalidPortRange(String),
}

impl std::fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeError::MissingCookie => write!(
                f,
                "This binary is a plugin. These are not meant to be executed directly.\n\
                 Please execute the program that consumes these plugins, which will\n\
                 load any plugins automatically"
            ),
            HandshakeError::UnsupportedVersions(offered) => write!(
                f,
                "Plugin protocol version {} not offered by client (offered: {})",
                PLUGIN_PROTOCOL_VERSION, offered
            ),
            HandshakeError::InvalidPortRange(msg) => write!(f, "Invalid port range: {}", msg),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Settings the plugin client passes through the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeEnv {
    pub protocol_version: u32,
    pub min_port: u16,
    pub max_port: u16,
    /// PEM certificate the client will present; enables AutoMTLS
    pub client_cert: Option<String>,
}

impl HandshakeEnv {
    /// Read the handshake settings with `lookup` (normally `std::env::var`)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HandshakeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup(MAGIC_COOKIE_KEY).as_deref() != Some(MAGIC_COOKIE_VALUE) {
            return Err(HandshakeError::MissingCookie);
        }

        let protocol_version = negotiate_version(lookup(PROTOCOL_VERSIONS_ENV).as_deref())?;

        let port = |key: &str, default: u16| -> Result<u16, HandshakeError> {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => v.trim().parse::<u16>().map_err(|_| {
                    HandshakeError::InvalidPortRange(format!("{}={:?}", key, v))
                }),
                None => Ok(default),
            }
        };
        let min_port = port(MIN_PORT_ENV, 0)?;
        let max_port = port(MAX_PORT_ENV, 0)?;
        if min_port > max_port {
            return Err(HandshakeError::InvalidPortRange(format!(
                "{} > {}",
                min_port, max_port
            )));
        }

        Ok(Self {
            protocol_version,
            min_port,
            max_port,
            client_cert: lookup(CLIENT_CERT_ENV).filter(|c| !c.trim().is_empty()),
        })
    }

    pub fn from_env() -> Result<Self, HandshakeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Ports to try binding, in order; `0` lets the OS pick
    pub fn candidate_ports(&self) -> Vec<u16> {
        if self.max_port == 0 {
            vec![0]
        } else {
            (self.min_port.max(1)..=self.max_port).collect()
        }
    }
}

/// Pick protocol version 6 from the comma separated list the client offers.
///
/// An absent list means the client predates negotiation; version 6 is
/// assumed.
pub fn negotiate_version(offered: Option<&str>) -> Result<u32, HandshakeError> {
    let Some(offered) = offered.filter(|o| !o.trim().is_empty()) else {
        return Ok(PLUGIN_PROTOCOL_VERSION);
    };
    offered
        .split(',')
        .filter_map(|v| v.trim().parse::<u32>().ok())
        .find(|v| *v == PLUGIN_PROTOCOL_VERSION)
        .ok_or_else(|| HandshakeError::UnsupportedVersions(offered.to_string()))
}

/// The line printed on stdout for the plugin client
pub fn handshake_line(
    protocol_version: u32,
    addr: SocketAddr,
    server_cert_der: Option<&[u8]>,
) -> String {
    let cert = server_cert_der
        .map(|der| STANDARD_NO_PAD.encode(der))
        .unwrap_or_default();
    format!(
        "{}|{}|tcp|{}|grpc|{}",
        CORE_PROTOCOL_VERSION, protocol_version, addr, cert
    )
}

/// `TF_REATTACH_PROVIDERS` value for debug mode
pub fn reattach_config(provider_address: &str, addr: SocketAddr) -> serde_json::Value {
    let mut providers = serde_json::Map::new();
    providers.insert(
        provider_address.to_string(),
        serde_json::json!({
            "Protocol": "grpc",
            "ProtocolVersion": PLUGIN_PROTOCOL_VERSION,
            "Pid": std::process::id(),
            "Test": true,
            "Addr": {
                "Network": "tcp",
                "String": addr.to_string(),
            }
        }),
    );
    serde_json::Value::Object(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_cookie() {
        let err = HandshakeEnv::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, HandshakeError::MissingCookie);
        let err = HandshakeEnv::from_lookup(lookup(&[(MAGIC_COOKIE_KEY, "nope")])).unwrap_err();
        assert_eq!(err, HandshakeError::MissingCookie);
    }

    #[test]
    fn test_from_lookup() {
        let env = HandshakeEnv::from_lookup(lookup(&[
            (MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE),
            (PROTOCOL_VERSIONS_ENV, "5,6"),
            (MIN_PORT_ENV, "10000"),
            (MAX_PORT_ENV, "10002"),
            (CLIENT_CERT_ENV, "-----BEGIN CERTIFICATE-----"),
        ]))
        .unwrap();
        assert_eq!(env.protocol_version, 6);
        assert_eq!(env.candidate_ports(), vec![10000, 10001, 10002]);
        assert!(env.client_cert.is_some());
    }

    #[test]
    fn test_default_ports() {
        let env = HandshakeEnv::from_lookup(lookup(&[(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)]))
            .unwrap();
        assert_eq!(env.candidate_ports(), vec![0]);
        assert_eq!(env.client_cert, None);
    }

    #[test]
    fn test_invalid_port_range() {
        let err = HandshakeEnv::from_lookup(lookup(&[
            (MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE),
            (MIN_PORT_ENV, "20000"),
            (MAX_PORT_ENV, "10000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidPortRange(_)));
    }

    #[test]
    fn test_negotiate_version() {
        assert_eq!(negotiate_version(None), Ok(6));
        assert_eq!(negotiate_version(Some("6")), Ok(6));
        assert_eq!(negotiate_version(Some(" 5 , 6 ")), Ok(6));
        assert_eq!(
            negotiate_version(Some("4,5")),
            Err(HandshakeError::UnsupportedVersions("4,5".to_string()))
        );
    }

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        assert_eq!(handshake_line(6, addr, None), "1|6|tcp|127.0.0.1:1234|grpc|");
        assert_eq!(
            handshake_line(6, addr, Some(&[0xde, 0xad, 0xbe, 0xef])),
            "1|6|tcp|127.0.0.1:1234|grpc|3q2+7w"
        );
    }

    #[test]
    fn test_reattach_config() {
        let addr: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        let v = reattach_config("registry.terraform.io/local/cloudsql-auditlog", addr);
        let entry = &v["registry.terraform.io/local/cloudsql-auditlog"];
        assert_eq!(entry["ProtocolVersion"], 6);
        assert_eq!(entry["Addr"]["String"], "127.0.0.1:4321");
        assert_eq!(entry["Protocol"], "grpc");
    }
}
