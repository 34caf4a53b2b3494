//! Core database infrastructure
//!
//! - `ConnectionHandle`: pooled connection built from the provider block
//! - `Engine` / `TlsMode` / `Endpoint`: parsed connection settings

mod connection;

pub use connection::{
    build, ConnectError, ConnectionHandle, ConnectionSettings, Endpoint, Engine, TlsMode,
    DEFAULT_MYSQL_PORT, RULE_SCHEMA,
};
