//! Plugin server
//!
//! Serves the provider to Terraform over gRPC, following the go-plugin
//! conventions Terraform expects from a provider binary.
//!
//! # Architecture
//!
//! - `handshake` - Magic cookie, version negotiation, and the stdout handshake line
//! - `tls` - AutoMTLS certificate generation and pinned client verification
//! - `conn` - Loopback listener and the plaintext/TLS accept loop
//! - `proto` - Generated `tfplugin6` and `plugin` types
//! - `codec` - msgpack/JSON DynamicValue encoding
//! - `convert` - Schema and diagnostic conversion to protocol messages
//! - `service` - The tfplugin6 `Provider` service
//! - `controller` - go-plugin's `GRPCController` shutdown service
//!
//! # Lifecycle
//!
//! 1. Verify the handshake environment (skipped in debug mode)
//! 2. Bind a loopback port and, with AutoMTLS, generate the server certificate
//! 3. Print the handshake line (or the reattach configuration in debug mode)
//! 4. Serve until `GRPCController.Shutdown`, or ctrl-c in debug mode
//!
//! # Usage
//!
//! ```rust,ignore
//! use cloudsql_auditlog::server::{serve, ServeOptions};
//! use cloudsql_auditlog::PluginConfig;
//!
//! let config = PluginConfig::new(&None)?;
//! serve(&config, ServeOptions::new()).await?;
//! ```

pub mod codec;
pub mod conn;
pub mod controller;
pub mod convert;
pub mod handshake;
pub mod proto;
pub mod service;
pub mod tls;

pub use controller::ControllerService;
pub use handshake::{HandshakeEnv, HandshakeError};
pub use service::ProviderService;

use crate::config::PluginConfig;
use crate::provider::AuditLogProvider;
use anyhow::{anyhow, Result};
use proto::plugin::grpc_controller_server::GrpcControllerServer;
use proto::tfplugin6::provider_server::ProviderServer;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{debug, info};

/// Health check service name go-plugin clients query
const HEALTH_SERVICE_NAME: &str = "plugin";

// =============================================================================
// Serve Options
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Serve without a plugin client: no handshake checks, no TLS, and
    /// reattach instructions instead of the handshake line
    pub debug: bool,

    /// Provider source address for the reattach configuration
    pub provider_address: Option<String>,
}

impl ServeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_provider_address(mut self, address: impl Into<String>) -> Self {
        self.provider_address = Some(address.into());
        self
    }
}

// =============================================================================
// Server Startup
// =============================================================================

/// Run the plugin server until shutdown
pub async fn serve(config: &PluginConfig, options: ServeOptions) -> Result<()> {
    let handshake = if options.debug {
        None
    } else {
        Some(HandshakeEnv::from_env()?)
    };

    let ports = handshake
        .as_ref()
        .map(HandshakeEnv::candidate_ports)
        .unwrap_or_else(|| vec![0]);
    let listener = conn::bind_loopback(&ports)
        .await
        .map_err(|e| anyhow!("Failed to bind plugin listener: {}", e))?;
    let addr = listener.local_addr()?;

    let (acceptor, server_cert) = match handshake.as_ref().and_then(|h| h.client_cert.as_deref()) {
        Some(client_pem) => {
            let identity = tls::ServerIdentity::generate()?;
            let client_cert = tls::parse_client_cert(client_pem)?;
            let tls_config = tls::server_config(&identity, client_cert)?;
            info!("AutoMTLS enabled");
            (
                Some(TlsAcceptor::from(tls_config)),
                Some(identity.cert_der),
            )
        }
        None => (None, None),
    };

    let shutdown = CancellationToken::new();
    let provider = Arc::new(AuditLogProvider::new(config));

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_service_status(HEALTH_SERVICE_NAME, tonic_health::ServingStatus::Serving)
        .await;

    let incoming = conn::accept_loop(listener, acceptor, shutdown.clone());

    match &handshake {
        Some(h) => announce(&handshake::handshake_line(
            h.protocol_version,
            addr,
            server_cert.as_deref(),
        ))?,
        None => {
            let provider_address = options
                .provider_address
                .as_deref()
                .unwrap_or(&config.provider_address);
            announce_debug(provider_address, addr)?
        }
    }
    info!("Plugin server listening on {}", addr);

    tokio::spawn(watch_interrupts(shutdown.clone(), options.debug));

    Server::builder()
        .add_service(health_service)
        .add_service(ProviderServer::new(ProviderService::new(provider.clone())))
        .add_service(GrpcControllerServer::new(ControllerService::new(
            shutdown.clone(),
        )))
        .serve_with_incoming_shutdown(incoming, shutdown.cancelled())
        .await?;

    provider.shutdown().await;
    info!("Plugin server stopped");
    Ok(())
}

/// Print the handshake line; the plugin client reads exactly one line
fn announce(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    debug!("Handshake: {}", line);
    Ok(())
}

fn announce_debug(provider_address: &str, addr: SocketAddr) -> Result<()> {
    let reattach = handshake::reattach_config(provider_address, addr);
    let mut stdout = std::io::stdout().lock();
    writeln!(
        stdout,
        "Provider started. To attach Terraform CLI, set the TF_REATTACH_PROVIDERS \
         environment variable with the following:\n\n\tTF_REATTACH_PROVIDERS='{}'\n",
        reattach
    )?;
    stdout.flush()?;
    Ok(())
}

/// Interrupts stop the server in debug mode only; under a plugin client the
/// client drives shutdown and Terraform forwards ctrl-c as StopProvider
async fn watch_interrupts(shutdown: CancellationToken, debug_mode: bool) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    debug!("Unable to listen for interrupts: {}", e);
                    return;
                }
                if debug_mode {
                    info!("Interrupted, shutting down");
                    shutdown.cancel();
                    return;
                }
                debug!("Ignoring interrupt; waiting for the plugin client");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
