use std::process::ExitCode;

use clap::Parser;
use cloudsql_auditlog::server::{serve, ServeOptions};
use cloudsql_auditlog::PluginConfig;
use tracing::{debug, error, Level};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// configuration file path, by default $HOME/.cloudsql-auditlog.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Serve without a plugin client and print TF_REATTACH_PROVIDERS instead
    #[clap(long)]
    debug: bool,

    /// Provider source address for the reattach configuration
    #[clap(long)]
    provider_address: Option<String>,
}

/// Map Terraform log levels onto tracing levels; `None` disables logging
fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => None,
        // TF_LOG=JSON is trace output in JSON form
        "json" => Some(Level::TRACE),
        other => Some(other.parse().unwrap_or(Level::INFO)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match PluginConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // stdout carries the handshake line, so logs go to stderr
    if let Some(level) = parse_level(&config.effective_log_level()) {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    }
    debug!("Plugin configuration:\n{}", config.summary());

    let mut options = ServeOptions::new().with_debug(cli.debug);
    if let Some(address) = cli.provider_address {
        options = options.with_provider_address(address);
    }

    match serve(&config, options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
