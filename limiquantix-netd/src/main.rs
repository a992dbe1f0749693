//! # limiquantix Network Daemon
//!
//! Runs on each hypervisor host. Keeps the registry of named Nuage network
//! definitions and rebinds machine interfaces whenever a machine is
//! (re)defined.
//!
//! ## Features
//! - Network create, update, delete, get and name listing over HTTP
//! - Delete refused while machines still use a network
//! - Update re-defines every machine bound to the network
//!
//! ## Usage
//! ```bash
//! limiquantix-netd --config /etc/limiquantix/netd.yaml
//! ```

use anyhow::Result;
use clap::Parser;
use limiquantix_common::LogFormat;
use tracing::{error, info};

mod cli;
mod config;
mod http_server;
mod server;

use cli::Args;
use config::Config;

const DEFAULT_CONFIG_PATH: &str = "/etc/limiquantix/netd.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_format = if args.log_json { LogFormat::Json } else { LogFormat::Pretty };
    log_format.init(&args.log_level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting limiquantix Network Daemon"
    );

    let config = match &args.config {
        Some(config_path) => {
            // Explicit config file provided
            match Config::load(config_path) {
                Ok(cfg) => {
                    info!(config_path = %config_path, "Configuration loaded");
                    cfg.with_cli_overrides(&args)
                }
                Err(e) => {
                    error!(error = %e, path = %config_path, "Failed to load configuration");
                    return Err(e);
                }
            }
        }
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => {
                info!(
                    config_path = %DEFAULT_CONFIG_PATH,
                    "Configuration loaded from default location"
                );
                cfg.with_cli_overrides(&args)
            }
            Err(e) => {
                info!(reason = %e, "No usable config file, using CLI arguments and defaults");
                Config::default_with_cli(&args)
            }
        },
    };

    // CLI overrides can reintroduce bad values
    config.validate()?;

    info!(
        listen = %config.server.listen_address,
        bridge = %config.nuage.bridge,
        database = %config.nuage.database,
        hypervisor = ?config.hypervisor.backend,
        "Network daemon configured"
    );

    if let Err(e) = server::run(config).await {
        error!(error = %e, "Server failed");
        return Err(e);
    }

    Ok(())
}
