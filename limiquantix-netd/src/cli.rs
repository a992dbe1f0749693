//! Command-line argument parsing.

use clap::Parser;

/// limiquantix Network Daemon - Nuage network registry
#[derive(Parser, Debug, Default)]
#[command(name = "limiquantix-netd")]
#[command(about = "limiquantix Network Daemon - Nuage network registry and interface reconciler")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "LIMIQUANTIX_NETD_CONFIG")]
    pub config: Option<String>,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Listen address for the HTTP API
    #[arg(long)]
    pub listen: Option<String>,

    /// OVS bridge interfaces are attached to
    #[arg(long)]
    pub bridge: Option<String>,

    /// Path of the network definition database
    #[arg(long)]
    pub database: Option<String>,

    /// Libvirt connection URI
    #[arg(long)]
    pub libvirt_uri: Option<String>,

    /// Node ID (auto-generated if not provided)
    #[arg(long)]
    pub node_id: Option<String>,

    /// Enable development mode (mock hypervisor, every action allowed)
    #[arg(long)]
    pub dev: bool,
}
