//! Configuration management for the Network Daemon.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use limiquantix_network::{StaticPermissionGate, DEFAULT_BRIDGE};

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node-specific configuration
    pub node: NodeConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Bridge and registry storage
    pub nuage: NuageConfig,
    /// Machine inventory backend
    pub hypervisor: HypervisorConfig,
    /// Grant table for the network actions
    pub permissions: PermissionsConfig,
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with CLI overrides applied (no config file).
    pub fn default_with_cli(args: &Args) -> Self {
        Self::default().with_cli_overrides(args)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref listen) = args.listen {
            self.server.listen_address = listen.clone();
        }

        if let Some(ref bridge) = args.bridge {
            self.nuage.bridge = bridge.clone();
        }

        if let Some(ref database) = args.database {
            self.nuage.database = database.clone();
        }

        if let Some(ref uri) = args.libvirt_uri {
            self.hypervisor.libvirt_uri = Some(uri.clone());
        }

        if let Some(ref node_id) = args.node_id {
            self.node.id = Some(node_id.clone());
        }

        if args.dev {
            self.hypervisor.backend = HypervisorBackend::Mock;
            self.permissions.allow_all = true;
        }

        self
    }

    /// Reject configurations the daemon cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.nuage.bridge.trim().is_empty() {
            bail!("nuage.bridge must name an OVS bridge");
        }

        if self.nuage.database.trim().is_empty() {
            bail!("nuage.database must be a file path");
        }

        self.server
            .listen_address
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address: {}", self.server.listen_address))?;

        Ok(())
    }
}

/// Node-specific configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Unique node ID (auto-generated if not set)
    pub id: Option<String>,
    /// Hostname (auto-detected if not set)
    pub hostname: Option<String>,
}

impl NodeConfig {
    /// Get the node ID, generating one if not set.
    pub fn get_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Get the hostname, detecting it if not set.
    pub fn get_hostname(&self) -> String {
        self.hostname.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        })
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on for the HTTP API
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8090".to_string(),
        }
    }
}

/// Bridge and registry storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NuageConfig {
    /// OVS bridge managed by the Nuage VRS
    pub bridge: String,
    /// SQLite database holding network definitions
    pub database: String,
}

impl Default for NuageConfig {
    fn default() -> Self {
        Self {
            bridge: DEFAULT_BRIDGE.to_string(),
            database: "/var/lib/limiquantix/nuage-networks.db".to_string(),
        }
    }
}

/// Hypervisor backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HypervisorConfig {
    /// Backend type
    pub backend: HypervisorBackend,
    /// Libvirt connection URI
    pub libvirt_uri: Option<String>,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            backend: HypervisorBackend::Mock,
            libvirt_uri: Some("qemu:///system".to_string()),
        }
    }
}

/// Hypervisor backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HypervisorBackend {
    /// In-memory machines for testing/development
    #[default]
    Mock,
    /// Libvirt/QEMU domains
    Libvirt,
}

/// Permission configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Approve every action (development only)
    pub allow_all: bool,
    /// Permissions granted per actor; `*` grants everything
    pub grants: HashMap<String, Vec<String>>,
}

impl PermissionsConfig {
    pub fn gate(&self) -> StaticPermissionGate {
        if self.allow_all {
            StaticPermissionGate::allow_all()
        } else {
            StaticPermissionGate::new(self.grants.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limiquantix_network::PermissionGate;

    const FULL: &str = r#"
node:
  id: node-1
server:
  listen_address: "127.0.0.1:9000"
nuage:
  bridge: br-nuage
  database: /tmp/nets.db
hypervisor:
  backend: libvirt
  libvirt_uri: qemu+ssh://root@host/system
permissions:
  grants:
    admin: [networks_create, networks_delete]
"#;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.nuage.bridge, "alubr0");
        assert_eq!(config.server.listen_address, "0.0.0.0:8090");
        assert_eq!(config.hypervisor.backend, HypervisorBackend::Mock);
        assert!(!config.permissions.allow_all);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let config = Config::from_yaml(FULL).expect("Failed to parse YAML");

        assert_eq!(config.node.get_id(), "node-1");
        assert_eq!(config.server.listen_address, "127.0.0.1:9000");
        assert_eq!(config.nuage.bridge, "br-nuage");
        assert_eq!(config.nuage.database, "/tmp/nets.db");
        assert_eq!(config.hypervisor.backend, HypervisorBackend::Libvirt);

        let gate = config.permissions.gate();
        assert!(gate.check("admin", "networks_delete"));
        assert!(!gate.check("admin", "networks_update"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("nuage:\n  database: /tmp/x.db\n").unwrap();
        assert_eq!(config.nuage.bridge, "alubr0");
        assert_eq!(config.nuage.database, "/tmp/x.db");
    }

    #[test]
    fn test_blank_bridge_is_rejected() {
        assert!(Config::from_yaml("nuage:\n  bridge: \"  \"\n").is_err());
        assert!(Config::from_yaml("server:\n  listen_address: nowhere\n").is_err());
        assert!(Config::from_yaml("hypervisor:\n  backend: xen\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netd.yaml");
        std::fs::write(&path, FULL).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.nuage.bridge, "br-nuage");
        assert!(Config::load(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args {
            bridge: Some("br-test".to_string()),
            listen: Some("127.0.0.1:1".to_string()),
            dev: true,
            ..Default::default()
        };

        let config = Config::from_yaml(FULL).unwrap().with_cli_overrides(&args);
        assert_eq!(config.nuage.bridge, "br-test");
        assert_eq!(config.server.listen_address, "127.0.0.1:1");
        assert_eq!(config.hypervisor.backend, HypervisorBackend::Mock);
        assert!(config.permissions.gate().check("anyone", "networks_update"));
    }
}
