//! Daemon wiring and lifecycle.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use limiquantix_network::{
    DefinitionHook, EventBus, HypervisorHandlers, MachineDefiner, MachineHandlers,
    MachineInventory, MockHypervisor, NetworkRegistry, NetworkStore, NuageDefinitionHook,
    OvsBridge, Reconciler, RequestHandler,
};

use crate::config::{Config, HypervisorBackend};
use crate::http_server::{self, AppState};

/// The machine lifecycle manager the registry drives.
enum Backend {
    Mock(Arc<MockHypervisor>),
    #[cfg(feature = "libvirt")]
    Libvirt(Arc<limiquantix_network::LibvirtInventory>),
}

impl Backend {
    fn connect(config: &Config) -> Result<Self> {
        match config.hypervisor.backend {
            HypervisorBackend::Mock => {
                info!("Using mock hypervisor backend");
                Ok(Backend::Mock(Arc::new(MockHypervisor::new())))
            }
            HypervisorBackend::Libvirt => {
                #[cfg(feature = "libvirt")]
                {
                    let uri = config.hypervisor.libvirt_uri.as_deref().unwrap_or("qemu:///system");
                    let inventory = limiquantix_network::LibvirtInventory::connect(uri)
                        .context("Failed to connect to libvirt")?;
                    Ok(Backend::Libvirt(Arc::new(inventory)))
                }
                #[cfg(not(feature = "libvirt"))]
                {
                    warn!("Libvirt backend requested but not compiled in, falling back to mock");
                    Ok(Backend::Mock(Arc::new(MockHypervisor::new())))
                }
            }
        }
    }

    fn inventory(&self) -> Arc<dyn MachineInventory> {
        match self {
            Backend::Mock(mock) => mock.clone(),
            #[cfg(feature = "libvirt")]
            Backend::Libvirt(libvirt) => libvirt.clone(),
        }
    }

    fn definer(&self) -> Arc<dyn MachineDefiner> {
        match self {
            Backend::Mock(mock) => mock.clone(),
            #[cfg(feature = "libvirt")]
            Backend::Libvirt(libvirt) => libvirt.clone(),
        }
    }

    fn add_definition_hook(&self, hook: Arc<dyn DefinitionHook>) -> Result<()> {
        match self {
            Backend::Mock(mock) => mock.add_definition_hook(hook)?,
            #[cfg(feature = "libvirt")]
            Backend::Libvirt(libvirt) => libvirt.add_definition_hook(hook)?,
        }
        Ok(())
    }
}

/// Run the daemon until ctrl-c.
pub async fn run(config: Config) -> Result<()> {
    let store = NetworkStore::open(&config.nuage.database)
        .await
        .with_context(|| format!("Failed to open network store {}", config.nuage.database))?;

    let backend = Backend::connect(&config)?;
    let events = Arc::new(EventBus::new());

    let registry = Arc::new(NetworkRegistry::new(
        store,
        backend.inventory(),
        backend.definer(),
        events.clone(),
    ));

    // Every (re)definition goes through the reconciler
    let reconciler = Reconciler::new(OvsBridge::new(config.nuage.bridge.as_str()));
    let hook: Arc<dyn DefinitionHook> =
        Arc::new(NuageDefinitionHook::new(reconciler, registry.clone()));
    backend.add_definition_hook(hook.clone())?;

    let gate = Arc::new(config.permissions.gate());
    let hypervisor_handlers: Arc<dyn RequestHandler> =
        Arc::new(HypervisorHandlers::new(registry.clone(), gate.clone()));
    let machine_handlers: Arc<dyn RequestHandler> =
        Arc::new(MachineHandlers::new(registry.clone(), gate));

    for permission in hypervisor_handlers.permissions() {
        info!(
            permission = %permission.name,
            description = %permission.description,
            "Declared permission"
        );
    }

    let node_id = config.node.get_id();
    let hostname = config.node.get_hostname();

    let addr: SocketAddr = config
        .server
        .listen_address
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.server.listen_address))?;

    info!(
        address = %addr,
        node_id = %node_id,
        hostname = %hostname,
        bridge = %config.nuage.bridge,
        libvirt_available = limiquantix_network::libvirt::is_available(),
        "Starting network daemon"
    );

    let state = Arc::new(AppState {
        hypervisor_handlers,
        machine_handlers,
        hook,
        events,
        node_id,
        hostname,
    });

    let served = http_server::run_http_server(addr, state).await;

    registry.store().close().await;
    info!("Network daemon stopped");

    served
}
