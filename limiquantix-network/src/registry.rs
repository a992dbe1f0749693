//! Network registry: named definitions with referential integrity.
//!
//! Mutations are serialised by a write gate held across the integrity
//! pre-check and the committing store transaction, so a concurrent create
//! and delete of the same name cannot both succeed and a delete never
//! commits against a stale reference scan.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::error::{NetworkError, Result};
use crate::network::NetworkDefinition;
use crate::scanner;
use crate::store::NetworkStore;
use crate::traits::{
    ChangeNotifier, MachineDefiner, MachineInventory, NetworkCatalog, NetworkLookup,
};
use crate::types::{MachineRecord, CHANGE_NAMESPACE};

/// Hypervisor-side registry role.
pub struct NetworkRegistry {
    store: NetworkStore,
    inventory: Arc<dyn MachineInventory>,
    definer: Arc<dyn MachineDefiner>,
    notifier: Arc<dyn ChangeNotifier>,
    write_gate: Mutex<()>,
}

impl NetworkRegistry {
    pub fn new(
        store: NetworkStore,
        inventory: Arc<dyn MachineInventory>,
        definer: Arc<dyn MachineDefiner>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            store,
            inventory,
            definer,
            notifier,
            write_gate: Mutex::new(()),
        }
    }

    /// The underlying store handle (for shutdown).
    pub fn store(&self) -> &NetworkStore {
        &self.store
    }

    /// Register a new network.
    #[instrument(skip(self, definition), fields(network = %definition.name))]
    pub async fn create(&self, definition: NetworkDefinition) -> Result<()> {
        {
            let _gate = self.write_gate.lock().await;
            self.store.insert(&definition).await?;
        }

        info!("Network created");
        self.notifier
            .push_change(CHANGE_NAMESPACE, "created", &definition.name);
        Ok(())
    }

    /// Fetch one definition.
    pub async fn get(&self, name: &str) -> Result<NetworkDefinition> {
        self.store
            .get(name)
            .await?
            .ok_or_else(|| NetworkError::NotFound(name.to_string()))
    }

    /// All definitions. Callers must not rely on ordering.
    pub async fn list_all(&self) -> Result<Vec<NetworkDefinition>> {
        self.store.list().await
    }

    /// All names. Callers must not rely on ordering.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        self.store.list_names().await
    }

    /// Machines whose persisted description references `name`.
    pub async fn machines_using(&self, name: &str) -> Result<Vec<MachineRecord>> {
        let machines = self.inventory.machines().await?;
        Ok(scanner::machines_using(name, &machines))
    }

    /// Replace a definition and re-define every machine that uses it.
    ///
    /// The new definition is committed before propagation starts. Every
    /// referencing machine is attempted once; failures are reported together
    /// as [`NetworkError::PropagationFailed`].
    #[instrument(skip(self, definition), fields(network = %definition.name))]
    pub async fn update(&self, definition: NetworkDefinition) -> Result<()> {
        {
            let _gate = self.write_gate.lock().await;
            self.store.replace(&definition).await?;
        }

        info!("Network updated");
        self.notifier
            .push_change(CHANGE_NAMESPACE, "updated", &definition.name);

        let users = self.machines_using(&definition.name).await?;
        let mut failed = Vec::new();

        for machine in &users {
            info!(
                machine_id = %machine.id,
                machine = %machine.name,
                "Redefining machine with updated network"
            );
            if let Err(e) = self.definer.redefine(&machine.id).await {
                warn!(
                    machine_id = %machine.id,
                    machine = %machine.name,
                    error = %e,
                    "Failed to redefine machine"
                );
                failed.push(machine.name.clone());
            }
        }

        if !failed.is_empty() {
            return Err(NetworkError::PropagationFailed {
                name: definition.name,
                machines: failed,
            });
        }

        Ok(())
    }

    /// Delete a network that no machine references.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        {
            let _gate = self.write_gate.lock().await;

            if !self.store.exists(name).await? {
                return Err(NetworkError::NotFound(name.to_string()));
            }

            let users = self.machines_using(name).await?;
            if !users.is_empty() {
                let machines: Vec<String> = users.into_iter().map(|m| m.name).collect();
                warn!(machines = ?machines, "Refusing to delete network still in use");
                return Err(NetworkError::NetworkInUse {
                    name: name.to_string(),
                    machines,
                });
            }

            self.store.remove(name).await?;
        }

        info!("Network deleted");
        self.notifier.push_change(CHANGE_NAMESPACE, "deleted", name);
        Ok(())
    }
}

#[async_trait]
impl NetworkLookup for NetworkRegistry {
    async fn lookup(&self, name: &str) -> Result<NetworkDefinition> {
        self.get(name).await
    }
}

#[async_trait]
impl NetworkCatalog for NetworkRegistry {
    async fn list_all(&self) -> Result<Vec<NetworkDefinition>> {
        NetworkRegistry::list_all(self).await
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        NetworkRegistry::list_names(self).await
    }
}
