//! Mock hypervisor for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::error::{NetworkError, Result};
use crate::traits::{DefinitionHook, MachineDefiner, MachineInventory};
use crate::types::{MachineRecord, OwnerIdentity};

/// In-memory hypervisor acting as machine inventory and lifecycle manager.
///
/// Machines are held in memory without requiring libvirt. Definitions go
/// through the registered hooks exactly like a real define would, and are
/// serialised per machine. Useful for:
/// - Unit and integration testing
/// - Development without libvirt installed
pub struct MockHypervisor {
    machines: RwLock<HashMap<String, MachineRecord>>,
    hooks: RwLock<Vec<Arc<dyn DefinitionHook>>>,
    define_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    redefinitions: RwLock<Vec<String>>,
}

impl MockHypervisor {
    /// Create an empty mock hypervisor.
    pub fn new() -> Self {
        info!("Creating mock hypervisor");
        Self {
            machines: RwLock::new(HashMap::new()),
            hooks: RwLock::new(Vec::new()),
            define_locks: Mutex::new(HashMap::new()),
            redefinitions: RwLock::new(Vec::new()),
        }
    }

    /// Register a machine. Its definition, if any, is stored as-is.
    pub fn add_machine(&self, machine: MachineRecord) -> Result<()> {
        let mut machines = self.machines.write().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;

        if machines.contains_key(&machine.id) {
            return Err(NetworkError::Machine(format!("machine {} already exists", machine.id)));
        }

        debug!(machine_id = %machine.id, machine = %machine.name, "Mock machine added");
        machines.insert(machine.id.clone(), machine);
        Ok(())
    }

    /// Overwrite a machine's stored description without running hooks.
    pub fn set_definition(&self, machine_id: &str, xml: impl Into<String>) -> Result<()> {
        let mut machines = self.machines.write().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;
        let machine = machines
            .get_mut(machine_id)
            .ok_or_else(|| NetworkError::Machine(format!("machine not found: {}", machine_id)))?;
        machine.definition = Some(xml.into());
        Ok(())
    }

    pub fn set_owner(&self, machine_id: &str, owner: Option<OwnerIdentity>) -> Result<()> {
        let mut machines = self.machines.write().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;
        let machine = machines
            .get_mut(machine_id)
            .ok_or_else(|| NetworkError::Machine(format!("machine not found: {}", machine_id)))?;
        machine.owner = owner;
        Ok(())
    }

    /// Register a hook run on every definition.
    pub fn add_definition_hook(&self, hook: Arc<dyn DefinitionHook>) -> Result<()> {
        let mut hooks = self.hooks.write().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;
        hooks.push(hook);
        Ok(())
    }

    /// Currently stored description of a machine.
    pub fn definition(&self, machine_id: &str) -> Option<String> {
        self.machines
            .read()
            .ok()?
            .get(machine_id)
            .and_then(|m| m.definition.clone())
    }

    /// Machine IDs passed to `redefine`, in call order.
    pub fn redefinitions(&self) -> Vec<String> {
        self.redefinitions
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn machine(&self, machine_id: &str) -> Result<MachineRecord> {
        let machines = self.machines.read().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;
        machines
            .get(machine_id)
            .cloned()
            .ok_or_else(|| NetworkError::Machine(format!("machine not found: {}", machine_id)))
    }

    fn define_lock(&self, machine_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.define_locks.lock().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;
        Ok(locks.entry(machine_id.to_string()).or_default().clone())
    }

    /// Define (or redefine) a machine: run hooks, then persist the result.
    ///
    /// A failing hook aborts the definition and leaves the stored
    /// description unchanged.
    #[instrument(skip(self, xml), fields(machine_id = %machine_id))]
    pub async fn define(&self, machine_id: &str, xml: &str) -> Result<String> {
        let lock = self.define_lock(machine_id)?;
        let _serialised = lock.lock().await;

        let machine = self.machine(machine_id)?;
        let hooks: Vec<_> = self
            .hooks
            .read()
            .map_err(|_| NetworkError::Internal("Lock poisoned".to_string()))?
            .clone();

        let mut xml = xml.to_string();
        for hook in hooks {
            xml = hook.on_define(&machine, &xml).await?;
        }

        self.set_definition(machine_id, xml.clone())?;
        info!(machine = %machine.name, "Mock machine defined");
        Ok(xml)
    }
}

impl Default for MockHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MachineInventory for MockHypervisor {
    async fn machines(&self) -> Result<Vec<MachineRecord>> {
        let machines = self.machines.read().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;
        Ok(machines.values().cloned().collect())
    }
}

#[async_trait]
impl MachineDefiner for MockHypervisor {
    async fn redefine(&self, machine_id: &str) -> Result<()> {
        if let Ok(mut calls) = self.redefinitions.write() {
            calls.push(machine_id.to_string());
        }

        let current = self.definition(machine_id).ok_or_else(|| {
            NetworkError::Machine(format!("machine {} has no definition", machine_id))
        })?;
        self.define(machine_id, &current).await?;
        Ok(())
    }
}
