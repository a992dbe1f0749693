//! Libvirt inventory implementation.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument, warn};
use virt::connect::Connect;
use virt::domain::Domain;
use virt::sys;

use super::{owner_from_metadata, readable_records};
use crate::error::{NetworkError, Result};
use crate::traits::{DefinitionHook, MachineDefiner, MachineInventory};
use crate::types::MachineRecord;
use crate::xml::Element;

/// Libvirt-backed machine inventory and definer.
pub struct LibvirtInventory {
    uri: String,
    connection: Connect,
    hooks: RwLock<Vec<Arc<dyn DefinitionHook>>>,
}

impl LibvirtInventory {
    /// Connect to the libvirt daemon at `uri` (e.g. `qemu:///system`).
    pub fn connect(uri: &str) -> Result<Self> {
        info!(uri = %uri, "Connecting to libvirt");

        let connection = Connect::open(Some(uri))
            .map_err(|e| NetworkError::Machine(format!("libvirt connection failed: {}", e)))?;

        info!("Connected to libvirt");

        Ok(Self {
            uri: uri.to_string(),
            connection,
            hooks: RwLock::new(Vec::new()),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Register a hook run before every redefinition.
    pub fn add_definition_hook(&self, hook: Arc<dyn DefinitionHook>) -> Result<()> {
        let mut hooks = self.hooks.write().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;
        hooks.push(hook);
        Ok(())
    }

    fn get_domain(&self, machine_id: &str) -> Result<Domain> {
        Domain::lookup_by_uuid_string(&self.connection, machine_id)
            .map_err(|e| NetworkError::Machine(format!("{}: {}", machine_id, e)))
    }

    /// Persistent (inactive) description and record of a domain.
    fn record(domain: &Domain) -> Result<MachineRecord> {
        let id = domain
            .get_uuid_string()
            .map_err(|e| NetworkError::Machine(e.to_string()))?;
        let name = domain
            .get_name()
            .map_err(|e| NetworkError::Machine(e.to_string()))?;
        let xml = domain
            .get_xml_desc(sys::VIR_DOMAIN_XML_INACTIVE)
            .map_err(|e| NetworkError::Machine(e.to_string()))?;

        let mut record = MachineRecord::new(id, name);
        match Element::parse(&xml) {
            Ok(parsed) => record.owner = owner_from_metadata(&parsed),
            Err(e) => warn!(machine = %record.name, error = %e, "Unparseable domain XML"),
        }
        Ok(record.with_definition(xml))
    }
}

#[async_trait]
impl MachineInventory for LibvirtInventory {
    #[instrument(skip(self))]
    async fn machines(&self) -> Result<Vec<MachineRecord>> {
        let flags = sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE | sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE;

        let domains = self
            .connection
            .list_all_domains(flags)
            .map_err(|e| NetworkError::Machine(e.to_string()))?;

        let machines = readable_records(domains.iter().map(Self::record));

        debug!(count = machines.len(), "Listed machines");
        Ok(machines)
    }
}

#[async_trait]
impl MachineDefiner for LibvirtInventory {
    #[instrument(skip(self), fields(machine_id = %machine_id))]
    async fn redefine(&self, machine_id: &str) -> Result<()> {
        let record = Self::record(&self.get_domain(machine_id)?)?;
        let mut xml = record.definition.clone().unwrap_or_default();

        let hooks: Vec<_> = self
            .hooks
            .read()
            .map_err(|_| NetworkError::Internal("Lock poisoned".to_string()))?
            .clone();
        for hook in hooks {
            xml = hook.on_define(&record, &xml).await?;
        }

        Domain::define_xml(&self.connection, &xml)
            .map_err(|e| {
                NetworkError::Machine(format!("define failed for {}: {}", record.name, e))
            })?;

        info!(machine = %record.name, "Machine redefined");
        Ok(())
    }
}
