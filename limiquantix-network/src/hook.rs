//! Machine definition hook running the reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::reconciler::Reconciler;
use crate::traits::{DefinitionHook, NetworkLookup};
use crate::types::MachineRecord;
use crate::xml::Element;

/// Reconciling role, registered with the machine lifecycle manager.
pub struct NuageDefinitionHook {
    reconciler: Reconciler,
    lookup: Arc<dyn NetworkLookup>,
}

impl NuageDefinitionHook {
    pub fn new(reconciler: Reconciler, lookup: Arc<dyn NetworkLookup>) -> Self {
        Self { reconciler, lookup }
    }
}

#[async_trait]
impl DefinitionHook for NuageDefinitionHook {
    #[instrument(
        skip(self, machine, xml),
        fields(machine_id = %machine.id, machine = %machine.name)
    )]
    async fn on_define(&self, machine: &MachineRecord, xml: &str) -> Result<String> {
        // Unknown owner: hand the description back verbatim
        let Some(owner) = machine.owner.as_ref() else {
            debug!("Machine has no owner identity, skipping reconciliation");
            return Ok(xml.to_string());
        };

        let domain = Element::parse(xml)?;
        let reconciled = self
            .reconciler
            .reconcile(&domain, Some(owner), self.lookup.as_ref())
            .await?;
        reconciled.to_xml()
    }
}
