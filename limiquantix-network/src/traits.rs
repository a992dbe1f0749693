//! Capability traits at the boundaries of the network subsystem.
//!
//! The registry role (hypervisor side) and the reconciling role (machine
//! side) are expressed as separate traits implemented by whichever process
//! hosts them. Transport, permission authority, identity directory and the
//! machine lifecycle manager are reached only through these seams.

use async_trait::async_trait;

use crate::error::Result;
use crate::network::NetworkDefinition;
use crate::types::MachineRecord;

/// Resolves a network definition by name.
///
/// When the reconciler runs on behalf of a machine, the implementation may
/// live across an ownership boundary (machine -> owning hypervisor) and must
/// be treated as remote and fallible.
#[async_trait]
pub trait NetworkLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<NetworkDefinition>;
}

/// Read-only view of the registry, served to machines as well.
#[async_trait]
pub trait NetworkCatalog: Send + Sync {
    /// All stored definitions. No ordering guarantee.
    async fn list_all(&self) -> Result<Vec<NetworkDefinition>>;

    /// All stored names. No ordering guarantee.
    async fn list_names(&self) -> Result<Vec<String>>;
}

/// Enumerates the machines owned by a hypervisor.
#[async_trait]
pub trait MachineInventory: Send + Sync {
    /// Snapshot of every machine with its currently persisted description.
    async fn machines(&self) -> Result<Vec<MachineRecord>>;
}

/// Re-applies a machine's full device description.
///
/// Re-definition goes through the machine lifecycle manager, which runs the
/// definition hooks (and therefore the reconciler) again.
#[async_trait]
pub trait MachineDefiner: Send + Sync {
    async fn redefine(&self, machine_id: &str) -> Result<()>;
}

/// Publishes "network changed" notifications to subscribers.
pub trait ChangeNotifier: Send + Sync {
    fn push_change(&self, namespace: &str, change: &str, network: &str);
}

/// Approves or denies an action for a caller.
pub trait PermissionGate: Send + Sync {
    fn check(&self, actor: &str, permission: &str) -> bool;
}

/// Machine-side reconciling role: invoked by the lifecycle manager before a
/// new device description is persisted.
#[async_trait]
pub trait DefinitionHook: Send + Sync {
    /// Return the (possibly rewritten) description to persist.
    async fn on_define(&self, machine: &MachineRecord, xml: &str) -> Result<String>;
}
