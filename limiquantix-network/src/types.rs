//! Type definitions shared by the registry, scanner and reconciler.

use serde::{Deserialize, Serialize};

// =============================================================================
// WIRE CONSTANTS
// =============================================================================

/// Namespace the registry's wire representation stamps on definitions.
pub const REGISTRY_NAMESPACE: &str = "archipel:hypervisor:nuage:network";

/// Namespace of the `nuage` block inside domain metadata.
pub const METADATA_NAMESPACE: &str = "http://www.nuagenetworks.net/2013/Vm/Metadata";

/// Interface `type` requesting an explicit Nuage attachment.
pub const NUAGE_INTERFACE_TYPE: &str = "nuage";

/// Interface attribute naming the requested network.
pub const NUAGE_NETWORK_NAME_ATTR: &str = "nuage_network_name";

/// Interface attribute carrying the requested fixed address.
pub const NUAGE_INTERFACE_IP_ATTR: &str = "nuage_network_interface_ip";

/// Root element of a network definition.
pub const NETWORK_ELEMENT: &str = "nuage_network";

/// Element holding the per-machine binding block under `metadata`.
pub const NUAGE_ELEMENT: &str = "nuage";

/// Virtual port type injected into rewritten interfaces.
pub const VIRTUALPORT_TYPE: &str = "openvswitch";

/// Bridge used when none is configured (Nuage VRS).
pub const DEFAULT_BRIDGE: &str = "alubr0";

/// Namespace used for change notifications.
pub const CHANGE_NAMESPACE: &str = "nuagenetwork";

// =============================================================================
// MACHINES
// =============================================================================

/// Owner labels attached to a machine, required to build reconciled metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerIdentity {
    /// Owning user
    pub user: String,
    /// Organization (Nuage "enterprise")
    pub organization: String,
    /// Application or category
    pub application: String,
}

impl OwnerIdentity {
    pub fn new(
        user: impl Into<String>,
        organization: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            organization: organization.into(),
            application: application.into(),
        }
    }
}

/// A machine as reported by the hypervisor's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Unique identifier (UUID)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Owner labels, if known
    pub owner: Option<OwnerIdentity>,
    /// Currently persisted domain XML, if the machine has been defined
    pub definition: Option<String>,
}

impl MachineRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner: None,
            definition: None,
        }
    }

    pub fn with_owner(mut self, owner: OwnerIdentity) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }
}
