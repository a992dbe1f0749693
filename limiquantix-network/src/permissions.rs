//! Permission declarations and a static grant table.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::PermissionGate;

/// Prefix of every permission this subsystem declares.
pub const PERMISSION_PREFIX: &str = "networks_";

/// A permission a handler set declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSpec {
    pub name: String,
    pub description: String,
}

impl PermissionSpec {
    pub fn new(action: &str, description: &str) -> Self {
        Self {
            name: format!("{}{}", PERMISSION_PREFIX, action),
            description: description.to_string(),
        }
    }
}

/// Grants loaded from configuration, keyed by actor.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionGate {
    allow_all: bool,
    grants: HashMap<String, HashSet<String>>,
}

impl StaticPermissionGate {
    pub fn new(grants: HashMap<String, Vec<String>>) -> Self {
        Self {
            allow_all: false,
            grants: grants
                .into_iter()
                .map(|(actor, permissions)| (actor, permissions.into_iter().collect()))
                .collect(),
        }
    }

    /// Gate approving everything (development mode).
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            grants: HashMap::new(),
        }
    }
}

impl PermissionGate for StaticPermissionGate {
    fn check(&self, actor: &str, permission: &str) -> bool {
        let granted = self.allow_all
            || self
                .grants
                .get(actor)
                .is_some_and(|p| p.contains(permission) || p.contains("*"));
        debug!(actor = %actor, permission = %permission, granted, "Permission check");
        granted
    }
}
