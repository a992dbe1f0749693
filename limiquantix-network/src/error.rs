//! Error types for the Nuage network registry and reconciler.

use thiserror::Error;

/// Errors that can occur while managing or binding Nuage networks.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A network with this name is already registered.
    #[error("Network already exists: {0}")]
    DuplicateName(String),

    /// No network with this name is registered.
    #[error("Network not found: {0}")]
    NotFound(String),

    /// The network is still referenced by machine descriptions.
    #[error("{}", in_use_message(.name, .machines))]
    NetworkInUse {
        name: String,
        machines: Vec<String>,
    },

    /// A bound network could not be resolved during reconciliation.
    #[error("Unable to resolve network '{name}' for interface binding: {reason}")]
    NetworkNotFound { name: String, reason: String },

    /// Structurally invalid definition, description or request.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The caller lacks the permission for the action.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The action is not served by this handler set.
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// The update was committed but some machines failed to redefine.
    #[error("Network '{name}' updated but redefinition failed for: {}", .machines.join(", "))]
    PropagationFailed {
        name: String,
        machines: Vec<String>,
    },

    /// Machine definition or inventory failure.
    #[error("Machine operation failed: {0}")]
    Machine(String),

    /// Backing store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn in_use_message(name: &str, machines: &[String]) -> String {
    let mut message = format!(
        "Unable to delete the network '{}'. Following VMs are using it:\n",
        name
    );
    for machine in machines {
        message.push_str(&format!(" - {}\n", machine));
    }
    message.push_str("Please update their networks before removing it");
    message
}

impl From<sqlx::Error> for NetworkError {
    fn from(e: sqlx::Error) -> Self {
        NetworkError::Storage(e.to_string())
    }
}

impl From<quick_xml::Error> for NetworkError {
    fn from(e: quick_xml::Error) -> Self {
        NetworkError::MalformedInput(e.to_string())
    }
}

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
