//! Request dispatch for the network registry.
//!
//! Parses actions, checks permissions, runs the operation and turns every
//! failure into a `{code, message}` reply carrying the action's error code.
//! Two handler sets exist: the hypervisor one serves all actions, the
//! machine one serves the read actions from the owning hypervisor's catalog.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{NetworkError, Result};
use crate::network::NetworkDefinition;
use crate::permissions::PermissionSpec;
use crate::registry::NetworkRegistry;
use crate::traits::{NetworkCatalog, PermissionGate};

/// Code reported when the action itself cannot be parsed.
pub const UNKNOWN_ACTION_CODE: i32 = -12000;

/// Code reported when a machine definition cannot be reconciled.
pub const DEFINE_ERROR_CODE: i32 = -12006;

/// Registry actions reachable through dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkAction {
    Create,
    Delete,
    Update,
    Get,
    #[serde(rename = "getnames")]
    GetNames,
}

impl NetworkAction {
    pub const ALL: [NetworkAction; 5] = [
        NetworkAction::Create,
        NetworkAction::Delete,
        NetworkAction::Update,
        NetworkAction::Get,
        NetworkAction::GetNames,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkAction::Create => "create",
            NetworkAction::Delete => "delete",
            NetworkAction::Update => "update",
            NetworkAction::Get => "get",
            NetworkAction::GetNames => "getnames",
        }
    }

    /// Permission a caller needs to run this action.
    pub fn permission(&self) -> String {
        PermissionSpec::new(self.as_str(), "").name
    }

    /// Code attached to every failure of this action.
    pub fn error_code(&self) -> i32 {
        match self {
            NetworkAction::Create => -12001,
            NetworkAction::Delete => -12002,
            NetworkAction::Update => -12003,
            NetworkAction::Get => -12004,
            NetworkAction::GetNames => -12005,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            NetworkAction::Create => "authorizes users to create Nuage networks",
            NetworkAction::Delete => "authorizes users to delete Nuage networks",
            NetworkAction::Update => "authorizes users to update Nuage networks",
            NetworkAction::Get => "authorizes users to get all Nuage networks",
            NetworkAction::GetNames => "authorizes users to get all Nuage network names",
        }
    }
}

impl fmt::Display for NetworkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkAction {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        NetworkAction::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| NetworkError::MalformedInput(format!("unknown action '{}'", s)))
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    /// Caller identity checked against the permission gate
    pub actor: String,
    pub action: NetworkAction,
    /// Target network name (create, update, delete)
    pub name: Option<String>,
    /// `nuage_network` XML (create, update)
    pub definition: Option<String>,
}

impl NetworkRequest {
    pub fn new(actor: impl Into<String>, action: NetworkAction) -> Self {
        Self {
            actor: actor.into(),
            action,
            name: None,
            definition: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    fn parsed_definition(&self) -> Result<NetworkDefinition> {
        let xml = self.definition.as_deref().ok_or_else(|| {
            NetworkError::MalformedInput(format!("{} requires a network definition", self.action))
        })?;
        NetworkDefinition::parse(self.name.as_deref(), xml)
    }

    fn required_name(&self) -> Result<&str> {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                NetworkError::MalformedInput(format!("{} requires a network name", self.action))
            })
    }
}

/// One network in a `get` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub name: String,
    pub definition: String,
}

/// Successful reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkReply {
    Done,
    Networks(Vec<NetworkEntry>),
    Names(Vec<String>),
}

/// Failure reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: i32,
    pub message: String,
}

impl ErrorReply {
    pub fn new(code: i32, error: &NetworkError) -> Self {
        Self {
            code,
            message: error.to_string(),
        }
    }
}

/// A set of request handlers exposed by one process.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Permissions this handler set declares.
    fn permissions(&self) -> Vec<PermissionSpec>;

    /// Serve one request.
    async fn handle(
        &self,
        request: NetworkRequest,
    ) -> std::result::Result<NetworkReply, ErrorReply>;
}

fn authorize(gate: &dyn PermissionGate, request: &NetworkRequest) -> Result<()> {
    let permission = request.action.permission();
    if gate.check(&request.actor, &permission) {
        Ok(())
    } else {
        warn!(actor = %request.actor, permission = %permission, "Permission denied");
        Err(NetworkError::PermissionDenied(format!(
            "{} lacks {}",
            request.actor, permission
        )))
    }
}

fn entries(definitions: Vec<NetworkDefinition>) -> Result<NetworkReply> {
    let entries = definitions
        .into_iter()
        .map(|d| -> Result<NetworkEntry> {
            Ok(NetworkEntry {
                definition: d.to_xml()?,
                name: d.name,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(NetworkReply::Networks(entries))
}

fn declare(actions: &[NetworkAction]) -> Vec<PermissionSpec> {
    actions
        .iter()
        .map(|a| PermissionSpec::new(a.as_str(), a.description()))
        .collect()
}

/// Full handler set, hosted next to the registry.
pub struct HypervisorHandlers {
    registry: Arc<NetworkRegistry>,
    gate: Arc<dyn PermissionGate>,
}

impl HypervisorHandlers {
    pub fn new(registry: Arc<NetworkRegistry>, gate: Arc<dyn PermissionGate>) -> Self {
        Self { registry, gate }
    }

    async fn run(&self, request: &NetworkRequest) -> Result<NetworkReply> {
        authorize(self.gate.as_ref(), request)?;

        match request.action {
            NetworkAction::Create => {
                self.registry.create(request.parsed_definition()?).await?;
                Ok(NetworkReply::Done)
            }
            NetworkAction::Update => {
                self.registry.update(request.parsed_definition()?).await?;
                Ok(NetworkReply::Done)
            }
            NetworkAction::Delete => {
                self.registry.delete(request.required_name()?).await?;
                Ok(NetworkReply::Done)
            }
            NetworkAction::Get => entries(self.registry.list_all().await?),
            NetworkAction::GetNames => Ok(NetworkReply::Names(self.registry.list_names().await?)),
        }
    }
}

#[async_trait]
impl RequestHandler for HypervisorHandlers {
    fn permissions(&self) -> Vec<PermissionSpec> {
        declare(&NetworkAction::ALL)
    }

    #[instrument(skip(self, request), fields(action = %request.action, actor = %request.actor))]
    async fn handle(
        &self,
        request: NetworkRequest,
    ) -> std::result::Result<NetworkReply, ErrorReply> {
        debug!("Handling network request");
        self.run(&request).await.map_err(|e| {
            warn!(error = %e, "Network request failed");
            ErrorReply::new(request.action.error_code(), &e)
        })
    }
}

/// Read-only handler set, hosted on behalf of a machine.
pub struct MachineHandlers {
    catalog: Arc<dyn NetworkCatalog>,
    gate: Arc<dyn PermissionGate>,
}

impl MachineHandlers {
    const SERVED: [NetworkAction; 2] = [NetworkAction::Get, NetworkAction::GetNames];

    pub fn new(catalog: Arc<dyn NetworkCatalog>, gate: Arc<dyn PermissionGate>) -> Self {
        Self { catalog, gate }
    }

    async fn run(&self, request: &NetworkRequest) -> Result<NetworkReply> {
        if !Self::SERVED.contains(&request.action) {
            return Err(NetworkError::UnsupportedAction(format!(
                "{} is only available on the hypervisor",
                request.action
            )));
        }

        authorize(self.gate.as_ref(), request)?;

        match request.action {
            NetworkAction::GetNames => Ok(NetworkReply::Names(self.catalog.list_names().await?)),
            _ => entries(self.catalog.list_all().await?),
        }
    }
}

#[async_trait]
impl RequestHandler for MachineHandlers {
    fn permissions(&self) -> Vec<PermissionSpec> {
        declare(&Self::SERVED)
    }

    #[instrument(skip(self, request), fields(action = %request.action, actor = %request.actor))]
    async fn handle(
        &self,
        request: NetworkRequest,
    ) -> std::result::Result<NetworkReply, ErrorReply> {
        self.run(&request).await.map_err(|e| {
            warn!(error = %e, "Network request failed");
            ErrorReply::new(request.action.error_code(), &e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NetworkCatalog for CountingCatalog {
        async fn list_all(&self) -> Result<Vec<NetworkDefinition>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![NetworkDefinition::parse(None, r#"<nuage_network name="net1" type="ipv4"/>"#)?])
        }

        async fn list_names(&self) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(NetworkError::Storage("database is locked".to_string()))
        }
    }

    struct Gate(bool);

    impl PermissionGate for Gate {
        fn check(&self, _actor: &str, _permission: &str) -> bool {
            self.0
        }
    }

    fn machine_handlers(allowed: bool) -> (Arc<CountingCatalog>, MachineHandlers) {
        let catalog = Arc::new(CountingCatalog { calls: AtomicUsize::new(0) });
        let handlers = MachineHandlers::new(catalog.clone(), Arc::new(Gate(allowed)));
        (catalog, handlers)
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("GETNAMES".parse::<NetworkAction>().unwrap(), NetworkAction::GetNames);
        assert_eq!("Create".parse::<NetworkAction>().unwrap(), NetworkAction::Create);
        assert!(matches!(
            "rename".parse::<NetworkAction>(),
            Err(NetworkError::MalformedInput(_))
        ));
        assert_eq!(NetworkAction::Delete.permission(), "networks_delete");
    }

    #[test]
    fn test_error_codes() {
        let codes: Vec<i32> = NetworkAction::ALL.iter().map(|a| a.error_code()).collect();
        assert_eq!(codes, vec![-12001, -12002, -12003, -12004, -12005]);
    }

    #[tokio::test]
    async fn test_machine_handlers_serve_reads() {
        let (_, handlers) = machine_handlers(true);

        let reply = handlers
            .handle(NetworkRequest::new("alice", NetworkAction::Get))
            .await
            .unwrap();
        match reply {
            NetworkReply::Networks(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "net1");
                assert!(entries[0].definition.contains(r#"type="ipv4""#));
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        let err = handlers
            .handle(NetworkRequest::new("alice", NetworkAction::GetNames))
            .await
            .unwrap_err();
        assert_eq!(err.code, -12005);
        assert!(err.message.contains("database is locked"));
    }

    #[tokio::test]
    async fn test_machine_handlers_reject_mutations() {
        let (catalog, handlers) = machine_handlers(true);

        for action in [NetworkAction::Create, NetworkAction::Update, NetworkAction::Delete] {
            let err = handlers
                .handle(NetworkRequest::new("alice", action).with_name("net1"))
                .await
                .unwrap_err();
            assert_eq!(err.code, action.error_code());
            assert!(err.message.contains("Unsupported action"));
        }
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);

        let declared: Vec<String> = handlers.permissions().into_iter().map(|p| p.name).collect();
        assert_eq!(declared, vec!["networks_get", "networks_getnames"]);
    }

    #[tokio::test]
    async fn test_denial_short_circuits() {
        let (catalog, handlers) = machine_handlers(false);

        let err = handlers
            .handle(NetworkRequest::new("mallory", NetworkAction::Get))
            .await
            .unwrap_err();
        assert_eq!(err.code, -12004);
        assert!(err.message.contains("Permission denied"));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reply_serialization() {
        let names = serde_json::to_value(NetworkReply::Names(vec!["a".to_string()])).unwrap();
        assert_eq!(names, serde_json::json!(["a"]));
        assert_eq!(serde_json::to_value(NetworkReply::Done).unwrap(), serde_json::Value::Null);
    }
}
