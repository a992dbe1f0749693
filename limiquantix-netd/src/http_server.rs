//! HTTP transport for the network registry.
//!
//! This module provides:
//! - `POST /api/v1/networks/:action` served by the hypervisor handler set
//! - `POST /api/v1/machine/networks/:action` served by the machine handler set
//! - `POST /api/v1/machines/:id/define` runs a domain description through the
//!   definition hook and returns the reconciled XML
//! - `GET /api/v1/networks/events` with the recent change notifications
//! - `GET /health`
//!
//! The caller is identified by the `x-actor` header. Failures are returned
//! as `{code, message}` with the action's error code.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use limiquantix_network::{
    service::{DEFINE_ERROR_CODE, UNKNOWN_ACTION_CODE},
    DefinitionHook, ErrorReply, EventBus, MachineRecord, NetworkAction, NetworkError,
    NetworkEvent, NetworkReply, NetworkRequest, OwnerIdentity, RequestHandler,
};

/// Header carrying the caller identity.
pub const ACTOR_HEADER: &str = "x-actor";

const ANONYMOUS_ACTOR: &str = "anonymous";

/// Shared state for HTTP handlers
pub struct AppState {
    pub hypervisor_handlers: Arc<dyn RequestHandler>,
    pub machine_handlers: Arc<dyn RequestHandler>,
    pub hook: Arc<dyn DefinitionHook>,
    pub events: Arc<EventBus>,
    pub node_id: String,
    pub hostname: String,
}

// ============================================================================
// API Types
// ============================================================================

/// Request body; every field is optional and depends on the action.
#[derive(Debug, Default, Deserialize)]
struct NetworkBody {
    name: Option<String>,
    definition: Option<String>,
}

/// Domain description to reconcile for the machine in the path.
#[derive(Debug, Deserialize)]
struct DefineBody {
    /// Machine name; defaults to the ID.
    name: Option<String>,
    owner: Option<OwnerIdentity>,
    xml: String,
}

#[derive(Serialize)]
struct DefineResponse {
    xml: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    healthy: bool,
    node_id: String,
    hostname: String,
    version: &'static str,
}

// ============================================================================
// Server
// ============================================================================

/// Serve the API until ctrl-c.
pub async fn run_http_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_app_router(state);

    info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}

pub fn build_app_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/networks/events", get(list_events))
        .route("/networks/:action", post(hypervisor_action))
        .route("/machine/networks/:action", post(machine_action))
        .route("/machines/:id/define", post(define_machine))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .with_state(state)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        node_id: state.node_id.clone(),
        hostname: state.hostname.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/v1/networks/events - Recent network changes, oldest first
async fn list_events(State(state): State<Arc<AppState>>) -> Json<Vec<NetworkEvent>> {
    Json(state.events.recent())
}

/// POST /api/v1/networks/:action
async fn hypervisor_action(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state.hypervisor_handlers.as_ref(), &action, &headers, &body).await
}

/// POST /api/v1/machine/networks/:action
async fn machine_action(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state.machine_handlers.as_ref(), &action, &headers, &body).await
}

/// POST /api/v1/machines/:id/define
async fn define_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let body: DefineBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            let error = NetworkError::MalformedInput(format!("invalid request body: {}", e));
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorReply::new(DEFINE_ERROR_CODE, &error)),
            )
                .into_response();
        }
    };

    let name = body.name.unwrap_or_else(|| id.clone());
    let mut machine = MachineRecord::new(id, name);
    if let Some(owner) = body.owner {
        machine = machine.with_owner(owner);
    }
    debug!(machine_id = %machine.id, machine = %machine.name, "Define request");

    match state.hook.on_define(&machine, &body.xml).await {
        Ok(xml) => Json(DefineResponse { xml }).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorReply::new(DEFINE_ERROR_CODE, &e)),
        )
            .into_response(),
    }
}

async fn dispatch(
    handlers: &dyn RequestHandler,
    action: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let action: NetworkAction = match action.parse() {
        Ok(action) => action,
        Err(e) => {
            return (StatusCode::NOT_FOUND, Json(ErrorReply::new(UNKNOWN_ACTION_CODE, &e)))
                .into_response();
        }
    };

    let body: NetworkBody = if body.iter().all(u8::is_ascii_whitespace) {
        NetworkBody::default()
    } else {
        match serde_json::from_slice(body) {
            Ok(body) => body,
            Err(e) => {
                let error = NetworkError::MalformedInput(format!("invalid request body: {}", e));
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorReply::new(action.error_code(), &error)),
                )
                    .into_response();
            }
        }
    };

    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_ACTOR);
    debug!(actor = %actor, action = %action, "Network API request");

    let mut request = NetworkRequest::new(actor, action);
    request.name = body.name;
    request.definition = body.definition;

    match handlers.handle(request).await {
        Ok(NetworkReply::Done) => StatusCode::NO_CONTENT.into_response(),
        Ok(reply) => Json(reply).into_response(),
        Err(reply) => (StatusCode::BAD_REQUEST, Json(reply)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use limiquantix_network::{
        HypervisorHandlers, MachineHandlers, MockHypervisor, NetworkRegistry, NetworkStore,
        NuageDefinitionHook, Reconciler, StaticPermissionGate,
    };
    use tower::ServiceExt;

    async fn app(dir: &tempfile::TempDir) -> Router {
        let store = NetworkStore::open(dir.path().join("networks.db")).await.unwrap();
        let hypervisor = Arc::new(MockHypervisor::new());
        let events = Arc::new(EventBus::new());
        let registry = Arc::new(NetworkRegistry::new(
            store,
            hypervisor.clone(),
            hypervisor,
            events.clone(),
        ));
        let gate = Arc::new(StaticPermissionGate::new(
            [("admin".to_string(), vec!["*".to_string()])].into(),
        ));

        build_app_router(Arc::new(AppState {
            hypervisor_handlers: Arc::new(HypervisorHandlers::new(registry.clone(), gate.clone())),
            machine_handlers: Arc::new(MachineHandlers::new(registry.clone(), gate)),
            hook: Arc::new(NuageDefinitionHook::new(Reconciler::default(), registry)),
            events,
            node_id: "node-1".to_string(),
            hostname: "host-1".to_string(),
        }))
    }

    fn post(uri: &str, actor: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(ACTOR_HEADER, actor)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_list_names() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let body =
            serde_json::json!({ "definition": "<nuage_network name=\"net1\" type=\"ipv4\"/>" });
        let response = app
            .clone()
            .oneshot(post("/api/v1/networks/create", "admin", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(post("/api/v1/networks/GETNAMES", "admin", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await, serde_json::json!(["net1"]));

        let response = app
            .oneshot(Request::get("/api/v1/networks/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let events = json(response).await;
        assert_eq!(events[0]["change"], "created");
    }

    #[tokio::test]
    async fn test_failures_carry_action_codes() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let response = app
            .clone()
            .oneshot(post("/api/v1/networks/delete", "admin", r#"{"name":"ghost"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let reply = json(response).await;
        assert_eq!(reply["code"], -12002);
        assert!(reply["message"].as_str().unwrap().contains("ghost"));

        let response = app
            .clone()
            .oneshot(post("/api/v1/networks/get", "stranger", ""))
            .await
            .unwrap();
        assert_eq!(json(response).await["code"], -12004);

        let response = app
            .clone()
            .oneshot(post("/api/v1/networks/rename", "admin", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post("/api/v1/networks/update", "admin", "{not json"))
            .await
            .unwrap();
        assert_eq!(json(response).await["code"], -12003);
    }

    #[tokio::test]
    async fn test_machine_routes_are_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let response = app
            .clone()
            .oneshot(post("/api/v1/machine/networks/delete", "admin", r#"{"name":"net1"}"#))
            .await
            .unwrap();
        assert_eq!(json(response).await["code"], -12002);

        let response = app
            .oneshot(post("/api/v1/machine/networks/get", "admin", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_define_returns_reconciled_xml() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let body =
            serde_json::json!({ "definition": "<nuage_network name=\"net1\" zone=\"z1\"/>" });
        let response = app
            .clone()
            .oneshot(post("/api/v1/networks/create", "admin", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let body = serde_json::json!({
            "owner": { "user": "alice", "organization": "acme", "application": "web" },
            "xml": "<domain><name>vm1</name><devices>\
                    <interface type='nuage' nuage_network_name='net1'>\
                    <mac address='FA:16:3E:AA:BB:CC'/></interface></devices></domain>"
        });
        let response = app
            .oneshot(post("/api/v1/machines/m1/define", "admin", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let xml = json(response).await["xml"].as_str().unwrap().to_string();
        assert!(xml.contains(r#"<target dev="FA163EAABBCC"/>"#));
        assert!(xml.contains(r#"<interface mac="FA:16:3E:AA:BB:CC"/>"#));
        assert!(xml.contains(r#"<user name="alice"/>"#));
    }

    #[tokio::test]
    async fn test_define_unknown_network_fails() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let body = serde_json::json!({
            "owner": { "user": "alice", "organization": "acme", "application": "web" },
            "xml": "<domain><devices><interface type='nuage' nuage_network_name='ghost'>\
                    <mac address='00:11:22:33:44:55'/></interface></devices></domain>"
        });
        let response = app
            .clone()
            .oneshot(post("/api/v1/machines/m1/define", "admin", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let reply = json(response).await;
        assert_eq!(reply["code"], DEFINE_ERROR_CODE);
        assert!(reply["message"].as_str().unwrap().contains("Unable to resolve network 'ghost'"));

        let response = app
            .oneshot(post("/api/v1/machines/m1/define", "admin", r#"{"owner":null}"#))
            .await
            .unwrap();
        assert_eq!(json(response).await["code"], DEFINE_ERROR_CODE);
    }

    #[tokio::test]
    async fn test_define_without_owner_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let xml = "<domain  type='kvm'><devices><interface type='nuage'/></devices></domain>";
        let body = serde_json::json!({ "xml": xml });

        let response = app(&dir)
            .await
            .oneshot(post("/api/v1/machines/m1/define", "admin", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["xml"], xml);
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json(response).await["nodeId"], "node-1");
    }
}
