//! REST API for network lifecycle operations.
//!
//! All routes live under `/api/v1`. Authentication is handled upstream; the
//! caller identity arrives in the `X-User-ID` header.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use vortex_network::{
    ErrorKind, EventLog, LifecycleEvent, Network, NetworkError, NetworkOrchestrator,
    NetworkPhase, NetworkSpec, ReconcileReport,
};

/// Header carrying the authenticated caller.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared state for HTTP handlers
pub struct AppState {
    pub orchestrator: Arc<NetworkOrchestrator>,
    pub events: Arc<EventLog>,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkListResponse {
    networks: Vec<Network>,
    total_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkStatusResponse {
    network_id: Uuid,
    workloads: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct DeleteResponse {
    error: bool,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    events: Vec<LifecycleEvent>,
    total_count: usize,
}

#[derive(Debug, Deserialize)]
struct EventQuery {
    phase: Option<String>,
    limit: Option<usize>,
}

// ============================================================================
// Error Mapping
// ============================================================================

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidSpec => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InUse => StatusCode::METHOD_NOT_ALLOWED,
        ErrorKind::DependencyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ProvisionFailure
        | ErrorKind::DeprovisionFailure
        | ErrorKind::CompensationFailure
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidSpec => "invalid_spec",
        ErrorKind::Conflict => "conflict",
        ErrorKind::NotFound => "not_found",
        ErrorKind::InUse => "in_use",
        ErrorKind::ProvisionFailure => "provision_failed",
        ErrorKind::DeprovisionFailure => "deprovision_failed",
        ErrorKind::CompensationFailure => "compensation_failed",
        ErrorKind::DependencyUnavailable => "dependency_unavailable",
        ErrorKind::Internal => "internal_error",
    }
}

/// Map a core error onto an HTTP response.
///
/// A compensation failure takes the status of the error that triggered it;
/// the body carries both messages.
fn api_error(err: NetworkError) -> (StatusCode, Json<ApiError>) {
    let status = status_for(err.primary().kind());
    if status.is_server_error() {
        warn!(error = %err, "Request failed");
    }
    (status, Json(ApiError::new(error_code(err.kind()), &err.to_string())))
}

fn parse_id(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("invalid_id", &format!("Invalid network ID: {}", id))),
        )
    })
}

// ============================================================================
// Router
// ============================================================================

/// Build the application router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/networks", get(list_networks).post(create_network))
        .route("/networks/reconcile", post(reconcile))
        .route("/networks/:id", get(get_network).delete(delete_network))
        .route("/networks/:id/status", get(network_status))
        .route("/events", get(list_events));

    Router::new()
        .nest("/api/v1", api_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/v1/networks
async fn create_network(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<NetworkSpec>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let owner_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new("unauthorized", "Missing X-User-ID header")),
            )
        })?
        .to_string();

    let Json(spec) = body.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("invalid_spec", &e.body_text())),
        )
    })?;

    info!(network = %spec.name, owner = %owner_id, "Create network requested");

    let network = state
        .orchestrator
        .create_network(spec, &owner_id)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(network)))
}

/// GET /api/v1/networks
async fn list_networks(State(state): State<Arc<AppState>>) -> ApiResult<Json<NetworkListResponse>> {
    let networks = state.orchestrator.list_networks().await.map_err(api_error)?;
    Ok(Json(NetworkListResponse {
        total_count: networks.len(),
        networks,
    }))
}

/// GET /api/v1/networks/:id
async fn get_network(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Network>> {
    let id = parse_id(&id)?;
    let network = state.orchestrator.get_network(id).await.map_err(api_error)?;
    Ok(Json(network))
}

/// GET /api/v1/networks/:id/status
async fn network_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<NetworkStatusResponse>> {
    let id = parse_id(&id)?;
    let workloads = state.orchestrator.network_status(id).await.map_err(api_error)?;
    Ok(Json(NetworkStatusResponse {
        network_id: id,
        workloads,
    }))
}

/// DELETE /api/v1/networks/:id
async fn delete_network(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let id = parse_id(&id)?;
    state.orchestrator.delete_network(id).await.map_err(api_error)?;

    Ok(Json(DeleteResponse {
        error: false,
        message: "Delete success".to_string(),
    }))
}

/// POST /api/v1/networks/reconcile
async fn reconcile(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReconcileReport>> {
    let report = state.orchestrator.reconcile().await.map_err(api_error)?;
    Ok(Json(report))
}

/// GET /api/v1/events
async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<EventListResponse>> {
    let phase = match query.phase.as_deref() {
        Some(p) => Some(p.parse::<NetworkPhase>().map_err(api_error)?),
        None => None,
    };
    debug!(phase = ?phase, limit = ?query.limit, "Listing events");

    let events = state.events.query(phase, query.limit);
    Ok(Json(EventListResponse {
        total_count: events.len(),
        events,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use vortex_network::{
        FakeProvider, MemoryStore, ProviderRegistry, StaticWorkloads, UsageTracker, WorkloadPhase,
        WorkloadRef,
    };

    struct TestApp {
        router: Router,
        workloads: Arc<StaticWorkloads>,
        fake: Arc<FakeProvider>,
    }

    async fn app() -> TestApp {
        let fake = Arc::new(FakeProvider::new());
        let workloads = Arc::new(StaticWorkloads::new());
        let events = Arc::new(EventLog::new());
        let orchestrator = NetworkOrchestrator::new(
            ProviderRegistry::fake_only(fake.clone()),
            Arc::new(MemoryStore::new()),
            UsageTracker::new(workloads.clone()),
        )
        .with_events(events.clone());
        orchestrator.init().await.unwrap();

        let state = Arc::new(AppState {
            orchestrator: Arc::new(orchestrator),
            events,
        });
        TestApp {
            router: build_router(state),
            workloads,
            fake,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn create_request(body: Value, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/networks")
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app.router, get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let app = app().await;

        let (status, created) = send(
            &app.router,
            create_request(json!({ "name": "tenant-a-net", "type": "bridge", "uplinks": [] }), Some("user-1")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "tenant-a-net");
        assert_eq!(created["type"], "bridge");
        assert_eq!(created["ownerId"], "user-1");
        assert_eq!(created["phase"], "active");
        let id = created["id"].as_str().unwrap().to_string();
        let bridge = created["bridgeName"].as_str().unwrap().to_string();
        assert!(app.fake.contains(&bridge));

        let (status, fetched) = send(&app.router, get(&format!("/api/v1/networks/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["bridgeName"], bridge.as_str());

        let (status, list) = send(&app.router, get("/api/v1/networks")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["totalCount"], 1);

        let (status, body) = send(&app.router, delete(&format!("/api/v1/networks/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "error": false, "message": "Delete success" }));
        assert!(!app.fake.contains(&bridge));

        let (status, body) = send(&app.router, delete(&format!("/api/v1/networks/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_create_requires_user() {
        let app = app().await;
        let (status, body) = send(&app.router, create_request(json!({ "name": "n", "type": "fake" }), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let app = app().await;

        let (status, body) = send(
            &app.router,
            create_request(json!({ "name": "n", "type": "vxlan" }), Some("u")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_spec");

        let (status, _) = send(
            &app.router,
            create_request(json!({ "name": "Not_A_Label", "type": "fake" }), Some("u")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.fake.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let app = app().await;
        let spec = json!({ "name": "dup", "type": "fake" });

        let (status, _) = send(&app.router, create_request(spec.clone(), Some("u"))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app.router, create_request(spec, Some("u"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn test_delete_in_use_and_status() {
        let app = app().await;
        let (_, created) = send(
            &app.router,
            create_request(json!({ "name": "busy", "type": "fake" }), Some("u")),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        app.workloads.attach("busy", WorkloadRef::new("default", "web-0", WorkloadPhase::Running));

        let (status, body) = send(&app.router, get(&format!("/api/v1/networks/{}/status", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["workloads"], json!(["default/web-0"]));

        let (status, body) = send(&app.router, delete(&format!("/api/v1/networks/{}", id))).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "in_use");
        assert!(body["message"].as_str().unwrap().contains("default/web-0"));
    }

    #[tokio::test]
    async fn test_workload_outage_is_503() {
        let app = app().await;
        let (_, created) = send(
            &app.router,
            create_request(json!({ "name": "net-a", "type": "fake" }), Some("u")),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        app.workloads.set_unreachable(true);
        let (status, body) = send(&app.router, delete(&format!("/api/v1/networks/{}", id))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "dependency_unavailable");
    }

    #[tokio::test]
    async fn test_malformed_id() {
        let app = app().await;
        let (status, body) = send(&app.router, get("/api/v1/networks/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_id");
    }

    #[tokio::test]
    async fn test_compensation_failure_uses_primary_status() {
        let app = app().await;
        send(&app.router, create_request(json!({ "name": "x", "type": "fake" }), Some("u"))).await;
        app.fake.set_fail_deletes(true);

        let (status, body) = send(
            &app.router,
            create_request(json!({ "name": "x", "type": "bridge" }), Some("u")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "compensation_failed");
    }

    #[tokio::test]
    async fn test_reconcile_and_events() {
        let app = app().await;
        let (_, created) = send(
            &app.router,
            create_request(json!({ "name": "drift", "type": "fake" }), Some("u")),
        )
        .await;
        app.fake.remove_out_of_band(created["bridgeName"].as_str().unwrap());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/networks/reconcile")
            .body(Body::empty())
            .unwrap();
        let (status, report) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["removed"], json!(["drift"]));

        let (status, events) = send(&app.router, get("/api/v1/events?phase=deleted")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events["totalCount"], 1);
        assert_eq!(events["events"][0]["networkName"], "drift");

        let (status, events) = send(&app.router, get("/api/v1/events?limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events["events"].as_array().unwrap().len(), 2);

        let (status, _) = send(&app.router, get("/api/v1/events?phase=bogus")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
