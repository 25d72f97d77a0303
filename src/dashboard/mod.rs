use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::controlplane::InMemoryControlPlane;
use crate::engine::{EngineStats, StatsSnapshot};
use crate::mirror::NodeMirror;
use crate::model::{Node, WorkUnit};

/// Handles shared with the admin/status HTTP surface. Admin mutations act
/// on the in-process control plane, so a local `placed run` can be driven
/// end-to-end with curl.
#[derive(Clone)]
pub struct DashboardState {
    pub control_plane: Arc<InMemoryControlPlane>,
    pub mirror: NodeMirror,
    pub stats: EngineStats,
    pub engine_name: String,
}

#[derive(Serialize)]
struct StatusResponse {
    engine: String,
    nodes: usize,
    last_sync: Option<DateTime<Utc>>,
    stats: StatsSnapshot,
}

#[derive(Serialize)]
struct WorkUnitResponse {
    namespace: String,
    name: String,
    uid: String,
    engine: String,
    node_name: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct AddNodeRequest {
    name: String,
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
struct NodeQuery {
    name: String,
}

#[derive(Deserialize)]
struct SubmitWorkUnitRequest {
    name: String,
    namespace: Option<String>,
    engine: Option<String>,
}

#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    uid: Option<String>,
    error: Option<String>,
}

impl ApiResponse {
    fn ok(uid: Option<String>) -> Self {
        Self {
            success: true,
            uid,
            error: None,
        }
    }

    fn err(message: &str) -> Self {
        Self {
            success: false,
            uid: None,
            error: Some(message.to_string()),
        }
    }
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route("/api/status", get(status_handler))
        .route(
            "/api/nodes",
            get(list_nodes_handler)
                .post(add_node_handler)
                .delete(remove_node_handler),
        )
        .route(
            "/api/workunits",
            get(list_work_units_handler).post(submit_work_unit_handler),
        )
        .route("/api/bindings", get(bindings_handler))
        .route("/api/events", get(events_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, cancel: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %addr, error = %err, "Failed to bind dashboard server");
            return;
        }
    };

    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await });
    if let Err(err) = serve.await {
        tracing::error!(error = %err, "Dashboard server failed");
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let nodes = state.mirror.snapshot().await;
    Json(StatusResponse {
        engine: state.engine_name.clone(),
        nodes: nodes.len(),
        last_sync: state.mirror.last_sync().await,
        stats: state.stats.snapshot(),
    })
}

async fn list_nodes_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.control_plane.nodes().await)
}

async fn add_node_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<AddNodeRequest>,
) -> impl IntoResponse {
    let mut node = Node::new(&payload.name);
    node.labels = payload.labels.unwrap_or_default();
    state.control_plane.add_node(node).await;
    (StatusCode::OK, Json(ApiResponse::ok(None)))
}

async fn remove_node_handler(
    State(state): State<DashboardState>,
    Query(query): Query<NodeQuery>,
) -> impl IntoResponse {
    if state.control_plane.remove_node(&query.name).await {
        (StatusCode::OK, Json(ApiResponse::ok(None)))
    } else {
        (StatusCode::NOT_FOUND, Json(ApiResponse::err("no such node")))
    }
}

async fn list_work_units_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let units: Vec<WorkUnitResponse> = state
        .control_plane
        .work_units()
        .await
        .into_iter()
        .map(work_unit_response)
        .collect();
    Json(units)
}

async fn submit_work_unit_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<SubmitWorkUnitRequest>,
) -> impl IntoResponse {
    let namespace = payload.namespace.unwrap_or_else(|| "default".to_string());
    let engine = payload.engine.unwrap_or_else(|| state.engine_name.clone());
    let unit = WorkUnit::new(&namespace, &payload.name, &engine);
    let uid = unit.uid;

    if state.control_plane.submit_work_unit(unit).await {
        (StatusCode::OK, Json(ApiResponse::ok(Some(uid.to_string()))))
    } else {
        (
            StatusCode::CONFLICT,
            Json(ApiResponse::err("work unit already exists")),
        )
    }
}

async fn bindings_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.control_plane.bindings().await)
}

async fn events_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.control_plane.events().await)
}

fn work_unit_response(unit: WorkUnit) -> WorkUnitResponse {
    let status = if unit.is_placed() { "placed" } else { "pending" };
    WorkUnitResponse {
        namespace: unit.namespace,
        name: unit.name,
        uid: unit.uid.to_string(),
        engine: unit.engine,
        node_name: unit.node_name,
        status: status.to_string(),
    }
}
