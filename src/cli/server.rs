//! HTTP trigger server
//!
//! `POST /` takes a trigger body and answers with the pipeline results.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::engine::{SyncOrchestrator, TriggerRequest};
use crate::error::{Error, Result};

/// App state shared across handlers
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<SyncOrchestrator>,
}

/// Build the trigger router
pub fn router(orchestrator: Arc<SyncOrchestrator>) -> Router {
    Router::new()
        .route("/", post(trigger))
        .route("/health", get(health))
        .route("/entities", get(list_entities))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { orchestrator })
}

/// Start the HTTP server
pub async fn serve(orchestrator: Arc<SyncOrchestrator>, port: u16) -> Result<()> {
    let app = router(orchestrator);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind to port {port}: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::config(format!("Server error: {e}")))?;

    Ok(())
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_entities(State(state): State<AppState>) -> impl IntoResponse {
    let entities: Vec<_> = state
        .orchestrator
        .catalog()
        .entities()
        .iter()
        .map(|e| json!({ "name": e.name, "kind": e.kind }))
        .collect();
    Json(json!({ "entities": entities }))
}

async fn trigger(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Response {
    match state.orchestrator.handle(&request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(e: &Error) -> Response {
    let status = if e.is_client_error() {
        warn!("Rejected trigger: {}", e);
        StatusCode::BAD_REQUEST
    } else {
        error!("Trigger failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
