//! Control-plane routes and server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use shunt_config::{RulesDocument, RulesStore};
use shunt_routing::RoutingTable;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ApiError;

/// Shared state behind the control-plane handlers
#[derive(Clone)]
pub struct AppState {
    table: Arc<RoutingTable>,
    store: Arc<Mutex<RulesStore>>,
}

impl AppState {
    /// Create state over the routing table and rules store
    pub fn new(table: Arc<RoutingTable>, store: Arc<Mutex<RulesStore>>) -> Self {
        Self { table, store }
    }
}

/// Build the control-plane router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rules", get(get_rules).post(post_rules))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and run the control-plane server until cancelled
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "control API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct UpdateResponse {
    message: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /rules
///
/// Returns the persisted document - the merge of everything accepted so
/// far, in the same shape POST accepts.
async fn get_rules(State(state): State<AppState>) -> Json<RulesDocument> {
    let store = state.store.lock().await;
    Json(store.document().clone())
}

/// POST /rules
///
/// Applies a desired document to the routing table, then merges it into
/// the persisted file. Stage-tagged errors report which half failed; a
/// persist failure leaves the routing update in place.
async fn post_rules(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<UpdateResponse>, ApiError> {
    let desired = RulesDocument::from_slice(&body).map_err(ApiError::Decode)?;

    state.table.update(&desired).await?;

    state
        .store
        .lock()
        .await
        .merge_and_save(&desired)
        .map_err(|e| {
            warn!(error = %e, "routing updated but persisting the merge failed");
            ApiError::Persist(e)
        })?;

    info!(
        rule_count = desired.rules.len(),
        "routing configuration updated"
    );
    Ok(Json(UpdateResponse {
        message: "routing configuration updated",
    }))
}
