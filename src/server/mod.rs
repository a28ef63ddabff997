pub mod negotiation;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::manager::{RetrievalManager, RetrievalOutcome};
use crate::models::{GatewayConfig, RetrievalJob};
use crate::registry::VaultRegistry;

/// Shared application state for the Axum server.
pub struct AppState {
    pub registry: Arc<VaultRegistry>,
    pub manager: Arc<RetrievalManager>,
    pub config: Arc<GatewayConfig>,
    pub start_time: Instant,
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/dap/{*path}", get(negotiation::dap_request))
        .route("/api/vaults", get(list_vaults))
        .route("/api/vaults/{vault}/records", get(list_records))
        .route("/api/vaults/{vault}/inventory", post(request_inventory))
        .route("/api/jobs", get(list_jobs))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    vaults: usize,
    active_jobs: usize,
    version: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Health check");

    let response = HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        vaults: state.registry.vault_names().await.len(),
        active_jobs: state.manager.active_jobs().await.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

async fn list_vaults(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.vault_names().await)
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    UrlPath(vault): UrlPath<String>,
) -> impl IntoResponse {
    match state.registry.vault(&vault).await {
        Some(vault) => Json(vault.resource_ids().await).into_response(),
        None => negotiation::error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("No such vault: {}", vault),
        ),
    }
}

#[derive(Debug, Serialize)]
struct InventoryResponse {
    vault: String,
    estimate_seconds: i64,
}

/// Queue retrieval of a vault's inventory document. Responds 200 once the
/// inventory is in the cache, 202 while the retrieval is outstanding.
async fn request_inventory(
    State(state): State<Arc<AppState>>,
    UrlPath(vault_name): UrlPath<String>,
) -> impl IntoResponse {
    let vault = match state.registry.open_vault(&vault_name).await {
        Ok(vault) => vault,
        Err(e) => {
            tracing::error!("Failed to open vault '{}': {}", vault_name, e);
            return negotiation::error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                &e.to_string(),
            );
        }
    };

    match state
        .manager
        .initiate_inventory_retrieval(&vault_name, vault.inventory_cache_path())
        .await
    {
        Ok(RetrievalOutcome::Fetched) => (
            StatusCode::OK,
            Json(InventoryResponse {
                vault: vault_name,
                estimate_seconds: 0,
            }),
        )
            .into_response(),
        Ok(RetrievalOutcome::Refused) => negotiation::error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_unavailable",
            "The archival store refused to start an inventory job; retry later",
        ),
        Ok(RetrievalOutcome::Pending(estimate)) => (
            StatusCode::ACCEPTED,
            Json(InventoryResponse {
                vault: vault_name,
                estimate_seconds: estimate,
            }),
        )
            .into_response(),
        Err(e) => negotiation::error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            &e.to_string(),
        ),
    }
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<RetrievalJob>> {
    Json(state.manager.active_jobs().await)
}
