//! HTTP routes

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use tower_http::compression::CompressionLayer;
use tracing::debug;

use crate::config::CorsConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware;
use crate::query::SnapshotQuery;
use crate::state::AppState;

/// Build the application router with all routes and middleware
pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(query_auctions))
        .route("/skyblock/auctions", get(query_auctions))
        .route("/information", get(information))
        .route("/health", get(health_check))
        .with_state(state)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

/// Query the current snapshot
async fn query_auctions(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<Value>>> {
    let authorized = params.get("key").is_some_and(|key| *key == state.api.api_key);
    state.counters.record(authorized);
    if !authorized {
        return Err(ApiError::Unauthorized);
    }

    let query = SnapshotQuery::from_params(&params, state.api.page_size)?;
    let records = state.store.load_all().await?;
    let total = records.len();

    // filtering and sorting the whole snapshot is CPU work
    let docs = tokio::task::spawn_blocking(move || query.execute(&records))
        .await
        .map_err(|e| ApiError::Internal(format!("Query task failed: {}", e)))??;

    debug!(snapshot = total, returned = docs.len(), "Answered snapshot query");
    Ok(Json(docs))
}

/// Ingestion status and request counters
async fn information(State(state): State<AppState>) -> Json<Value> {
    let status = state.status.snapshot().await;
    let last_updated_formatted = match status.seconds_since_update(Utc::now()) {
        Some(secs) => format!("{} seconds ago", secs),
        None => "never".to_string(),
    };
    let snapshot_records = state.store.load_all().await.map(|r| r.len()).ok();

    Json(json!({
        "status": status,
        "last_updated_formatted": last_updated_formatted,
        "snapshot_records": snapshot_records,
        "requests": state.counters.counts(),
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
