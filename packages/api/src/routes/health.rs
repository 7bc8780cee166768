use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::{Router, routing::get};
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/db", get(db_health))
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}

#[derive(Serialize, Deserialize)]
pub struct DbHealthResponse {
    pub rtt: u128,
}

#[tracing::instrument(name = "GET /health", skip(state))]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        store: state.store.backend_name().to_string(),
    }))
}

#[tracing::instrument(name = "GET /health/db", skip(state))]
pub async fn db_health(State(state): State<AppState>) -> Result<Json<DbHealthResponse>, ApiError> {
    let db = state.db()?;
    let now = Instant::now();
    db.ping().await?;
    let elapsed = now.elapsed();
    Ok(Json(DbHealthResponse {
        rtt: elapsed.as_millis(),
    }))
}
