use std::sync::Arc;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use state::{AppState, State};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, decompression::RequestDecompressionLayer,
};

pub mod entity;
mod routes;

pub mod error;
pub mod notify;
pub mod state;
pub mod store;
pub mod telemetry;

pub use axum;
pub use matrix_commission;
pub use sea_orm;

pub fn construct_router(state: Arc<State>) -> Router {
    let router = Router::new()
        .route("/", get(service_info))
        .nest("/health", routes::health::routes())
        .nest("/commissions", routes::commission::routes())
        .nest("/distributors", routes::distributor::routes())
        .nest("/webhook", routes::webhook::routes())
        .with_state(state)
        .route("/version", get(|| async { env!("CARGO_PKG_VERSION") }))
        .layer(CorsLayer::permissive())
        .layer(
            ServiceBuilder::new()
                .layer(RequestDecompressionLayer::new())
                .layer(CompressionLayer::new()),
        );

    Router::new().nest("/api/v1", router)
}

#[tracing::instrument(name = "GET /", skip(state))]
async fn service_info(axum::extract::State(state): axum::extract::State<AppState>) -> Json<Value> {
    let config = state.engine_config();
    Json(json!({
        "service": "matrix-commission",
        "store": state.store.backend_name(),
        "downlineDepth": config.downline_depth,
        "qualifyingPeriodDays": config.qualifying_period_days,
        "webhooks": state.stripe_webhook_secret.is_some() && state.db.is_some(),
    }))
}
