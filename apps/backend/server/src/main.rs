#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Context;
use axum::{Router, routing::get};
use matrix_commission_api::{
    construct_router,
    state::{State, connect_database},
    store::{StoreConfig, create_store},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

mod config;
mod metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    metrics::init_telemetry()?;

    tracing::info!("Starting Matrix Commission API Service");

    let config = config::Config::from_env()?;
    tracing::info!(
        backend = ?config.backend,
        downline_depth = config.engine.downline_depth,
        qualifying_period_days = config.engine.qualifying_period_days,
        "Loaded configuration"
    );

    let db = match &config.database_url {
        Some(url) => Some(Arc::new(
            connect_database(url, config.sqlx_logging)
                .await
                .context("Failed to connect to database")?,
        )),
        None => None,
    };

    let mut store_config = StoreConfig::default().with_rule_set(config.rule_set.clone());
    if let Some(db) = &db {
        store_config = store_config.with_db(db.clone());
    }
    let store = create_store(config.backend.clone(), store_config)?;

    let mut state = State::new(store, config.engine.clone())
        .with_stripe_webhook_secret(config.stripe_webhook_secret.clone());
    if let Some(db) = db {
        state = state.with_database(db);
    }

    if state.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, Stripe webhooks will be rejected");
    }

    let app = Router::new()
        .merge(construct_router(Arc::new(state)))
        .route("/metrics", get(metrics::handler))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
