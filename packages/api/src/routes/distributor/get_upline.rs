use crate::{error::ApiError, state::AppState};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use matrix_commission::{GenealogyWalker, UplineChain};
use serde::Deserialize;

const DEFAULT_UPLINE_LEVELS: u8 = 9;

#[derive(Debug, Deserialize)]
pub struct UplineQuery {
    pub levels: Option<u8>,
}

#[tracing::instrument(name = "GET /distributors/{id}/upline", skip(state))]
pub async fn get_upline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UplineQuery>,
) -> Result<Json<UplineChain>, ApiError> {
    let levels = query.levels.unwrap_or(DEFAULT_UPLINE_LEVELS);
    if levels == 0 {
        return Err(ApiError::bad_request("levels must be at least 1"));
    }

    let chain = GenealogyWalker::new(state.store.clone())
        .upline_chain(&id, levels)
        .await?;
    Ok(Json(chain))
}
