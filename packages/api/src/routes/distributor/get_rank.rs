use crate::{
    error::ApiError,
    routes::distributor::{current_period, require_distributor},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};
use matrix_commission::RankEvaluation;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankResponse {
    /// Rank stored on the distributor row
    pub current_rank: String,
    pub evaluation: RankEvaluation,
}

/// Evaluate without persisting
#[tracing::instrument(name = "GET /distributors/{id}/rank", skip(state))]
pub async fn get_rank(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RankResponse>, ApiError> {
    let distributor = require_distributor(&state, &id).await?;
    let rules = state.calculator.load_rule_set().await?;
    let period = current_period(&state);

    let evaluation = state
        .rank_evaluator()
        .evaluate(&id, &rules, &period)
        .await?;

    Ok(Json(RankResponse {
        current_rank: distributor.rank,
        evaluation,
    }))
}
