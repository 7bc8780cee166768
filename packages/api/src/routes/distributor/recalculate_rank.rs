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
pub struct RecalculatedRankResponse {
    pub previous_rank: String,
    pub changed: bool,
    pub evaluation: RankEvaluation,
}

#[tracing::instrument(name = "POST /distributors/{id}/rank/recalculate", skip(state))]
pub async fn recalculate_rank(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecalculatedRankResponse>, ApiError> {
    let distributor = require_distributor(&state, &id).await?;
    let rules = state.calculator.load_rule_set().await?;
    let period = current_period(&state);

    let evaluation = state
        .rank_evaluator()
        .evaluate(&id, &rules, &period)
        .await?;

    let changed = evaluation.rank.id != distributor.rank;
    if changed {
        state
            .store
            .update_distributor_rank(&id, &evaluation.rank.id)
            .await?;
        tracing::info!(
            distributor_id = %id,
            from = %distributor.rank,
            to = %evaluation.rank.id,
            "Distributor rank updated"
        );
    }

    Ok(Json(RecalculatedRankResponse {
        previous_rank: distributor.rank,
        changed,
        evaluation,
    }))
}
