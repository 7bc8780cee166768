use crate::{
    error::ApiError,
    routes::distributor::{MAX_DOWNLINE_DEPTH, current_period},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use matrix_commission::{DownlineNode, GenealogyWalker, QualifyingPeriod};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct DownlineQuery {
    pub depth: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlineResponse {
    pub depth: u32,
    pub period: QualifyingPeriod,
    pub node_count: usize,
    pub tree: DownlineNode,
}

#[tracing::instrument(name = "GET /distributors/{id}/downline", skip(state))]
pub async fn get_downline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownlineQuery>,
) -> Result<Json<DownlineResponse>, ApiError> {
    let depth = match query.depth {
        Some(depth) if depth > MAX_DOWNLINE_DEPTH => {
            return Err(crate::bad_request!("depth must not exceed {}", MAX_DOWNLINE_DEPTH));
        }
        Some(depth) => depth,
        None => state.engine_config().downline_depth.min(MAX_DOWNLINE_DEPTH),
    };

    let period = current_period(&state);
    let tree = GenealogyWalker::new(state.store.clone())
        .downline_tree(&id, depth, &period)
        .await?;

    Ok(Json(DownlineResponse {
        depth,
        period,
        node_count: tree.node_count(),
        tree,
    }))
}
