use crate::{error::ApiError, state::AppState};
use axum::{
    Router,
    routing::{get, post},
};
use matrix_commission::{Distributor, QualifyingPeriod};

pub mod get_commissions;
pub mod get_downline;
pub mod get_rank;
pub mod get_upline;
pub mod recalculate_rank;

/// Deepest downline a single request may expand
///
/// A full 5-wide matrix holds 5^5 = 3125 nodes at this depth, and the walk
/// costs a store round trip per node.
pub const MAX_DOWNLINE_DEPTH: u32 = 5;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{id}/commissions", get(get_commissions::get_commissions))
        .route("/{id}/upline", get(get_upline::get_upline))
        .route("/{id}/downline", get(get_downline::get_downline))
        .route("/{id}/rank", get(get_rank::get_rank))
        .route(
            "/{id}/rank/recalculate",
            post(recalculate_rank::recalculate_rank),
        )
}

pub(crate) async fn require_distributor(
    state: &AppState,
    distributor_id: &str,
) -> Result<Distributor, ApiError> {
    state
        .store
        .get_distributor(distributor_id)
        .await?
        .ok_or_else(|| crate::not_found!("distributor not found: {}", distributor_id))
}

/// Qualifying period ending now, for on-demand evaluations
pub(crate) fn current_period(state: &AppState) -> QualifyingPeriod {
    QualifyingPeriod::ending_at(
        chrono::Utc::now(),
        state.engine_config().qualifying_period_days,
    )
}
