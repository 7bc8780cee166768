use crate::{error::ApiError, routes::commission::process_order, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use matrix_commission::CalculationResult;

#[tracing::instrument(name = "POST /commissions/orders/{order_id}", skip(state))]
pub async fn calculate_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<(StatusCode, Json<CalculationResult>), ApiError> {
    let result = process_order(&state, &order_id).await?;

    let status = if result.is_already_processed() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(result)))
}
