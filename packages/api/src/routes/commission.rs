use crate::{error::ApiError, notify::notify_in_background, state::AppState, telemetry};
use axum::{Router, routing::get};
use matrix_commission::{CalculationResult, CommissionError, OrderStatus};

pub mod calculate_order;
pub mod get_order_commissions;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/orders/{order_id}",
        get(get_order_commissions::get_order_commissions)
            .post(calculate_order::calculate_order),
    )
}

/// Run the calculator for a paid order and finish its bookkeeping
///
/// On success the order is marked `Completed` and recipients are notified in
/// the background. On failure the order keeps its status so the run can be
/// retried.
pub(crate) async fn process_order(
    state: &AppState,
    order_id: &str,
) -> Result<CalculationResult, ApiError> {
    let result = match state.calculator.calculate(order_id).await {
        Ok(result) => result,
        Err(e) => {
            if !matches!(e, CommissionError::NotFound { .. } | CommissionError::OrderNotPaid { .. }) {
                tracing::error!(order_id = %order_id, error = %e, "Commission calculation failed");
            }
            telemetry::record_failure();
            return Err(e.into());
        }
    };

    telemetry::record_calculation(&result);

    if let Err(e) = state
        .store
        .set_order_status(order_id, OrderStatus::Completed)
        .await
    {
        // The commissions are committed, only the order status lags behind
        tracing::warn!(order_id = %order_id, error = %e, "Failed to mark order completed");
    }

    notify_in_background(state.notifier.clone(), &result);
    Ok(result)
}
