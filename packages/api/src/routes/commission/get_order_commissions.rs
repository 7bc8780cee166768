use crate::{error::ApiError, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
};
use matrix_commission::{CommissionRecord, CommissionRun};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCommissionsResponse {
    pub order_id: String,
    pub run: Option<CommissionRun>,
    pub total_amount: Decimal,
    pub records: Vec<CommissionRecord>,
}

#[tracing::instrument(name = "GET /commissions/orders/{order_id}", skip(state))]
pub async fn get_order_commissions(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderCommissionsResponse>, ApiError> {
    if state.store.get_order(&order_id).await?.is_none() {
        return Err(crate::not_found!("order not found: {}", order_id));
    }

    let run = state.store.get_commission_run(&order_id).await?;
    let records = state.store.commissions_for_order(&order_id).await?;

    Ok(Json(OrderCommissionsResponse {
        order_id,
        run,
        total_amount: records.iter().map(|r| r.amount).sum(),
        records,
    }))
}
