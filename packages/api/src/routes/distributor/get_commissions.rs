use crate::{error::ApiError, routes::distributor::require_distributor, state::AppState};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use matrix_commission::{CommissionRecord, CommissionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CommissionsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributorCommissionsResponse {
    pub distributor_id: String,
    pub status: Option<CommissionStatus>,
    pub total_amount: Decimal,
    pub records: Vec<CommissionRecord>,
}

#[tracing::instrument(name = "GET /distributors/{id}/commissions", skip(state))]
pub async fn get_commissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CommissionsQuery>,
) -> Result<Json<DistributorCommissionsResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<CommissionStatus>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    require_distributor(&state, &id).await?;
    let records = state.store.commissions_for_recipient(&id, status).await?;

    Ok(Json(DistributorCommissionsResponse {
        distributor_id: id,
        status,
        total_amount: records.iter().map(|r| r.amount).sum(),
        records,
    }))
}
