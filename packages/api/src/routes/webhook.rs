use crate::{error::ApiError, routes::commission::process_order, state::AppState};
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use chrono::{DateTime, Utc};
use matrix_commission::{OrderStatus, PaymentStatus};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use stripe::{CheckoutSessionPaymentStatus, Event, EventObject, EventType, Webhook};

const ORDER_REFERENCE_PREFIX: &str = "order:";

pub fn routes() -> Router<AppState> {
    Router::new().route("/stripe", post(stripe_webhook))
}

/// Order id carried in a checkout session's `client_reference_id`
pub fn parse_order_reference(client_ref: &str) -> Option<&str> {
    client_ref
        .strip_prefix(ORDER_REFERENCE_PREFIX)
        .filter(|id| !id.is_empty())
}

#[tracing::instrument(name = "POST /webhook/stripe", skip(state, headers, payload))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let webhook_secret = state
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Webhook secret not configured"))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing stripe-signature header"))?;

    let payload_str = std::str::from_utf8(&payload)
        .map_err(|_| ApiError::bad_request("Invalid UTF-8 in payload"))?;

    let event = Webhook::construct_event(payload_str, signature, webhook_secret)?;

    let event_id = event.id.to_string();
    if is_event_processed(&state, &event_id).await? {
        tracing::info!(event_id = %event_id, "Duplicate event, skipping");
        return Ok(StatusCode::OK);
    }

    match handle_stripe_event(&state, &event).await {
        Ok(_) => {
            mark_event_processed(&state, &event_id, &event.type_.to_string()).await?;
            Ok(StatusCode::OK)
        }
        Err(e) => {
            // Left unmarked so Stripe delivers it again
            tracing::error!(event_id = %event_id, "Failed to process webhook");
            Err(e)
        }
    }
}

async fn is_event_processed(state: &AppState, event_id: &str) -> Result<bool, ApiError> {
    use crate::entity::stripe_event;

    let existing = stripe_event::Entity::find_by_id(event_id)
        .one(state.db()?)
        .await?;

    Ok(existing.is_some())
}

async fn mark_event_processed(
    state: &AppState,
    event_id: &str,
    event_type: &str,
) -> Result<(), ApiError> {
    use crate::entity::stripe_event;

    let new_event = stripe_event::ActiveModel {
        id: Set(event_id.to_string()),
        event_type: Set(event_type.to_string()),
        processed_at: Set(Utc::now().naive_utc()),
    };

    new_event.insert(state.db()?).await?;
    Ok(())
}

async fn handle_stripe_event(state: &AppState, event: &Event) -> Result<(), ApiError> {
    match event.type_ {
        EventType::CheckoutSessionCompleted => {
            if let EventObject::CheckoutSession(session) = &event.data.object {
                let paid_at = DateTime::from_timestamp(event.created, 0).unwrap_or_else(Utc::now);
                handle_checkout_completed(state, session, paid_at).await?;
            }
        }
        EventType::CheckoutSessionExpired => {
            if let EventObject::CheckoutSession(session) = &event.data.object {
                handle_checkout_expired(state, session).await?;
            }
        }
        _ => {
            tracing::debug!(event_type = %event.type_, "Unhandled event type");
        }
    }

    Ok(())
}

async fn handle_checkout_completed(
    state: &AppState,
    session: &stripe::CheckoutSession,
    paid_at: DateTime<Utc>,
) -> Result<(), ApiError> {
    let session_id = session.id.to_string();

    tracing::info!(
        session_id = %session_id,
        client_reference_id = ?session.client_reference_id,
        payment_status = ?session.payment_status,
        "Processing checkout.session.completed"
    );

    let Some(order_id) = session
        .client_reference_id
        .as_deref()
        .and_then(parse_order_reference)
    else {
        tracing::warn!(session_id = %session_id, "Checkout session does not reference an order");
        return Ok(());
    };

    if session.payment_status == CheckoutSessionPaymentStatus::Unpaid {
        tracing::info!(
            session_id = %session_id,
            order_id = %order_id,
            "Checkout completed without payment, waiting for settlement"
        );
        return Ok(());
    }

    let Some(order) = state.store.get_order(order_id).await? else {
        tracing::warn!(order_id = %order_id, "Order not found for checkout session");
        return Ok(());
    };

    if order.payment_status != PaymentStatus::Paid {
        state.store.mark_order_paid(order_id, paid_at).await?;
        tracing::info!(order_id = %order_id, "Order marked paid");
    }

    let result = process_order(state, order_id).await?;

    tracing::info!(
        order_id = %order_id,
        outcome = ?result.outcome,
        records = result.records.len(),
        "Commissions processed for checkout"
    );

    Ok(())
}

async fn handle_checkout_expired(
    state: &AppState,
    session: &stripe::CheckoutSession,
) -> Result<(), ApiError> {
    let Some(order_id) = session
        .client_reference_id
        .as_deref()
        .and_then(parse_order_reference)
    else {
        return Ok(());
    };

    if let Some(order) = state.store.get_order(order_id).await?
        && order.payment_status != PaymentStatus::Paid
    {
        state
            .store
            .set_order_status(order_id, OrderStatus::Cancelled)
            .await?;
        tracing::info!(
            order_id = %order_id,
            session_id = %session.id,
            "Order cancelled due to expired checkout"
        );
    }

    Ok(())
}
