//! Midtrans payment notification endpoint.
//!
//! Midtrans retries a notification until it gets a 2xx, so outcomes that
//! retrying cannot change are acknowledged: duplicates, statuses that carry
//! no payment decision and transitions the order lifecycle refuses.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use crate::error::AppError;
use crate::services::checkout::{CheckoutError, NotificationOutcome};
use crate::services::midtrans::Notification;
use crate::services::CheckoutService;
use crate::state::AppState;

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
}

/// Receive a payment notification.
#[instrument(skip(state, notification), fields(order_id = %notification.order_id))]
pub async fn notification(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> Result<Json<Ack>, AppError> {
    let service = CheckoutService::new(state.pool(), state.midtrans());

    let status = match service.handle_notification(&notification).await {
        Ok(NotificationOutcome::Applied { .. }) => "ok",
        Ok(NotificationOutcome::Duplicate { .. }) => "duplicate",
        Ok(NotificationOutcome::Ignored) => "ignored",
        Err(CheckoutError::Transition(e)) => {
            tracing::warn!(
                error = %e,
                transaction_status = %notification.transaction_status,
                "Notification refused by order lifecycle, acknowledged"
            );
            "ignored"
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(Ack { status }))
}
