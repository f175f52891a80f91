//! Inbound payment-provider webhooks.
//!
//! Acknowledgment policy: signature failures are a client error (the
//! provider retries with a fresh signature), unknown orders and irrelevant
//! event types are acknowledged with 200 so the provider stops retrying,
//! and internal failures bubble as 5xx so delivery is reattempted.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::payments::{verify_webhook_signature, PaymentIntentStatus, WebhookEvent};
use crate::AppState;

const SIGNATURE_HEADER: &str = "Stripe-Signature";
const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ServiceError::WebhookVerificationFailed("missing signature header".to_string())
        })?;

    verify_webhook_signature(
        &state.config.stripe_webhook_secret,
        signature,
        &body,
        state.config.webhook_tolerance_secs,
        Utc::now(),
    )?;

    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|e| ServiceError::WebhookVerificationFailed(format!("invalid payload: {}", e)))?;

    info!(event_type = %event.event_type, "payment webhook received");
    if event.event_type != PAYMENT_SUCCEEDED {
        return Ok(StatusCode::OK);
    }

    let object = event.data.object;
    let Some(raw_order_id) = object.metadata.get("order_id") else {
        warn!(intent = %object.id, "no order_id in intent metadata");
        return Ok(StatusCode::OK);
    };
    let Ok(order_id) = Uuid::parse_str(raw_order_id) else {
        warn!(intent = %object.id, raw_order_id, "malformed order_id in intent metadata");
        return Ok(StatusCode::OK);
    };

    match state
        .services
        .reconciliation
        .reconcile_payment(order_id, PaymentIntentStatus::Succeeded)
        .await
    {
        Ok(outcome) => {
            info!(%order_id, ?outcome, "webhook reconciliation finished");
            Ok(StatusCode::OK)
        }
        // The order is gone; retrying will never help, so acknowledge.
        Err(ServiceError::NotFound(_)) => {
            warn!(%order_id, intent = %object.id, "webhook for unknown order");
            Ok(StatusCode::OK)
        }
        Err(err) => Err(err),
    }
}
