//! Payment provider integration.
//!
//! The core talks to the provider through the [`PaymentProvider`] trait;
//! [`StripeGateway`] is the production implementation over the Stripe
//! PaymentIntents API. Both outbound calls carry a bounded timeout and a
//! timeout is reported as a retryable external failure, never a local
//! state change.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{instrument, warn};

use crate::errors::ServiceError;

/// Opaque payment handle returned by the provider.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
}

/// Provider-side status of a payment handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentIntentStatus {
    Succeeded,
    Pending,
    Failed,
}

impl PaymentIntentStatus {
    /// Map a provider status string onto the three states the core cares
    /// about. Anything in-flight counts as pending.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "succeeded" => Self::Succeeded,
            "canceled" | "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Metadata attached to a payment intent so the webhook can find its order.
#[derive(Debug, Clone)]
pub struct PaymentMetadata {
    pub order_id: String,
    pub email: String,
    pub description: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a payment intent sized in minor currency units (cents).
    async fn create_payment_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: PaymentMetadata,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Look up the provider-side status of an intent.
    async fn retrieve_status(&self, intent_id: &str) -> Result<PaymentIntentStatus, ServiceError>;
}

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe PaymentIntents gateway.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct StripeIntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    /// Point the gateway at a different API base (test servers).
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    fn map_transport_error(err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::ExternalServiceError("payment provider timed out".to_string())
        } else {
            ServiceError::ExternalServiceError(format!("payment provider unreachable: {}", err))
        }
    }

    async fn decode_error(response: reqwest::Response) -> ServiceError {
        let status = response.status();
        let message = response
            .json::<StripeErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| format!("provider returned {}", status));
        ServiceError::PaymentFailed(message)
    }
}

#[async_trait]
impl PaymentProvider for StripeGateway {
    #[instrument(skip(self, metadata))]
    async fn create_payment_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: PaymentMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        let params = [
            ("amount", amount_minor_units.to_string()),
            ("currency", currency.to_string()),
            ("metadata[order_id]", metadata.order_id),
            ("receipt_email", metadata.email),
            ("description", metadata.description),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let intent: StripeIntentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("malformed response: {}", e)))?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_status(&self, intent_id: &str) -> Result<PaymentIntentStatus, ServiceError> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let intent: StripeIntentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("malformed response: {}", e)))?;

        Ok(PaymentIntentStatus::from_provider(&intent.status))
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Inbound webhook event shape: `{type, data: {object: {...}}}`.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>`) against the
/// shared secret: HMAC-SHA256 over `"{t}.{payload}"`, plus a timestamp
/// tolerance window against replayed deliveries.
pub fn verify_webhook_signature(
    secret: &str,
    signature_header: &str,
    payload: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ServiceError::WebhookVerificationFailed("missing timestamp in signature header".into())
    })?;
    if candidates.is_empty() {
        return Err(ServiceError::WebhookVerificationFailed(
            "missing v1 signature in header".into(),
        ));
    }

    let age = now.timestamp() - timestamp;
    if age.abs() > tolerance_secs {
        return Err(ServiceError::WebhookVerificationFailed(format!(
            "timestamp outside tolerance ({}s)",
            age
        )));
    }

    let signed_payload = format!("{}.{}", timestamp, payload);
    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("hmac init: {}", e)))?;
        mac.update(signed_payload.as_bytes());
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    warn!("webhook signature mismatch");
    Err(ServiceError::WebhookVerificationFailed(
        "signature mismatch".into(),
    ))
}

/// Sign a payload the way the provider does. Used by tests and by local
/// webhook replay tooling.
pub fn sign_webhook_payload(secret: &str, timestamp: i64, payload: &str) -> String {
    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(
            PaymentIntentStatus::from_provider("succeeded"),
            PaymentIntentStatus::Succeeded
        );
        assert_eq!(
            PaymentIntentStatus::from_provider("requires_payment_method"),
            PaymentIntentStatus::Pending
        );
        assert_eq!(
            PaymentIntentStatus::from_provider("processing"),
            PaymentIntentStatus::Pending
        );
        assert_eq!(
            PaymentIntentStatus::from_provider("canceled"),
            PaymentIntentStatus::Failed
        );
    }

    #[test]
    fn signature_round_trips() {
        let now = Utc::now();
        let payload = r#"{"type":"payment_intent.succeeded"}"#;
        let header = sign_webhook_payload("whsec_test", now.timestamp(), payload);

        assert!(verify_webhook_signature("whsec_test", &header, payload, 300, now).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let now = Utc::now();
        let header = sign_webhook_payload("whsec_test", now.timestamp(), "{}");

        let err =
            verify_webhook_signature("whsec_test", &header, r#"{"evil":true}"#, 300, now)
                .unwrap_err();
        assert!(matches!(err, ServiceError::WebhookVerificationFailed(_)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let header = sign_webhook_payload("whsec_a", now.timestamp(), "{}");
        assert!(verify_webhook_signature("whsec_b", &header, "{}", 300, now).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let now = Utc::now();
        let header = sign_webhook_payload("whsec_test", now.timestamp() - 3600, "{}");
        let err = verify_webhook_signature("whsec_test", &header, "{}", 300, now).unwrap_err();
        assert!(matches!(err, ServiceError::WebhookVerificationFailed(_)));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let now = Utc::now();
        assert!(verify_webhook_signature("s", "garbage", "{}", 300, now).is_err());
        assert!(verify_webhook_signature("s", "t=notanumber,v1=aa", "{}", 300, now).is_err());
    }

    #[test]
    fn webhook_event_deserializes() {
        let raw = r#"{
            "type": "payment_intent.succeeded",
            "data": {
                "object": {
                    "id": "pi_123",
                    "status": "succeeded",
                    "metadata": {"order_id": "7e2c63ff-1c5a-4f8e-9f6a-0f1d2c3b4a59"}
                }
            }
        }"#;

        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.data.object.id, "pi_123");
        assert_eq!(
            event.data.object.metadata.get("order_id").unwrap(),
            "7e2c63ff-1c5a-4f8e-9f6a-0f1d2c3b4a59"
        );
    }
}
