//! Outbound order notifications.
//!
//! Every dispatch is fire-and-forget from the core's perspective: the
//! reconciliation and checkout paths log a failed send and move on, so a
//! broken mail relay can never roll back a committed order.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::entities::{order, order_item};
use crate::errors::ServiceError;

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Order received, awaiting payment.
    async fn send_order_pending(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError>;

    /// Payment confirmed, addressed to the customer.
    async fn send_order_paid_customer(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError>;

    /// Payment confirmed, addressed to internal recipients.
    async fn send_order_paid_internal(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
        recipients: &[String],
    ) -> Result<(), ServiceError>;
}

/// Payload posted to the transactional-mail relay.
#[derive(Debug, Serialize)]
struct OrderNotice<'a> {
    kind: &'a str,
    order_id: String,
    reference: String,
    to: Vec<String>,
    customer_name: &'a str,
    total: Decimal,
    lines: Vec<NoticeLine<'a>>,
}

#[derive(Debug, Serialize)]
struct NoticeLine<'a> {
    name: &'a str,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

impl<'a> OrderNotice<'a> {
    fn new(
        kind: &'a str,
        order: &'a order::Model,
        items: &'a [order_item::Model],
        to: Vec<String>,
    ) -> Self {
        Self {
            kind,
            order_id: order.id.to_string(),
            reference: order.reference(),
            to,
            customer_name: &order.full_name,
            total: order.total,
            lines: items
                .iter()
                .map(|item| NoticeLine {
                    name: &item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total(),
                })
                .collect(),
        }
    }
}

/// Posts order notices to a mail relay endpoint with a small retry.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
}

impl HttpNotifier {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            endpoint,
            max_retries: 3,
        }
    }

    #[instrument(skip(self, notice), fields(kind = notice.kind, order_id = %notice.order_id))]
    async fn post_notice(&self, notice: &OrderNotice<'_>) -> Result<(), ServiceError> {
        for attempt in 1..=self.max_retries {
            match self.client.post(&self.endpoint).json(notice).send().await {
                Ok(response) if response.status().is_success() => {
                    info!("notification delivered");
                    return Ok(());
                }
                Ok(response) => warn!(
                    "notification rejected with status {} (attempt {}/{})",
                    response.status(),
                    attempt,
                    self.max_retries
                ),
                Err(err) => warn!(
                    "notification delivery error: {} (attempt {}/{})",
                    err, attempt, self.max_retries
                ),
            }

            if attempt < self.max_retries {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt - 1))).await;
            }
        }

        Err(ServiceError::ExternalServiceError(format!(
            "notification delivery failed after {} attempts",
            self.max_retries
        )))
    }
}

#[async_trait]
impl NotificationService for HttpNotifier {
    async fn send_order_pending(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        self.post_notice(&OrderNotice::new(
            "order_pending",
            order,
            items,
            vec![order.email.clone()],
        ))
        .await
    }

    async fn send_order_paid_customer(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        self.post_notice(&OrderNotice::new(
            "order_paid",
            order,
            items,
            vec![order.email.clone()],
        ))
        .await
    }

    async fn send_order_paid_internal(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
        recipients: &[String],
    ) -> Result<(), ServiceError> {
        if recipients.is_empty() {
            return Ok(());
        }
        self.post_notice(&OrderNotice::new(
            "order_paid_internal",
            order,
            items,
            recipients.to_vec(),
        ))
        .await
    }
}

/// Logs notices instead of delivering them. Default when no relay endpoint
/// is configured, and the workhorse in tests.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationService for LogNotifier {
    async fn send_order_pending(
        &self,
        order: &order::Model,
        _items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        info!(order_id = %order.id, "order pending notice (log only)");
        Ok(())
    }

    async fn send_order_paid_customer(
        &self,
        order: &order::Model,
        _items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        info!(order_id = %order.id, "order paid customer notice (log only)");
        Ok(())
    }

    async fn send_order_paid_internal(
        &self,
        order: &order::Model,
        _items: &[order_item::Model],
        recipients: &[String],
    ) -> Result<(), ServiceError> {
        info!(order_id = %order.id, ?recipients, "order paid internal notice (log only)");
        Ok(())
    }
}

/// Customer confirmation plus internal alert for a paid order.
///
/// Each send's failure is logged and explicitly discarded; one failing leg
/// never suppresses the other, and neither reaches the caller.
pub async fn send_order_paid_notifications(
    notifier: &dyn NotificationService,
    order: &order::Model,
    items: &[order_item::Model],
    internal_recipients: &[String],
) {
    if let Err(err) = notifier.send_order_paid_customer(order, items).await {
        error!(order_id = %order.id, "customer paid notice failed: {}", err);
    }

    if internal_recipients.is_empty() {
        info!(order_id = %order.id, "no internal recipients configured; skipping internal notice");
        return;
    }

    if let Err(err) = notifier
        .send_order_paid_internal(order, items, internal_recipients)
        .await
    {
        error!(order_id = %order.id, "internal paid notice failed: {}", err);
    }
}
