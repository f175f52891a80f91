//! Payment reconciliation: applying an external "payment succeeded" signal
//! to local order and inventory state exactly once.
//!
//! Both delivery paths land here — the provider webhook and the fallback
//! triggered by the confirmation page — and both may arrive concurrently
//! for the same order. The order row is locked for the whole critical
//! section (status check, stock decrement, status write) so the second
//! attempt observes `AlreadyReconciled` instead of double-decrementing.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, ModelTrait,
    QuerySelect, TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::entities::{order, order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory::{InventoryService, StockConsumption};
use crate::services::notifications::{send_order_paid_notifications, NotificationService};
use crate::services::payments::PaymentIntentStatus;

/// Outcome of one reconciliation attempt. The non-`Reconciled` variants
/// are expected results of retried or premature signals, not errors; the
/// webhook handler acknowledges them so the provider stops redelivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Stock decremented, order marked paid, notifications dispatched.
    Reconciled,
    /// The order was already paid (or further along); nothing changed.
    AlreadyReconciled,
    /// The external signal was not a success; nothing changed.
    NotYetSucceeded,
}

#[derive(Clone)]
pub struct PaymentReconciliationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
    notifier: Arc<dyn NotificationService>,
    internal_recipients: Vec<String>,
}

impl PaymentReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        notifier: Arc<dyn NotificationService>,
        internal_recipients: Vec<String>,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory: InventoryService::new(),
            notifier,
            internal_recipients,
        }
    }

    /// Consume a payment signal for an order at most once.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn reconcile_payment(
        &self,
        order_id: Uuid,
        external_status: PaymentIntentStatus,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        // Row lock for the whole critical section. sea-query renders
        // FOR UPDATE, which SQLite rejects; its single-writer model already
        // serializes concurrent attempts there.
        let mut query = order::Entity::find_by_id(order_id);
        if txn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let order = query
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status.is_paid() {
            txn.commit().await?;
            info!("duplicate payment signal; already reconciled");
            return Ok(ReconciliationOutcome::AlreadyReconciled);
        }

        if external_status != PaymentIntentStatus::Succeeded {
            txn.commit().await?;
            return Ok(ReconciliationOutcome::NotYetSucceeded);
        }

        let items = order.find_related(order_item::Entity).all(&txn).await?;

        let mut consumptions: Vec<StockConsumption> = Vec::with_capacity(items.len());
        for item in &items {
            // A missing product row is tolerated like the original did:
            // the sale already happened, bookkeeping must not block it.
            let Some(product) = product::Entity::find_by_id(item.product_id).one(&txn).await?
            else {
                warn!(product_id = %item.product_id, "order item references missing product");
                continue;
            };
            let consumption = self
                .inventory
                .consume_for_sale(&txn, product, item.quantity)
                .await?;
            consumptions.push(consumption);
        }

        // The guard above makes this transition valid by construction; a
        // refusal here means the lifecycle table and the paid-predicate
        // disagree, which is a bug worth failing loudly over.
        let old_status = order.status;
        if !old_status.can_transition_to(OrderStatus::Paid) {
            error!(%old_status, "no valid transition to paid during reconciliation");
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status.to_string(),
                to: OrderStatus::Paid.to_string(),
            });
        }

        let mut active: order::ActiveModel = order.into();
        active.status = sea_orm::Set(OrderStatus::Paid);
        active.updated_at = sea_orm::Set(chrono::Utc::now());
        let order = active.update(&txn).await?;

        txn.commit().await?;
        info!("order reconciled to paid; stock adjusted");

        self.event_sender.send_or_log(Event::OrderPaid(order_id)).await;
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Paid.to_string(),
            })
            .await;
        for consumption in &consumptions {
            if consumption.used_batches {
                self.event_sender
                    .send_or_log(Event::InventoryConsumed {
                        product_id: consumption.product_id,
                        grams_requested: consumption.grams_requested,
                        grams_consumed: consumption.grams_consumed,
                    })
                    .await;
            }
            if consumption.new_stock != consumption.old_stock {
                self.event_sender
                    .send_or_log(Event::StockAdjusted {
                        product_id: consumption.product_id,
                        old_stock: consumption.old_stock,
                        new_stock: consumption.new_stock,
                    })
                    .await;
            }
        }

        // Outside the transaction on purpose: a failed notice is logged
        // and discarded, never unwinding the committed payment state.
        send_order_paid_notifications(
            self.notifier.as_ref(),
            &order,
            &items,
            &self.internal_recipients,
        )
        .await;

        Ok(ReconciliationOutcome::Reconciled)
    }
}
