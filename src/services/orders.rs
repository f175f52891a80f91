//! Order lifecycle: transactional checkout, total recomputation, and the
//! status workflow.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::cart::{compute_summary, Cart};
use crate::entities::order::OrderStatus;
use crate::entities::{order, order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::{quantize, shipping_for_subtotal, to_minor_units};
use crate::services::notifications::NotificationService;
use crate::services::payments::{PaymentMetadata, PaymentProvider};

/// Contact and shipping details captured at checkout.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutDetails {
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub street: String,
    #[serde(default)]
    pub house_number: Option<String>,
    #[validate(length(min = 1, max = 80))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_country() -> String {
    "Germany".to_string()
}

/// Result of a successful checkout.
#[derive(Debug, Serialize)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    /// Cart keys whose product vanished or went inactive between cart and
    /// checkout; the order proceeded without them.
    pub skipped: Vec<String>,
    pub client_secret: Option<String>,
}

/// Order plus its line items.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn NotificationService>,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn NotificationService>,
        currency: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            payments,
            notifier,
            currency,
        }
    }

    /// Convert a cart into an order, all within one transaction:
    /// order row, item snapshots, server-side totals, and the payment
    /// intent sized to the total. Any failure past order creation rolls the
    /// whole checkout back, payment-handle acquisition included. The cart
    /// is cleared only on success; persisting the emptied session bag is
    /// the caller's job.
    #[instrument(skip(self, cart, details), fields(email = %details.email))]
    pub async fn create_order(
        &self,
        cart: &mut Cart,
        details: CheckoutDetails,
    ) -> Result<CheckoutOutcome, ServiceError> {
        details.validate()?;

        if cart.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        let summary = compute_summary(cart)?;

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(details.customer_id),
            full_name: Set(details.full_name),
            email: Set(details.email),
            phone_number: Set(details.phone_number),
            street: Set(details.street),
            house_number: Set(details.house_number),
            city: Set(details.city),
            postal_code: Set(details.postal_code),
            country: Set(details.country),
            status: Set(OrderStatus::New),
            payment_intent_id: Set(None),
            subtotal: Set(Decimal::ZERO),
            shipping: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            notes: Set(details.notes),
            fulfilled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        // Snapshot each line from the live catalog row; the cart-held price
        // is never trusted for the persisted item.
        let mut items = Vec::with_capacity(summary.items.len());
        let mut skipped = Vec::new();
        for line in &summary.items {
            let product = product::Entity::find()
                .filter(product::Column::Slug.eq(line.key.as_str()))
                .filter(product::Column::IsActive.eq(true))
                .one(&txn)
                .await?;

            let Some(product) = product else {
                warn!(key = %line.key, "cart line no longer available; skipping");
                skipped.push(line.key.clone());
                continue;
            };

            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                unit_price: Set(product.price),
                quantity: Set(line.quantity as i32),
                grind: Set(if line.grind.is_empty() {
                    None
                } else {
                    Some(line.grind.clone())
                }),
                weight_grams: Set(if line.weight_grams > 0 {
                    line.weight_grams
                } else {
                    product.weight_grams
                }),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        if items.is_empty() {
            return Err(ServiceError::ProductUnavailable(
                "no purchasable items left in cart".to_string(),
            ));
        }

        let order = recalc_totals_on(&txn, order, &items).await?;

        // Payment handle sized to the recomputed total, acquired inside the
        // critical path: a provider failure aborts the whole checkout.
        let amount = to_minor_units(order.total)?;
        let description = {
            let first = &items[0].product_name;
            if items.len() > 1 {
                format!("Roastery - {} +{} more", first, items.len() - 1)
            } else {
                format!("Roastery - {}", first)
            }
        };
        let intent = self
            .payments
            .create_payment_intent(
                amount,
                &self.currency,
                PaymentMetadata {
                    order_id: order_id.to_string(),
                    email: order.email.clone(),
                    description,
                },
            )
            .await?;

        let mut active: order::ActiveModel = order.into();
        active.payment_intent_id = Set(Some(intent.id.clone()));
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        txn.commit().await?;
        cart.clear();

        info!(order_id = %order_id, total = %order.total, intent = %intent.id, "order created");
        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;

        // Pending notice is best-effort; the order already exists.
        if let Err(err) = self.notifier.send_order_pending(&order, &items).await {
            error!(order_id = %order_id, "pending notice failed: {}", err);
        }

        Ok(CheckoutOutcome {
            order,
            items,
            skipped,
            client_secret: intent.client_secret,
        })
    }

    /// Recompute subtotal/shipping/total from the live order items and
    /// persist the three fields together. Safe to call any number of times.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn recalc_totals(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = self.require_order(order_id).await?;
        let items = order.find_related(order_item::Entity).all(&*self.db).await?;
        recalc_totals_on(&*self.db, order, &items).await
    }

    /// Transition an order through the status workflow. Rejections leave
    /// the order untouched.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        notes: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        let fulfilled_at = if new_status == OrderStatus::Fulfilled {
            order.fulfilled_at.or_else(|| Some(Utc::now()))
        } else {
            None
        };

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.fulfilled_at = Set(fulfilled_at);
        if notes.is_some() {
            active.notes = Set(notes);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(%old_status, %new_status, "order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        if new_status == OrderStatus::Fulfilled && old_status != OrderStatus::Fulfilled {
            self.event_sender.send_or_log(Event::OrderFulfilled(order_id)).await;
        }

        Ok(updated)
    }

    /// Packing shortcut: only `pending_fulfillment`/`paid` orders pass the
    /// transition table into `fulfilled`.
    pub async fn mark_fulfilled(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.update_status(order_id, OrderStatus::Fulfilled, None).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderDetail>, ServiceError> {
        let Some(order) = order::Entity::find_by_id(order_id).one(&*self.db).await? else {
            return Ok(None);
        };
        let items = order.find_related(order_item::Entity).all(&*self.db).await?;
        Ok(Some(OrderDetail { order, items }))
    }

    pub async fn require_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Newest-first listing, optionally filtered by status.
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
        status: Option<OrderStatus>,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::CustomerId.eq(Some(customer_id)))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }
}

/// Shared total recomputation: subtotal from line totals, the shipping
/// rule re-applied, all three fields persisted together.
pub(crate) async fn recalc_totals_on<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    items: &[order_item::Model],
) -> Result<order::Model, ServiceError> {
    let subtotal = quantize(items.iter().map(|item| item.line_total()).sum::<Decimal>());
    let shipping = quantize(shipping_for_subtotal(subtotal));
    let total = quantize(subtotal + shipping);

    let mut active: order::ActiveModel = order.into();
    active.subtotal = Set(subtotal);
    active.shipping = Set(shipping);
    active.total = Set(total);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}
