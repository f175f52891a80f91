//! Fulfillment workflow: the picklist document and the packing queues.
//!
//! A [`Picklist`] is the fully computed input the external document
//! renderer consumes; nothing here touches layout.

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;

use crate::entities::order::OrderStatus;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::money::quantize;

#[derive(Debug, Clone, Serialize)]
pub struct PicklistLine {
    pub product_name: String,
    pub quantity: i32,
    pub grind: Option<String>,
    pub weight_grams: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Fully computed picklist for one order.
#[derive(Debug, Clone, Serialize)]
pub struct Picklist {
    pub order_id: uuid::Uuid,
    pub reference: String,
    pub customer_name: String,
    pub email: String,
    pub ship_to: String,
    pub status: OrderStatus,
    pub lines: Vec<PicklistLine>,
    pub total_quantity: i32,
    pub total_weight_grams: i64,
    pub grand_total: Decimal,
}

impl Picklist {
    /// Assemble a picklist from an order and its item snapshots.
    pub fn build(order: &order::Model, items: &[order_item::Model]) -> Self {
        let mut total_quantity = 0;
        let mut total_weight_grams = 0;
        let mut grand_total = Decimal::ZERO;

        let lines = items
            .iter()
            .map(|item| {
                let line_total = item.line_total();
                total_quantity += item.quantity;
                total_weight_grams += item.total_weight_grams();
                grand_total += line_total;

                PicklistLine {
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    grind: item.grind.clone(),
                    weight_grams: item.weight_grams,
                    unit_price: item.unit_price,
                    line_total,
                }
            })
            .collect();

        Self {
            order_id: order.id,
            reference: order.reference(),
            customer_name: order.full_name.clone(),
            email: order.email.clone(),
            ship_to: format_address(order),
            status: order.status,
            lines,
            total_quantity,
            total_weight_grams,
            grand_total: quantize(grand_total),
        }
    }
}

/// Join address parts into a single shipping line.
fn format_address(order: &order::Model) -> String {
    let mut parts: Vec<String> = Vec::new();

    let street = match order.house_number.as_deref() {
        Some(number) if !number.is_empty() => format!("{} {}", order.street, number),
        _ => order.street.clone(),
    };
    if !street.is_empty() {
        parts.push(street);
    }

    let town = format!("{} {}", order.postal_code, order.city)
        .trim()
        .to_string();
    if !town.is_empty() {
        parts.push(town);
    }
    if !order.country.is_empty() {
        parts.push(order.country.clone());
    }

    parts.join(", ")
}

#[derive(Clone)]
pub struct FulfillmentService {
    db: Arc<DatabaseConnection>,
}

impl FulfillmentService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Paid orders awaiting packing, newest first.
    pub async fn packable_orders(&self) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// The last 20 fulfilled orders.
    pub async fn recently_fulfilled(&self) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Fulfilled))
            .order_by_desc(order::Column::CreatedAt)
            .limit(20)
            .all(&*self.db)
            .await?)
    }
}
