//! Catalog management.
//!
//! The stored sale price is a pure function of cost and markup; every save
//! path recomputes it through `money::compute_sale_price` at the call site,
//! so there is no hidden persistence hook to reason about.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{product, product_batch};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::compute_sale_price;
use crate::services::inventory::InventoryService;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 30))]
    pub sku: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub roast_level: Option<product::RoastLevel>,
    #[serde(default)]
    pub tasting_notes: Option<String>,
    pub cost_price: Decimal,
    pub markup_percent: Decimal,
    pub weight_grams: i32,
    #[serde(default)]
    pub available_grinds: Option<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub origin: Option<String>,
    pub roast_level: Option<product::RoastLevel>,
    pub tasting_notes: Option<String>,
    pub cost_price: Option<Decimal>,
    pub markup_percent: Option<Decimal>,
    pub weight_grams: Option<i32>,
    pub available_grinds: Option<String>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReceiveBatchInput {
    #[validate(range(min = 1))]
    pub quantity_grams: i32,
    /// Unset or zero initializes from `quantity_grams`.
    #[serde(default)]
    pub remaining_grams: Option<i32>,
    pub unit_cost_per_kg: Decimal,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db,
            event_sender,
            inventory: InventoryService::new(),
        }
    }

    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let slug = slugify(&format!("{}-{}", input.name, input.weight_grams));
        let price = compute_sale_price(input.cost_price, input.markup_percent);

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(input.sku),
            slug: Set(slug),
            name: Set(input.name),
            origin: Set(input.origin.unwrap_or_else(|| "Rwanda".to_string())),
            roast_level: Set(input.roast_level.unwrap_or(product::RoastLevel::Medium)),
            tasting_notes: Set(input.tasting_notes),
            cost_price: Set(input.cost_price),
            markup_percent: Set(input.markup_percent),
            price: Set(price),
            weight_grams: Set(input.weight_grams),
            available_grinds: Set(input
                .available_grinds
                .unwrap_or_else(|| "whole".to_string())),
            stock: Set(input.stock.max(0)),
            is_active: Set(input.is_active),
            image_url: Set(input.image_url),
            description: Set(input.description),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %model.id, slug = %model.slug, "product created");
        Ok(model)
    }

    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let existing = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let cost_price = input.cost_price.unwrap_or(existing.cost_price);
        let markup_percent = input.markup_percent.unwrap_or(existing.markup_percent);

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(origin) = input.origin {
            active.origin = Set(origin);
        }
        if let Some(roast_level) = input.roast_level {
            active.roast_level = Set(roast_level);
        }
        if input.tasting_notes.is_some() {
            active.tasting_notes = Set(input.tasting_notes);
        }
        if let Some(weight_grams) = input.weight_grams {
            active.weight_grams = Set(weight_grams);
        }
        if let Some(grinds) = input.available_grinds {
            active.available_grinds = Set(grinds);
        }
        if let Some(stock) = input.stock {
            active.stock = Set(stock.max(0));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if input.image_url.is_some() {
            active.image_url = Set(input.image_url);
        }
        if input.description.is_some() {
            active.description = Set(input.description);
        }

        // price tracks cost + markup on every save
        active.cost_price = Set(cost_price);
        active.markup_percent = Set(markup_percent);
        active.price = Set(compute_sale_price(cost_price, markup_percent));
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?)
    }

    /// Active product by cart key, the checkout-time resolution path.
    pub async fn get_active_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?)
    }

    pub async fn list_active(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    /// Record an inventory receipt and refresh the derived stock projection.
    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn receive_batch(
        &self,
        product_id: Uuid,
        input: ReceiveBatchInput,
    ) -> Result<product_batch::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let product = product::Entity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let now = Utc::now();
        let remaining = match input.remaining_grams {
            Some(grams) if grams > 0 => grams.min(input.quantity_grams),
            _ => input.quantity_grams,
        };

        let batch = product_batch::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            received_at: Set(input.received_at.unwrap_or(now)),
            quantity_grams: Set(input.quantity_grams),
            remaining_grams: Set(remaining),
            unit_cost_per_kg: Set(input.unit_cost_per_kg),
            note: Set(input.note),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let old_stock = product.stock;
        let new_stock = self.inventory.recompute_stock_units(&txn, &product).await?;
        if new_stock != old_stock {
            let mut active: product::ActiveModel = product.into();
            active.stock = Set(new_stock);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductBatchReceived {
                product_id,
                batch_id: batch.id,
            })
            .await;
        if new_stock != old_stock {
            self.event_sender
                .send_or_log(Event::StockAdjusted {
                    product_id,
                    old_stock,
                    new_stock,
                })
                .await;
        }

        info!(batch_id = %batch.id, remaining, "batch received");
        Ok(batch)
    }

    /// Batches for a product in FIFO consumption order.
    pub async fn list_batches(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<product_batch::Model>, ServiceError> {
        Ok(product_batch::Entity::find()
            .filter(product_batch::Column::ProductId.eq(product_id))
            .order_by_asc(product_batch::Column::ReceivedAt)
            .order_by_asc(product_batch::Column::Id)
            .all(&*self.db)
            .await?)
    }
}

/// URL-stable slug: lowercase alphanumerics joined by single dashes.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_dash = true;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basics() {
        assert_eq!(slugify("Yirgacheffe Natural-250"), "yirgacheffe-natural-250");
        assert_eq!(slugify("  Huehuetenango!  "), "huehuetenango");
        assert_eq!(slugify("Äthiopien 500"), "thiopien-500");
    }
}
