use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coffee product with provenance and merchandising details.
///
/// `price` is always derived from `cost_price` and `markup_percent` via
/// `money::compute_sale_price`, invoked explicitly wherever a product is
/// saved; it is never accepted from input directly.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub sku: String,
    /// URL-stable identifier; also the cart's product key.
    #[sea_orm(unique)]
    pub slug: String,
    pub name: String,
    pub origin: String,
    pub roast_level: RoastLevel,
    #[sea_orm(nullable)]
    pub tasting_notes: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub cost_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((7, 2)))")]
    pub markup_percent: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,
    pub weight_grams: i32,
    /// Comma-separated list of permitted grind keys.
    pub available_grinds: String,
    pub stock: i32,
    pub is_active: bool,
    #[sea_orm(nullable)]
    pub image_url: Option<String>,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_batch::Entity")]
    Batches,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::product_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batches.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the product can be purchased right now.
    pub fn is_in_stock(&self) -> bool {
        self.is_active && self.stock > 0
    }

    /// Permitted grind keys for validation and UI assistance.
    pub fn available_grind_list(&self) -> Vec<&str> {
        self.available_grinds
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum RoastLevel {
    #[sea_orm(string_value = "light")]
    Light,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "dark")]
    Dark,
}
