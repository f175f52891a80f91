use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::quantize;

/// Immutable snapshot of a product line inside an order.
///
/// Name, price, and weight are frozen at purchase time; later catalog
/// changes never reach back into an order item.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub unit_price: Decimal,
    pub quantity: i32,
    #[sea_orm(nullable)]
    pub grind: Option<String>,
    pub weight_grams: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_delete = "Restrict"
    )]
    Product,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Total price for the line, half-up at two decimals.
    pub fn line_total(&self) -> Decimal {
        quantize(self.unit_price * Decimal::from(self.quantity))
    }

    /// Snapshot weight of the whole line in grams.
    pub fn total_weight_grams(&self) -> i64 {
        i64::from(self.quantity) * i64::from(self.weight_grams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(unit_price: Decimal, quantity: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Ethiopia".into(),
            unit_price,
            quantity,
            grind: Some("whole".into()),
            weight_grams: 250,
        }
    }

    #[test]
    fn line_total_rounds_half_up() {
        assert_eq!(item(dec!(12.50), 3).line_total(), dec!(37.50));
        assert_eq!(item(dec!(2.2225), 2).line_total(), dec!(4.45));
    }

    #[test]
    fn line_weight_sums_grams() {
        assert_eq!(item(dec!(1.00), 4).total_weight_grams(), 1000);
    }
}
