use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Customer checkout capturing payment and fulfillment lifecycle.
///
/// `total == subtotal + shipping` always; all three are recomputed from the
/// owned order items and never written from input.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(nullable)]
    pub customer_id: Option<Uuid>,

    pub full_name: String,
    pub email: String,
    #[sea_orm(nullable)]
    pub phone_number: Option<String>,

    pub street: String,
    #[sea_orm(nullable)]
    pub house_number: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,

    pub status: OrderStatus,
    /// Opaque handle from the payment provider (PaymentIntent id).
    #[sea_orm(nullable)]
    pub payment_intent_id: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub shipping: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total: Decimal,

    #[sea_orm(nullable)]
    pub notes: Option<String>,
    #[sea_orm(nullable)]
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Human-friendly reference used in receipts and picklists.
    pub fn reference(&self) -> String {
        format!("ORD-{}", self.id.simple().to_string()[..8].to_uppercase())
    }
}

/// Order lifecycle states. Transitions only move forward; `cancelled` and
/// `refunded` are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "pending_fulfillment")]
    PendingFulfillment,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "fulfilled")]
    Fulfilled,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    /// Whether the order has been paid for (paid or any later state).
    pub fn is_paid(self) -> bool {
        matches!(self, Self::Paid | Self::Fulfilled | Self::Refunded)
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    /// Orders in these states may be picked and packed.
    pub fn is_packable(self) -> bool {
        matches!(self, Self::PendingFulfillment | Self::Paid)
    }

    /// The forward-transition table. A same-state transition is always a
    /// permitted no-op.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self == next {
            return true;
        }
        match (self, next) {
            (Self::New, Self::PendingFulfillment) => true,
            (Self::New, Self::Paid) => true,
            (Self::New, Self::Cancelled) => true,

            (Self::PendingFulfillment, Self::Paid) => true,
            (Self::PendingFulfillment, Self::Fulfilled) => true,
            (Self::PendingFulfillment, Self::Cancelled) => true,

            (Self::Paid, Self::Fulfilled) => true,
            (Self::Paid, Self::Refunded) => true,
            (Self::Paid, Self::Cancelled) => true,

            (Self::Fulfilled, Self::Refunded) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn same_state_is_always_permitted() {
        for status in [
            OrderStatus::New,
            OrderStatus::PendingFulfillment,
            OrderStatus::Paid,
            OrderStatus::Fulfilled,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn terminal_states_admit_nothing_else() {
        for terminal in [OrderStatus::Cancelled, OrderStatus::Refunded] {
            for next in [
                OrderStatus::New,
                OrderStatus::PendingFulfillment,
                OrderStatus::Paid,
                OrderStatus::Fulfilled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn backward_transitions_are_rejected() {
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::New));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::PendingFulfillment));
        assert!(!OrderStatus::Fulfilled.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Fulfilled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn fulfilled_can_only_be_refunded() {
        assert!(OrderStatus::Fulfilled.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Fulfilled.can_transition_to(OrderStatus::New));
    }

    #[test]
    fn paid_predicate_covers_later_states() {
        assert!(!OrderStatus::New.is_paid());
        assert!(!OrderStatus::PendingFulfillment.is_paid());
        assert!(OrderStatus::Paid.is_paid());
        assert!(OrderStatus::Fulfilled.is_paid());
        assert!(OrderStatus::Refunded.is_paid());
        assert!(!OrderStatus::Cancelled.is_paid());
    }

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(OrderStatus::PendingFulfillment.to_string(), "pending_fulfillment");
        assert_eq!(
            OrderStatus::from_str("pending_fulfillment").unwrap(),
            OrderStatus::PendingFulfillment
        );
        assert!(OrderStatus::from_str("shipped").is_err());
    }
}
