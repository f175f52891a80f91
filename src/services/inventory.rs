//! Stock keeping: flat counters plus the FIFO batch ledger.
//!
//! All mutation methods take the caller's connection so they can run inside
//! the reconciliation transaction; the batch writes and the order-status
//! write commit or roll back together.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::{product, product_batch};
use crate::errors::ServiceError;

/// What a single sale consumption did to a product's stock.
#[derive(Debug, Clone)]
pub struct StockConsumption {
    pub product_id: Uuid,
    pub used_batches: bool,
    pub grams_requested: i64,
    pub grams_consumed: i64,
    pub old_stock: i32,
    pub new_stock: i32,
}

#[derive(Clone, Default)]
pub struct InventoryService;

impl InventoryService {
    pub fn new() -> Self {
        Self
    }

    /// Consume grams from a product's batches, oldest received first, ties
    /// broken by id for determinism. Never takes a batch below zero.
    ///
    /// Returns the grams actually consumed, which may fall short of the
    /// request when the ledger is thin; depletion is best-effort and the
    /// sale is never blocked on it.
    #[instrument(skip(self, conn))]
    pub async fn consume_grams_fifo<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        grams_needed: i64,
    ) -> Result<i64, ServiceError> {
        if grams_needed <= 0 {
            return Ok(0);
        }

        let batches = product_batch::Entity::find()
            .filter(product_batch::Column::ProductId.eq(product_id))
            .filter(product_batch::Column::RemainingGrams.gt(0))
            .order_by_asc(product_batch::Column::ReceivedAt)
            .order_by_asc(product_batch::Column::Id)
            .all(conn)
            .await?;

        let mut consumed: i64 = 0;
        for batch in batches {
            if consumed >= grams_needed {
                break;
            }
            let take = i64::from(batch.remaining_grams).min(grams_needed - consumed);
            let remaining = batch.remaining_grams - take as i32;

            let mut active: product_batch::ActiveModel = batch.into();
            active.remaining_grams = Set(remaining);
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;

            consumed += take;
        }

        debug!(%product_id, grams_needed, consumed, "fifo consumption");
        Ok(consumed)
    }

    /// Derived stock projection: `floor(Σ remaining_grams / weight_grams)`.
    pub async fn recompute_stock_units<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &product::Model,
    ) -> Result<i32, ServiceError> {
        if product.weight_grams <= 0 {
            return Ok(0);
        }

        let batches = product_batch::Entity::find()
            .filter(product_batch::Column::ProductId.eq(product.id))
            .all(conn)
            .await?;

        let total_grams: i64 = batches
            .iter()
            .map(|b| i64::from(b.remaining_grams.max(0)))
            .sum();

        let units = total_grams / i64::from(product.weight_grams);
        Ok(units.min(i64::from(i32::MAX)) as i32)
    }

    /// Apply the stock side of a sale for one order line.
    ///
    /// Products with a batch ledger consume grams FIFO and then refresh the
    /// derived stock projection; everything else decrements the flat
    /// counter, floored at zero.
    #[instrument(skip(self, conn, product), fields(product_id = %product.id))]
    pub async fn consume_for_sale<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: product::Model,
        quantity: i32,
    ) -> Result<StockConsumption, ServiceError> {
        let old_stock = product.stock;
        let has_batches = product_batch::Entity::find()
            .filter(product_batch::Column::ProductId.eq(product.id))
            .count(conn)
            .await?
            > 0;

        let (grams_requested, grams_consumed, new_stock) = if has_batches {
            let grams_requested = i64::from(quantity) * i64::from(product.weight_grams);
            let grams_consumed = self
                .consume_grams_fifo(conn, product.id, grams_requested)
                .await?;
            let new_stock = self.recompute_stock_units(conn, &product).await?;
            (grams_requested, grams_consumed, new_stock)
        } else {
            (0, 0, (product.stock - quantity).max(0))
        };

        let product_id = product.id;
        if new_stock != old_stock {
            let mut active: product::ActiveModel = product.into();
            active.stock = Set(new_stock);
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;
        }

        Ok(StockConsumption {
            product_id,
            used_batches: has_batches,
            grams_requested,
            grams_consumed,
            old_stock,
            new_stock,
        })
    }
}
