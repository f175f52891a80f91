//! Reconciliation properties: at-most-once stock decrement under repeated
//! delivery, FIFO batch depletion, and isolation of notification failures.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

use common::{
    cart_for, checkout_details, seed_batch, seed_order, seed_order_item, seed_product,
    CountingNotifier, TestHarness,
};
use roastery_api::entities::order::OrderStatus;
use roastery_api::entities::{product, product_batch};
use roastery_api::errors::ServiceError;
use roastery_api::services::payments::PaymentIntentStatus;
use roastery_api::services::reconciliation::ReconciliationOutcome;

async fn stock_of(harness: &TestHarness, product_id: uuid::Uuid) -> i32 {
    product::Entity::find_by_id(product_id)
        .one(&*harness.db)
        .await
        .unwrap()
        .unwrap()
        .stock
}

#[tokio::test]
async fn repeated_success_signals_decrement_stock_exactly_once() {
    let harness = TestHarness::new().await;
    let ethiopia = seed_product(&harness.db, "ethiopia-250", dec!(12.50), 5, 250).await;

    let mut cart = cart_for(&[(&ethiopia, 2)]);
    let outcome = harness
        .orders
        .create_order(&mut cart, checkout_details())
        .await
        .unwrap();
    let order_id = outcome.order.id;

    // first delivery wins
    let first = harness
        .reconciliation
        .reconcile_payment(order_id, PaymentIntentStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(first, ReconciliationOutcome::Reconciled);
    assert_eq!(stock_of(&harness, ethiopia.id).await, 3);

    let order = harness.orders.require_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(harness.notifier.paid_customer_count(), 1);
    assert_eq!(harness.notifier.paid_internal_count(), 1);

    // every retry is a silent no-op
    for _ in 0..3 {
        let again = harness
            .reconciliation
            .reconcile_payment(order_id, PaymentIntentStatus::Succeeded)
            .await
            .unwrap();
        assert_eq!(again, ReconciliationOutcome::AlreadyReconciled);
    }
    assert_eq!(stock_of(&harness, ethiopia.id).await, 3);
    assert_eq!(harness.notifier.paid_customer_count(), 1);
    assert_eq!(harness.notifier.paid_internal_count(), 1);
}

#[tokio::test]
async fn premature_signals_change_nothing() {
    let harness = TestHarness::new().await;
    let ethiopia = seed_product(&harness.db, "ethiopia-250", dec!(12.50), 5, 250).await;

    let mut cart = cart_for(&[(&ethiopia, 1)]);
    let outcome = harness
        .orders
        .create_order(&mut cart, checkout_details())
        .await
        .unwrap();
    let order_id = outcome.order.id;

    for status in [PaymentIntentStatus::Pending, PaymentIntentStatus::Failed] {
        let result = harness
            .reconciliation
            .reconcile_payment(order_id, status)
            .await
            .unwrap();
        assert_eq!(result, ReconciliationOutcome::NotYetSucceeded);
    }

    assert_eq!(stock_of(&harness, ethiopia.id).await, 5);
    let order = harness.orders.require_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(harness.notifier.paid_customer_count(), 0);

    // the real success still lands afterwards
    let result = harness
        .reconciliation
        .reconcile_payment(order_id, PaymentIntentStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(result, ReconciliationOutcome::Reconciled);
    assert_eq!(stock_of(&harness, ethiopia.id).await, 4);
}

#[tokio::test]
async fn flat_stock_floors_at_zero() {
    let harness = TestHarness::new().await;
    let scarce = seed_product(&harness.db, "scarce", dec!(10.00), 1, 250).await;

    let order = seed_order(&harness.db, OrderStatus::New).await;
    seed_order_item(&harness.db, order.id, &scarce, 3).await;

    let result = harness
        .reconciliation
        .reconcile_payment(order.id, PaymentIntentStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(result, ReconciliationOutcome::Reconciled);
    assert_eq!(stock_of(&harness, scarce.id).await, 0);
}

#[tokio::test]
async fn fifo_consumes_oldest_batches_first() {
    let harness = TestHarness::new().await;
    let guji = seed_product(&harness.db, "guji", dec!(11.00), 0, 250).await;

    let t1 = Utc::now() - Duration::days(10);
    let t2 = Utc::now() - Duration::days(2);
    let old_batch = seed_batch(&harness.db, guji.id, t1, 100, 100).await;
    let new_batch = seed_batch(&harness.db, guji.id, t2, 50, 50).await;

    let consumed = harness
        .inventory
        .consume_grams_fifo(&*harness.db, guji.id, 120)
        .await
        .unwrap();
    assert_eq!(consumed, 120);

    let old_remaining = product_batch::Entity::find_by_id(old_batch.id)
        .one(&*harness.db)
        .await
        .unwrap()
        .unwrap()
        .remaining_grams;
    let new_remaining = product_batch::Entity::find_by_id(new_batch.id)
        .one(&*harness.db)
        .await
        .unwrap()
        .unwrap()
        .remaining_grams;

    assert_eq!(old_remaining, 0);
    assert_eq!(new_remaining, 30);
}

#[tokio::test]
async fn fifo_under_delivers_without_error() {
    let harness = TestHarness::new().await;
    let guji = seed_product(&harness.db, "guji", dec!(11.00), 0, 250).await;

    let t1 = Utc::now() - Duration::days(10);
    let t2 = Utc::now() - Duration::days(2);
    seed_batch(&harness.db, guji.id, t1, 100, 100).await;
    seed_batch(&harness.db, guji.id, t2, 50, 50).await;

    let consumed = harness
        .inventory
        .consume_grams_fifo(&*harness.db, guji.id, 500)
        .await
        .unwrap();
    assert_eq!(consumed, 150);

    let batches = product_batch::Entity::find().all(&*harness.db).await.unwrap();
    assert!(batches.iter().all(|b| b.remaining_grams == 0));
}

#[tokio::test]
async fn batch_backed_sale_refreshes_derived_stock() {
    let harness = TestHarness::new().await;
    // weight 250g; ledger holds 700g → projection floor(700/250) = 2
    let guji = seed_product(&harness.db, "guji", dec!(11.00), 99, 250).await;
    seed_batch(&harness.db, guji.id, Utc::now() - Duration::days(5), 700, 700).await;

    let order = seed_order(&harness.db, OrderStatus::New).await;
    seed_order_item(&harness.db, order.id, &guji, 1).await;

    let result = harness
        .reconciliation
        .reconcile_payment(order.id, PaymentIntentStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(result, ReconciliationOutcome::Reconciled);

    // 700g - 250g = 450g left → floor(450/250) = 1 unit
    assert_eq!(stock_of(&harness, guji.id).await, 1);

    let batches = product_batch::Entity::find().all(&*harness.db).await.unwrap();
    assert_eq!(batches[0].remaining_grams, 450);
}

#[tokio::test]
async fn notification_failure_never_unwinds_paid_state() {
    let harness = TestHarness::new().await;
    let ethiopia = seed_product(&harness.db, "ethiopia-250", dec!(12.50), 5, 250).await;

    let order = seed_order(&harness.db, OrderStatus::New).await;
    seed_order_item(&harness.db, order.id, &ethiopia, 2).await;

    let failing = Arc::new(CountingNotifier::default());
    failing.fail_paid.store(true, Ordering::SeqCst);
    let reconciliation = harness.reconciliation_with_notifier(failing.clone());

    let result = reconciliation
        .reconcile_payment(order.id, PaymentIntentStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(result, ReconciliationOutcome::Reconciled);

    // the failing relay was attempted on both legs, state stayed committed
    assert_eq!(failing.paid_customer_count(), 1);
    assert_eq!(failing.paid_internal_count(), 1);
    assert_eq!(stock_of(&harness, ethiopia.id).await, 3);
    let order = harness.orders.require_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn unknown_orders_are_reported_not_found() {
    let harness = TestHarness::new().await;
    let err = harness
        .reconciliation
        .reconcile_payment(uuid::Uuid::new_v4(), PaymentIntentStatus::Succeeded)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn reconciling_pending_fulfillment_orders_marks_them_paid() {
    let harness = TestHarness::new().await;
    let ethiopia = seed_product(&harness.db, "ethiopia-250", dec!(12.50), 5, 250).await;

    let order = seed_order(&harness.db, OrderStatus::PendingFulfillment).await;
    seed_order_item(&harness.db, order.id, &ethiopia, 1).await;

    let result = harness
        .reconciliation
        .reconcile_payment(order.id, PaymentIntentStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(result, ReconciliationOutcome::Reconciled);

    let order = harness.orders.require_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(stock_of(&harness, ethiopia.id).await, 4);
}

#[tokio::test]
async fn fulfilled_orders_report_already_reconciled() {
    let harness = TestHarness::new().await;
    let order = seed_order(&harness.db, OrderStatus::Fulfilled).await;

    let result = harness
        .reconciliation
        .reconcile_payment(order.id, PaymentIntentStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(result, ReconciliationOutcome::AlreadyReconciled);
}
