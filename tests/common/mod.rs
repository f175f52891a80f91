//! Shared test harness: in-memory SQLite with the schema built straight
//! from the entities, plus mock collaborators for the payment provider and
//! the notification relay.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Set,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use roastery_api::cart::{Cart, CartLine};
use roastery_api::entities::{order, order_item, product, product_batch};
use roastery_api::errors::ServiceError;
use roastery_api::events::{Event, EventSender};
use roastery_api::services::inventory::InventoryService;
use roastery_api::services::notifications::NotificationService;
use roastery_api::services::orders::{CheckoutDetails, OrderService};
use roastery_api::services::payments::{
    PaymentIntent, PaymentIntentStatus, PaymentMetadata, PaymentProvider,
};
use roastery_api::services::products::ProductService;
use roastery_api::services::reconciliation::PaymentReconciliationService;

/// Payment provider double recording every intent it creates.
#[derive(Default)]
pub struct MockPaymentProvider {
    pub created: Mutex<Vec<(i64, String)>>,
    pub fail_create: AtomicBool,
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_payment_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        _metadata: PaymentMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "payment provider down".to_string(),
            ));
        }
        let mut created = self.created.lock().unwrap();
        created.push((amount_minor_units, currency.to_string()));
        Ok(PaymentIntent {
            id: format!("pi_test_{}", created.len()),
            client_secret: Some("cs_test_secret".to_string()),
        })
    }

    async fn retrieve_status(&self, _intent_id: &str) -> Result<PaymentIntentStatus, ServiceError> {
        Ok(PaymentIntentStatus::Pending)
    }
}

/// Notifier double counting every send.
#[derive(Default)]
pub struct CountingNotifier {
    pub pending: AtomicUsize,
    pub paid_customer: AtomicUsize,
    pub paid_internal: AtomicUsize,
    pub fail_paid: AtomicBool,
}

impl CountingNotifier {
    pub fn paid_customer_count(&self) -> usize {
        self.paid_customer.load(Ordering::SeqCst)
    }

    pub fn paid_internal_count(&self) -> usize {
        self.paid_internal.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationService for CountingNotifier {
    async fn send_order_pending(
        &self,
        _order: &order::Model,
        _items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_order_paid_customer(
        &self,
        _order: &order::Model,
        _items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        self.paid_customer.fetch_add(1, Ordering::SeqCst);
        if self.fail_paid.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "mail relay down".to_string(),
            ));
        }
        Ok(())
    }

    async fn send_order_paid_internal(
        &self,
        _order: &order::Model,
        _items: &[order_item::Model],
        _recipients: &[String],
    ) -> Result<(), ServiceError> {
        self.paid_internal.fetch_add(1, Ordering::SeqCst);
        if self.fail_paid.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "mail relay down".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct TestHarness {
    pub db: Arc<DatabaseConnection>,
    pub orders: OrderService,
    pub products: ProductService,
    pub inventory: InventoryService,
    pub reconciliation: PaymentReconciliationService,
    pub payments: Arc<MockPaymentProvider>,
    pub notifier: Arc<CountingNotifier>,
    pub event_sender: EventSender,
    _event_rx: mpsc::Receiver<Event>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let db = setup_db().await;
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);

        let payments = Arc::new(MockPaymentProvider::default());
        let notifier = Arc::new(CountingNotifier::default());

        let orders = OrderService::new(
            db.clone(),
            event_sender.clone(),
            payments.clone(),
            notifier.clone(),
            "eur".to_string(),
        );
        let products = ProductService::new(db.clone(), event_sender.clone());
        let reconciliation = PaymentReconciliationService::new(
            db.clone(),
            event_sender.clone(),
            notifier.clone(),
            vec!["ops@example.com".to_string()],
        );

        Self {
            db,
            orders,
            products,
            inventory: InventoryService::new(),
            reconciliation,
            payments,
            notifier,
            event_sender,
            _event_rx: event_rx,
        }
    }

    /// Reconciliation service wired to a custom notifier (failure tests).
    pub fn reconciliation_with_notifier(
        &self,
        notifier: Arc<dyn NotificationService>,
    ) -> PaymentReconciliationService {
        PaymentReconciliationService::new(
            self.db.clone(),
            self.event_sender.clone(),
            notifier,
            vec!["ops@example.com".to_string()],
        )
    }
}

/// In-memory SQLite with the schema created from the entities. A single
/// pooled connection keeps the database alive for the whole test.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await.expect("sqlite in-memory");

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    for statement in [
        schema.create_table_from_entity(product::Entity),
        schema.create_table_from_entity(product_batch::Entity),
        schema.create_table_from_entity(order::Entity),
        schema.create_table_from_entity(order_item::Entity),
    ] {
        db.execute(backend.build(&statement))
            .await
            .expect("create table");
    }

    Arc::new(db)
}

pub async fn seed_product(
    db: &DatabaseConnection,
    slug: &str,
    price: Decimal,
    stock: i32,
    weight_grams: i32,
) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku: Set(format!("SKU-{}", slug.to_uppercase())),
        slug: Set(slug.to_string()),
        name: Set(slug.replace('-', " ")),
        origin: Set("Rwanda".to_string()),
        roast_level: Set(product::RoastLevel::Medium),
        tasting_notes: Set(None),
        // markup 0 keeps price == cost, satisfying the derivation invariant
        cost_price: Set(price),
        markup_percent: Set(Decimal::ZERO),
        price: Set(price),
        weight_grams: Set(weight_grams),
        available_grinds: Set("whole,espresso,filter,french_press".to_string()),
        stock: Set(stock),
        is_active: Set(true),
        image_url: Set(None),
        description: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed product")
}

pub async fn deactivate_product(db: &DatabaseConnection, model: product::Model) {
    let mut active: product::ActiveModel = model.into();
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now());
    active.update(db).await.expect("deactivate product");
}

pub async fn seed_batch(
    db: &DatabaseConnection,
    product_id: Uuid,
    received_at: DateTime<Utc>,
    quantity_grams: i32,
    remaining_grams: i32,
) -> product_batch::Model {
    let now = Utc::now();
    product_batch::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        received_at: Set(received_at),
        quantity_grams: Set(quantity_grams),
        remaining_grams: Set(remaining_grams),
        unit_cost_per_kg: Set(Decimal::new(1200, 2)),
        note: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed batch")
}

pub async fn seed_order(db: &DatabaseConnection, status: order::OrderStatus) -> order::Model {
    let now = Utc::now();
    order::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(None),
        full_name: Set("Test Customer".to_string()),
        email: Set("customer@example.com".to_string()),
        phone_number: Set(None),
        street: Set("Hauptstraße".to_string()),
        house_number: Set(Some("5".to_string())),
        city: Set("Berlin".to_string()),
        postal_code: Set("10115".to_string()),
        country: Set("Germany".to_string()),
        status: Set(status),
        payment_intent_id: Set(Some("pi_seeded".to_string())),
        subtotal: Set(Decimal::ZERO),
        shipping: Set(Decimal::ZERO),
        total: Set(Decimal::ZERO),
        notes: Set(None),
        fulfilled_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed order")
}

pub async fn seed_order_item(
    db: &DatabaseConnection,
    order_id: Uuid,
    product: &product::Model,
    quantity: i32,
) -> order_item::Model {
    order_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        product_id: Set(product.id),
        product_name: Set(product.name.clone()),
        unit_price: Set(product.price),
        quantity: Set(quantity),
        grind: Set(Some("whole".to_string())),
        weight_grams: Set(product.weight_grams),
    }
    .insert(db)
    .await
    .expect("seed order item")
}

pub fn checkout_details() -> CheckoutDetails {
    CheckoutDetails {
        full_name: "Test Customer".to_string(),
        email: "customer@example.com".to_string(),
        phone_number: None,
        street: "Hauptstraße".to_string(),
        house_number: Some("5".to_string()),
        city: "Berlin".to_string(),
        postal_code: "10115".to_string(),
        country: "Germany".to_string(),
        customer_id: None,
        notes: None,
    }
}

/// Cart holding the given product at the given quantity, priced from the
/// catalog row the way the storefront add-to-cart path does.
pub fn cart_for(products: &[(&product::Model, u32)]) -> Cart {
    let mut cart = Cart::new();
    for (product, quantity) in products {
        cart.add_line(
            &product.slug,
            CartLine {
                name: product.name.clone(),
                price: product.price.to_string(),
                quantity: 0,
                grind: "whole".to_string(),
                weight_grams: product.weight_grams,
                sku: product.sku.clone(),
                image_url: String::new(),
            },
            *quantity,
        );
    }
    cart
}
