//! Thin HTTP layer over the services: extract, delegate, wrap.

pub mod cart;
pub mod checkout;
pub mod orders;
pub mod products;
pub mod webhooks;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::fulfillment::FulfillmentService;
use crate::services::notifications::NotificationService;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentProvider;
use crate::services::products::ProductService;
use crate::services::reconciliation::PaymentReconciliationService;
use crate::AppState;

/// Aggregated service handles used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub products: Arc<ProductService>,
    pub fulfillment: Arc<FulfillmentService>,
    pub reconciliation: Arc<PaymentReconciliationService>,
    pub payments: Arc<dyn PaymentProvider>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn NotificationService>,
        config: &AppConfig,
    ) -> Self {
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            payments.clone(),
            notifier.clone(),
            config.currency.clone(),
        ));
        let products = Arc::new(ProductService::new(db.clone(), event_sender.clone()));
        let fulfillment = Arc::new(FulfillmentService::new(db.clone()));
        let reconciliation = Arc::new(PaymentReconciliationService::new(
            db,
            event_sender,
            notifier,
            config.order_notification_recipients(),
        ));

        Self {
            orders,
            products,
            fulfillment,
            reconciliation,
            payments,
        }
    }
}

/// Common query parameters for list endpoints.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub status: Option<String>,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/cart/summary", post(cart::price_cart))
        .route("/api/v1/cart/items", post(cart::add_item))
        .route(
            "/api/v1/cart/items/:slug",
            axum::routing::put(cart::update_item).delete(cart::remove_item),
        )
        .route("/api/v1/cart", delete(cart::clear_cart))
        .route("/api/v1/checkout", post(checkout::checkout))
        .route("/api/v1/orders", get(orders::list_orders))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/confirmation", get(orders::order_confirmation))
        .route("/api/v1/orders/:id/status", post(orders::update_status))
        .route("/api/v1/orders/:id/fulfill", post(orders::mark_fulfilled))
        .route("/api/v1/orders/:id/picklist", get(orders::picklist))
        .route("/api/v1/fulfillment/queue", get(orders::fulfillment_queue))
        .route("/api/v1/fulfillment/recent", get(orders::recently_fulfilled))
        .route(
            "/api/v1/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/api/v1/products/:key",
            get(products::get_product).put(products::update_product),
        )
        .route(
            "/api/v1/products/:key/batches",
            get(products::list_batches).post(products::receive_batch),
        )
        .route("/api/v1/webhooks/stripe", post(webhooks::stripe_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
