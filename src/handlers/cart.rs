//! Cart endpoints. The cart payload is owned by the caller's session; each
//! endpoint applies one mutation and hands the updated payload back.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::cart::{compute_summary, Cart, CartLine, CartSummary};
use crate::errors::ServiceError;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct CartPayload {
    #[serde(default)]
    pub cart: Cart,
}

/// Cart payload plus its freshly computed summary.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub summary: CartSummary,
}

impl CartView {
    fn build(cart: Cart) -> Result<Self, ServiceError> {
        let summary = compute_summary(&cart)?;
        Ok(Self { cart, summary })
    }
}

/// Price a cart payload without mutating it.
pub async fn price_cart(
    State(_state): State<AppState>,
    Json(payload): Json<CartPayload>,
) -> Result<Json<ApiResponse<CartSummary>>, ServiceError> {
    let summary = compute_summary(&payload.cart)?;
    Ok(Json(ApiResponse::ok(summary)))
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    #[serde(default)]
    pub cart: Cart,
    pub slug: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub grind: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

/// Add a product to the cart, refreshing price/weight/sku from the catalog.
pub async fn add_item(
    State(state): State<AppState>,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let product = state
        .services
        .products
        .get_active_by_slug(&request.slug)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product '{}' not found", request.slug)))?;

    let grind = request
        .grind
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| "whole".to_string());

    let mut cart = request.cart;
    cart.add_line(
        &product.slug,
        CartLine {
            name: product.name.clone(),
            price: product.price.to_string(),
            quantity: 0,
            grind,
            weight_grams: product.weight_grams,
            sku: product.sku.clone(),
            image_url: product.image_url.clone().unwrap_or_default(),
        },
        request.quantity,
    );

    Ok(Json(ApiResponse::ok(CartView::build(cart)?)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    #[serde(default)]
    pub cart: Cart,
    pub quantity: u32,
    #[serde(default)]
    pub grind: Option<String>,
}

/// Update quantity/grind of a cart line. Unknown keys are a no-op.
pub async fn update_item(
    State(_state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let mut cart = request.cart;
    cart.update_line(&slug, request.quantity, request.grind);
    Ok(Json(ApiResponse::ok(CartView::build(cart)?)))
}

/// Remove a line from the cart.
pub async fn remove_item(
    State(_state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<CartPayload>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let mut cart = payload.cart;
    cart.remove_line(&slug);
    Ok(Json(ApiResponse::ok(CartView::build(cart)?)))
}

/// Empty the cart.
pub async fn clear_cart(
    State(_state): State<AppState>,
    Json(payload): Json<CartPayload>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let mut cart = payload.cart;
    cart.clear();
    Ok(Json(ApiResponse::ok(CartView::build(cart)?)))
}
