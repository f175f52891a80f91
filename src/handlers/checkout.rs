use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::services::orders::CheckoutDetails;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub cart: Cart,
    #[serde(flatten)]
    pub details: CheckoutDetails,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    /// Cart keys that were skipped because the product is gone or inactive.
    pub skipped: Vec<String>,
    pub client_secret: Option<String>,
    /// The emptied cart, for the caller to write back into the session.
    pub cart: Cart,
}

/// Convert the submitted cart into an order plus payment intent.
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let mut cart = request.cart;
    let outcome = state
        .services
        .orders
        .create_order(&mut cart, request.details)
        .await?;

    let response = CheckoutResponse {
        order: outcome.order,
        items: outcome.items,
        skipped: outcome.skipped,
        client_secret: outcome.client_secret,
        cart,
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(response))))
}
