use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus};
use crate::errors::ServiceError;
use crate::services::fulfillment::Picklist;
use crate::services::orders::OrderDetail;
use crate::services::payments::PaymentIntentStatus;
use crate::services::reconciliation::ReconciliationOutcome;
use crate::{ApiResponse, AppState};

use super::ListQuery;

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            OrderStatus::from_str(raw)
                .map_err(|_| ServiceError::ValidationError(format!("unknown status '{}'", raw)))
        })
        .transpose()?;

    let (orders, total) = state
        .services
        .orders
        .list_orders(query.page, query.per_page, status)
        .await?;

    Ok(Json(ApiResponse::ok(OrderListResponse {
        orders,
        total,
        page: query.page,
        per_page: query.per_page,
    })))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state
        .services
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
    Ok(Json(ApiResponse::ok(detail)))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationQuery {
    pub payment_intent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub order: order::Model,
    pub items: Vec<crate::entities::order_item::Model>,
    pub reconciliation: Option<ReconciliationOutcome>,
}

/// Thank-you page fallback: when the webhook has not landed yet, ask the
/// provider directly and reconcile if the payment already succeeded.
/// Provider trouble is logged and the page is still served.
pub async fn order_confirmation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<ConfirmationQuery>,
) -> Result<Json<ApiResponse<ConfirmationResponse>>, ServiceError> {
    let detail = state
        .services
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    let mut outcome = None;
    if !detail.order.status.is_paid() {
        let intent_id = query
            .payment_intent
            .or_else(|| detail.order.payment_intent_id.clone());
        if let Some(intent_id) = intent_id {
            match state.services.payments.retrieve_status(&intent_id).await {
                Ok(PaymentIntentStatus::Succeeded) => {
                    let result = state
                        .services
                        .reconciliation
                        .reconcile_payment(order_id, PaymentIntentStatus::Succeeded)
                        .await?;
                    warn!(%order_id, "order reconciled on confirmation page");
                    outcome = Some(result);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%order_id, "confirmation-page status check failed: {}", err);
                }
            }
        }
    }

    // Re-read so a reconciled status is reflected in the response.
    let detail = state
        .services
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    Ok(Json(ApiResponse::ok(ConfirmationResponse {
        order: detail.order,
        items: detail.items,
        reconciliation: outcome,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let updated = state
        .services
        .orders
        .update_status(order_id, request.status, request.notes)
        .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

pub async fn mark_fulfilled(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let updated = state.services.orders.mark_fulfilled(order_id).await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// Picklist payload for the document renderer. Only packable orders have
/// one; anything else is hidden, like the original fulfillment screens.
pub async fn picklist(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Picklist>>, ServiceError> {
    let detail = state
        .services
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    if !detail.order.status.is_packable() {
        return Err(ServiceError::NotFound(format!(
            "Order {} not available",
            order_id
        )));
    }

    Ok(Json(ApiResponse::ok(Picklist::build(
        &detail.order,
        &detail.items,
    ))))
}

pub async fn fulfillment_queue(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<order::Model>>>, ServiceError> {
    Ok(Json(ApiResponse::ok(
        state.services.fulfillment.packable_orders().await?,
    )))
}

pub async fn recently_fulfilled(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<order::Model>>>, ServiceError> {
    Ok(Json(ApiResponse::ok(
        state.services.fulfillment.recently_fulfilled().await?,
    )))
}
