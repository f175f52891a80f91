use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{product, product_batch};
use crate::errors::ServiceError;
use crate::services::products::{CreateProductInput, ReceiveBatchInput, UpdateProductInput};
use crate::{ApiResponse, AppState};

use super::ListQuery;

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<ProductListResponse>>, ServiceError> {
    let (products, total) = state
        .services
        .products
        .list_active(query.page, query.per_page)
        .await?;

    Ok(Json(ApiResponse::ok(ProductListResponse {
        products,
        total,
        page: query.page,
        per_page: query.per_page,
    })))
}

/// Storefront lookup by slug.
pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<product::Model>>, ServiceError> {
    let product = state
        .services
        .products
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product '{}' not found", slug)))?;
    Ok(Json(ApiResponse::ok(product)))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<ApiResponse<product::Model>>), ServiceError> {
    let product = state.services.products.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(product))))
}

/// Staff update by id; the path segment doubles as slug for GET.
pub async fn update_product(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(input): Json<UpdateProductInput>,
) -> Result<Json<ApiResponse<product::Model>>, ServiceError> {
    let product_id = Uuid::from_str(&key)
        .map_err(|_| ServiceError::ValidationError(format!("'{}' is not a product id", key)))?;
    let product = state
        .services
        .products
        .update_product(product_id, input)
        .await?;
    Ok(Json(ApiResponse::ok(product)))
}

pub async fn list_batches(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<product_batch::Model>>>, ServiceError> {
    Ok(Json(ApiResponse::ok(
        state.services.products.list_batches(product_id).await?,
    )))
}

pub async fn receive_batch(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<ReceiveBatchInput>,
) -> Result<(StatusCode, Json<ApiResponse<product_batch::Model>>), ServiceError> {
    let batch = state
        .services
        .products
        .receive_batch(product_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(batch))))
}
