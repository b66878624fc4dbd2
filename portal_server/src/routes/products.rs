//! Product catalog and purchases.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use super::{check, AdminUser, AppState, CurrentUser, JsonBody, MaybeUser};
use crate::error::{ApiError, ApiResult};
use crate::models::notification::TRIGGER_PURCHASE_COMPLETED;
use crate::models::product::{NewProduct, Product, ProductChanges, Purchase, PurchaseRequest};
use crate::services::{product_service, workflow_service};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/{id}/purchase", post(purchase))
        .route("/purchases", get(my_purchases))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    #[serde(default)]
    pub all: bool,
}

async fn list_products(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    let include_inactive = query.all && viewer.is_admin();
    let mut conn = state.pool.get().await?;
    let products = product_service::list_products(&mut conn, include_inactive).await?;
    Ok(Json(products))
}

async fn get_product(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Product>> {
    let mut conn = state.pool.get().await?;
    let product = product_service::get_product(&mut conn, id).await?;
    if !product.active && !viewer.is_admin() {
        return Err(ApiError::not_found("Product"));
    }
    Ok(Json(product))
}

async fn create_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(new_product): JsonBody<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    check(new_product.validate())?;
    let mut conn = state.pool.get().await?;
    let product = product_service::create_product(&mut conn, new_product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<ProductChanges>,
) -> ApiResult<Json<Product>> {
    check(changes.validate())?;
    let mut conn = state.pool.get().await?;
    let product = product_service::update_product(&mut conn, id, &changes).await?;
    Ok(Json(product))
}

async fn delete_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    product_service::delete_product(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn purchase(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<PurchaseRequest>,
) -> ApiResult<(StatusCode, Json<Purchase>)> {
    if req.quantity < 1 {
        return Err(ApiError::bad_request("quantity must be at least 1"));
    }
    let mut conn = state.pool.get().await?;
    let purchase = product_service::purchase(&mut conn, current.user.id, id, req.quantity).await?;
    workflow_service::fire(
        &mut conn,
        &state.telegram,
        TRIGGER_PURCHASE_COMPLETED,
        &current.user,
    )
    .await;
    Ok((StatusCode::CREATED, Json(purchase)))
}

async fn my_purchases(
    current: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Purchase>>> {
    let mut conn = state.pool.get().await?;
    let purchases = product_service::list_user_purchases(&mut conn, current.user.id).await?;
    Ok(Json(purchases))
}
