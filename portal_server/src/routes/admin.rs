//! Admin-only reporting: dashboard stats, purchases, enrollments.

use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use super::{AdminUser, AppState};
use crate::dashboard::stats::{self, DashboardStats};
use crate::error::ApiResult;
use crate::models::enrollment::EnrollmentProgress;
use crate::models::product::PurchaseJson;
use crate::services::{enrollment_service, product_service};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(dashboard))
        .route("/admin/purchases", get(all_purchases))
        .route("/admin/enrollments", get(all_enrollments))
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnrollmentListQuery {
    pub roadmap_id: Option<i64>,
}

async fn dashboard(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<DashboardStats>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(stats::query_dashboard(&mut conn).await?))
}

async fn all_purchases(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<PurchaseListQuery>,
) -> ApiResult<Json<Vec<PurchaseJson>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let mut conn = state.pool.get().await?;
    Ok(Json(product_service::list_all_purchases(&mut conn, limit).await?))
}

async fn all_enrollments(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<EnrollmentListQuery>,
) -> ApiResult<Json<Vec<EnrollmentProgress>>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(enrollment_service::list_all(&mut conn, query.roadmap_id).await?))
}
