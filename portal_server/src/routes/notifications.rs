//! Notification templates, campaigns, workflows and the user inbox.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{check, AdminUser, AppState, CurrentUser, JsonBody};
use crate::error::{ApiError, ApiResult};
use crate::models::notification::{
    Audience, Campaign, CreateCampaignRequest, NewTemplate, NewWorkflow, NotificationTemplate,
    ScheduleRequest, TemplateChanges, UserNotification, Workflow, WorkflowChanges,
};
use crate::services::{notification_service, workflow_service};

pub fn router() -> Router<AppState> {
    Router::new()
        // Inbox
        .route("/notifications", get(inbox))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/notifications/read-all", post(mark_all_read))
        // Templates
        .route(
            "/notifications/templates",
            get(list_templates).post(create_template),
        )
        .route(
            "/notifications/templates/{id}",
            get(get_template).put(update_template).delete(delete_template),
        )
        // Campaigns
        .route(
            "/notifications/campaigns",
            get(list_campaigns).post(create_campaign),
        )
        .route(
            "/notifications/campaigns/{id}",
            get(get_campaign).delete(delete_campaign),
        )
        .route("/notifications/campaigns/{id}/send", post(send_campaign))
        .route("/notifications/campaigns/{id}/schedule", post(schedule_campaign))
        // Workflows
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
}

// ── Inbox ──

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkedCount {
    pub updated: usize,
}

async fn inbox(
    current: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Json<Vec<UserNotification>>> {
    let mut conn = state.pool.get().await?;
    let items = notification_service::list_inbox(&mut conn, current.user.id, query.unread).await?;
    Ok(Json(items))
}

async fn mark_read(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserNotification>> {
    let mut conn = state.pool.get().await?;
    let item = notification_service::mark_read(&mut conn, current.user.id, id).await?;
    Ok(Json(item))
}

async fn mark_all_read(
    current: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<MarkedCount>> {
    let mut conn = state.pool.get().await?;
    let updated = notification_service::mark_all_read(&mut conn, current.user.id).await?;
    Ok(Json(MarkedCount { updated }))
}

// ── Templates ──

async fn list_templates(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<NotificationTemplate>>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(notification_service::list_templates(&mut conn).await?))
}

async fn get_template(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<NotificationTemplate>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(notification_service::get_template(&mut conn, id).await?))
}

async fn create_template(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(new): JsonBody<NewTemplate>,
) -> ApiResult<(StatusCode, Json<NotificationTemplate>)> {
    check(new.validate())?;
    let mut conn = state.pool.get().await?;
    let template = notification_service::create_template(&mut conn, &new).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn update_template(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<TemplateChanges>,
) -> ApiResult<Json<NotificationTemplate>> {
    check(changes.validate())?;
    let mut conn = state.pool.get().await?;
    let template = notification_service::update_template(&mut conn, id, &changes).await?;
    Ok(Json(template))
}

async fn delete_template(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    notification_service::delete_template(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Campaigns ──

async fn list_campaigns(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Campaign>>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(notification_service::list_campaigns(&mut conn).await?))
}

async fn get_campaign(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Campaign>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(notification_service::get_campaign(&mut conn, id).await?))
}

async fn create_campaign(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateCampaignRequest>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    req.audience
        .parse::<Audience>()
        .map_err(ApiError::BadRequest)?;

    let mut conn = state.pool.get().await?;
    let campaign = notification_service::create_campaign(&mut conn, req, admin.user.id).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn delete_campaign(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    notification_service::delete_campaign(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Queue the campaign and wake the scheduler; delivery happens in the
/// background, so the answer is 202 with the queued campaign.
async fn send_campaign(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    let mut conn = state.pool.get().await?;
    let campaign = notification_service::queue_send(&mut conn, id).await?;
    state.campaign_wakeup.notify_one();
    Ok((StatusCode::ACCEPTED, Json(campaign)))
}

async fn schedule_campaign(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<ScheduleRequest>,
) -> ApiResult<Json<Campaign>> {
    if req.scheduled_at <= Utc::now() {
        return Err(ApiError::bad_request("scheduled_at must be in the future"));
    }
    let mut conn = state.pool.get().await?;
    let campaign = notification_service::schedule_campaign(&mut conn, id, req.scheduled_at).await?;
    Ok(Json(campaign))
}

// ── Workflows ──

async fn list_workflows(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Workflow>>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(workflow_service::list_workflows(&mut conn).await?))
}

async fn get_workflow(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Workflow>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(workflow_service::get_workflow(&mut conn, id).await?))
}

async fn create_workflow(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(new): JsonBody<NewWorkflow>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    check(new.validate())?;
    let mut conn = state.pool.get().await?;
    let workflow = workflow_service::create_workflow(&mut conn, &new).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn update_workflow(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<WorkflowChanges>,
) -> ApiResult<Json<Workflow>> {
    check(changes.validate())?;
    let mut conn = state.pool.get().await?;
    let workflow = workflow_service::update_workflow(&mut conn, id, &changes).await?;
    Ok(Json(workflow))
}

async fn delete_workflow(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    workflow_service::delete_workflow(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
