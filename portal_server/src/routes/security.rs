//! Security policy and self-service account security.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use super::{check, AdminUser, AppState, CurrentUser, JsonBody};
use crate::error::{ApiError, ApiResult};
use crate::models::security::{PolicyChanges, SecurityPolicy, Session};
use crate::models::user::UserChanges;
use crate::services::{auth, user_service};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/security/policy", get(get_policy).put(update_policy))
        .route("/security/password", post(change_password))
        .route("/security/sessions", get(list_sessions))
        .route("/security/sessions/{id}", delete(revoke_session))
        .route("/security/sessions/revoke-others", post(revoke_others))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub current: bool,
}

#[derive(Debug, Serialize)]
pub struct RevokedCount {
    pub revoked: usize,
}

async fn get_policy(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<SecurityPolicy>> {
    let mut conn = state.pool.get().await?;
    let policy = auth::load_policy(&mut conn, state.config.session_ttl_hours).await?;
    Ok(Json(policy))
}

async fn update_policy(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(changes): JsonBody<PolicyChanges>,
) -> ApiResult<Json<SecurityPolicy>> {
    check(changes.validate())?;
    let mut conn = state.pool.get().await?;
    let policy = auth::update_policy(&mut conn, &changes, state.config.session_ttl_hours).await?;
    Ok(Json(policy))
}

/// Change the caller's password. Other sessions are signed out.
async fn change_password(
    current: CurrentUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    if req.new_password.is_empty() {
        return Err(ApiError::bad_request("new_password is required"));
    }
    if !auth::verify_password(&req.current_password, &current.user.password_hash) {
        return Err(ApiError::forbidden("Current password is incorrect"));
    }

    let mut conn = state.pool.get().await?;
    let policy = auth::load_policy(&mut conn, state.config.session_ttl_hours).await?;
    check(policy.check_password(&req.new_password))?;

    user_service::update_user(
        &mut conn,
        current.user.id,
        &UserChanges {
            password_hash: Some(auth::hash_password(&req.new_password)),
            ..Default::default()
        },
    )
    .await?;
    let revoked =
        auth::revoke_other_sessions(&mut conn, current.user.id, Some(current.session.id)).await?;

    tracing::info!(user_id = current.user.id, revoked, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_sessions(
    current: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<SessionView>>> {
    let mut conn = state.pool.get().await?;
    let sessions = auth::list_sessions(&mut conn, current.user.id).await?;
    let views = sessions
        .into_iter()
        .map(|session| SessionView {
            current: session.id == current.session.id,
            session,
        })
        .collect();
    Ok(Json(views))
}

async fn revoke_session(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    if !auth::revoke_session(&mut conn, current.user.id, id).await? {
        return Err(ApiError::not_found("Session"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_others(
    current: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<RevokedCount>> {
    let mut conn = state.pool.get().await?;
    let revoked =
        auth::revoke_other_sessions(&mut conn, current.user.id, Some(current.session.id)).await?;
    Ok(Json(RevokedCount { revoked }))
}
