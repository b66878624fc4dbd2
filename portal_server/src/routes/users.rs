//! User administration.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

use super::auth::validate_signup;
use super::{check, AdminUser, AppState, JsonBody};
use crate::error::{ApiError, ApiResult};
use crate::models::user::{
    is_valid_role, CreateUserRequest, NewUser, UpdateUserRequest, User, UserChanges, ROLE_USER,
};
use crate::models::{PageQuery, Paged};
use crate::services::auth;
use crate::services::user_service::{self, UserFilter};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/unlock", post(unlock_user))
}

fn check_role(role: Option<&str>) -> ApiResult<()> {
    match role {
        Some(role) if !is_valid_role(role) => {
            Err(ApiError::bad_request(format!("unknown role: {role}")))
        }
        _ => Ok(()),
    }
}

async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Paged<User>>> {
    let mut conn = state.pool.get().await?;
    let users = user_service::list_users(&mut conn, &filter, page).await?;
    Ok(Json(users))
}

async fn get_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(user_service::get_user(&mut conn, id).await?))
}

async fn create_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let email = validate_signup(&req.email, &req.password)?;
    check_role(req.role.as_deref())?;

    let mut conn = state.pool.get().await?;
    let policy = auth::load_policy(&mut conn, state.config.session_ttl_hours).await?;
    check(policy.check_password(&req.password))?;

    let user = user_service::create_user(
        &mut conn,
        NewUser {
            display_name: user_service::default_display_name(&email, req.display_name.as_deref()),
            email,
            password_hash: auth::hash_password(&req.password),
            role: req.role.unwrap_or_else(|| ROLE_USER.to_string()),
            active: true,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    check_role(req.role.as_deref())?;
    if req.display_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("display_name must not be empty"));
    }
    if id == admin.user.id && req.active == Some(false) {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let mut conn = state.pool.get().await?;
    let password_hash = match req.password.as_deref() {
        Some(password) => {
            let policy = auth::load_policy(&mut conn, state.config.session_ttl_hours).await?;
            check(policy.check_password(password))?;
            Some(auth::hash_password(password))
        }
        None => None,
    };

    let changes = UserChanges {
        display_name: req.display_name.map(|n| n.trim().to_string()),
        role: req.role,
        active: req.active,
        password_hash,
    };
    let user = user_service::update_user(&mut conn, id, &changes).await?;

    // A password reset or deactivation ends the user's sessions.
    if changes.password_hash.is_some() || changes.active == Some(false) {
        auth::revoke_other_sessions(&mut conn, id, None).await?;
    }
    Ok(Json(user))
}

async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if id == admin.user.id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }
    let mut conn = state.pool.get().await?;
    user_service::delete_user(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unlock_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    let mut conn = state.pool.get().await?;
    let user = user_service::unlock_user(&mut conn, id).await?;
    tracing::info!(user_id = id, "Account unlocked");
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_checked() {
        assert!(check_role(None).is_ok());
        assert!(check_role(Some("admin")).is_ok());
        assert_eq!(
            check_role(Some("root")).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
