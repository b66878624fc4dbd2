//! Telegram bot webhook and account linking.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

use super::{AdminUser, AppState, CurrentUser, JsonBody};
use crate::error::{ApiError, ApiResult};
use crate::models::telegram::{NewTelegramUser, TelegramUpdate, TelegramUser};
use crate::services::telegram_service;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/telegram/webhook", post(webhook))
        .route("/telegram/link", post(link).delete(unlink))
        .route("/telegram/users", get(list_users))
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(update): JsonBody<TelegramUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    let received = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !telegram_service::validate_webhook_secret(&state.config.telegram_webhook_secret, received) {
        tracing::warn!(update_id = update.update_id, "Telegram webhook secret mismatch");
        return Err(ApiError::Unauthorized);
    }

    let Some(sender) = update.sender() else {
        tracing::debug!(update_id = update.update_id, "Telegram update without sender");
        return Ok(Json(serde_json::json!({ "ok": true })));
    };

    let mut conn = state.pool.get().await?;
    let account = telegram_service::upsert_sender(&mut conn, &sender).await?;
    tracing::debug!(
        update_id = update.update_id,
        telegram_id = account.telegram_id,
        "Telegram sender recorded"
    );
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn link(
    current: CurrentUser,
    State(state): State<AppState>,
    JsonBody(account): JsonBody<NewTelegramUser>,
) -> ApiResult<Json<TelegramUser>> {
    let mut conn = state.pool.get().await?;
    let linked = telegram_service::link(&mut conn, current.user.id, account).await?;
    Ok(Json(linked))
}

async fn unlink(current: CurrentUser, State(state): State<AppState>) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    if !telegram_service::unlink(&mut conn, current.user.id).await? {
        return Err(ApiError::not_found("Telegram link"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<TelegramUser>>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(telegram_service::list_users(&mut conn).await?))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request};

    use super::*;
    use crate::config::PortalConfig;
    use crate::routes::portal_router;
    use crate::routes::test_support::*;

    fn update(secret: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/telegram/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_HEADER, secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn configured() -> AppState {
        state_with(PortalConfig {
            telegram_webhook_secret: "hook-secret".to_string(),
            ..PortalConfig::default()
        })
    }

    #[tokio::test]
    async fn webhook_rejects_wrong_secret() {
        let body = serde_json::json!({ "update_id": 1 });

        let response = send(portal_router(configured()), update(Some("nope"), body.clone())).await;
        assert_status(&response, StatusCode::UNAUTHORIZED);

        let response = send(portal_router(configured()), update(None, body)).await;
        assert_status(&response, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_is_csrf_exempt_and_ignores_updates_without_sender() {
        let body = serde_json::json!({ "update_id": 2 });
        let response = send(portal_router(configured()), update(Some("hook-secret"), body)).await;
        assert_status(&response, StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "ok": true }));
    }
}
