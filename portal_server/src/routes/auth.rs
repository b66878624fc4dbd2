//! Registration, login/logout, the current user and CSRF issuance.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use super::{
    check, session_token, AppState, ClientIp, CurrentUser, JsonBody, LimitScope, RateLimited,
};
use crate::error::{ApiError, ApiResult};
use crate::models::notification::TRIGGER_USER_REGISTERED;
use crate::models::user::{CreateUserRequest, NewUser, User, UserChanges, ROLE_USER};
use crate::models::validate_email;
use crate::services::{auth, csrf, user_service, workflow_service};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me).put(update_me))
        .route("/auth/csrf", get(issue_csrf).post(issue_csrf))
}

pub struct LoginScope;

impl LimitScope for LoginScope {
    const NAME: &'static str = "login";
}

pub struct RegisterScope;

impl LimitScope for RegisterScope {
    const NAME: &'static str = "register";
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
}

/// Normalized email plus a non-empty password, checked before any query.
pub(crate) fn validate_signup(email: &str, password: &str) -> ApiResult<String> {
    let email = user_service::normalize_email(email);
    check(validate_email(&email))?;
    if password.is_empty() {
        return Err(ApiError::bad_request("password is required"));
    }
    Ok(email)
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Create a session and answer with both cookies and the user.
async fn start_session(
    state: &AppState,
    conn: &mut diesel_async::AsyncPgConnection,
    user: User,
    status: StatusCode,
    ip: &ClientIp,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let policy = auth::load_policy(conn, state.config.session_ttl_hours).await?;
    let ttl_hours = policy.session_ttl_hours as i64;
    let (token, _session) =
        auth::create_session(conn, user.id, ttl_hours, Some(ip.0.clone()), user_agent(headers))
            .await?;

    let secure = state.config.cookie_secure;
    let csrf_token = csrf::issue(&state.config.csrf_secret, &token);
    let cookies = AppendHeaders([
        (header::SET_COOKIE, auth::session_cookie(&token, ttl_hours * 3600, secure)),
        (header::SET_COOKIE, csrf::csrf_cookie(&csrf_token, secure)),
    ]);
    let body = Json(serde_json::json!({ "user": user, "csrf_token": csrf_token }));
    Ok((status, cookies, body).into_response())
}

async fn register(
    _limit: RateLimited<RegisterScope>,
    State(state): State<AppState>,
    ip: ClientIp,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> ApiResult<Response> {
    let email = validate_signup(&req.email, &req.password)?;

    let mut conn = state.pool.get().await?;
    let policy = auth::load_policy(&mut conn, state.config.session_ttl_hours).await?;
    check(policy.check_password(&req.password))?;

    // Self-registration always creates a regular member.
    let user = user_service::create_user(
        &mut conn,
        NewUser {
            display_name: user_service::default_display_name(&email, req.display_name.as_deref()),
            email,
            password_hash: auth::hash_password(&req.password),
            role: ROLE_USER.to_string(),
            active: true,
        },
    )
    .await?;

    workflow_service::fire(&mut conn, &state.telegram, TRIGGER_USER_REGISTERED, &user).await;
    start_session(&state, &mut conn, user, StatusCode::CREATED, &ip, &headers).await
}

async fn login(
    _limit: RateLimited<LoginScope>,
    State(state): State<AppState>,
    ip: ClientIp,
    headers: HeaderMap,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Response> {
    let email = validate_signup(&req.email, &req.password)?;

    let mut conn = state.pool.get().await?;
    let Some(user) = auth::find_user_by_email(&mut conn, &email).await? else {
        crate::metrics::login_attempt("invalid");
        return Err(ApiError::InvalidCredentials);
    };

    if !user.active {
        crate::metrics::login_attempt("disabled");
        return Err(ApiError::forbidden("Account disabled"));
    }
    if user.is_locked(Utc::now()) {
        crate::metrics::login_attempt("locked");
        return Err(ApiError::forbidden("Account locked, try again later"));
    }

    let policy = auth::load_policy(&mut conn, state.config.session_ttl_hours).await?;
    if !auth::verify_password(&req.password, &user.password_hash) {
        let locked = auth::record_login_failure(&mut conn, &user, &policy).await?;
        if locked.is_some() {
            crate::metrics::login_attempt("locked");
            return Err(ApiError::forbidden("Account locked, try again later"));
        }
        crate::metrics::login_attempt("invalid");
        return Err(ApiError::InvalidCredentials);
    }

    auth::record_login_success(&mut conn, user.id).await?;
    crate::metrics::login_attempt("success");
    tracing::info!(user_id = user.id, ip = %ip.0, "Login succeeded");

    start_session(&state, &mut conn, user, StatusCode::OK, &ip, &headers).await
}

async fn logout(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Response> {
    let mut conn = state.pool.get().await?;
    auth::delete_session(&mut conn, current.session.id).await?;
    tracing::info!(user_id = current.user.id, "Logged out");

    let cookies = AppendHeaders([(
        header::SET_COOKIE,
        auth::clear_session_cookie(state.config.cookie_secure),
    )]);
    Ok((StatusCode::NO_CONTENT, cookies).into_response())
}

async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let display_name = req
        .display_name
        .map(|n| n.trim().to_string())
        .ok_or_else(|| ApiError::bad_request("display_name is required"))?;
    if display_name.is_empty() {
        return Err(ApiError::bad_request("display_name must not be empty"));
    }

    let mut conn = state.pool.get().await?;
    let user = user_service::update_user(
        &mut conn,
        current.user.id,
        &UserChanges {
            display_name: Some(display_name),
            ..Default::default()
        },
    )
    .await?;
    Ok(Json(user))
}

/// Issue a CSRF token bound to the caller's session cookie, if any.
async fn issue_csrf(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let binding = session_token(&headers).unwrap_or_default();
    let token = csrf::issue(&state.config.csrf_secret, &binding);
    let cookies = AppendHeaders([(
        header::SET_COOKIE,
        csrf::csrf_cookie(&token, state.config.cookie_secure),
    )]);
    (cookies, Json(serde_json::json!({ "csrf_token": token }))).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::PortalConfig;
    use crate::routes::portal_router;
    use crate::routes::test_support::*;
    use crate::services::csrf::CSRF_COOKIE;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "198.51.100.4")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn signup_shape_is_checked() {
        assert_eq!(
            validate_signup("  Ada@Example.com ", "pw").unwrap(),
            "ada@example.com"
        );
        assert!(validate_signup("not-an-email", "pw").is_err());
        assert!(validate_signup("ada@example.com", "").is_err());
    }

    #[tokio::test]
    async fn csrf_endpoint_sets_cookie_and_returns_token() {
        let state = state();
        let secret = state.config.csrf_secret.clone();
        let app = portal_router(state);
        let response = send(app, Request::get("/api/auth/csrf").body(Body::empty()).unwrap()).await;
        assert_status(&response, StatusCode::OK);

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with(&format!("{CSRF_COOKIE}=")));
        assert!(!cookie.contains("HttpOnly"));

        let body = json_body(response).await;
        let token = body["csrf_token"].as_str().unwrap();
        assert!(cookie.contains(token));
        assert!(csrf::verify(&secret, "", token));
    }

    #[tokio::test]
    async fn login_validates_before_touching_the_database() {
        let app = portal_router(state());
        let response = send(
            app,
            post_json("/api/auth/login", serde_json::json!({ "email": "nope", "password": "x" })),
        )
        .await;
        assert_status(&response, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_requires_a_password() {
        let app = portal_router(state());
        let response = send(
            app,
            post_json(
                "/api/auth/register",
                serde_json::json!({ "email": "ada@example.com", "password": "" }),
            ),
        )
        .await;
        assert_status(&response, StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error": "password is required" })
        );
    }

    #[tokio::test]
    async fn login_is_rate_limited_per_client() {
        let state = state_with(PortalConfig {
            rate_limit_max: 2,
            ..PortalConfig::default()
        });
        let app = portal_router(state);
        let bad = serde_json::json!({ "email": "", "password": "" });

        for _ in 0..2 {
            let response = send(app.clone(), post_json("/api/auth/login", bad.clone())).await;
            assert_status(&response, StatusCode::BAD_REQUEST);
        }
        let response = send(app.clone(), post_json("/api/auth/login", bad.clone())).await;
        assert_status(&response, StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        // Other clients keep their own window.
        let other = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "192.0.2.9")
            .body(Body::from(bad.to_string()))
            .unwrap();
        let response = send(app, other).await;
        assert_status(&response, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_fields_answer_400_in_the_error_shape() {
        let app = portal_router(state());
        let response = send(
            app,
            post_json("/api/auth/register", serde_json::json!({ "email": "ada@example.com" })),
        )
        .await;
        assert_status(&response, StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("password"));
    }

    #[tokio::test]
    async fn malformed_bodies_still_count_against_the_limit() {
        let state = state_with(PortalConfig {
            rate_limit_max: 2,
            ..PortalConfig::default()
        });
        let app = portal_router(state);
        let incomplete = serde_json::json!({ "email": "ada@example.com" });

        for _ in 0..2 {
            let response = send(app.clone(), post_json("/api/auth/register", incomplete.clone())).await;
            assert_status(&response, StatusCode::BAD_REQUEST);
        }
        let response = send(app, post_json("/api/auth/register", incomplete)).await;
        assert_status(&response, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn logout_needs_csrf_then_session() {
        let state = state();
        let secret = state.config.csrf_secret.clone();
        let app = portal_router(state);

        let response = send(
            app.clone(),
            Request::post("/api/auth/logout").body(Body::empty()).unwrap(),
        )
        .await;
        assert_status(&response, StatusCode::FORBIDDEN);

        let request = with_csrf(Request::builder().method(Method::POST), &secret)
            .uri("/api/auth/logout")
            .body(Body::empty())
            .unwrap();
        let response = send(app, request).await;
        assert_status(&response, StatusCode::UNAUTHORIZED);
    }
}
