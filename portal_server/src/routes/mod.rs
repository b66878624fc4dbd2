//! Portal HTTP routes: JSON API under `/api`.

pub mod admin;
pub mod auth;
pub mod content;
pub mod journals;
pub mod notifications;
pub mod products;
pub mod roadmaps;
pub mod security;
pub mod semesters;
pub mod telegram;
pub mod users;

use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::Notify;

use crate::config::PortalConfig;
use crate::error::{ApiError, ApiResult};
use crate::migration::DbPool;
use crate::models::security::Session;
use crate::models::user::User;
use crate::services::auth::{find_session_user, read_cookie, SESSION_COOKIE};
use crate::services::csrf::{self, CSRF_COOKIE, CSRF_HEADER};
use crate::services::rate_limit::SharedRateLimiter;
use crate::services::telegram_service::TelegramClient;

/// Shared state for portal route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<PortalConfig>,
    pub limiter: SharedRateLimiter,
    pub telegram: TelegramClient,
    /// Wakes the campaign scheduler when a send is queued.
    pub campaign_wakeup: Arc<Notify>,
}

/// Build the portal router.
pub fn portal_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(security::router())
        .merge(products::router())
        .merge(content::router())
        .merge(semesters::router())
        .merge(roadmaps::router())
        .merge(notifications::router())
        .merge(telegram::router())
        .merge(journals::router())
        .merge(admin::router());

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), csrf_guard))
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ── Cookies ──

/// All `Cookie` headers of a request joined into one string.
pub fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The raw session token from the request, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(&cookie_header(headers), SESSION_COOKIE).map(str::to_string)
}

// ── Current user ──

/// The authenticated caller and the session they used.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

/// Resolve the session cookie to a live session and active user.
pub async fn get_user_from_request(state: &AppState, headers: &HeaderMap) -> ApiResult<CurrentUser> {
    let token = session_token(headers).ok_or(ApiError::Unauthorized)?;
    let mut conn = state.pool.get().await?;
    let (session, user) = find_session_user(&mut conn, &token)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(CurrentUser { user, session })
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        get_user_from_request(state, &parts.headers).await
    }
}

/// A caller with the admin role. Other authenticated users get 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let current = get_user_from_request(state, &parts.headers).await?;
        if !current.user.is_admin() {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(current))
    }
}

/// The caller if signed in. Public read endpoints use it to widen results
/// for admins; a missing or stale session is treated as anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(User::is_admin)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match get_user_from_request(state, &parts.headers).await {
            Ok(current) => Ok(MaybeUser(Some(current.user))),
            Err(ApiError::Unauthorized) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

// ── Client address ──

/// Client IP: first `x-forwarded-for` hop, else the socket peer.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientIp(ip))
    }
}

// ── Request bodies ──

/// `Json` body whose rejection (bad syntax, missing field, wrong content
/// type) is a 400 in the portal's error shape.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

// ── Rate limits ──

/// A named rate-limit bucket.
pub trait LimitScope: Send + Sync + 'static {
    const NAME: &'static str;
}

/// Counts the request against `L` for the client. Taken before the body so
/// malformed requests are limited too.
#[derive(Debug)]
pub struct RateLimited<L>(PhantomData<L>);

impl<L: LimitScope> FromRequestParts<AppState> for RateLimited<L> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ip = ClientIp::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never| match never {});
        enforce_rate_limit(state, L::NAME, &ip).await?;
        Ok(RateLimited(PhantomData))
    }
}

/// Count a request against `scope` for this client; 429 once exhausted.
async fn enforce_rate_limit(state: &AppState, scope: &str, ip: &ClientIp) -> ApiResult<()> {
    let key = format!("{scope}:{}", ip.0);
    let window = Duration::from_secs(state.config.rate_limit_window_secs.max(1));
    let decision = state
        .limiter
        .check(&key, state.config.rate_limit_max, window)
        .await?;

    if !decision.allowed {
        crate::metrics::rate_limited(scope);
        tracing::warn!(scope, ip = %ip.0, "Rate limit exceeded");
        return Err(ApiError::TooManyRequests {
            retry_after_secs: decision.retry_after_secs,
        });
    }
    Ok(())
}

// ── CSRF ──

async fn csrf_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if csrf::requires_check(request.method(), request.uri().path()) {
        let headers = request.headers();
        let cookies = cookie_header(headers);
        let binding = read_cookie(&cookies, SESSION_COOKIE).unwrap_or("");
        let cookie = read_cookie(&cookies, CSRF_COOKIE);
        let submitted = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());

        if !csrf::validate(&state.config.csrf_secret, binding, cookie, submitted) {
            crate::metrics::csrf_rejected();
            tracing::debug!(path = %request.uri().path(), "CSRF check failed");
            return ApiError::forbidden("Invalid CSRF token").into_response();
        }
    }
    next.run(request).await
}

/// Parse a JSON-side validation result into a 400.
pub(crate) fn check(result: Result<(), String>) -> ApiResult<()> {
    result.map_err(ApiError::BadRequest)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    use super::*;
    use crate::migration::connect_to_database;
    use crate::services::rate_limit::MemoryStore;

    /// State whose pool never connects; handlers that reach the database
    /// would fail, so tests only cover paths that answer before it.
    pub fn state_with(config: PortalConfig) -> AppState {
        let pool = connect_to_database("postgres://portal@127.0.0.1:1/none", 1)
            .expect("lazy pool");
        AppState {
            pool,
            config: Arc::new(config),
            limiter: Arc::new(MemoryStore::default()),
            telegram: TelegramClient::new("").expect("telegram client"),
            campaign_wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn state() -> AppState {
        state_with(PortalConfig::default())
    }

    pub async fn send(app: Router, request: Request<Body>) -> Response {
        app.oneshot(request).await.expect("infallible router")
    }

    pub async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    /// A request carrying a valid anonymous CSRF pair.
    pub fn with_csrf(builder: axum::http::request::Builder, secret: &str) -> axum::http::request::Builder {
        let token = csrf::issue(secret, "");
        builder
            .header(header::COOKIE, format!("{CSRF_COOKIE}={token}"))
            .header(CSRF_HEADER, token)
    }

    pub fn assert_status(response: &Response, status: StatusCode) {
        assert_eq!(response.status(), status);
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use pretty_assertions::assert_eq;

    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = portal_router(state());
        let response = send(app, Request::get("/healthz").body(Body::empty()).unwrap()).await;
        assert_status(&response, StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn protected_routes_need_a_session() {
        for path in ["/api/auth/me", "/api/users", "/api/journals", "/api/admin/stats"] {
            let app = portal_router(state());
            let response = send(app, Request::get(path).body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
            assert_eq!(
                json_body(response).await,
                serde_json::json!({ "error": "Authentication required" })
            );
        }
    }

    #[tokio::test]
    async fn unsafe_methods_need_csrf() {
        let app = portal_router(state());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/products")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = send(app, request).await;
        assert_status(&response, StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error": "Invalid CSRF token" })
        );
    }

    #[tokio::test]
    async fn valid_csrf_pair_reaches_the_handler() {
        let state = state();
        let secret = state.config.csrf_secret.clone();
        let app = portal_router(state);
        let request = with_csrf(Request::builder().method(Method::POST), &secret)
            .uri("/api/products")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        // Past CSRF, the admin extractor rejects the anonymous caller.
        let response = send(app, request).await;
        assert_status(&response, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn csrf_token_bound_to_another_session_is_rejected() {
        let state = state();
        let token = csrf::issue(&state.config.csrf_secret, "");
        let app = portal_router(state);
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/journals/1")
            .header(
                header::COOKIE,
                format!("{SESSION_COOKIE}=abc; {CSRF_COOKIE}={token}"),
            )
            .header(CSRF_HEADER, token)
            .body(Body::empty())
            .unwrap();
        let response = send(app, request).await;
        assert_status(&response, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn client_ip_prefers_forwarded_header() {
        let request = Request::get("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip, "203.0.113.7");

        let request = Request::get("/").body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip, "unknown");
    }

    #[test]
    fn cookie_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, "a=1".parse().unwrap());
        headers.append(header::COOKIE, format!("{SESSION_COOKIE}=tok").parse().unwrap());
        assert_eq!(session_token(&headers).as_deref(), Some("tok"));
    }
}
