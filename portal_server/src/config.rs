//! Portal configuration, loaded from environment variables.

use crate::services::rate_limit::RateLimitBackend;

#[derive(Clone, Debug)]
pub struct PortalConfig {
    /// Secret used to sign CSRF tokens.
    pub csrf_secret: String,
    /// Add the `Secure` attribute to cookies.
    pub cookie_secure: bool,
    /// Session lifetime used when no security policy row exists.
    pub session_ttl_hours: i64,
    /// Requests allowed per rate-limit window on auth endpoints.
    pub rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Where rate-limit counters live.
    pub rate_limit_backend: RateLimitBackend,
    /// Telegram bot token for notification delivery.
    pub telegram_bot_token: String,
    /// Shared secret Telegram sends with webhook updates.
    pub telegram_webhook_secret: String,
    /// Poll interval for scheduled campaigns.
    pub campaign_poll_secs: u64,
    /// Bootstrap admin account, created on first start when both are set.
    pub admin_email: String,
    pub admin_password: String,
    /// Browser origin allowed by CORS.
    pub allowed_origin: String,
}

impl PortalConfig {
    pub fn from_env() -> Self {
        let csrf_secret = std::env::var("PORTAL_CSRF_SECRET").unwrap_or_default();
        let cookie_secure = std::env::var("PORTAL_COOKIE_SECURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let session_ttl_hours = env_or("PORTAL_SESSION_TTL_HOURS", 168);
        let rate_limit_max = env_or("PORTAL_RATE_LIMIT_MAX", 10);
        let rate_limit_window_secs = env_or("PORTAL_RATE_LIMIT_WINDOW", 60);
        let rate_limit_backend = std::env::var("PORTAL_RATE_LIMIT_BACKEND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(RateLimitBackend::Memory);
        let telegram_bot_token = std::env::var("PORTAL_TELEGRAM_TOKEN").unwrap_or_default();
        let telegram_webhook_secret =
            std::env::var("PORTAL_TELEGRAM_WEBHOOK_SECRET").unwrap_or_default();
        let campaign_poll_secs = env_or("PORTAL_CAMPAIGN_POLL_SECS", 30);
        let admin_email = std::env::var("PORTAL_ADMIN_EMAIL").unwrap_or_default();
        let admin_password = std::env::var("PORTAL_ADMIN_PASSWORD").unwrap_or_default();
        let allowed_origin = std::env::var("PORTAL_ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let csrf_secret = if csrf_secret.is_empty() {
            tracing::warn!("PORTAL_CSRF_SECRET not set -- using a random per-process secret");
            crate::services::auth::random_token()
        } else {
            csrf_secret
        };
        if telegram_bot_token.is_empty() {
            tracing::warn!("PORTAL_TELEGRAM_TOKEN not set -- Telegram delivery disabled");
        }
        if telegram_webhook_secret.is_empty() {
            tracing::warn!(
                "PORTAL_TELEGRAM_WEBHOOK_SECRET not set -- webhook secret validation disabled"
            );
        }

        Self {
            csrf_secret,
            cookie_secure,
            session_ttl_hours,
            rate_limit_max,
            rate_limit_window_secs,
            rate_limit_backend,
            telegram_bot_token,
            telegram_webhook_secret,
            campaign_poll_secs,
            admin_email,
            admin_password,
            allowed_origin,
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            csrf_secret: "test-csrf-secret".to_string(),
            cookie_secure: false,
            session_ttl_hours: 168,
            rate_limit_max: 10,
            rate_limit_window_secs: 60,
            rate_limit_backend: RateLimitBackend::Memory,
            telegram_bot_token: String::new(),
            telegram_webhook_secret: String::new(),
            campaign_poll_secs: 30,
            admin_email: String::new(),
            admin_password: String::new(),
            allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
