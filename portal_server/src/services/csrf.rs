//! CSRF token issuance and validation (signed double-submit cookie).
//!
//! A token is `<nonce-hex>.<hmac-hex>` where the HMAC-SHA256 covers the
//! nonce and the caller's session binding. The same token is sent as the
//! `bb_csrf` cookie and echoed by the client in `x-csrf-token`.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_COOKIE: &str = "bb_csrf";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Paths that accept state-changing requests without a CSRF pair.
pub const EXEMPT_PATHS: &[&str] = &[
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/csrf",
    "/api/telegram/webhook",
];

fn mac(secret: &str, nonce: &str, binding: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(nonce.as_bytes());
    mac.update(b"|");
    mac.update(binding.as_bytes());
    Some(mac)
}

/// Issue a token bound to `binding` (the raw session cookie, or empty).
pub fn issue(secret: &str, binding: &str) -> String {
    let mut nonce = [0u8; 16];
    OsRng.fill_bytes(&mut nonce);
    let nonce = hex::encode(nonce);

    let signature = mac(secret, &nonce, binding)
        .map(|m| hex::encode(m.finalize().into_bytes()))
        .unwrap_or_default();

    format!("{nonce}.{signature}")
}

/// Verify a token's signature for `binding`.
pub fn verify(secret: &str, binding: &str, token: &str) -> bool {
    let Some((nonce, signature)) = token.split_once('.') else {
        return false;
    };
    let Ok(signature) = hex::decode(signature) else {
        return false;
    };
    match mac(secret, nonce, binding) {
        Some(m) => m.verify_slice(&signature).is_ok(),
        None => false,
    }
}

/// Both halves of the double submit must be present, equal, and signed.
pub fn validate(secret: &str, binding: &str, cookie: Option<&str>, header: Option<&str>) -> bool {
    match (cookie, header) {
        (Some(cookie), Some(header)) if !cookie.is_empty() => {
            crate::services::auth::constant_time_eq(cookie.as_bytes(), header.as_bytes())
                && verify(secret, binding, header)
        }
        _ => false,
    }
}

/// `Set-Cookie` value for the CSRF token. Readable by scripts so the
/// client can echo it.
pub fn csrf_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Strict");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn requires_check(method: &axum::http::Method, path: &str) -> bool {
    use axum::http::Method;
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) && !EXEMPT_PATHS.contains(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    const SECRET: &str = "s3cret";

    #[test]
    fn issued_tokens_validate() {
        let token = issue(SECRET, "session-a");
        assert!(validate(SECRET, "session-a", Some(&token), Some(&token)));
    }

    #[test]
    fn token_is_bound_to_session() {
        let token = issue(SECRET, "session-a");
        assert!(!validate(SECRET, "session-b", Some(&token), Some(&token)));
    }

    #[test]
    fn wrong_secret_fails() {
        let token = issue(SECRET, "");
        assert!(!validate("other", "", Some(&token), Some(&token)));
    }

    #[test]
    fn header_must_match_cookie() {
        let a = issue(SECRET, "");
        let b = issue(SECRET, "");
        assert!(!validate(SECRET, "", Some(&a), Some(&b)));
        assert!(!validate(SECRET, "", Some(&a), None));
        assert!(!validate(SECRET, "", None, Some(&a)));
    }

    #[test]
    fn tampered_tokens_fail() {
        let token = issue(SECRET, "");
        let (nonce, sig) = token.split_once('.').unwrap();
        let forged = format!("{}.{sig}", nonce.replace('a', "b").replace('0', "1"));
        if forged != token {
            assert!(!verify(SECRET, "", &forged));
        }
        assert!(!verify(SECRET, "", "no-dot"));
        assert!(!verify(SECRET, "", "abc.nothex"));
    }

    #[test]
    fn only_unsafe_methods_outside_exemptions_are_checked() {
        assert!(requires_check(&Method::POST, "/api/products"));
        assert!(requires_check(&Method::DELETE, "/api/journals/1"));
        assert!(!requires_check(&Method::GET, "/api/products"));
        assert!(!requires_check(&Method::POST, "/api/auth/login"));
        assert!(!requires_check(&Method::POST, "/api/telegram/webhook"));
    }
}
