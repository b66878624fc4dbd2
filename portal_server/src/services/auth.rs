//! Sessions, password hashing and login bookkeeping.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::models::security::{
    NewSession, PolicyChanges, SecurityPolicy, Session, DEFAULT_POLICY_KEY,
};
use crate::models::user::User;
use crate::schema::{security_policies, sessions, users};

pub const SESSION_COOKIE: &str = "bb_session";

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_SIZE: usize = 16;
const HASH_SIZE: usize = 32;
const HASH_SCHEME: &str = "pbkdf2-sha256";

/// 32 random bytes, hex encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sessions are stored by the SHA-256 of their token, never the token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Hash a password as `pbkdf2-sha256$<iterations>$<salt-hex>$<hash-hex>`.
pub fn hash_password(password: &str) -> String {
    hash_password_with(password, PBKDF2_ITERATIONS)
}

fn hash_password_with(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let mut derived = [0u8; HASH_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut derived);

    format!(
        "{HASH_SCHEME}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(derived)
    )
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
        return false;
    };
    if iterations == 0 || expected.len() != HASH_SIZE {
        return false;
    }

    let mut derived = [0u8; HASH_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut derived);
    constant_time_eq(&derived, &expected)
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `Set-Cookie` value for a new session.
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that clears the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Find a cookie value in a `Cookie` request header.
pub fn read_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}

// ── Policy ──

/// Load the portal security policy, falling back to defaults before seeding.
pub async fn load_policy(
    conn: &mut AsyncPgConnection,
    fallback_ttl_hours: i64,
) -> anyhow::Result<SecurityPolicy> {
    let policy = security_policies::table
        .filter(security_policies::key.eq(DEFAULT_POLICY_KEY))
        .select(SecurityPolicy::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(policy.unwrap_or_else(|| SecurityPolicy::fallback(fallback_ttl_hours)))
}

/// Insert the default policy row unless it already exists.
pub async fn ensure_policy(
    conn: &mut AsyncPgConnection,
    fallback_ttl_hours: i64,
) -> anyhow::Result<()> {
    let defaults = SecurityPolicy::fallback(fallback_ttl_hours);
    diesel::insert_into(security_policies::table)
        .values((
            security_policies::key.eq(DEFAULT_POLICY_KEY),
            security_policies::password_min_length.eq(defaults.password_min_length),
            security_policies::session_ttl_hours.eq(defaults.session_ttl_hours),
            security_policies::max_login_attempts.eq(defaults.max_login_attempts),
            security_policies::lockout_minutes.eq(defaults.lockout_minutes),
        ))
        .on_conflict(security_policies::key)
        .do_nothing()
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_policy(
    conn: &mut AsyncPgConnection,
    changes: &PolicyChanges,
    fallback_ttl_hours: i64,
) -> anyhow::Result<SecurityPolicy> {
    ensure_policy(conn, fallback_ttl_hours).await?;
    let policy = diesel::update(
        security_policies::table.filter(security_policies::key.eq(DEFAULT_POLICY_KEY)),
    )
    .set((changes, security_policies::updated_at.eq(Utc::now())))
    .returning(SecurityPolicy::as_returning())
    .get_result(conn)
    .await?;

    tracing::info!(
        password_min_length = policy.password_min_length,
        session_ttl_hours = policy.session_ttl_hours,
        max_login_attempts = policy.max_login_attempts,
        lockout_minutes = policy.lockout_minutes,
        "Security policy updated"
    );
    Ok(policy)
}

// ── Sessions ──

/// Create a session for a user and return the raw token for the cookie.
pub async fn create_session(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    ttl_hours: i64,
    ip: Option<String>,
    user_agent: Option<String>,
) -> anyhow::Result<(String, Session)> {
    let token = random_token();
    let new_session = NewSession {
        token_hash: hash_token(&token),
        user_id,
        ip,
        user_agent: user_agent.map(|ua| ua.chars().take(512).collect()),
        expires_at: Utc::now() + Duration::hours(ttl_hours),
    };

    let session = diesel::insert_into(sessions::table)
        .values(&new_session)
        .returning(Session::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(user_id, session_id = session.id, "Session created");
    Ok((token, session))
}

/// Resolve a raw session token to its live session and active user.
pub async fn find_session_user(
    conn: &mut AsyncPgConnection,
    token: &str,
) -> anyhow::Result<Option<(Session, User)>> {
    let now = Utc::now();
    let found = sessions::table
        .inner_join(users::table)
        .filter(sessions::token_hash.eq(hash_token(token)))
        .filter(sessions::expires_at.gt(now))
        .filter(users::active.eq(true))
        .select((Session::as_select(), User::as_select()))
        .first::<(Session, User)>(conn)
        .await
        .optional()?;

    if let Some((session, _)) = &found {
        diesel::update(sessions::table.find(session.id))
            .set(sessions::last_seen_at.eq(now))
            .execute(conn)
            .await?;
    }

    Ok(found)
}

pub async fn delete_session(conn: &mut AsyncPgConnection, session_id: i64) -> anyhow::Result<()> {
    diesel::delete(sessions::table.find(session_id))
        .execute(conn)
        .await?;
    Ok(())
}

/// List a user's unexpired sessions, newest first.
pub async fn list_sessions(
    conn: &mut AsyncPgConnection,
    user_id: i64,
) -> anyhow::Result<Vec<Session>> {
    let results = sessions::table
        .filter(sessions::user_id.eq(user_id))
        .filter(sessions::expires_at.gt(Utc::now()))
        .order(sessions::last_seen_at.desc())
        .select(Session::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// Revoke one of the user's own sessions. Returns false if it was not theirs.
pub async fn revoke_session(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    session_id: i64,
) -> anyhow::Result<bool> {
    let deleted = diesel::delete(
        sessions::table
            .filter(sessions::id.eq(session_id))
            .filter(sessions::user_id.eq(user_id)),
    )
    .execute(conn)
    .await?;
    Ok(deleted > 0)
}

/// Revoke every session of a user except `keep`.
pub async fn revoke_other_sessions(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    keep: Option<i64>,
) -> anyhow::Result<usize> {
    let mut query = diesel::delete(sessions::table)
        .filter(sessions::user_id.eq(user_id))
        .into_boxed();
    if let Some(keep) = keep {
        query = query.filter(sessions::id.ne(keep));
    }
    let deleted = query.execute(conn).await?;
    Ok(deleted)
}

/// Delete expired sessions and report how many are still live.
pub async fn vacuum_sessions(conn: &mut AsyncPgConnection) -> anyhow::Result<(usize, i64)> {
    let now = Utc::now();
    let deleted = diesel::delete(sessions::table.filter(sessions::expires_at.le(now)))
        .execute(conn)
        .await?;
    let live: i64 = sessions::table
        .filter(sessions::expires_at.gt(now))
        .count()
        .get_result(conn)
        .await?;
    Ok((deleted, live))
}

// ── Login bookkeeping ──

pub async fn find_user_by_email(
    conn: &mut AsyncPgConnection,
    email: &str,
) -> anyhow::Result<Option<User>> {
    let result = users::table
        .filter(users::email.eq(email))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(result)
}

/// When a failed login should lock the account, if at all.
pub fn lock_after_failure(
    failed_logins: i32,
    policy: &SecurityPolicy,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    (failed_logins >= policy.max_login_attempts.max(1))
        .then(|| now + Duration::minutes(policy.lockout_minutes as i64))
}

/// Count a failed login, locking the account once the policy limit is hit.
pub async fn record_login_failure(
    conn: &mut AsyncPgConnection,
    user: &User,
    policy: &SecurityPolicy,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    let failed_logins = user.failed_logins + 1;
    let locked_until = lock_after_failure(failed_logins, policy, Utc::now());

    // A lock resets the counter so the next window starts fresh.
    let stored_failures = if locked_until.is_some() { 0 } else { failed_logins };

    diesel::update(users::table.find(user.id))
        .set((
            users::failed_logins.eq(stored_failures),
            users::locked_until.eq(locked_until.or(user.locked_until)),
        ))
        .execute(conn)
        .await?;

    if locked_until.is_some() {
        tracing::warn!(user_id = user.id, "Account locked after repeated login failures");
    }
    Ok(locked_until)
}

pub async fn record_login_success(conn: &mut AsyncPgConnection, user_id: i64) -> anyhow::Result<()> {
    diesel::update(users::table.find(user_id))
        .set((
            users::failed_logins.eq(0),
            users::locked_until.eq(None::<DateTime<Utc>>),
            users::last_login_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let stored = hash_password_with("correct horse", 1_000);
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("battery staple", &stored));
    }

    #[test]
    fn salts_differ_per_hash() {
        let a = hash_password_with("same", 1_000);
        let b = hash_password_with("same", 1_000);
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "plaintext"));
        assert!(!verify_password("x", "bcrypt$10$aa$bb"));
        assert!(!verify_password("x", "pbkdf2-sha256$0$aa$bb"));
        assert!(!verify_password("x", "pbkdf2-sha256$1000$zz$bb"));
    }

    #[test]
    fn token_hash_is_stable_and_not_the_token() {
        let token = random_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
    }

    #[test]
    fn cookies_are_parsed_from_header() {
        let header = "theme=dark; bb_session=abc123; bb_csrf=tok";
        assert_eq!(read_cookie(header, SESSION_COOKIE), Some("abc123"));
        assert_eq!(read_cookie(header, "bb_csrf"), Some("tok"));
        assert_eq!(read_cookie(header, "missing"), None);
        assert_eq!(read_cookie("bb_session=", SESSION_COOKIE), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("tok", 3600, true);
        assert!(cookie.starts_with("bb_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }

    #[test]
    fn lockout_after_policy_limit() {
        let policy = SecurityPolicy::fallback(24);
        let now = Utc::now();
        assert_eq!(lock_after_failure(4, &policy, now), None);
        assert_eq!(
            lock_after_failure(5, &policy, now),
            Some(now + Duration::minutes(15))
        );
    }
}
