//! Telegram integration: bot messages and account linking.

use std::time::Duration;

use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::ApiError;
use crate::models::telegram::{NewTelegramUser, TelegramUser};
use crate::schema::telegram_users;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Upper bound for one Bot API call.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin Bot API client. Without a token every send is skipped.
#[derive(Clone)]
pub struct TelegramClient {
    token: String,
    http: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            token: token.to_string(),
            http,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.token.is_empty()
    }

    /// Send a text message. Returns `Ok(false)` when delivery is disabled.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<bool> {
        if !self.is_configured() {
            tracing::debug!("Telegram token not set, skipping message");
            return Ok(false);
        }

        let url = format!("{TELEGRAM_API}/bot{}/sendMessage", self.token);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage failed: {status} {text}");
        }
        Ok(true)
    }
}

/// Validate the webhook secret header. An unset secret accepts everything.
pub fn validate_webhook_secret(expected: &str, received: Option<&str>) -> bool {
    if expected.is_empty() {
        return true;
    }
    received.is_some_and(|r| crate::services::auth::constant_time_eq(expected.as_bytes(), r.as_bytes()))
}

/// Insert or refresh a Telegram sender. Keeps any existing account link.
pub async fn upsert_sender(
    conn: &mut AsyncPgConnection,
    sender: &NewTelegramUser,
) -> anyhow::Result<TelegramUser> {
    let result = diesel::insert_into(telegram_users::table)
        .values(sender)
        .on_conflict(telegram_users::telegram_id)
        .do_update()
        .set((
            telegram_users::chat_id.eq(excluded(telegram_users::chat_id)),
            telegram_users::username.eq(excluded(telegram_users::username)),
            telegram_users::updated_at.eq(Utc::now()),
        ))
        .returning(TelegramUser::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

/// A known account may be (re)linked only by the user that owns it, or by
/// anyone when it is unlinked. `owner` is `None` for unknown accounts.
pub fn check_link_owner(owner: Option<Option<i64>>, user_id: i64) -> Result<(), ApiError> {
    match owner {
        Some(Some(owner)) if owner != user_id => {
            Err(ApiError::conflict("Telegram account is linked to another user"))
        }
        _ => Ok(()),
    }
}

/// Link a Telegram account to a portal user. Re-linking the same pair is a
/// no-op; an account linked to someone else answers 409.
pub async fn link(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    mut account: NewTelegramUser,
) -> anyhow::Result<TelegramUser> {
    let owner: Option<Option<i64>> = telegram_users::table
        .filter(telegram_users::telegram_id.eq(account.telegram_id))
        .select(telegram_users::user_id)
        .first(conn)
        .await
        .optional()?;
    check_link_owner(owner, user_id)?;

    // One Telegram account per portal user.
    diesel::update(
        telegram_users::table
            .filter(telegram_users::user_id.eq(user_id))
            .filter(telegram_users::telegram_id.ne(account.telegram_id)),
    )
    .set(telegram_users::user_id.eq(None::<i64>))
    .execute(conn)
    .await?;

    account.user_id = Some(user_id);
    let result = diesel::insert_into(telegram_users::table)
        .values(&account)
        .on_conflict(telegram_users::telegram_id)
        .do_update()
        .set((
            telegram_users::chat_id.eq(excluded(telegram_users::chat_id)),
            telegram_users::username.eq(excluded(telegram_users::username)),
            telegram_users::user_id.eq(excluded(telegram_users::user_id)),
            telegram_users::updated_at.eq(Utc::now()),
        ))
        .returning(TelegramUser::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(user_id, telegram_id = result.telegram_id, "Telegram account linked");
    Ok(result)
}

pub async fn unlink(conn: &mut AsyncPgConnection, user_id: i64) -> anyhow::Result<bool> {
    let updated = diesel::update(telegram_users::table.filter(telegram_users::user_id.eq(user_id)))
        .set((
            telegram_users::user_id.eq(None::<i64>),
            telegram_users::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(updated > 0)
}

pub async fn list_users(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<TelegramUser>> {
    let results = telegram_users::table
        .order(telegram_users::id.desc())
        .select(TelegramUser::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// Chat ids of the linked Telegram accounts for the given users.
pub async fn chat_ids_for(
    conn: &mut AsyncPgConnection,
    user_ids: &[i64],
) -> anyhow::Result<Vec<(i64, i64)>> {
    let rows: Vec<(Option<i64>, i64)> = telegram_users::table
        .filter(telegram_users::user_id.eq_any(user_ids))
        .select((telegram_users::user_id, telegram_users::chat_id))
        .load(conn)
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|(user_id, chat_id)| user_id.map(|u| (u, chat_id)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_secret() {
        assert!(validate_webhook_secret("", None));
        assert!(validate_webhook_secret("abc", Some("abc")));
        assert!(!validate_webhook_secret("abc", Some("abd")));
        assert!(!validate_webhook_secret("abc", None));
    }

    #[test]
    fn relinking_the_same_pair_is_allowed() {
        assert!(check_link_owner(None, 7).is_ok());
        assert!(check_link_owner(Some(None), 7).is_ok());
        assert!(check_link_owner(Some(Some(7)), 7).is_ok());
    }

    #[test]
    fn accounts_owned_by_someone_else_conflict() {
        let err = check_link_owner(Some(Some(8)), 7).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unconfigured_client_skips_delivery() {
        let client = TelegramClient::new("").unwrap();
        assert!(!client.is_configured());
        assert!(!client.send_message(1, "hello").await.unwrap());
    }
}
