//! telegram_users: Telegram accounts known to the bot, optionally linked.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::telegram_users;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = telegram_users)]
pub struct TelegramUser {
    pub id: i64,
    pub telegram_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Insertable)]
#[diesel(table_name = telegram_users)]
pub struct NewTelegramUser {
    pub telegram_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    #[serde(skip_deserializing)]
    pub user_id: Option<i64>,
}

/// Subset of a Telegram Bot API `Update` the webhook cares about.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    pub from: Option<TelegramFrom>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramFrom {
    pub id: i64,
    pub username: Option<String>,
}

impl TelegramUpdate {
    /// The sender to upsert, if the update carries a message with a sender.
    pub fn sender(&self) -> Option<NewTelegramUser> {
        let message = self.message.as_ref()?;
        let from = message.from.as_ref()?;
        Some(NewTelegramUser {
            telegram_id: from.id,
            chat_id: message.chat.id,
            username: from.username.clone(),
            user_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_is_extracted_from_message() {
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": { "id": 555, "type": "private" },
                "from": { "id": 42, "is_bot": false, "username": "ada" },
                "text": "/start"
            }
        }))
        .unwrap();

        let sender = update.sender().unwrap();
        assert_eq!(sender.telegram_id, 42);
        assert_eq!(sender.chat_id, 555);
        assert_eq!(sender.username.as_deref(), Some("ada"));
    }

    #[test]
    fn updates_without_message_have_no_sender() {
        let update: TelegramUpdate =
            serde_json::from_value(serde_json::json!({ "update_id": 11 })).unwrap();
        assert!(update.sender().is_none());
    }
}
