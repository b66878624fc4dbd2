//! journals: private per-user journal entries.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::journals;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = journals)]
pub struct Journal {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub mood: Option<i16>,
    pub entry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = journals)]
pub struct NewJournal {
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub mood: Option<i16>,
    pub entry_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct JournalRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub mood: Option<i16>,
    pub entry_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = journals)]
pub struct JournalChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub mood: Option<i16>,
    pub entry_date: Option<NaiveDate>,
}

fn check_mood(mood: Option<i16>) -> Result<(), String> {
    match mood {
        Some(m) if !(1..=5).contains(&m) => Err("mood must be between 1 and 5".to_string()),
        _ => Ok(()),
    }
}

impl JournalRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        check_mood(self.mood)
    }
}

impl JournalChanges {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty".to_string());
        }
        check_mood(self.mood)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_is_bounded() {
        let mut req = JournalRequest {
            title: "Monday".to_string(),
            body: String::new(),
            mood: Some(6),
            entry_date: None,
        };
        assert!(req.validate().is_err());
        req.mood = Some(3);
        assert!(req.validate().is_ok());
        req.mood = None;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn blank_title_is_rejected() {
        let changes = JournalChanges {
            title: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(changes.validate().is_err());
    }
}
