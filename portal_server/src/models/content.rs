//! contents: games, events and articles shown on the portal.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::contents;

pub const KIND_GAME: &str = "game";
pub const KIND_EVENT: &str = "event";
pub const KIND_ARTICLE: &str = "article";

pub fn is_valid_kind(kind: &str) -> bool {
    matches!(kind, KIND_GAME | KIND_EVENT | KIND_ARTICLE)
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = contents)]
pub struct Content {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub body: String,
    pub cover_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub published: bool,
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = contents)]
pub struct NewContent {
    pub kind: String,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub body: String,
    pub cover_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(skip_deserializing)]
    pub author_id: Option<i64>,
}

impl NewContent {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_kind(&self.kind) {
            return Err(format!("unknown content kind: {}", self.kind));
        }
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        super::validate_slug(&self.slug)?;
        if self.kind == KIND_EVENT && self.starts_at.is_none() {
            return Err("events require starts_at".to_string());
        }
        validate_window(self.starts_at, self.ends_at)
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = contents)]
pub struct ContentChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub cover_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub published: Option<bool>,
}

impl ContentChanges {
    /// Validate against the stored record so partial updates keep the
    /// event window consistent.
    pub fn validate(&self, current: &Content) -> Result<(), String> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty".to_string());
        }
        if let Some(slug) = &self.slug {
            super::validate_slug(slug)?;
        }
        validate_window(
            self.starts_at.or(current.starts_at),
            self.ends_at.or(current.ends_at),
        )
    }
}

fn validate_window(
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
) -> Result<(), String> {
    match (starts_at, ends_at) {
        (Some(start), Some(end)) if end < start => {
            Err("ends_at must not precede starts_at".to_string())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> NewContent {
        NewContent {
            kind: KIND_EVENT.to_string(),
            title: "Launch party".to_string(),
            slug: "launch-party".to_string(),
            summary: None,
            body: String::new(),
            cover_url: None,
            metadata: None,
            starts_at,
            ends_at,
            location: None,
            published: true,
            author_id: None,
        }
    }

    #[test]
    fn events_need_a_start() {
        assert!(event(None, None).validate().is_err());
        assert!(event(Some(Utc::now()), None).validate().is_ok());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let start = Utc::now();
        let end = start - chrono::Duration::hours(1);
        assert!(event(Some(start), Some(end)).validate().is_err());
    }

    #[test]
    fn games_do_not_need_dates() {
        let mut game = event(None, None);
        game.kind = KIND_GAME.to_string();
        assert!(game.validate().is_ok());

        game.kind = "podcast".to_string();
        assert!(game.validate().is_err());
    }
}
