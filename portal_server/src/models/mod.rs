//! Portal data models.

pub mod content;
pub mod enrollment;
pub mod journal;
pub mod notification;
pub mod product;
pub mod roadmap;
pub mod security;
pub mod semester;
pub mod telegram;
pub mod user;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

static SLUG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug regex"));
static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Lowercase words joined by single hyphens.
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.len() > 255 || !SLUG_REGEX.is_match(slug) {
        return Err(format!("invalid slug: {slug:?}"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > 255 || !EMAIL_REGEX.is_match(email) {
        return Err("invalid email address".to_string());
    }
    Ok(())
}

/// Deserialize a nullable field of a partial update: absent stays `None`,
/// an explicit `null` becomes `Some(None)` and clears the column.
pub fn nullable_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Standard `?page=&per_page=` query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    pub const MAX_PER_PAGE: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page.unwrap_or(1).max(1) - 1).saturating_mul(self.limit())
    }
}

/// A page of results with the total match count.
#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs() {
        assert!(validate_slug("summer-game-jam").is_ok());
        assert!(validate_slug("jam2026").is_ok());
        assert!(validate_slug("Summer").is_err());
        assert!(validate_slug("double--dash").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn emails() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("ada@localhost").is_err());
        assert!(validate_email("ada example@x.io").is_err());
    }

    #[test]
    fn paging_is_clamped() {
        let q = PageQuery {
            page: Some(3),
            per_page: Some(500),
        };
        assert_eq!(q.limit(), 100);
        assert_eq!(q.offset(), 200);

        let q = PageQuery {
            page: Some(0),
            per_page: None,
        };
        assert_eq!(q.limit(), 20);
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let q = PageQuery {
            page: Some(i64::MAX),
            per_page: Some(50),
        };
        assert_eq!(q.offset(), i64::MAX);
    }
}
