//! semesters + hall_of_fame: academic terms and the recognition board.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{hall_of_fame, semesters};

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = semesters)]
pub struct Semester {
    pub id: i64,
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = semesters)]
pub struct NewSemester {
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    #[serde(default)]
    pub is_current: bool,
}

impl NewSemester {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if self.ends_on < self.starts_on {
            return Err("ends_on must not precede starts_on".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = semesters)]
pub struct SemesterChanges {
    pub name: Option<String>,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub is_current: Option<bool>,
}

impl SemesterChanges {
    pub fn validate(&self, current: &Semester) -> Result<(), String> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err("name must not be empty".to_string());
        }
        let starts_on = self.starts_on.unwrap_or(current.starts_on);
        let ends_on = self.ends_on.unwrap_or(current.ends_on);
        if ends_on < starts_on {
            return Err("ends_on must not precede starts_on".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = hall_of_fame)]
pub struct HallOfFameEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub rank: i32,
    pub semester_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = hall_of_fame)]
pub struct NewHallOfFameEntry {
    pub user_id: Option<i64>,
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub rank: i32,
    pub semester_id: Option<i64>,
}

impl NewHallOfFameEntry {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() || self.title.trim().is_empty() {
            return Err("name and title are required".to_string());
        }
        if self.rank < 1 {
            return Err("rank must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = hall_of_fame)]
pub struct HallOfFameChanges {
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub rank: Option<i32>,
    pub semester_id: Option<i64>,
}

impl HallOfFameChanges {
    pub fn validate(&self) -> Result<(), String> {
        if self.rank.is_some_and(|r| r < 1) {
            return Err("rank must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn semester_dates_must_be_ordered() {
        let semester = NewSemester {
            name: "Fall 2026".to_string(),
            starts_on: date("2026-09-01"),
            ends_on: date("2026-08-01"),
            is_current: false,
        };
        assert!(semester.validate().is_err());
    }

    #[test]
    fn partial_update_checks_against_stored_dates() {
        let current = Semester {
            id: 1,
            name: "Fall 2026".to_string(),
            starts_on: date("2026-09-01"),
            ends_on: date("2026-12-20"),
            is_current: true,
            created_at: Utc::now(),
        };
        let changes = SemesterChanges {
            ends_on: Some(date("2026-08-31")),
            ..Default::default()
        };
        assert!(changes.validate(&current).is_err());

        let changes = SemesterChanges {
            ends_on: Some(date("2027-01-10")),
            ..Default::default()
        };
        assert!(changes.validate(&current).is_ok());
    }

    #[test]
    fn hall_of_fame_rank_starts_at_one() {
        let entry: NewHallOfFameEntry = serde_json::from_value(serde_json::json!({
            "name": "Grace",
            "title": "Top contributor",
            "rank": 0,
        }))
        .unwrap();
        assert!(entry.validate().is_err());
    }
}
