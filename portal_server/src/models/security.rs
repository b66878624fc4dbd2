//! sessions + security_policies: login sessions and the portal-wide policy.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{security_policies, sessions};

/// Key of the single policy row.
pub const DEFAULT_POLICY_KEY: &str = "default";

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub id: i64,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub user_id: i64,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub token_hash: String,
    pub user_id: i64,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = security_policies)]
pub struct SecurityPolicy {
    #[serde(skip_serializing)]
    pub id: i64,
    #[serde(skip_serializing)]
    pub key: String,
    pub password_min_length: i32,
    pub session_ttl_hours: i32,
    pub max_login_attempts: i32,
    pub lockout_minutes: i32,
    pub updated_at: DateTime<Utc>,
}

impl SecurityPolicy {
    /// Policy used before the seeded row exists.
    pub fn fallback(session_ttl_hours: i64) -> Self {
        Self {
            id: 0,
            key: DEFAULT_POLICY_KEY.to_string(),
            password_min_length: 8,
            session_ttl_hours: session_ttl_hours.clamp(1, i32::MAX as i64) as i32,
            max_login_attempts: 5,
            lockout_minutes: 15,
            updated_at: Utc::now(),
        }
    }

    pub fn check_password(&self, password: &str) -> Result<(), String> {
        let min = self.password_min_length.max(1) as usize;
        if password.chars().count() < min {
            return Err(format!("Password must be at least {min} characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = security_policies)]
pub struct PolicyChanges {
    pub password_min_length: Option<i32>,
    pub session_ttl_hours: Option<i32>,
    pub max_login_attempts: Option<i32>,
    pub lockout_minutes: Option<i32>,
}

impl PolicyChanges {
    pub fn validate(&self) -> Result<(), String> {
        fn in_range(name: &str, value: Option<i32>, min: i32, max: i32) -> Result<(), String> {
            match value {
                Some(v) if v < min || v > max => {
                    Err(format!("{name} must be between {min} and {max}"))
                }
                _ => Ok(()),
            }
        }

        in_range("password_min_length", self.password_min_length, 6, 128)?;
        in_range("session_ttl_hours", self.session_ttl_hours, 1, 24 * 90)?;
        in_range("max_login_attempts", self.max_login_attempts, 1, 100)?;
        in_range("lockout_minutes", self.lockout_minutes, 1, 24 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_length_counts_characters() {
        let policy = SecurityPolicy::fallback(24);
        assert!(policy.check_password("short").is_err());
        assert!(policy.check_password("longenough").is_ok());
        assert!(policy.check_password("ééééééé").is_err());
        assert!(policy.check_password("éééééééé").is_ok());
    }

    #[test]
    fn policy_ranges_are_enforced() {
        let changes = PolicyChanges {
            password_min_length: Some(4),
            ..Default::default()
        };
        assert!(changes.validate().is_err());

        let changes = PolicyChanges {
            session_ttl_hours: Some(12),
            lockout_minutes: Some(30),
            ..Default::default()
        };
        assert!(changes.validate().is_ok());
    }
}
