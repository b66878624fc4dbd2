//! users: portal accounts (members and admins).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::users;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

/// Roles accepted by the API.
pub fn is_valid_role(role: &str) -> bool {
    matches!(role, ROLE_USER | ROLE_ADMIN)
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
    pub failed_logins: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub active: Option<bool>,
    pub password_hash: Option<String>,
}

/// Request body for creating a user (admin) or registering (self).
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub active: Option<bool>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str, locked_until: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: 1,
            email: "ada@example.com".to_string(),
            password_hash: "secret".to_string(),
            display_name: "Ada".to_string(),
            role: role.to_string(),
            active: true,
            failed_logins: 0,
            locked_until,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(user(ROLE_USER, None)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "ada@example.com");
    }

    #[test]
    fn lock_expires() {
        let now = Utc::now();
        assert!(user(ROLE_USER, Some(now + chrono::Duration::minutes(5))).is_locked(now));
        assert!(!user(ROLE_USER, Some(now - chrono::Duration::minutes(5))).is_locked(now));
        assert!(!user(ROLE_USER, None).is_locked(now));
    }

    #[test]
    fn roles() {
        assert!(user(ROLE_ADMIN, None).is_admin());
        assert!(!user(ROLE_USER, None).is_admin());
        assert!(is_valid_role("admin"));
        assert!(!is_valid_role("superuser"));
    }
}
