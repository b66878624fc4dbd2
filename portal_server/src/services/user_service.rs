//! User administration and self-service profile changes.

use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::ApiError;
use crate::models::user::{NewUser, User, UserChanges};
use crate::models::{PageQuery, Paged};
use crate::schema::users;

#[derive(Debug, Default, serde::Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<String>,
}

/// Paged user list, optionally filtered by email/name substring and role.
pub async fn list_users(
    conn: &mut AsyncPgConnection,
    filter: &UserFilter,
    page: PageQuery,
) -> anyhow::Result<Paged<User>> {
    let build = || {
        let mut query: users::BoxedQuery<'_, Pg> = users::table.into_boxed();
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim());
            query = query.filter(
                users::email
                    .ilike(pattern.clone())
                    .or(users::display_name.ilike(pattern)),
            );
        }
        if let Some(role) = filter.role.as_deref() {
            query = query.filter(users::role.eq(role.to_string()));
        }
        query
    };

    let total: i64 = build().count().get_result(conn).await?;
    let items = build()
        .order(users::id.asc())
        .limit(page.limit())
        .offset(page.offset())
        .select(User::as_select())
        .load(conn)
        .await?;

    Ok(Paged {
        items,
        total,
        page: page.page.unwrap_or(1).max(1),
        per_page: page.limit(),
    })
}

pub async fn get_user(conn: &mut AsyncPgConnection, user_id: i64) -> anyhow::Result<User> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("User").into())
}

/// Insert a user, answering 409 when the email is taken.
pub async fn create_user(conn: &mut AsyncPgConnection, new_user: NewUser) -> anyhow::Result<User> {
    let exists: i64 = users::table
        .filter(users::email.eq(&new_user.email))
        .count()
        .get_result(conn)
        .await?;
    if exists > 0 {
        return Err(ApiError::conflict("Email already registered").into());
    }

    let user = diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(user_id = user.id, role = %user.role, "User created");
    Ok(user)
}

pub async fn update_user(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    changes: &UserChanges,
) -> anyhow::Result<User> {
    let user = diesel::update(users::table.find(user_id))
        .set((changes, users::updated_at.eq(Utc::now())))
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .optional()?
        .ok_or(ApiError::not_found("User"))?;
    Ok(user)
}

pub async fn delete_user(conn: &mut AsyncPgConnection, user_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(users::table.find(user_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("User").into());
    }
    tracing::info!(user_id, "User deleted");
    Ok(())
}

/// Clear a lockout and the failed login counter.
pub async fn unlock_user(conn: &mut AsyncPgConnection, user_id: i64) -> anyhow::Result<User> {
    let user = diesel::update(users::table.find(user_id))
        .set((
            users::failed_logins.eq(0),
            users::locked_until.eq(None::<chrono::DateTime<Utc>>),
            users::updated_at.eq(Utc::now()),
        ))
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .optional()?
        .ok_or(ApiError::not_found("User"))?;
    Ok(user)
}

/// Normalize an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Display name defaults to the email's local part.
pub fn default_display_name(email: &str, display_name: Option<&str>) -> String {
    display_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn display_name_falls_back_to_local_part() {
        assert_eq!(default_display_name("ada@example.com", None), "ada");
        assert_eq!(default_display_name("ada@example.com", Some("  ")), "ada");
        assert_eq!(
            default_display_name("ada@example.com", Some("Ada Lovelace")),
            "Ada Lovelace"
        );
    }
}
