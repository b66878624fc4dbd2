//! Startup seed data: default security policy and the bootstrap admin.

use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::config::PortalConfig;
use crate::models::user::{NewUser, ROLE_ADMIN};
use crate::schema::users;
use crate::services::{auth, user_service};

/// Seed the portal. Idempotent: existing rows are left untouched.
pub async fn seed(conn: &mut AsyncPgConnection, config: &PortalConfig) -> anyhow::Result<()> {
    auth::ensure_policy(conn, config.session_ttl_hours).await?;

    if config.admin_email.is_empty() || config.admin_password.is_empty() {
        tracing::debug!("No bootstrap admin configured");
        return Ok(());
    }

    let email = user_service::normalize_email(&config.admin_email);
    let inserted = diesel::insert_into(users::table)
        .values(&NewUser {
            display_name: user_service::default_display_name(&email, None),
            email: email.clone(),
            password_hash: auth::hash_password(&config.admin_password),
            role: ROLE_ADMIN.to_string(),
            active: true,
        })
        .on_conflict(users::email)
        .do_nothing()
        .execute(conn)
        .await?;

    if inserted > 0 {
        tracing::info!(email = %email, "Bootstrap admin created");
    }
    Ok(())
}
