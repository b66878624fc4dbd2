//! Database pool setup and the portal schema migration.

use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// Connection pool shared by every handler.
pub type DbPool = Pool<AsyncPgConnection>;

/// SQL migration for the portal tables.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              BIGSERIAL PRIMARY KEY,
    email           VARCHAR(255) NOT NULL UNIQUE,
    password_hash   VARCHAR(255) NOT NULL,
    display_name    VARCHAR(255) NOT NULL,
    role            VARCHAR(32) NOT NULL DEFAULT 'user',
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    failed_logins   INTEGER NOT NULL DEFAULT 0,
    locked_until    TIMESTAMPTZ,
    last_login_at   TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users (role);

CREATE TABLE IF NOT EXISTS sessions (
    id              BIGSERIAL PRIMARY KEY,
    token_hash      VARCHAR(64) NOT NULL UNIQUE,
    user_id         BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    ip              VARCHAR(64),
    user_agent      VARCHAR(512),
    expires_at      TIMESTAMPTZ NOT NULL,
    last_seen_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions (user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions (expires_at);

CREATE TABLE IF NOT EXISTS rate_limits (
    key             VARCHAR(255) PRIMARY KEY,
    count           INTEGER NOT NULL,
    reset_at        TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS security_policies (
    id                  BIGSERIAL PRIMARY KEY,
    key                 VARCHAR(64) NOT NULL UNIQUE,
    password_min_length INTEGER NOT NULL DEFAULT 8,
    session_ttl_hours   INTEGER NOT NULL DEFAULT 168,
    max_login_attempts  INTEGER NOT NULL DEFAULT 5,
    lockout_minutes     INTEGER NOT NULL DEFAULT 15,
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS products (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    slug            VARCHAR(255) NOT NULL UNIQUE,
    description     TEXT,
    price_cents     BIGINT NOT NULL,
    currency        VARCHAR(8) NOT NULL DEFAULT 'USD',
    stock           INTEGER,
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS purchases (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    product_id      BIGINT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    quantity        INTEGER NOT NULL,
    total_cents     BIGINT NOT NULL,
    status          VARCHAR(32) NOT NULL DEFAULT 'completed',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_purchases_user ON purchases (user_id);

CREATE TABLE IF NOT EXISTS contents (
    id              BIGSERIAL PRIMARY KEY,
    kind            VARCHAR(32) NOT NULL,
    title           VARCHAR(255) NOT NULL,
    slug            VARCHAR(255) NOT NULL UNIQUE,
    summary         TEXT,
    body            TEXT NOT NULL DEFAULT '',
    cover_url       VARCHAR(1024),
    metadata        JSONB,
    starts_at       TIMESTAMPTZ,
    ends_at         TIMESTAMPTZ,
    location        VARCHAR(255),
    published       BOOLEAN NOT NULL DEFAULT FALSE,
    author_id       BIGINT REFERENCES users(id) ON DELETE SET NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_contents_kind ON contents (kind);
CREATE INDEX IF NOT EXISTS idx_contents_starts ON contents (starts_at);

CREATE TABLE IF NOT EXISTS semesters (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL UNIQUE,
    starts_on       DATE NOT NULL,
    ends_on         DATE NOT NULL,
    is_current      BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS hall_of_fame (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT REFERENCES users(id) ON DELETE SET NULL,
    name            VARCHAR(255) NOT NULL,
    title           VARCHAR(255) NOT NULL,
    description     TEXT,
    image_url       VARCHAR(1024),
    rank            INTEGER NOT NULL,
    semester_id     BIGINT REFERENCES semesters(id) ON DELETE SET NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS roadmaps (
    id              BIGSERIAL PRIMARY KEY,
    title           VARCHAR(255) NOT NULL,
    slug            VARCHAR(255) NOT NULL UNIQUE,
    description     TEXT,
    published       BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS roadmap_levels (
    id              BIGSERIAL PRIMARY KEY,
    roadmap_id      BIGINT NOT NULL REFERENCES roadmaps(id) ON DELETE CASCADE,
    title           VARCHAR(255) NOT NULL,
    position        INTEGER NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS roadmap_milestones (
    id              BIGSERIAL PRIMARY KEY,
    level_id        BIGINT NOT NULL REFERENCES roadmap_levels(id) ON DELETE CASCADE,
    title           VARCHAR(255) NOT NULL,
    description     TEXT,
    position        INTEGER NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS roadmap_challenges (
    id              BIGSERIAL PRIMARY KEY,
    milestone_id    BIGINT NOT NULL REFERENCES roadmap_milestones(id) ON DELETE CASCADE,
    title           VARCHAR(255) NOT NULL,
    description     TEXT,
    points          INTEGER NOT NULL DEFAULT 0,
    position        INTEGER NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS enrollments (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    roadmap_id      BIGINT NOT NULL REFERENCES roadmaps(id) ON DELETE CASCADE,
    semester_id     BIGINT REFERENCES semesters(id) ON DELETE SET NULL,
    status          VARCHAR(32) NOT NULL DEFAULT 'active',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (user_id, roadmap_id)
);

CREATE TABLE IF NOT EXISTS challenge_completions (
    id              BIGSERIAL PRIMARY KEY,
    enrollment_id   BIGINT NOT NULL REFERENCES enrollments(id) ON DELETE CASCADE,
    challenge_id    BIGINT NOT NULL REFERENCES roadmap_challenges(id) ON DELETE CASCADE,
    completed_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (enrollment_id, challenge_id)
);

CREATE TABLE IF NOT EXISTS telegram_users (
    id              BIGSERIAL PRIMARY KEY,
    telegram_id     BIGINT NOT NULL UNIQUE,
    chat_id         BIGINT NOT NULL,
    username        VARCHAR(255),
    user_id         BIGINT REFERENCES users(id) ON DELETE SET NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS notification_templates (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL UNIQUE,
    subject         VARCHAR(255) NOT NULL,
    body            TEXT NOT NULL,
    channel         VARCHAR(32) NOT NULL DEFAULT 'in_app',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS notification_campaigns (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    template_id     BIGINT NOT NULL REFERENCES notification_templates(id) ON DELETE CASCADE,
    audience        VARCHAR(64) NOT NULL DEFAULT 'all',
    status          VARCHAR(32) NOT NULL DEFAULT 'draft',
    scheduled_at    TIMESTAMPTZ,
    sent_at         TIMESTAMPTZ,
    recipients      INTEGER NOT NULL DEFAULT 0,
    failures        INTEGER NOT NULL DEFAULT 0,
    created_by      BIGINT REFERENCES users(id) ON DELETE SET NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_campaigns_due ON notification_campaigns (status, scheduled_at);

CREATE TABLE IF NOT EXISTS user_notifications (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    campaign_id     BIGINT REFERENCES notification_campaigns(id) ON DELETE SET NULL,
    subject         TEXT NOT NULL,
    body            TEXT NOT NULL,
    read_at         TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_user_notifications_user ON user_notifications (user_id, created_at DESC);

-- Rendered subjects embed recipient names and can outgrow the template.
ALTER TABLE user_notifications ALTER COLUMN subject TYPE TEXT;

CREATE TABLE IF NOT EXISTS workflows (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    trigger_event   VARCHAR(64) NOT NULL,
    template_id     BIGINT NOT NULL REFERENCES notification_templates(id) ON DELETE CASCADE,
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    runs            INTEGER NOT NULL DEFAULT 0,
    last_run_at     TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_workflows_trigger ON workflows (trigger_event) WHERE active;

CREATE TABLE IF NOT EXISTS journals (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title           VARCHAR(255) NOT NULL,
    body            TEXT NOT NULL DEFAULT '',
    mood            SMALLINT,
    entry_date      DATE NOT NULL DEFAULT CURRENT_DATE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_journals_user ON journals (user_id, entry_date DESC);
"#;

/// Build the connection pool. No connection is opened until first use.
pub fn connect_to_database(database_url: &str, max_connections: usize) -> anyhow::Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder(manager)
        .max_size(max_connections)
        .build()
        .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))
}

/// Create every portal table.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("portal migration failed: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_notification_subjects_are_unbounded() {
        let table = MIGRATION_SQL
            .split("CREATE TABLE IF NOT EXISTS user_notifications")
            .nth(1)
            .and_then(|rest| rest.split(");").next())
            .unwrap();
        assert!(table.contains("subject         TEXT NOT NULL"));
        assert!(MIGRATION_SQL.contains("ALTER TABLE user_notifications ALTER COLUMN subject TYPE TEXT;"));
    }
}
