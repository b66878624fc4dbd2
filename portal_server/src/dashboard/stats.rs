//! Aggregate counts for the admin dashboard.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

#[derive(Debug, Serialize, QueryableByName)]
pub struct UserStats {
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = BigInt)]
    pub admins: i64,
    #[diesel(sql_type = BigInt)]
    pub locked: i64,
    #[diesel(sql_type = BigInt)]
    pub active_sessions: i64,
}

pub async fn query_user_stats(conn: &mut AsyncPgConnection) -> anyhow::Result<UserStats> {
    let result = diesel::sql_query(
        "SELECT \
            COUNT(*) AS total, \
            COUNT(*) FILTER (WHERE role = 'admin') AS admins, \
            COUNT(*) FILTER (WHERE locked_until > NOW()) AS locked, \
            (SELECT COUNT(*) FROM sessions WHERE expires_at > NOW()) AS active_sessions \
         FROM users",
    )
    .get_result(conn)
    .await?;
    Ok(result)
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct PurchaseStats {
    #[diesel(sql_type = BigInt)]
    pub count: i64,
    #[diesel(sql_type = BigInt)]
    pub revenue_cents: i64,
}

pub async fn query_purchase_stats(conn: &mut AsyncPgConnection) -> anyhow::Result<PurchaseStats> {
    let result = diesel::sql_query(
        "SELECT \
            COUNT(*) AS count, \
            COALESCE(SUM(total_cents), 0)::BIGINT AS revenue_cents \
         FROM purchases \
         WHERE status = 'completed'",
    )
    .get_result(conn)
    .await?;
    Ok(result)
}

/// A `(label, count)` pair for grouped counts.
#[derive(Debug, Serialize, QueryableByName)]
pub struct LabelCount {
    #[diesel(sql_type = Text)]
    pub label: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub async fn query_content_by_kind(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<LabelCount>> {
    let results = diesel::sql_query(
        "SELECT kind AS label, COUNT(*) AS count FROM contents GROUP BY kind ORDER BY kind",
    )
    .load(conn)
    .await?;
    Ok(results)
}

pub async fn query_enrollments_by_status(
    conn: &mut AsyncPgConnection,
) -> anyhow::Result<Vec<LabelCount>> {
    let results = diesel::sql_query(
        "SELECT status AS label, COUNT(*) AS count FROM enrollments GROUP BY status ORDER BY status",
    )
    .load(conn)
    .await?;
    Ok(results)
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub users: UserStats,
    pub purchases: PurchaseStats,
    pub content_by_kind: Vec<LabelCount>,
    pub enrollments_by_status: Vec<LabelCount>,
}

pub async fn query_dashboard(conn: &mut AsyncPgConnection) -> anyhow::Result<DashboardStats> {
    Ok(DashboardStats {
        users: query_user_stats(conn).await?,
        purchases: query_purchase_stats(conn).await?,
        content_by_kind: query_content_by_kind(conn).await?,
        enrollments_by_status: query_enrollments_by_status(conn).await?,
    })
}
