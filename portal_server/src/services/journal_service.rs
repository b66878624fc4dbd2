//! Journal entries, scoped to their owner.

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::ApiError;
use crate::models::journal::{Journal, JournalChanges, JournalRequest, NewJournal};
use crate::schema::journals;

/// Inclusive date range filter for listing.
#[derive(Debug, Default, serde::Deserialize)]
pub struct JournalRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn list_journals(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    range: &JournalRange,
) -> anyhow::Result<Vec<Journal>> {
    let mut query = journals::table
        .filter(journals::user_id.eq(user_id))
        .into_boxed();
    if let Some(from) = range.from {
        query = query.filter(journals::entry_date.ge(from));
    }
    if let Some(to) = range.to {
        query = query.filter(journals::entry_date.le(to));
    }
    let results = query
        .order((journals::entry_date.desc(), journals::id.desc()))
        .select(Journal::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// Another user's entry is indistinguishable from a missing one.
pub async fn get_journal(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    id: i64,
) -> anyhow::Result<Journal> {
    journals::table
        .filter(journals::id.eq(id))
        .filter(journals::user_id.eq(user_id))
        .select(Journal::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Journal entry").into())
}

pub async fn create_journal(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    req: JournalRequest,
) -> anyhow::Result<Journal> {
    let new = NewJournal {
        user_id,
        title: req.title.trim().to_string(),
        body: req.body,
        mood: req.mood,
        entry_date: req.entry_date.unwrap_or_else(|| Utc::now().date_naive()),
    };
    let result = diesel::insert_into(journals::table)
        .values(&new)
        .returning(Journal::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

pub async fn update_journal(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    id: i64,
    changes: &JournalChanges,
) -> anyhow::Result<Journal> {
    let result = diesel::update(
        journals::table
            .filter(journals::id.eq(id))
            .filter(journals::user_id.eq(user_id)),
    )
    .set((changes, journals::updated_at.eq(Utc::now())))
    .returning(Journal::as_returning())
    .get_result(conn)
    .await
    .optional()?;
    result.ok_or_else(|| ApiError::not_found("Journal entry").into())
}

pub async fn delete_journal(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    id: i64,
) -> anyhow::Result<()> {
    let deleted = diesel::delete(
        journals::table
            .filter(journals::id.eq(id))
            .filter(journals::user_id.eq(user_id)),
    )
    .execute(conn)
    .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Journal entry").into());
    }
    Ok(())
}
