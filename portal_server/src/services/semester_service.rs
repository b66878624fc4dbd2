//! Semesters and the hall of fame.

use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::error::ApiError;
use crate::models::semester::{
    HallOfFameChanges, HallOfFameEntry, NewHallOfFameEntry, NewSemester, Semester,
    SemesterChanges,
};
use crate::schema::{hall_of_fame, semesters};

pub async fn list_semesters(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<Semester>> {
    let results = semesters::table
        .order(semesters::starts_on.desc())
        .select(Semester::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn current_semester(conn: &mut AsyncPgConnection) -> anyhow::Result<Semester> {
    semesters::table
        .filter(semesters::is_current.eq(true))
        .select(Semester::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Current semester").into())
}

pub async fn get_semester(conn: &mut AsyncPgConnection, semester_id: i64) -> anyhow::Result<Semester> {
    semesters::table
        .find(semester_id)
        .select(Semester::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Semester").into())
}

/// Insert a semester. A new current semester clears the flag on the others.
pub async fn create_semester(
    conn: &mut AsyncPgConnection,
    new_semester: NewSemester,
) -> anyhow::Result<Semester> {
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            if new_semester.is_current {
                diesel::update(semesters::table.filter(semesters::is_current.eq(true)))
                    .set(semesters::is_current.eq(false))
                    .execute(conn)
                    .await?;
            }
            let semester = diesel::insert_into(semesters::table)
                .values(&new_semester)
                .returning(Semester::as_returning())
                .get_result(conn)
                .await?;
            Ok(semester)
        }
        .scope_boxed()
    })
    .await
}

pub async fn update_semester(
    conn: &mut AsyncPgConnection,
    semester_id: i64,
    changes: SemesterChanges,
) -> anyhow::Result<Semester> {
    let current = get_semester(conn, semester_id).await?;
    changes.validate(&current).map_err(ApiError::BadRequest)?;

    conn.transaction::<_, anyhow::Error, _>(|conn| {
        async move {
            if changes.is_current == Some(true) {
                diesel::update(
                    semesters::table
                        .filter(semesters::is_current.eq(true))
                        .filter(semesters::id.ne(semester_id)),
                )
                .set(semesters::is_current.eq(false))
                .execute(conn)
                .await?;
            }
            let semester = diesel::update(semesters::table.find(semester_id))
                .set(&changes)
                .returning(Semester::as_returning())
                .get_result(conn)
                .await?;
            Ok(semester)
        }
        .scope_boxed()
    })
    .await
}

pub async fn delete_semester(conn: &mut AsyncPgConnection, semester_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(semesters::table.find(semester_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Semester").into());
    }
    Ok(())
}

// ── Hall of fame ──

pub async fn list_hall_of_fame(
    conn: &mut AsyncPgConnection,
    semester_id: Option<i64>,
) -> anyhow::Result<Vec<HallOfFameEntry>> {
    let mut query = hall_of_fame::table.into_boxed();
    if let Some(semester_id) = semester_id {
        query = query.filter(hall_of_fame::semester_id.eq(semester_id));
    }
    let results = query
        .order((hall_of_fame::rank.asc(), hall_of_fame::id.asc()))
        .select(HallOfFameEntry::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn create_entry(
    conn: &mut AsyncPgConnection,
    entry: NewHallOfFameEntry,
) -> anyhow::Result<HallOfFameEntry> {
    let result = diesel::insert_into(hall_of_fame::table)
        .values(&entry)
        .returning(HallOfFameEntry::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

pub async fn update_entry(
    conn: &mut AsyncPgConnection,
    entry_id: i64,
    changes: &HallOfFameChanges,
) -> anyhow::Result<HallOfFameEntry> {
    let result = diesel::update(hall_of_fame::table.find(entry_id))
        .set(changes)
        .returning(HallOfFameEntry::as_returning())
        .get_result(conn)
        .await
        .optional()?
        .ok_or(ApiError::not_found("Hall of fame entry"))?;
    Ok(result)
}

pub async fn delete_entry(conn: &mut AsyncPgConnection, entry_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(hall_of_fame::table.find(entry_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Hall of fame entry").into());
    }
    Ok(())
}
