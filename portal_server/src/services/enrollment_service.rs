//! Roadmap enrollment (idempotent) and challenge progress.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::ApiError;
use crate::models::enrollment::{
    progress, status_change, Enrolled, Enrollment, EnrollmentProgress, NewChallengeCompletion,
    NewEnrollment, STATUS_ACTIVE,
};
use crate::schema::{challenge_completions, enrollments, roadmaps};
use crate::services::roadmap_service;

/// Enroll a user in a roadmap. Enrolling twice returns the existing row.
pub async fn enroll(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    roadmap_id: i64,
    semester_id: Option<i64>,
) -> anyhow::Result<Enrolled> {
    roadmap_service::get_roadmap(conn, roadmap_id, false).await?;

    let inserted = diesel::insert_into(enrollments::table)
        .values(&NewEnrollment {
            user_id,
            roadmap_id,
            semester_id,
            status: STATUS_ACTIVE.to_string(),
        })
        .on_conflict((enrollments::user_id, enrollments::roadmap_id))
        .do_nothing()
        .returning(Enrollment::as_returning())
        .get_result(conn)
        .await
        .optional()?;

    if let Some(enrollment) = inserted {
        tracing::info!(enrollment_id = enrollment.id, user_id, roadmap_id, "Enrolled");
        return Ok(Enrolled::Created(enrollment));
    }

    let existing = enrollments::table
        .filter(enrollments::user_id.eq(user_id))
        .filter(enrollments::roadmap_id.eq(roadmap_id))
        .select(Enrollment::as_select())
        .first(conn)
        .await?;
    Ok(Enrolled::Existing(existing))
}

async fn with_progress(
    conn: &mut AsyncPgConnection,
    rows: Vec<(Enrollment, String)>,
) -> anyhow::Result<Vec<EnrollmentProgress>> {
    let mut result = Vec::with_capacity(rows.len());
    for (enrollment, roadmap_title) in rows {
        let total = roadmap_service::challenge_ids(conn, enrollment.roadmap_id)
            .await?
            .len() as i64;
        let completed: i64 = challenge_completions::table
            .filter(challenge_completions::enrollment_id.eq(enrollment.id))
            .count()
            .get_result(conn)
            .await?;

        result.push(EnrollmentProgress {
            enrollment,
            roadmap_title,
            completed_challenges: completed,
            total_challenges: total,
            progress: progress(completed, total),
        });
    }
    Ok(result)
}

/// A user's enrollments with progress.
pub async fn list_for_user(
    conn: &mut AsyncPgConnection,
    user_id: i64,
) -> anyhow::Result<Vec<EnrollmentProgress>> {
    let rows: Vec<(Enrollment, String)> = enrollments::table
        .inner_join(roadmaps::table)
        .filter(enrollments::user_id.eq(user_id))
        .order(enrollments::id.desc())
        .select((Enrollment::as_select(), roadmaps::title))
        .load(conn)
        .await?;
    with_progress(conn, rows).await
}

/// Every enrollment, optionally for one roadmap.
pub async fn list_all(
    conn: &mut AsyncPgConnection,
    roadmap_id: Option<i64>,
) -> anyhow::Result<Vec<EnrollmentProgress>> {
    let mut query = enrollments::table
        .inner_join(roadmaps::table)
        .select((Enrollment::as_select(), roadmaps::title))
        .into_boxed();
    if let Some(roadmap_id) = roadmap_id {
        query = query.filter(enrollments::roadmap_id.eq(roadmap_id));
    }
    let rows: Vec<(Enrollment, String)> = query.order(enrollments::id.desc()).load(conn).await?;
    with_progress(conn, rows).await
}

/// Mark a challenge complete for the caller's enrollment. Idempotent; the
/// enrollment flips to `completed` once every challenge is done.
pub async fn complete_challenge(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    enrollment_id: i64,
    challenge_id: i64,
) -> anyhow::Result<EnrollmentProgress> {
    let (enrollment, roadmap_title): (Enrollment, String) = enrollments::table
        .inner_join(roadmaps::table)
        .filter(enrollments::id.eq(enrollment_id))
        .filter(enrollments::user_id.eq(user_id))
        .select((Enrollment::as_select(), roadmaps::title))
        .first(conn)
        .await
        .optional()?
        .ok_or(ApiError::not_found("Enrollment"))?;

    let challenge_ids = roadmap_service::challenge_ids(conn, enrollment.roadmap_id).await?;
    if !challenge_ids.contains(&challenge_id) {
        return Err(ApiError::bad_request("Challenge does not belong to this roadmap").into());
    }

    diesel::insert_into(challenge_completions::table)
        .values(&NewChallengeCompletion {
            enrollment_id,
            challenge_id,
        })
        .on_conflict((
            challenge_completions::enrollment_id,
            challenge_completions::challenge_id,
        ))
        .do_nothing()
        .execute(conn)
        .await?;

    let completed: i64 = challenge_completions::table
        .filter(challenge_completions::enrollment_id.eq(enrollment_id))
        .filter(challenge_completions::challenge_id.eq_any(&challenge_ids))
        .count()
        .get_result(conn)
        .await?;
    let total = challenge_ids.len() as i64;

    let enrollment = if let Some(status) = status_change(&enrollment.status, completed, total) {
        diesel::update(enrollments::table.find(enrollment_id))
            .set((
                enrollments::status.eq(status),
                enrollments::updated_at.eq(Utc::now()),
            ))
            .returning(Enrollment::as_returning())
            .get_result(conn)
            .await?
    } else {
        enrollment
    };

    Ok(EnrollmentProgress {
        enrollment,
        roadmap_title,
        completed_challenges: completed,
        total_challenges: total,
        progress: progress(completed, total),
    })
}
