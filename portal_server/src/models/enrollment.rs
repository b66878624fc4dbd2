//! enrollments + challenge_completions: a user's progress on a roadmap.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{challenge_completions, enrollments};

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = enrollments)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub roadmap_id: i64,
    pub semester_id: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = enrollments)]
pub struct NewEnrollment {
    pub user_id: i64,
    pub roadmap_id: i64,
    pub semester_id: Option<i64>,
    pub status: String,
}

/// Outcome of an idempotent enroll.
#[derive(Debug, Clone)]
pub enum Enrolled {
    Created(Enrollment),
    Existing(Enrollment),
}

impl Enrolled {
    pub fn is_created(&self) -> bool {
        matches!(self, Enrolled::Created(_))
    }

    pub fn into_enrollment(self) -> Enrollment {
        match self {
            Enrolled::Created(e) | Enrolled::Existing(e) => e,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EnrollRequest {
    pub semester_id: Option<i64>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = challenge_completions)]
pub struct NewChallengeCompletion {
    pub enrollment_id: i64,
    pub challenge_id: i64,
}

/// Enrollment with computed progress.
#[derive(Debug, Serialize)]
pub struct EnrollmentProgress {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub roadmap_title: String,
    pub completed_challenges: i64,
    pub total_challenges: i64,
    pub progress: f64,
}

/// Fraction of challenges completed, `0.0` for an empty roadmap.
pub fn progress(completed: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        (completed.min(total) as f64) / (total as f64)
    }
}

/// Status an enrollment should have with `completed` of `total` challenges done.
pub fn enrollment_status(completed: i64, total: i64) -> &'static str {
    if total > 0 && completed >= total {
        STATUS_COMPLETED
    } else {
        STATUS_ACTIVE
    }
}

/// The status to write after a completion, or `None` when it is unchanged.
pub fn status_change(current: &str, completed: i64, total: i64) -> Option<&'static str> {
    let status = enrollment_status(completed, total);
    (current != status).then_some(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_challenge_completes_the_enrollment() {
        assert_eq!(status_change(STATUS_ACTIVE, 2, 3), None);
        assert_eq!(status_change(STATUS_ACTIVE, 3, 3), Some(STATUS_COMPLETED));
    }

    #[test]
    fn repeated_completion_changes_nothing() {
        assert_eq!(status_change(STATUS_COMPLETED, 3, 3), None);
    }

    #[test]
    fn new_challenges_reopen_a_completed_enrollment() {
        assert_eq!(status_change(STATUS_COMPLETED, 3, 4), Some(STATUS_ACTIVE));
        assert_eq!(enrollment_status(0, 0), STATUS_ACTIVE);
    }

    #[test]
    fn empty_roadmap_has_zero_progress() {
        assert_eq!(progress(0, 0), 0.0);
    }

    #[test]
    fn progress_is_a_fraction() {
        assert_eq!(progress(1, 4), 0.25);
        assert_eq!(progress(4, 4), 1.0);
        assert_eq!(progress(5, 4), 1.0);
    }
}
