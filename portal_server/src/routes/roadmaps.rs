//! Roadmaps, their level/milestone/challenge tree and enrollments.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;

use super::{check, AdminUser, AppState, CurrentUser, JsonBody, MaybeUser};
use crate::error::{ApiError, ApiResult};
use crate::models::enrollment::{EnrollRequest, Enrolled, Enrollment, EnrollmentProgress};
use crate::models::notification::TRIGGER_ENROLLMENT_CREATED;
use crate::models::roadmap::{
    Challenge, Level, Milestone, NewRoadmap, NodeRequest, Roadmap, RoadmapChanges, RoadmapTree,
};
use crate::services::{enrollment_service, roadmap_service, workflow_service};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/roadmaps", get(list_roadmaps).post(create_roadmap))
        .route(
            "/roadmaps/{id}",
            get(get_roadmap).put(update_roadmap).delete(delete_roadmap),
        )
        .route("/roadmaps/{id}/levels", post(add_level))
        .route("/levels/{id}", delete(delete_level))
        .route("/levels/{id}/milestones", post(add_milestone))
        .route("/milestones/{id}", delete(delete_milestone))
        .route("/milestones/{id}/challenges", post(add_challenge))
        .route("/challenges/{id}", delete(delete_challenge))
        .route("/roadmaps/{id}/enroll", post(enroll))
        .route("/enrollments", get(my_enrollments))
        .route(
            "/enrollments/{id}/challenges/{challenge_id}/complete",
            post(complete_challenge),
        )
}

async fn list_roadmaps(
    viewer: MaybeUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Roadmap>>> {
    let mut conn = state.pool.get().await?;
    let roadmaps = roadmap_service::list_roadmaps(&mut conn, viewer.is_admin()).await?;
    Ok(Json(roadmaps))
}

async fn get_roadmap(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<RoadmapTree>> {
    let mut conn = state.pool.get().await?;
    let tree = roadmap_service::get_tree(&mut conn, id, viewer.is_admin()).await?;
    Ok(Json(tree))
}

async fn create_roadmap(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(new_roadmap): JsonBody<NewRoadmap>,
) -> ApiResult<(StatusCode, Json<Roadmap>)> {
    check(new_roadmap.validate())?;
    let mut conn = state.pool.get().await?;
    let roadmap = roadmap_service::create_roadmap(&mut conn, new_roadmap).await?;
    Ok((StatusCode::CREATED, Json(roadmap)))
}

async fn update_roadmap(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<RoadmapChanges>,
) -> ApiResult<Json<Roadmap>> {
    check(changes.validate())?;
    let mut conn = state.pool.get().await?;
    let roadmap = roadmap_service::update_roadmap(&mut conn, id, &changes).await?;
    Ok(Json(roadmap))
}

async fn delete_roadmap(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    roadmap_service::delete_roadmap(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Tree nodes ──

async fn add_level(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(roadmap_id): Path<i64>,
    JsonBody(req): JsonBody<NodeRequest>,
) -> ApiResult<(StatusCode, Json<Level>)> {
    check(req.validate())?;
    let mut conn = state.pool.get().await?;
    let level = roadmap_service::add_level(&mut conn, roadmap_id, req).await?;
    Ok((StatusCode::CREATED, Json(level)))
}

async fn add_milestone(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(level_id): Path<i64>,
    JsonBody(req): JsonBody<NodeRequest>,
) -> ApiResult<(StatusCode, Json<Milestone>)> {
    check(req.validate())?;
    let mut conn = state.pool.get().await?;
    let milestone = roadmap_service::add_milestone(&mut conn, level_id, req).await?;
    Ok((StatusCode::CREATED, Json(milestone)))
}

async fn add_challenge(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(milestone_id): Path<i64>,
    JsonBody(req): JsonBody<NodeRequest>,
) -> ApiResult<(StatusCode, Json<Challenge>)> {
    check(req.validate())?;
    let mut conn = state.pool.get().await?;
    let challenge = roadmap_service::add_challenge(&mut conn, milestone_id, req).await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

async fn delete_level(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    roadmap_service::delete_level(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_milestone(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    roadmap_service::delete_milestone(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_challenge(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    roadmap_service::delete_challenge(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Enrollments ──

/// The enroll body is optional; an empty body enrolls without a semester.
fn parse_enroll_body(body: &[u8]) -> ApiResult<EnrollRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(EnrollRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))
}

/// 201 for a new enrollment, 200 when the caller was already enrolled.
fn enroll_status(enrolled: &Enrolled) -> StatusCode {
    if enrolled.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

async fn enroll(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(roadmap_id): Path<i64>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Enrollment>)> {
    let req = parse_enroll_body(&body)?;
    let mut conn = state.pool.get().await?;
    let enrolled =
        enrollment_service::enroll(&mut conn, current.user.id, roadmap_id, req.semester_id).await?;

    if enrolled.is_created() {
        workflow_service::fire(
            &mut conn,
            &state.telegram,
            TRIGGER_ENROLLMENT_CREATED,
            &current.user,
        )
        .await;
    }
    Ok((enroll_status(&enrolled), Json(enrolled.into_enrollment())))
}

async fn my_enrollments(
    current: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<EnrollmentProgress>>> {
    let mut conn = state.pool.get().await?;
    let enrollments = enrollment_service::list_for_user(&mut conn, current.user.id).await?;
    Ok(Json(enrollments))
}

async fn complete_challenge(
    current: CurrentUser,
    State(state): State<AppState>,
    Path((enrollment_id, challenge_id)): Path<(i64, i64)>,
) -> ApiResult<Json<EnrollmentProgress>> {
    let mut conn = state.pool.get().await?;
    let progress = enrollment_service::complete_challenge(
        &mut conn,
        current.user.id,
        enrollment_id,
        challenge_id,
    )
    .await?;
    Ok(Json(progress))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::enrollment::STATUS_ACTIVE;

    fn enrollment() -> Enrollment {
        let now = Utc::now();
        Enrollment {
            id: 9,
            user_id: 1,
            roadmap_id: 3,
            semester_id: None,
            status: STATUS_ACTIVE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn enrolling_again_answers_ok_with_the_same_row() {
        let first = Enrolled::Created(enrollment());
        let again = Enrolled::Existing(enrollment());
        assert_eq!(enroll_status(&first), StatusCode::CREATED);
        assert_eq!(enroll_status(&again), StatusCode::OK);
        assert_eq!(first.into_enrollment().id, again.into_enrollment().id);
    }

    #[test]
    fn enroll_body_is_optional() {
        assert_eq!(parse_enroll_body(b"").unwrap().semester_id, None);
        assert_eq!(parse_enroll_body(b"  \n").unwrap().semester_id, None);
        assert_eq!(
            parse_enroll_body(br#"{"semester_id": 4}"#).unwrap().semester_id,
            Some(4)
        );
        assert!(parse_enroll_body(b"{not json").is_err());
    }
}
