//! Semesters and the hall of fame.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, put};
use axum::Router;
use serde::Deserialize;

use super::{check, AdminUser, AppState, JsonBody};
use crate::error::ApiResult;
use crate::models::semester::{
    HallOfFameChanges, HallOfFameEntry, NewHallOfFameEntry, NewSemester, Semester, SemesterChanges,
};
use crate::services::semester_service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/semesters", get(list_semesters).post(create_semester))
        .route("/semesters/current", get(current_semester))
        .route(
            "/semesters/{id}",
            get(get_semester).put(update_semester).delete(delete_semester),
        )
        .route("/hall-of-fame", get(list_hall_of_fame).post(create_entry))
        .route("/hall-of-fame/{id}", put(update_entry).delete(delete_entry))
}

#[derive(Debug, Default, Deserialize)]
pub struct HallOfFameQuery {
    pub semester_id: Option<i64>,
}

async fn list_semesters(State(state): State<AppState>) -> ApiResult<Json<Vec<Semester>>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(semester_service::list_semesters(&mut conn).await?))
}

async fn current_semester(State(state): State<AppState>) -> ApiResult<Json<Semester>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(semester_service::current_semester(&mut conn).await?))
}

async fn get_semester(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Semester>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(semester_service::get_semester(&mut conn, id).await?))
}

async fn create_semester(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(new_semester): JsonBody<NewSemester>,
) -> ApiResult<(StatusCode, Json<Semester>)> {
    check(new_semester.validate())?;
    let mut conn = state.pool.get().await?;
    let semester = semester_service::create_semester(&mut conn, new_semester).await?;
    Ok((StatusCode::CREATED, Json(semester)))
}

async fn update_semester(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<SemesterChanges>,
) -> ApiResult<Json<Semester>> {
    let mut conn = state.pool.get().await?;
    let semester = semester_service::update_semester(&mut conn, id, changes).await?;
    Ok(Json(semester))
}

async fn delete_semester(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    semester_service::delete_semester(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Hall of fame ──

async fn list_hall_of_fame(
    State(state): State<AppState>,
    Query(query): Query<HallOfFameQuery>,
) -> ApiResult<Json<Vec<HallOfFameEntry>>> {
    let mut conn = state.pool.get().await?;
    let entries = semester_service::list_hall_of_fame(&mut conn, query.semester_id).await?;
    Ok(Json(entries))
}

async fn create_entry(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(entry): JsonBody<NewHallOfFameEntry>,
) -> ApiResult<(StatusCode, Json<HallOfFameEntry>)> {
    check(entry.validate())?;
    let mut conn = state.pool.get().await?;
    let entry = semester_service::create_entry(&mut conn, entry).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update_entry(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<HallOfFameChanges>,
) -> ApiResult<Json<HallOfFameEntry>> {
    check(changes.validate())?;
    let mut conn = state.pool.get().await?;
    let entry = semester_service::update_entry(&mut conn, id, &changes).await?;
    Ok(Json(entry))
}

async fn delete_entry(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    semester_service::delete_entry(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
