//! Private journal entries.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;

use super::{check, AppState, CurrentUser, JsonBody};
use crate::error::{ApiError, ApiResult};
use crate::models::journal::{Journal, JournalChanges, JournalRequest};
use crate::services::journal_service::{self, JournalRange};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/journals", get(list_journals).post(create_journal))
        .route(
            "/journals/{id}",
            get(get_journal).put(update_journal).delete(delete_journal),
        )
}

async fn list_journals(
    current: CurrentUser,
    State(state): State<AppState>,
    Query(range): Query<JournalRange>,
) -> ApiResult<Json<Vec<Journal>>> {
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if to < from {
            return Err(ApiError::bad_request("to must not precede from"));
        }
    }
    let mut conn = state.pool.get().await?;
    let entries = journal_service::list_journals(&mut conn, current.user.id, &range).await?;
    Ok(Json(entries))
}

async fn get_journal(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Journal>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(journal_service::get_journal(&mut conn, current.user.id, id).await?))
}

async fn create_journal(
    current: CurrentUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<JournalRequest>,
) -> ApiResult<(StatusCode, Json<Journal>)> {
    check(req.validate())?;
    let mut conn = state.pool.get().await?;
    let entry = journal_service::create_journal(&mut conn, current.user.id, req).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update_journal(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<JournalChanges>,
) -> ApiResult<Json<Journal>> {
    check(changes.validate())?;
    let mut conn = state.pool.get().await?;
    let entry = journal_service::update_journal(&mut conn, current.user.id, id, &changes).await?;
    Ok(Json(entry))
}

async fn delete_journal(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    journal_service::delete_journal(&mut conn, current.user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
