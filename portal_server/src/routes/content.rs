//! Games, events and articles.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;

use super::{check, AdminUser, AppState, JsonBody, MaybeUser};
use crate::error::{ApiError, ApiResult};
use crate::models::content::{is_valid_kind, Content, ContentChanges, NewContent, KIND_EVENT, KIND_GAME};
use crate::services::content_service::{self, ContentQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/content", get(list_content).post(create_content))
        // `{key}` is a slug for reads and a numeric id for writes.
        .route(
            "/content/{key}",
            get(get_content).put(update_content).delete(delete_content),
        )
        .route("/games", get(list_games))
        .route("/events", get(list_events))
}

async fn list_filtered(
    state: &AppState,
    viewer: &MaybeUser,
    query: ContentQuery,
) -> ApiResult<Json<Vec<Content>>> {
    if let Some(kind) = query.kind.as_deref() {
        if !is_valid_kind(kind) {
            return Err(ApiError::bad_request(format!("unknown content kind: {kind}")));
        }
    }
    let mut conn = state.pool.get().await?;
    let items = content_service::list_content(&mut conn, &query, viewer.is_admin()).await?;
    Ok(Json(items))
}

async fn list_content(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Json<Vec<Content>>> {
    list_filtered(&state, &viewer, query).await
}

async fn list_games(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Json<Vec<Content>>> {
    let query = ContentQuery {
        kind: Some(KIND_GAME.to_string()),
        upcoming: false,
        ..query
    };
    list_filtered(&state, &viewer, query).await
}

async fn list_events(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Json<Vec<Content>>> {
    let query = ContentQuery {
        kind: Some(KIND_EVENT.to_string()),
        ..query
    };
    list_filtered(&state, &viewer, query).await
}

async fn get_content(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Content>> {
    let mut conn = state.pool.get().await?;
    let content = content_service::get_by_slug(&mut conn, &slug, viewer.is_admin()).await?;
    Ok(Json(content))
}

async fn create_content(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    JsonBody(mut new_content): JsonBody<NewContent>,
) -> ApiResult<(StatusCode, Json<Content>)> {
    check(new_content.validate())?;
    new_content.author_id = Some(admin.user.id);
    let mut conn = state.pool.get().await?;
    let content = content_service::create_content(&mut conn, new_content).await?;
    Ok((StatusCode::CREATED, Json(content)))
}

async fn update_content(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<ContentChanges>,
) -> ApiResult<Json<Content>> {
    let mut conn = state.pool.get().await?;
    let content = content_service::update_content(&mut conn, id, &changes).await?;
    Ok(Json(content))
}

async fn delete_content(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    content_service::delete_content(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;

    use crate::routes::portal_router;
    use crate::routes::test_support::*;
    use super::*;

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let app = portal_router(state());
        let response = send(
            app,
            Request::get("/api/content?kind=podcast").body(Body::empty()).unwrap(),
        )
        .await;
        assert_status(&response, StatusCode::BAD_REQUEST);
    }
}
