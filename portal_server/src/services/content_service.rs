//! Games, events and articles.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::content::{Content, ContentChanges, NewContent, KIND_EVENT};
use crate::schema::contents;

#[derive(Debug, Default, Deserialize)]
pub struct ContentQuery {
    pub kind: Option<String>,
    /// Only events that have not started yet, soonest first.
    #[serde(default)]
    pub upcoming: bool,
    pub limit: Option<i64>,
}

pub async fn list_content(
    conn: &mut AsyncPgConnection,
    query: &ContentQuery,
    include_unpublished: bool,
) -> anyhow::Result<Vec<Content>> {
    let mut q = contents::table.into_boxed();
    if !include_unpublished {
        q = q.filter(contents::published.eq(true));
    }
    if let Some(kind) = query.kind.as_deref() {
        q = q.filter(contents::kind.eq(kind.to_string()));
    }
    if query.upcoming {
        q = q
            .filter(contents::kind.eq(KIND_EVENT))
            .filter(contents::starts_at.ge(Utc::now()))
            .order(contents::starts_at.asc());
    } else {
        q = q.order(contents::id.desc());
    }

    let results = q
        .limit(query.limit.unwrap_or(50).clamp(1, 200))
        .select(Content::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// Look up by slug. Unpublished content is hidden from non-admins.
pub async fn get_by_slug(
    conn: &mut AsyncPgConnection,
    slug: &str,
    include_unpublished: bool,
) -> anyhow::Result<Content> {
    let content = contents::table
        .filter(contents::slug.eq(slug))
        .select(Content::as_select())
        .first(conn)
        .await
        .optional()?
        .filter(|c| include_unpublished || c.published)
        .ok_or(ApiError::not_found("Content"))?;
    Ok(content)
}

pub async fn get_content(conn: &mut AsyncPgConnection, content_id: i64) -> anyhow::Result<Content> {
    contents::table
        .find(content_id)
        .select(Content::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Content").into())
}

pub async fn create_content(
    conn: &mut AsyncPgConnection,
    new_content: NewContent,
) -> anyhow::Result<Content> {
    let content = diesel::insert_into(contents::table)
        .values(&new_content)
        .returning(Content::as_returning())
        .get_result(conn)
        .await?;
    tracing::info!(content_id = content.id, kind = %content.kind, "Content created");
    Ok(content)
}

pub async fn update_content(
    conn: &mut AsyncPgConnection,
    content_id: i64,
    changes: &ContentChanges,
) -> anyhow::Result<Content> {
    let current = get_content(conn, content_id).await?;
    changes.validate(&current).map_err(ApiError::BadRequest)?;

    let content = diesel::update(contents::table.find(content_id))
        .set((changes, contents::updated_at.eq(Utc::now())))
        .returning(Content::as_returning())
        .get_result(conn)
        .await?;
    Ok(content)
}

pub async fn delete_content(conn: &mut AsyncPgConnection, content_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(contents::table.find(content_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Content").into());
    }
    Ok(())
}
