//! Roadmap hierarchy CRUD and tree population.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::ApiError;
use crate::models::roadmap::{
    Challenge, Level, Milestone, NewChallenge, NewLevel, NewMilestone, NewRoadmap, NodeRequest,
    Roadmap, RoadmapChanges, RoadmapTree,
};
use crate::schema::{roadmap_challenges, roadmap_levels, roadmap_milestones, roadmaps};

pub async fn list_roadmaps(
    conn: &mut AsyncPgConnection,
    include_unpublished: bool,
) -> anyhow::Result<Vec<Roadmap>> {
    let mut query = roadmaps::table.into_boxed();
    if !include_unpublished {
        query = query.filter(roadmaps::published.eq(true));
    }
    let results = query
        .order(roadmaps::title.asc())
        .select(Roadmap::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn get_roadmap(
    conn: &mut AsyncPgConnection,
    roadmap_id: i64,
    include_unpublished: bool,
) -> anyhow::Result<Roadmap> {
    let roadmap = roadmaps::table
        .find(roadmap_id)
        .select(Roadmap::as_select())
        .first(conn)
        .await
        .optional()?
        .filter(|r| include_unpublished || r.published)
        .ok_or(ApiError::not_found("Roadmap"))?;
    Ok(roadmap)
}

/// Load a roadmap with its levels, milestones and challenges.
pub async fn get_tree(
    conn: &mut AsyncPgConnection,
    roadmap_id: i64,
    include_unpublished: bool,
) -> anyhow::Result<RoadmapTree> {
    let roadmap = get_roadmap(conn, roadmap_id, include_unpublished).await?;

    let levels: Vec<Level> = roadmap_levels::table
        .filter(roadmap_levels::roadmap_id.eq(roadmap_id))
        .order((roadmap_levels::position.asc(), roadmap_levels::id.asc()))
        .select(Level::as_select())
        .load(conn)
        .await?;

    let level_ids: Vec<i64> = levels.iter().map(|l| l.id).collect();
    let milestones: Vec<Milestone> = roadmap_milestones::table
        .filter(roadmap_milestones::level_id.eq_any(&level_ids))
        .order((roadmap_milestones::position.asc(), roadmap_milestones::id.asc()))
        .select(Milestone::as_select())
        .load(conn)
        .await?;

    let milestone_ids: Vec<i64> = milestones.iter().map(|m| m.id).collect();
    let challenges: Vec<Challenge> = roadmap_challenges::table
        .filter(roadmap_challenges::milestone_id.eq_any(&milestone_ids))
        .order((roadmap_challenges::position.asc(), roadmap_challenges::id.asc()))
        .select(Challenge::as_select())
        .load(conn)
        .await?;

    Ok(RoadmapTree::assemble(roadmap, levels, milestones, challenges))
}

/// Ids of every challenge in a roadmap.
pub async fn challenge_ids(conn: &mut AsyncPgConnection, roadmap_id: i64) -> anyhow::Result<Vec<i64>> {
    let ids = roadmap_challenges::table
        .inner_join(roadmap_milestones::table.inner_join(roadmap_levels::table))
        .filter(roadmap_levels::roadmap_id.eq(roadmap_id))
        .select(roadmap_challenges::id)
        .load(conn)
        .await?;
    Ok(ids)
}

pub async fn create_roadmap(
    conn: &mut AsyncPgConnection,
    new_roadmap: NewRoadmap,
) -> anyhow::Result<Roadmap> {
    let roadmap = diesel::insert_into(roadmaps::table)
        .values(&new_roadmap)
        .returning(Roadmap::as_returning())
        .get_result(conn)
        .await?;
    tracing::info!(roadmap_id = roadmap.id, "Roadmap created");
    Ok(roadmap)
}

pub async fn update_roadmap(
    conn: &mut AsyncPgConnection,
    roadmap_id: i64,
    changes: &RoadmapChanges,
) -> anyhow::Result<Roadmap> {
    let roadmap = diesel::update(roadmaps::table.find(roadmap_id))
        .set((changes, roadmaps::updated_at.eq(Utc::now())))
        .returning(Roadmap::as_returning())
        .get_result(conn)
        .await
        .optional()?
        .ok_or(ApiError::not_found("Roadmap"))?;
    Ok(roadmap)
}

pub async fn delete_roadmap(conn: &mut AsyncPgConnection, roadmap_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(roadmaps::table.find(roadmap_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Roadmap").into());
    }
    Ok(())
}

// ── Children ──

pub async fn add_level(
    conn: &mut AsyncPgConnection,
    roadmap_id: i64,
    req: NodeRequest,
) -> anyhow::Result<Level> {
    get_roadmap(conn, roadmap_id, true).await?;
    let level = diesel::insert_into(roadmap_levels::table)
        .values(&NewLevel {
            roadmap_id,
            title: req.title,
            position: req.position,
        })
        .returning(Level::as_returning())
        .get_result(conn)
        .await?;
    Ok(level)
}

pub async fn add_milestone(
    conn: &mut AsyncPgConnection,
    level_id: i64,
    req: NodeRequest,
) -> anyhow::Result<Milestone> {
    let exists: i64 = roadmap_levels::table
        .find(level_id)
        .count()
        .get_result(conn)
        .await?;
    if exists == 0 {
        return Err(ApiError::not_found("Level").into());
    }

    let milestone = diesel::insert_into(roadmap_milestones::table)
        .values(&NewMilestone {
            level_id,
            title: req.title,
            description: req.description,
            position: req.position,
        })
        .returning(Milestone::as_returning())
        .get_result(conn)
        .await?;
    Ok(milestone)
}

pub async fn add_challenge(
    conn: &mut AsyncPgConnection,
    milestone_id: i64,
    req: NodeRequest,
) -> anyhow::Result<Challenge> {
    let exists: i64 = roadmap_milestones::table
        .find(milestone_id)
        .count()
        .get_result(conn)
        .await?;
    if exists == 0 {
        return Err(ApiError::not_found("Milestone").into());
    }

    let challenge = diesel::insert_into(roadmap_challenges::table)
        .values(&NewChallenge {
            milestone_id,
            title: req.title,
            description: req.description,
            points: req.points,
            position: req.position,
        })
        .returning(Challenge::as_returning())
        .get_result(conn)
        .await?;
    Ok(challenge)
}

pub async fn delete_level(conn: &mut AsyncPgConnection, level_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(roadmap_levels::table.find(level_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Level").into());
    }
    Ok(())
}

pub async fn delete_milestone(conn: &mut AsyncPgConnection, milestone_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(roadmap_milestones::table.find(milestone_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Milestone").into());
    }
    Ok(())
}

pub async fn delete_challenge(conn: &mut AsyncPgConnection, challenge_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(roadmap_challenges::table.find(challenge_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Challenge").into());
    }
    Ok(())
}
