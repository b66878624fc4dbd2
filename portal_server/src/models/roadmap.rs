//! roadmaps: learning paths, Roadmap -> Level -> Milestone -> Challenge.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{roadmap_challenges, roadmap_levels, roadmap_milestones, roadmaps};

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = roadmaps)]
pub struct Roadmap {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = roadmaps)]
pub struct NewRoadmap {
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    #[serde(default)]
    pub published: bool,
}

impl NewRoadmap {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        super::validate_slug(&self.slug)
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = roadmaps)]
pub struct RoadmapChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub published: Option<bool>,
}

impl RoadmapChanges {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty".to_string());
        }
        match &self.slug {
            Some(slug) => super::validate_slug(slug),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = roadmap_levels)]
pub struct Level {
    pub id: i64,
    pub roadmap_id: i64,
    pub title: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = roadmap_levels)]
pub struct NewLevel {
    pub roadmap_id: i64,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = roadmap_milestones)]
pub struct Milestone {
    pub id: i64,
    pub level_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = roadmap_milestones)]
pub struct NewMilestone {
    pub level_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = roadmap_challenges)]
pub struct Challenge {
    pub id: i64,
    pub milestone_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = roadmap_challenges)]
pub struct NewChallenge {
    pub milestone_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub position: i32,
}

/// Body for adding a level, milestone or challenge under a parent.
#[derive(Debug, Deserialize)]
pub struct NodeRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub points: i32,
}

impl NodeRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        if self.points < 0 {
            return Err("points must not be negative".to_string());
        }
        Ok(())
    }
}

// ── Populated tree ──

#[derive(Debug, Serialize)]
pub struct RoadmapTree {
    #[serde(flatten)]
    pub roadmap: Roadmap,
    pub levels: Vec<LevelTree>,
    pub total_challenges: usize,
}

#[derive(Debug, Serialize)]
pub struct LevelTree {
    #[serde(flatten)]
    pub level: Level,
    pub milestones: Vec<MilestoneTree>,
}

#[derive(Debug, Serialize)]
pub struct MilestoneTree {
    #[serde(flatten)]
    pub milestone: Milestone,
    pub challenges: Vec<Challenge>,
}

impl RoadmapTree {
    /// Assemble the tree from flat rows. Rows are expected in `position`
    /// order; children whose parent is missing are dropped.
    pub fn assemble(
        roadmap: Roadmap,
        levels: Vec<Level>,
        milestones: Vec<Milestone>,
        challenges: Vec<Challenge>,
    ) -> Self {
        let mut total_challenges = 0;
        let levels = levels
            .into_iter()
            .map(|level| {
                let milestones = milestones
                    .iter()
                    .filter(|m| m.level_id == level.id)
                    .cloned()
                    .map(|milestone| {
                        let challenges: Vec<Challenge> = challenges
                            .iter()
                            .filter(|c| c.milestone_id == milestone.id)
                            .cloned()
                            .collect();
                        total_challenges += challenges.len();
                        MilestoneTree {
                            milestone,
                            challenges,
                        }
                    })
                    .collect();
                LevelTree { level, milestones }
            })
            .collect();

        Self {
            roadmap,
            levels,
            total_challenges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roadmap() -> Roadmap {
        Roadmap {
            id: 1,
            title: "Rust".to_string(),
            slug: "rust".to_string(),
            description: None,
            published: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn level(id: i64, position: i32) -> Level {
        Level {
            id,
            roadmap_id: 1,
            title: format!("Level {id}"),
            position,
            created_at: Utc::now(),
        }
    }

    fn milestone(id: i64, level_id: i64) -> Milestone {
        Milestone {
            id,
            level_id,
            title: format!("Milestone {id}"),
            description: None,
            position: 0,
            created_at: Utc::now(),
        }
    }

    fn challenge(id: i64, milestone_id: i64) -> Challenge {
        Challenge {
            id,
            milestone_id,
            title: format!("Challenge {id}"),
            description: None,
            points: 10,
            position: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tree_groups_children_under_parents() {
        let tree = RoadmapTree::assemble(
            roadmap(),
            vec![level(1, 0), level(2, 1)],
            vec![milestone(10, 1), milestone(11, 2), milestone(12, 99)],
            vec![challenge(100, 10), challenge(101, 10), challenge(102, 11)],
        );

        assert_eq!(tree.levels.len(), 2);
        assert_eq!(tree.levels[0].milestones.len(), 1);
        assert_eq!(tree.levels[0].milestones[0].challenges.len(), 2);
        assert_eq!(tree.levels[1].milestones[0].challenges.len(), 1);
        assert_eq!(tree.total_challenges, 3);
    }

    #[test]
    fn tree_serializes_flat_parent_fields() {
        let tree = RoadmapTree::assemble(roadmap(), vec![level(1, 0)], vec![], vec![]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["slug"], "rust");
        assert_eq!(json["levels"][0]["title"], "Level 1");
        assert_eq!(json["total_challenges"], 0);
    }
}
