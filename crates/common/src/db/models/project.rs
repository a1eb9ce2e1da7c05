//! Project entity (catalog item)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a catalog project
///
/// Statuses outside the known set are kept verbatim (normalized) in
/// `Other`, so deployments can configure their own eligible statuses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    InProgress,
    Completed,
    Archived,
    Withdrawn,
    Other(String),
}

impl ProjectStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Active => "active",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
            ProjectStatus::Withdrawn => "withdrawn",
            ProjectStatus::Other(status) => status,
        }
    }
}

impl From<&str> for ProjectStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => ProjectStatus::Draft,
            "active" => ProjectStatus::Active,
            "in_progress" => ProjectStatus::InProgress,
            "completed" => ProjectStatus::Completed,
            "archived" => ProjectStatus::Archived,
            "withdrawn" => ProjectStatus::Withdrawn,
            other => ProjectStatus::Other(other.to_string()),
        }
    }
}

impl From<ProjectStatus> for String {
    fn from(status: ProjectStatus) -> Self {
        match status {
            ProjectStatus::Other(status) => status,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Free-form status; see [`ProjectStatus`]
    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the project status as an enum
    pub fn project_status(&self) -> ProjectStatus {
        ProjectStatus::from(self.status.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::project_tag::Entity")]
    ProjectTags,
}

impl Related<super::project_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectTags.def()
    }
}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        super::project_tag::Relation::Tag.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::project_tag::Relation::Project.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
