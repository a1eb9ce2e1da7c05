//! Tag vocabulary entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tag kind; users hold both, projects are tagged with either
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Interest,
    Skill,
}

impl TagKind {
    pub const ALL: [TagKind; 2] = [TagKind::Interest, TagKind::Skill];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Interest => "interest",
            TagKind::Skill => "skill",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text", unique)]
    pub name: String,

    /// "interest" or "skill"
    #[sea_orm(column_type = "Text")]
    pub kind: String,
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

impl ActiveModelBehavior for ActiveModel {}
