//! SeaORM entity models
//!
//! Catalog entities for RecForge. Embedding columns (pgvector) are not
//! mapped here; similarity queries go through raw SQL in the repository.

mod project;
mod project_tag;
mod tag;
mod user_tag;

pub use project::{
    Entity as ProjectEntity,
    Model as Project,
    ActiveModel as ProjectActiveModel,
    Column as ProjectColumn,
    ProjectStatus,
};

pub use tag::{
    Entity as TagEntity,
    Model as Tag,
    ActiveModel as TagActiveModel,
    Column as TagColumn,
    TagKind,
};

pub use project_tag::{
    Entity as ProjectTagEntity,
    Model as ProjectTag,
    ActiveModel as ProjectTagActiveModel,
    Column as ProjectTagColumn,
};

pub use user_tag::{
    Entity as UserTagEntity,
    Model as UserTag,
    ActiveModel as UserTagActiveModel,
    Column as UserTagColumn,
};
