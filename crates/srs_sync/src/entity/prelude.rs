//! Common re-exports for convenient entity usage.

pub use super::level_progression::{
    ActiveModel as LevelProgressionActiveModel, Column as LevelProgressionColumn,
    Entity as LevelProgression, Model as LevelProgressionModel,
};
pub use super::property::{
    ActiveModel as PropertyActiveModel, Column as PropertyColumn, Entity as Property,
    Model as PropertyModel,
};
pub use super::srs_system::{
    ActiveModel as SrsSystemActiveModel, Column as SrsSystemColumn, Entity as SrsSystemRow,
    Model as SrsSystemModel,
};
pub use super::subject::{
    ActiveModel as SubjectActiveModel, Column as SubjectColumn, Entity as Subject, FieldGroup,
    LOCKED_STAGE, Model as SubjectModel,
};
pub use super::task_kind::TaskKind;
pub use super::task_record::{
    ActiveModel as TaskRecordActiveModel, Column as TaskRecordColumn, Entity as TaskRecord,
    Model as TaskRecordModel,
};
