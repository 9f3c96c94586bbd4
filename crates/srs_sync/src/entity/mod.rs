//! SeaORM entity definitions for the local replica schema.

pub mod level_progression;
pub mod prelude;
pub mod property;
pub mod srs_system;
pub mod subject;
pub mod task_kind;
pub mod task_record;
