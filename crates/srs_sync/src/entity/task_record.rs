//! TaskRecord entity - one pending synchronization operation.
//!
//! A row exists exactly as long as the operation it describes has not been
//! confirmed complete. The `kind` column holds the textual task tag rather
//! than an active enum so that rows written by a newer build with an unknown
//! tag can still be loaded and discarded.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::task_kind::TaskKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task_records")]
pub struct Model {
    /// Auto-increment id, doubles as the enqueue sequence number.
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Task kind tag (see [`TaskKind`]).
    pub kind: String,

    /// Lower values run first.
    pub priority: i32,

    /// Kind-specific parameter encoding.
    #[sea_orm(column_type = "Text")]
    pub payload: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Resolve the stored tag, returning `None` for tags this build does not know.
    pub fn task_kind(&self) -> Option<TaskKind> {
        self.kind.parse().ok()
    }
}
