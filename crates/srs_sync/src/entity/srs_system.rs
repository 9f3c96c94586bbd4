//! SrsSystem entity - stored stage tables, replaced wholesale on every sync.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "srs_systems")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    pub name: String,
    pub unlocking_position: i64,
    pub starting_position: i64,
    pub passing_position: i64,
    pub burning_position: i64,

    /// JSON array of `{position, interval_secs}` objects.
    #[sea_orm(column_type = "Json")]
    pub stages: serde_json::Value,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
