//! Subject entity - the merged per-subject replica row.
//!
//! One row carries the subject's own fields plus three field groups that
//! arrive from separate endpoints: the assignment, the review statistic and
//! the study material. Each group has its own `*_patched` marker, set only
//! by local mutations and cleared by any server write to that group.
//!
//! A row may exist as an id-only placeholder (`object` is `None`) when an
//! assignment or a local patch arrives before the subject itself.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stage id stored for subjects that have not been unlocked.
pub const LOCKED_STAGE: i64 = -999;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subjects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    // Subject
    /// Object type (`radical`, `kanji`, `vocabulary`, ...). `None` for placeholders.
    pub object: Option<String>,
    pub characters: Option<String>,
    pub slug: Option<String>,
    pub level: i32,
    pub lesson_position: i32,
    pub srs_system_id: i64,
    pub hidden_at: Option<DateTimeWithTimeZone>,

    // Assignment
    pub assignment_id: i64,
    pub srs_stage: i64,
    pub unlocked_at: Option<DateTimeWithTimeZone>,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub available_at: Option<DateTimeWithTimeZone>,
    pub passed_at: Option<DateTimeWithTimeZone>,
    pub burned_at: Option<DateTimeWithTimeZone>,
    pub resurrected_at: Option<DateTimeWithTimeZone>,
    pub assignment_patched: bool,

    // Review statistic
    pub review_statistic_id: i64,
    pub meaning_correct: i32,
    pub meaning_incorrect: i32,
    pub meaning_max_streak: i32,
    pub meaning_current_streak: i32,
    pub reading_correct: i32,
    pub reading_incorrect: i32,
    pub reading_max_streak: i32,
    pub reading_current_streak: i32,
    pub percentage_correct: i32,
    pub leech_score: i32,
    pub statistic_patched: bool,

    // Study material
    pub study_material_id: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub meaning_note: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub reading_note: Option<String>,
    /// JSON array of user synonyms.
    #[sea_orm(column_type = "Json")]
    pub meaning_synonyms: serde_json::Value,
    pub study_material_patched: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True while only assignment/statistic/material data has arrived.
    pub fn is_placeholder(&self) -> bool {
        self.object.is_none()
    }

    /// True if any field group carries an unconfirmed local patch.
    pub fn is_patched(&self) -> bool {
        self.assignment_patched || self.statistic_patched || self.study_material_patched
    }

    pub fn synonyms(&self) -> Vec<String> {
        serde_json::from_value(self.meaning_synonyms.clone()).unwrap_or_default()
    }
}

/// A field group with its own patched marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    Assignment,
    ReviewStatistic,
    StudyMaterial,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 3] = [
        FieldGroup::Assignment,
        FieldGroup::ReviewStatistic,
        FieldGroup::StudyMaterial,
    ];

    /// Column holding this group's patched marker.
    pub fn patched_column(self) -> Column {
        match self {
            FieldGroup::Assignment => Column::AssignmentPatched,
            FieldGroup::ReviewStatistic => Column::StatisticPatched,
            FieldGroup::StudyMaterial => Column::StudyMaterialPatched,
        }
    }
}

impl std::fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldGroup::Assignment => write!(f, "assignment"),
            FieldGroup::ReviewStatistic => write!(f, "review_statistic"),
            FieldGroup::StudyMaterial => write!(f, "study_material"),
        }
    }
}
