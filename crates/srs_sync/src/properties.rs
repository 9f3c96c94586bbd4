//! Typed access to the key/value property store.
//!
//! Global flags (key rejected, API in error, ...), the cached user profile
//! and per-kind sync watermarks all live here as strings.

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set, sea_query::OnConflict};

use crate::entity::property::{ActiveModel, Column, Entity as Property};
use crate::entity::task_kind::TaskKind;

/// Remote models whose last successful sync is tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncedModel {
    User,
    SrsSystems,
    Subjects,
    Assignments,
    ReviewStatistics,
    StudyMaterials,
    Summary,
    LevelProgression,
}

impl SyncedModel {
    /// The full-sync task kind that advances this model's watermark.
    pub fn for_kind(kind: TaskKind) -> Option<Self> {
        match kind {
            TaskKind::GetUser => Some(Self::User),
            TaskKind::GetSrsSystems => Some(Self::SrsSystems),
            TaskKind::GetSubjects => Some(Self::Subjects),
            TaskKind::GetAssignments => Some(Self::Assignments),
            TaskKind::GetReviewStatistics => Some(Self::ReviewStatistics),
            TaskKind::GetStudyMaterials => Some(Self::StudyMaterials),
            TaskKind::GetSummary => Some(Self::Summary),
            TaskKind::GetLevelProgression => Some(Self::LevelProgression),
            TaskKind::ReportSessionItem
            | TaskKind::SubmitStudyMaterial
            | TaskKind::GetPatchedAssignments
            | TaskKind::GetPatchedStudyMaterials
            | TaskKind::GetPatchedReviewStatistics => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::User => "last_user_sync_success",
            Self::SrsSystems => "last_srs_system_sync_success",
            Self::Subjects => "last_subject_sync_success",
            Self::Assignments => "last_assignment_sync_success",
            Self::ReviewStatistics => "last_review_statistic_sync_success",
            Self::StudyMaterials => "last_study_material_sync_success",
            Self::Summary => "last_summary_sync_success",
            Self::LevelProgression => "last_level_progression_sync_success",
        }
    }
}

/// Known property keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    ApiKeyRejected,
    ApiInError,
    LastApiSuccess,
    UserId,
    UserLevel,
    UserMaxLevel,
    VacationMode,
    FirstTimeSetup,
    ForceLateRefresh,
    SessionActive,
    Watermark(SyncedModel),
}

impl PropertyKey {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKey::ApiKeyRejected => "api_key_rejected",
            PropertyKey::ApiInError => "api_in_error",
            PropertyKey::LastApiSuccess => "last_api_success",
            PropertyKey::UserId => "user_id",
            PropertyKey::UserLevel => "user_level",
            PropertyKey::UserMaxLevel => "user_max_level_granted",
            PropertyKey::VacationMode => "vacation_mode",
            PropertyKey::FirstTimeSetup => "first_time_setup",
            PropertyKey::ForceLateRefresh => "force_late_refresh",
            PropertyKey::SessionActive => "session_active",
            PropertyKey::Watermark(model) => model.key(),
        }
    }
}

pub async fn get(db: &DatabaseConnection, key: PropertyKey) -> Result<Option<String>, DbErr> {
    Ok(Property::find_by_id(key.as_str().to_string())
        .one(db)
        .await?
        .map(|p| p.value))
}

pub async fn set(
    db: &DatabaseConnection,
    key: PropertyKey,
    value: impl Into<String>,
) -> Result<(), DbErr> {
    let model = ActiveModel {
        key: Set(key.as_str().to_string()),
        value: Set(value.into()),
    };
    Property::insert(model)
        .on_conflict(
            OnConflict::column(Column::Key)
                .update_column(Column::Value)
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}

pub async fn get_bool(db: &DatabaseConnection, key: PropertyKey) -> Result<bool, DbErr> {
    Ok(get(db, key).await?.is_some_and(|v| v == "true"))
}

pub async fn set_bool(db: &DatabaseConnection, key: PropertyKey, value: bool) -> Result<(), DbErr> {
    set(db, key, value.to_string()).await
}

pub async fn get_i64(db: &DatabaseConnection, key: PropertyKey) -> Result<i64, DbErr> {
    Ok(get(db, key)
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

pub async fn set_i64(db: &DatabaseConnection, key: PropertyKey, value: i64) -> Result<(), DbErr> {
    set(db, key, value.to_string()).await
}

/// Timestamp stored as epoch milliseconds. `None` when unset or zero.
pub async fn get_timestamp(
    db: &DatabaseConnection,
    key: PropertyKey,
) -> Result<Option<DateTime<Utc>>, DbErr> {
    let millis = get_i64(db, key).await?;
    Ok((millis > 0)
        .then(|| DateTime::<Utc>::from_timestamp_millis(millis))
        .flatten())
}

pub async fn set_timestamp(
    db: &DatabaseConnection,
    key: PropertyKey,
    at: DateTime<Utc>,
) -> Result<(), DbErr> {
    set_i64(db, key, at.timestamp_millis()).await
}

/// Watermark for an incremental fetch, shifted back by `overlap`.
pub async fn watermark(
    db: &DatabaseConnection,
    model: SyncedModel,
    overlap: chrono::Duration,
) -> Result<Option<DateTime<Utc>>, DbErr> {
    Ok(get_timestamp(db, PropertyKey::Watermark(model))
        .await?
        .map(|ts| ts - overlap))
}

/// When `model` was last fully synced, without any overlap.
pub async fn last_synced(
    db: &DatabaseConnection,
    model: SyncedModel,
) -> Result<Option<DateTime<Utc>>, DbErr> {
    watermark(db, model, chrono::Duration::zero()).await
}

pub async fn set_watermark(
    db: &DatabaseConnection,
    model: SyncedModel,
    at: DateTime<Utc>,
) -> Result<(), DbErr> {
    set_timestamp(db, PropertyKey::Watermark(model), at).await
}

/// Record a successful API round trip.
pub async fn mark_api_success(db: &DatabaseConnection) -> Result<(), DbErr> {
    set_timestamp(db, PropertyKey::LastApiSuccess, Utc::now()).await
}

/// Remove every property. Used when the remote account changes.
pub async fn clear_all(db: &DatabaseConnection) -> Result<u64, DbErr> {
    let result = Property::delete_many().exec(db).await?;
    Ok(result.rows_affected)
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::db::connect_and_migrate;

    #[test]
    fn only_full_sync_kinds_own_a_watermark() {
        let owners: std::collections::HashSet<&str> = TaskKind::ALL
            .into_iter()
            .filter_map(SyncedModel::for_kind)
            .map(|m| PropertyKey::Watermark(m).as_str())
            .collect();
        assert_eq!(owners.len(), 8);
        assert_eq!(SyncedModel::for_kind(TaskKind::GetPatchedAssignments), None);
        assert_eq!(SyncedModel::for_kind(TaskKind::ReportSessionItem), None);
    }

    #[tokio::test]
    async fn flags_default_to_false_and_overwrite() {
        let db = connect_and_migrate("sqlite::memory:").await.expect("db");

        assert!(!get_bool(&db, PropertyKey::ApiInError).await.expect("get"));
        set_bool(&db, PropertyKey::ApiInError, true).await.expect("set");
        assert!(get_bool(&db, PropertyKey::ApiInError).await.expect("get"));
        set_bool(&db, PropertyKey::ApiInError, false).await.expect("set");
        assert!(!get_bool(&db, PropertyKey::ApiInError).await.expect("get"));
    }

    #[tokio::test]
    async fn watermark_reads_subtract_the_overlap() {
        let db = connect_and_migrate("sqlite::memory:").await.expect("db");
        assert_eq!(
            watermark(&db, SyncedModel::Assignments, chrono::Duration::hours(1))
                .await
                .expect("unset"),
            None
        );

        let at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).expect("ts");
        set_watermark(&db, SyncedModel::Assignments, at)
            .await
            .expect("set");

        let read = watermark(&db, SyncedModel::Assignments, chrono::Duration::hours(1))
            .await
            .expect("read")
            .expect("present");
        assert_eq!(read, at - chrono::Duration::hours(1));
        assert_eq!(
            last_synced(&db, SyncedModel::Assignments).await.expect("read"),
            Some(at)
        );
        assert_eq!(
            last_synced(&db, SyncedModel::Summary).await.expect("unset"),
            None
        );
    }

    #[tokio::test]
    async fn clear_all_forgets_everything() {
        let db = connect_and_migrate("sqlite::memory:").await.expect("db");
        set_i64(&db, PropertyKey::UserLevel, 12).await.expect("set");
        set_bool(&db, PropertyKey::VacationMode, true).await.expect("set");

        assert_eq!(clear_all(&db).await.expect("clear"), 2);
        assert_eq!(get_i64(&db, PropertyKey::UserLevel).await.expect("get"), 0);
    }
}
