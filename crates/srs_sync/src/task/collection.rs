//! Incremental collection fetches.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set, sea_query::OnConflict};
use serde::de::DeserializeOwned;

use super::{SyncTask, TaskContext, TaskOutcome};
use crate::api::Entity;
use crate::api::types::{
    ApiAssignment, ApiLevelProgression, ApiReviewStatistic, ApiStudyMaterial, ApiSubject,
};
use crate::entity::level_progression::{self, Entity as LevelProgression};
use crate::entity::task_kind::TaskKind;
use crate::error::Result;
use crate::properties::{self, SyncedModel};
use crate::subject;

/// A wire type that can be written into the local replica.
#[async_trait]
pub(crate) trait ApplyEntity: DeserializeOwned + Send + Sync + Sized {
    async fn apply(db: &DatabaseConnection, entity: &Entity<Self>) -> std::result::Result<(), DbErr>;
}

#[async_trait]
impl ApplyEntity for ApiSubject {
    async fn apply(db: &DatabaseConnection, entity: &Entity<Self>) -> std::result::Result<(), DbErr> {
        subject::apply_subject(db, entity).await.map(drop)
    }
}

#[async_trait]
impl ApplyEntity for ApiAssignment {
    async fn apply(db: &DatabaseConnection, entity: &Entity<Self>) -> std::result::Result<(), DbErr> {
        subject::apply_assignment(db, entity).await.map(drop)
    }
}

#[async_trait]
impl ApplyEntity for ApiReviewStatistic {
    async fn apply(db: &DatabaseConnection, entity: &Entity<Self>) -> std::result::Result<(), DbErr> {
        subject::apply_review_statistic(db, entity).await.map(drop)
    }
}

#[async_trait]
impl ApplyEntity for ApiStudyMaterial {
    async fn apply(db: &DatabaseConnection, entity: &Entity<Self>) -> std::result::Result<(), DbErr> {
        subject::apply_study_material(db, entity).await.map(drop)
    }
}

#[async_trait]
impl ApplyEntity for ApiLevelProgression {
    async fn apply(db: &DatabaseConnection, entity: &Entity<Self>) -> std::result::Result<(), DbErr> {
        let data = &entity.data;
        let model = level_progression::ActiveModel {
            id: Set(entity.id),
            level: Set(data.level),
            unlocked_at: Set(data.unlocked_at.map(|t| t.fixed_offset())),
            started_at: Set(data.started_at.map(|t| t.fixed_offset())),
            passed_at: Set(data.passed_at.map(|t| t.fixed_offset())),
            completed_at: Set(data.completed_at.map(|t| t.fixed_offset())),
            abandoned_at: Set(data.abandoned_at.map(|t| t.fixed_offset())),
            created_at: Set(data.created_at.map(|t| t.fixed_offset())),
        };
        LevelProgression::insert(model)
            .on_conflict(
                OnConflict::column(level_progression::Column::Id)
                    .update_columns([
                        level_progression::Column::Level,
                        level_progression::Column::UnlockedAt,
                        level_progression::Column::StartedAt,
                        level_progression::Column::PassedAt,
                        level_progression::Column::CompletedAt,
                        level_progression::Column::AbandonedAt,
                        level_progression::Column::CreatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await
            .map(drop)
    }
}

/// Walk every page of `uri`, applying each entity as it arrives.
///
/// Returns the number of entities applied. Nothing is recorded as synced
/// here; the caller advances watermarks once this returns `Ok`.
pub(crate) async fn fetch_and_apply<T: ApplyEntity>(ctx: &TaskContext, uri: &str) -> Result<usize> {
    let mut pages = ctx.api.collection::<T>(uri);
    let mut applied = 0;
    while let Some(page) = pages.next_page().await? {
        for entity in &page.items {
            T::apply(&ctx.db, entity).await?;
            applied += 1;
        }
    }
    Ok(applied)
}

/// Full or incremental fetch of one collection endpoint.
#[derive(Debug, Clone, Copy)]
pub struct CollectionTask {
    kind: TaskKind,
}

impl CollectionTask {
    pub fn new(kind: TaskKind) -> Self {
        Self { kind }
    }

    fn endpoint(&self) -> &'static str {
        match self.kind {
            TaskKind::GetSubjects => "/v2/subjects",
            TaskKind::GetAssignments => "/v2/assignments",
            TaskKind::GetReviewStatistics => "/v2/review_statistics",
            TaskKind::GetStudyMaterials => "/v2/study_materials",
            _ => "/v2/level_progressions",
        }
    }

    fn model(&self) -> SyncedModel {
        match self.kind {
            TaskKind::GetSubjects => SyncedModel::Subjects,
            TaskKind::GetAssignments => SyncedModel::Assignments,
            TaskKind::GetReviewStatistics => SyncedModel::ReviewStatistics,
            TaskKind::GetStudyMaterials => SyncedModel::StudyMaterials,
            _ => SyncedModel::LevelProgression,
        }
    }

    /// Subjects, assignments and study materials re-read an overlap window
    /// to catch records written around the previous run.
    fn overlap(&self, ctx: &TaskContext) -> chrono::Duration {
        match self.kind {
            TaskKind::GetSubjects | TaskKind::GetAssignments | TaskKind::GetStudyMaterials => {
                ctx.settings.watermark_overlap
            }
            _ => chrono::Duration::zero(),
        }
    }
}

#[async_trait]
impl SyncTask for CollectionTask {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let started = Utc::now();
        let model = self.model();
        let since = properties::watermark(&ctx.db, model, self.overlap(ctx)).await?;

        let params: Vec<(&str, String)> = since
            .map(|at| {
                (
                    "updated_after",
                    at.to_rfc3339_opts(SecondsFormat::Millis, true),
                )
            })
            .into_iter()
            .collect();
        let uri = ctx.api.url(self.endpoint(), &params);

        let applied = match self.kind {
            TaskKind::GetSubjects => fetch_and_apply::<ApiSubject>(ctx, &uri).await?,
            TaskKind::GetAssignments => fetch_and_apply::<ApiAssignment>(ctx, &uri).await?,
            TaskKind::GetReviewStatistics => fetch_and_apply::<ApiReviewStatistic>(ctx, &uri).await?,
            TaskKind::GetStudyMaterials => fetch_and_apply::<ApiStudyMaterial>(ctx, &uri).await?,
            _ => fetch_and_apply::<ApiLevelProgression>(ctx, &uri).await?,
        };

        properties::set_watermark(&ctx.db, model, started).await?;
        properties::mark_api_success(&ctx.db).await?;
        tracing::info!(kind = %self.kind, applied, incremental = since.is_some(), "Collection synced");
        Ok(TaskOutcome::Done)
    }
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::entity::subject::Entity as Subject;
    use crate::http::HttpMethod;
    use crate::test_support::{entity, harness, page};
    use serde_json::json;

    fn assignments_page() -> serde_json::Value {
        page(vec![
            entity(1, "assignment", json!({"subject_id": 10, "srs_stage": 2, "unlocked_at": "2024-01-01T00:00:00Z"})),
            entity(2, "assignment", json!({"subject_id": 11, "srs_stage": 0})),
        ])
    }

    #[tokio::test]
    async fn first_run_is_full_and_sets_the_watermark() {
        let h = harness().await;
        h.transport
            .push_json(HttpMethod::Get, h.url("/v2/assignments"), 200, assignments_page());

        let task = CollectionTask::new(TaskKind::GetAssignments);
        assert_eq!(task.execute(&h.ctx).await, TaskOutcome::Done);

        assert_eq!(Subject::find().all(h.db()).await.unwrap().len(), 2);
        assert!(
            properties::watermark(h.db(), SyncedModel::Assignments, chrono::Duration::zero())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn later_runs_ask_for_updates_since_the_overlap() {
        let h = harness().await;
        let synced = "2024-03-01T12:00:00Z".parse::<chrono::DateTime<Utc>>().unwrap();
        properties::set_watermark(h.db(), SyncedModel::Assignments, synced)
            .await
            .unwrap();
        h.transport.push_json(
            HttpMethod::Get,
            h.url("/v2/assignments?updated_after=2024-03-01T11%3A00%3A00.000Z"),
            200,
            page(Vec::new()),
        );

        let task = CollectionTask::new(TaskKind::GetAssignments);
        assert_eq!(task.execute(&h.ctx).await, TaskOutcome::Done);
    }

    #[tokio::test]
    async fn applying_a_page_twice_matches_applying_it_once() {
        let h = harness().await;
        let task = CollectionTask::new(TaskKind::GetAssignments);
        h.transport
            .push_json(HttpMethod::Get, h.url("/v2/assignments"), 200, assignments_page());
        task.execute(&h.ctx).await;
        let once = Subject::find().all(h.db()).await.unwrap();

        // Simulate a crash before the watermark advanced.
        properties::clear_all(h.db()).await.unwrap();
        h.transport
            .push_json(HttpMethod::Get, h.url("/v2/assignments"), 200, assignments_page());
        task.execute(&h.ctx).await;
        let twice = Subject::find().all(h.db()).await.unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn failed_page_leaves_the_watermark_alone() {
        let h = harness().await;
        let next = h.url("/v2/assignments?page_after_id=2");
        let mut first = assignments_page();
        first["pages"]["next_url"] = json!(next);
        h.transport
            .push_json(HttpMethod::Get, h.url("/v2/assignments"), 200, first);
        for _ in 0..4 {
            h.transport.push_status(HttpMethod::Get, &next, 500);
        }

        let task = CollectionTask::new(TaskKind::GetAssignments);
        assert!(matches!(task.execute(&h.ctx).await, TaskOutcome::Retryable(_)));
        assert!(
            properties::watermark(h.db(), SyncedModel::Assignments, chrono::Duration::zero())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn level_progressions_are_upserted() {
        let h = harness().await;
        let body = page(vec![entity(5, "level_progression", json!({"level": 3, "unlocked_at": "2024-01-01T00:00:00Z"}))]);
        h.transport
            .push_json(HttpMethod::Get, h.url("/v2/level_progressions"), 200, body);
        let task = CollectionTask::new(TaskKind::GetLevelProgression);
        assert_eq!(task.execute(&h.ctx).await, TaskOutcome::Done);

        let rows = LevelProgression::find().all(h.db()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].level, 3);
    }
}
