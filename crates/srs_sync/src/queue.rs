//! Durable, priority-ordered task queue.
//!
//! Records are drained in `(priority asc, id asc)` order. The auto-increment
//! id doubles as the enqueue sequence, so equal priorities run in the order
//! they were enqueued. Enqueue never waits for a running drain pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entity::task_kind::TaskKind;
use crate::entity::task_record::{ActiveModel, Column, Entity as TaskRecord, Model};
use crate::properties::{self, SyncedModel};
use crate::settings::SyncSettings;

/// Handle to the persisted queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TaskQueue {
    db: Arc<DatabaseConnection>,
}

impl TaskQueue {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    // ─── Mutation ───────────────────────────────────────────────────────────

    /// Enqueue at the kind's default priority. Returns the record id.
    pub async fn enqueue(&self, kind: TaskKind, payload: impl Into<String>) -> Result<i64, DbErr> {
        self.enqueue_with_priority(kind, kind.priority(), payload)
            .await
    }

    pub async fn enqueue_with_priority(
        &self,
        kind: TaskKind,
        priority: i32,
        payload: impl Into<String>,
    ) -> Result<i64, DbErr> {
        let model = ActiveModel {
            kind: Set(kind.as_str().to_string()),
            priority: Set(priority),
            payload: Set(payload.into()),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        let result = TaskRecord::insert(model).exec(self.db.as_ref()).await?;
        tracing::debug!(
            task_id = result.last_insert_id,
            kind = %kind,
            priority,
            "Enqueued task"
        );
        Ok(result.last_insert_id)
    }

    /// Enqueue `kind` unless one is already pending.
    ///
    /// Mutations always enqueue since each carries its own user data.
    /// Returns the new record id, or `None` when an existing record covers it.
    pub async fn assert_task(&self, kind: TaskKind) -> Result<Option<i64>, DbErr> {
        self.assert_task_with_payload(kind, "").await
    }

    pub async fn assert_task_with_payload(
        &self,
        kind: TaskKind,
        payload: impl Into<String>,
    ) -> Result<Option<i64>, DbErr> {
        if !kind.is_mutation() && self.has_pending(kind).await? {
            return Ok(None);
        }
        self.enqueue(kind, payload).await.map(Some)
    }

    /// Assert a refresh of every regularly synced model.
    ///
    /// SRS systems change rarely and are only refreshed once their
    /// watermark is older than `srs_systems_ttl`.
    pub async fn assert_refresh_for_all_models(
        &self,
        settings: &SyncSettings,
    ) -> Result<Vec<TaskKind>, DbErr> {
        let mut kinds = vec![
            TaskKind::GetUser,
            TaskKind::GetAssignments,
            TaskKind::GetReviewStatistics,
            TaskKind::GetStudyMaterials,
            TaskKind::GetSummary,
        ];

        let srs_synced = properties::last_synced(&self.db, SyncedModel::SrsSystems).await?;
        let srs_stale = srs_synced.is_none_or(|at| Utc::now() - at > settings.srs_systems_ttl);
        if srs_stale {
            kinds.push(TaskKind::GetSrsSystems);
        }

        let mut asserted = Vec::new();
        for kind in kinds {
            if self.assert_task(kind).await?.is_some() {
                asserted.push(kind);
            }
        }
        Ok(asserted)
    }

    pub async fn remove(&self, id: i64) -> Result<bool, DbErr> {
        let result = TaskRecord::delete_by_id(id).exec(self.db.as_ref()).await?;
        Ok(result.rows_affected > 0)
    }

    /// Drop every pending record. Used on account reset.
    pub async fn clear_all(&self) -> Result<u64, DbErr> {
        let result = TaskRecord::delete_many().exec(self.db.as_ref()).await?;
        Ok(result.rows_affected)
    }

    // ─── Query ──────────────────────────────────────────────────────────────

    /// The record that should run next: lowest priority value, then oldest.
    pub async fn peek_next_runnable(&self) -> Result<Option<Model>, DbErr> {
        TaskRecord::find()
            .order_by_asc(Column::Priority)
            .order_by_asc(Column::Id)
            .one(self.db.as_ref())
            .await
    }

    /// Every pending record in drain order.
    pub async fn list(&self) -> Result<Vec<Model>, DbErr> {
        TaskRecord::find()
            .order_by_asc(Column::Priority)
            .order_by_asc(Column::Id)
            .all(self.db.as_ref())
            .await
    }

    pub async fn has_pending(&self, kind: TaskKind) -> Result<bool, DbErr> {
        let count = TaskRecord::find()
            .filter(Column::Kind.eq(kind.as_str()))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    /// Number of pending records that talk to the remote API.
    ///
    /// Every known kind is an API kind; records with unknown tags are not
    /// counted since the runner discards them without a call.
    pub async fn count_api(&self) -> Result<u64, DbErr> {
        let tags: Vec<&str> = TaskKind::ALL.iter().map(|k| k.as_str()).collect();
        TaskRecord::find()
            .filter(Column::Kind.is_in(tags))
            .count(self.db.as_ref())
            .await
    }

    pub async fn has_pending_api_tasks(&self) -> Result<bool, DbErr> {
        Ok(self.count_api().await? > 0)
    }

    pub async fn count(&self) -> Result<u64, DbErr> {
        TaskRecord::find().count(self.db.as_ref()).await
    }

    /// Pending record count per stored tag, sorted by tag.
    pub async fn counts_by_kind(&self) -> Result<BTreeMap<String, i64>, DbErr> {
        let rows: Vec<(String, i64)> = TaskRecord::find()
            .select_only()
            .column(Column::Kind)
            .column_as(Column::Id.count(), "count")
            .group_by(Column::Kind)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().collect())
    }
}
