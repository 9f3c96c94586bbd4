//! User profile fetch. Also detects a change of remote account.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::EntityTrait;

use super::{SyncTask, TaskContext, TaskOutcome};
use crate::api::types::ApiUser;
use crate::entity::level_progression::Entity as LevelProgression;
use crate::entity::srs_system::Entity as SrsSystemRow;
use crate::entity::task_kind::TaskKind;
use crate::error::Result;
use crate::properties::{self, PropertyKey, SyncedModel};
use crate::subject;

#[derive(Debug, Clone, Copy, Default)]
pub struct GetUserTask;

/// Wipe the local replica after the key started answering for another account.
async fn reset_replica(ctx: &TaskContext) -> Result<()> {
    let tasks = ctx.queue.clear_all().await?;
    let subjects = subject::reset(&ctx.db).await?;
    SrsSystemRow::delete_many().exec(ctx.db.as_ref()).await?;
    LevelProgression::delete_many().exec(ctx.db.as_ref()).await?;
    properties::clear_all(&ctx.db).await?;
    tracing::warn!(tasks, subjects, "Remote account changed, local replica reset");
    Ok(())
}

#[async_trait]
impl SyncTask for GetUserTask {
    fn kind(&self) -> TaskKind {
        TaskKind::GetUser
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let started = Utc::now();
        let user: ApiUser = ctx.api.get_data("/v2/user").await?;

        let known_id = properties::get(&ctx.db, PropertyKey::UserId).await?;
        let account_changed = known_id.as_deref().is_some_and(|id| id != user.id);
        if account_changed {
            reset_replica(ctx).await?;
        }

        let previous_level = properties::get_i64(&ctx.db, PropertyKey::UserLevel).await?;
        if previous_level > 0 && previous_level != i64::from(user.level) {
            tracing::info!(from = previous_level, to = user.level, "User level changed");
            properties::set_bool(&ctx.db, PropertyKey::ForceLateRefresh, true).await?;
        }

        properties::set(&ctx.db, PropertyKey::UserId, user.id.as_str()).await?;
        properties::set_i64(&ctx.db, PropertyKey::UserLevel, user.level.into()).await?;
        properties::set_i64(&ctx.db, PropertyKey::UserMaxLevel, user.max_level_granted().into())
            .await?;
        properties::set_bool(&ctx.db, PropertyKey::VacationMode, user.is_on_vacation()).await?;
        properties::set_bool(&ctx.db, PropertyKey::ApiKeyRejected, false).await?;
        properties::set_bool(&ctx.db, PropertyKey::ApiInError, false).await?;
        properties::set_watermark(&ctx.db, SyncedModel::User, started).await?;
        properties::mark_api_success(&ctx.db).await?;

        if account_changed {
            ctx.queue.assert_refresh_for_all_models(&ctx.settings).await?;
            ctx.queue.assert_task(TaskKind::GetSubjects).await?;
            ctx.queue.assert_task(TaskKind::GetLevelProgression).await?;
        }

        tracing::info!(username = %user.username, level = user.level, "User synced");
        Ok(TaskOutcome::Done)
    }
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::api::types::ApiAssignment;
    use crate::http::HttpMethod;
    use crate::test_support::harness;
    use serde_json::json;

    fn user(id: &str, level: i32) -> serde_json::Value {
        json!({
            "object": "user",
            "data_updated_at": "2024-03-01T10:00:00Z",
            "data": {
                "id": id,
                "username": "tester",
                "level": level,
                "subscription": {"active": true, "max_level_granted": 60},
                "current_vacation_started_at": null
            }
        })
    }

    #[tokio::test]
    async fn stores_profile_and_clears_flags() {
        let h = harness().await;
        properties::set_bool(h.db(), PropertyKey::ApiInError, true).await.unwrap();
        h.transport
            .push_json(HttpMethod::Get, h.url("/v2/user"), 200, user("u-1", 4));

        assert_eq!(GetUserTask.execute(&h.ctx).await, TaskOutcome::Done);
        assert_eq!(properties::get(h.db(), PropertyKey::UserId).await.unwrap().as_deref(), Some("u-1"));
        assert_eq!(properties::get_i64(h.db(), PropertyKey::UserLevel).await.unwrap(), 4);
        assert_eq!(properties::get_i64(h.db(), PropertyKey::UserMaxLevel).await.unwrap(), 60);
        assert!(!properties::get_bool(h.db(), PropertyKey::ApiInError).await.unwrap());
        assert!(!properties::get_bool(h.db(), PropertyKey::ForceLateRefresh).await.unwrap());
    }

    #[tokio::test]
    async fn level_change_forces_late_refresh() {
        let h = harness().await;
        properties::set(h.db(), PropertyKey::UserId, "u-1").await.unwrap();
        properties::set_i64(h.db(), PropertyKey::UserLevel, 3).await.unwrap();
        h.transport
            .push_json(HttpMethod::Get, h.url("/v2/user"), 200, user("u-1", 4));

        assert_eq!(GetUserTask.execute(&h.ctx).await, TaskOutcome::Done);
        assert!(properties::get_bool(h.db(), PropertyKey::ForceLateRefresh).await.unwrap());
    }

    #[tokio::test]
    async fn account_change_resets_the_replica() {
        let h = harness().await;
        properties::set(h.db(), PropertyKey::UserId, "u-1").await.unwrap();
        subject::patch_assignment(
            h.db(),
            440,
            &ApiAssignment {
                subject_id: 440,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        h.ctx.queue.enqueue(TaskKind::ReportSessionItem, "0 440 9 REVIEW 0 0").await.unwrap();
        h.transport
            .push_json(HttpMethod::Get, h.url("/v2/user"), 200, user("u-2", 1));

        assert_eq!(GetUserTask.execute(&h.ctx).await, TaskOutcome::Done);
        assert!(subject::find_by_id(h.db(), 440).await.unwrap().is_none());
        assert_eq!(properties::get(h.db(), PropertyKey::UserId).await.unwrap().as_deref(), Some("u-2"));

        let queue = h.ctx.queue.counts_by_kind().await.unwrap();
        assert!(!queue.contains_key("report_session_item"));
        assert!(queue.contains_key("get_subjects"));
        assert!(queue.contains_key("get_srs_systems"));
    }
}
