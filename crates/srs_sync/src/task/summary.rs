//! Summary fetch and lesson/review pool repair.

use async_trait::async_trait;
use chrono::Utc;

use super::{SyncTask, TaskContext, TaskOutcome};
use crate::api::types::ApiSummary;
use crate::entity::task_kind::TaskKind;
use crate::error::Result;
use crate::properties::{self, PropertyKey, SyncedModel};
use crate::srs::SrsRegistry;
use crate::summary::{self, LevelLimits};

#[derive(Debug, Clone, Copy, Default)]
pub struct GetSummaryTask;

#[async_trait]
impl SyncTask for GetSummaryTask {
    fn kind(&self) -> TaskKind {
        TaskKind::GetSummary
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        if properties::get_bool(&ctx.db, PropertyKey::VacationMode).await? {
            tracing::debug!("Vacation mode, summary skipped");
            return Ok(TaskOutcome::Done);
        }

        let now = Utc::now();
        let data: ApiSummary = ctx.api.get_data("/v2/summary").await?;
        let registry = SrsRegistry::load(&ctx.db).await?;
        let limits = LevelLimits::load(&ctx.db).await?;
        let report = summary::repair(
            &ctx.db,
            &registry,
            &data,
            limits,
            now,
            ctx.settings.review_lookahead,
        )
        .await?;

        properties::set_watermark(&ctx.db, SyncedModel::Summary, now).await?;
        properties::mark_api_success(&ctx.db).await?;
        tracing::info!(
            lessons_forced = report.lessons_forced,
            lessons_pruned = report.lessons_pruned,
            reviews_forced = report.reviews_forced,
            reviews_pruned = report.reviews_pruned,
            "Summary applied"
        );
        Ok(TaskOutcome::Done)
    }
}
