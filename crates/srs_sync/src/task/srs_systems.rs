//! Full refresh of the SRS stage tables.

use async_trait::async_trait;
use chrono::Utc;

use super::{SyncTask, TaskContext, TaskOutcome};
use crate::api::types::ApiSrsSystem;
use crate::entity::task_kind::TaskKind;
use crate::error::Result;
use crate::properties::{self, SyncedModel};
use crate::srs::{SrsRegistry, SrsSystem};

#[derive(Debug, Clone, Copy, Default)]
pub struct GetSrsSystemsTask;

#[async_trait]
impl SyncTask for GetSrsSystemsTask {
    fn kind(&self) -> TaskKind {
        TaskKind::GetSrsSystems
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let started = Utc::now();
        let mut pages = ctx.api.collection::<ApiSrsSystem>("/v2/spaced_repetition_systems");
        let mut systems = Vec::new();
        while let Some(page) = pages.next_page().await? {
            for entity in &page.items {
                match SrsSystem::from_api(entity.id, &entity.data) {
                    Ok(system) => systems.push(system),
                    Err(e) => tracing::warn!(error = %e, "Ignoring invalid SRS system"),
                }
            }
        }

        SrsRegistry::replace_stored(&ctx.db, &systems).await?;
        properties::set_watermark(&ctx.db, SyncedModel::SrsSystems, started).await?;
        properties::mark_api_success(&ctx.db).await?;
        tracing::info!(count = systems.len(), "SRS systems replaced");
        Ok(TaskOutcome::Done)
    }
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::test_support::{entity, harness, page};
    use serde_json::json;

    #[tokio::test]
    async fn replaces_stored_systems() {
        let h = harness().await;
        let stages: Vec<_> = (0..=9)
            .map(|p| json!({"position": p, "interval": if p == 0 || p == 9 { None } else { Some(3600) }, "interval_unit": "seconds"}))
            .collect();
        h.transport.push_json(
            HttpMethod::Get,
            h.url("/v2/spaced_repetition_systems"),
            200,
            page(vec![entity(
                1,
                "spaced_repetition_system",
                json!({
                    "name": "standard",
                    "unlocking_stage_position": 0,
                    "starting_stage_position": 1,
                    "passing_stage_position": 5,
                    "burning_stage_position": 9,
                    "stages": stages,
                }),
            )]),
        );

        assert_eq!(GetSrsSystemsTask.execute(&h.ctx).await, TaskOutcome::Done);
        let registry = SrsRegistry::load(h.db()).await.unwrap();
        assert_eq!(registry.len(), 1);
        let system = registry.get(1).unwrap();
        assert_eq!(system.next_stage(4, 0), 5);
        assert!(
            properties::watermark(h.db(), SyncedModel::SrsSystems, chrono::Duration::zero())
                .await
                .unwrap()
                .is_some()
        );
    }
}
