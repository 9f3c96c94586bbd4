//! Targeted refetch of subjects whose local patch was never confirmed.

use async_trait::async_trait;

use super::collection::fetch_and_apply;
use super::{SyncTask, TaskContext, TaskOutcome};
use crate::api::types::{ApiAssignment, ApiReviewStatistic, ApiStudyMaterial};
use crate::entity::subject::FieldGroup;
use crate::entity::task_kind::TaskKind;
use crate::error::{Result, SyncError};
use crate::properties;
use crate::subject;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedFetchTask {
    kind: TaskKind,
    subject_ids: Vec<i64>,
}

impl PatchedFetchTask {
    /// The patched-refetch kind that resolves markers of `group`.
    pub fn kind_for(group: FieldGroup) -> TaskKind {
        match group {
            FieldGroup::Assignment => TaskKind::GetPatchedAssignments,
            FieldGroup::ReviewStatistic => TaskKind::GetPatchedReviewStatistics,
            FieldGroup::StudyMaterial => TaskKind::GetPatchedStudyMaterials,
        }
    }

    /// Payload listing `ids`, comma separated.
    pub fn encode(ids: &[i64]) -> String {
        ids.iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn parse(kind: TaskKind, payload: &str) -> Result<Self> {
        let subject_ids = payload
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>()
                    .map_err(|_| SyncError::invalid_payload(kind, format!("bad subject id {s:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { kind, subject_ids })
    }

    pub fn subject_ids(&self) -> &[i64] {
        &self.subject_ids
    }

    fn group(&self) -> FieldGroup {
        match self.kind {
            TaskKind::GetPatchedReviewStatistics => FieldGroup::ReviewStatistic,
            TaskKind::GetPatchedStudyMaterials => FieldGroup::StudyMaterial,
            _ => FieldGroup::Assignment,
        }
    }

    fn endpoint(&self) -> &'static str {
        match self.group() {
            FieldGroup::Assignment => "/v2/assignments",
            FieldGroup::ReviewStatistic => "/v2/review_statistics",
            FieldGroup::StudyMaterial => "/v2/study_materials",
        }
    }
}

#[async_trait]
impl SyncTask for PatchedFetchTask {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        if self.subject_ids.is_empty() {
            return Ok(TaskOutcome::Done);
        }

        let uri = ctx
            .api
            .url(self.endpoint(), &[("subject_ids", Self::encode(&self.subject_ids))]);
        let applied = match self.group() {
            FieldGroup::Assignment => fetch_and_apply::<ApiAssignment>(ctx, &uri).await?,
            FieldGroup::ReviewStatistic => fetch_and_apply::<ApiReviewStatistic>(ctx, &uri).await?,
            FieldGroup::StudyMaterial => fetch_and_apply::<ApiStudyMaterial>(ctx, &uri).await?,
        };

        // The server had its say on every listed id, including those it omitted.
        let cleared = subject::clear_patched(&ctx.db, self.group(), &self.subject_ids).await?;
        properties::mark_api_success(&ctx.db).await?;

        tracing::info!(
            kind = %self.kind,
            requested = self.subject_ids.len(),
            applied,
            cleared,
            "Patched subjects refetched"
        );
        Ok(TaskOutcome::Done)
    }
}
