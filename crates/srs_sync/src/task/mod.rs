//! Sync tasks: one unit of remote work bound to one queue record.
//!
//! [`instantiate`] is the closed registry mapping a stored record to its
//! task. Every task reports a [`TaskOutcome`] instead of raising, and the
//! runner alone decides what happens to the record.

mod collection;
mod patched;
mod session_item;
mod srs_systems;
mod study_material;
mod summary;
mod user;

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbErr};

pub use collection::CollectionTask;
pub use patched::PatchedFetchTask;
pub use session_item::{ReportSessionItemTask, SessionItemPayload, SessionType};
pub use srs_systems::GetSrsSystemsTask;
pub use study_material::{StudyMaterialPayload, SubmitStudyMaterialTask};
pub use summary::GetSummaryTask;
pub use user::GetUserTask;

use crate::api::ApiClient;
use crate::api_state::{ApiState, Connectivity};
use crate::entity::task_kind::TaskKind;
use crate::entity::task_record::Model as TaskRecord;
use crate::error::{Result, SyncError};
use crate::queue::TaskQueue;
use crate::settings::SyncSettings;

/// What a task reports back to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Confirmed complete; the record is removed.
    Done,
    /// Not complete but may succeed later; the record stays untouched.
    Retryable(String),
    /// Permanently moot or rejected; the record is removed.
    Fatal(String),
}

impl TaskOutcome {
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    /// Whether the record should leave the queue.
    pub fn removes_record(&self) -> bool {
        !matches!(self, Self::Retryable(_))
    }
}

impl From<SyncError> for TaskOutcome {
    fn from(err: SyncError) -> Self {
        if err.is_retryable() {
            Self::Retryable(err.to_string())
        } else {
            Self::Fatal(err.to_string())
        }
    }
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Retryable(reason) => write!(f, "retryable: {reason}"),
            Self::Fatal(reason) => write!(f, "fatal: {reason}"),
        }
    }
}

/// Services a task may use. One per process, shared by reference.
#[derive(Clone)]
pub struct TaskContext {
    pub db: Arc<DatabaseConnection>,
    pub api: ApiClient,
    pub queue: TaskQueue,
    pub settings: Arc<SyncSettings>,
    pub connectivity: Arc<dyn Connectivity>,
}

impl TaskContext {
    pub async fn api_state(&self) -> std::result::Result<ApiState, DbErr> {
        ApiState::load(&self.db, &self.settings).await
    }

    pub fn is_online(&self) -> bool {
        self.connectivity
            .status()
            .allows_api_calls(self.settings.allow_metered)
    }
}

#[async_trait]
pub trait SyncTask: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Whether the task may run now. `false` ends the drain pass without
    /// consuming the record.
    async fn can_run_now(&self, ctx: &TaskContext) -> bool {
        if !ctx.is_online() {
            return false;
        }
        match ctx.api_state().await {
            Ok(state) if self.kind().runs_on_user_data_state() => state.can_get_user_data(),
            Ok(state) => state.is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read API state");
                false
            }
        }
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome>;

    async fn execute(&self, ctx: &TaskContext) -> TaskOutcome {
        match self.run(ctx).await {
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        }
    }
}

/// Build the task for a stored record.
///
/// Fails with [`SyncError::UnknownTaskKind`] for tags this build does not
/// know and [`SyncError::InvalidPayload`] when the payload cannot be decoded.
pub fn instantiate(record: &TaskRecord) -> Result<Box<dyn SyncTask>> {
    let kind = record
        .task_kind()
        .ok_or_else(|| SyncError::UnknownTaskKind(record.kind.clone()))?;
    let payload = record.payload.as_str();

    let task: Box<dyn SyncTask> = match kind {
        TaskKind::GetUser => Box::new(GetUserTask),
        TaskKind::GetSrsSystems => Box::new(GetSrsSystemsTask),
        TaskKind::GetSubjects
        | TaskKind::GetAssignments
        | TaskKind::GetReviewStatistics
        | TaskKind::GetStudyMaterials
        | TaskKind::GetLevelProgression => Box::new(CollectionTask::new(kind)),
        TaskKind::GetPatchedAssignments
        | TaskKind::GetPatchedReviewStatistics
        | TaskKind::GetPatchedStudyMaterials => Box::new(PatchedFetchTask::parse(kind, payload)?),
        TaskKind::ReportSessionItem => Box::new(ReportSessionItemTask::new(payload.parse()?)),
        TaskKind::SubmitStudyMaterial => Box::new(SubmitStudyMaterialTask::new(payload.parse()?)),
        TaskKind::GetSummary => Box::new(GetSummaryTask),
    };
    Ok(task)
}
