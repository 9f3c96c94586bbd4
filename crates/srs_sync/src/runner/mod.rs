//! Single-flight drain of the task queue.
//!
//! A pass repeatedly takes the head record in `(priority, id)` order, builds
//! its task and runs it. The pass ends when the queue is empty, when the
//! head task cannot run yet, or when it fails in a retryable way. Only one
//! pass runs at a time; a second request while one is active is a no-op.

mod progress;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use progress::{ProgressCallback, RunnerEvent, StopReason, emit};

use crate::entity::task_kind::TaskKind;
use crate::error::Result;
use crate::properties::{self, PropertyKey};
use crate::reconcile::PatchReconciler;
use crate::task::{TaskContext, TaskOutcome, instantiate};

/// Drain-then-follow-up cycles per run. Follow-ups can queue refetches that
/// are worth running immediately, but never more than this.
const MAX_ROUNDS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Triggered by a user or foreground event.
    #[default]
    Foreground,
    /// Timer-driven. Clears the sticky API error flag before draining.
    Background,
}

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub completed: usize,
    /// Records removed without success (rejected, moot, unknown or unreadable).
    pub discarded: usize,
    pub stopped: Option<StopReason>,
    pub follow_ups: Vec<TaskKind>,
}

#[derive(Clone)]
pub struct TaskRunner {
    ctx: TaskContext,
    reconciler: PatchReconciler,
    lock: Arc<Mutex<()>>,
}

impl TaskRunner {
    pub fn new(ctx: TaskContext) -> Self {
        let reconciler = PatchReconciler::new(Arc::clone(&ctx.db), ctx.queue.clone());
        Self {
            ctx,
            reconciler,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn reconciler(&self) -> &PatchReconciler {
        &self.reconciler
    }

    /// Whether a pass is in progress right now.
    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Run pending tasks now.
    ///
    /// Returns `Ok(None)` without doing anything when another pass holds the
    /// runner. Storage failures outside a task abort the run.
    pub async fn run(
        &self,
        mode: RunMode,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Option<RunSummary>> {
        let Ok(_guard) = self.lock.try_lock() else {
            tracing::debug!("Drain pass already running, skipping");
            return Ok(None);
        };

        if mode == RunMode::Background {
            properties::set_bool(&self.ctx.db, PropertyKey::ApiInError, false).await?;
        }

        let mut summary = RunSummary::default();
        for _ in 0..MAX_ROUNDS {
            self.drain(&mut summary, on_progress).await?;
            if summary.stopped.is_some() {
                break;
            }
            let enqueued = self.follow_ups().await?;
            if enqueued.is_empty() {
                break;
            }
            emit(
                on_progress,
                RunnerEvent::FollowUpsEnqueued {
                    kinds: enqueued.clone(),
                },
            );
            summary.follow_ups.extend(enqueued);
        }

        let remaining = self.ctx.queue.count().await?;
        emit(
            on_progress,
            RunnerEvent::PassComplete {
                executed: summary.executed,
                remaining,
            },
        );
        tracing::info!(
            executed = summary.executed,
            completed = summary.completed,
            discarded = summary.discarded,
            remaining,
            stopped = summary.stopped.as_ref().map(ToString::to_string),
            "Drain pass finished"
        );
        Ok(Some(summary))
    }

    async fn drain(
        &self,
        summary: &mut RunSummary,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        let queue = &self.ctx.queue;
        emit(
            on_progress,
            RunnerEvent::PassStarted {
                pending: queue.count().await?,
            },
        );

        while let Some(record) = queue.peek_next_runnable().await? {
            let task = match instantiate(&record) {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!(task_id = record.id, kind = %record.kind, error = %e, "Discarding unusable task");
                    queue.remove(record.id).await?;
                    summary.discarded += 1;
                    emit(
                        on_progress,
                        RunnerEvent::TaskDiscarded {
                            id: record.id,
                            tag: record.kind.clone(),
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };
            let kind = task.kind();

            if !task.can_run_now(&self.ctx).await {
                tracing::debug!(task_id = record.id, kind = %kind, "Task cannot run now, ending pass");
                let reason = StopReason::NotRunnable { kind };
                emit(on_progress, RunnerEvent::Stopped { reason: reason.clone() });
                summary.stopped = Some(reason);
                return Ok(());
            }

            emit(on_progress, RunnerEvent::TaskStarted { id: record.id, kind });
            let outcome = task.execute(&self.ctx).await;
            summary.executed += 1;
            emit(
                on_progress,
                RunnerEvent::TaskFinished {
                    id: record.id,
                    kind,
                    outcome: outcome.clone(),
                },
            );

            match outcome {
                TaskOutcome::Done => {
                    queue.remove(record.id).await?;
                    summary.completed += 1;
                }
                TaskOutcome::Fatal(reason) => {
                    tracing::warn!(task_id = record.id, kind = %kind, %reason, "Task failed permanently, discarding");
                    queue.remove(record.id).await?;
                    summary.discarded += 1;
                }
                TaskOutcome::Retryable(reason) => {
                    tracing::info!(task_id = record.id, kind = %kind, %reason, "Task left queued");
                    let reason = StopReason::Retryable { kind, reason };
                    emit(on_progress, RunnerEvent::Stopped { reason: reason.clone() });
                    summary.stopped = Some(reason);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Post-pass checks, run once no API task is pending.
    async fn follow_ups(&self) -> Result<Vec<TaskKind>> {
        let db = &self.ctx.db;
        if self.ctx.queue.has_pending_api_tasks().await? {
            return Ok(Vec::new());
        }

        if !properties::get_bool(db, PropertyKey::FirstTimeSetup).await? {
            properties::set_bool(db, PropertyKey::FirstTimeSetup, true).await?;
            tracing::info!("First-time setup complete");
        }

        let mut enqueued = Vec::new();
        if !properties::get_bool(db, PropertyKey::SessionActive).await? {
            enqueued.extend(self.reconciler.enqueue_recovery_fetches().await?);
        }

        if properties::get_bool(db, PropertyKey::ForceLateRefresh).await? {
            properties::set_bool(db, PropertyKey::ForceLateRefresh, false).await?;
            enqueued.extend(
                self.ctx
                    .queue
                    .assert_refresh_for_all_models(&self.ctx.settings)
                    .await?,
            );
            if self
                .ctx
                .queue
                .assert_task(TaskKind::GetLevelProgression)
                .await?
                .is_some()
            {
                enqueued.push(TaskKind::GetLevelProgression);
            }
        }
        Ok(enqueued)
    }
}
