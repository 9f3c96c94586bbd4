use srs_sync::{RunnerEvent, TaskOutcome};

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: RunnerEvent) {
        match event {
            RunnerEvent::PassStarted { pending } => {
                tracing::info!(pending, "Draining task queue");
            }

            RunnerEvent::TaskStarted { id, kind } => {
                tracing::debug!(task_id = id, kind = %kind, "Running task");
            }

            RunnerEvent::TaskFinished { id, kind, outcome } => match outcome {
                TaskOutcome::Done => {
                    tracing::info!(task_id = id, kind = %kind, "Task done");
                }
                TaskOutcome::Fatal(reason) => {
                    tracing::warn!(task_id = id, kind = %kind, reason = %reason, "Task discarded");
                }
                TaskOutcome::Retryable(reason) => {
                    tracing::info!(task_id = id, kind = %kind, reason = %reason, "Task will retry");
                }
            },

            RunnerEvent::TaskDiscarded { id, tag, reason } => {
                tracing::warn!(task_id = id, tag = %tag, reason = %reason, "Unusable task discarded");
            }

            RunnerEvent::Stopped { reason } => {
                tracing::info!(reason = %reason, "Pass stopped early");
            }

            RunnerEvent::FollowUpsEnqueued { kinds } => {
                let kinds: Vec<String> = kinds.iter().map(ToString::to_string).collect();
                tracing::info!(kinds = %kinds.join(","), "Follow-up tasks queued");
            }

            RunnerEvent::PassComplete {
                executed,
                remaining,
            } => {
                tracing::info!(executed, remaining, "Pass complete");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
