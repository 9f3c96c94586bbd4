//! Progress events emitted by the task runner.

use crate::entity::task_kind::TaskKind;
use crate::task::TaskOutcome;

/// Why a drain pass ended before the queue was empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The head task may not run in the current connectivity or API state.
    NotRunnable { kind: TaskKind },
    /// The head task failed and stays queued for the next pass.
    Retryable { kind: TaskKind, reason: String },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::NotRunnable { kind } => write!(f, "{kind} cannot run now"),
            StopReason::Retryable { kind, reason } => write!(f, "{kind} will be retried: {reason}"),
        }
    }
}

/// Progress events emitted during a drain pass.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RunnerEvent {
    /// A pass acquired the runner lock.
    PassStarted {
        /// Records queued at the start of the pass.
        pending: u64,
    },

    TaskStarted { id: i64, kind: TaskKind },

    TaskFinished {
        id: i64,
        kind: TaskKind,
        outcome: TaskOutcome,
    },

    /// A record was dropped without running (unknown tag or unreadable payload).
    TaskDiscarded {
        id: i64,
        tag: String,
        reason: String,
    },

    Stopped { reason: StopReason },

    /// Post-pass checks queued more work.
    FollowUpsEnqueued { kinds: Vec<TaskKind> },

    PassComplete {
        executed: usize,
        /// Records still queued.
        remaining: u64,
    },
}

pub type ProgressCallback = Box<dyn Fn(RunnerEvent) + Send + Sync>;

#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: RunnerEvent) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_the_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let callback: ProgressCallback = Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(Some(&callback), RunnerEvent::PassStarted { pending: 3 });
        emit(
            Some(&callback),
            RunnerEvent::TaskStarted {
                id: 1,
                kind: TaskKind::GetUser,
            },
        );

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn emit_without_callback_is_a_no_op() {
        emit(None, RunnerEvent::PassStarted { pending: 0 });
    }

    #[test]
    fn stop_reason_names_the_kind() {
        let reason = StopReason::Retryable {
            kind: TaskKind::GetSummary,
            reason: "HTTP 503".to_string(),
        };
        let text = reason.to_string();
        assert!(text.contains("get_summary"));
        assert!(text.contains("HTTP 503"));
    }
}
