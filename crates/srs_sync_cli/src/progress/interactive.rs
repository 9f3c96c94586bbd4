use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use srs_sync::{RunnerEvent, TaskOutcome};

/// Interactive progress reporter using indicatif.
///
/// One spinner per pass; finished passes leave a single summary line.
pub struct InteractiveReporter {
    draw_target: fn() -> ProgressDrawTarget,
    bar: Mutex<Option<ProgressBar>>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            draw_target: ProgressDrawTarget::stderr,
            bar: Mutex::new(None),
        }
    }

    /// A reporter that draws nowhere.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            draw_target: ProgressDrawTarget::hidden,
            bar: Mutex::new(None),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {prefix:.bold} {pos} done {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    pub fn handle(&self, event: RunnerEvent) {
        let mut slot = self.bar.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            RunnerEvent::PassStarted { pending } => {
                // A second round reuses the spinner of the first
                if slot.is_none() {
                    let bar = ProgressBar::with_draw_target(None, (self.draw_target)());
                    bar.set_style(Self::spinner_style());
                    bar.set_prefix("Sync");
                    bar.enable_steady_tick(Duration::from_millis(100));
                    *slot = Some(bar);
                }
                if let Some(bar) = slot.as_ref() {
                    bar.set_message(format!("({pending} queued)"));
                }
            }

            RunnerEvent::TaskStarted { id, kind } => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message(format!("{kind} #{id}"));
                }
            }

            RunnerEvent::TaskFinished { kind, outcome, .. } => {
                if let Some(bar) = slot.as_ref() {
                    match outcome {
                        TaskOutcome::Done => bar.inc(1),
                        TaskOutcome::Fatal(reason) => bar.println(format!(
                            "{} {kind}: {reason}",
                            style("discarded").red()
                        )),
                        TaskOutcome::Retryable(_) => {}
                    }
                }
            }

            RunnerEvent::TaskDiscarded { tag, reason, .. } => {
                if let Some(bar) = slot.as_ref() {
                    bar.println(format!("{} {tag}: {reason}", style("dropped").red()));
                }
            }

            RunnerEvent::Stopped { reason } => {
                if let Some(bar) = slot.as_ref() {
                    bar.println(format!("{} {reason}", style("stopped").yellow()));
                }
            }

            RunnerEvent::FollowUpsEnqueued { kinds } => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message(format!("{} follow-up(s) queued", kinds.len()));
                }
            }

            RunnerEvent::PassComplete {
                executed,
                remaining,
            } => {
                if let Some(bar) = slot.take() {
                    let line = format!("{executed} task(s) run, {remaining} left");
                    if remaining == 0 {
                        bar.finish_with_message(style(line).green().to_string());
                    } else {
                        bar.finish_with_message(style(line).yellow().to_string());
                    }
                }
            }

            _ => {}
        }
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
