//! Progress reporting for drain passes.
//!
//! This module provides two modes of progress reporting:
//! - Interactive mode (TTY): a spinner per pass using indicatif
//! - Logging mode (non-TTY): structured logging using tracing

mod interactive;
mod logging;

use std::sync::Arc;

use console::Term;
use srs_sync::{ProgressCallback, RunnerEvent};

pub use interactive::InteractiveReporter;
pub use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub enum ProgressReporter {
    /// Interactive spinner for TTY.
    Interactive(InteractiveReporter),
    /// Structured logging for non-TTY (cron, pipes).
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive(_))
    }

    pub fn handle(&self, event: RunnerEvent) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a callback the runner can drive.
    pub fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| {
            reporter.handle(event);
        })
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
