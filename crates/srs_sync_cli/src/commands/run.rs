use std::sync::Arc;
use std::time::Duration;

use srs_sync::{RunMode, RunSummary, SyncEngine};

use crate::progress::ProgressReporter;
use crate::shutdown::is_shutdown_requested;

/// Granularity of the shutdown check while waiting between watch passes.
const WATCH_TICK: Duration = Duration::from_millis(250);

fn print_summary(summary: &RunSummary) {
    println!(
        "Executed {} task(s): {} completed, {} discarded.",
        summary.executed, summary.completed, summary.discarded
    );
    if !summary.follow_ups.is_empty() {
        let kinds: Vec<String> = summary.follow_ups.iter().map(ToString::to_string).collect();
        println!("Queued follow-ups: {}", kinds.join(", "));
    }
    if let Some(reason) = &summary.stopped {
        println!("Stopped early: {reason}");
    }
}

async fn run_once(
    engine: &SyncEngine,
    mode: RunMode,
    reporter: &Arc<ProgressReporter>,
) -> Result<(), Box<dyn std::error::Error>> {
    let callback = reporter.as_callback();
    match engine.runner().run(mode, Some(&callback)).await? {
        Some(summary) => {
            if reporter.is_interactive() {
                print_summary(&summary);
            }
        }
        None => println!("Another drain pass is already running."),
    }
    Ok(())
}

/// Sleep for `period`, waking early when shutdown is requested.
async fn wait_or_shutdown(period: Duration) {
    let mut waited = Duration::ZERO;
    while waited < period && !is_shutdown_requested() {
        let step = WATCH_TICK.min(period - waited);
        tokio::time::sleep(step).await;
        waited += step;
    }
}

pub(crate) async fn handle_run(
    engine: &SyncEngine,
    background: bool,
    watch: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if background {
        RunMode::Background
    } else {
        RunMode::Foreground
    };
    let reporter = Arc::new(ProgressReporter::new());

    let Some(secs) = watch else {
        return run_once(engine, mode, &reporter).await;
    };

    let period = Duration::from_secs(secs.max(1));
    tracing::info!(period_secs = period.as_secs(), "Watching queue");
    while !is_shutdown_requested() {
        run_once(engine, mode, &reporter).await?;
        if let Some(remaining) = engine.limiter().cooldown_remaining() {
            tracing::info!(remaining_ms = remaining.as_millis() as u64, "Rate limit cooldown active");
        }
        wait_or_shutdown(period).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_after_period() {
        let started = std::time::Instant::now();
        wait_or_shutdown(Duration::from_millis(30)).await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
