//! Fixed-delay retry for individual outbound calls.
//!
//! Each call gets `max_attempts` tries. Only retryable [`ApiError`]s are
//! retried; a rejected key or payload ends the loop on the spot.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::api::ApiError;
use crate::settings::SyncSettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    /// Wait between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.max_attempts, settings.retry_delay)
    }

    #[must_use]
    pub fn into_backoff(self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

/// Run `operation` under `policy`.
///
/// `before_retry` runs ahead of every attempt after the first; the API
/// client uses it to clear the sticky error flag so a recovered server is
/// not reported as failing.
pub async fn call_with_retry<T, Op, Fut, Hook, HookFut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: Op,
    mut before_retry: Hook,
) -> Result<T, ApiError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    Hook: FnMut() -> HookFut,
    HookFut: Future<Output = ()>,
{
    let attempt = AtomicUsize::new(0);

    let retry_op = || {
        let n = attempt.fetch_add(1, Ordering::SeqCst);
        let hook = (n > 0).then(&mut before_retry);
        let call = operation();
        async move {
            if let Some(hook) = hook {
                hook.await;
            }
            call.await
        }
    };

    retry_op
        .retry(policy.clone().into_backoff())
        .sleep(tokio::time::sleep)
        .when(ApiError::is_retryable)
        .notify(|err, dur| {
            tracing::debug!(
                label,
                attempt = attempt.load(Ordering::SeqCst),
                retry_in_ms = dur.as_millis() as u64,
                error = %err,
                "API call failed, retrying"
            );
        })
        .await
}
