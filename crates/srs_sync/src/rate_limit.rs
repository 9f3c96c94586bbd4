//! Outbound call pacing with a server-driven cooldown.
//!
//! Pacing is a `governor` token bucket sized from the configured request
//! interval and burst. A 429 from the server puts the limiter into a
//! cooldown that every caller honors before it may take a token.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use tokio::time::Instant;

use crate::settings::SyncSettings;

type DirectLimiter = Governor<NotKeyed, InMemoryState, DefaultClock>;

/// Shared limiter. Clones share both the bucket and the cooldown.
#[derive(Clone)]
pub struct RateLimiter {
    pacer: Arc<DirectLimiter>,
    cooldown_until: Arc<Mutex<Option<Instant>>>,
    cooldown: Duration,
}

impl RateLimiter {
    /// Create a limiter allowing `burst` calls per `interval`.
    ///
    /// A zero interval disables pacing; a zero burst is treated as one.
    pub fn new(interval: Duration, burst: u32, cooldown: Duration) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
            .allow_burst(burst);

        Self {
            pacer: Arc::new(Governor::direct(quota)),
            cooldown_until: Arc::new(Mutex::new(None)),
            cooldown,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            settings.request_interval,
            settings.request_burst,
            settings.request_interval * settings.cooldown_intervals,
        )
    }

    /// Wait for permission to dispatch one call.
    pub async fn acquire(&self) {
        while let Some(remaining) = self.cooldown_remaining() {
            tracing::debug!(
                remaining_ms = remaining.as_millis() as u64,
                "Rate limiter cooling down"
            );
            tokio::time::sleep(remaining).await;
        }
        self.pacer.until_ready().await;
    }

    /// Enter the cooldown after the server answered 429.
    ///
    /// Repeated pauses extend the cooldown from the latest 429, never shorten it.
    pub fn pause(&self) {
        let until = Instant::now() + self.cooldown;
        let mut slot = self
            .cooldown_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if slot.is_none_or(|current| current < until) {
            *slot = Some(until);
        }
        tracing::warn!(
            cooldown_ms = self.cooldown.as_millis() as u64,
            "Server signalled too many requests, pausing outbound calls"
        );
    }

    /// Time left in the current cooldown, if any.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let mut slot = self
            .cooldown_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match *slot {
            Some(until) => {
                let now = Instant::now();
                if until > now {
                    Some(until - now)
                } else {
                    *slot = None;
                    None
                }
            }
            None => None,
        }
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_remaining().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_limiter(cooldown: Duration) -> RateLimiter {
        RateLimiter::new(Duration::from_millis(1), 10, cooldown)
    }

    #[tokio::test]
    async fn acquire_is_immediate_without_cooldown() {
        let limiter = fast_limiter(Duration::from_secs(5));
        assert!(!limiter.is_cooling_down());
        limiter.acquire().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pause_delays_every_clone_until_cooldown_ends() {
        let limiter = fast_limiter(Duration::from_secs(5));
        let other = limiter.clone();

        limiter.pause();
        assert!(other.is_cooling_down());

        let start = Instant::now();
        other.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(!limiter.is_cooling_down());
    }

    #[tokio::test(start_paused = true)]
    async fn later_pause_extends_the_cooldown() {
        let limiter = fast_limiter(Duration::from_secs(4));
        limiter.pause();
        tokio::time::advance(Duration::from_secs(3)).await;
        limiter.pause();

        let remaining = limiter.cooldown_remaining().expect("still cooling down");
        assert!(remaining > Duration::from_secs(3));
    }

    #[test]
    fn settings_drive_the_cooldown_length() {
        let settings = SyncSettings::default();
        let limiter = RateLimiter::from_settings(&settings);
        assert_eq!(limiter.cooldown, Duration::from_millis(4400));
    }

    #[test]
    fn zero_interval_and_burst_are_tolerated() {
        let limiter = RateLimiter::new(Duration::ZERO, 0, Duration::ZERO);
        limiter.pause();
        assert!(!limiter.is_cooling_down());
    }
}
