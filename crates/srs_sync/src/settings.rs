//! Engine tuning knobs.
//!
//! Everything here has a sensible default; the CLI maps its layered
//! configuration onto this struct before building the engine.

use std::time::Duration;

/// Production API base URL. Relative request URIs are resolved against it.
pub const DEFAULT_BASE_URL: &str = "https://api.wanikani.com";

/// API revision sent with every request.
pub const DEFAULT_API_REVISION: &str = "20170710";

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub base_url: String,
    pub api_revision: String,
    pub user_agent: String,
    /// Personal API token. `None` puts the engine in the key-missing state.
    pub api_key: Option<String>,

    pub connect_timeout: Duration,
    pub read_timeout: Duration,

    /// Minimum spacing between outbound calls.
    pub request_interval: Duration,
    /// Calls allowed back-to-back before pacing kicks in.
    pub request_burst: u32,
    /// Cooldown after a 429, expressed in request intervals.
    pub cooldown_intervals: u32,

    /// Total attempts per outbound call, including the first.
    pub max_attempts: usize,
    /// Fixed wait between attempts.
    pub retry_delay: Duration,

    /// Session timestamps older than this are reported to the server verbatim.
    pub backdate_threshold: chrono::Duration,
    /// Reviews due before `now + review_lookahead` that the summary does not
    /// list are pushed out of the review pool.
    pub review_lookahead: chrono::Duration,
    /// Overlap subtracted from incremental watermarks.
    pub watermark_overlap: chrono::Duration,
    /// Without a successful call for this long the API state becomes `Expired`.
    pub api_success_ttl: chrono::Duration,
    /// User data older than this triggers a `RefreshUserData` state.
    pub user_data_ttl: chrono::Duration,
    /// SRS systems are re-fetched on full refresh once older than this.
    pub srs_systems_ttl: chrono::Duration,

    /// Allow API calls on metered connections.
    pub allow_metered: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_revision: DEFAULT_API_REVISION.to_string(),
            user_agent: format!("srs-sync/{}", env!("CARGO_PKG_VERSION")),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            request_interval: Duration::from_millis(1100),
            request_burst: 1,
            cooldown_intervals: 4,
            max_attempts: 4,
            retry_delay: Duration::from_secs(2),
            backdate_threshold: chrono::Duration::minutes(5),
            review_lookahead: chrono::Duration::hours(1),
            watermark_overlap: chrono::Duration::hours(1),
            api_success_ttl: chrono::Duration::hours(1),
            user_data_ttl: chrono::Duration::hours(1),
            srs_systems_ttl: chrono::Duration::days(1),
            allow_metered: true,
        }
    }
}

impl SyncSettings {
    /// Settings pointed at a test server with pacing and delays disabled.
    #[must_use]
    pub fn for_testing(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: Some("test-key".to_string()),
            request_interval: Duration::from_millis(1),
            retry_delay: Duration::from_millis(10),
            ..Self::default()
        }
    }

    /// Resolve a site-relative URI against the base URL.
    #[must_use]
    pub fn resolve(&self, uri: &str) -> String {
        if uri.starts_with("https://") || uri.starts_with("http://") {
            uri.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), uri)
        }
    }
}
