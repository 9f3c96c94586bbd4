//! Configuration file support for srs-sync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `SRS_SYNC_`, e.g., `SRS_SYNC_API_KEY`)
//! 3. Config file (~/.config/srs-sync/config.toml or ./srs-sync.toml)
//! 4. Built-in defaults
//!
//! Keys are single words so every one of them maps onto an environment
//! variable without ambiguity.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/srs-sync/replica.db"  # optional, this is the default
//!
//! [api]
//! key = "..."          # or use SRS_SYNC_API_KEY
//! url = "https://api.wanikani.com"
//! timeout = 60         # read timeout, seconds
//!
//! [sync]
//! interval = 1100      # ms between requests
//! burst = 1
//! attempts = 4
//! lookahead = 60       # minutes
//! backdate = 5         # minutes
//! metered = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use srs_sync::SyncSettings;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Replica connection URL.
    /// Defaults to `sqlite://~/.local/state/srs-sync/replica.db` if not specified.
    pub url: Option<String>,
}

/// Remote API configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Personal API token. Can also be set via SRS_SYNC_API_KEY.
    pub key: Option<String>,
    /// Base URL override, mostly useful against a staging server.
    pub url: Option<String>,
    /// API revision header override.
    pub revision: Option<String>,
    /// Read timeout in seconds.
    pub timeout: Option<u64>,
}

/// Queue and pacing options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Milliseconds between outbound requests.
    pub interval: u64,
    /// Requests allowed back-to-back.
    pub burst: u32,
    /// Attempts per request, including the first.
    pub attempts: usize,
    /// Review lookahead for summary repair, in minutes.
    pub lookahead: i64,
    /// Answers older than this many minutes are reported with their timestamp.
    pub backdate: i64,
    /// Whether to talk to the API on metered connections.
    pub metered: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let defaults = SyncSettings::default();
        Self {
            interval: u64::try_from(defaults.request_interval.as_millis()).unwrap_or(u64::MAX),
            burst: defaults.request_burst,
            attempts: defaults.max_attempts,
            lookahead: defaults.review_lookahead.num_minutes(),
            backdate: defaults.backdate_threshold.num_minutes(),
            metered: defaults.allow_metered,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/srs-sync/config.toml)
    /// 3. Local config file (./srs-sync.toml)
    /// 4. Environment variables with SRS_SYNC_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "srs-sync") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("srs-sync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./srs-sync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., SRS_SYNC_API_KEY -> api.key
        builder = builder.add_source(
            Environment::with_prefix("SRS_SYNC")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("replica.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Map the loaded configuration onto engine settings.
    pub fn sync_settings(&self) -> SyncSettings {
        let mut settings = SyncSettings {
            api_key: self.api.key.clone().filter(|k| !k.trim().is_empty()),
            request_interval: Duration::from_millis(self.sync.interval),
            request_burst: self.sync.burst.max(1),
            max_attempts: self.sync.attempts.max(1),
            review_lookahead: chrono::Duration::minutes(self.sync.lookahead.max(0)),
            backdate_threshold: chrono::Duration::minutes(self.sync.backdate.max(0)),
            allow_metered: self.sync.metered,
            ..SyncSettings::default()
        };
        if let Some(url) = &self.api.url {
            settings.base_url = url.clone();
        }
        if let Some(revision) = &self.api.revision {
            settings.api_revision = revision.clone();
        }
        if let Some(secs) = self.api.timeout {
            settings.read_timeout = Duration::from_secs(secs);
        }
        settings
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/srs-sync` or `~/.local/state/srs-sync`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "srs-sync").map(|dirs| {
            // state_dir() returns None on macOS/Windows, fall back to data_dir
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
