//! srs_sync - Offline-first synchronization for spaced-repetition review data.
//!
//! The engine keeps a local SQLite replica of a remote SRS service and moves
//! every piece of remote work through a durable task queue:
//!
//! - [`TaskQueue`] stores pending work ordered by priority.
//! - [`TaskRunner`] drains it one task at a time, single-flight, and stops a
//!   pass at the first task that cannot run or needs another attempt.
//! - [`RateLimiter`] paces outbound calls and backs off after a 429.
//! - [`PatchReconciler`] applies local answers immediately, marks the changed
//!   rows as patched and enqueues the confirming calls.
//! - [`SrsSystem::next_stage`] computes where an item lands after an answer.
//!
//! # Features
//!
//! - `sqlite` - SQLite backend (default).
//! - `migrate` - Enables [`connect_and_migrate`] and the [`migration`] module.
//! - `reqwest` - Default HTTP transport backed by reqwest.
//!
//! # Example
//!
//! ```ignore
//! use srs_sync::{connect_and_migrate, RunMode, SyncEngine, SyncSettings};
//!
//! let db = connect_and_migrate("sqlite://srs-sync.db?mode=rwc").await?;
//! let engine = SyncEngine::builder()
//!     .database(db)
//!     .settings(SyncSettings { api_key: Some(token), ..Default::default() })
//!     .build()?;
//!
//! engine.queue().assert_refresh_for_all_models(engine.settings()).await?;
//! if let Some(summary) = engine.runner().run(RunMode::Foreground, None).await? {
//!     println!("{} tasks executed", summary.executed);
//! }
//! ```

pub mod api;
pub mod api_state;
pub mod db;
pub mod engine;
pub mod entity;
pub mod error;
pub mod http;
pub mod properties;
pub mod queue;
pub mod rate_limit;
pub mod reconcile;
pub mod retry;
pub mod runner;
pub mod settings;
pub mod srs;
pub mod subject;
pub mod summary;
pub mod task;

#[cfg(feature = "migrate")]
pub mod migration;

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod test_support;

pub use api::{ApiClient, ApiError};
pub use api_state::{AlwaysOnline, ApiState, Connectivity, OnlineStatus};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use engine::{EngineError, SyncEngine, SyncEngineBuilder};
pub use entity::prelude::*;
pub use error::{Result, SyncError};
pub use http::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
pub use queue::TaskQueue;
pub use rate_limit::RateLimiter;
pub use reconcile::{PatchReconciler, ReviewResult};
pub use runner::{ProgressCallback, RunMode, RunSummary, RunnerEvent, StopReason, TaskRunner};
pub use settings::SyncSettings;
pub use srs::{SrsError, SrsRegistry, SrsStage, SrsSystem};
pub use task::{SessionItemPayload, StudyMaterialPayload, SyncTask, TaskContext, TaskOutcome};
