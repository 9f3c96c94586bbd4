//! Wiring of the engine's process-wide services.
//!
//! ```ignore
//! use srs_sync::{SyncEngine, SyncSettings, RunMode, connect_and_migrate};
//!
//! let db = connect_and_migrate("sqlite://srs-sync.db?mode=rwc").await?;
//! let engine = SyncEngine::builder()
//!     .database(db)
//!     .settings(SyncSettings::default())
//!     .build()?;
//!
//! engine.queue().assert_refresh_for_all_models(engine.settings()).await?;
//! engine.runner().run(RunMode::Foreground, None).await?;
//! ```

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::api::ApiClient;
use crate::api_state::{AlwaysOnline, ApiState, Connectivity};
use crate::http::{HttpError, HttpTransport};
use crate::queue::TaskQueue;
use crate::rate_limit::RateLimiter;
use crate::reconcile::PatchReconciler;
use crate::runner::TaskRunner;
use crate::settings::SyncSettings;
use crate::task::TaskContext;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error(transparent)]
    Transport(#[from] HttpError),
}

#[derive(Default)]
pub struct SyncEngineBuilder {
    database: Option<DatabaseConnection>,
    settings: Option<SyncSettings>,
    transport: Option<Arc<dyn HttpTransport>>,
    connectivity: Option<Arc<dyn Connectivity>>,
}

impl SyncEngineBuilder {
    pub fn database(mut self, db: DatabaseConnection) -> Self {
        self.database = Some(db);
        self
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Override the HTTP transport. Defaults to reqwest when that feature is on.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connectivity source. Defaults to [`AlwaysOnline`].
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    #[cfg(feature = "reqwest")]
    fn default_transport(settings: &SyncSettings) -> Result<Arc<dyn HttpTransport>, EngineError> {
        let transport = crate::http::reqwest_transport::ReqwestTransport::with_timeouts(
            settings.connect_timeout,
            settings.read_timeout,
        )?;
        Ok(Arc::new(transport))
    }

    #[cfg(not(feature = "reqwest"))]
    fn default_transport(_settings: &SyncSettings) -> Result<Arc<dyn HttpTransport>, EngineError> {
        Err(EngineError::MissingField { field: "transport" })
    }

    pub fn build(self) -> Result<SyncEngine, EngineError> {
        let db = self
            .database
            .map(Arc::new)
            .ok_or(EngineError::MissingField { field: "database" })?;
        let settings = Arc::new(self.settings.unwrap_or_default());
        let transport = match self.transport {
            Some(transport) => transport,
            None => Self::default_transport(&settings)?,
        };
        let connectivity = self.connectivity.unwrap_or_else(|| Arc::new(AlwaysOnline));

        let limiter = RateLimiter::from_settings(&settings);
        let api = ApiClient::new(transport, limiter, Arc::clone(&settings), Arc::clone(&db));
        let queue = TaskQueue::new(Arc::clone(&db));
        let runner = TaskRunner::new(TaskContext {
            db,
            api,
            queue,
            settings,
            connectivity,
        });
        Ok(SyncEngine { runner })
    }
}

/// One engine per process. Clones share the same runner lock and limiter.
#[derive(Clone)]
pub struct SyncEngine {
    runner: TaskRunner,
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.runner.context().queue
    }

    pub fn reconciler(&self) -> &PatchReconciler {
        self.runner.reconciler()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.runner.context().settings
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.runner.context().db
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.runner.context().api.limiter()
    }

    pub async fn api_state(&self) -> Result<ApiState, sea_orm::DbErr> {
        self.runner.context().api_state().await
    }
}
