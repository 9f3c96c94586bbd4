//! Shared fixtures for database-backed task tests.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};

use crate::api::ApiClient;
use crate::api_state::AlwaysOnline;
use crate::db::connect_and_migrate;
use crate::http::MockTransport;
use crate::properties::{self, SyncedModel};
use crate::queue::TaskQueue;
use crate::rate_limit::RateLimiter;
use crate::settings::SyncSettings;
use crate::task::TaskContext;

pub const BASE: &str = "https://api.test";

pub struct Harness {
    pub ctx: TaskContext,
    pub transport: MockTransport,
}

impl Harness {
    pub fn db(&self) -> &DatabaseConnection {
        &self.ctx.db
    }

    pub fn url(&self, path: &str) -> String {
        format!("{BASE}{path}")
    }
}

pub async fn harness() -> Harness {
    let db = Arc::new(
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("Failed to create test database"),
    );
    let transport = MockTransport::new();
    let settings = Arc::new(SyncSettings::for_testing(BASE));
    let limiter = RateLimiter::from_settings(&settings);
    let api = ApiClient::new(
        Arc::new(transport.clone()),
        limiter,
        Arc::clone(&settings),
        Arc::clone(&db),
    );
    Harness {
        ctx: TaskContext {
            queue: TaskQueue::new(Arc::clone(&db)),
            db,
            api,
            settings,
            connectivity: Arc::new(AlwaysOnline),
        },
        transport,
    }
}

/// Pretend a user fetch just succeeded so the API state reads `Ok`.
pub async fn mark_healthy(db: &DatabaseConnection) {
    properties::mark_api_success(db).await.expect("mark success");
    properties::set_watermark(db, SyncedModel::User, Utc::now())
        .await
        .expect("user watermark");
}

pub fn entity(id: i64, object: &str, data: Value) -> Value {
    json!({
        "id": id,
        "object": object,
        "data_updated_at": "2024-03-01T10:00:00.000000Z",
        "data": data,
    })
}

pub fn page(items: Vec<Value>) -> Value {
    json!({
        "object": "collection",
        "pages": {"next_url": null},
        "data": items,
    })
}
