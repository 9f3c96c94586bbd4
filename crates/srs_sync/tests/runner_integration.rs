//! End-to-end drain passes against a scripted HTTP server.
//!
//! Every test builds a real engine over an in-memory replica and a
//! transport that replays canned responses per method and path. Runs are
//! wrapped in a timeout so a stuck limiter or lock fails fast instead of
//! hanging the suite.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use srs_sync::api::types::ApiAssignment;
use srs_sync::entity::subject::FieldGroup;
use srs_sync::properties::{self, PropertyKey, SyncedModel};
use srs_sync::{
    HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport, RunMode, RunSummary,
    StopReason, SyncEngine, SyncSettings, TaskKind, connect_and_migrate, subject,
};

const BASE: &str = "https://api.test";

/// Maximum time any drain pass should take in tests.
const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Replays queued responses keyed by method and path; the query string is ignored.
#[derive(Clone, Default)]
struct ScriptedServer {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    routes: HashMap<(HttpMethod, String), VecDeque<HttpResponse>>,
    seen: Vec<HttpRequest>,
}

fn path_of(url: &str) -> String {
    let without_base = url.strip_prefix(BASE).unwrap_or(url);
    without_base
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string()
}

impl ScriptedServer {
    fn reply(&self, method: HttpMethod, path: &str, status: u16, body: Value) {
        let response = HttpResponse {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        };
        self.inner
            .lock()
            .unwrap()
            .routes
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    fn fail(&self, method: HttpMethod, path: &str, status: u16) {
        self.reply(method, path, status, json!({"error": "scripted", "code": status}));
    }

    fn paths(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .seen
            .iter()
            .map(|r| path_of(&r.url))
            .collect()
    }

    fn request_count(&self) -> usize {
        self.inner.lock().unwrap().seen.len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedServer {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut script = self.inner.lock().unwrap();
        let key = (request.method, path_of(&request.url));
        script.seen.push(request);
        script
            .routes
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| HttpError::Transport(format!("unscripted {} {}", key.0, key.1)))
    }
}

async fn setup() -> (SyncEngine, ScriptedServer) {
    let db = connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    let server = ScriptedServer::default();
    let engine = SyncEngine::builder()
        .database(db)
        .settings(SyncSettings::for_testing(BASE))
        .transport(Arc::new(server.clone()))
        .build()
        .expect("engine");
    (engine, server)
}

/// Make the replica look like it synced the user a moment ago.
async fn mark_healthy(engine: &SyncEngine) {
    let db = engine.database();
    properties::mark_api_success(db).await.unwrap();
    properties::set_watermark(db, SyncedModel::User, Utc::now())
        .await
        .unwrap();
}

async fn run(engine: &SyncEngine) -> RunSummary {
    tokio::time::timeout(RUN_TIMEOUT, engine.runner().run(RunMode::Foreground, None))
        .await
        .expect("drain pass timed out")
        .expect("drain pass failed")
        .expect("runner was idle")
}

fn envelope(object: &str, data: Value) -> Value {
    json!({
        "object": object,
        "data_updated_at": "2024-03-01T10:00:00.000000Z",
        "data": data,
    })
}

fn entity(id: i64, object: &str, data: Value) -> Value {
    let mut value = envelope(object, data);
    value["id"] = json!(id);
    value
}

fn collection(items: Vec<Value>) -> Value {
    json!({
        "object": "collection",
        "pages": {"next_url": null},
        "data": items,
    })
}

fn empty_summary() -> Value {
    envelope("report", json!({"lessons": [], "reviews": []}))
}

#[tokio::test]
async fn user_fetch_runs_before_queued_mutations() {
    let (engine, server) = setup().await;
    properties::set_bool(engine.database(), PropertyKey::SessionActive, true)
        .await
        .unwrap();
    engine
        .queue()
        .enqueue(TaskKind::ReportSessionItem, "0 440 9 LESSON 0 0")
        .await
        .unwrap();
    engine.queue().enqueue(TaskKind::GetUser, "").await.unwrap();

    let head = engine.queue().peek_next_runnable().await.unwrap().unwrap();
    assert_eq!(head.priority, 2);

    server.reply(
        HttpMethod::Get,
        "/v2/user",
        200,
        envelope(
            "user",
            json!({
                "id": "u-1", "username": "tester", "level": 3,
                "subscription": {"active": true, "max_level_granted": 60},
                "current_vacation_started_at": null
            }),
        ),
    );
    server.reply(
        HttpMethod::Put,
        "/v2/assignments/9/start",
        200,
        entity(
            9,
            "assignment",
            json!({
                "subject_id": 440, "srs_stage": 1,
                "unlocked_at": "2024-01-01T00:00:00Z", "started_at": "2024-03-01T00:00:00Z"
            }),
        ),
    );

    let summary = run(&engine).await;
    assert_eq!(summary.completed, 2);
    assert_eq!(server.paths(), vec!["/v2/user", "/v2/assignments/9/start"]);
    assert_eq!(engine.queue().count().await.unwrap(), 0);
}

#[tokio::test]
async fn transient_failures_are_retried_within_one_pass() {
    let (engine, server) = setup().await;
    mark_healthy(&engine).await;
    engine.queue().assert_task(TaskKind::GetSummary).await.unwrap();
    for _ in 0..3 {
        server.fail(HttpMethod::Get, "/v2/summary", 503);
    }
    server.reply(HttpMethod::Get, "/v2/summary", 200, empty_summary());

    let summary = run(&engine).await;
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.stopped, None);
    assert_eq!(server.request_count(), 4);
    assert_eq!(engine.queue().count().await.unwrap(), 0);

    let db = engine.database();
    assert!(!properties::get_bool(db, PropertyKey::ApiInError).await.unwrap());
    assert!(!properties::get_bool(db, PropertyKey::ApiKeyRejected).await.unwrap());
    assert!(properties::last_synced(db, SyncedModel::Summary).await.unwrap().is_some());
}

#[tokio::test]
async fn rejected_key_parks_the_queue() {
    let (engine, server) = setup().await;
    mark_healthy(&engine).await;
    engine.queue().assert_task(TaskKind::GetSummary).await.unwrap();
    server.fail(HttpMethod::Get, "/v2/summary", 401);

    let first = run(&engine).await;
    assert!(matches!(
        first.stopped,
        Some(StopReason::Retryable {
            kind: TaskKind::GetSummary,
            ..
        })
    ));
    assert_eq!(server.request_count(), 1);
    assert_eq!(engine.queue().count().await.unwrap(), 1);
    assert!(
        properties::get_bool(engine.database(), PropertyKey::ApiKeyRejected)
            .await
            .unwrap()
    );

    let second = run(&engine).await;
    assert_eq!(second.executed, 0);
    assert_eq!(
        second.stopped,
        Some(StopReason::NotRunnable {
            kind: TaskKind::GetSummary
        })
    );
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn lost_confirmation_is_recovered_by_refetch() {
    let (engine, server) = setup().await;
    mark_healthy(&engine).await;

    let record = engine
        .reconciler()
        .start_lesson(440, Utc::now())
        .await
        .unwrap();
    // The confirming call never makes it to the server.
    assert!(engine.queue().remove(record).await.unwrap());
    assert_eq!(
        subject::patched_subject_ids(engine.database(), FieldGroup::Assignment)
            .await
            .unwrap(),
        vec![440]
    );

    server.reply(
        HttpMethod::Get,
        "/v2/assignments",
        200,
        collection(vec![entity(
            9,
            "assignment",
            json!({
                "subject_id": 440, "srs_stage": 1,
                "unlocked_at": "2024-01-01T00:00:00Z", "started_at": "2024-03-01T00:00:00Z"
            }),
        )]),
    );

    let summary = run(&engine).await;
    assert_eq!(summary.follow_ups, vec![TaskKind::GetPatchedAssignments]);
    assert_eq!(summary.completed, 1);
    assert!(
        subject::patched_subject_ids(engine.database(), FieldGroup::Assignment)
            .await
            .unwrap()
            .is_empty()
    );
    let row = subject::find_by_id(engine.database(), 440)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.assignment_id, 9);
    assert_eq!(row.srs_stage, 1);
}

#[tokio::test]
async fn active_session_defers_recovery() {
    let (engine, server) = setup().await;
    mark_healthy(&engine).await;
    properties::set_bool(engine.database(), PropertyKey::SessionActive, true)
        .await
        .unwrap();
    subject::patch_assignment(
        engine.database(),
        440,
        &ApiAssignment {
            subject_id: 440,
            srs_stage: 2,
            unlocked_at: Some(Utc::now()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let summary = run(&engine).await;
    assert!(summary.follow_ups.is_empty());
    assert_eq!(server.request_count(), 0);
    assert_eq!(engine.queue().count().await.unwrap(), 0);
}

#[tokio::test]
async fn repeated_collection_fetch_is_idempotent() {
    let (engine, server) = setup().await;
    mark_healthy(&engine).await;
    properties::set_bool(engine.database(), PropertyKey::SessionActive, true)
        .await
        .unwrap();
    let assignment = entity(
        9,
        "assignment",
        json!({"subject_id": 440, "srs_stage": 4, "unlocked_at": "2024-01-01T00:00:00Z"}),
    );

    for _ in 0..2 {
        server.reply(
            HttpMethod::Get,
            "/v2/assignments",
            200,
            collection(vec![assignment.clone()]),
        );
        engine
            .queue()
            .assert_task(TaskKind::GetAssignments)
            .await
            .unwrap();
        let summary = run(&engine).await;
        assert_eq!(summary.completed, 1);
    }

    let row = subject::find_by_id(engine.database(), 440)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.srs_stage, 4);
    assert_eq!(row.assignment_id, 9);
    assert!(!row.assignment_patched);
    assert_eq!(server.request_count(), 2);
    let second = &server.inner.lock().unwrap().seen[1];
    assert!(second.url.contains("updated_after="));
}
