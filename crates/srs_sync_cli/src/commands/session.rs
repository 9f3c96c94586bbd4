use chrono::Utc;
use srs_sync::properties::{self, PropertyKey};
use srs_sync::{ReviewResult, SyncEngine};

use crate::SessionAction;

pub(crate) async fn handle_lesson(
    engine: &SyncEngine,
    subject_id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let task = engine
        .reconciler()
        .start_lesson(subject_id, Utc::now())
        .await?;
    println!("Lesson for subject {subject_id} recorded locally (task {task}).");
    Ok(())
}

pub(crate) async fn handle_review(
    engine: &SyncEngine,
    subject_id: i64,
    meaning_incorrect: i32,
    reading_incorrect: i32,
) -> Result<(), Box<dyn std::error::Error>> {
    if meaning_incorrect < 0 || reading_incorrect < 0 {
        return Err("incorrect answer counts cannot be negative".into());
    }
    let task = engine
        .reconciler()
        .record_review(ReviewResult {
            subject_id,
            meaning_incorrect,
            reading_incorrect,
            answered_at: Utc::now(),
        })
        .await?;
    println!("Review for subject {subject_id} recorded locally (task {task}).");
    Ok(())
}

pub(crate) async fn handle_session(
    engine: &SyncEngine,
    action: SessionAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let active = matches!(action, SessionAction::Begin);
    properties::set_bool(engine.database(), PropertyKey::SessionActive, active).await?;
    if active {
        println!("Session opened.");
    } else {
        println!("Session closed.");
    }
    Ok(())
}
