//! Optimistic local mutations and recovery of unconfirmed patches.
//!
//! Every mutation here writes the predicted values locally, sets the field
//! group's patched marker, and enqueues the task that will confirm it. The
//! marker is only cleared by server data, never from this module.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::api::types::{ApiAssignment, ApiReviewStatistic, ApiStudyMaterial};
use crate::entity::subject::{FieldGroup, Model as SubjectRow};
use crate::entity::task_kind::TaskKind;
use crate::error::Result;
use crate::queue::TaskQueue;
use crate::srs::SrsRegistry;
use crate::subject;
use crate::task::{PatchedFetchTask, SessionItemPayload, SessionType, StudyMaterialPayload};

/// One answered review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewResult {
    pub subject_id: i64,
    pub meaning_incorrect: i32,
    pub reading_incorrect: i32,
    pub answered_at: DateTime<Utc>,
}

impl ReviewResult {
    pub fn total_incorrect(&self) -> u32 {
        u32::try_from(
            self.meaning_incorrect
                .max(0)
                .saturating_add(self.reading_incorrect.max(0)),
        )
        .unwrap_or(0)
    }
}

#[derive(Clone, Debug)]
pub struct PatchReconciler {
    db: Arc<DatabaseConnection>,
    queue: TaskQueue,
}

fn utc(at: Option<sea_orm::prelude::DateTimeWithTimeZone>) -> Option<DateTime<Utc>> {
    at.map(|t| t.with_timezone(&Utc))
}

fn assignment_of(row: &SubjectRow) -> ApiAssignment {
    ApiAssignment {
        subject_id: row.id,
        srs_stage: row.srs_stage,
        unlocked_at: utc(row.unlocked_at),
        started_at: utc(row.started_at),
        available_at: utc(row.available_at),
        passed_at: utc(row.passed_at),
        burned_at: utc(row.burned_at),
        resurrected_at: utc(row.resurrected_at),
    }
}

fn statistic_of(row: &SubjectRow) -> ApiReviewStatistic {
    ApiReviewStatistic {
        subject_id: row.id,
        meaning_correct: row.meaning_correct,
        meaning_incorrect: row.meaning_incorrect,
        meaning_max_streak: row.meaning_max_streak,
        meaning_current_streak: row.meaning_current_streak,
        reading_correct: row.reading_correct,
        reading_incorrect: row.reading_incorrect,
        reading_max_streak: row.reading_max_streak,
        reading_current_streak: row.reading_current_streak,
        percentage_correct: row.percentage_correct,
    }
}

/// Fold one answer into `(correct, incorrect, max_streak, current_streak)`.
fn tally(counts: (i32, i32, i32, i32), incorrect: i32) -> (i32, i32, i32, i32) {
    let (correct, wrong, max_streak, streak) = counts;
    if incorrect == 0 {
        let streak = streak + 1;
        (correct + 1, wrong, max_streak.max(streak), streak)
    } else {
        (correct, wrong + incorrect, max_streak, 0)
    }
}

impl PatchReconciler {
    pub fn new(db: Arc<DatabaseConnection>, queue: TaskQueue) -> Self {
        Self { db, queue }
    }

    async fn row(&self, subject_id: i64) -> Result<Option<SubjectRow>> {
        Ok(subject::find_by_id(&self.db, subject_id).await?)
    }

    /// Mark a lesson as done locally and queue the start call.
    pub async fn start_lesson(&self, subject_id: i64, started_at: DateTime<Utc>) -> Result<i64> {
        let row = self.row(subject_id).await?;
        let registry = SrsRegistry::load(&self.db).await?;

        let mut fields = row.as_ref().map(assignment_of).unwrap_or(ApiAssignment {
            subject_id,
            unlocked_at: Some(started_at),
            ..Default::default()
        });
        // A lesson can only be started on an unlocked item.
        if fields.unlocked_at.is_none() {
            fields.unlocked_at = Some(started_at);
        }
        fields.started_at = Some(started_at);
        if let Some(system) = row.as_ref().and_then(|r| registry.get(r.srs_system_id)) {
            fields.srs_stage = system.first_started_stage();
            fields.available_at = Some(started_at + system.interval(fields.srs_stage));
        }
        subject::patch_assignment(&self.db, subject_id, &fields).await?;

        let payload = SessionItemPayload {
            answered_at: Some(started_at),
            subject_id,
            assignment_id: row.map_or(0, |r| r.assignment_id),
            session_type: SessionType::Lesson,
            meaning_incorrect: 0,
            reading_incorrect: 0,
            just_passed: false,
        };
        Ok(self
            .queue
            .enqueue(TaskKind::ReportSessionItem, payload.to_string())
            .await?)
    }

    /// Apply a review answer locally and queue its report.
    pub async fn record_review(&self, review: ReviewResult) -> Result<i64> {
        let row = self.row(review.subject_id).await?;
        let registry = SrsRegistry::load(&self.db).await?;
        let mut just_passed = false;

        if let Some(row) = &row {
            let mut fields = assignment_of(row);
            if let Some(system) = registry.get(row.srs_system_id) {
                let previous = fields.srs_stage;
                let next = system.next_stage(previous, review.total_incorrect());
                just_passed = !system.is_passed(previous) && system.is_passed(next);
                fields.srs_stage = next;
                fields.available_at =
                    system.next_review_at(previous, review.total_incorrect(), review.answered_at);
                if just_passed && fields.passed_at.is_none() {
                    fields.passed_at = Some(review.answered_at);
                }
                if system.is_completed(next) {
                    fields.burned_at = Some(review.answered_at);
                }
            }
            subject::patch_assignment(&self.db, review.subject_id, &fields).await?;

            let mut stat = statistic_of(row);
            (
                stat.meaning_correct,
                stat.meaning_incorrect,
                stat.meaning_max_streak,
                stat.meaning_current_streak,
            ) = tally(
                (
                    stat.meaning_correct,
                    stat.meaning_incorrect,
                    stat.meaning_max_streak,
                    stat.meaning_current_streak,
                ),
                review.meaning_incorrect,
            );
            if row.object.as_deref() != Some("radical") {
                (
                    stat.reading_correct,
                    stat.reading_incorrect,
                    stat.reading_max_streak,
                    stat.reading_current_streak,
                ) = tally(
                    (
                        stat.reading_correct,
                        stat.reading_incorrect,
                        stat.reading_max_streak,
                        stat.reading_current_streak,
                    ),
                    review.reading_incorrect,
                );
            }
            let correct = stat.meaning_correct + stat.reading_correct;
            let total = correct + stat.meaning_incorrect + stat.reading_incorrect;
            stat.percentage_correct = if total > 0 { correct * 100 / total } else { 0 };
            subject::patch_review_statistic(&self.db, review.subject_id, &stat).await?;
        }

        let payload = SessionItemPayload {
            answered_at: Some(review.answered_at),
            subject_id: review.subject_id,
            assignment_id: row.map_or(0, |r| r.assignment_id),
            session_type: SessionType::Review,
            meaning_incorrect: review.meaning_incorrect,
            reading_incorrect: review.reading_incorrect,
            just_passed,
        };
        Ok(self
            .queue
            .enqueue(TaskKind::ReportSessionItem, payload.to_string())
            .await?)
    }

    /// Store edited notes and synonyms locally and queue the upload.
    pub async fn update_study_material(&self, material: StudyMaterialPayload) -> Result<i64> {
        let fields = ApiStudyMaterial {
            subject_id: material.subject_id,
            meaning_note: Some(material.meaning_note.clone()).filter(|n| !n.is_empty()),
            reading_note: Some(material.reading_note.clone()).filter(|n| !n.is_empty()),
            meaning_synonyms: material.meaning_synonyms.clone(),
        };
        subject::patch_study_material(&self.db, material.subject_id, &fields).await?;
        Ok(self
            .queue
            .enqueue(TaskKind::SubmitStudyMaterial, material.encode()?)
            .await?)
    }

    /// Queue targeted refetches for every subject whose marker is still set.
    ///
    /// Only meaningful once no confirming task is pending: a marker that
    /// survives that point has lost its confirming task. Groups that already
    /// have a refetch queued are skipped.
    pub async fn enqueue_recovery_fetches(&self) -> Result<Vec<TaskKind>> {
        let mut enqueued = Vec::new();
        for group in FieldGroup::ALL {
            let kind = PatchedFetchTask::kind_for(group);
            if self.queue.has_pending(kind).await? {
                continue;
            }
            let ids = subject::patched_subject_ids(&self.db, group).await?;
            if ids.is_empty() {
                continue;
            }
            tracing::info!(%group, count = ids.len(), "Unconfirmed patches, scheduling refetch");
            self.queue
                .enqueue(kind, PatchedFetchTask::encode(&ids))
                .await?;
            enqueued.push(kind);
        }
        Ok(enqueued)
    }
}
