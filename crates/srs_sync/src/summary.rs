//! Drift repair driven by the summary endpoint.
//!
//! The summary lists which subjects the server considers in the lesson and
//! review pools. Local rows that disagree are forced into line through the
//! local patch path, so the assignment marker stays set until a later
//! assignment fetch confirms or overrides the guess.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr};

use crate::api::types::{ApiAssignment, ApiSummary};
use crate::entity::subject::Model as SubjectRow;
use crate::properties::{self, PropertyKey};
use crate::srs::SrsRegistry;
use crate::subject;

/// Level window a repair may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLimits {
    pub user_level: i32,
    pub max_level: i32,
}

impl LevelLimits {
    pub async fn load(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let level = |v: i64| i32::try_from(v).unwrap_or(i32::MAX);
        Ok(Self {
            user_level: level(properties::get_i64(db, PropertyKey::UserLevel).await?),
            max_level: level(properties::get_i64(db, PropertyKey::UserMaxLevel).await?),
        })
    }

    pub fn admits(&self, level: i32) -> bool {
        level <= self.user_level && level <= self.max_level
    }
}

/// Counts of rows each step rewrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub lessons_forced: usize,
    pub lessons_pruned: usize,
    pub reviews_forced: usize,
    pub reviews_pruned: usize,
}

fn utc(at: Option<sea_orm::prelude::DateTimeWithTimeZone>) -> Option<DateTime<Utc>> {
    at.map(|t| t.with_timezone(&Utc))
}

fn assignment_fields(row: &SubjectRow) -> ApiAssignment {
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

/// Row for `id` when it is known, complete and inside `limits`.
async fn eligible(
    db: &DatabaseConnection,
    id: i64,
    limits: LevelLimits,
) -> Result<Option<SubjectRow>, DbErr> {
    Ok(subject::find_by_id(db, id)
        .await?
        .filter(|row| !row.is_placeholder() && limits.admits(row.level)))
}

/// Put `id` into the lesson pool: unlocked, not started, at the initial stage.
pub async fn force_lesson_available(
    db: &DatabaseConnection,
    registry: &SrsRegistry,
    id: i64,
    unlocked_at: DateTime<Utc>,
    limits: LevelLimits,
) -> Result<bool, DbErr> {
    let Some(row) = eligible(db, id, limits).await? else {
        return Ok(false);
    };
    let Some(system) = registry.get(row.srs_system_id) else {
        tracing::debug!(subject_id = id, srs_system_id = row.srs_system_id, "Unknown SRS system");
        return Ok(false);
    };

    let mut fields = assignment_fields(&row);
    let mut changed = false;
    if fields.unlocked_at.is_none() {
        fields.unlocked_at = Some(unlocked_at);
        changed = true;
    }
    if fields.started_at.is_some() {
        fields.started_at = None;
        changed = true;
    }
    if !system.is_initial(fields.srs_stage) {
        fields.srs_stage = system.initial_stage();
        changed = true;
    }
    if changed {
        subject::patch_assignment(db, id, &fields).await?;
    }
    Ok(changed)
}

/// Take every lesson not in `keep` out of the pool by marking it started.
pub async fn force_lesson_unavailable_except(
    db: &DatabaseConnection,
    limits: LevelLimits,
    keep: &HashSet<i64>,
) -> Result<usize, DbErr> {
    let mut pruned = 0;
    for row in subject::available_lessons(db, limits.user_level, limits.max_level).await? {
        if keep.contains(&row.id) {
            continue;
        }
        let mut fields = assignment_fields(&row);
        fields.started_at = fields.unlocked_at;
        subject::patch_assignment(db, row.id, &fields).await?;
        pruned += 1;
    }
    Ok(pruned)
}

/// Make `id` due for review no later than `available_at`.
pub async fn force_review_available(
    db: &DatabaseConnection,
    registry: &SrsRegistry,
    id: i64,
    available_at: DateTime<Utc>,
    limits: LevelLimits,
) -> Result<bool, DbErr> {
    let Some(row) = eligible(db, id, limits).await? else {
        return Ok(false);
    };
    let Some(system) = registry.get(row.srs_system_id) else {
        tracing::debug!(subject_id = id, srs_system_id = row.srs_system_id, "Unknown SRS system");
        return Ok(false);
    };

    let mut fields = assignment_fields(&row);
    let mut changed = false;
    if fields.available_at.is_none_or(|at| at > available_at) {
        fields.available_at = Some(available_at);
        changed = true;
    }
    if fields.unlocked_at.is_none() {
        fields.unlocked_at = Some(available_at);
        fields.srs_stage = system.first_started_stage();
        changed = true;
    }
    if fields.started_at.is_none() {
        fields.started_at = Some(available_at);
        changed = true;
    }
    if system.is_completed(fields.srs_stage) || system.is_initial(fields.srs_stage) {
        fields.srs_stage = system.first_started_stage();
        changed = true;
    }
    if changed {
        subject::patch_assignment(db, id, &fields).await?;
    }
    Ok(changed)
}

/// Clear the due date of reviews before `cutoff` that are not in `keep`.
pub async fn force_upcoming_review_unavailable_except(
    db: &DatabaseConnection,
    limits: LevelLimits,
    keep: &HashSet<i64>,
    cutoff: DateTime<Utc>,
) -> Result<usize, DbErr> {
    let mut pruned = 0;
    for row in subject::pending_reviews(db, limits.user_level, limits.max_level, cutoff).await? {
        if keep.contains(&row.id) {
            continue;
        }
        let mut fields = assignment_fields(&row);
        fields.available_at = None;
        subject::patch_assignment(db, row.id, &fields).await?;
        pruned += 1;
    }
    Ok(pruned)
}

/// Bring the lesson and review pools in line with `summary`.
///
/// Reviews due before `now + lookahead` that the summary does not list are
/// pushed out of the pool.
pub async fn repair(
    db: &DatabaseConnection,
    registry: &SrsRegistry,
    summary: &ApiSummary,
    limits: LevelLimits,
    now: DateTime<Utc>,
    lookahead: chrono::Duration,
) -> Result<RepairReport, DbErr> {
    let mut report = RepairReport::default();

    let mut listed = HashSet::new();
    for session in &summary.lessons {
        let Some(available_at) = session.available_at else {
            continue;
        };
        for &id in &session.subject_ids {
            if force_lesson_available(db, registry, id, available_at, limits).await? {
                report.lessons_forced += 1;
            }
            listed.insert(id);
        }
    }
    report.lessons_pruned = force_lesson_unavailable_except(db, limits, &listed).await?;

    listed.clear();
    for session in &summary.reviews {
        let Some(available_at) = session.available_at else {
            continue;
        };
        for &id in &session.subject_ids {
            if force_review_available(db, registry, id, available_at, limits).await? {
                report.reviews_forced += 1;
            }
            listed.insert(id);
        }
    }
    report.reviews_pruned =
        force_upcoming_review_unavailable_except(db, limits, &listed, now + lookahead).await?;

    Ok(report)
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::api::Entity;
    use crate::api::types::{ApiSubject, ApiSummarySession};
    use crate::db::connect_and_migrate;
    use crate::entity::subject::FieldGroup;
    use crate::srs::{SrsStage, SrsSystem};
    use chrono::Duration;

    const LIMITS: LevelLimits = LevelLimits {
        user_level: 5,
        max_level: 60,
    };

    fn registry() -> SrsRegistry {
        let stages = (0..=9)
            .map(|position| SrsStage {
                position,
                interval_secs: if position == 0 || position == 9 { 0 } else { 3_600 },
            })
            .collect();
        SrsRegistry::from_systems([SrsSystem::new(1, "standard", 0, 1, 5, 9, stages).unwrap()])
    }

    async fn seed(db: &DatabaseConnection, id: i64, level: i32, assignment: ApiAssignment) {
        subject::apply_subject(
            db,
            &Entity {
                id,
                object: "kanji".to_string(),
                data_updated_at: Utc::now(),
                data: ApiSubject {
                    level,
                    spaced_repetition_system_id: 1,
                    ..Default::default()
                },
            },
        )
        .await
        .unwrap();
        subject::apply_assignment(
            db,
            &Entity {
                id: id * 10,
                object: "assignment".to_string(),
                data_updated_at: Utc::now(),
                data: ApiAssignment {
                    subject_id: id,
                    ..assignment
                },
            },
        )
        .await
        .unwrap();
    }

    fn session(at: DateTime<Utc>, ids: &[i64]) -> ApiSummarySession {
        ApiSummarySession {
            available_at: Some(at),
            subject_ids: ids.to_vec(),
        }
    }

    #[tokio::test]
    async fn listed_lesson_is_forced_and_unlisted_one_pruned() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        // 1: locked locally, listed by the server. 2: in the local pool, not listed.
        seed(&db, 1, 3, ApiAssignment::default()).await;
        seed(
            &db,
            2,
            3,
            ApiAssignment {
                unlocked_at: Some(now),
                ..Default::default()
            },
        )
        .await;

        let summary = ApiSummary {
            lessons: vec![session(now, &[1])],
            reviews: Vec::new(),
        };
        let report = repair(&db, &registry(), &summary, LIMITS, now, Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(report.lessons_forced, 1);
        assert_eq!(report.lessons_pruned, 1);

        let pool: Vec<i64> = subject::available_lessons(&db, 5, 60)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(pool, vec![1]);
        assert_eq!(
            subject::patched_subject_ids(&db, FieldGroup::Assignment).await.unwrap(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn reviews_follow_summary_within_the_lookahead() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let started = ApiAssignment {
            srs_stage: 3,
            unlocked_at: Some(now - Duration::days(3)),
            started_at: Some(now - Duration::days(3)),
            ..Default::default()
        };
        // 1: not due locally, listed. 2: due soon locally, not listed. 3: due far out.
        seed(&db, 1, 2, started.clone()).await;
        seed(
            &db,
            2,
            2,
            ApiAssignment {
                available_at: Some(now + Duration::minutes(20)),
                ..started.clone()
            },
        )
        .await;
        seed(
            &db,
            3,
            2,
            ApiAssignment {
                available_at: Some(now + Duration::hours(5)),
                ..started
            },
        )
        .await;

        let summary = ApiSummary {
            lessons: Vec::new(),
            reviews: vec![session(now, &[1])],
        };
        let report = repair(&db, &registry(), &summary, LIMITS, now, Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(report.reviews_forced, 1);
        assert_eq!(report.reviews_pruned, 1);

        let due: Vec<i64> = subject::pending_reviews(&db, 5, 60, now + Duration::hours(6))
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(due, vec![1, 3]);
    }

    #[tokio::test]
    async fn subjects_above_the_user_level_are_left_alone() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        seed(&db, 1, 9, ApiAssignment::default()).await;
        let changed = force_lesson_available(&db, &registry(), 1, Utc::now(), LIMITS)
            .await
            .unwrap();
        assert!(!changed);
        assert!(subject::patched_subject_ids(&db, FieldGroup::Assignment)
            .await
            .unwrap()
            .is_empty());
    }
}
