//! Writes to the merged subject row.
//!
//! Two paths touch a field group. Server-sync writes (`apply_*`) store the
//! authoritative values and clear the group's patched marker. Local patches
//! (`patch_*`) store provisional values and set it. Nothing else changes the
//! markers except [`clear_patched`], which the patched-refetch tasks use
//! once the server has been asked about a subject.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, sea_query::OnConflict,
};

use crate::api::Entity;
use crate::api::types::{ApiAssignment, ApiReviewStatistic, ApiStudyMaterial, ApiSubject};
use crate::entity::subject::{ActiveModel, Column, Entity as Subject, FieldGroup, LOCKED_STAGE, Model};

fn ts(at: Option<DateTime<Utc>>) -> Option<sea_orm::prelude::DateTimeWithTimeZone> {
    at.map(|t| t.fixed_offset())
}

/// An id-only row with every group at its empty state.
fn placeholder(id: i64) -> ActiveModel {
    ActiveModel {
        id: Set(id),
        object: Set(None),
        characters: Set(None),
        slug: Set(None),
        level: Set(0),
        lesson_position: Set(0),
        srs_system_id: Set(0),
        hidden_at: Set(None),
        assignment_id: Set(0),
        srs_stage: Set(LOCKED_STAGE),
        unlocked_at: Set(None),
        started_at: Set(None),
        available_at: Set(None),
        passed_at: Set(None),
        burned_at: Set(None),
        resurrected_at: Set(None),
        assignment_patched: Set(false),
        review_statistic_id: Set(0),
        meaning_correct: Set(0),
        meaning_incorrect: Set(0),
        meaning_max_streak: Set(0),
        meaning_current_streak: Set(0),
        reading_correct: Set(0),
        reading_incorrect: Set(0),
        reading_max_streak: Set(0),
        reading_current_streak: Set(0),
        percentage_correct: Set(0),
        leech_score: Set(0),
        statistic_patched: Set(false),
        study_material_id: Set(0),
        meaning_note: Set(None),
        reading_note: Set(None),
        meaning_synonyms: Set(serde_json::Value::Array(Vec::new())),
        study_material_patched: Set(false),
    }
}

/// Load the row for `id`, inserting a placeholder first if there is none.
async fn load_or_placeholder(db: &DatabaseConnection, id: i64) -> Result<ActiveModel, DbErr> {
    Subject::insert(placeholder(id))
        .on_conflict(OnConflict::column(Column::Id).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;
    let model = Subject::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("subject {id}")))?;
    Ok(model.into())
}

/// Weighted ratio of wrong answers to the current streak, scaled by 1000.
pub fn leech_score(stat: &ApiReviewStatistic) -> i32 {
    fn score(incorrect: i32, streak: i32) -> f64 {
        let weight = f64::from(streak).powf(1.5);
        let weight = if weight == 0.0 { 0.5 } else { weight };
        f64::from(incorrect) / weight
    }
    let meaning = score(stat.meaning_incorrect, stat.meaning_current_streak);
    let reading = score(stat.reading_incorrect, stat.reading_current_streak);
    (1000.0 * meaning.max(reading)) as i32
}

fn set_assignment_fields(row: &mut ActiveModel, a: &ApiAssignment) {
    row.srs_stage = Set(if a.unlocked_at.is_none() {
        LOCKED_STAGE
    } else {
        a.srs_stage
    });
    row.unlocked_at = Set(ts(a.unlocked_at));
    row.started_at = Set(ts(a.started_at));
    row.available_at = Set(ts(a.available_at));
    row.passed_at = Set(ts(a.passed_at));
    row.burned_at = Set(ts(a.burned_at));
    row.resurrected_at = Set(ts(a.resurrected_at));
}

fn set_statistic_fields(row: &mut ActiveModel, s: &ApiReviewStatistic) {
    row.meaning_correct = Set(s.meaning_correct);
    row.meaning_incorrect = Set(s.meaning_incorrect);
    row.meaning_max_streak = Set(s.meaning_max_streak);
    row.meaning_current_streak = Set(s.meaning_current_streak);
    row.reading_correct = Set(s.reading_correct);
    row.reading_incorrect = Set(s.reading_incorrect);
    row.reading_max_streak = Set(s.reading_max_streak);
    row.reading_current_streak = Set(s.reading_current_streak);
    row.percentage_correct = Set(s.percentage_correct);
    row.leech_score = Set(leech_score(s));
}

fn set_study_material_fields(row: &mut ActiveModel, m: &ApiStudyMaterial) {
    row.meaning_note = Set(m.meaning_note.clone());
    row.reading_note = Set(m.reading_note.clone());
    row.meaning_synonyms = Set(serde_json::Value::from(m.meaning_synonyms.clone()));
}

// ─── Server-sync writes ──────────────────────────────────────────────────────

pub async fn apply_subject(db: &DatabaseConnection, subject: &Entity<ApiSubject>) -> Result<Model, DbErr> {
    let mut row = load_or_placeholder(db, subject.id).await?;
    row.object = Set(Some(subject.object.clone()));
    row.characters = Set(subject.data.characters.clone());
    row.slug = Set(subject.data.slug.clone());
    row.level = Set(subject.data.level);
    row.lesson_position = Set(subject.data.lesson_position);
    row.srs_system_id = Set(subject.data.spaced_repetition_system_id);
    row.hidden_at = Set(ts(subject.data.hidden_at));
    row.update(db).await
}

pub async fn apply_assignment(
    db: &DatabaseConnection,
    assignment: &Entity<ApiAssignment>,
) -> Result<Model, DbErr> {
    let mut row = load_or_placeholder(db, assignment.data.subject_id).await?;
    row.assignment_id = Set(assignment.id);
    set_assignment_fields(&mut row, &assignment.data);
    row.assignment_patched = Set(false);
    row.update(db).await
}

pub async fn apply_review_statistic(
    db: &DatabaseConnection,
    statistic: &Entity<ApiReviewStatistic>,
) -> Result<Model, DbErr> {
    let mut row = load_or_placeholder(db, statistic.data.subject_id).await?;
    row.review_statistic_id = Set(statistic.id);
    set_statistic_fields(&mut row, &statistic.data);
    row.statistic_patched = Set(false);
    row.update(db).await
}

pub async fn apply_study_material(
    db: &DatabaseConnection,
    material: &Entity<ApiStudyMaterial>,
) -> Result<Model, DbErr> {
    let mut row = load_or_placeholder(db, material.data.subject_id).await?;
    row.study_material_id = Set(material.id);
    set_study_material_fields(&mut row, &material.data);
    row.study_material_patched = Set(false);
    row.update(db).await
}

// ─── Local patches ───────────────────────────────────────────────────────────

/// Provisionally overwrite the assignment group of `subject_id`.
pub async fn patch_assignment(
    db: &DatabaseConnection,
    subject_id: i64,
    fields: &ApiAssignment,
) -> Result<Model, DbErr> {
    let mut row = load_or_placeholder(db, subject_id).await?;
    set_assignment_fields(&mut row, fields);
    row.assignment_patched = Set(true);
    row.update(db).await
}

pub async fn patch_review_statistic(
    db: &DatabaseConnection,
    subject_id: i64,
    fields: &ApiReviewStatistic,
) -> Result<Model, DbErr> {
    let mut row = load_or_placeholder(db, subject_id).await?;
    set_statistic_fields(&mut row, fields);
    row.statistic_patched = Set(true);
    row.update(db).await
}

/// Provisionally overwrite the study material group. The known material id is kept.
pub async fn patch_study_material(
    db: &DatabaseConnection,
    subject_id: i64,
    fields: &ApiStudyMaterial,
) -> Result<Model, DbErr> {
    let mut row = load_or_placeholder(db, subject_id).await?;
    set_study_material_fields(&mut row, fields);
    row.study_material_patched = Set(true);
    row.update(db).await
}

// ─── Patched markers ─────────────────────────────────────────────────────────

/// Ids of subjects whose `group` marker is set, ascending.
pub async fn patched_subject_ids(db: &DatabaseConnection, group: FieldGroup) -> Result<Vec<i64>, DbErr> {
    let rows = Subject::find()
        .filter(group.patched_column().eq(true))
        .order_by_asc(Column::Id)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|r| r.id).collect())
}

/// Clear the `group` marker on the given subjects. Returns rows touched.
pub async fn clear_patched(db: &DatabaseConnection, group: FieldGroup, ids: &[i64]) -> Result<u64, DbErr> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = Subject::update_many()
        .col_expr(group.patched_column(), sea_orm::sea_query::Expr::value(false))
        .filter(Column::Id.is_in(ids.iter().copied()))
        .filter(group.patched_column().eq(true))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

// ─── Queries ─────────────────────────────────────────────────────────────────

pub async fn find_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Model>, DbErr> {
    Subject::find_by_id(id).one(db).await
}

fn visible_within(user_level: i32, max_level: i32) -> Condition {
    Condition::all()
        .add(Column::HiddenAt.is_null())
        .add(Column::Object.is_not_null())
        .add(Column::Level.lte(user_level))
        .add(Column::Level.lte(max_level))
}

/// Subjects currently in the lesson pool.
pub async fn available_lessons(
    db: &DatabaseConnection,
    user_level: i32,
    max_level: i32,
) -> Result<Vec<Model>, DbErr> {
    Subject::find()
        .filter(visible_within(user_level, max_level))
        .filter(
            Condition::any()
                .add(Column::ResurrectedAt.is_not_null())
                .add(Column::BurnedAt.is_null()),
        )
        .filter(Column::UnlockedAt.is_not_null())
        .filter(Column::StartedAt.is_null())
        .order_by_asc(Column::Level)
        .order_by_asc(Column::LessonPosition)
        .order_by_asc(Column::Id)
        .all(db)
        .await
}

/// Subjects with a review due before `cutoff`.
pub async fn pending_reviews(
    db: &DatabaseConnection,
    user_level: i32,
    max_level: i32,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Model>, DbErr> {
    Subject::find()
        .filter(visible_within(user_level, max_level))
        .filter(Column::AvailableAt.is_not_null())
        .filter(Column::AvailableAt.lt(cutoff.fixed_offset()))
        .order_by_asc(Column::AvailableAt)
        .order_by_asc(Column::Id)
        .all(db)
        .await
}

/// Delete every subject row. Used when the remote account changes.
pub async fn reset(db: &DatabaseConnection) -> Result<u64, DbErr> {
    let result = Subject::delete_many().exec(db).await?;
    Ok(result.rows_affected)
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::db::connect_and_migrate;

    async fn setup() -> DatabaseConnection {
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("Failed to create test database")
    }

    fn entity<T>(id: i64, object: &str, data: T) -> Entity<T> {
        Entity {
            id,
            object: object.to_string(),
            data_updated_at: Utc::now(),
            data,
        }
    }

    fn kanji(level: i32) -> Entity<ApiSubject> {
        entity(
            440,
            "kanji",
            ApiSubject {
                level,
                lesson_position: 3,
                spaced_repetition_system_id: 1,
                characters: Some("一".to_string()),
                slug: Some("one".to_string()),
                hidden_at: None,
            },
        )
    }

    fn started_assignment(stage: i64) -> ApiAssignment {
        let now = Utc::now();
        ApiAssignment {
            subject_id: 440,
            srs_stage: stage,
            unlocked_at: Some(now),
            started_at: Some(now),
            available_at: Some(now),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn patch_before_subject_creates_an_upgradable_placeholder() {
        let db = setup().await;
        let patched = patch_assignment(&db, 440, &started_assignment(2)).await.unwrap();
        assert!(patched.is_placeholder());
        assert!(patched.assignment_patched);

        let full = apply_subject(&db, &kanji(1)).await.unwrap();
        assert!(!full.is_placeholder());
        assert_eq!(full.srs_stage, 2);
        assert!(full.assignment_patched, "subject data must not clear the assignment patch");
    }

    #[tokio::test]
    async fn server_write_clears_only_its_own_group() {
        let db = setup().await;
        patch_assignment(&db, 440, &started_assignment(2)).await.unwrap();
        patch_study_material(
            &db,
            440,
            &ApiStudyMaterial {
                subject_id: 440,
                meaning_note: Some("note".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let row = apply_assignment(&db, &entity(9, "assignment", started_assignment(3)))
            .await
            .unwrap();
        assert!(!row.assignment_patched);
        assert!(row.study_material_patched);
        assert_eq!(row.assignment_id, 9);
        assert_eq!(row.srs_stage, 3);
    }

    #[tokio::test]
    async fn assignment_without_unlock_stores_locked_stage() {
        let db = setup().await;
        let assignment = ApiAssignment {
            subject_id: 440,
            srs_stage: 0,
            ..Default::default()
        };
        let row = apply_assignment(&db, &entity(9, "assignment", assignment)).await.unwrap();
        assert_eq!(row.srs_stage, LOCKED_STAGE);
    }

    #[tokio::test]
    async fn applying_the_same_entity_twice_is_idempotent() {
        let db = setup().await;
        let stat = entity(
            77,
            "review_statistic",
            ApiReviewStatistic {
                subject_id: 440,
                meaning_incorrect: 4,
                meaning_current_streak: 1,
                ..Default::default()
            },
        );
        let once = apply_review_statistic(&db, &stat).await.unwrap();
        let twice = apply_review_statistic(&db, &stat).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.leech_score, 4000);
    }

    #[test]
    fn leech_score_uses_the_worse_component() {
        let stat = ApiReviewStatistic {
            meaning_incorrect: 2,
            meaning_current_streak: 4,
            reading_incorrect: 1,
            reading_current_streak: 0,
            ..Default::default()
        };
        // meaning 2 / 8 = 0.25, reading 1 / 0.5 = 2.0
        assert_eq!(leech_score(&stat), 2000);
    }

    #[tokio::test]
    async fn clear_patched_touches_listed_ids_only() {
        let db = setup().await;
        for id in [1, 2, 3] {
            patch_assignment(
                &db,
                id,
                &ApiAssignment {
                    subject_id: id,
                    ..started_assignment(1)
                },
            )
            .await
            .unwrap();
        }
        assert_eq!(
            patched_subject_ids(&db, FieldGroup::Assignment).await.unwrap(),
            vec![1, 2, 3]
        );

        assert_eq!(clear_patched(&db, FieldGroup::Assignment, &[1, 3, 99]).await.unwrap(), 2);
        assert_eq!(
            patched_subject_ids(&db, FieldGroup::Assignment).await.unwrap(),
            vec![2]
        );
        assert!(patched_subject_ids(&db, FieldGroup::StudyMaterial).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pools_respect_level_limits() {
        let db = setup().await;
        apply_subject(&db, &kanji(5)).await.unwrap();
        patch_assignment(
            &db,
            440,
            &ApiAssignment {
                subject_id: 440,
                srs_stage: 0,
                unlocked_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(available_lessons(&db, 4, 60).await.unwrap().is_empty());
        assert!(available_lessons(&db, 5, 3).await.unwrap().is_empty());
        assert_eq!(available_lessons(&db, 5, 60).await.unwrap().len(), 1);
        assert!(pending_reviews(&db, 5, 60, Utc::now()).await.unwrap().is_empty());
    }
}
