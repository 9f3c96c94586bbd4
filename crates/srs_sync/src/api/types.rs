//! Wire types for the remote API.
//!
//! Every field is defaulted so that additive server changes and sparse
//! test fixtures both decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiSubscription {
    pub active: bool,
    pub max_level_granted: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiUser {
    pub id: String,
    pub username: String,
    pub level: i32,
    pub max_level_granted_by_subscription: i32,
    pub subscription: Option<ApiSubscription>,
    pub current_vacation_started_at: Option<DateTime<Utc>>,
}

impl ApiUser {
    /// Highest level the subscription unlocks.
    pub fn max_level_granted(&self) -> i32 {
        match &self.subscription {
            Some(sub) if sub.max_level_granted > 0 => sub.max_level_granted,
            _ => self.max_level_granted_by_subscription,
        }
    }

    pub fn is_on_vacation(&self) -> bool {
        self.current_vacation_started_at.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiSubject {
    pub level: i32,
    pub lesson_position: i32,
    pub spaced_repetition_system_id: i64,
    pub characters: Option<String>,
    pub slug: Option<String>,
    pub hidden_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiAssignment {
    pub subject_id: i64,
    pub srs_stage: i64,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub available_at: Option<DateTime<Utc>>,
    pub passed_at: Option<DateTime<Utc>>,
    pub burned_at: Option<DateTime<Utc>>,
    pub resurrected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiReviewStatistic {
    pub subject_id: i64,
    pub meaning_correct: i32,
    pub meaning_incorrect: i32,
    pub meaning_max_streak: i32,
    pub meaning_current_streak: i32,
    pub reading_correct: i32,
    pub reading_incorrect: i32,
    pub reading_max_streak: i32,
    pub reading_current_streak: i32,
    pub percentage_correct: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiStudyMaterial {
    pub subject_id: i64,
    pub meaning_note: Option<String>,
    pub reading_note: Option<String>,
    pub meaning_synonyms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiStage {
    pub position: i64,
    pub interval: Option<i64>,
    pub interval_unit: Option<String>,
}

impl ApiStage {
    /// Interval normalised to seconds. Unknown units count as seconds.
    pub fn interval_secs(&self) -> i64 {
        let value = self.interval.unwrap_or(0);
        let factor = match self.interval_unit.as_deref() {
            Some("milliseconds") => return value / 1000,
            Some("minutes") => 60,
            Some("hours") => 3_600,
            Some("days") => 86_400,
            Some("weeks") => 604_800,
            _ => 1,
        };
        value * factor
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiSrsSystem {
    pub name: String,
    pub unlocking_stage_position: i64,
    pub starting_stage_position: i64,
    pub passing_stage_position: i64,
    pub burning_stage_position: i64,
    pub stages: Vec<ApiStage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiSummarySession {
    pub available_at: Option<DateTime<Utc>>,
    pub subject_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiSummary {
    pub lessons: Vec<ApiSummarySession>,
    pub reviews: Vec<ApiSummarySession>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiLevelProgression {
    pub level: i32,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub passed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub abandoned_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

// ─── Request bodies ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiStartAssignment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiCreateReview {
    pub review: ApiCreateReviewBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiCreateReviewBody {
    pub subject_id: i64,
    pub incorrect_meaning_answers: i32,
    pub incorrect_reading_answers: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiUpdateStudyMaterial {
    pub study_material: ApiUpdateStudyMaterialBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiUpdateStudyMaterialBody {
    /// Only sent when creating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<i64>,
    pub meaning_note: String,
    pub reading_note: String,
    pub meaning_synonyms: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_prefers_subscription_max_level() {
        let user: ApiUser = serde_json::from_value(json!({
            "id": "u-1",
            "level": 7,
            "max_level_granted_by_subscription": 3,
            "subscription": {"active": true, "max_level_granted": 60}
        }))
        .expect("decode");
        assert_eq!(user.max_level_granted(), 60);

        let legacy: ApiUser = serde_json::from_value(json!({
            "id": "u-1",
            "level": 2,
            "max_level_granted_by_subscription": 3
        }))
        .expect("decode");
        assert_eq!(legacy.max_level_granted(), 3);
        assert!(!legacy.is_on_vacation());
    }

    #[test]
    fn stage_intervals_normalise_to_seconds() {
        let stage = |interval, unit: &str| ApiStage {
            position: 1,
            interval: Some(interval),
            interval_unit: Some(unit.to_string()),
        };
        assert_eq!(stage(4, "hours").interval_secs(), 14_400);
        assert_eq!(stage(2, "weeks").interval_secs(), 1_209_600);
        assert_eq!(stage(14_400, "seconds").interval_secs(), 14_400);
        assert_eq!(ApiStage::default().interval_secs(), 0);
    }

    #[test]
    fn review_body_omits_missing_created_at() {
        let body = ApiCreateReview {
            review: ApiCreateReviewBody {
                subject_id: 440,
                incorrect_meaning_answers: 1,
                incorrect_reading_answers: 0,
                created_at: None,
            },
        };
        let value = serde_json::to_value(&body).expect("encode");
        assert_eq!(
            value,
            json!({"review": {"subject_id": 440, "incorrect_meaning_answers": 1, "incorrect_reading_answers": 0}})
        );
    }
}
