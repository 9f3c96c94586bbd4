//! Reporting a finished lesson or review to the server.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{SyncTask, TaskContext, TaskOutcome};
use crate::api::types::{
    ApiAssignment, ApiCreateReview, ApiCreateReviewBody, ApiReviewStatistic, ApiStartAssignment,
};
use crate::api::{MutationResponse, decode_entity};
use crate::entity::task_kind::TaskKind;
use crate::error::{Result, SyncError};
use crate::http::HttpMethod;
use crate::properties::{self, PropertyKey};
use crate::subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Lesson,
    Review,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Lesson => "LESSON",
            SessionType::Review => "REVIEW",
        }
    }
}

/// Space separated: `<ts> <subject> <assignment> <LESSON|REVIEW> <meaning> <reading> [passed]`.
///
/// The timestamp is epoch milliseconds, 0 when unknown. An assignment id of
/// 0 means it is resolved when the task runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionItemPayload {
    pub answered_at: Option<DateTime<Utc>>,
    pub subject_id: i64,
    pub assignment_id: i64,
    pub session_type: SessionType,
    pub meaning_incorrect: i32,
    pub reading_incorrect: i32,
    pub just_passed: bool,
}

impl FromStr for SessionItemPayload {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: String| SyncError::invalid_payload(TaskKind::ReportSessionItem, message);
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() < 6 {
            return Err(invalid(format!("expected at least 6 fields, got {}", parts.len())));
        }
        let int = |i: usize| {
            parts[i]
                .parse::<i64>()
                .map_err(|_| invalid(format!("field {i} is not a number: {:?}", parts[i])))
        };
        let small = |i: usize| {
            int(i).and_then(|v| i32::try_from(v).map_err(|_| invalid(format!("field {i} out of range"))))
        };

        let millis = int(0)?;
        let session_type = match parts[3] {
            "LESSON" => SessionType::Lesson,
            "REVIEW" => SessionType::Review,
            other => return Err(invalid(format!("unknown session type {other:?}"))),
        };

        Ok(Self {
            answered_at: (millis > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(millis))
                .flatten(),
            subject_id: int(1)?,
            assignment_id: int(2)?,
            session_type,
            meaning_incorrect: small(4)?,
            reading_incorrect: small(5)?,
            just_passed: parts.get(6).is_some_and(|p| p.eq_ignore_ascii_case("true")),
        })
    }
}

impl fmt::Display for SessionItemPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.answered_at.map_or(0, |t| t.timestamp_millis()),
            self.subject_id,
            self.assignment_id,
            self.session_type.as_str(),
            self.meaning_incorrect,
            self.reading_incorrect,
            self.just_passed
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReportSessionItemTask {
    payload: SessionItemPayload,
}

impl ReportSessionItemTask {
    pub fn new(payload: SessionItemPayload) -> Self {
        Self { payload }
    }

    /// The answer time, only when it is old enough to be worth sending.
    fn backdated(&self, ctx: &TaskContext) -> Option<DateTime<Utc>> {
        self.payload
            .answered_at
            .filter(|at| Utc::now() - *at > ctx.settings.backdate_threshold)
    }

    /// Assignment id from the payload, the local row, or the server, in that order.
    async fn resolve_assignment_id(&self, ctx: &TaskContext) -> Result<Option<i64>> {
        if self.payload.assignment_id > 0 {
            return Ok(Some(self.payload.assignment_id));
        }
        if let Some(row) = subject::find_by_id(&ctx.db, self.payload.subject_id).await? {
            if row.assignment_id > 0 {
                return Ok(Some(row.assignment_id));
            }
        }

        let uri = ctx.api.url(
            "/v2/assignments",
            &[("subject_ids", self.payload.subject_id.to_string())],
        );
        let mut pages = ctx.api.collection::<ApiAssignment>(&uri);
        Ok(pages
            .next_page()
            .await?
            .and_then(|page| page.items.first().map(|a| a.id)))
    }

    async fn start_lesson(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let Some(assignment_id) = self.resolve_assignment_id(ctx).await? else {
            return Ok(TaskOutcome::fatal(format!(
                "no assignment exists for subject {}",
                self.payload.subject_id
            )));
        };

        let body = ApiStartAssignment {
            started_at: self.backdated(ctx),
        };
        let uri = format!("/v2/assignments/{assignment_id}/start");
        match ctx.api.mutate(HttpMethod::Put, &uri, &body).await? {
            MutationResponse::Rejected => Ok(TaskOutcome::fatal("start rejected by server")),
            MutationResponse::Accepted(response) => {
                match decode_entity::<ApiAssignment>(&response) {
                    Ok(assignment) => {
                        subject::apply_assignment(&ctx.db, &assignment).await?;
                    }
                    Err(e) => tracing::warn!(error = %e, "Unreadable start-assignment response"),
                }
                Ok(TaskOutcome::Done)
            }
        }
    }

    async fn create_review(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let body = ApiCreateReview {
            review: ApiCreateReviewBody {
                subject_id: self.payload.subject_id,
                incorrect_meaning_answers: self.payload.meaning_incorrect,
                incorrect_reading_answers: self.payload.reading_incorrect,
                created_at: self.backdated(ctx),
            },
        };
        match ctx.api.mutate(HttpMethod::Post, "/v2/reviews", &body).await? {
            MutationResponse::Rejected => Ok(TaskOutcome::fatal("review rejected by server")),
            MutationResponse::Accepted(response) => {
                apply_resources_updated(ctx, &response).await?;
                Ok(TaskOutcome::Done)
            }
        }
    }
}

/// Apply the assignment and review statistic a created review reports back.
async fn apply_resources_updated(ctx: &TaskContext, response: &Value) -> Result<()> {
    let Some(updated) = response.get("resources_updated") else {
        return Ok(());
    };
    if let Some(json) = updated.get("assignment") {
        match decode_entity::<ApiAssignment>(json) {
            Ok(assignment) => {
                subject::apply_assignment(&ctx.db, &assignment).await?;
            }
            Err(e) => tracing::warn!(error = %e, "Unreadable review assignment"),
        }
    }
    if let Some(json) = updated.get("review_statistic") {
        match decode_entity::<ApiReviewStatistic>(json) {
            Ok(statistic) => {
                subject::apply_review_statistic(&ctx.db, &statistic).await?;
            }
            Err(e) => tracing::warn!(error = %e, "Unreadable review statistic"),
        }
    }
    Ok(())
}

#[async_trait]
impl SyncTask for ReportSessionItemTask {
    fn kind(&self) -> TaskKind {
        TaskKind::ReportSessionItem
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let outcome = match self.payload.session_type {
            SessionType::Lesson => self.start_lesson(ctx).await?,
            SessionType::Review => self.create_review(ctx).await?,
        };

        if self.payload.just_passed {
            properties::set_bool(&ctx.db, PropertyKey::ForceLateRefresh, true).await?;
        }
        if outcome == TaskOutcome::Done {
            properties::mark_api_success(&ctx.db).await?;
        }
        tracing::debug!(
            subject_id = self.payload.subject_id,
            session_type = self.payload.session_type.as_str(),
            %outcome,
            "Session item reported"
        );
        Ok(outcome)
    }
}
