//! Pushing a locally edited study material to the server.

use std::str::FromStr;

use async_trait::async_trait;

use super::{SyncTask, TaskContext, TaskOutcome};
use crate::api::types::{ApiStudyMaterial, ApiUpdateStudyMaterial, ApiUpdateStudyMaterialBody};
use crate::api::{MutationResponse, decode_entity};
use crate::entity::task_kind::TaskKind;
use crate::error::{Result, SyncError};
use crate::http::HttpMethod;
use crate::properties;
use crate::subject;

/// JSON string array: `[subject_id, meaning_note, reading_note, synonym...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyMaterialPayload {
    pub subject_id: i64,
    pub meaning_note: String,
    pub reading_note: String,
    pub meaning_synonyms: Vec<String>,
}

impl StudyMaterialPayload {
    pub fn encode(&self) -> Result<String> {
        let mut values = vec![
            self.subject_id.to_string(),
            self.meaning_note.clone(),
            self.reading_note.clone(),
        ];
        values.extend(self.meaning_synonyms.iter().cloned());
        Ok(serde_json::to_string(&values)?)
    }
}

impl FromStr for StudyMaterialPayload {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: String| SyncError::invalid_payload(TaskKind::SubmitStudyMaterial, message);
        let values: Vec<String> =
            serde_json::from_str(s).map_err(|e| invalid(format!("not a string array: {e}")))?;
        let mut values = values.into_iter();
        let (Some(id), Some(meaning_note), Some(reading_note)) =
            (values.next(), values.next(), values.next())
        else {
            return Err(invalid("expected at least 3 values".to_string()));
        };
        let subject_id = id
            .trim()
            .parse()
            .map_err(|_| invalid(format!("bad subject id {id:?}")))?;
        Ok(Self {
            subject_id,
            meaning_note,
            reading_note,
            meaning_synonyms: values.filter(|v| !v.trim().is_empty()).collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SubmitStudyMaterialTask {
    payload: StudyMaterialPayload,
}

impl SubmitStudyMaterialTask {
    pub fn new(payload: StudyMaterialPayload) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl SyncTask for SubmitStudyMaterialTask {
    fn kind(&self) -> TaskKind {
        TaskKind::SubmitStudyMaterial
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let p = &self.payload;
        let Some(row) = subject::find_by_id(&ctx.db, p.subject_id).await? else {
            return Ok(TaskOutcome::fatal(format!("subject {} no longer exists", p.subject_id)));
        };

        let body = ApiUpdateStudyMaterial {
            study_material: ApiUpdateStudyMaterialBody {
                subject_id: Some(p.subject_id),
                meaning_note: p.meaning_note.clone(),
                reading_note: p.reading_note.clone(),
                meaning_synonyms: p.meaning_synonyms.clone(),
            },
        };
        let response = if row.study_material_id == 0 {
            ctx.api
                .mutate(HttpMethod::Post, "/v2/study_materials", &body)
                .await?
        } else {
            let uri = format!("/v2/study_materials/{}", row.study_material_id);
            ctx.api.mutate(HttpMethod::Put, &uri, &body).await?
        };

        let MutationResponse::Accepted(json) = response else {
            return Ok(TaskOutcome::fatal("study material rejected by server"));
        };
        match decode_entity::<ApiStudyMaterial>(&json) {
            Ok(material) => {
                subject::apply_study_material(&ctx.db, &material).await?;
            }
            Err(e) => tracing::warn!(error = %e, "Unreadable study material response"),
        }
        properties::mark_api_success(&ctx.db).await?;
        Ok(TaskOutcome::Done)
    }
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::test_support::{entity, harness};
    use serde_json::{Value, json};

    #[test]
    fn payload_drops_blank_synonyms() {
        let payload: StudyMaterialPayload =
            r#"["440", "meaning", "", "one", " ", "single"]"#.parse().unwrap();
        assert_eq!(payload.subject_id, 440);
        assert_eq!(payload.meaning_note, "meaning");
        assert_eq!(payload.meaning_synonyms, vec!["one", "single"]);
        assert_eq!(
            payload.encode().unwrap(),
            r#"["440","meaning","","one","single"]"#
        );
        assert!("[\"440\"]".parse::<StudyMaterialPayload>().is_err());
        assert!("not json".parse::<StudyMaterialPayload>().is_err());
    }

    fn material_response(id: i64) -> Value {
        entity(
            id,
            "study_material",
            json!({"subject_id": 440, "meaning_note": "meaning", "meaning_synonyms": ["one"]}),
        )
    }

    #[tokio::test]
    async fn missing_subject_is_moot() {
        let h = harness().await;
        let task = SubmitStudyMaterialTask::new(r#"["440","","",""]"#.parse().unwrap());
        assert!(matches!(task.execute(&h.ctx).await, TaskOutcome::Fatal(_)));
        assert_eq!(h.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn creates_then_updates_by_known_id() {
        let h = harness().await;
        subject::patch_study_material(
            h.db(),
            440,
            &ApiStudyMaterial {
                subject_id: 440,
                meaning_note: Some("meaning".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        h.transport
            .push_json(HttpMethod::Post, h.url("/v2/study_materials"), 201, material_response(31));

        let task = SubmitStudyMaterialTask::new(r#"["440","meaning","","one"]"#.parse().unwrap());
        assert_eq!(task.execute(&h.ctx).await, TaskOutcome::Done);
        let row = subject::find_by_id(h.db(), 440).await.unwrap().unwrap();
        assert_eq!(row.study_material_id, 31);
        assert!(!row.study_material_patched);

        h.transport
            .push_json(HttpMethod::Put, h.url("/v2/study_materials/31"), 200, material_response(31));
        assert_eq!(task.execute(&h.ctx).await, TaskOutcome::Done);
        assert_eq!(h.transport.request_count(), 2);
    }
}
