//! Response envelope decoding.
//!
//! Single resources and collection items arrive wrapped as
//! `{id, object, data_updated_at, data}`; collections add
//! `pages.next_url` for linking.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{ApiError, Result};

/// A decoded resource together with its envelope metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity<T> {
    pub id: i64,
    pub object: String,
    pub data_updated_at: DateTime<Utc>,
    pub data: T,
}

/// One page of a collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<Entity<T>>,
    pub next_url: Option<String>,
}

/// Decode the `data` member of a report-style response (user, summary).
pub fn decode_data<T: DeserializeOwned>(body: &Value) -> Result<T> {
    let data = body
        .get("data")
        .ok_or_else(|| ApiError::malformed("response has no data member"))?;
    serde_json::from_value(data.clone())
        .map_err(|e| ApiError::malformed(format!("undecodable data: {e}")))
}

/// Decode a fully enveloped resource, rejecting envelopes that lack metadata.
pub fn decode_entity<T: DeserializeOwned>(body: &Value) -> Result<Entity<T>> {
    let id = body
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::malformed("entity has no numeric id"))?;
    let object = body
        .get("object")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::malformed(format!("entity {id} has no object tag")))?
        .to_string();
    let data_updated_at = body
        .get("data_updated_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| ApiError::malformed(format!("entity {id} has no data_updated_at")))?;
    let data = decode_data(body)?;

    Ok(Entity {
        id,
        object,
        data_updated_at,
        data,
    })
}

/// Decode one collection page.
pub fn decode_page<T: DeserializeOwned>(body: &Value) -> Result<Page<T>> {
    let items = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::malformed("collection has no data array"))?
        .iter()
        .map(decode_entity)
        .collect::<Result<Vec<_>>>()?;
    let next_url = body
        .pointer("/pages/next_url")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(Page { items, next_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ApiAssignment;
    use serde_json::json;

    fn assignment(id: i64, subject_id: i64) -> Value {
        json!({
            "id": id,
            "object": "assignment",
            "data_updated_at": "2024-03-01T10:00:00.000000Z",
            "data": {"subject_id": subject_id, "srs_stage": 3}
        })
    }

    #[test]
    fn entity_requires_every_envelope_member() {
        let ok: Entity<ApiAssignment> = decode_entity(&assignment(9, 440)).expect("decode");
        assert_eq!(ok.id, 9);
        assert_eq!(ok.object, "assignment");
        assert_eq!(ok.data.subject_id, 440);

        for member in ["id", "object", "data_updated_at", "data"] {
            let mut broken = assignment(9, 440);
            broken.as_object_mut().expect("object").remove(member);
            let err = decode_entity::<ApiAssignment>(&broken).expect_err(member);
            assert!(matches!(err, ApiError::MalformedEnvelope { .. }), "{member}");
        }
    }

    #[test]
    fn page_exposes_next_url_only_when_present() {
        let last = json!({"object": "collection", "pages": {"next_url": null}, "data": [assignment(1, 2)]});
        let page: Page<ApiAssignment> = decode_page(&last).expect("decode");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_url, None);

        let first = json!({
            "object": "collection",
            "pages": {"next_url": "https://api.test/v2/assignments?page_after_id=1"},
            "data": []
        });
        let page: Page<ApiAssignment> = decode_page(&first).expect("decode");
        assert_eq!(
            page.next_url.as_deref(),
            Some("https://api.test/v2/assignments?page_after_id=1")
        );
    }

    #[test]
    fn report_data_requires_data_member() {
        let err = decode_data::<serde_json::Value>(&json!({"object": "report"})).expect_err("no data");
        assert!(matches!(err, ApiError::MalformedEnvelope { .. }));
    }
}
