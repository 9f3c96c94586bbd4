use chrono::{DateTime, Utc};
use serde::Serialize;
use srs_sync::properties::{self, PropertyKey, SyncedModel};
use srs_sync::SyncEngine;
use tabled::{Table, Tabled, settings::Style};

use crate::OutputFormat;

const WATERMARKS: [(SyncedModel, &str); 8] = [
    (SyncedModel::User, "user"),
    (SyncedModel::SrsSystems, "srs systems"),
    (SyncedModel::Subjects, "subjects"),
    (SyncedModel::Assignments, "assignments"),
    (SyncedModel::ReviewStatistics, "review statistics"),
    (SyncedModel::StudyMaterials, "study materials"),
    (SyncedModel::Summary, "summary"),
    (SyncedModel::LevelProgression, "level progressions"),
];

#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "Property")]
    property: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl StatusRow {
    fn new(property: impl Into<String>, value: impl ToString) -> Self {
        Self {
            property: property.into(),
            value: value.to_string(),
        }
    }
}

fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".to_string(),
    }
}

pub(crate) async fn handle_status(
    engine: &SyncEngine,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = engine.database();
    let api_state = engine.api_state().await?;
    let queue = engine.queue();
    let counts = queue.counts_by_kind().await?;
    let pending = queue.count().await?;
    let cooldown = engine.limiter().cooldown_remaining();
    let session_active = properties::get_bool(db, PropertyKey::SessionActive).await?;

    let mut watermarks = Vec::with_capacity(WATERMARKS.len());
    for (model, label) in WATERMARKS {
        watermarks.push((label, properties::last_synced(db, model).await?));
    }

    match output {
        OutputFormat::Table => {
            let mut rows = vec![
                StatusRow::new("API state", api_state),
                StatusRow::new("Pending tasks", pending),
                StatusRow::new("Session open", session_active),
                StatusRow::new(
                    "Rate limit cooldown",
                    cooldown.map_or_else(|| "none".to_string(), |d| format!("{}s", d.as_secs())),
                ),
            ];
            rows.extend(
                counts
                    .iter()
                    .map(|(kind, count)| StatusRow::new(format!("  queued {kind}"), count)),
            );
            rows.extend(
                watermarks
                    .iter()
                    .map(|(label, at)| StatusRow::new(format!("Last {label} sync"), format_timestamp(*at))),
            );

            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "api_state": api_state,
                "pending": pending,
                "queued": counts,
                "session_active": session_active,
                "cooldown_secs": cooldown.map(|d| d.as_secs()),
                "last_sync": watermarks
                    .iter()
                    .map(|(label, at)| (label.to_string(), serde_json::json!(at)))
                    .collect::<serde_json::Map<_, _>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_timestamps_read_never() {
        assert_eq!(format_timestamp(None), "never");
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(Some(at)), "2024-03-01 10:00:00 UTC");
    }
}
