use std::path::Path;

use srs_sync::{SyncEngine, connect_and_migrate};

use crate::config::Config;

/// Create the parent directory of a file-backed SQLite URL.
pub(crate) fn ensure_sqlite_parent(database_url: &str) -> std::io::Result<()> {
    let Some(db_path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    // Strip query parameters (e.g., ?mode=rwc) before path operations
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let db_path = Path::new(db_path);

    if db_path.is_relative() && !db_path.as_os_str().is_empty() {
        tracing::warn!(
            "Database path '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            db_path.display()
        );
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Open the replica, apply migrations and wire up the engine.
pub(crate) async fn build_engine(
    config: &Config,
    database_url: &str,
) -> Result<SyncEngine, Box<dyn std::error::Error>> {
    let db = connect_and_migrate(database_url).await?;
    let settings = config.sync_settings();
    if settings.api_key.is_none() {
        tracing::warn!("No API key configured; only local commands will have an effect");
    }
    Ok(SyncEngine::builder()
        .database(db)
        .settings(settings)
        .build()?)
}
