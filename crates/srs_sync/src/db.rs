//! Database connection utilities for the local replica.

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

/// Pragmas applied to every file-backed SQLite connection.
///
/// WAL keeps observers reading while a drain pass writes, and the busy
/// timeout lets a local mutation wait for the runner's write instead of
/// failing outright.
const SQLITE_PRAGMAS: [&str; 4] = [
    "PRAGMA journal_mode=WAL",
    "PRAGMA busy_timeout=5000",
    "PRAGMA synchronous=NORMAL",
    "PRAGMA foreign_keys=ON",
];

async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    for pragma in SQLITE_PRAGMAS {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            pragma.to_string(),
        ))
        .await?;
    }
    Ok(())
}

fn is_file_sqlite(database_url: &str) -> bool {
    database_url.starts_with("sqlite://")
}

/// Open the replica database.
///
/// File-backed SQLite URLs get [`SQLITE_PRAGMAS`] applied. In-memory URLs
/// (`sqlite::memory:`) are used as-is.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;
    if is_file_sqlite(database_url) {
        configure_sqlite(&db).await?;
    }
    tracing::debug!(url = %database_url, "Connected to replica database");
    Ok(db)
}

/// Open the replica database and apply all pending migrations.
///
/// # Example
/// ```ignore
/// let db = srs_sync::connect_and_migrate("sqlite://srs-sync.db?mode=rwc").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = connect(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
