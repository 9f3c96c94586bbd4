//! srs-sync CLI - drive the offline-first SRS sync engine from a terminal.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use console::Term;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "srs-sync")]
#[command(version)]
#[command(about = "Offline-first sync for spaced-repetition review data")]
#[command(
    long_about = "srs-sync keeps a local replica of your spaced-repetition account. \
Answers and notes are applied locally first and queued; the queue is drained \
against the remote API one task at a time, paced, retried and reconciled."
)]
#[command(after_long_help = r#"EXAMPLES
    Queue a refresh of every model and drain the queue:
        $ srs-sync refresh && srs-sync run

    Keep draining every five minutes until Ctrl+C:
        $ srs-sync run --background --watch 300

    Record a review answer offline:
        $ srs-sync review 440 --meaning-incorrect 1

    Inspect the queue and API state:
        $ srs-sync status -o json

CONFIGURATION
    srs-sync reads configuration from:
      1. ~/.config/srs-sync/config.toml (or $XDG_CONFIG_HOME/srs-sync/config.toml)
      2. ./srs-sync.toml
      3. Environment variables (SRS_SYNC_* prefix, e.g., SRS_SYNC_API_KEY)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    SRS_SYNC_DATABASE_URL     Replica connection string (default: ~/.local/state/srs-sync/replica.db)
    SRS_SYNC_API_KEY          Personal API token
    SRS_SYNC_API_URL          API base URL override
    SRS_SYNC_SYNC_METERED     Allow API calls on metered connections (true/false)
"#)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Output format for status display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain the task queue
    Run {
        /// Timer-driven run: clears a sticky API error before draining
        #[arg(short, long)]
        background: bool,

        /// Keep running, draining again every N seconds until Ctrl+C
        #[arg(short, long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Queue a single task
    Enqueue {
        /// Task kind, e.g. get-user or get_summary
        kind: String,

        /// Raw task payload
        #[arg(short, long, default_value = "")]
        payload: String,
    },
    /// Queue a refresh of every model
    Refresh {
        /// Also re-fetch subjects and level progressions
        #[arg(short, long)]
        full: bool,
    },
    /// Show API state, queue contents and sync watermarks
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Mark a lesson as done and queue its report
    Lesson {
        /// Subject id
        subject_id: i64,
    },
    /// Record a review answer and queue its report
    Review {
        /// Subject id
        subject_id: i64,

        #[arg(short, long, default_value_t = 0)]
        meaning_incorrect: i32,

        #[arg(short, long, default_value_t = 0)]
        reading_incorrect: i32,
    },
    /// Mark a lesson or review session as open or closed
    ///
    /// While a session is open, unconfirmed local changes are not refetched.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub(crate) enum SessionAction {
    /// Open a session
    Begin,
    /// Close the session; the next run may recover lost confirmations
    End,
}

#[derive(Subcommand)]
pub(crate) enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // Structured logging only when not attached to a TTY; the TTY gets progress bars
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("srs_sync=info,srs_sync_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();

    let cli = Cli::parse();

    // Handle commands that don't require database access first
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database location; set SRS_SYNC_DATABASE_URL")?;
    commands::shared::ensure_sqlite_parent(&database_url)?;

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Run { background, watch } => {
            let engine = commands::shared::build_engine(&config, &database_url).await?;
            commands::run::handle_run(&engine, background, watch).await?;
        }
        Commands::Enqueue { kind, payload } => {
            let engine = commands::shared::build_engine(&config, &database_url).await?;
            commands::queue::handle_enqueue(&engine, &kind, &payload).await?;
        }
        Commands::Refresh { full } => {
            let engine = commands::shared::build_engine(&config, &database_url).await?;
            commands::queue::handle_refresh(&engine, full).await?;
        }
        Commands::Status { output } => {
            let engine = commands::shared::build_engine(&config, &database_url).await?;
            commands::status::handle_status(&engine, output).await?;
        }
        Commands::Lesson { subject_id } => {
            let engine = commands::shared::build_engine(&config, &database_url).await?;
            commands::session::handle_lesson(&engine, subject_id).await?;
        }
        Commands::Review {
            subject_id,
            meaning_incorrect,
            reading_incorrect,
        } => {
            let engine = commands::shared::build_engine(&config, &database_url).await?;
            commands::session::handle_review(
                &engine,
                subject_id,
                meaning_incorrect,
                reading_incorrect,
            )
            .await?;
        }
        Commands::Session { action } => {
            let engine = commands::shared::build_engine(&config, &database_url).await?;
            commands::session::handle_session(&engine, action).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
