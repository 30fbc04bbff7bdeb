//! Database layer
//!
//! One SQLite database is the single source of truth shared by the bot
//! worker and the review API. Schema creation is idempotent and runs at
//! startup; all queries are hand-written SQL with bound parameters.

pub mod bulk;
pub mod guilds;
pub mod models;
pub mod players;
pub mod stats;
pub mod user_sessions;
pub mod wars;

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

/// Open the connection pool and create any missing tables.
pub async fn init_database(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        // Bare paths get the create-if-missing sqlite URL form.
        format!("sqlite://{}?mode=rwc", database_url)
    };

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    info!("Database ready: {}", database_url);

    Ok(pool)
}

/// In-memory pool for tests.
pub async fn init_test_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Run an operation with exponential backoff on transient storage
/// errors (lock contention, dropped connections). Only safe for
/// idempotent operations.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(50);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < 3 => {
                warn!(op = op_name, attempt, error = %e, "transient storage error, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guild_configs (
            guild_id INTEGER PRIMARY KEY,
            guild_name TEXT NOT NULL,
            ocr_channel_id INTEGER,
            team_names TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            guild_id INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            nicknames TEXT NOT NULL DEFAULT '[]',
            team TEXT NOT NULL DEFAULT 'Unassigned',
            member_status TEXT NOT NULL DEFAULT 'member'
                CHECK (member_status IN ('member', 'trial', 'ally', 'kicked')),
            is_active INTEGER NOT NULL DEFAULT 1,
            added_by TEXT,
            total_score INTEGER NOT NULL DEFAULT 0,
            total_races INTEGER NOT NULL DEFAULT 0,
            war_count REAL NOT NULL DEFAULT 0,
            average_score REAL NOT NULL DEFAULT 0,
            total_team_differential INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            ties INTEGER NOT NULL DEFAULT 0,
            last_war_date TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (guild_id, player_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_players_guild ON players(guild_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wars (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            guild_id INTEGER NOT NULL,
            race_count INTEGER NOT NULL DEFAULT 12 CHECK (race_count BETWEEN 1 AND 24),
            team_score INTEGER NOT NULL,
            team_differential INTEGER NOT NULL,
            war_date TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_wars_guild ON wars(guild_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS war_players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            war_id INTEGER NOT NULL REFERENCES wars(id) ON DELETE CASCADE,
            guild_id INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            score INTEGER NOT NULL,
            races_played INTEGER NOT NULL,
            war_participation REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_war_players_war ON war_players(war_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_war_players_guild_name ON war_players(guild_id, player_name)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bulk_scan_sessions (
            session_token TEXT PRIMARY KEY,
            guild_id INTEGER NOT NULL,
            created_by_user_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'open'
                CHECK (status IN ('open', 'confirmed', 'cancelled', 'expired')),
            total_images INTEGER NOT NULL DEFAULT 0,
            creation_nonce TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            UNIQUE (guild_id, created_by_user_id, creation_nonce)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_guild ON bulk_scan_sessions(guild_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON bulk_scan_sessions(expires_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bulk_scan_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_token TEXT NOT NULL
                REFERENCES bulk_scan_sessions(session_token) ON DELETE CASCADE,
            image_filename TEXT,
            image_url TEXT,
            detected_players TEXT NOT NULL,
            corrected_players TEXT,
            review_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (review_status IN ('pending', 'approved', 'rejected')),
            race_count INTEGER NOT NULL DEFAULT 12,
            message_timestamp TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_results_session ON bulk_scan_results(session_token)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bulk_scan_failures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_token TEXT NOT NULL
                REFERENCES bulk_scan_sessions(session_token) ON DELETE CASCADE,
            image_filename TEXT,
            image_url TEXT,
            error_message TEXT NOT NULL,
            message_timestamp TEXT,
            chat_message_id INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_failures_session ON bulk_scan_failures(session_token)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_sessions (
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            guilds TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_sessions_expiry ON user_sessions(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}
