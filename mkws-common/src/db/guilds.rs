//! Guild configuration operations
//!
//! A guild is the tenant boundary: every other table carries its
//! `guild_id` and no query crosses guilds.

use crate::db::models::GuildConfig;
use crate::{Error, Result};
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Create or refresh a guild config (`/setup`). Guilds are never
/// destroyed by user action; re-running setup updates the row.
pub async fn upsert_guild(
    pool: &SqlitePool,
    guild_id: i64,
    guild_name: &str,
    ocr_channel_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO guild_configs (guild_id, guild_name, ocr_channel_id)
        VALUES (?, ?, ?)
        ON CONFLICT(guild_id) DO UPDATE SET
            guild_name = excluded.guild_name,
            ocr_channel_id = COALESCE(excluded.ocr_channel_id, guild_configs.ocr_channel_id),
            is_active = 1,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(guild_id)
    .bind(guild_name)
    .bind(ocr_channel_id)
    .execute(pool)
    .await?;

    info!(guild_id, guild_name, "guild config upserted");
    Ok(())
}

pub async fn get_guild(pool: &SqlitePool, guild_id: i64) -> Result<Option<GuildConfig>> {
    let row = sqlx::query(
        r#"
        SELECT guild_id, guild_name, ocr_channel_id, team_names, is_active
        FROM guild_configs
        WHERE guild_id = ?
        "#,
    )
    .bind(guild_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let team_names: String = row.get("team_names");
        Ok(GuildConfig {
            guild_id: row.get("guild_id"),
            guild_name: row.get("guild_name"),
            ocr_channel_id: row.get("ocr_channel_id"),
            team_names: serde_json::from_str(&team_names)
                .map_err(|e| Error::Internal(format!("corrupt team_names: {}", e)))?,
            is_active: row.get::<i64, _>("is_active") != 0,
        })
    })
    .transpose()
}

/// Load a guild config or fail with a setup hint.
pub async fn require_guild(pool: &SqlitePool, guild_id: i64) -> Result<GuildConfig> {
    get_guild(pool, guild_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("guild {} is not set up", guild_id)))
}

pub async fn set_ocr_channel(pool: &SqlitePool, guild_id: i64, channel_id: i64) -> Result<()> {
    let updated = sqlx::query(
        "UPDATE guild_configs SET ocr_channel_id = ?, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ?",
    )
    .bind(channel_id)
    .bind(guild_id)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("guild {} is not set up", guild_id)));
    }
    Ok(())
}

/// Guild configs for a set of guild ids (used by `GET /guilds`).
pub async fn get_guilds_by_ids(pool: &SqlitePool, guild_ids: &[i64]) -> Result<Vec<GuildConfig>> {
    let mut out = Vec::new();
    for &guild_id in guild_ids {
        if let Some(config) = get_guild(pool, guild_id).await? {
            out.push(config);
        }
    }
    Ok(out)
}

pub async fn team_names(pool: &SqlitePool, guild_id: i64) -> Result<Vec<String>> {
    Ok(require_guild(pool, guild_id).await?.team_names)
}

pub async fn add_team(pool: &SqlitePool, guild_id: i64, team: &str) -> Result<()> {
    let mut teams = team_names(pool, guild_id).await?;
    if teams.iter().any(|t| t.eq_ignore_ascii_case(team)) {
        return Err(Error::Duplicate(format!("team '{}' already exists", team)));
    }
    teams.push(team.to_string());
    store_teams(pool, guild_id, &teams).await
}

/// Remove a team; its players move back to Unassigned.
pub async fn remove_team(pool: &SqlitePool, guild_id: i64, team: &str) -> Result<()> {
    let mut teams = team_names(pool, guild_id).await?;
    let before = teams.len();
    teams.retain(|t| t != team);
    if teams.len() == before {
        return Err(Error::NotFound(format!("team '{}' does not exist", team)));
    }

    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE guild_configs SET team_names = ?, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ?",
    )
    .bind(serde_json::to_string(&teams).map_err(|e| Error::Internal(e.to_string()))?)
    .bind(guild_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "UPDATE players SET team = 'Unassigned', updated_at = CURRENT_TIMESTAMP WHERE guild_id = ? AND team = ?",
    )
    .bind(guild_id)
    .bind(team)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(guild_id, team, "team removed");
    Ok(())
}

/// Rename a team, carrying its players along.
pub async fn rename_team(pool: &SqlitePool, guild_id: i64, old: &str, new: &str) -> Result<()> {
    let mut teams = team_names(pool, guild_id).await?;
    if teams.iter().any(|t| t.eq_ignore_ascii_case(new)) {
        return Err(Error::Duplicate(format!("team '{}' already exists", new)));
    }
    let slot = teams
        .iter_mut()
        .find(|t| *t == old)
        .ok_or_else(|| Error::NotFound(format!("team '{}' does not exist", old)))?;
    *slot = new.to_string();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE guild_configs SET team_names = ?, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ?",
    )
    .bind(serde_json::to_string(&teams).map_err(|e| Error::Internal(e.to_string()))?)
    .bind(guild_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "UPDATE players SET team = ?, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ? AND team = ?",
    )
    .bind(new)
    .bind(guild_id)
    .bind(old)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(())
}

async fn store_teams(pool: &SqlitePool, guild_id: i64, teams: &[String]) -> Result<()> {
    sqlx::query(
        "UPDATE guild_configs SET team_names = ?, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ?",
    )
    .bind(serde_json::to_string(teams).map_err(|e| Error::Internal(e.to_string()))?)
    .bind(guild_id)
    .execute(pool)
    .await?;
    Ok(())
}
