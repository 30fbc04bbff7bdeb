//! Roster operations: players, nicknames, teams, member status
//!
//! `is_active` is derived state: kicking or removing a player clears
//! it, any other status (or re-adding) restores it. Aggregate columns
//! are owned by the stats module and only read here.

use crate::db::models::{MemberStatus, Player};
use crate::resolver::{RosterEntry, RosterSnapshot};
use crate::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;

fn player_from_row(row: &SqliteRow) -> Result<Player> {
    let nicknames: String = row.get("nicknames");
    let status: String = row.get("member_status");
    Ok(Player {
        guild_id: row.get("guild_id"),
        player_name: row.get("player_name"),
        nicknames: serde_json::from_str(&nicknames)
            .map_err(|e| Error::Internal(format!("corrupt nicknames: {}", e)))?,
        team: row.get("team"),
        member_status: MemberStatus::parse(&status)?,
        is_active: row.get::<i64, _>("is_active") != 0,
        added_by: row.get("added_by"),
        total_score: row.get("total_score"),
        total_races: row.get("total_races"),
        war_count: row.get("war_count"),
        average_score: row.get("average_score"),
        total_team_differential: row.get("total_team_differential"),
        wins: row.get("wins"),
        losses: row.get("losses"),
        ties: row.get("ties"),
        last_war_date: row.get("last_war_date"),
    })
}

const PLAYER_COLUMNS: &str = "guild_id, player_name, nicknames, team, member_status, is_active, \
     added_by, total_score, total_races, war_count, average_score, total_team_differential, \
     wins, losses, ties, last_war_date";

/// Add a player to the roster, reactivating a previously removed row
/// of the same name.
pub async fn add_player(
    pool: &SqlitePool,
    guild_id: i64,
    name: &str,
    status: MemberStatus,
    added_by: Option<&str>,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("player name must not be empty".to_string()));
    }

    let existing = sqlx::query("SELECT is_active FROM players WHERE guild_id = ? AND player_name = ?")
        .bind(guild_id)
        .bind(name)
        .fetch_optional(pool)
        .await?;

    match existing {
        Some(row) if row.get::<i64, _>("is_active") != 0 => Err(Error::Duplicate(format!(
            "player '{}' is already on the roster",
            name
        ))),
        Some(_) => {
            sqlx::query(
                r#"
                UPDATE players
                SET is_active = 1, member_status = ?, added_by = ?, updated_at = CURRENT_TIMESTAMP
                WHERE guild_id = ? AND player_name = ?
                "#,
            )
            .bind(status.as_str())
            .bind(added_by)
            .bind(guild_id)
            .bind(name)
            .execute(pool)
            .await?;
            info!(guild_id, player = name, "player reactivated");
            Ok(())
        }
        None => {
            sqlx::query(
                "INSERT INTO players (guild_id, player_name, member_status, added_by) VALUES (?, ?, ?, ?)",
            )
            .bind(guild_id)
            .bind(name)
            .bind(status.as_str())
            .bind(added_by)
            .execute(pool)
            .await?;
            info!(guild_id, player = name, "player added to roster");
            Ok(())
        }
    }
}

/// Ensure a roster row exists for `name`, creating a Member/Unassigned
/// record if needed. Used as the safety net when confirming a bulk
/// session with players the reviewer typed in. Composes into the
/// caller's transaction.
pub async fn ensure_player(conn: &mut SqliteConnection, guild_id: i64, name: &str) -> Result<bool> {
    let existing =
        sqlx::query("SELECT is_active FROM players WHERE guild_id = ? AND player_name = ?")
            .bind(guild_id)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    match existing {
        Some(row) => {
            if row.get::<i64, _>("is_active") == 0 {
                sqlx::query(
                    "UPDATE players SET is_active = 1, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ? AND player_name = ?",
                )
                .bind(guild_id)
                .bind(name)
                .execute(&mut *conn)
                .await?;
            }
            Ok(false)
        }
        None => {
            sqlx::query("INSERT INTO players (guild_id, player_name) VALUES (?, ?)")
                .bind(guild_id)
                .bind(name)
                .execute(&mut *conn)
                .await?;
            info!(guild_id, player = name, "player auto-created during review");
            Ok(true)
        }
    }
}

/// Remove a player from the active roster (the row and its war history
/// are kept).
pub async fn remove_player(pool: &SqlitePool, guild_id: i64, name: &str) -> Result<()> {
    let updated = sqlx::query(
        "UPDATE players SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ? AND player_name = ? AND is_active = 1",
    )
    .bind(guild_id)
    .bind(name)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("player '{}' is not on the active roster", name)));
    }
    info!(guild_id, player = name, "player removed from roster");
    Ok(())
}

/// Change member status. Kicked players drop off the active roster;
/// any other status restores them.
pub async fn set_member_status(
    pool: &SqlitePool,
    guild_id: i64,
    name: &str,
    status: MemberStatus,
) -> Result<()> {
    let is_active = if status == MemberStatus::Kicked { 0 } else { 1 };
    let updated = sqlx::query(
        "UPDATE players SET member_status = ?, is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ? AND player_name = ?",
    )
    .bind(status.as_str())
    .bind(is_active)
    .bind(guild_id)
    .bind(name)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("player '{}' not found", name)));
    }
    info!(guild_id, player = name, status = status.as_str(), "member status updated");
    Ok(())
}

pub async fn get_player(pool: &SqlitePool, guild_id: i64, name: &str) -> Result<Option<Player>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM players WHERE guild_id = ? AND player_name = ?",
        PLAYER_COLUMNS
    ))
    .bind(guild_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(player_from_row).transpose()
}

pub async fn require_player(pool: &SqlitePool, guild_id: i64, name: &str) -> Result<Player> {
    get_player(pool, guild_id, name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("player '{}' not found", name)))
}

/// List players, active-only by default.
pub async fn list_players(
    pool: &SqlitePool,
    guild_id: i64,
    include_inactive: bool,
) -> Result<Vec<Player>> {
    let sql = if include_inactive {
        format!(
            "SELECT {} FROM players WHERE guild_id = ? ORDER BY member_status, player_name",
            PLAYER_COLUMNS
        )
    } else {
        format!(
            "SELECT {} FROM players WHERE guild_id = ? AND is_active = 1 ORDER BY member_status, player_name",
            PLAYER_COLUMNS
        )
    };

    let rows = sqlx::query(&sql).bind(guild_id).fetch_all(pool).await?;
    rows.iter().map(player_from_row).collect()
}

pub async fn list_players_by_status(
    pool: &SqlitePool,
    guild_id: i64,
    status: MemberStatus,
) -> Result<Vec<Player>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM players WHERE guild_id = ? AND member_status = ? ORDER BY player_name",
        PLAYER_COLUMNS
    ))
    .bind(guild_id)
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    rows.iter().map(player_from_row).collect()
}

pub async fn list_players_by_team(
    pool: &SqlitePool,
    guild_id: i64,
    team: &str,
) -> Result<Vec<Player>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM players WHERE guild_id = ? AND team = ? AND is_active = 1 ORDER BY player_name",
        PLAYER_COLUMNS
    ))
    .bind(guild_id)
    .bind(team)
    .fetch_all(pool)
    .await?;
    rows.iter().map(player_from_row).collect()
}

/// Assign one or more players to a team. The team must exist in the
/// guild config (or be the literal "Unassigned").
pub async fn assign_team(
    pool: &SqlitePool,
    guild_id: i64,
    names: &[String],
    team: &str,
) -> Result<()> {
    if team != "Unassigned" {
        let teams = super::guilds::team_names(pool, guild_id).await?;
        if !teams.iter().any(|t| t == team) {
            return Err(Error::InvalidInput(format!("team '{}' does not exist", team)));
        }
    }

    let mut tx = pool.begin().await?;
    for name in names {
        let updated = sqlx::query(
            "UPDATE players SET team = ?, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ? AND player_name = ? AND is_active = 1",
        )
        .bind(team)
        .bind(guild_id)
        .bind(name)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(Error::NotFound(format!("player '{}' not found", name)));
        }
    }
    tx.commit().await?;

    info!(guild_id, team, count = names.len(), "players assigned to team");
    Ok(())
}

pub async fn unassign_team(pool: &SqlitePool, guild_id: i64, name: &str) -> Result<()> {
    assign_team(pool, guild_id, std::slice::from_ref(&name.to_string()), "Unassigned").await
}

/// Add a nickname. Nicknames are case-insensitively unique across the
/// whole guild (against other nicknames and canonical names) so that
/// resolution stays deterministic.
pub async fn add_nickname(pool: &SqlitePool, guild_id: i64, name: &str, nickname: &str) -> Result<()> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(Error::InvalidInput("nickname must not be empty".to_string()));
    }

    let snapshot = roster_snapshot(pool, guild_id).await?;
    for entry in &snapshot.entries {
        if entry.canonical.eq_ignore_ascii_case(nickname) && entry.canonical != name {
            return Err(Error::Duplicate(format!(
                "'{}' is already the name of another player",
                nickname
            )));
        }
        if entry.nicknames.iter().any(|n| n.eq_ignore_ascii_case(nickname)) {
            return Err(Error::Duplicate(format!(
                "nickname '{}' is already taken by '{}'",
                nickname, entry.canonical
            )));
        }
    }

    let mut nicknames = require_player(pool, guild_id, name).await?.nicknames;
    nicknames.push(nickname.to_string());
    store_nicknames(pool, guild_id, name, &nicknames).await?;

    info!(guild_id, player = name, nickname, "nickname added");
    Ok(())
}

pub async fn remove_nickname(
    pool: &SqlitePool,
    guild_id: i64,
    name: &str,
    nickname: &str,
) -> Result<()> {
    let mut nicknames = require_player(pool, guild_id, name).await?.nicknames;
    let before = nicknames.len();
    nicknames.retain(|n| !n.eq_ignore_ascii_case(nickname));
    if nicknames.len() == before {
        return Err(Error::NotFound(format!(
            "'{}' has no nickname '{}'",
            name, nickname
        )));
    }
    store_nicknames(pool, guild_id, name, &nicknames).await?;
    Ok(())
}

async fn store_nicknames(
    pool: &SqlitePool,
    guild_id: i64,
    name: &str,
    nicknames: &[String],
) -> Result<()> {
    sqlx::query(
        "UPDATE players SET nicknames = ?, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ? AND player_name = ?",
    )
    .bind(serde_json::to_string(nicknames).map_err(|e| Error::Internal(e.to_string()))?)
    .bind(guild_id)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load the active roster as a resolver snapshot.
pub async fn roster_snapshot(pool: &SqlitePool, guild_id: i64) -> Result<RosterSnapshot> {
    let rows = sqlx::query(
        "SELECT player_name, nicknames FROM players WHERE guild_id = ? AND is_active = 1",
    )
    .bind(guild_id)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let nicknames: String = row.get("nicknames");
        entries.push(RosterEntry {
            canonical: row.get("player_name"),
            nicknames: serde_json::from_str(&nicknames)
                .map_err(|e| Error::Internal(format!("corrupt nicknames: {}", e)))?,
        });
    }
    Ok(RosterSnapshot::new(entries))
}
