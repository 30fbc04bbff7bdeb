//! War lifecycle: submit, append, remove, read
//!
//! A war insert is one transaction covering the war row, its
//! war_players rows, and every participant's aggregate update. Removal
//! reverses the statistical contribution in the same way before the
//! rows disappear.

use crate::db::models::{War, WarPlayer};
use crate::db::{players, stats};
use crate::scores::{team_differential, validate_race_count, war_participation};
use crate::{Error, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::info;

/// Input line for a war insert or append.
#[derive(Debug, Clone)]
pub struct NewWarPlayer {
    pub name: String,
    pub score: i64,
    pub races_played: i64,
}

/// Outcome of a submitted war.
#[derive(Debug, Clone)]
pub struct WarSubmission {
    pub war_id: i64,
    pub team_score: i64,
    pub team_differential: i64,
}

/// Insert a war and update all participant aggregates inside the
/// caller's transaction. With `auto_create` set, unknown names become
/// fresh Member/Unassigned roster rows (the bulk-review safety net);
/// otherwise an unknown name fails the transaction.
pub async fn submit_war_tx(
    conn: &mut SqliteConnection,
    guild_id: i64,
    entries: &[NewWarPlayer],
    race_count: i64,
    war_date: &str,
    auto_create: bool,
) -> Result<WarSubmission> {
    validate_race_count(race_count)?;
    if entries.is_empty() {
        return Err(Error::InvalidInput("a war needs at least one player".to_string()));
    }
    for entry in entries {
        if entry.races_played < 1 || entry.races_played > race_count {
            return Err(Error::InvalidInput(format!(
                "'{}' played {} races, outside 1..={}",
                entry.name, entry.races_played, race_count
            )));
        }
    }

    let team_score: i64 = entries.iter().map(|e| e.score).sum();
    let differential = team_differential(team_score, race_count, entries.len() as i64);

    let war_id = sqlx::query(
        "INSERT INTO wars (guild_id, race_count, team_score, team_differential, war_date)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(guild_id)
    .bind(race_count)
    .bind(team_score)
    .bind(differential)
    .bind(war_date)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    for entry in entries {
        if auto_create {
            players::ensure_player(conn, guild_id, &entry.name).await?;
        }

        let participation = war_participation(entry.races_played, race_count);
        sqlx::query(
            "INSERT INTO war_players (war_id, guild_id, player_name, score, races_played, war_participation)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(war_id)
        .bind(guild_id)
        .bind(&entry.name)
        .bind(entry.score)
        .bind(entry.races_played)
        .bind(participation)
        .execute(&mut *conn)
        .await?;

        stats::apply_war_insert(
            conn,
            guild_id,
            &entry.name,
            entry.score,
            entry.races_played,
            participation,
            war_date,
            differential,
        )
        .await?;
    }

    Ok(WarSubmission { war_id, team_score, team_differential: differential })
}

/// Submit a war in its own transaction.
pub async fn submit_war(
    pool: &SqlitePool,
    guild_id: i64,
    entries: &[NewWarPlayer],
    race_count: i64,
    war_date: &str,
    auto_create: bool,
) -> Result<WarSubmission> {
    let mut tx = pool.begin().await?;
    let submission =
        submit_war_tx(&mut tx, guild_id, entries, race_count, war_date, auto_create).await?;
    tx.commit().await?;

    info!(
        guild_id,
        war_id = submission.war_id,
        team_score = submission.team_score,
        differential = submission.team_differential,
        players = entries.len(),
        "war recorded"
    );
    Ok(submission)
}

/// Append players to an existing war. The war's score and differential
/// are recomputed for the grown roster; every participant's aggregates
/// are adjusted in the same transaction.
pub async fn append_players(
    pool: &SqlitePool,
    guild_id: i64,
    war_id: i64,
    entries: &[NewWarPlayer],
) -> Result<WarSubmission> {
    if entries.is_empty() {
        return Err(Error::InvalidInput("no players to append".to_string()));
    }

    let mut tx = pool.begin().await?;

    let war = load_war(&mut tx, guild_id, war_id).await?;
    let old_differential = war.team_differential;

    for entry in entries {
        if war.players.iter().any(|p| p.player_name == entry.name) {
            return Err(Error::Duplicate(format!(
                "'{}' is already in war {}",
                entry.name, war_id
            )));
        }
        if entry.races_played < 1 || entry.races_played > war.race_count {
            return Err(Error::InvalidInput(format!(
                "'{}' played {} races, outside 1..={}",
                entry.name, entry.races_played, war.race_count
            )));
        }
    }

    let team_score = war.team_score + entries.iter().map(|e| e.score).sum::<i64>();
    let player_count = war.players.len() as i64 + entries.len() as i64;
    let new_differential = team_differential(team_score, war.race_count, player_count);

    sqlx::query("UPDATE wars SET team_score = ?, team_differential = ? WHERE id = ? AND guild_id = ?")
        .bind(team_score)
        .bind(new_differential)
        .bind(war_id)
        .bind(guild_id)
        .execute(&mut *tx)
        .await?;

    // Existing participants swap their old differential share for the
    // recomputed one.
    for player in &war.players {
        let delta = stats::scaled_differential(new_differential, player.war_participation)
            - stats::scaled_differential(old_differential, player.war_participation);
        sqlx::query(
            "UPDATE players SET total_team_differential = total_team_differential + ?
             WHERE guild_id = ? AND player_name = ?",
        )
        .bind(delta)
        .bind(guild_id)
        .bind(&player.player_name)
        .execute(&mut *tx)
        .await?;
        stats::recompute_record(&mut tx, guild_id, &player.player_name).await?;
    }

    for entry in entries {
        let participation = war_participation(entry.races_played, war.race_count);
        sqlx::query(
            "INSERT INTO war_players (war_id, guild_id, player_name, score, races_played, war_participation)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(war_id)
        .bind(guild_id)
        .bind(&entry.name)
        .bind(entry.score)
        .bind(entry.races_played)
        .bind(participation)
        .execute(&mut *tx)
        .await?;

        stats::apply_war_insert(
            &mut tx,
            guild_id,
            &entry.name,
            entry.score,
            entry.races_played,
            participation,
            &war.war_date,
            new_differential,
        )
        .await?;
    }

    tx.commit().await?;

    info!(guild_id, war_id, appended = entries.len(), "players appended to war");
    Ok(WarSubmission { war_id, team_score, team_differential: new_differential })
}

/// Remove a war, reversing each participant's statistical contribution
/// before the rows are deleted.
pub async fn remove_war(pool: &SqlitePool, guild_id: i64, war_id: i64) -> Result<War> {
    let mut tx = pool.begin().await?;

    let war = load_war(&mut tx, guild_id, war_id).await?;

    sqlx::query("DELETE FROM wars WHERE id = ? AND guild_id = ?")
        .bind(war_id)
        .bind(guild_id)
        .execute(&mut *tx)
        .await?;

    for player in &war.players {
        stats::apply_war_remove(
            &mut tx,
            guild_id,
            &player.player_name,
            player.score,
            player.races_played,
            player.war_participation,
            war.team_differential,
        )
        .await?;
    }

    tx.commit().await?;

    info!(guild_id, war_id, "war removed, aggregates reverted");
    Ok(war)
}

async fn load_war(conn: &mut SqliteConnection, guild_id: i64, war_id: i64) -> Result<War> {
    let row = sqlx::query(
        "SELECT id, guild_id, race_count, team_score, team_differential, war_date
         FROM wars WHERE id = ? AND guild_id = ?",
    )
    .bind(war_id)
    .bind(guild_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("war {} not found", war_id)))?;

    let players = sqlx::query(
        "SELECT player_name, score, races_played, war_participation
         FROM war_players WHERE war_id = ? ORDER BY id",
    )
    .bind(war_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|p| WarPlayer {
        player_name: p.get("player_name"),
        score: p.get("score"),
        races_played: p.get("races_played"),
        war_participation: p.get("war_participation"),
    })
    .collect();

    Ok(War {
        war_id: row.get("id"),
        guild_id: row.get("guild_id"),
        race_count: row.get("race_count"),
        team_score: row.get("team_score"),
        team_differential: row.get("team_differential"),
        war_date: row.get("war_date"),
        players,
    })
}

pub async fn get_war(pool: &SqlitePool, guild_id: i64, war_id: i64) -> Result<War> {
    let mut conn = pool.acquire().await?;
    load_war(&mut conn, guild_id, war_id).await
}

/// Most recent wars first, with embedded players.
pub async fn list_wars(
    pool: &SqlitePool,
    guild_id: i64,
    page: i64,
    limit: i64,
) -> Result<(Vec<War>, i64)> {
    let limit = limit.clamp(1, 100);
    let page = page.max(1);
    let offset = (page - 1) * limit;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wars WHERE guild_id = ?")
        .bind(guild_id)
        .fetch_one(pool)
        .await?;

    let war_rows = sqlx::query(
        "SELECT id, guild_id, race_count, team_score, team_differential, war_date
         FROM wars WHERE guild_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
    )
    .bind(guild_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut wars: Vec<War> = war_rows
        .iter()
        .map(|row| War {
            war_id: row.get("id"),
            guild_id: row.get("guild_id"),
            race_count: row.get("race_count"),
            team_score: row.get("team_score"),
            team_differential: row.get("team_differential"),
            war_date: row.get("war_date"),
            players: Vec::new(),
        })
        .collect();

    if !wars.is_empty() {
        let ids: Vec<String> = wars.iter().map(|w| w.war_id.to_string()).collect();
        let sql = format!(
            "SELECT war_id, player_name, score, races_played, war_participation
             FROM war_players WHERE war_id IN ({}) ORDER BY id",
            ids.join(",")
        );
        let mut by_war: HashMap<i64, Vec<WarPlayer>> = HashMap::new();
        for row in sqlx::query(&sql).fetch_all(pool).await? {
            by_war.entry(row.get("war_id")).or_default().push(WarPlayer {
                player_name: row.get("player_name"),
                score: row.get("score"),
                races_played: row.get("races_played"),
                war_participation: row.get("war_participation"),
            });
        }
        for war in &mut wars {
            war.players = by_war.remove(&war.war_id).unwrap_or_default();
        }
    }

    Ok((wars, total))
}

/// Whether `entries` matches the guild's most recent war as a
/// (name, score) multiset. Used to warn about double submissions.
pub async fn is_duplicate_of_last(
    pool: &SqlitePool,
    guild_id: i64,
    entries: &[NewWarPlayer],
) -> Result<bool> {
    let last_id: Option<i64> =
        sqlx::query_scalar("SELECT MAX(id) FROM wars WHERE guild_id = ?")
            .bind(guild_id)
            .fetch_one(pool)
            .await?;

    let Some(last_id) = last_id else { return Ok(false) };
    let last = get_war(pool, guild_id, last_id).await?;

    if last.players.len() != entries.len() {
        return Ok(false);
    }
    let mut previous: Vec<(String, i64)> =
        last.players.iter().map(|p| (p.player_name.clone(), p.score)).collect();
    let mut candidate: Vec<(String, i64)> =
        entries.iter().map(|e| (e.name.clone(), e.score)).collect();
    previous.sort();
    candidate.sort();
    Ok(previous == candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_database;
    use crate::db::models::MemberStatus;
    use crate::db::players::{add_player, require_player};

    async fn seed_roster(pool: &SqlitePool, names: &[&str]) {
        for name in names {
            add_player(pool, 1, name, MemberStatus::Member, None).await.unwrap();
        }
    }

    fn entry(name: &str, score: i64, races: i64) -> NewWarPlayer {
        NewWarPlayer { name: name.to_string(), score, races_played: races }
    }

    #[tokio::test]
    async fn submit_war_updates_aggregates() {
        let pool = init_test_database().await.unwrap();
        seed_roster(&pool, &["Alpha", "Beta", "Gamma"]).await;

        let submission = submit_war(
            &pool,
            1,
            &[entry("Alpha", 95, 12), entry("Beta", 80, 12), entry("Gamma", 70, 12)],
            12,
            "2026-01-10",
            false,
        )
        .await
        .unwrap();

        assert_eq!(submission.team_score, 245);
        // 245 - 41 * 12 * 3
        assert_eq!(submission.team_differential, 245 - 1476);

        let alpha = require_player(&pool, 1, "Alpha").await.unwrap();
        assert_eq!(alpha.total_score, 95);
        assert_eq!(alpha.total_races, 12);
        assert_eq!(alpha.war_count, 1.0);
        assert_eq!(alpha.average_score, 95.0);
        assert_eq!(alpha.losses, 1);
        assert_eq!(alpha.last_war_date.as_deref(), Some("2026-01-10"));
    }

    #[tokio::test]
    async fn unknown_player_fails_without_auto_create() {
        let pool = init_test_database().await.unwrap();
        seed_roster(&pool, &["Alpha"]).await;

        let err = submit_war(&pool, 1, &[entry("Ghost", 50, 12)], 12, "2026-01-10", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // The failed transaction left nothing behind.
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wars")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn auto_create_adds_roster_rows() {
        let pool = init_test_database().await.unwrap();
        submit_war(&pool, 1, &[entry("Fresh", 90, 12)], 12, "2026-01-10", true)
            .await
            .unwrap();

        let fresh = require_player(&pool, 1, "Fresh").await.unwrap();
        assert_eq!(fresh.member_status, MemberStatus::Member);
        assert_eq!(fresh.team, "Unassigned");
        assert_eq!(fresh.total_score, 90);
    }

    #[tokio::test]
    async fn race_count_and_races_played_bounds() {
        let pool = init_test_database().await.unwrap();
        seed_roster(&pool, &["Alpha"]).await;

        assert!(submit_war(&pool, 1, &[entry("Alpha", 10, 1)], 1, "d", false).await.is_ok());
        assert!(submit_war(&pool, 1, &[entry("Alpha", 10, 24)], 24, "d", false).await.is_ok());
        assert!(submit_war(&pool, 1, &[entry("Alpha", 10, 1)], 0, "d", false).await.is_err());
        assert!(submit_war(&pool, 1, &[entry("Alpha", 10, 1)], 25, "d", false).await.is_err());
        // races_played above race_count is rejected.
        assert!(submit_war(&pool, 1, &[entry("Alpha", 10, 13)], 12, "d", false).await.is_err());
        // Empty wars are rejected.
        assert!(submit_war(&pool, 1, &[], 12, "d", false).await.is_err());
    }

    #[tokio::test]
    async fn remove_war_restores_aggregates_exactly() {
        let pool = init_test_database().await.unwrap();
        seed_roster(&pool, &["Alpha"]).await;

        for score in [100, 100, 100, 100] {
            submit_war(&pool, 1, &[entry("Alpha", score, 12)], 12, "2026-01-10", false)
                .await
                .unwrap();
        }
        let target = submit_war(&pool, 1, &[entry("Alpha", 100, 12)], 12, "2026-01-11", false)
            .await
            .unwrap();

        let before = require_player(&pool, 1, "Alpha").await.unwrap();
        assert_eq!(before.war_count, 5.0);
        assert_eq!(before.total_score, 500);
        assert_eq!(before.total_races, 60);

        remove_war(&pool, 1, target.war_id).await.unwrap();

        let after = require_player(&pool, 1, "Alpha").await.unwrap();
        assert_eq!(after.total_score, 400);
        assert_eq!(after.total_races, 48);
        assert_eq!(after.war_count, 4.0);
        assert_eq!(after.average_score, 100.0);
        assert_eq!(after.last_war_date.as_deref(), Some("2026-01-10"));
        assert_eq!(after.losses, 4);
    }

    #[tokio::test]
    async fn add_then_remove_is_identity() {
        let pool = init_test_database().await.unwrap();
        seed_roster(&pool, &["Alpha", "Beta"]).await;

        submit_war(&pool, 1, &[entry("Alpha", 77, 8), entry("Beta", 50, 12)], 12, "d1", false)
            .await
            .unwrap();
        let before = require_player(&pool, 1, "Alpha").await.unwrap();

        let w = submit_war(&pool, 1, &[entry("Alpha", 91, 12)], 12, "d2", false)
            .await
            .unwrap();
        remove_war(&pool, 1, w.war_id).await.unwrap();

        let after = require_player(&pool, 1, "Alpha").await.unwrap();
        assert_eq!(after.total_score, before.total_score);
        assert_eq!(after.total_races, before.total_races);
        assert_eq!(after.war_count, before.war_count);
        assert_eq!(after.average_score, before.average_score);
        assert_eq!(after.total_team_differential, before.total_team_differential);
        assert_eq!(after.last_war_date, before.last_war_date);
    }

    #[tokio::test]
    async fn append_recomputes_war_and_aggregates() {
        let pool = init_test_database().await.unwrap();
        seed_roster(&pool, &["Alpha", "Beta"]).await;

        let w = submit_war(&pool, 1, &[entry("Alpha", 400, 12)], 12, "d", false)
            .await
            .unwrap();
        // 400 - 492
        assert_eq!(w.team_differential, -92);

        let appended = append_players(&pool, 1, w.war_id, &[entry("Beta", 600, 12)])
            .await
            .unwrap();
        assert_eq!(appended.team_score, 1000);
        // 1000 - 41 * 12 * 2
        assert_eq!(appended.team_differential, 1000 - 984);

        let war = get_war(&pool, 1, w.war_id).await.unwrap();
        assert_eq!(war.players.len(), 2);
        assert_eq!(war.team_score, 1000);

        // Existing player's differential share was swapped for the new one,
        // and the war flipped from loss to win for both.
        let alpha = require_player(&pool, 1, "Alpha").await.unwrap();
        assert_eq!(alpha.total_team_differential, 16);
        assert_eq!(alpha.wins, 1);
        assert_eq!(alpha.losses, 0);

        // Duplicate append is rejected.
        assert!(append_players(&pool, 1, w.war_id, &[entry("Beta", 1, 12)]).await.is_err());
    }

    #[tokio::test]
    async fn pagination_and_duplicate_check() {
        let pool = init_test_database().await.unwrap();
        seed_roster(&pool, &["Alpha"]).await;

        for i in 0..5 {
            submit_war(&pool, 1, &[entry("Alpha", 80 + i, 12)], 12, "d", false)
                .await
                .unwrap();
        }

        let (page1, total) = list_wars(&pool, 1, 1, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page1.len(), 2);
        // Newest first.
        assert!(page1[0].war_id > page1[1].war_id);
        assert_eq!(page1[0].players.len(), 1);

        assert!(is_duplicate_of_last(&pool, 1, &[entry("Alpha", 84, 12)]).await.unwrap());
        assert!(!is_duplicate_of_last(&pool, 1, &[entry("Alpha", 12, 12)]).await.unwrap());
    }

    #[tokio::test]
    async fn wars_are_guild_scoped() {
        let pool = init_test_database().await.unwrap();
        seed_roster(&pool, &["Alpha"]).await;
        let w = submit_war(&pool, 1, &[entry("Alpha", 80, 12)], 12, "d", false)
            .await
            .unwrap();

        // Another guild cannot see or remove it.
        assert!(matches!(get_war(&pool, 2, w.war_id).await, Err(Error::NotFound(_))));
        assert!(matches!(remove_war(&pool, 2, w.war_id).await, Err(Error::NotFound(_))));
        let (wars, total) = list_wars(&pool, 2, 1, 10).await.unwrap();
        assert!(wars.is_empty());
        assert_eq!(total, 0);
    }
}
