//! Player aggregate maintenance and statistics queries
//!
//! Aggregates (total_score, total_races, fractional war_count,
//! average_score, total_team_differential, win/loss/tie record,
//! last_war_date) must always reconcile with the underlying war rows.
//! Every war mutation updates them inside the same transaction, so the
//! insert/remove helpers here take the caller's open connection.

use crate::db::models::GuildOverview;
use crate::scores::round2;
use crate::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// One leaderboard line. Also the shape of last-X-wars recomputation,
/// which never persists.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub player_name: String,
    pub team: String,
    pub total_score: i64,
    pub total_races: i64,
    pub war_count: f64,
    pub average_score: f64,
    pub total_team_differential: i64,
    pub wins: i64,
    pub losses: i64,
    pub ties: i64,
    pub last_war_date: Option<String>,
}

/// Full per-player statistics for the stats endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStats {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    pub member_status: String,
    pub nicknames: Vec<String>,
    pub highest_score: i64,
    pub lowest_score: i64,
    pub win_percentage: f64,
}

/// Leaderboard sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    AverageScore,
    TotalScore,
    WarCount,
    TotalTeamDifferential,
}

impl SortKey {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "average_score" => Ok(SortKey::AverageScore),
            "total_score" => Ok(SortKey::TotalScore),
            "war_count" => Ok(SortKey::WarCount),
            "total_team_differential" => Ok(SortKey::TotalTeamDifferential),
            other => Err(Error::InvalidInput(format!(
                "unknown sort key '{}' (average_score, total_score, war_count, total_team_differential)",
                other
            ))),
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortKey::AverageScore => "average_score",
            SortKey::TotalScore => "total_score",
            SortKey::WarCount => "war_count",
            SortKey::TotalTeamDifferential => "total_team_differential",
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::AverageScore
    }
}

/// The team differential share credited to one player: the war's
/// differential scaled by participation, truncated toward zero.
pub fn scaled_differential(team_differential: i64, participation: f64) -> i64 {
    (team_differential as f64 * participation) as i64
}

/// Fold one new war performance into a player's aggregates. Must run in
/// the same transaction as the war insert.
pub async fn apply_war_insert(
    conn: &mut SqliteConnection,
    guild_id: i64,
    player_name: &str,
    score: i64,
    races_played: i64,
    participation: f64,
    war_date: &str,
    team_differential: i64,
) -> Result<()> {
    let row = sqlx::query(
        "SELECT total_score, total_races, war_count, total_team_differential, last_war_date
         FROM players WHERE guild_id = ? AND player_name = ?",
    )
    .bind(guild_id)
    .bind(player_name)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("player '{}' not found", player_name)))?;

    let total_score: i64 = row.get::<i64, _>("total_score") + score;
    let total_races: i64 = row.get::<i64, _>("total_races") + races_played;
    let war_count = round2(row.get::<f64, _>("war_count") + participation);
    let total_differential: i64 = row.get::<i64, _>("total_team_differential")
        + scaled_differential(team_differential, participation);
    let average = if war_count > 0.0 { round2(total_score as f64 / war_count) } else { 0.0 };
    let last_war_date = match row.get::<Option<String>, _>("last_war_date") {
        Some(prev) if prev.as_str() >= war_date => prev,
        _ => war_date.to_string(),
    };

    sqlx::query(
        r#"
        UPDATE players
        SET total_score = ?, total_races = ?, war_count = ?, average_score = ?,
            total_team_differential = ?, last_war_date = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guild_id = ? AND player_name = ?
        "#,
    )
    .bind(total_score)
    .bind(total_races)
    .bind(war_count)
    .bind(average)
    .bind(total_differential)
    .bind(last_war_date)
    .bind(guild_id)
    .bind(player_name)
    .execute(&mut *conn)
    .await?;

    recompute_record(conn, guild_id, player_name).await
}

/// Reverse one war performance. The caller deletes the war rows in the
/// same transaction, then calls this per player; last_war_date is
/// recomputed from the remaining wars.
pub async fn apply_war_remove(
    conn: &mut SqliteConnection,
    guild_id: i64,
    player_name: &str,
    score: i64,
    races_played: i64,
    participation: f64,
    team_differential: i64,
) -> Result<()> {
    let row = sqlx::query(
        "SELECT total_score, total_races, war_count, total_team_differential
         FROM players WHERE guild_id = ? AND player_name = ?",
    )
    .bind(guild_id)
    .bind(player_name)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("player '{}' not found", player_name)))?;

    let total_score = (row.get::<i64, _>("total_score") - score).max(0);
    let total_races = (row.get::<i64, _>("total_races") - races_played).max(0);
    let war_count = round2((row.get::<f64, _>("war_count") - participation).max(0.0));
    let total_differential: i64 = row.get::<i64, _>("total_team_differential")
        - scaled_differential(team_differential, participation);
    let average = if war_count > 0.0 { round2(total_score as f64 / war_count) } else { 0.0 };

    let last_war_date: Option<String> = sqlx::query_scalar(
        "SELECT MAX(w.war_date) FROM war_players wp JOIN wars w ON wp.war_id = w.id
         WHERE wp.guild_id = ? AND wp.player_name = ?",
    )
    .bind(guild_id)
    .bind(player_name)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE players
        SET total_score = ?, total_races = ?, war_count = ?, average_score = ?,
            total_team_differential = ?, last_war_date = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guild_id = ? AND player_name = ?
        "#,
    )
    .bind(total_score)
    .bind(total_races)
    .bind(war_count)
    .bind(average)
    .bind(total_differential)
    .bind(last_war_date)
    .bind(guild_id)
    .bind(player_name)
    .execute(&mut *conn)
    .await?;

    recompute_record(conn, guild_id, player_name).await
}

/// Recount wins/losses/ties from the surviving war rows.
pub(crate) async fn recompute_record(
    conn: &mut SqliteConnection,
    guild_id: i64,
    player_name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE players
        SET wins = (SELECT COUNT(*) FROM war_players wp JOIN wars w ON wp.war_id = w.id
                    WHERE wp.guild_id = ?1 AND wp.player_name = ?2 AND w.team_differential > 0),
            losses = (SELECT COUNT(*) FROM war_players wp JOIN wars w ON wp.war_id = w.id
                      WHERE wp.guild_id = ?1 AND wp.player_name = ?2 AND w.team_differential < 0),
            ties = (SELECT COUNT(*) FROM war_players wp JOIN wars w ON wp.war_id = w.id
                    WHERE wp.guild_id = ?1 AND wp.player_name = ?2 AND w.team_differential = 0)
        WHERE guild_id = ?1 AND player_name = ?2
        "#,
    )
    .bind(guild_id)
    .bind(player_name)
    .execute(conn)
    .await?;
    Ok(())
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> LeaderboardEntry {
    LeaderboardEntry {
        player_name: row.get("player_name"),
        team: row.get("team"),
        total_score: row.get("total_score"),
        total_races: row.get("total_races"),
        war_count: row.get("war_count"),
        average_score: row.get("average_score"),
        total_team_differential: row.get("total_team_differential"),
        wins: row.get("wins"),
        losses: row.get("losses"),
        ties: row.get("ties"),
        last_war_date: row.get("last_war_date"),
    }
}

/// Leaderboard over persisted aggregates. When `last_x_wars` is set,
/// every player's aggregates are recomputed over their most recent N
/// wars only, without persisting anything.
pub async fn leaderboard(
    pool: &SqlitePool,
    guild_id: i64,
    sort: SortKey,
    limit: i64,
    last_x_wars: Option<i64>,
) -> Result<Vec<LeaderboardEntry>> {
    let limit = limit.clamp(1, 200);

    if let Some(n) = last_x_wars {
        if n < 1 {
            return Err(Error::InvalidInput("lastxwars must be at least 1".to_string()));
        }
        return leaderboard_last_x(pool, guild_id, sort, limit, n).await;
    }

    let rows = sqlx::query(&format!(
        "SELECT player_name, team, total_score, total_races, war_count, average_score,
                total_team_differential, wins, losses, ties, last_war_date
         FROM players
         WHERE guild_id = ? AND is_active = 1
         ORDER BY {} DESC, player_name ASC
         LIMIT ?",
        sort.column()
    ))
    .bind(guild_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(entry_from_row).collect())
}

async fn leaderboard_last_x(
    pool: &SqlitePool,
    guild_id: i64,
    sort: SortKey,
    limit: i64,
    n: i64,
) -> Result<Vec<LeaderboardEntry>> {
    let players = sqlx::query(
        "SELECT player_name, team FROM players WHERE guild_id = ? AND is_active = 1",
    )
    .bind(guild_id)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(players.len());
    for row in players {
        let name: String = row.get("player_name");
        let team: String = row.get("team");
        if let Some(entry) = recompute_over_recent(pool, guild_id, &name, &team, n).await? {
            entries.push(entry);
        }
    }

    entries.sort_by(|a, b| {
        let ord = match sort {
            SortKey::AverageScore => b.average_score.partial_cmp(&a.average_score),
            SortKey::WarCount => b.war_count.partial_cmp(&a.war_count),
            SortKey::TotalScore => Some(b.total_score.cmp(&a.total_score)),
            SortKey::TotalTeamDifferential => {
                Some(b.total_team_differential.cmp(&a.total_team_differential))
            }
        };
        ord.unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.player_name.cmp(&b.player_name))
    });
    entries.truncate(limit as usize);
    Ok(entries)
}

/// Aggregate a player's most recent `n` wars. Returns None for players
/// with no wars at all.
async fn recompute_over_recent(
    pool: &SqlitePool,
    guild_id: i64,
    player_name: &str,
    team: &str,
    n: i64,
) -> Result<Option<LeaderboardEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT wp.score, wp.races_played, wp.war_participation,
               w.team_differential, w.war_date
        FROM war_players wp
        JOIN wars w ON wp.war_id = w.id
        WHERE wp.guild_id = ? AND wp.player_name = ?
        ORDER BY w.id DESC
        LIMIT ?
        "#,
    )
    .bind(guild_id)
    .bind(player_name)
    .bind(n)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut entry = LeaderboardEntry {
        player_name: player_name.to_string(),
        team: team.to_string(),
        total_score: 0,
        total_races: 0,
        war_count: 0.0,
        average_score: 0.0,
        total_team_differential: 0,
        wins: 0,
        losses: 0,
        ties: 0,
        last_war_date: None,
    };

    for row in &rows {
        let participation: f64 = row.get("war_participation");
        let differential: i64 = row.get("team_differential");
        entry.total_score += row.get::<i64, _>("score");
        entry.total_races += row.get::<i64, _>("races_played");
        entry.war_count += participation;
        entry.total_team_differential += scaled_differential(differential, participation);
        match differential.cmp(&0) {
            std::cmp::Ordering::Greater => entry.wins += 1,
            std::cmp::Ordering::Less => entry.losses += 1,
            std::cmp::Ordering::Equal => entry.ties += 1,
        }
        let war_date: String = row.get("war_date");
        if entry.last_war_date.as_deref().map_or(true, |d| war_date.as_str() > d) {
            entry.last_war_date = Some(war_date);
        }
    }

    entry.war_count = round2(entry.war_count);
    entry.average_score = if entry.war_count > 0.0 {
        round2(entry.total_score as f64 / entry.war_count)
    } else {
        0.0
    };

    Ok(Some(entry))
}

/// Full statistics for one player, optionally over their last N wars.
pub async fn player_stats(
    pool: &SqlitePool,
    guild_id: i64,
    player_name: &str,
    last_x_wars: Option<i64>,
) -> Result<PlayerStats> {
    let player = super::players::require_player(pool, guild_id, player_name).await?;

    let entry = match last_x_wars {
        Some(n) => recompute_over_recent(pool, guild_id, &player.player_name, &player.team, n)
            .await?
            .unwrap_or(LeaderboardEntry {
                player_name: player.player_name.clone(),
                team: player.team.clone(),
                total_score: 0,
                total_races: 0,
                war_count: 0.0,
                average_score: 0.0,
                total_team_differential: 0,
                wins: 0,
                losses: 0,
                ties: 0,
                last_war_date: None,
            }),
        None => LeaderboardEntry {
            player_name: player.player_name.clone(),
            team: player.team.clone(),
            total_score: player.total_score,
            total_races: player.total_races,
            war_count: player.war_count,
            average_score: player.average_score,
            total_team_differential: player.total_team_differential,
            wins: player.wins,
            losses: player.losses,
            ties: player.ties,
            last_war_date: player.last_war_date.clone(),
        },
    };

    // Best and worst single-war scores over full-participation wars.
    let extremes = sqlx::query(
        r#"
        SELECT COALESCE(MAX(wp.score), 0) AS highest, COALESCE(MIN(wp.score), 0) AS lowest
        FROM war_players wp
        JOIN wars w ON wp.war_id = w.id
        WHERE wp.guild_id = ? AND wp.player_name = ? AND wp.races_played = w.race_count
        "#,
    )
    .bind(guild_id)
    .bind(player_name)
    .fetch_one(pool)
    .await?;

    let decided = entry.wins + entry.losses + entry.ties;
    let win_percentage = if decided > 0 {
        round2(entry.wins as f64 / decided as f64 * 100.0)
    } else {
        0.0
    };

    Ok(PlayerStats {
        entry,
        member_status: player.member_status.as_str().to_string(),
        nicknames: player.nicknames,
        highest_score: extremes.get("highest"),
        lowest_score: extremes.get("lowest"),
        win_percentage,
    })
}

/// Guild-wide aggregate summary.
pub async fn overview(pool: &SqlitePool, guild_id: i64) -> Result<GuildOverview> {
    let players: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE guild_id = ? AND is_active = 1")
            .bind(guild_id)
            .fetch_one(pool)
            .await?;

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS war_count,
               COALESCE(SUM(CASE WHEN team_differential > 0 THEN 1 ELSE 0 END), 0) AS wins,
               COALESCE(SUM(CASE WHEN team_differential < 0 THEN 1 ELSE 0 END), 0) AS losses,
               COALESCE(SUM(CASE WHEN team_differential = 0 THEN 1 ELSE 0 END), 0) AS ties,
               COALESCE(SUM(team_score), 0) AS total_score,
               MAX(war_date) AS last_war_date
        FROM wars
        WHERE guild_id = ?
        "#,
    )
    .bind(guild_id)
    .fetch_one(pool)
    .await?;

    Ok(GuildOverview {
        player_count: players,
        war_count: row.get("war_count"),
        wins: row.get("wins"),
        losses: row.get("losses"),
        ties: row.get("ties"),
        total_score: row.get("total_score"),
        last_war_date: row.get("last_war_date"),
    })
}
