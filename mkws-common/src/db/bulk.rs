//! Bulk review session store
//!
//! Sessions collect per-image OCR outputs (results) and failures for
//! review. Confirmation materializes every approved result into a war
//! inside one transaction; afterwards the session and its children are
//! immutable history. Sessions expire 24 hours after creation; a
//! periodic sweep marks overdue `open` sessions `expired`.

use crate::db::models::{
    BulkFailure, BulkResult, BulkSession, DetectedPlayer, ReviewStatus, SessionStatus,
};
use crate::db::wars::{self, NewWarPlayer};
use crate::scores::validate_race_count;
use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::RngCore;
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Session lifetime from creation.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Input for appending one OCR output to a session.
#[derive(Debug, Clone)]
pub struct NewBulkResult {
    pub image_filename: Option<String>,
    pub image_url: Option<String>,
    pub detected_players: Vec<DetectedPlayer>,
    pub race_count: i64,
    pub message_timestamp: Option<String>,
}

/// Input for appending one OCR failure to a session.
#[derive(Debug, Clone)]
pub struct NewBulkFailure {
    pub image_filename: Option<String>,
    pub image_url: Option<String>,
    pub error_message: String,
    pub message_timestamp: Option<String>,
    pub chat_message_id: Option<i64>,
}

/// Outcome of confirming a session.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub wars_created: i64,
    pub war_ids: Vec<i64>,
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Create an `open` session with a 24h TTL. When a creation nonce is
/// supplied, a replay with the same `(guild, user, nonce)` returns the
/// original token instead of a new session.
pub async fn create_session(
    pool: &SqlitePool,
    guild_id: i64,
    created_by_user_id: i64,
    total_images: i64,
    creation_nonce: Option<&str>,
) -> Result<String> {
    if let Some(nonce) = creation_nonce {
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT session_token FROM bulk_scan_sessions
             WHERE guild_id = ? AND created_by_user_id = ? AND creation_nonce = ?",
        )
        .bind(guild_id)
        .bind(created_by_user_id)
        .bind(nonce)
        .fetch_optional(pool)
        .await?;
        if let Some(token) = existing {
            return Ok(token);
        }
    }

    let token = generate_token();
    let now = Utc::now();
    let expires = now + Duration::hours(SESSION_TTL_HOURS);

    sqlx::query(
        "INSERT INTO bulk_scan_sessions
         (session_token, guild_id, created_by_user_id, status, total_images, creation_nonce, created_at, expires_at)
         VALUES (?, ?, ?, 'open', ?, ?, ?, ?)",
    )
    .bind(&token)
    .bind(guild_id)
    .bind(created_by_user_id)
    .bind(total_images)
    .bind(creation_nonce)
    .bind(now.to_rfc3339())
    .bind(expires.to_rfc3339())
    .execute(pool)
    .await?;

    info!(guild_id, total_images, "bulk session created");
    Ok(token)
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BulkSession> {
    let status: String = row.get("status");
    Ok(BulkSession {
        session_token: row.get("session_token"),
        guild_id: row.get("guild_id"),
        created_by_user_id: row.get("created_by_user_id"),
        status: SessionStatus::parse(&status)?,
        total_images: row.get("total_images"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

pub async fn get_session(pool: &SqlitePool, token: &str) -> Result<BulkSession> {
    let row = sqlx::query(
        "SELECT session_token, guild_id, created_by_user_id, status, total_images, created_at, expires_at
         FROM bulk_scan_sessions WHERE session_token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound("session not found".to_string()))?;

    session_from_row(&row)
}

/// Load the session and require it to be open and unexpired. An open
/// session past its TTL is treated as expired even if the sweep has
/// not caught it yet.
async fn require_open(pool: &SqlitePool, token: &str) -> Result<BulkSession> {
    let session = get_session(pool, token).await?;
    match session.status {
        SessionStatus::Expired => Err(Error::Expired("session has expired".to_string())),
        SessionStatus::Open if session.expires_at < Utc::now().to_rfc3339() => {
            Err(Error::Expired("session has expired".to_string()))
        }
        SessionStatus::Open => Ok(session),
        other => Err(Error::InvalidState(format!(
            "session is {}, not open",
            other.as_str()
        ))),
    }
}

pub async fn append_result(pool: &SqlitePool, token: &str, result: NewBulkResult) -> Result<i64> {
    require_open(pool, token).await?;
    validate_race_count(result.race_count)?;

    let id = sqlx::query(
        "INSERT INTO bulk_scan_results
         (session_token, image_filename, image_url, detected_players, race_count, message_timestamp)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(token)
    .bind(&result.image_filename)
    .bind(&result.image_url)
    .bind(serde_json::to_string(&result.detected_players).map_err(|e| Error::Internal(e.to_string()))?)
    .bind(result.race_count)
    .bind(&result.message_timestamp)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

pub async fn append_failure(pool: &SqlitePool, token: &str, failure: NewBulkFailure) -> Result<i64> {
    require_open(pool, token).await?;

    let id = sqlx::query(
        "INSERT INTO bulk_scan_failures
         (session_token, image_filename, image_url, error_message, message_timestamp, chat_message_id)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(token)
    .bind(&failure.image_filename)
    .bind(&failure.image_url)
    .bind(&failure.error_message)
    .bind(&failure.message_timestamp)
    .bind(failure.chat_message_id)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

/// One item of a batched append.
#[derive(Debug, Clone)]
pub enum BulkAppend {
    Result(NewBulkResult),
    Failure(NewBulkFailure),
}

/// Append a batch of OCR completions in one transaction. The bot
/// worker batches up to ten completions per flush.
pub async fn append_batch(pool: &SqlitePool, token: &str, items: Vec<BulkAppend>) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    require_open(pool, token).await?;

    let mut tx = pool.begin().await?;
    for item in &items {
        match item {
            BulkAppend::Result(result) => {
                validate_race_count(result.race_count)?;
                sqlx::query(
                    "INSERT INTO bulk_scan_results
                     (session_token, image_filename, image_url, detected_players, race_count, message_timestamp)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(token)
                .bind(&result.image_filename)
                .bind(&result.image_url)
                .bind(
                    serde_json::to_string(&result.detected_players)
                        .map_err(|e| Error::Internal(e.to_string()))?,
                )
                .bind(result.race_count)
                .bind(&result.message_timestamp)
                .execute(&mut *tx)
                .await?;
            }
            BulkAppend::Failure(failure) => {
                sqlx::query(
                    "INSERT INTO bulk_scan_failures
                     (session_token, image_filename, image_url, error_message, message_timestamp, chat_message_id)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(token)
                .bind(&failure.image_filename)
                .bind(&failure.image_url)
                .bind(&failure.error_message)
                .bind(&failure.message_timestamp)
                .bind(failure.chat_message_id)
                .execute(&mut *tx)
                .await?;
            }
        }
    }
    tx.commit().await?;

    Ok(())
}

fn result_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BulkResult> {
    let detected: String = row.get("detected_players");
    let corrected: Option<String> = row.get("corrected_players");
    let status: String = row.get("review_status");
    Ok(BulkResult {
        result_id: row.get("id"),
        session_token: row.get("session_token"),
        image_filename: row.get("image_filename"),
        image_url: row.get("image_url"),
        detected_players: serde_json::from_str(&detected)
            .map_err(|e| Error::Internal(format!("corrupt detected_players: {}", e)))?,
        corrected_players: corrected
            .map(|c| serde_json::from_str(&c))
            .transpose()
            .map_err(|e| Error::Internal(format!("corrupt corrected_players: {}", e)))?,
        review_status: ReviewStatus::parse(&status)?,
        race_count: row.get("race_count"),
        message_timestamp: row.get("message_timestamp"),
    })
}

/// Results in append order (`result_id` ascending).
pub async fn get_results(pool: &SqlitePool, token: &str) -> Result<Vec<BulkResult>> {
    let rows = sqlx::query(
        "SELECT id, session_token, image_filename, image_url, detected_players, corrected_players,
                review_status, race_count, message_timestamp
         FROM bulk_scan_results WHERE session_token = ? ORDER BY id",
    )
    .bind(token)
    .fetch_all(pool)
    .await?;
    rows.iter().map(result_from_row).collect()
}

pub async fn get_failures(pool: &SqlitePool, token: &str) -> Result<Vec<BulkFailure>> {
    let rows = sqlx::query(
        "SELECT id, session_token, image_filename, image_url, error_message, message_timestamp, chat_message_id
         FROM bulk_scan_failures WHERE session_token = ? ORDER BY id",
    )
    .bind(token)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| BulkFailure {
            failure_id: row.get("id"),
            session_token: row.get("session_token"),
            image_filename: row.get("image_filename"),
            image_url: row.get("image_url"),
            error_message: row.get("error_message"),
            message_timestamp: row.get("message_timestamp"),
            chat_message_id: row.get("chat_message_id"),
        })
        .collect())
}

/// Update one result's review state. Any transition between pending,
/// approved, and rejected is allowed while the session is open.
/// `corrected_players` replaces the stored corrections wholesale; when
/// absent, prior corrections are cleared and the detected set stands.
pub async fn update_result(
    pool: &SqlitePool,
    token: &str,
    result_id: i64,
    status: ReviewStatus,
    corrected_players: Option<Vec<DetectedPlayer>>,
) -> Result<()> {
    require_open(pool, token).await?;

    let corrected_json = corrected_players
        .map(|p| serde_json::to_string(&p))
        .transpose()
        .map_err(|e| Error::Internal(e.to_string()))?;

    let updated = sqlx::query(
        "UPDATE bulk_scan_results SET review_status = ?, corrected_players = ?
         WHERE id = ? AND session_token = ?",
    )
    .bind(status.as_str())
    .bind(corrected_json)
    .bind(result_id)
    .bind(token)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("result {} not found", result_id)));
    }
    Ok(())
}

/// Convert a failure into a reviewable result with manually entered
/// players. Deletes the failure and creates the result in one
/// transaction.
pub async fn convert_failure(
    pool: &SqlitePool,
    token: &str,
    failure_id: i64,
    players: Vec<DetectedPlayer>,
    initial_status: ReviewStatus,
) -> Result<i64> {
    require_open(pool, token).await?;
    if players.is_empty() && initial_status != ReviewStatus::Rejected {
        return Err(Error::InvalidInput(
            "players are required unless the result is rejected".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let failure = sqlx::query(
        "SELECT image_filename, image_url, message_timestamp
         FROM bulk_scan_failures WHERE id = ? AND session_token = ?",
    )
    .bind(failure_id)
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound(format!("failure {} not found", failure_id)))?;

    sqlx::query("DELETE FROM bulk_scan_failures WHERE id = ?")
        .bind(failure_id)
        .execute(&mut *tx)
        .await?;

    let result_id = sqlx::query(
        "INSERT INTO bulk_scan_results
         (session_token, image_filename, image_url, detected_players, review_status, race_count, message_timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(token)
    .bind(failure.get::<Option<String>, _>("image_filename"))
    .bind(failure.get::<Option<String>, _>("image_url"))
    .bind(serde_json::to_string(&players).map_err(|e| Error::Internal(e.to_string()))?)
    .bind(initial_status.as_str())
    .bind(crate::scores::DEFAULT_RACE_COUNT)
    .bind(failure.get::<Option<String>, _>("message_timestamp"))
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;

    info!(failure_id, result_id, "failure converted to result");
    Ok(result_id)
}

/// Materialize every approved result into a war, atomically.
///
/// Results are visited in append order; `corrected_players` supersedes
/// `detected_players`; names missing from the roster are auto-created.
/// Any failure aborts the whole transaction - either all approved
/// results become wars or none do. A session with zero approved
/// results confirms successfully with zero wars.
pub async fn confirm_session(pool: &SqlitePool, token: &str) -> Result<ConfirmOutcome> {
    let session = require_open(pool, token).await?;

    let mut tx = pool.begin().await?;
    let mut war_ids = Vec::new();

    let results = {
        // Read inside the transaction so the materialized set matches
        // what is frozen by the status flip below.
        let rows = sqlx::query(
            "SELECT id, session_token, image_filename, image_url, detected_players,
                    corrected_players, review_status, race_count, message_timestamp
             FROM bulk_scan_results WHERE session_token = ? ORDER BY id",
        )
        .bind(token)
        .fetch_all(&mut *tx)
        .await?;
        rows.iter().map(result_from_row).collect::<Result<Vec<_>>>()?
    };

    let now = Utc::now().to_rfc3339();
    for result in &results {
        if result.review_status != ReviewStatus::Approved {
            continue;
        }

        let players = result.effective_players();
        if players.is_empty() {
            return Err(Error::InvalidInput(format!(
                "approved result {} has no players",
                result.result_id
            )));
        }

        let entries: Vec<NewWarPlayer> = players
            .iter()
            .map(|p| NewWarPlayer {
                name: p.name.clone(),
                score: p.score,
                races_played: p.races_played.clamp(1, result.race_count),
            })
            .collect();

        let war_date = result.message_timestamp.clone().unwrap_or_else(|| now.clone());
        let submission = wars::submit_war_tx(
            &mut tx,
            session.guild_id,
            &entries,
            result.race_count,
            &war_date,
            true,
        )
        .await?;
        war_ids.push(submission.war_id);
    }

    sqlx::query("UPDATE bulk_scan_sessions SET status = 'confirmed' WHERE session_token = ?")
        .bind(token)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        guild_id = session.guild_id,
        wars_created = war_ids.len(),
        "bulk session confirmed"
    );
    Ok(ConfirmOutcome { wars_created: war_ids.len() as i64, war_ids })
}

/// Cancel a session. Idempotent relative to terminal states: a session
/// that already expired or was cancelled stays as it is; only a
/// confirmed session refuses.
pub async fn cancel_session(pool: &SqlitePool, token: &str) -> Result<SessionStatus> {
    let session = get_session(pool, token).await?;
    match session.status {
        SessionStatus::Open => {
            sqlx::query("UPDATE bulk_scan_sessions SET status = 'cancelled' WHERE session_token = ?")
                .bind(token)
                .execute(pool)
                .await?;
            info!(guild_id = session.guild_id, "bulk session cancelled");
            Ok(SessionStatus::Cancelled)
        }
        SessionStatus::Cancelled | SessionStatus::Expired => Ok(session.status),
        SessionStatus::Confirmed => Err(Error::InvalidState(
            "session is already confirmed".to_string(),
        )),
    }
}

/// Mark overdue open sessions expired. Run periodically.
pub async fn sweep_expired(pool: &SqlitePool) -> Result<u64> {
    let swept = sqlx::query(
        "UPDATE bulk_scan_sessions SET status = 'expired' WHERE status = 'open' AND expires_at < ?",
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?
    .rows_affected();

    if swept > 0 {
        info!(swept, "expired overdue bulk sessions");
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_database;
    use crate::db::models::MemberStatus;
    use crate::db::players::{add_player, require_player};

    fn detected(name: &str, score: i64, roster: bool) -> DetectedPlayer {
        DetectedPlayer {
            name: name.to_string(),
            score,
            raw_name: None,
            is_roster_member: roster,
            races_played: 12,
        }
    }

    fn new_result(players: Vec<DetectedPlayer>) -> NewBulkResult {
        NewBulkResult {
            image_filename: Some("war.png".to_string()),
            image_url: None,
            detected_players: players,
            race_count: 12,
            message_timestamp: Some("2026-01-10T18:00:00+00:00".to_string()),
        }
    }

    async fn force_expiry(pool: &SqlitePool, token: &str) {
        sqlx::query("UPDATE bulk_scan_sessions SET expires_at = '2000-01-01T00:00:00+00:00' WHERE session_token = ?")
            .bind(token)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tokens_are_long_and_unique() {
        let pool = init_test_database().await.unwrap();
        let a = create_session(&pool, 1, 10, 3, None).await.unwrap();
        let b = create_session(&pool, 1, 10, 3, None).await.unwrap();
        assert_ne!(a, b);
        // 32 bytes base64url without padding.
        assert_eq!(a.len(), 43);
    }

    #[tokio::test]
    async fn nonce_makes_creation_idempotent() {
        let pool = init_test_database().await.unwrap();
        let a = create_session(&pool, 1, 10, 3, Some("nonce-1")).await.unwrap();
        let b = create_session(&pool, 1, 10, 3, Some("nonce-1")).await.unwrap();
        assert_eq!(a, b);
        let c = create_session(&pool, 1, 10, 3, Some("nonce-2")).await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn confirm_materializes_only_approved_results() {
        let pool = init_test_database().await.unwrap();
        add_player(&pool, 1, "Alpha", MemberStatus::Member, None).await.unwrap();
        add_player(&pool, 1, "Beta", MemberStatus::Member, None).await.unwrap();

        let token = create_session(&pool, 1, 10, 3, None).await.unwrap();

        let r1 = append_result(
            &pool,
            &token,
            new_result(vec![detected("Alpha", 90, true), detected("Beta", 60, true)]),
        )
        .await
        .unwrap();
        let r2 = append_result(&pool, &token, new_result(vec![detected("Alpha", 10, true)]))
            .await
            .unwrap();
        let r3 = append_result(&pool, &token, new_result(vec![detected("Alpha", 50, true)]))
            .await
            .unwrap();

        update_result(&pool, &token, r1, ReviewStatus::Approved, None).await.unwrap();
        update_result(&pool, &token, r2, ReviewStatus::Rejected, None).await.unwrap();
        // Approval with corrections: three players, one brand new.
        update_result(
            &pool,
            &token,
            r3,
            ReviewStatus::Approved,
            Some(vec![
                detected("Alpha", 55, true),
                detected("Beta", 45, true),
                detected("Newcomer", 80, false),
            ]),
        )
        .await
        .unwrap();

        let outcome = confirm_session(&pool, &token).await.unwrap();
        assert_eq!(outcome.wars_created, 2);
        assert_eq!(outcome.war_ids.len(), 2);

        // The auto-created player landed on the roster.
        let newcomer = require_player(&pool, 1, "Newcomer").await.unwrap();
        assert_eq!(newcomer.member_status, MemberStatus::Member);
        assert_eq!(newcomer.team, "Unassigned");
        assert_eq!(newcomer.total_score, 80);

        // Exactly two war rows exist.
        let war_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wars WHERE guild_id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(war_total, 2);

        assert_eq!(get_session(&pool, &token).await.unwrap().status, SessionStatus::Confirmed);

        // A second confirm conflicts.
        assert!(matches!(confirm_session(&pool, &token).await, Err(Error::InvalidState(_))));
        // The session is frozen.
        assert!(matches!(
            update_result(&pool, &token, r1, ReviewStatus::Pending, None).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn confirm_with_zero_approved_creates_no_wars() {
        let pool = init_test_database().await.unwrap();
        let token = create_session(&pool, 1, 10, 1, None).await.unwrap();
        append_result(&pool, &token, new_result(vec![detected("Alpha", 10, false)]))
            .await
            .unwrap();

        let outcome = confirm_session(&pool, &token).await.unwrap();
        assert_eq!(outcome.wars_created, 0);
        assert!(outcome.war_ids.is_empty());
        assert_eq!(get_session(&pool, &token).await.unwrap().status, SessionStatus::Confirmed);
    }

    #[tokio::test]
    async fn approved_result_with_no_players_aborts_everything() {
        let pool = init_test_database().await.unwrap();
        add_player(&pool, 1, "Alpha", MemberStatus::Member, None).await.unwrap();
        let token = create_session(&pool, 1, 10, 2, None).await.unwrap();

        let good = append_result(&pool, &token, new_result(vec![detected("Alpha", 90, true)]))
            .await
            .unwrap();
        let empty = append_result(&pool, &token, new_result(vec![])).await.unwrap();
        update_result(&pool, &token, good, ReviewStatus::Approved, None).await.unwrap();
        update_result(&pool, &token, empty, ReviewStatus::Approved, None).await.unwrap();

        assert!(confirm_session(&pool, &token).await.is_err());

        // Nothing materialized, session still open.
        let wars: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wars").fetch_one(&pool).await.unwrap();
        assert_eq!(wars, 0);
        assert_eq!(get_session(&pool, &token).await.unwrap().status, SessionStatus::Open);
    }

    #[tokio::test]
    async fn failure_conversion_is_atomic() {
        let pool = init_test_database().await.unwrap();
        let token = create_session(&pool, 1, 10, 1, None).await.unwrap();
        let failure_id = append_failure(
            &pool,
            &token,
            NewBulkFailure {
                image_filename: Some("blur.png".to_string()),
                image_url: None,
                error_message: "no text boxes".to_string(),
                message_timestamp: None,
                chat_message_id: None,
            },
        )
        .await
        .unwrap();

        // Players required unless rejecting.
        assert!(matches!(
            convert_failure(&pool, &token, failure_id, vec![], ReviewStatus::Pending).await,
            Err(Error::InvalidInput(_))
        ));

        let result_id = convert_failure(
            &pool,
            &token,
            failure_id,
            vec![detected("Alpha", 70, false)],
            ReviewStatus::Approved,
        )
        .await
        .unwrap();

        assert!(get_failures(&pool, &token).await.unwrap().is_empty());
        let results = get_results(&pool, &token).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result_id, result_id);
        assert_eq!(results[0].review_status, ReviewStatus::Approved);
        assert_eq!(results[0].image_filename.as_deref(), Some("blur.png"));
    }

    #[tokio::test]
    async fn expired_sessions_reject_writes_but_allow_cancel() {
        let pool = init_test_database().await.unwrap();
        let token = create_session(&pool, 1, 10, 1, None).await.unwrap();
        force_expiry(&pool, &token).await;

        // Clock expiry gates writes even before the sweep runs.
        assert!(matches!(
            append_result(&pool, &token, new_result(vec![detected("A", 1, false)])).await,
            Err(Error::Expired(_))
        ));
        assert!(matches!(confirm_session(&pool, &token).await, Err(Error::Expired(_))));

        assert_eq!(sweep_expired(&pool).await.unwrap(), 1);
        assert_eq!(get_session(&pool, &token).await.unwrap().status, SessionStatus::Expired);
        assert!(matches!(confirm_session(&pool, &token).await, Err(Error::Expired(_))));

        // Cancel is idempotent relative to terminal states: status stays expired.
        assert_eq!(cancel_session(&pool, &token).await.unwrap(), SessionStatus::Expired);
    }

    #[tokio::test]
    async fn cancel_keeps_history_and_blocks_confirm() {
        let pool = init_test_database().await.unwrap();
        let token = create_session(&pool, 1, 10, 1, None).await.unwrap();
        append_result(&pool, &token, new_result(vec![detected("A", 1, false)]))
            .await
            .unwrap();

        assert_eq!(cancel_session(&pool, &token).await.unwrap(), SessionStatus::Cancelled);
        assert_eq!(cancel_session(&pool, &token).await.unwrap(), SessionStatus::Cancelled);
        assert!(matches!(confirm_session(&pool, &token).await, Err(Error::InvalidState(_))));

        // History retained.
        assert_eq!(get_results(&pool, &token).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn review_status_can_move_back_to_pending() {
        let pool = init_test_database().await.unwrap();
        let token = create_session(&pool, 1, 10, 1, None).await.unwrap();
        let id = append_result(&pool, &token, new_result(vec![detected("A", 1, false)]))
            .await
            .unwrap();

        update_result(&pool, &token, id, ReviewStatus::Approved, Some(vec![detected("B", 2, false)]))
            .await
            .unwrap();
        let r = &get_results(&pool, &token).await.unwrap()[0];
        assert_eq!(r.review_status, ReviewStatus::Approved);
        assert!(r.corrected_players.is_some());

        // Back to pending without corrections clears them.
        update_result(&pool, &token, id, ReviewStatus::Pending, None).await.unwrap();
        let r = &get_results(&pool, &token).await.unwrap()[0];
        assert_eq!(r.review_status, ReviewStatus::Pending);
        assert!(r.corrected_players.is_none());
    }
}
