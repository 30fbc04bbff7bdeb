//! Bulk review session endpoints
//!
//! Creation and row appends are key-gated for the bot; review and
//! confirmation require the caller to belong to the session's guild.
//! Confirmation retries transparently on transient storage contention
//! (it is idempotent under the session-state check).

use crate::auth::{ApiKey, Identity};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use mkws_common::db::bulk::{self, NewBulkFailure, NewBulkResult};
use mkws_common::db::models::{
    BulkFailure, BulkResult, BulkSession, DetectedPlayer, ReviewStatus, SessionStatus,
};
use mkws_common::db::with_retry;
use mkws_common::scores::DEFAULT_RACE_COUNT;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct CreateSessionRequest {
    guild_id: i64,
    created_by_user_id: i64,
    total_images: i64,
    #[serde(default)]
    creation_nonce: Option<String>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_token: String,
}

/// POST /bulk/sessions (API key only)
async fn create_session(
    State(state): State<AppState>,
    _key: ApiKey,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<CreateSessionResponse>> {
    let session_token = bulk::create_session(
        &state.db,
        request.guild_id,
        request.created_by_user_id,
        request.total_images,
        request.creation_nonce.as_deref(),
    )
    .await?;
    Ok(Json(CreateSessionResponse { session_token }))
}

#[derive(Deserialize)]
struct AppendResultRequest {
    image_filename: Option<String>,
    image_url: Option<String>,
    detected_players: Vec<DetectedPlayer>,
    #[serde(default)]
    race_count: Option<i64>,
    message_timestamp: Option<String>,
}

/// POST /bulk/sessions/{token}/results (API key only)
async fn append_result(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(token): Path<String>,
    Json(request): Json<AppendResultRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let result_id = bulk::append_result(
        &state.db,
        &token,
        NewBulkResult {
            image_filename: request.image_filename,
            image_url: request.image_url,
            detected_players: request.detected_players,
            race_count: request.race_count.unwrap_or(DEFAULT_RACE_COUNT),
            message_timestamp: request.message_timestamp,
        },
    )
    .await?;
    Ok(Json(serde_json::json!({ "result_id": result_id })))
}

#[derive(Deserialize)]
struct AppendFailureRequest {
    image_filename: Option<String>,
    image_url: Option<String>,
    error_message: String,
    message_timestamp: Option<String>,
    #[serde(default)]
    discord_message_id: Option<i64>,
}

/// POST /bulk/sessions/{token}/failures (API key only)
async fn append_failure(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(token): Path<String>,
    Json(request): Json<AppendFailureRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let failure_id = bulk::append_failure(
        &state.db,
        &token,
        NewBulkFailure {
            image_filename: request.image_filename,
            image_url: request.image_url,
            error_message: request.error_message,
            message_timestamp: request.message_timestamp,
            chat_message_id: request.discord_message_id,
        },
    )
    .await?;
    Ok(Json(serde_json::json!({ "failure_id": failure_id })))
}

/// Load a session and check the caller may see it. Expired sessions
/// answer 410 on every read and review path.
async fn authorized_session(
    state: &AppState,
    identity: &Identity,
    token: &str,
) -> Result<BulkSession, ApiError> {
    let session = bulk::get_session(&state.db, token).await?;
    identity.require_member(session.guild_id)?;
    let clock_expired = session.status == SessionStatus::Open
        && session.expires_at < Utc::now().to_rfc3339();
    if session.status == SessionStatus::Expired || clock_expired {
        return Err(ApiError::Gone("session has expired".to_string()));
    }
    Ok(session)
}

/// GET /bulk/sessions/{token}
async fn get_session(
    State(state): State<AppState>,
    identity: Identity,
    Path(token): Path<String>,
) -> ApiResult<Json<BulkSession>> {
    Ok(Json(authorized_session(&state, &identity, &token).await?))
}

#[derive(Serialize)]
struct SessionResultsResponse {
    session: BulkSession,
    results: Vec<BulkResult>,
    failures: Vec<BulkFailure>,
    total: usize,
}

/// GET /bulk/sessions/{token}/results
async fn get_session_results(
    State(state): State<AppState>,
    identity: Identity,
    Path(token): Path<String>,
) -> ApiResult<Json<SessionResultsResponse>> {
    let session = authorized_session(&state, &identity, &token).await?;
    let results = bulk::get_results(&state.db, &token).await?;
    let failures = bulk::get_failures(&state.db, &token).await?;
    let total = results.len();
    Ok(Json(SessionResultsResponse { session, results, failures, total }))
}

#[derive(Deserialize)]
struct UpdateResultRequest {
    review_status: String,
    #[serde(default)]
    corrected_players: Option<Vec<DetectedPlayer>>,
}

/// PUT /bulk/sessions/{token}/results/{result_id}
async fn update_result(
    State(state): State<AppState>,
    identity: Identity,
    Path((token, result_id)): Path<(String, i64)>,
    Json(request): Json<UpdateResultRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    authorized_session(&state, &identity, &token).await?;
    let status = ReviewStatus::parse(&request.review_status)?;
    bulk::update_result(&state.db, &token, result_id, status, request.corrected_players).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct ConvertFailureRequest {
    #[serde(default)]
    players: Vec<DetectedPlayer>,
    review_status: String,
}

/// POST /bulk/sessions/{token}/failures/{failure_id}/convert
async fn convert_failure(
    State(state): State<AppState>,
    identity: Identity,
    Path((token, failure_id)): Path<(String, i64)>,
    Json(request): Json<ConvertFailureRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    authorized_session(&state, &identity, &token).await?;
    let status = ReviewStatus::parse(&request.review_status)?;
    let result_id =
        bulk::convert_failure(&state.db, &token, failure_id, request.players, status).await?;
    Ok(Json(serde_json::json!({ "result_id": result_id })))
}

/// POST /bulk/sessions/{token}/confirm
async fn confirm_session(
    State(state): State<AppState>,
    identity: Identity,
    Path(token): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    authorized_session(&state, &identity, &token).await?;
    let outcome =
        with_retry("confirm_session", || bulk::confirm_session(&state.db, &token)).await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "wars_created": outcome.wars_created,
        "war_ids": outcome.war_ids,
    })))
}

/// POST /bulk/sessions/{token}/cancel - idempotent relative to
/// terminal states, so an expired session still answers 200.
async fn cancel_session(
    State(state): State<AppState>,
    identity: Identity,
    Path(token): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = bulk::get_session(&state.db, &token).await?;
    identity.require_member(session.guild_id)?;
    let status = bulk::cancel_session(&state.db, &token).await?;
    Ok(Json(serde_json::json!({ "status": "ok", "session_status": status.as_str() })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bulk/sessions", post(create_session))
        .route("/bulk/sessions/:token", get(get_session))
        .route("/bulk/sessions/:token/results", get(get_session_results).post(append_result))
        .route("/bulk/sessions/:token/results/:result_id", put(update_result))
        .route("/bulk/sessions/:token/failures", post(append_failure))
        .route("/bulk/sessions/:token/failures/:failure_id/convert", post(convert_failure))
        .route("/bulk/sessions/:token/confirm", post(confirm_session))
        .route("/bulk/sessions/:token/cancel", post(cancel_session))
}
