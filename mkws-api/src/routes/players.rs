//! Roster endpoints

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use mkws_common::db::models::{MemberStatus, Player};
use mkws_common::db::players;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Serialize)]
struct PlayersResponse {
    players: Vec<Player>,
    total: usize,
}

/// GET /guilds/{g}/players
async fn list_players(
    State(state): State<AppState>,
    identity: Identity,
    Path(guild_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<PlayersResponse>> {
    identity.require_member(guild_id)?;
    let players = players::list_players(&state.db, guild_id, query.include_inactive).await?;
    let total = players.len();
    Ok(Json(PlayersResponse { players, total }))
}

#[derive(Deserialize)]
struct AddPlayerRequest {
    name: String,
    #[serde(default)]
    member_status: Option<String>,
}

/// POST /guilds/{g}/players
async fn add_player(
    State(state): State<AppState>,
    identity: Identity,
    Path(guild_id): Path<i64>,
    Json(request): Json<AddPlayerRequest>,
) -> ApiResult<Json<Player>> {
    identity.require_manage(guild_id)?;
    let status = match request.member_status.as_deref() {
        Some(raw) => MemberStatus::parse(raw)?,
        None => MemberStatus::Member,
    };
    players::add_player(&state.db, guild_id, &request.name, status, None).await?;
    let player = players::require_player(&state.db, guild_id, request.name.trim()).await?;
    Ok(Json(player))
}

#[derive(Deserialize)]
struct UpdateStatusRequest {
    member_status: String,
}

/// PUT /guilds/{g}/players/{name}/status
async fn update_status(
    State(state): State<AppState>,
    identity: Identity,
    Path((guild_id, name)): Path<(i64, String)>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    identity.require_manage(guild_id)?;
    let status = MemberStatus::parse(&request.member_status)?;
    players::set_member_status(&state.db, guild_id, &name, status).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct AddNicknameRequest {
    nickname: String,
}

/// POST /guilds/{g}/players/{name}/nicknames
async fn add_nickname(
    State(state): State<AppState>,
    identity: Identity,
    Path((guild_id, name)): Path<(i64, String)>,
    Json(request): Json<AddNicknameRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    identity.require_manage(guild_id)?;
    if request.nickname.trim().is_empty() {
        return Err(ApiError::BadRequest("nickname must not be empty".to_string()));
    }
    players::add_nickname(&state.db, guild_id, &name, &request.nickname).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/guilds/:guild_id/players", get(list_players).post(add_player))
        .route("/guilds/:guild_id/players/:name/status", put(update_status))
        .route("/guilds/:guild_id/players/:name/nicknames", post(add_nickname))
}
