//! Statistics endpoints

use crate::auth::Identity;
use crate::error::ApiResult;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use mkws_common::db::models::GuildOverview;
use mkws_common::db::stats::{self, LeaderboardEntry, PlayerStats, SortKey};
use serde::{Deserialize, Serialize};

/// GET /guilds/{g}/stats/overview
async fn overview(
    State(state): State<AppState>,
    identity: Identity,
    Path(guild_id): Path<i64>,
) -> ApiResult<Json<GuildOverview>> {
    identity.require_member(guild_id)?;
    Ok(Json(stats::overview(&state.db, guild_id).await?))
}

#[derive(Deserialize)]
struct LeaderboardQuery {
    sort: Option<String>,
    limit: Option<i64>,
    lastxwars: Option<i64>,
}

#[derive(Serialize)]
struct LeaderboardResponse {
    entries: Vec<LeaderboardEntry>,
    sort: String,
}

/// GET /guilds/{g}/stats/leaderboard
async fn leaderboard(
    State(state): State<AppState>,
    identity: Identity,
    Path(guild_id): Path<i64>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<LeaderboardResponse>> {
    identity.require_member(guild_id)?;
    let sort = match query.sort.as_deref() {
        Some(raw) => SortKey::parse(raw)?,
        None => SortKey::default(),
    };
    let entries = stats::leaderboard(
        &state.db,
        guild_id,
        sort,
        query.limit.unwrap_or(25),
        query.lastxwars,
    )
    .await?;
    Ok(Json(LeaderboardResponse {
        entries,
        sort: query.sort.unwrap_or_else(|| "average_score".to_string()),
    }))
}

#[derive(Deserialize)]
struct PlayerQuery {
    lastxwars: Option<i64>,
}

/// GET /guilds/{g}/stats/player/{name}
async fn player(
    State(state): State<AppState>,
    identity: Identity,
    Path((guild_id, name)): Path<(i64, String)>,
    Query(query): Query<PlayerQuery>,
) -> ApiResult<Json<PlayerStats>> {
    identity.require_member(guild_id)?;
    Ok(Json(stats::player_stats(&state.db, guild_id, &name, query.lastxwars).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/guilds/:guild_id/stats/overview", get(overview))
        .route("/guilds/:guild_id/stats/leaderboard", get(leaderboard))
        .route("/guilds/:guild_id/stats/player/:name", get(player))
}
