//! War listing endpoints

use crate::auth::Identity;
use crate::error::ApiResult;
use crate::pagination;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use mkws_common::db::models::War;
use mkws_common::db::wars;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct WarsResponse {
    wars: Vec<War>,
    total: i64,
    page: i64,
    limit: i64,
}

/// GET /guilds/{g}/wars - newest first, players embedded.
async fn list_wars(
    State(state): State<AppState>,
    identity: Identity,
    Path(guild_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<WarsResponse>> {
    identity.require_member(guild_id)?;
    let page = pagination::clamp(query.page, query.limit);
    let (wars, total) = wars::list_wars(&state.db, guild_id, page.page, page.limit).await?;
    Ok(Json(WarsResponse { wars, total, page: page.page, limit: page.limit }))
}

/// GET /guilds/{g}/wars/{war_id}
async fn get_war(
    State(state): State<AppState>,
    identity: Identity,
    Path((guild_id, war_id)): Path<(i64, i64)>,
) -> ApiResult<Json<War>> {
    identity.require_member(guild_id)?;
    Ok(Json(wars::get_war(&state.db, guild_id, war_id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/guilds/:guild_id/wars", get(list_wars))
        .route("/guilds/:guild_id/wars/:war_id", get(get_war))
}
