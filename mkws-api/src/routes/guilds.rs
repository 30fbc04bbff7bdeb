//! Guild listing

use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use mkws_common::db::guilds;
use serde::Serialize;

#[derive(Serialize)]
struct GuildSummary {
    guild_id: i64,
    guild_name: String,
    is_admin: bool,
    can_manage: bool,
    /// Whether `/setup` has run for this guild.
    is_configured: bool,
}

/// GET /guilds - the caller's guilds, flagged with whether the bot is
/// set up in each.
async fn list_guilds(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> ApiResult<Json<Vec<GuildSummary>>> {
    let ids: Vec<i64> = ctx.guilds.keys().copied().collect();
    let configured = guilds::get_guilds_by_ids(&state.db, &ids).await?;

    let mut summaries: Vec<GuildSummary> = ctx
        .guilds
        .into_iter()
        .map(|(guild_id, m)| {
            let config = configured.iter().find(|g| g.guild_id == guild_id);
            GuildSummary {
                guild_id,
                guild_name: config.map(|g| g.guild_name.clone()).unwrap_or(m.guild_name),
                is_admin: m.is_admin,
                can_manage: m.can_manage,
                is_configured: config.is_some(),
            }
        })
        .collect();
    summaries.sort_by_key(|g| g.guild_id);

    Ok(Json(summaries))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/guilds", get(list_guilds))
}
