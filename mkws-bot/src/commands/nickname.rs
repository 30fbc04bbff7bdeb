//! Nickname commands

use super::roster::canonical_name;
use super::{CommandCall, HandlerFuture};
use crate::gateway::ChatGateway;
use crate::BotState;
use mkws_common::db::players;

pub fn addnickname<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = canonical_name(state, call.guild_id, call.arg("name")?).await?;
        let nickname = call.arg("nickname")?.trim().to_string();
        players::add_nickname(&state.pool, call.guild_id, &name, &nickname).await?;
        state.invalidate_roster(call.guild_id).await;
        Ok(format!("'{}' now resolves to {}.", nickname, name))
    })
}

pub fn removenickname<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = canonical_name(state, call.guild_id, call.arg("name")?).await?;
        let nickname = call.arg("nickname")?.trim().to_string();
        players::remove_nickname(&state.pool, call.guild_id, &name, &nickname).await?;
        state.invalidate_roster(call.guild_id).await;
        Ok(format!("Removed nickname '{}' from {}.", nickname, name))
    })
}

pub fn nicknamesfor<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = canonical_name(state, call.guild_id, call.arg("name")?).await?;
        let player = players::require_player(&state.pool, call.guild_id, &name).await?;
        if player.nicknames.is_empty() {
            Ok(format!("{} has no nicknames.", name))
        } else {
            Ok(format!("{} resolves from: {}", name, player.nicknames.join(", ")))
        }
    })
}
