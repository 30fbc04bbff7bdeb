//! Team commands

use super::roster::canonical_name;
use super::{CommandCall, HandlerFuture};
use crate::gateway::ChatGateway;
use crate::BotState;
use mkws_common::db::{guilds, players};

pub fn addteam<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let team = call.arg("name")?.trim().to_string();
        guilds::add_team(&state.pool, call.guild_id, &team).await?;
        Ok(format!("Team '{}' created.", team))
    })
}

pub fn removeteam<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let team = call.arg("name")?.trim().to_string();
        guilds::remove_team(&state.pool, call.guild_id, &team).await?;
        Ok(format!("Team '{}' removed; its players are Unassigned.", team))
    })
}

pub fn renameteam<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let old = call.arg("old")?.trim().to_string();
        let new = call.arg("new")?.trim().to_string();
        guilds::rename_team(&state.pool, call.guild_id, &old, &new).await?;
        Ok(format!("Team '{}' is now '{}'.", old, new))
    })
}

pub fn assignplayers<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let team = call.arg("team")?.trim().to_string();
        let mut names = Vec::new();
        for raw in call.arg("players")?.split(',') {
            let raw = raw.trim();
            if !raw.is_empty() {
                names.push(canonical_name(state, call.guild_id, raw).await?);
            }
        }

        players::assign_team(&state.pool, call.guild_id, &names, &team).await?;
        Ok(format!("Assigned {} to '{}'.", names.join(", "), team))
    })
}

pub fn unassignplayerfromteam<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = canonical_name(state, call.guild_id, call.arg("name")?).await?;
        players::unassign_team(&state.pool, call.guild_id, &name).await?;
        Ok(format!("{} is now Unassigned.", name))
    })
}

pub fn showallteams<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let teams = guilds::team_names(&state.pool, call.guild_id).await?;
        if teams.is_empty() {
            return Ok("No teams yet - create one with /addteam.".to_string());
        }

        let mut lines = vec!["Teams:".to_string()];
        for team in &teams {
            let members = players::list_players_by_team(&state.pool, call.guild_id, team).await?;
            lines.push(format!("  {} - {} players", team, members.len()));
        }
        let unassigned =
            players::list_players_by_team(&state.pool, call.guild_id, "Unassigned").await?;
        if !unassigned.is_empty() {
            lines.push(format!("  Unassigned - {} players", unassigned.len()));
        }
        Ok(lines.join("\n"))
    })
}

pub fn showspecificteamroster<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let team = call.arg("team")?.trim().to_string();
        let members = players::list_players_by_team(&state.pool, call.guild_id, &team).await?;
        if members.is_empty() {
            return Ok(format!("No players on '{}'.", team));
        }
        let mut lines = vec![format!("{} ({} players):", team, members.len())];
        lines.extend(members.iter().map(|p| {
            format!("  {} - avg {:.2} over {:.2} wars", p.player_name, p.average_score, p.war_count)
        }));
        Ok(lines.join("\n"))
    })
}
