//! Roster commands

use super::{CommandCall, HandlerFuture};
use crate::gateway::ChatGateway;
use crate::BotState;
use mkws_common::db::models::{MemberStatus, Player};
use mkws_common::db::players;
use mkws_common::Result;

/// Commands accept nicknames anywhere a player name is expected.
pub(super) async fn canonical_name(
    state: &BotState,
    guild_id: i64,
    raw: &str,
) -> Result<String> {
    let roster = state.roster(guild_id).await?;
    let resolved = roster.resolve(raw);
    if resolved.is_roster_member {
        Ok(resolved.name)
    } else {
        // Fall back to the raw name for inactive players the snapshot
        // does not carry; the storage layer reports not-found itself.
        Ok(raw.trim().to_string())
    }
}

fn format_roster_line(p: &Player) -> String {
    let nicknames = if p.nicknames.is_empty() {
        String::new()
    } else {
        format!(" (aka {})", p.nicknames.join(", "))
    };
    format!(
        "  {}{} - {} | {} | avg {:.2} over {:.2} wars",
        p.player_name,
        nicknames,
        p.member_status.as_str(),
        p.team,
        p.average_score,
        p.war_count
    )
}

pub fn addplayer<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = call.arg("name")?.trim().to_string();
        let status = match call.opt("member_status") {
            Some(raw) => MemberStatus::parse(raw)?,
            None => MemberStatus::Member,
        };
        players::add_player(&state.pool, call.guild_id, &name, status, None).await?;
        state.invalidate_roster(call.guild_id).await;
        Ok(format!("{} joined the roster as {}.", name, status.as_str()))
    })
}

pub fn removeplayer<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = canonical_name(state, call.guild_id, call.arg("name")?).await?;
        players::remove_player(&state.pool, call.guild_id, &name).await?;
        state.invalidate_roster(call.guild_id).await;
        Ok(format!("{} removed from the active roster (war history kept).", name))
    })
}

pub fn setmemberstatus<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = canonical_name(state, call.guild_id, call.arg("name")?).await?;
        let status = MemberStatus::parse(call.arg("status")?)?;
        players::set_member_status(&state.pool, call.guild_id, &name, status).await?;
        state.invalidate_roster(call.guild_id).await;
        Ok(format!("{} is now {}.", name, status.as_str()))
    })
}

pub fn roster<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let members = players::list_players(&state.pool, call.guild_id, false).await?;
        if members.is_empty() {
            return Ok("The roster is empty - add players with /addplayer or /setup.".to_string());
        }
        let mut lines = vec![format!("Roster ({} players):", members.len())];
        lines.extend(members.iter().map(format_roster_line));
        Ok(lines.join("\n"))
    })
}

async fn list_by_status(state: &BotState, guild_id: i64, status: MemberStatus) -> Result<String> {
    let members = players::list_players_by_status(&state.pool, guild_id, status).await?;
    if members.is_empty() {
        return Ok(format!("No {} players.", status.as_str()));
    }
    let mut lines = vec![format!("{} players ({}):", status.as_str(), members.len())];
    lines.extend(members.iter().map(format_roster_line));
    Ok(lines.join("\n"))
}

pub fn showtrials<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move { list_by_status(state, call.guild_id, MemberStatus::Trial).await })
}

pub fn showkicked<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move { list_by_status(state, call.guild_id, MemberStatus::Kicked).await })
}
