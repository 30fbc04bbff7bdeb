//! Guild setup and channel commands

use super::{CommandCall, HandlerFuture};
use crate::gateway::ChatGateway;
use crate::BotState;
use mkws_common::db::models::MemberStatus;
use mkws_common::db::{guilds, players};

pub fn setup<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let team_name = call.arg("teamname")?.trim().to_string();
        let channel = call.int("results_channel")?;
        let roster: Vec<String> = call
            .arg("players")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        guilds::upsert_guild(&state.pool, call.guild_id, &team_name, Some(channel)).await?;
        if guilds::team_names(&state.pool, call.guild_id).await?.is_empty() {
            guilds::add_team(&state.pool, call.guild_id, &team_name).await?;
        }

        let mut added = 0;
        let mut skipped = Vec::new();
        for name in &roster {
            match players::add_player(&state.pool, call.guild_id, name, MemberStatus::Member, None)
                .await
            {
                Ok(()) => added += 1,
                Err(mkws_common::Error::Duplicate(_)) => skipped.push(name.clone()),
                Err(e) => return Err(e),
            }
        }
        state.invalidate_roster(call.guild_id).await;

        let mut reply = format!(
            "Guild '{}' is set up: {} players added, results channel <#{}>.",
            team_name, added, channel
        );
        if !skipped.is_empty() {
            reply.push_str(&format!(" Already present: {}.", skipped.join(", ")));
        }
        Ok(reply)
    })
}

pub fn setchannel<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let channel = call.int("channel")?;
        guilds::set_ocr_channel(&state.pool, call.guild_id, channel).await?;
        Ok(format!("Screenshots posted in <#{}> will now be scanned.", channel))
    })
}

pub fn checkpermissions<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let channel = call.int("channel")?;
        let guild = guilds::require_guild(&state.pool, call.guild_id).await?;
        let watched = guild.ocr_channel_id == Some(channel);
        Ok(format!(
            "Guild '{}': OCR channel is {} - <#{}> is {}watched. The bot needs read, send, \
             and attachment access there.",
            guild.guild_name,
            guild
                .ocr_channel_id
                .map(|c| format!("<#{}>", c))
                .unwrap_or_else(|| "not configured".to_string()),
            channel,
            if watched { "" } else { "NOT " },
        ))
    })
}
