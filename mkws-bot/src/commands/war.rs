//! War commands: manual entry, append, removal, listing

use super::{CommandCall, HandlerFuture};
use crate::gateway::ChatGateway;
use crate::BotState;
use chrono::Utc;
use mkws_common::db::wars::{self, NewWarPlayer};
use mkws_common::scores::{parse_score_line, DEFAULT_RACE_COUNT};
use mkws_common::{Error, Result};

/// Resolve a score line against the roster. Every name must land on a
/// roster member; manual entries play the full war.
async fn resolve_entries(
    state: &BotState,
    guild_id: i64,
    score_line: &str,
    race_count: i64,
) -> Result<Vec<NewWarPlayer>> {
    let parsed = parse_score_line(score_line)?;
    let roster = state.roster(guild_id).await?;

    let mut entries = Vec::with_capacity(parsed.len());
    let mut unknown = Vec::new();
    for item in parsed {
        let resolved = roster.resolve(&item.name);
        if resolved.is_roster_member {
            entries.push(NewWarPlayer {
                name: resolved.name,
                score: item.score,
                races_played: race_count,
            });
        } else {
            unknown.push(item.name);
        }
    }

    if !unknown.is_empty() {
        return Err(Error::InvalidInput(format!(
            "not on the roster: {} (add them with /addplayer first)",
            unknown.join(", ")
        )));
    }
    Ok(entries)
}

fn verdict(differential: i64) -> &'static str {
    match differential.cmp(&0) {
        std::cmp::Ordering::Greater => "win",
        std::cmp::Ordering::Less => "loss",
        std::cmp::Ordering::Equal => "tie",
    }
}

pub fn addwar<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let race_count = call.opt_int("races")?.unwrap_or(DEFAULT_RACE_COUNT);
        let entries =
            resolve_entries(state, call.guild_id, call.arg("player_scores")?, race_count).await?;

        let duplicate = wars::is_duplicate_of_last(&state.pool, call.guild_id, &entries).await?;
        let submission = wars::submit_war(
            &state.pool,
            call.guild_id,
            &entries,
            race_count,
            &Utc::now().to_rfc3339(),
            false,
        )
        .await?;

        let mut reply = format!(
            "War #{} saved: {} players, {} points over {} races, differential {:+} ({}).",
            submission.war_id,
            entries.len(),
            submission.team_score,
            race_count,
            submission.team_differential,
            verdict(submission.team_differential),
        );
        if duplicate {
            reply.push_str("\nNote: this matches the previous war - remove one with /removewar if it was submitted twice.");
        }
        Ok(reply)
    })
}

pub fn appendplayertowar<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let war_id = call.int("war_id")?;
        let war = wars::get_war(&state.pool, call.guild_id, war_id).await?;
        let entries =
            resolve_entries(state, call.guild_id, call.arg("player_scores")?, war.race_count)
                .await?;

        let updated = wars::append_players(&state.pool, call.guild_id, war_id, &entries).await?;
        Ok(format!(
            "War #{} now has {} players, {} points, differential {:+} ({}).",
            war_id,
            war.players.len() + entries.len(),
            updated.team_score,
            updated.team_differential,
            verdict(updated.team_differential),
        ))
    })
}

pub fn removewar<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let war_id = call.int("war_id")?;
        let removed = wars::remove_war(&state.pool, call.guild_id, war_id).await?;
        let names: Vec<&str> = removed.players.iter().map(|p| p.player_name.as_str()).collect();
        Ok(format!(
            "War #{} removed; statistics reverted for {}.",
            war_id,
            names.join(", ")
        ))
    })
}

pub fn showallwars<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let limit = call.opt_int("limit")?.unwrap_or(10);
        let (wars, total) = wars::list_wars(&state.pool, call.guild_id, 1, limit).await?;
        if wars.is_empty() {
            return Ok("No wars recorded yet.".to_string());
        }

        let mut lines = vec![format!("Most recent wars ({} total):", total)];
        for war in &wars {
            let players: Vec<String> = war
                .players
                .iter()
                .map(|p| format!("{}:{}", p.player_name, p.score))
                .collect();
            lines.push(format!(
                "#{} [{}] {} - {} points, {:+} ({})",
                war.war_id,
                &war.war_date[..war.war_date.len().min(10)],
                players.join(","),
                war.team_score,
                war.team_differential,
                verdict(war.team_differential),
            ));
        }
        Ok(lines.join("\n"))
    })
}
