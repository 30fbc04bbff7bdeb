//! Statistics commands

use super::roster::canonical_name;
use super::{CommandCall, HandlerFuture};
use crate::gateway::ChatGateway;
use crate::BotState;
use mkws_common::db::stats::{self, SortKey};

const LEADERBOARD_LIMIT: i64 = 10;

pub fn stats<'a>(
    state: &'a BotState,
    _gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let last_x = call.opt_int("lastxwars")?;

        // A named player gets their card; otherwise the leaderboard.
        if let Some(raw) = call.opt("player") {
            let name = canonical_name(state, call.guild_id, raw).await?;
            let card = stats::player_stats(&state.pool, call.guild_id, &name, last_x).await?;
            let scope = match last_x {
                Some(n) => format!(" (last {} wars)", n),
                None => String::new(),
            };
            return Ok(format!(
                "{}{}\n  avg {:.2} over {:.2} wars | {} points, {} races\n  record {}-{}-{} ({:.1}% wins) | differential {:+}\n  best {} / worst {} | last war {}",
                card.entry.player_name,
                scope,
                card.entry.average_score,
                card.entry.war_count,
                card.entry.total_score,
                card.entry.total_races,
                card.entry.wins,
                card.entry.losses,
                card.entry.ties,
                card.win_percentage,
                card.entry.total_team_differential,
                card.highest_score,
                card.lowest_score,
                card.entry.last_war_date.as_deref().unwrap_or("never"),
            ));
        }

        let sort = match call.opt("sortby") {
            Some(raw) => SortKey::parse(raw)?,
            None => SortKey::default(),
        };
        let rows =
            stats::leaderboard(&state.pool, call.guild_id, sort, LEADERBOARD_LIMIT, last_x).await?;
        if rows.is_empty() {
            return Ok("No statistics yet - record a war first.".to_string());
        }

        let mut lines = vec![match last_x {
            Some(n) => format!("Leaderboard (last {} wars):", n),
            None => "Leaderboard:".to_string(),
        }];
        for (i, row) in rows.iter().enumerate() {
            lines.push(format!(
                "  {}. {} - avg {:.2}, {:.2} wars, {:+} diff",
                i + 1,
                row.player_name,
                row.average_score,
                row.war_count,
                row.total_team_differential,
            ));
        }
        Ok(lines.join("\n"))
    })
}
