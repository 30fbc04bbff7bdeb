//! Score-line grammar and war arithmetic
//!
//! The `Name:Score[,Name:Score]*` grammar is shared by the `addwar` /
//! `appendplayertowar` chat commands and by manual entry during bulk
//! review. Whitespace around commas is insignificant; colons are
//! required; scores are integers in 0..=999.

use crate::{Error, Result};

/// Breakeven points per race per player. A war is won when the team
/// scores above `41 * race_count * player_count` in total.
pub const BREAKEVEN_PER_RACE: i64 = 41;

/// Default number of races in a war.
pub const DEFAULT_RACE_COUNT: i64 = 12;

/// Inclusive bounds on a war's race count.
pub const MIN_RACE_COUNT: i64 = 1;
pub const MAX_RACE_COUNT: i64 = 24;

/// One `Name:Score` pair from the command grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub name: String,
    pub score: i64,
}

/// Parse a `Name:Score[,Name:Score]*` line.
pub fn parse_score_line(input: &str) -> Result<Vec<ScoreEntry>> {
    let mut entries = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Error::InvalidInput(
                "empty entry in score list (stray comma?)".to_string(),
            ));
        }

        // Split on the LAST colon so names containing colons still parse.
        let (name, score_text) = part.rsplit_once(':').ok_or_else(|| {
            Error::InvalidInput(format!("'{}' is missing ':' between name and score", part))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(format!("'{}' has an empty name", part)));
        }

        let score: i64 = score_text.trim().parse().map_err(|_| {
            Error::InvalidInput(format!("'{}' is not an integer score", score_text.trim()))
        })?;
        if !(0..=999).contains(&score) {
            return Err(Error::InvalidInput(format!(
                "score {} out of range 0..=999",
                score
            )));
        }

        entries.push(ScoreEntry {
            name: name.to_string(),
            score,
        });
    }

    if entries.is_empty() {
        return Err(Error::InvalidInput("no player scores given".to_string()));
    }

    Ok(entries)
}

/// Render entries back into canonical `Name:Score,Name:Score` form.
pub fn render_score_line(entries: &[ScoreEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}:{}", e.name, e.score))
        .collect::<Vec<_>>()
        .join(",")
}

/// Validate a race count against the allowed range.
pub fn validate_race_count(race_count: i64) -> Result<()> {
    if (MIN_RACE_COUNT..=MAX_RACE_COUNT).contains(&race_count) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "race count {} out of range {}..={}",
            race_count, MIN_RACE_COUNT, MAX_RACE_COUNT
        )))
    }
}

/// Team differential: total score minus the breakeven line for this
/// race count and roster size. Positive is a win, negative a loss,
/// zero a tie.
pub fn team_differential(team_score: i64, race_count: i64, player_count: i64) -> i64 {
    team_score - BREAKEVEN_PER_RACE * race_count * player_count
}

/// Fractional war participation for a player, rounded to two decimals.
pub fn war_participation(races_played: i64, race_count: i64) -> f64 {
    if race_count <= 0 {
        return 1.0;
    }
    round2(races_played as f64 / race_count as f64)
}

/// Round to two fractional digits, the storage precision of
/// `war_count` and `average_score`.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_line() {
        let entries = parse_score_line("Alpha:95,Beta:80,Gamma:70").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ScoreEntry { name: "Alpha".into(), score: 95 });
        assert_eq!(entries[2].score, 70);
    }

    #[test]
    fn whitespace_around_commas_is_ignored() {
        let entries = parse_score_line("Alpha: 95 ,  Beta :80").unwrap();
        assert_eq!(entries[0].name, "Alpha");
        assert_eq!(entries[0].score, 95);
        assert_eq!(entries[1].name, "Beta");
    }

    #[test]
    fn names_may_contain_spaces() {
        let entries = parse_score_line("No name:88").unwrap();
        assert_eq!(entries[0].name, "No name");
    }

    #[test]
    fn parse_then_render_is_identity_modulo_whitespace() {
        let raw = " Alpha : 95 , Beta:80 ";
        let rendered = render_score_line(&parse_score_line(raw).unwrap());
        assert_eq!(rendered, "Alpha:95,Beta:80");
        // Rendering the canonical form round-trips exactly.
        assert_eq!(render_score_line(&parse_score_line(&rendered).unwrap()), rendered);
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(parse_score_line("Alpha 95").is_err());
    }

    #[test]
    fn rejects_out_of_range_scores() {
        assert!(parse_score_line("Alpha:1000").is_err());
        assert!(parse_score_line("Alpha:-1").is_err());
        assert!(parse_score_line("Alpha:999").is_ok());
        assert!(parse_score_line("Alpha:0").is_ok());
    }

    #[test]
    fn race_count_bounds() {
        assert!(validate_race_count(1).is_ok());
        assert!(validate_race_count(24).is_ok());
        assert!(validate_race_count(0).is_err());
        assert!(validate_race_count(25).is_err());
    }

    #[test]
    fn differential_matches_breakeven_line() {
        // 3 players, 12 races: breakeven at 41 * 12 * 3 = 1476
        assert_eq!(team_differential(245, 12, 3), 245 - 1476);
        assert_eq!(team_differential(1476, 12, 3), 0);
        assert_eq!(team_differential(1500, 12, 3), 24);
    }

    #[test]
    fn participation_rounds_to_two_decimals() {
        assert_eq!(war_participation(12, 12), 1.0);
        assert_eq!(war_participation(6, 12), 0.5);
        assert_eq!(war_participation(4, 12), 0.33);
        assert_eq!(war_participation(8, 12), 0.67);
    }
}
