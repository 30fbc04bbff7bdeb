//! Token-level parsing of OCR output into detected players
//!
//! Screenshot text arrives as loose boxes; the parser flattens them to
//! a token stream, marks plausible score tokens, resolves name tokens
//! against the roster (trying two-token combinations first, since many
//! in-game names contain a space), and pairs each resolved name with
//! the nearest following score. Tokens that resolve to nobody are
//! opponents and are dropped.

use crate::ocr::backend::TextBox;
use mkws_common::db::models::DetectedPlayer;
use mkws_common::resolver::RosterSnapshot;
use tracing::debug;

/// Scores on a result screen are small integers; anything outside this
/// range is a timestamp, a placement, or noise.
const SCORE_MIN: i64 = 1;
const SCORE_MAX: i64 = 180;

/// Tokens shorter than this are too risky for substring rescue.
const SUBSTRING_RESCUE_MIN_LEN: usize = 5;

fn score_value(token: &str) -> Option<i64> {
    let value: i64 = token.parse().ok()?;
    (SCORE_MIN..=SCORE_MAX).contains(&value).then_some(value)
}

/// Parse OCR text boxes into roster players with scores.
pub fn detect_players(
    boxes: &[TextBox],
    roster: &RosterSnapshot,
    races_played: i64,
) -> Vec<DetectedPlayer> {
    let combined = boxes.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join(" ");
    let tokens: Vec<&str> = combined.split_whitespace().collect();

    let score_positions: Vec<(usize, i64)> = tokens
        .iter()
        .enumerate()
        .filter_map(|(i, t)| score_value(t).map(|v| (i, v)))
        .collect();

    // (token index, canonical name, raw text that matched)
    let mut names: Vec<(usize, String, String)> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if score_value(tokens[i]).is_some() {
            i += 1;
            continue;
        }

        // Two-token names first ("No name", "kyle christian").
        if i + 1 < tokens.len() {
            let pair = format!("{} {}", tokens[i], tokens[i + 1]);
            let resolved = roster.resolve(&pair);
            if resolved.is_roster_member {
                debug!(raw = %pair, name = %resolved.name, "matched two-token name");
                names.push((i, resolved.name, pair));
                i += 2;
                continue;
            }
        }

        let resolved = roster.resolve(tokens[i]);
        if resolved.is_roster_member {
            names.push((i, resolved.name, tokens[i].to_string()));
        } else if tokens[i].chars().count() >= SUBSTRING_RESCUE_MIN_LEN {
            // Corrupted tokens sometimes swallow a name whole
            // ("xXWillowXx🏁"); rescue the longest embedded roster name.
            if let Some(embedded) = roster.find_embedded_name(tokens[i]) {
                debug!(raw = %tokens[i], name = %embedded, "rescued embedded name");
                names.push((i, embedded.to_string(), tokens[i].to_string()));
            }
        }
        i += 1;
    }

    // Pair each name with the nearest unconsumed score at or after it,
    // falling back to the nearest one before it.
    let mut used_scores = vec![false; score_positions.len()];
    let mut players: Vec<DetectedPlayer> = Vec::new();

    for (position, canonical, raw) in names {
        if players.iter().any(|p| p.name == canonical) {
            continue;
        }

        let mut chosen: Option<usize> = None;
        let mut best_distance = usize::MAX;
        for (slot, &(score_pos, _)) in score_positions.iter().enumerate() {
            if !used_scores[slot] && score_pos > position && score_pos - position < best_distance {
                best_distance = score_pos - position;
                chosen = Some(slot);
            }
        }
        if chosen.is_none() {
            for (slot, &(score_pos, _)) in score_positions.iter().enumerate() {
                if !used_scores[slot]
                    && score_pos < position
                    && position - score_pos < best_distance
                {
                    best_distance = position - score_pos;
                    chosen = Some(slot);
                }
            }
        }

        if let Some(slot) = chosen {
            used_scores[slot] = true;
            players.push(DetectedPlayer {
                raw_name: (raw != canonical).then_some(raw),
                name: canonical,
                score: score_positions[slot].1,
                is_roster_member: true,
                races_played,
            });
        }
    }

    players
}
