//! Row types and enums shared across the data layer

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Roster membership tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Member,
    Trial,
    Ally,
    Kicked,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Member => "member",
            MemberStatus::Trial => "trial",
            MemberStatus::Ally => "ally",
            MemberStatus::Kicked => "kicked",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(MemberStatus::Member),
            "trial" => Ok(MemberStatus::Trial),
            "ally" => Ok(MemberStatus::Ally),
            "kicked" => Ok(MemberStatus::Kicked),
            other => Err(Error::InvalidInput(format!(
                "unknown member status '{}' (member, trial, ally, kicked)",
                other
            ))),
        }
    }
}

/// Bulk review session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Confirmed,
    Cancelled,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "confirmed" => Ok(SessionStatus::Confirmed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(Error::Internal(format!("unknown session status '{}'", other))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Open)
    }
}

/// Per-result review state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(Error::InvalidInput(format!(
                "invalid review status '{}' (pending, approved, rejected)",
                other
            ))),
        }
    }
}

/// One player as detected (or corrected) on a result screenshot.
/// Persisted as JSON inside `bulk_scan_results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedPlayer {
    pub name: String,
    pub score: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_name: Option<String>,
    #[serde(default)]
    pub is_roster_member: bool,
    #[serde(default = "default_races_played")]
    pub races_played: i64,
}

fn default_races_played() -> i64 {
    crate::scores::DEFAULT_RACE_COUNT
}

/// Guild configuration row.
#[derive(Debug, Clone, Serialize)]
pub struct GuildConfig {
    pub guild_id: i64,
    pub guild_name: String,
    pub ocr_channel_id: Option<i64>,
    pub team_names: Vec<String>,
    pub is_active: bool,
}

/// Roster player row with derived aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct Player {
    pub guild_id: i64,
    pub player_name: String,
    pub nicknames: Vec<String>,
    pub team: String,
    pub member_status: MemberStatus,
    pub is_active: bool,
    pub added_by: Option<String>,
    pub total_score: i64,
    pub total_races: i64,
    pub war_count: f64,
    pub average_score: f64,
    pub total_team_differential: i64,
    pub wins: i64,
    pub losses: i64,
    pub ties: i64,
    pub last_war_date: Option<String>,
}

/// One player's line inside a war.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarPlayer {
    pub player_name: String,
    pub score: i64,
    pub races_played: i64,
    pub war_participation: f64,
}

/// A completed war with its players.
#[derive(Debug, Clone, Serialize)]
pub struct War {
    pub war_id: i64,
    pub guild_id: i64,
    pub race_count: i64,
    pub team_score: i64,
    pub team_differential: i64,
    pub war_date: String,
    pub players: Vec<WarPlayer>,
}

/// Bulk review session metadata.
#[derive(Debug, Clone, Serialize)]
pub struct BulkSession {
    pub session_token: String,
    pub guild_id: i64,
    pub created_by_user_id: i64,
    pub status: SessionStatus,
    pub total_images: i64,
    pub created_at: String,
    pub expires_at: String,
}

/// One OCR output awaiting review.
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub result_id: i64,
    pub session_token: String,
    pub image_filename: Option<String>,
    pub image_url: Option<String>,
    pub detected_players: Vec<DetectedPlayer>,
    pub corrected_players: Option<Vec<DetectedPlayer>>,
    pub review_status: ReviewStatus,
    pub race_count: i64,
    pub message_timestamp: Option<String>,
}

impl BulkResult {
    /// The players that will materialize if this result is approved.
    pub fn effective_players(&self) -> &[DetectedPlayer] {
        self.corrected_players.as_deref().unwrap_or(&self.detected_players)
    }
}

/// One OCR failure awaiting manual entry or dismissal.
#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub failure_id: i64,
    pub session_token: String,
    pub image_filename: Option<String>,
    pub image_url: Option<String>,
    pub error_message: String,
    pub message_timestamp: Option<String>,
    pub chat_message_id: Option<i64>,
}

/// Guild-wide aggregate summary.
#[derive(Debug, Clone, Serialize)]
pub struct GuildOverview {
    pub player_count: i64,
    pub war_count: i64,
    pub wins: i64,
    pub losses: i64,
    pub ties: i64,
    pub total_score: i64,
    pub last_war_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_status_round_trips() {
        for s in ["member", "trial", "ally", "kicked"] {
            assert_eq!(MemberStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(MemberStatus::parse("ghost").is_err());
    }

    #[test]
    fn detected_player_json_defaults() {
        let p: DetectedPlayer = serde_json::from_str(r#"{"name":"Alpha","score":95}"#).unwrap();
        assert_eq!(p.races_played, 12);
        assert!(!p.is_roster_member);
        assert!(p.raw_name.is_none());
    }

    #[test]
    fn effective_players_prefers_corrections() {
        let detected = vec![DetectedPlayer {
            name: "A".into(),
            score: 1,
            raw_name: None,
            is_roster_member: true,
            races_played: 12,
        }];
        let corrected = vec![DetectedPlayer {
            name: "B".into(),
            score: 2,
            raw_name: None,
            is_roster_member: true,
            races_played: 12,
        }];
        let mut result = BulkResult {
            result_id: 1,
            session_token: "t".into(),
            image_filename: None,
            image_url: None,
            detected_players: detected,
            corrected_players: None,
            review_status: ReviewStatus::Pending,
            race_count: 12,
            message_timestamp: None,
        };
        assert_eq!(result.effective_players()[0].name, "A");
        result.corrected_players = Some(corrected);
        assert_eq!(result.effective_players()[0].name, "B");
    }
}
