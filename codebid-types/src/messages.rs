use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{Bid, LeaderboardEntry, RoundNumber, RoundRecord, RoundStatus, TeamId, TeamRecord, Verdict};

fn default_duration() -> u32 {
    30
}

// ── Push channel payloads ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoundStartedPayload {
    pub round_number: RoundNumber,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_duration", alias = "duration")]
    pub duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TimerUpdatePayload {
    pub time_left: i64, // May arrive negative; clamped by the reducer
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BidReceivedPayload {
    pub team_id: TeamId,
    #[serde(default)]
    pub team_name: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_number: Option<RoundNumber>,
}

impl BidReceivedPayload {
    pub fn bid(&self) -> Bid {
        Bid {
            team_id: self.team_id.clone(),
            team_name: self.team_name.clone(),
            amount: self.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BiddingEndedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_so_far: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoundCompletedPayload {
    #[serde(default)]
    pub result: Option<Verdict>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub winner_name: Option<String>,
    #[serde(default)]
    pub coins_change: Option<i64>,
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_number: Option<RoundNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TeamsOnlinePayload {
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoundStatusPayload {
    pub status: RoundStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ForceLogoutPayload {
    #[serde(default, alias = "message")]
    pub reason: String,
}

/// Every event kind the coordinator pushes over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    RoundStarted(RoundStartedPayload),
    TimerUpdate(TimerUpdatePayload),
    BidReceived(BidReceivedPayload),
    BiddingEnded(BiddingEndedPayload),
    RoundCompleted(RoundCompletedPayload),
    RoundForceReset,
    GameReset,
    TeamsOnline(TeamsOnlinePayload),
    RoundStatus(RoundStatusPayload),
    ForceLogout(ForceLogoutPayload),
}

impl ServerEvent {
    pub const ROUND_STARTED: &'static str = "round:started";
    pub const TIMER_UPDATE: &'static str = "timer:update";
    pub const BID_RECEIVED: &'static str = "bid:received";
    pub const BIDDING_ENDED: &'static str = "bidding:ended";
    pub const ROUND_COMPLETED: &'static str = "round:completed";
    pub const ROUND_FORCE_RESET: &'static str = "round:force-reset";
    pub const GAME_RESET: &'static str = "game:reset";
    pub const TEAMS_ONLINE: &'static str = "teams:online";
    pub const ROUND_STATUS: &'static str = "round:status";
    pub const FORCE_LOGOUT: &'static str = "force:logout";

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RoundStarted(_) => Self::ROUND_STARTED,
            ServerEvent::TimerUpdate(_) => Self::TIMER_UPDATE,
            ServerEvent::BidReceived(_) => Self::BID_RECEIVED,
            ServerEvent::BiddingEnded(_) => Self::BIDDING_ENDED,
            ServerEvent::RoundCompleted(_) => Self::ROUND_COMPLETED,
            ServerEvent::RoundForceReset => Self::ROUND_FORCE_RESET,
            ServerEvent::GameReset => Self::GAME_RESET,
            ServerEvent::TeamsOnline(_) => Self::TEAMS_ONLINE,
            ServerEvent::RoundStatus(_) => Self::ROUND_STATUS,
            ServerEvent::ForceLogout(_) => Self::FORCE_LOGOUT,
        }
    }

    /// Round number the event explicitly refers to, if the payload names one.
    pub fn round_number(&self) -> Option<RoundNumber> {
        match self {
            ServerEvent::RoundStarted(data) => Some(data.round_number),
            ServerEvent::BidReceived(data) => data.round_number,
            ServerEvent::RoundCompleted(data) => data.round_number,
            _ => None,
        }
    }

    pub fn into_frame(self, seq: Option<u64>) -> Result<EventFrame, serde_json::Error> {
        let event = self.name().to_string();
        let data = match self {
            ServerEvent::RoundStarted(data) => serde_json::to_value(data)?,
            ServerEvent::TimerUpdate(data) => serde_json::to_value(data)?,
            ServerEvent::BidReceived(data) => serde_json::to_value(data)?,
            ServerEvent::BiddingEnded(data) => serde_json::to_value(data)?,
            ServerEvent::RoundCompleted(data) => serde_json::to_value(data)?,
            ServerEvent::RoundForceReset | ServerEvent::GameReset => serde_json::Value::Null,
            ServerEvent::TeamsOnline(data) => serde_json::to_value(data)?,
            ServerEvent::RoundStatus(data) => serde_json::to_value(data)?,
            ServerEvent::ForceLogout(data) => serde_json::to_value(data)?,
        };
        Ok(EventFrame { event, data, seq })
    }
}

/// Raw text frame as it travels over the push channel:
/// `{"event": "round:started", "data": {...}, "seq": 12}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

// ── Snapshot pull ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoundSnapshotPayload {
    pub round_number: RoundNumber,
    pub title: String,
    #[serde(default)]
    pub category: String,
    pub status: RoundStatus,
    #[serde(default)]
    pub time_left: Option<i64>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    pub bids: Vec<Bid>,
    #[serde(default)]
    pub winner_so_far: Option<String>,
}

/// Body of `GET /game/state`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SnapshotPayload {
    #[serde(default)]
    pub round: Option<RoundSnapshotPayload>,
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub team: Option<TeamRecord>,
    #[serde(default)]
    pub sequence: Option<u64>,
}

// ── Action endpoints ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StartRoundRequest {
    pub title: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlaceBidRequest {
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MarkResultRequest {
    pub result: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AcceptedBid {
    pub team_id: TeamId,
    #[serde(default)]
    pub team_name: String,
    pub amount: u64,
    #[serde(default)]
    pub round_number: Option<RoundNumber>,
}

impl AcceptedBid {
    pub fn bid(&self) -> Bid {
        Bid {
            team_id: self.team_id.clone(),
            team_name: self.team_name.clone(),
            amount: self.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlaceBidResponse {
    pub bid: AcceptedBid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HistoryResponse {
    #[serde(default)]
    pub rounds: Vec<RoundRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LeaderboardResponse {
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
}
