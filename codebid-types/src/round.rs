use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{RoundNumber, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum RoundStatus {
    #[default]
    Idle, // No round in progress
    Bidding,   // Bids are being accepted
    Reviewing, // Bidding closed, operator judging
    Completed, // Result announced
}

impl RoundStatus {
    /// The only status a round may move to from `self`.
    pub fn successor(self) -> RoundStatus {
        match self {
            RoundStatus::Idle => RoundStatus::Bidding,
            RoundStatus::Bidding => RoundStatus::Reviewing,
            RoundStatus::Reviewing => RoundStatus::Completed,
            RoundStatus::Completed => RoundStatus::Idle,
        }
    }

    pub fn can_advance_to(self, next: RoundStatus) -> bool {
        self.successor() == next
    }

    pub fn accepts_ticks(self) -> bool {
        matches!(self, RoundStatus::Bidding | RoundStatus::Reviewing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Bid {
    pub team_id: TeamId,
    #[serde(default)]
    pub team_name: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Verdict {
    Correct,
    Wrong,
}

/// What the operator decided for the last completed round.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoundOutcome {
    pub verdict: Option<Verdict>,
    pub team_name: Option<String>,
    pub winner_name: Option<String>,
    pub coins_change: Option<i64>,
}

/// One entry of `GET /game/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoundRecord {
    pub round_number: RoundNumber,
    pub title: String,
    #[serde(default)]
    pub category: String,
    pub status: RoundStatus,
    #[serde(default)]
    pub winning_team: Option<String>,
    #[serde(default)]
    pub winning_bid: Option<u64>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
}
