use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{Bid, LeaderboardEntry, RoundNumber, RoundOutcome, RoundStatus, TeamRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Freshness {
    Live,
    #[default]
    Stale, // Disconnected, or waiting for a post-reconnect snapshot
}

/// The reconciled state every consumer renders.
///
/// Owned by the round state machine; everything else works on copies.
/// `bids` is kept in arrival order with at most one entry per team.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoundView {
    pub round_number: RoundNumber,
    pub status: RoundStatus,
    pub title: String,
    pub category: String,
    pub time_left_seconds: u32,
    pub duration_seconds: u32,
    pub bids: Vec<Bid>,
    pub winner_so_far: Option<String>,
    pub last_result: Option<RoundOutcome>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub own_team: Option<TeamRecord>,
    pub teams_online: Option<u32>,
    pub sequence: Option<u64>,
    pub freshness: Freshness,
}

impl RoundView {
    /// Highest bid of the round; ties go to the earliest arrival.
    pub fn highest_bid(&self) -> Option<&Bid> {
        self.bids.iter().fold(None, |best: Option<&Bid>, bid| match best {
            Some(current) if current.amount >= bid.amount => Some(current),
            _ => Some(bid),
        })
    }

    pub fn bid_of(&self, team_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|bid| bid.team_id == team_id)
    }

    pub fn has_bid(&self, team_id: &str) -> bool {
        self.bid_of(team_id).is_some()
    }

    pub fn is_live(&self) -> bool {
        self.freshness == Freshness::Live
    }

    /// Drops everything that belongs to the current round while keeping the
    /// round number as a high-water mark.
    pub fn clear_round(&mut self) {
        self.status = RoundStatus::Idle;
        self.title.clear();
        self.category.clear();
        self.time_left_seconds = 0;
        self.duration_seconds = 0;
        self.bids.clear();
        self.winner_so_far = None;
    }
}
