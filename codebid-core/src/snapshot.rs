use std::collections::HashSet;

use codebid_types::{SnapshotPayload, TeamId};
use thiserror::Error;

use crate::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotDefect {
    #[error("round number must be at least 1")]
    ZeroRoundNumber,
    #[error("round has no title")]
    MissingTitle,
    #[error("team {0} bid more than once")]
    DuplicateBid(TeamId),
    #[error("team {0} listed more than once on the leaderboard")]
    DuplicateLeaderboardTeam(TeamId),
}

/// Structural validation of `GET /game/state`. Serde has already checked the
/// shape; this checks the invariants serde cannot express.
pub fn validate_snapshot(payload: SnapshotPayload) -> Result<Snapshot, SnapshotDefect> {
    if let Some(round) = &payload.round {
        if round.round_number == 0 {
            return Err(SnapshotDefect::ZeroRoundNumber);
        }
        if round.title.trim().is_empty() {
            return Err(SnapshotDefect::MissingTitle);
        }
        let mut bidders = HashSet::new();
        for bid in &round.bids {
            if !bidders.insert(bid.team_id.as_str()) {
                return Err(SnapshotDefect::DuplicateBid(bid.team_id.clone()));
            }
        }
    }

    let mut listed = HashSet::new();
    for entry in &payload.leaderboard {
        if !listed.insert(entry.team_id.as_str()) {
            return Err(SnapshotDefect::DuplicateLeaderboardTeam(entry.team_id.clone()));
        }
    }

    Ok(Snapshot {
        round: payload.round,
        leaderboard: payload.leaderboard,
        own_team: payload.team,
        sequence: payload.sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebid_types::{Bid, LeaderboardEntry, RoundSnapshotPayload, RoundStatus};

    fn round(number: u64, bids: Vec<Bid>) -> RoundSnapshotPayload {
        RoundSnapshotPayload {
            round_number: number,
            title: "Valid Parentheses".to_string(),
            category: "Easy".to_string(),
            status: RoundStatus::Bidding,
            time_left: Some(12),
            duration_seconds: Some(30),
            bids,
            winner_so_far: None,
        }
    }

    fn bid(team: &str) -> Bid {
        Bid {
            team_id: team.to_string(),
            team_name: team.to_string(),
            amount: 10,
        }
    }

    #[test]
    fn test_valid_snapshot_passes() {
        let payload = SnapshotPayload {
            round: Some(round(2, vec![bid("a"), bid("b")])),
            ..Default::default()
        };
        let snapshot = validate_snapshot(payload).unwrap();
        assert_eq!(snapshot.round_number(), Some(2));
    }

    #[test]
    fn test_duplicate_bidder_is_malformed() {
        let payload = SnapshotPayload {
            round: Some(round(2, vec![bid("a"), bid("a")])),
            ..Default::default()
        };
        assert_eq!(
            validate_snapshot(payload),
            Err(SnapshotDefect::DuplicateBid("a".to_string()))
        );
    }

    #[test]
    fn test_zero_round_is_malformed() {
        let payload = SnapshotPayload {
            round: Some(round(0, vec![])),
            ..Default::default()
        };
        assert_eq!(validate_snapshot(payload), Err(SnapshotDefect::ZeroRoundNumber));
    }

    #[test]
    fn test_duplicate_leaderboard_team_is_malformed() {
        let entry = LeaderboardEntry {
            rank: 1,
            team_id: "a".to_string(),
            team_name: "A".to_string(),
            coins: 10,
            correct_answers: 0,
            wrong_answers: 0,
        };
        let payload = SnapshotPayload {
            leaderboard: vec![entry.clone(), LeaderboardEntry { rank: 2, ..entry }],
            ..Default::default()
        };
        assert!(matches!(
            validate_snapshot(payload),
            Err(SnapshotDefect::DuplicateLeaderboardTeam(_))
        ));
    }
}
