#![allow(dead_code)]

use codebid_core::{RoundStateMachine, SequencedEvent, Snapshot, SyncInput};
use codebid_types::{
    BidReceivedPayload, BiddingEndedPayload, LeaderboardEntry, RoundCompletedPayload,
    RoundSnapshotPayload, RoundStartedPayload, RoundStatus, RoundView, ServerEvent,
    TimerUpdatePayload, Verdict,
};
use std::time::Instant;

/// Creates a leaderboard entry with no answers recorded
pub fn create_test_entry(rank: u32, team: &str, coins: u64) -> LeaderboardEntry {
    LeaderboardEntry {
        rank,
        team_id: team.to_string(),
        team_name: format!("Team {}", team),
        coins,
        correct_answers: 0,
        wrong_answers: 0,
    }
}

pub fn round_started(round_number: u64, duration: u32) -> SyncInput {
    ServerEvent::RoundStarted(RoundStartedPayload {
        round_number,
        title: format!("Problem {}", round_number),
        category: "Arrays".to_string(),
        duration_seconds: duration,
    })
    .into()
}

pub fn timer(time_left: i64) -> SyncInput {
    ServerEvent::TimerUpdate(TimerUpdatePayload { time_left }).into()
}

pub fn sequenced_timer(time_left: i64, seq: u64) -> SyncInput {
    SyncInput::Event(SequencedEvent::with_seq(
        ServerEvent::TimerUpdate(TimerUpdatePayload { time_left }),
        seq,
    ))
}

pub fn bid_received(team: &str, amount: u64) -> SyncInput {
    ServerEvent::BidReceived(BidReceivedPayload {
        team_id: team.to_string(),
        team_name: format!("Team {}", team),
        amount,
        round_number: None,
    })
    .into()
}

pub fn bidding_ended(winner: Option<&str>) -> SyncInput {
    ServerEvent::BiddingEnded(BiddingEndedPayload {
        winner_so_far: winner.map(str::to_string),
    })
    .into()
}

pub fn round_completed(verdict: Verdict, leaderboard: Vec<LeaderboardEntry>) -> SyncInput {
    ServerEvent::RoundCompleted(RoundCompletedPayload {
        result: Some(verdict),
        team_name: None,
        winner_name: None,
        coins_change: None,
        leaderboard,
        round_number: None,
    })
    .into()
}

/// Snapshot of a round in progress
pub fn bidding_snapshot(round_number: u64, time_left: i64, bidders: &[(&str, u64)]) -> SyncInput {
    Snapshot {
        round: Some(RoundSnapshotPayload {
            round_number,
            title: format!("Problem {}", round_number),
            category: "Arrays".to_string(),
            status: RoundStatus::Bidding,
            time_left: Some(time_left),
            duration_seconds: Some(30),
            bids: bidders
                .iter()
                .map(|(team, amount)| codebid_types::Bid {
                    team_id: team.to_string(),
                    team_name: format!("Team {}", team),
                    amount: *amount,
                })
                .collect(),
            winner_so_far: None,
        }),
        ..Default::default()
    }
    .into()
}

/// Feeds every input through a fresh state machine in order
pub fn run_inputs(inputs: Vec<SyncInput>) -> (RoundStateMachine, Vec<codebid_core::Outcome>) {
    let mut machine = RoundStateMachine::default();
    let now = Instant::now();
    let outcomes = inputs
        .into_iter()
        .map(|input| machine.apply(input, now))
        .collect();
    (machine, outcomes)
}

pub fn assert_round(view: &RoundView, round_number: u64, status: RoundStatus) {
    assert_eq!(
        view.round_number, round_number,
        "Expected round {}, got {}",
        round_number, view.round_number
    );
    assert_eq!(
        view.status, status,
        "Expected status {:?}, got {:?}",
        status, view.status
    );
}
