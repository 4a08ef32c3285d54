//! Leaderboards are only ever replaced wholesale from authoritative payloads
//! (a snapshot or `round:completed`). Nothing here derives coins from bids.

use std::cmp::Ordering;
use std::collections::HashSet;

use codebid_types::{LeaderboardEntry, TeamRecord};

/// Coins descending, then team id ascending.
pub fn canonical_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.coins
        .cmp(&a.coins)
        .then_with(|| a.team_id.cmp(&b.team_id))
}

/// Sorts into canonical order and assigns ranks `1..=n`.
pub fn rank(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(canonical_order);
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = (index + 1) as u32;
    }
    entries
}

fn is_well_ranked(entries: &[LeaderboardEntry]) -> bool {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .iter()
        .all(|entry| entry.rank >= 1 && seen.insert(entry.rank))
}

/// Takes an authoritative payload as-is when it already carries unique ranks,
/// otherwise ranks it canonically.
pub fn authoritative(entries: &[LeaderboardEntry]) -> Vec<LeaderboardEntry> {
    if is_well_ranked(entries) {
        entries.to_vec()
    } else {
        rank(entries.to_vec())
    }
}

/// Applies `game:reset`: every team back to the starting purse with no answers.
pub fn reset(entries: &[LeaderboardEntry], starting_coins: u64) -> Vec<LeaderboardEntry> {
    let cleared = entries
        .iter()
        .map(|entry| LeaderboardEntry {
            rank: 0,
            coins: starting_coins,
            correct_answers: 0,
            wrong_answers: 0,
            ..entry.clone()
        })
        .collect();
    rank(cleared)
}

pub fn reset_team(team: &TeamRecord, starting_coins: u64) -> TeamRecord {
    TeamRecord {
        coins: starting_coins,
        correct_answers: 0,
        wrong_answers: 0,
        ..team.clone()
    }
}

/// Copies the authoritative counters for `team` out of `entries`, if listed.
pub fn refresh_team(team: &TeamRecord, entries: &[LeaderboardEntry]) -> TeamRecord {
    match entries.iter().find(|entry| entry.team_id == team.team_id) {
        Some(entry) => TeamRecord {
            coins: entry.coins,
            correct_answers: entry.correct_answers,
            wrong_answers: entry.wrong_answers,
            ..team.clone()
        },
        None => team.clone(),
    }
}
