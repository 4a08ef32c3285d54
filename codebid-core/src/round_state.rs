use std::time::Instant;

use codebid_types::{
    Bid, BidReceivedPayload, BiddingEndedPayload, Freshness, RoundCompletedPayload, RoundOutcome,
    RoundStartedPayload, RoundStatus, RoundView, ServerEvent,
};
use tracing::{debug, info};

use crate::leaderboard;
use crate::{
    Countdown, DiscardReason, IgnoreReason, Outcome, ResyncCause, SequencedEvent, Snapshot,
    SyncInput, TickDrift, TimerReconciler,
};

pub const DEFAULT_STARTING_COINS: u64 = 2000;
pub const DEFAULT_DESYNC_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReducerRules {
    /// Coins every team holds after `game:reset`.
    pub starting_coins: u64,
    /// Nominal `timer:update` spacing in whole seconds.
    pub tick_seconds: u32,
}

impl Default for ReducerRules {
    fn default() -> Self {
        Self {
            starting_coins: DEFAULT_STARTING_COINS,
            tick_seconds: 1,
        }
    }
}

/// Result of reducing one input. `next` is `None` whenever the view is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub next: Option<RoundView>,
    pub outcome: Outcome,
}

impl Reduction {
    fn applied(current: &RoundView, next: RoundView) -> Self {
        if next == *current {
            return Self::ignored(IgnoreReason::NoChange);
        }
        Self {
            next: Some(next),
            outcome: Outcome::Applied,
        }
    }

    fn ignored(reason: IgnoreReason) -> Self {
        Self {
            next: None,
            outcome: Outcome::Ignored(reason),
        }
    }

    fn discarded(reason: DiscardReason) -> Self {
        Self {
            next: None,
            outcome: Outcome::Discarded(reason),
        }
    }

    fn resync(cause: ResyncCause) -> Self {
        Self {
            next: None,
            outcome: Outcome::ResyncRequested(cause),
        }
    }
}

/// The pure reducer: `apply(currentView, input) -> newView`.
///
/// Never panics; every input that cannot be applied yields an outcome
/// explaining why and leaves the view untouched.
pub fn reduce(view: &RoundView, input: &SyncInput, rules: &ReducerRules) -> Reduction {
    match input {
        SyncInput::Snapshot(snapshot) => reduce_snapshot(view, snapshot),
        SyncInput::Event(sequenced) => reduce_event(view, sequenced, rules),
        SyncInput::OwnBidAccepted { round_number, bid } => {
            let round = round_number.unwrap_or(view.round_number);
            if round != view.round_number {
                return Reduction::discarded(DiscardReason::RoundMismatch {
                    current: view.round_number,
                    received: round,
                });
            }
            if !view.status.accepts_ticks() {
                return Reduction::ignored(IgnoreReason::RoundNotOpen);
            }
            if view.has_bid(&bid.team_id) {
                return Reduction::ignored(IgnoreReason::DuplicateBid);
            }
            let mut next = view.clone();
            next.bids.push(bid.clone());
            Reduction::applied(view, next)
        }
    }
}

fn reduce_snapshot(view: &RoundView, snapshot: &Snapshot) -> Reduction {
    let incoming = snapshot.round_number();

    if let Some(received) = incoming {
        if received < view.round_number {
            return Reduction::discarded(DiscardReason::StaleSnapshot {
                current: view.round_number,
                received,
            });
        }
    }

    let same_round = incoming.is_none_or(|received| received == view.round_number);
    if same_round {
        if let (Some(received), Some(last)) = (snapshot.sequence, view.sequence) {
            if received < last {
                return Reduction::discarded(DiscardReason::StaleSequence { last, received });
            }
        }
    }

    // Within one round a snapshot may lag the events already applied
    let current_round = snapshot
        .round
        .as_ref()
        .filter(|round| round.round_number == view.round_number);
    if let Some(round) = current_round {
        if let (Some(received), Some(current)) = (phase(round.status), phase(view.status)) {
            if received < current {
                return Reduction::discarded(DiscardReason::StaleSnapshot {
                    current: view.round_number,
                    received: round.round_number,
                });
            }
        }
    }

    let mut next = view.clone();
    match &snapshot.round {
        Some(round) => {
            next.round_number = round.round_number;
            next.status = round.status;
            next.title = round.title.clone();
            next.category = round.category.clone();
            next.duration_seconds = round.duration_seconds.unwrap_or(0);
            next.time_left_seconds = match round.time_left {
                Some(left) => clamp_seconds(left),
                None if round.status == RoundStatus::Bidding => next.duration_seconds,
                None => 0,
            };
            next.bids = match current_round {
                Some(_) if round.status != RoundStatus::Idle => merge_bids(&view.bids, &round.bids),
                _ => round.bids.clone(),
            };
            next.winner_so_far = round.winner_so_far.clone();
        }
        None => next.clear_round(),
    }

    if !same_round || snapshot.round.is_none() {
        next.last_result = None;
    }
    next.leaderboard = leaderboard::authoritative(&snapshot.leaderboard);
    next.own_team = snapshot.own_team.clone();
    next.sequence = match snapshot.sequence {
        Some(seq) => Some(seq),
        None if same_round => view.sequence,
        None => None,
    };

    Reduction::applied(view, next)
}

/// Position within one round. `Idle` sits outside it: it either precedes
/// the round or follows a reset.
fn phase(status: RoundStatus) -> Option<u8> {
    match status {
        RoundStatus::Idle => None,
        RoundStatus::Bidding => Some(1),
        RoundStatus::Reviewing => Some(2),
        RoundStatus::Completed => Some(3),
    }
}

/// Accepted bids stay put for the rest of the round; the snapshot can only add.
fn merge_bids(accepted: &[Bid], incoming: &[Bid]) -> Vec<Bid> {
    let mut merged = accepted.to_vec();
    for bid in incoming {
        if !merged.iter().any(|known| known.team_id == bid.team_id) {
            merged.push(bid.clone());
        }
    }
    merged
}

fn reduce_event(view: &RoundView, sequenced: &SequencedEvent, rules: &ReducerRules) -> Reduction {
    let event = &sequenced.event;

    let within_round = event
        .round_number()
        .is_none_or(|round| round == view.round_number);
    if within_round {
        if let (Some(received), Some(last)) = (sequenced.seq, view.sequence) {
            if received <= last {
                return Reduction::discarded(DiscardReason::StaleSequence { last, received });
            }
        }
    }

    let mut reduction = match event {
        ServerEvent::RoundStarted(data) => round_started(view, data),
        ServerEvent::TimerUpdate(data) => timer_update(view, data.time_left, rules),
        ServerEvent::BidReceived(data) => bid_received(view, data),
        ServerEvent::BiddingEnded(data) => bidding_ended(view, data),
        ServerEvent::RoundCompleted(data) => round_completed(view, data),
        ServerEvent::RoundForceReset => {
            let mut next = view.clone();
            next.clear_round();
            next.last_result = None;
            Reduction::applied(view, next)
        }
        ServerEvent::GameReset => {
            let mut next = view.clone();
            next.clear_round();
            next.last_result = None;
            next.leaderboard = leaderboard::reset(&view.leaderboard, rules.starting_coins);
            next.own_team = view
                .own_team
                .as_ref()
                .map(|team| leaderboard::reset_team(team, rules.starting_coins));
            Reduction::applied(view, next)
        }
        ServerEvent::TeamsOnline(data) => {
            let mut next = view.clone();
            next.teams_online = Some(data.count);
            Reduction::applied(view, next)
        }
        ServerEvent::RoundStatus(data) => round_status(view, data.status),
        ServerEvent::ForceLogout(_) => Reduction::ignored(IgnoreReason::HandledBySession),
    };

    if let (Some(next), Some(seq)) = (reduction.next.as_mut(), sequenced.seq) {
        next.sequence = Some(seq);
    }
    reduction
}

fn round_started(view: &RoundView, data: &RoundStartedPayload) -> Reduction {
    let stale = data.round_number < view.round_number
        || (data.round_number == view.round_number && view.status != RoundStatus::Idle);
    if stale {
        return Reduction::discarded(DiscardReason::StaleRound {
            current: view.round_number,
            received: data.round_number,
        });
    }

    let next = RoundView {
        round_number: data.round_number,
        status: RoundStatus::Bidding,
        title: data.title.clone(),
        category: data.category.clone(),
        time_left_seconds: data.duration_seconds,
        duration_seconds: data.duration_seconds,
        bids: Vec::new(),
        winner_so_far: None,
        last_result: None,
        sequence: None,
        ..view.clone()
    };
    Reduction::applied(view, next)
}

fn timer_update(view: &RoundView, time_left: i64, rules: &ReducerRules) -> Reduction {
    if !view.status.accepts_ticks() {
        return Reduction::ignored(IgnoreReason::RoundNotOpen);
    }
    let received = clamp_seconds(time_left);
    if received > view.time_left_seconds.saturating_add(rules.tick_seconds) {
        return Reduction::resync(ResyncCause::TimerJump {
            last: view.time_left_seconds,
            received,
        });
    }
    let mut next = view.clone();
    next.time_left_seconds = received;
    Reduction::applied(view, next)
}

fn bid_received(view: &RoundView, data: &BidReceivedPayload) -> Reduction {
    if view.status != RoundStatus::Bidding {
        return Reduction::ignored(IgnoreReason::RoundNotOpen);
    }
    if let Some(received) = data.round_number {
        if received != view.round_number {
            return Reduction::discarded(DiscardReason::RoundMismatch {
                current: view.round_number,
                received,
            });
        }
    }
    if view.has_bid(&data.team_id) {
        return Reduction::ignored(IgnoreReason::DuplicateBid);
    }
    let mut next = view.clone();
    next.bids.push(data.bid());
    Reduction::applied(view, next)
}

fn bidding_ended(view: &RoundView, data: &BiddingEndedPayload) -> Reduction {
    match view.status {
        RoundStatus::Bidding => {
            let mut next = view.clone();
            next.status = RoundStatus::Reviewing;
            next.time_left_seconds = 0;
            next.winner_so_far = data.winner_so_far.clone();
            Reduction::applied(view, next)
        }
        RoundStatus::Reviewing => Reduction::ignored(IgnoreReason::NoChange),
        from => Reduction::discarded(DiscardReason::IllegalTransition {
            from,
            to: RoundStatus::Reviewing,
        }),
    }
}

fn round_completed(view: &RoundView, data: &RoundCompletedPayload) -> Reduction {
    if let Some(received) = data.round_number {
        if received != view.round_number {
            return Reduction::discarded(DiscardReason::RoundMismatch {
                current: view.round_number,
                received,
            });
        }
    }

    match view.status {
        RoundStatus::Bidding | RoundStatus::Reviewing => {
            if view.status == RoundStatus::Bidding {
                debug!(
                    round_number = view.round_number,
                    "round completed while bidding; closing bidding implicitly"
                );
            }
            let mut next = view.clone();
            next.status = RoundStatus::Completed;
            next.time_left_seconds = 0;
            next.leaderboard = leaderboard::authoritative(&data.leaderboard);
            next.own_team = view
                .own_team
                .as_ref()
                .map(|team| leaderboard::refresh_team(team, &next.leaderboard));
            next.last_result = Some(RoundOutcome {
                verdict: data.result,
                team_name: data.team_name.clone(),
                winner_name: data.winner_name.clone(),
                coins_change: data.coins_change,
            });
            Reduction::applied(view, next)
        }
        RoundStatus::Completed => Reduction::ignored(IgnoreReason::NoChange),
        RoundStatus::Idle => Reduction::discarded(DiscardReason::IllegalTransition {
            from: RoundStatus::Idle,
            to: RoundStatus::Completed,
        }),
    }
}

fn round_status(view: &RoundView, status: RoundStatus) -> Reduction {
    if status == view.status {
        return Reduction::ignored(IgnoreReason::NoChange);
    }
    if !view.status.can_advance_to(status) {
        return Reduction::discarded(DiscardReason::IllegalTransition {
            from: view.status,
            to: status,
        });
    }
    // idle -> bidding needs the round:started payload; a bare status cannot open a round.
    if status == RoundStatus::Bidding {
        return Reduction::discarded(DiscardReason::IllegalTransition {
            from: view.status,
            to: status,
        });
    }
    let mut next = view.clone();
    match status {
        RoundStatus::Idle => next.clear_round(),
        _ => {
            next.status = status;
            next.time_left_seconds = 0;
        }
    }
    Reduction::applied(view, next)
}

fn clamp_seconds(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// Owns the single current [`RoundView`] and feeds every input through
/// [`reduce`], in arrival order.
#[derive(Debug, Clone)]
pub struct RoundStateMachine {
    view: RoundView,
    rules: ReducerRules,
    timer: TimerReconciler,
    desync_threshold: u32,
    consecutive_discards: u32,
}

impl RoundStateMachine {
    pub fn new(rules: ReducerRules, timer: TimerReconciler, desync_threshold: u32) -> Self {
        Self {
            view: RoundView::default(),
            rules,
            timer,
            desync_threshold: desync_threshold.max(1),
            consecutive_discards: 0,
        }
    }

    pub fn view(&self) -> &RoundView {
        &self.view
    }

    pub fn apply(&mut self, input: SyncInput, now: Instant) -> Outcome {
        let kind = input.kind();
        let reduction = reduce(&self.view, &input, &self.rules);

        match &reduction.outcome {
            Outcome::Applied | Outcome::Ignored(_) => {
                self.consecutive_discards = 0;
                let previous_status = self.view.status;
                if let Some(next) = reduction.next {
                    self.view = next;
                }
                self.track_timer(&input, previous_status, now);
                if let Outcome::Ignored(reason) = &reduction.outcome {
                    debug!(input = kind, ?reason, "input ignored");
                }
                reduction.outcome
            }
            Outcome::Discarded(reason) if matches!(input, SyncInput::OwnBidAccepted { .. }) => {
                // The coordinator's own ack says nothing about push ordering
                debug!(input = kind, ?reason, "acknowledged bid not applied");
                reduction.outcome
            }
            Outcome::Discarded(reason) => {
                self.consecutive_discards += 1;
                debug!(
                    input = kind,
                    ?reason,
                    discarded = self.consecutive_discards,
                    round_number = self.view.round_number,
                    "input discarded as desynchronized"
                );
                if self.consecutive_discards >= self.desync_threshold {
                    let discarded = self.consecutive_discards;
                    self.consecutive_discards = 0;
                    info!(discarded, "repeated desync, requesting snapshot");
                    return Outcome::ResyncRequested(ResyncCause::RepeatedDesync { discarded });
                }
                reduction.outcome
            }
            Outcome::ResyncRequested(cause) => {
                info!(input = kind, ?cause, "resync requested");
                reduction.outcome
            }
        }
    }

    fn track_timer(&mut self, input: &SyncInput, previous_status: RoundStatus, now: Instant) {
        if !self.view.status.accepts_ticks() || self.view.time_left_seconds == 0 {
            self.timer.stop();
            return;
        }
        match input {
            SyncInput::Event(SequencedEvent {
                event: ServerEvent::TimerUpdate(_),
                ..
            }) => {
                if let TickDrift::Resynced { drift } =
                    self.timer.observe(self.view.time_left_seconds, now)
                {
                    debug!(
                        drift_ms = drift.as_millis() as u64,
                        time_left = self.view.time_left_seconds,
                        "local countdown resynced to server"
                    );
                }
            }
            SyncInput::Snapshot(_)
            | SyncInput::Event(SequencedEvent {
                event: ServerEvent::RoundStarted(_),
                ..
            }) => self.timer.reseed(self.view.time_left_seconds, now),
            _ if previous_status != self.view.status => {
                self.timer.reseed(self.view.time_left_seconds, now)
            }
            _ => {}
        }
    }

    /// Locally interpolated countdown between ticks, never above the last
    /// server value.
    pub fn time_left_at(&self, now: Instant) -> u32 {
        match self.countdown() {
            Some(countdown) => countdown.remaining_at(now),
            None => self.view.time_left_seconds,
        }
    }

    /// The running countdown, capped at the last server value. `None` outside
    /// bidding and reviewing.
    pub fn countdown(&self) -> Option<Countdown> {
        self.timer
            .countdown()
            .map(|countdown| countdown.capped(self.view.time_left_seconds))
    }

    /// Returns whether the flag changed.
    pub fn set_freshness(&mut self, freshness: Freshness) -> bool {
        if self.view.freshness == freshness {
            return false;
        }
        self.view.freshness = freshness;
        true
    }

    /// Back to the unauthenticated empty view.
    pub fn reset(&mut self) {
        self.view = RoundView::default();
        self.consecutive_discards = 0;
        self.timer.stop();
    }
}

impl Default for RoundStateMachine {
    fn default() -> Self {
        Self::new(
            ReducerRules::default(),
            TimerReconciler::default(),
            DEFAULT_DESYNC_THRESHOLD,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebid_types::{
        Bid, LeaderboardEntry, RoundSnapshotPayload, TeamRecord, TeamsOnlinePayload,
        TimerUpdatePayload,
    };

    fn started(round_number: u64, duration: u32) -> SyncInput {
        ServerEvent::RoundStarted(RoundStartedPayload {
            round_number,
            title: format!("Problem {}", round_number),
            category: "Medium".to_string(),
            duration_seconds: duration,
        })
        .into()
    }

    fn tick(time_left: i64) -> SyncInput {
        ServerEvent::TimerUpdate(TimerUpdatePayload { time_left }).into()
    }

    fn bid(team: &str, amount: u64) -> SyncInput {
        ServerEvent::BidReceived(BidReceivedPayload {
            team_id: team.to_string(),
            team_name: team.to_uppercase(),
            amount,
            round_number: None,
        })
        .into()
    }

    fn ended() -> SyncInput {
        ServerEvent::BiddingEnded(BiddingEndedPayload::default()).into()
    }

    fn entry(rank: u32, team: &str, coins: u64) -> LeaderboardEntry {
        LeaderboardEntry {
            rank,
            team_id: team.to_string(),
            team_name: team.to_uppercase(),
            coins,
            correct_answers: 0,
            wrong_answers: 0,
        }
    }

    fn apply_all(inputs: Vec<SyncInput>) -> RoundView {
        let rules = ReducerRules::default();
        inputs.iter().fold(RoundView::default(), |view, input| {
            reduce(&view, input, &rules).next.unwrap_or(view)
        })
    }

    #[test]
    fn test_round_started_opens_bidding() {
        let view = apply_all(vec![started(1, 30)]);
        assert_eq!(view.round_number, 1);
        assert_eq!(view.status, RoundStatus::Bidding);
        assert_eq!(view.time_left_seconds, 30);
        assert!(view.bids.is_empty());
    }

    #[test]
    fn test_duplicate_round_started_is_noop() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(4, 30), bid("a", 10)]);
        let reduction = reduce(&view, &started(4, 60), &rules);
        assert!(reduction.next.is_none());
        assert_eq!(
            reduction.outcome,
            Outcome::Discarded(DiscardReason::StaleRound {
                current: 4,
                received: 4
            })
        );

        let reduction = reduce(&view, &started(2, 60), &rules);
        assert!(reduction.next.is_none());
    }

    #[test]
    fn test_round_started_after_reset_may_reuse_number() {
        let view = apply_all(vec![
            started(4, 30),
            ServerEvent::RoundForceReset.into(),
            started(4, 45),
        ]);
        assert_eq!(view.status, RoundStatus::Bidding);
        assert_eq!(view.duration_seconds, 45);
    }

    #[test]
    fn test_lower_round_discarded_even_when_idle() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(5, 30), ServerEvent::RoundForceReset.into()]);
        let reduction = reduce(&view, &started(3, 30), &rules);
        assert!(matches!(reduction.outcome, Outcome::Discarded(_)));
    }

    #[test]
    fn test_timer_sequence_then_bidding_ended() {
        let view = apply_all(vec![started(1, 30), tick(30), tick(25), tick(0), ended()]);
        assert_eq!(view.status, RoundStatus::Reviewing);
        assert_eq!(view.time_left_seconds, 0);
    }

    #[test]
    fn test_negative_tick_clamps_to_zero() {
        let view = apply_all(vec![started(1, 30), tick(-4)]);
        assert_eq!(view.time_left_seconds, 0);
    }

    #[test]
    fn test_tick_outside_round_ignored() {
        let rules = ReducerRules::default();
        let reduction = reduce(&RoundView::default(), &tick(10), &rules);
        assert_eq!(reduction.outcome, Outcome::Ignored(IgnoreReason::RoundNotOpen));
    }

    #[test]
    fn test_timer_jump_requests_resync() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(1, 30), tick(10)]);
        let reduction = reduce(&view, &tick(20), &rules);
        assert!(reduction.next.is_none());
        assert_eq!(
            reduction.outcome,
            Outcome::ResyncRequested(ResyncCause::TimerJump {
                last: 10,
                received: 20
            })
        );
        // One tick of slack is tolerated.
        assert!(reduce(&view, &tick(11), &rules).outcome.is_applied());
    }

    #[test]
    fn test_duplicate_bid_keeps_first() {
        let view = apply_all(vec![started(1, 30), bid("a", 10), bid("a", 99), bid("b", 20)]);
        assert_eq!(view.bids.len(), 2);
        assert_eq!(view.bid_of("a").map(|b| b.amount), Some(10));
        assert_eq!(view.highest_bid().map(|b| b.team_id.as_str()), Some("b"));
    }

    #[test]
    fn test_bid_after_bidding_ended_ignored() {
        let view = apply_all(vec![started(1, 30), bid("a", 10), ended(), bid("b", 50)]);
        assert_eq!(view.bids.len(), 1);
    }

    #[test]
    fn test_bid_for_other_round_discarded() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(2, 30)]);
        let input: SyncInput = ServerEvent::BidReceived(BidReceivedPayload {
            team_id: "a".to_string(),
            team_name: "A".to_string(),
            amount: 10,
            round_number: Some(1),
        })
        .into();
        assert_eq!(
            reduce(&view, &input, &rules).outcome,
            Outcome::Discarded(DiscardReason::RoundMismatch {
                current: 2,
                received: 1
            })
        );
    }

    #[test]
    fn test_round_completed_replaces_leaderboard_verbatim() {
        let payload = vec![entry(1, "c", 2300), entry(2, "a", 2000), entry(3, "b", 1900)];
        let view = apply_all(vec![
            started(1, 30),
            bid("a", 100),
            bid("b", 100),
            bid("c", 300),
            ended(),
            ServerEvent::RoundCompleted(RoundCompletedPayload {
                result: Some(codebid_types::Verdict::Correct),
                team_name: Some("C".to_string()),
                winner_name: Some("C".to_string()),
                coins_change: Some(300),
                leaderboard: payload.clone(),
                round_number: None,
            })
            .into(),
        ]);
        assert_eq!(view.status, RoundStatus::Completed);
        assert_eq!(view.leaderboard, payload);
        assert_eq!(view.last_result.and_then(|r| r.coins_change), Some(300));
    }

    #[test]
    fn test_force_reset_keeps_leaderboard() {
        let snapshot = Snapshot {
            leaderboard: vec![entry(1, "a", 2500)],
            ..Default::default()
        };
        let view = apply_all(vec![
            snapshot.into(),
            started(1, 30),
            bid("a", 10),
            ServerEvent::RoundForceReset.into(),
        ]);
        assert_eq!(view.status, RoundStatus::Idle);
        assert!(view.bids.is_empty());
        assert_eq!(view.round_number, 1);
        assert_eq!(view.leaderboard[0].coins, 2500);
    }

    #[test]
    fn test_game_reset_restores_starting_coins() {
        let team = TeamRecord {
            team_id: "a".to_string(),
            team_name: "A".to_string(),
            coins: 3100,
            correct_answers: 2,
            wrong_answers: 1,
        };
        let snapshot = Snapshot {
            leaderboard: vec![entry(1, "a", 3100), entry(2, "b", 900)],
            own_team: Some(team),
            ..Default::default()
        };
        let view = apply_all(vec![snapshot.into(), started(1, 30), ServerEvent::GameReset.into()]);
        assert_eq!(view.status, RoundStatus::Idle);
        assert!(view.leaderboard.iter().all(|e| e.coins == DEFAULT_STARTING_COINS));
        let own = view.own_team.unwrap();
        assert_eq!(own.coins, DEFAULT_STARTING_COINS);
        assert_eq!(own.correct_answers, 0);
    }

    #[test]
    fn test_stale_sequence_discarded() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![
            started(1, 30),
            SyncInput::Event(SequencedEvent::with_seq(
                ServerEvent::TimerUpdate(TimerUpdatePayload { time_left: 29 }),
                10,
            )),
        ]);
        assert_eq!(view.sequence, Some(10));
        let replay = SyncInput::Event(SequencedEvent::with_seq(
            ServerEvent::TimerUpdate(TimerUpdatePayload { time_left: 28 }),
            9,
        ));
        assert_eq!(
            reduce(&view, &replay, &rules).outcome,
            Outcome::Discarded(DiscardReason::StaleSequence {
                last: 10,
                received: 9
            })
        );
    }

    #[test]
    fn test_snapshot_older_than_view_discarded() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(3, 30)]);
        let snapshot = Snapshot {
            round: Some(RoundSnapshotPayload {
                round_number: 2,
                title: "Old".to_string(),
                category: String::new(),
                status: RoundStatus::Completed,
                time_left: None,
                duration_seconds: None,
                bids: vec![],
                winner_so_far: None,
            }),
            ..Default::default()
        };
        let reduction = reduce(&view, &snapshot.into(), &rules);
        assert_eq!(
            reduction.outcome,
            Outcome::Discarded(DiscardReason::StaleSnapshot {
                current: 3,
                received: 2
            })
        );
    }

    fn round_snapshot(round_number: u64, status: RoundStatus, bids: Vec<Bid>) -> SyncInput {
        Snapshot {
            round: Some(RoundSnapshotPayload {
                round_number,
                title: format!("Problem {}", round_number),
                category: "Medium".to_string(),
                status,
                time_left: Some(12),
                duration_seconds: Some(30),
                bids,
                winner_so_far: None,
            }),
            ..Default::default()
        }
        .into()
    }

    fn placed(team: &str, amount: u64) -> Bid {
        Bid {
            team_id: team.to_string(),
            team_name: team.to_uppercase(),
            amount,
        }
    }

    #[test]
    fn test_snapshot_behind_current_phase_discarded() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(3, 30), bid("a", 40), ended()]);
        assert_eq!(view.status, RoundStatus::Reviewing);

        let lagging = round_snapshot(3, RoundStatus::Bidding, vec![]);
        let reduction = reduce(&view, &lagging, &rules);
        assert!(reduction.next.is_none());
        assert_eq!(
            reduction.outcome,
            Outcome::Discarded(DiscardReason::StaleSnapshot {
                current: 3,
                received: 3
            })
        );

        let mut machine = RoundStateMachine::default();
        let now = Instant::now();
        for input in [started(3, 30), bid("a", 40), ended(), lagging] {
            machine.apply(input, now);
        }
        assert_eq!(machine.view().status, RoundStatus::Reviewing);
        assert!(machine.view().has_bid("a"));
    }

    #[test]
    fn test_snapshot_in_same_round_keeps_accepted_bids() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(3, 30), bid("a", 40)]);

        let snapshot = round_snapshot(3, RoundStatus::Bidding, vec![placed("b", 90), placed("a", 1)]);
        let next = reduce(&view, &snapshot, &rules).next.unwrap();
        assert_eq!(next.bids.len(), 2);
        assert_eq!(next.bid_of("a").map(|b| b.amount), Some(40));
        assert!(next.has_bid("b"));
        assert_eq!(next.time_left_seconds, 12);

        // A later phase of the same round still applies
        let reviewing = round_snapshot(3, RoundStatus::Reviewing, vec![]);
        let next = reduce(&view, &reviewing, &rules).next.unwrap();
        assert_eq!(next.status, RoundStatus::Reviewing);
        assert!(next.has_bid("a"));
    }

    #[test]
    fn test_snapshot_seeds_round_and_bids() {
        let snapshot = Snapshot {
            round: Some(RoundSnapshotPayload {
                round_number: 6,
                title: "Word Ladder".to_string(),
                category: "Hard".to_string(),
                status: RoundStatus::Bidding,
                time_left: Some(14),
                duration_seconds: Some(30),
                bids: vec![Bid {
                    team_id: "a".to_string(),
                    team_name: "A".to_string(),
                    amount: 70,
                }],
                winner_so_far: None,
            }),
            leaderboard: vec![entry(0, "b", 10), entry(0, "a", 30)],
            own_team: None,
            sequence: Some(40),
        };
        let view = apply_all(vec![snapshot.into()]);
        assert_eq!(view.round_number, 6);
        assert_eq!(view.time_left_seconds, 14);
        assert!(view.has_bid("a"));
        assert_eq!(view.leaderboard[0].team_id, "a");
        assert_eq!(view.sequence, Some(40));
    }

    #[test]
    fn test_round_status_follows_transition_chain() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(1, 30)]);
        let to_reviewing: SyncInput = ServerEvent::RoundStatus(codebid_types::RoundStatusPayload {
            status: RoundStatus::Reviewing,
        })
        .into();
        let to_idle: SyncInput = ServerEvent::RoundStatus(codebid_types::RoundStatusPayload {
            status: RoundStatus::Idle,
        })
        .into();
        assert!(reduce(&view, &to_reviewing, &rules).outcome.is_applied());
        assert!(matches!(
            reduce(&view, &to_idle, &rules).outcome,
            Outcome::Discarded(DiscardReason::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_teams_online_updates_count() {
        let view = apply_all(vec![ServerEvent::TeamsOnline(TeamsOnlinePayload { count: 9 }).into()]);
        assert_eq!(view.teams_online, Some(9));
    }

    #[test]
    fn test_own_bid_accepted_marks_team() {
        let rules = ReducerRules::default();
        let view = apply_all(vec![started(2, 30)]);
        let accepted = SyncInput::OwnBidAccepted {
            round_number: Some(2),
            bid: Bid {
                team_id: "me".to_string(),
                team_name: "Me".to_string(),
                amount: 50,
            },
        };
        let next = reduce(&view, &accepted, &rules).next.unwrap();
        assert!(next.has_bid("me"));
        assert_eq!(
            reduce(&next, &accepted, &rules).outcome,
            Outcome::Ignored(IgnoreReason::DuplicateBid)
        );
    }

    #[test]
    fn test_machine_escalates_repeated_discards() {
        let mut machine = RoundStateMachine::default();
        let now = Instant::now();
        machine.apply(started(5, 30), now);
        assert!(matches!(machine.apply(started(1, 30), now), Outcome::Discarded(_)));
        assert!(matches!(machine.apply(started(2, 30), now), Outcome::Discarded(_)));
        assert_eq!(
            machine.apply(started(3, 30), now),
            Outcome::ResyncRequested(ResyncCause::RepeatedDesync { discarded: 3 })
        );
        assert!(matches!(machine.apply(started(4, 30), now), Outcome::Discarded(_)));
    }

    #[test]
    fn test_own_bid_discards_do_not_escalate() {
        let mut machine = RoundStateMachine::new(
            ReducerRules::default(),
            TimerReconciler::default(),
            2,
        );
        let now = Instant::now();
        machine.apply(started(5, 30), now);
        let late_ack = SyncInput::OwnBidAccepted {
            round_number: Some(4),
            bid: placed("me", 50),
        };
        for _ in 0..3 {
            assert!(matches!(
                machine.apply(late_ack.clone(), now),
                Outcome::Discarded(DiscardReason::RoundMismatch { .. })
            ));
        }
        // One push discard alone stays below the threshold
        assert!(matches!(machine.apply(started(1, 30), now), Outcome::Discarded(_)));
    }

    #[test]
    fn test_machine_countdown_interpolates() {
        let mut machine = RoundStateMachine::default();
        let now = Instant::now();
        machine.apply(started(1, 30), now);
        assert_eq!(machine.time_left_at(now + std::time::Duration::from_secs(3)), 27);
        machine.apply(ended(), now);
        assert_eq!(machine.time_left_at(now + std::time::Duration::from_secs(3)), 0);
    }
}
