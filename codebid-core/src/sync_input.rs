use codebid_types::{
    Bid, LeaderboardEntry, RoundNumber, RoundSnapshotPayload, RoundStatus, ServerEvent,
    SnapshotPayload, TeamRecord,
};

/// A structurally validated `GET /game/state` result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub round: Option<RoundSnapshotPayload>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub own_team: Option<TeamRecord>,
    pub sequence: Option<u64>,
}

impl Snapshot {
    pub fn round_number(&self) -> Option<RoundNumber> {
        self.round.as_ref().map(|round| round.round_number)
    }
}

impl From<Snapshot> for SnapshotPayload {
    fn from(snapshot: Snapshot) -> Self {
        SnapshotPayload {
            round: snapshot.round,
            leaderboard: snapshot.leaderboard,
            team: snapshot.own_team,
            sequence: snapshot.sequence,
        }
    }
}

/// A push event together with the server-assigned sequence number of its frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedEvent {
    pub event: ServerEvent,
    pub seq: Option<u64>,
}

impl SequencedEvent {
    pub fn new(event: ServerEvent) -> Self {
        Self { event, seq: None }
    }

    pub fn with_seq(event: ServerEvent, seq: u64) -> Self {
        Self {
            event,
            seq: Some(seq),
        }
    }
}

/// Everything the round state machine consumes, in one ordered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncInput {
    Snapshot(Snapshot),
    Event(SequencedEvent),
    /// The coordinator acknowledged this client's own bid.
    OwnBidAccepted {
        round_number: Option<RoundNumber>,
        bid: Bid,
    },
}

impl SyncInput {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncInput::Snapshot(_) => "snapshot",
            SyncInput::Event(sequenced) => sequenced.event.name(),
            SyncInput::OwnBidAccepted { .. } => "own-bid-accepted",
        }
    }
}

impl From<ServerEvent> for SyncInput {
    fn from(event: ServerEvent) -> Self {
        SyncInput::Event(SequencedEvent::new(event))
    }
}

impl From<Snapshot> for SyncInput {
    fn from(snapshot: Snapshot) -> Self {
        SyncInput::Snapshot(snapshot)
    }
}

/// Legitimate no-ops: the input was valid but changes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    DuplicateBid,
    RoundNotOpen,
    NoChange,
    HandledBySession,
}

/// Inputs that contradict what has already been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    StaleRound {
        current: RoundNumber,
        received: RoundNumber,
    },
    RoundMismatch {
        current: RoundNumber,
        received: RoundNumber,
    },
    StaleSequence {
        last: u64,
        received: u64,
    },
    StaleSnapshot {
        current: RoundNumber,
        received: RoundNumber,
    },
    IllegalTransition {
        from: RoundStatus,
        to: RoundStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncCause {
    TimerJump { last: u32, received: u32 },
    RepeatedDesync { discarded: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored(IgnoreReason),
    Discarded(DiscardReason),
    ResyncRequested(ResyncCause),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}
