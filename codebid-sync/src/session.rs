//! The session context: owns the credential store, the push channel task, the
//! reactor task that drives the round state machine, and the action surfaces.
//!
//! Every input reaches the state machine through the reactor, one at a time
//! and in arrival order. Inputs tagged with a credential other than the
//! current one are dropped there.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use codebid_core::{
    Countdown, Outcome, ReducerRules, RoundStateMachine, SequencedEvent, Snapshot, SyncInput,
    TimerReconciler, validate_snapshot,
};
use codebid_persistence::SessionCacheRepository;
use codebid_types::{Bid, Freshness, RoundNumber, RoundView, SnapshotPayload};

use crate::backoff::Backoff;
use crate::bid_guard::BidGuard;
use crate::channel::{ChannelSignal, Connector, EventChannel, WsConnector};
use crate::config::SyncConfig;
use crate::coordinator::{Coordinator, HttpCoordinator};
use crate::credential::{
    ActiveCredential, AuthError, Credential, CredentialId, CredentialStore, LogoutReason,
};
use crate::errors::{BidError, SyncError};
use crate::operator::Operator;
use crate::snapshot::{SnapshotClient, TaggedSnapshot};
use crate::subscription::{ConnectionState, SessionUpdate, Subscribers, Subscription};

/// Inputs for the reactor that do not come from the push channel.
pub(crate) enum Inbox {
    Snapshot {
        generation: u64,
        fetched: TaggedSnapshot,
    },
    OwnBid {
        credential: CredentialId,
        round_number: Option<RoundNumber>,
        bid: Bid,
        reply: oneshot::Sender<Option<Outcome>>,
    },
    /// A cached snapshot to render until the live one arrives.
    Seed {
        credential: CredentialId,
        snapshot: Snapshot,
    },
    Resync {
        credential: CredentialId,
    },
}

enum CacheWrite {
    Credential {
        token: String,
        role: String,
        fingerprint: String,
    },
    Snapshot {
        fingerprint: String,
        payload: SnapshotPayload,
    },
    Clear,
}

pub struct SyncSession {
    config: SyncConfig,
    credentials: CredentialStore,
    connector: Arc<dyn Connector>,
    signals: mpsc::UnboundedSender<ChannelSignal>,
    inbox: mpsc::UnboundedSender<Inbox>,
    view: watch::Receiver<RoundView>,
    countdown: watch::Receiver<Option<Countdown>>,
    connection: watch::Receiver<ConnectionState>,
    subscribers: Subscribers,
    bids: BidGuard,
    operator: Operator,
    cache: Option<SessionCacheRepository>,
    cache_writes: Option<mpsc::UnboundedSender<CacheWrite>>,
    shutdown: watch::Sender<bool>,
    reactor: JoinHandle<()>,
    cache_writer: Option<JoinHandle<()>>,
    channel: Mutex<Option<JoinHandle<()>>>,
}

impl SyncSession {
    /// Session over HTTP and WebSocket transports. Must be called inside a
    /// tokio runtime.
    pub fn new(
        config: SyncConfig,
        cache: Option<SessionCacheRepository>,
    ) -> Result<Self, SyncError> {
        let coordinator = Arc::new(HttpCoordinator::new(config.clone())?);
        let connector = Arc::new(WsConnector::new(config.ws_url.clone()));
        Ok(Self::with_transport(config, coordinator, connector, cache))
    }

    pub fn with_transport(
        config: SyncConfig,
        coordinator: Arc<dyn Coordinator>,
        connector: Arc<dyn Connector>,
        cache: Option<SessionCacheRepository>,
    ) -> Self {
        let credentials = CredentialStore::new();
        let subscribers = Subscribers::new();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (view_tx, view) = watch::channel(RoundView::default());
        let (countdown_tx, countdown) = watch::channel(None);
        let (connection_tx, connection) = watch::channel(ConnectionState::Offline);
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (signals, signals_rx) = mpsc::unbounded_channel();

        let (cache_writes, cache_writer) = match &cache {
            Some(repository) => {
                let (writes, writes_rx) = mpsc::unbounded_channel();
                let writer = tokio::spawn(run_cache_writer(repository.clone(), writes_rx));
                (Some(writes), Some(writer))
            }
            None => (None, None),
        };

        let snapshots = SnapshotClient::new(
            coordinator.clone(),
            credentials.clone(),
            backoff(&config),
            config.snapshot_attempts,
            config.request_timeout,
        );

        let reactor = Reactor {
            machine: state_machine(&config),
            credentials: credentials.clone(),
            snapshots,
            inbox: inbox.clone(),
            view: view_tx,
            countdown: countdown_tx,
            connection_tx,
            subscribers: subscribers.clone(),
            cache_writes: cache_writes.clone(),
            active: None,
            connection: ConnectionState::Offline,
            awaiting_baseline: false,
            baseline_ok: false,
            has_baseline: false,
            buffered: Vec::new(),
            generation: 0,
            backoff: backoff(&config),
            failed_baselines: 0,
        };
        let reactor = tokio::spawn(reactor.run(inbox_rx, signals_rx, shutdown_rx));

        let bids = BidGuard::new(
            coordinator.clone(),
            credentials.clone(),
            view.clone(),
            inbox.clone(),
            config.request_timeout,
        );
        let operator = Operator::new(coordinator, credentials.clone(), config.request_timeout);

        Self {
            config,
            credentials,
            connector,
            signals,
            inbox,
            view,
            countdown,
            connection,
            subscribers,
            bids,
            operator,
            cache,
            cache_writes,
            shutdown,
            reactor,
            cache_writer,
            channel: Mutex::new(None),
        }
    }

    /// Installs `token` as the current credential and (re)starts live sync
    /// under it. Work still running under a previous credential is cancelled.
    pub async fn login(&self, token: &str) -> Result<CredentialId, AuthError> {
        let credential = Credential::parse(token)?;
        let fingerprint = credential.fingerprint();
        info!(credential = %fingerprint, role = %credential.role(), "Logging in");

        self.persist(CacheWrite::Credential {
            token: token.to_string(),
            role: credential.role().to_string(),
            fingerprint,
        });
        let id = self.credentials.set(credential);
        self.start_channel().await;
        Ok(id)
    }

    /// Returns `false` when nobody was logged in.
    pub fn logout(&self) -> bool {
        self.credentials.clear(LogoutReason::UserRequested)
    }

    /// Logs back in with the cached credential, rendering the cached snapshot
    /// as a stale view until the live one arrives.
    pub async fn restore(&self) -> Option<CredentialId> {
        let cache = self.cache.as_ref()?;
        let cached = match cache.load_credential().await {
            Ok(Some(cached)) => cached,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Could not read session cache");
                return None;
            }
        };

        let credential = match Credential::parse(&cached.token) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Cached credential unreadable, discarding it");
                self.persist(CacheWrite::Clear);
                return None;
            }
        };
        let fingerprint = credential.fingerprint();

        let snapshot = match cache.load_snapshot(&fingerprint).await {
            Ok(Some(payload)) => match validate_snapshot(payload) {
                Ok(snapshot) => Some(snapshot),
                Err(defect) => {
                    warn!(credential = %fingerprint, %defect, "Ignoring invalid cached snapshot");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(credential = %fingerprint, error = %e, "Could not read cached snapshot");
                None
            }
        };

        info!(credential = %fingerprint, role = %credential.role(), "Restoring cached session");
        let id = self.credentials.set(credential);
        if let Some(snapshot) = snapshot {
            let _ = self.inbox.send(Inbox::Seed {
                credential: id,
                snapshot,
            });
        }
        self.start_channel().await;
        Some(id)
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribers.subscribe()
    }

    /// Copy of the live view.
    pub fn current_view(&self) -> RoundView {
        self.view.borrow().clone()
    }

    pub fn view_updates(&self) -> watch::Receiver<RoundView> {
        self.view.clone()
    }

    /// Seconds left on the round clock, counted down locally between server
    /// ticks and never above the last tick.
    pub fn time_left(&self) -> u32 {
        let countdown = *self.countdown.borrow();
        match countdown {
            Some(countdown) => countdown.remaining_at(Instant::now()),
            None => self.view.borrow().time_left_seconds,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn bids(&self) -> &BidGuard {
        &self.bids
    }

    pub async fn submit_bid(&self, amount: i64) -> Result<Bid, BidError> {
        self.bids.submit_bid(amount).await
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Asks for a fresh snapshot; a no-op while one is already pending.
    pub fn resync(&self) {
        if let Some(credential) = self.credentials.current_id() {
            let _ = self.inbox.send(Inbox::Resync { credential });
        }
    }

    /// Stops every task and flushes pending cache writes. The cached
    /// credential survives, so the next start can `restore()`.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        if let Some(channel) = self.channel.lock().await.take() {
            let _ = channel.await;
        }
        let _ = self.reactor.await;

        drop(self.cache_writes);
        if let Some(writer) = self.cache_writer {
            let _ = writer.await;
        }
        info!("Session shut down");
    }

    async fn start_channel(&self) {
        let mut channel = self.channel.lock().await;
        // A channel still running holds a connection made under the old credential
        if let Some(previous) = channel.take() {
            previous.abort();
        }
        *channel = Some(
            EventChannel::new(
                self.connector.clone(),
                self.credentials.clone(),
                self.signals.clone(),
                backoff(&self.config),
                self.config.reconnect_attempts,
                self.shutdown.subscribe(),
            )
            .spawn(),
        );
    }

    fn persist(&self, write: CacheWrite) {
        if let Some(writes) = &self.cache_writes {
            let _ = writes.send(write);
        }
    }
}

fn backoff(config: &SyncConfig) -> Backoff {
    Backoff::new(config.backoff_base, config.backoff_max)
}

fn state_machine(config: &SyncConfig) -> RoundStateMachine {
    let rules = ReducerRules {
        starting_coins: config.starting_coins,
        tick_seconds: u32::try_from(config.tick_interval.as_secs().max(1)).unwrap_or(u32::MAX),
    };
    RoundStateMachine::new(
        rules,
        TimerReconciler::new(config.tick_interval, config.drift_tolerance),
        config.desync_threshold,
    )
}

async fn run_cache_writer(
    cache: SessionCacheRepository,
    mut writes: mpsc::UnboundedReceiver<CacheWrite>,
) {
    while let Some(write) = writes.recv().await {
        let result = match write {
            CacheWrite::Credential {
                token,
                role,
                fingerprint,
            } => cache.save_credential(&token, &role, &fingerprint).await,
            CacheWrite::Snapshot {
                fingerprint,
                payload,
            } => cache.save_snapshot(&fingerprint, &payload).await,
            CacheWrite::Clear => cache.clear().await,
        };
        if let Err(e) = result {
            warn!(error = %e, "Session cache write failed");
        }
    }
}

/// Owns the state machine. Runs until shutdown or until the session is dropped.
struct Reactor {
    machine: RoundStateMachine,
    credentials: CredentialStore,
    snapshots: SnapshotClient,
    inbox: mpsc::UnboundedSender<Inbox>,
    view: watch::Sender<RoundView>,
    countdown: watch::Sender<Option<Countdown>>,
    connection_tx: watch::Sender<ConnectionState>,
    subscribers: Subscribers,
    cache_writes: Option<mpsc::UnboundedSender<CacheWrite>>,
    active: Option<ActiveCredential>,
    connection: ConnectionState,
    /// A snapshot is in flight; push events wait in `buffered` until it lands.
    awaiting_baseline: bool,
    /// The most recent baseline attempt succeeded.
    baseline_ok: bool,
    /// Some live snapshot has been applied under the current credential.
    has_baseline: bool,
    buffered: Vec<SequencedEvent>,
    generation: u64,
    backoff: Backoff,
    /// Latest-generation snapshots that gave up in a row.
    failed_baselines: u32,
}

impl Reactor {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<Inbox>,
        mut signals: mpsc::UnboundedReceiver<ChannelSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut credential_rx = self.credentials.subscribe();
        self.sync_credential();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = credential_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync_credential();
                }
                Some(signal) = signals.recv() => self.on_signal(signal),
                Some(message) = inbox.recv() => self.on_inbox(message),
            }
        }
        debug!("Session reactor stopped");
    }

    fn active_id(&self) -> Option<CredentialId> {
        self.active.as_ref().map(|active| active.id)
    }

    fn is_current(&self, credential: CredentialId) -> bool {
        self.active_id() == Some(credential)
    }

    /// Catches the reactor up with the credential store. A new credential
    /// starts from an empty view; no credential means logged out.
    fn sync_credential(&mut self) {
        let current = self.credentials.get();
        if current.as_ref().map(|active| active.id) == self.active_id() {
            return;
        }

        self.active = current;
        self.machine.reset();
        self.publish_countdown();
        self.buffered.clear();
        self.awaiting_baseline = false;
        self.baseline_ok = false;
        self.has_baseline = false;
        self.failed_baselines = 0;

        match &self.active {
            None => {
                let reason = self
                    .credentials
                    .last_logout()
                    .unwrap_or(LogoutReason::UserRequested);
                info!(?reason, "Logged out");
                self.persist(CacheWrite::Clear);
                self.set_connection(ConnectionState::Offline);
                self.publish_view();
                self.subscribers.publish(SessionUpdate::LoggedOut(reason));
            }
            Some(active) => {
                debug!(credential = %active.fingerprint(), id = %active.id, "Credential switched");
                self.set_connection(ConnectionState::Connecting);
                self.publish_view();
                self.request_snapshot("login", true);
            }
        }
    }

    fn on_signal(&mut self, signal: ChannelSignal) {
        self.sync_credential();
        if !self.is_current(signal.credential()) {
            debug!(credential = %signal.credential(), "Dropping channel signal from a previous credential");
            return;
        }

        match signal {
            ChannelSignal::Connected { .. } => {
                self.set_connection(ConnectionState::Connected);
                self.request_snapshot("reconnected", true);
            }
            ChannelSignal::Event { event, .. } => {
                if self.awaiting_baseline {
                    self.buffered.push(event);
                } else {
                    self.apply(SyncInput::Event(event));
                }
            }
            ChannelSignal::Disconnected { .. } => {
                self.set_connection(ConnectionState::Reconnecting);
                self.refresh_freshness();
            }
            ChannelSignal::GaveUp { attempts, .. } => {
                warn!(attempts, "Push channel gave up, view stays stale");
                self.set_connection(ConnectionState::Offline);
                self.refresh_freshness();
            }
            // The store was already cleared; sync_credential reported it.
            ChannelSignal::ForcedLogout { .. } => {}
        }
    }

    fn on_inbox(&mut self, message: Inbox) {
        self.sync_credential();
        match message {
            Inbox::Snapshot {
                generation,
                fetched,
            } => self.on_snapshot(generation, fetched),
            Inbox::OwnBid {
                credential,
                round_number,
                bid,
                reply,
            } => {
                let outcome = if self.is_current(credential) {
                    Some(self.apply(SyncInput::OwnBidAccepted { round_number, bid }))
                } else {
                    None
                };
                let _ = reply.send(outcome);
            }
            Inbox::Seed {
                credential,
                snapshot,
            } => {
                if self.is_current(credential) && !self.has_baseline {
                    debug!(round_number = ?snapshot.round_number(), "Seeding view from cache");
                    self.apply(SyncInput::Snapshot(snapshot));
                }
            }
            Inbox::Resync { credential } => {
                if self.is_current(credential) {
                    self.request_snapshot("requested", false);
                }
            }
        }
    }

    fn on_snapshot(&mut self, generation: u64, fetched: TaggedSnapshot) {
        match fetched.credential {
            Some(credential) if self.is_current(credential) => {}
            _ => {
                debug!(generation, "Dropping snapshot fetched under a previous credential");
                return;
            }
        }
        // A newer fetch was requested after this one; only that one is a baseline
        if generation != self.generation {
            debug!(generation, latest = self.generation, "Dropping superseded snapshot");
            return;
        }

        let ok = match fetched.result {
            Ok(snapshot) => {
                let payload = SnapshotPayload::from(snapshot.clone());
                let outcome = self.apply(SyncInput::Snapshot(snapshot));
                if matches!(outcome, Outcome::Applied | Outcome::Ignored(_)) {
                    self.persist_snapshot(payload);
                }
                // Discarded means the view is already newer, which is still a baseline
                true
            }
            Err(e) => {
                warn!(generation, error = %e, "Snapshot failed");
                false
            }
        };

        self.awaiting_baseline = false;
        self.baseline_ok = ok;
        self.has_baseline |= ok;
        if ok {
            self.failed_baselines = 0;
        } else {
            self.schedule_retry();
        }

        let buffered = std::mem::take(&mut self.buffered);
        if !buffered.is_empty() {
            debug!(count = buffered.len(), "Replaying events buffered during snapshot");
        }
        for event in buffered {
            // A replayed event can itself trigger another resync
            if self.awaiting_baseline {
                self.buffered.push(event);
            } else {
                self.apply(SyncInput::Event(event));
            }
        }
        self.refresh_freshness();
    }

    fn apply(&mut self, input: SyncInput) -> Outcome {
        let outcome = self.machine.apply(input, Instant::now());
        self.publish_countdown();
        match &outcome {
            Outcome::Applied => self.publish_view(),
            Outcome::ResyncRequested(cause) => {
                info!(?cause, "Resynchronizing from snapshot");
                self.request_snapshot("resync", false);
            }
            Outcome::Ignored(_) | Outcome::Discarded(_) => {}
        }
        outcome
    }

    /// `supersede` starts a new fetch even if one is pending; otherwise the
    /// pending one is reused.
    fn request_snapshot(&mut self, reason: &'static str, supersede: bool) {
        if self.active.is_none() {
            return;
        }
        if self.awaiting_baseline && !supersede {
            debug!(reason, generation = self.generation, "Snapshot already pending");
            return;
        }

        self.generation += 1;
        self.awaiting_baseline = true;
        let generation = self.generation;
        info!(reason, generation, "Requesting snapshot");

        let snapshots = self.snapshots.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let fetched = snapshots.fetch_with_retry().await;
            let _ = inbox.send(Inbox::Snapshot {
                generation,
                fetched,
            });
        });
        self.refresh_freshness();
    }

    /// Asks for another snapshot after a backoff delay once a baseline fetch
    /// gave up. The request is dropped if the credential changes meanwhile.
    fn schedule_retry(&mut self) {
        let Some(credential) = self.active_id() else {
            return;
        };
        self.failed_baselines = self.failed_baselines.saturating_add(1);
        let delay = self.backoff.delay(self.failed_baselines);
        info!(
            failed = self.failed_baselines,
            delay_ms = delay.as_millis() as u64,
            "Snapshot gave up, retrying later"
        );

        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(Inbox::Resync { credential });
        });
    }

    /// Live only while connected on top of a successful, current baseline.
    fn refresh_freshness(&mut self) {
        let live = self.connection == ConnectionState::Connected
            && !self.awaiting_baseline
            && self.baseline_ok;
        let freshness = if live { Freshness::Live } else { Freshness::Stale };
        if self.machine.set_freshness(freshness) {
            self.publish_view();
        }
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.connection == state {
            return;
        }
        self.connection = state;
        self.connection_tx.send_replace(state);
        self.subscribers
            .publish(SessionUpdate::ConnectionChanged(state));
    }

    fn publish_countdown(&self) {
        let next = self.machine.countdown();
        self.countdown.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn publish_view(&self) {
        let view = self.machine.view().clone();
        self.view.send_replace(view.clone());
        self.subscribers.publish(SessionUpdate::View(view));
    }

    fn persist_snapshot(&self, payload: SnapshotPayload) {
        if let Some(active) = &self.active {
            self.persist(CacheWrite::Snapshot {
                fingerprint: active.fingerprint(),
                payload,
            });
        }
    }

    fn persist(&self, write: CacheWrite) {
        if let Some(writes) = &self.cache_writes {
            let _ = writes.send(write);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use codebid_types::{
        BidReceivedPayload, BiddingEndedPayload, LeaderboardEntry, RoundSnapshotPayload,
        RoundStatus, ServerEvent, TimerUpdatePayload,
    };
    use serde_json::json;

    use crate::test_support::{FakeCoordinator, ScriptedConnector, mint_token};

    fn config() -> SyncConfig {
        let mut config = SyncConfig::new("http://coordinator.test").unwrap();
        config.backoff_base = Duration::from_millis(5);
        config.backoff_max = Duration::from_millis(20);
        config.snapshot_attempts = 2;
        config.reconnect_attempts = 2;
        config
    }

    fn session(fake: &Arc<FakeCoordinator>, connector: &Arc<ScriptedConnector>) -> SyncSession {
        SyncSession::with_transport(config(), fake.clone(), connector.clone(), None)
    }

    fn bidding_state(round_number: u64, time_left: i64) -> SnapshotPayload {
        SnapshotPayload {
            round: Some(RoundSnapshotPayload {
                round_number,
                title: "Trapping Rain Water".to_string(),
                category: "Hard".to_string(),
                status: RoundStatus::Bidding,
                time_left: Some(time_left),
                duration_seconds: Some(30),
                bids: Vec::new(),
                winner_so_far: None,
            }),
            ..Default::default()
        }
    }

    fn standing(coins: u64) -> Vec<LeaderboardEntry> {
        vec![LeaderboardEntry {
            rank: 1,
            team_id: "a".to_string(),
            team_name: "A".to_string(),
            coins,
            correct_answers: 0,
            wrong_answers: 0,
        }]
    }

    fn frame(event: ServerEvent) -> String {
        serde_json::to_string(&event.into_frame(None).unwrap()).unwrap()
    }

    async fn view_until(session: &SyncSession, check: impl Fn(&RoundView) -> bool) -> RoundView {
        let mut updates = session.view_updates();
        let view = tokio::time::timeout(Duration::from_secs(2), updates.wait_for(|view| check(view)))
            .await
            .expect("view never reached the expected state")
            .unwrap()
            .clone();
        view
    }

    #[tokio::test]
    async fn test_login_goes_live_after_snapshot() {
        let fake = Arc::new(FakeCoordinator::default());
        fake.push_state(Ok(bidding_state(3, 20)));
        fake.push_state(Ok(bidding_state(3, 20)));
        let connector = Arc::new(ScriptedConnector::default());
        let _link = connector.accept();
        let session = session(&fake, &connector);

        session.login("spectator").await.unwrap();

        let view = view_until(&session, |view| view.is_live()).await;
        assert_eq!(view.round_number, 3);
        assert_eq!(view.status, RoundStatus::Bidding);
        assert_eq!(session.connection_state(), ConnectionState::Connected);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_events_flow_into_view() {
        let fake = Arc::new(FakeCoordinator::default());
        fake.push_state(Ok(bidding_state(3, 20)));
        fake.push_state(Ok(bidding_state(3, 20)));
        let connector = Arc::new(ScriptedConnector::default());
        let link = connector.accept();
        let session = session(&fake, &connector);

        session.login("spectator").await.unwrap();
        view_until(&session, |view| view.is_live()).await;

        link.send(&frame(ServerEvent::TimerUpdate(TimerUpdatePayload { time_left: 19 })));
        let view = view_until(&session, |view| view.time_left_seconds == 19).await;
        assert!(view.is_live());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_marks_view_stale() {
        let fake = Arc::new(FakeCoordinator::default());
        let connector = Arc::new(ScriptedConnector::default());
        let link = connector.accept();
        let session = session(&fake, &connector);

        session.login("spectator").await.unwrap();
        view_until(&session, |view| view.is_live()).await;

        drop(link);
        let view = view_until(&session, |view| !view.is_live()).await;
        assert_eq!(view.freshness, Freshness::Stale);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_logout_resets_view_and_notifies() {
        let fake = Arc::new(FakeCoordinator::default());
        fake.push_state(Ok(bidding_state(5, 10)));
        fake.push_state(Ok(bidding_state(5, 10)));
        let connector = Arc::new(ScriptedConnector::default());
        let _link = connector.accept();
        let session = session(&fake, &connector);
        let mut updates = session.subscribe();

        session.login("spectator").await.unwrap();
        view_until(&session, |view| view.round_number == 5).await;
        assert!(session.logout());

        let view = view_until(&session, |view| view.round_number == 0).await;
        assert_eq!(view, RoundView::default());

        let reason = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(SessionUpdate::LoggedOut(reason)) = updates.recv().await {
                    return reason;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(reason, LogoutReason::UserRequested);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_own_bid_visible_when_submit_returns() {
        let fake = Arc::new(FakeCoordinator::default());
        fake.push_state(Ok(bidding_state(2, 25)));
        fake.push_state(Ok(bidding_state(2, 25)));
        let connector = Arc::new(ScriptedConnector::default());
        let _link = connector.accept();
        let session = session(&fake, &connector);

        let token = mint_token(json!({"role": "team", "teamId": "t1", "teamName": "Alpha"}));
        session.login(&token).await.unwrap();
        view_until(&session, |view| view.is_live()).await;

        let bid = session.submit_bid(300).await.unwrap();
        assert_eq!(bid.amount, 300);
        assert!(session.current_view().has_bid("t1"));

        assert_eq!(session.submit_bid(300).await, Err(BidError::AlreadyBid));
        assert_eq!(fake.bid_calls(), 1);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_superseded_snapshot_is_dropped() {
        let fake = Arc::new(FakeCoordinator::default());
        // The login fetch is slow; the fetch started on connect lands first
        let mut slow = bidding_state(3, 25);
        slow.leaderboard = standing(2000);
        let mut fresh = bidding_state(3, 20);
        fresh.leaderboard = standing(2300);
        fake.push_state(Ok(slow));
        fake.push_state(Ok(fresh));
        fake.push_state_delay(Duration::from_millis(400));
        let connector = Arc::new(ScriptedConnector::default());
        let link = connector.accept();
        let session = session(&fake, &connector);

        session.login("spectator").await.unwrap();
        view_until(&session, |view| view.is_live() && view.leaderboard == standing(2300)).await;

        link.send(&frame(ServerEvent::BidReceived(BidReceivedPayload {
            team_id: "a".to_string(),
            team_name: "A".to_string(),
            amount: 80,
            round_number: None,
        })));
        link.send(&frame(ServerEvent::BiddingEnded(BiddingEndedPayload::default())));
        view_until(&session, |view| view.status == RoundStatus::Reviewing).await;

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(fake.state_calls(), 2);
        let view = session.current_view();
        assert_eq!(view.status, RoundStatus::Reviewing);
        assert!(view.has_bid("a"));
        assert_eq!(view.leaderboard, standing(2300));
        assert!(view.is_live());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_baseline_is_retried() {
        let fake = Arc::new(FakeCoordinator::default());
        // Both the login and the connect fetch use up their two attempts
        for _ in 0..4 {
            fake.push_state(Err(SyncError::Unreachable("refused".to_string())));
        }
        fake.push_state(Ok(bidding_state(4, 30)));
        let connector = Arc::new(ScriptedConnector::default());
        let _link = connector.accept();
        let session = session(&fake, &connector);

        session.login("spectator").await.unwrap();

        let view = view_until(&session, |view| view.is_live()).await;
        assert_eq!(view.round_number, 4);
        assert!(fake.state_calls() >= 5);
        assert_eq!(session.connection_state(), ConnectionState::Connected);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_time_left_counts_down_between_ticks() {
        let fake = Arc::new(FakeCoordinator::default());
        fake.push_state(Ok(bidding_state(3, 20)));
        fake.push_state(Ok(bidding_state(3, 20)));
        let connector = Arc::new(ScriptedConnector::default());
        let link = connector.accept();
        let session = session(&fake, &connector);

        session.login("spectator").await.unwrap();
        view_until(&session, |view| view.is_live()).await;
        assert!(session.time_left() <= 20);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let local = session.time_left();
        assert!((18..=19).contains(&local), "countdown at {}", local);
        assert_eq!(session.current_view().time_left_seconds, 20);

        // A server tick caps the local countdown
        link.send(&frame(ServerEvent::TimerUpdate(TimerUpdatePayload { time_left: 12 })));
        view_until(&session, |view| view.time_left_seconds == 12).await;
        assert!(session.time_left() <= 12);

        link.send(&frame(ServerEvent::BiddingEnded(BiddingEndedPayload::default())));
        view_until(&session, |view| view.status == RoundStatus::Reviewing).await;
        assert_eq!(session.time_left(), 0);
        session.shutdown().await;
    }
}
