//! In-process fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use codebid_types::{
    AcceptedBid, LeaderboardEntry, RoundRecord, SnapshotPayload, StartRoundRequest, Verdict,
};

use crate::channel::{ConnectError, Connector, FrameStream};
use crate::coordinator::Coordinator;
use crate::credential::Credential;
use crate::errors::SyncError;

/// Scripted coordinator. Queued responses are served in order; an empty queue
/// answers with a default success.
#[derive(Default)]
pub struct FakeCoordinator {
    states: Mutex<VecDeque<Result<SnapshotPayload, SyncError>>>,
    state_delays: Mutex<VecDeque<Duration>>,
    bids: Mutex<VecDeque<Result<AcceptedBid, SyncError>>>,
    actions: Mutex<Vec<String>>,
    bid_delay: Mutex<Duration>,
    state_calls: AtomicUsize,
    bid_calls: AtomicUsize,
}

impl FakeCoordinator {
    pub fn push_state(&self, response: Result<SnapshotPayload, SyncError>) {
        self.states.lock().unwrap().push_back(response);
    }

    /// Queues a delay for `fetch_state` calls, one per call in call order. The
    /// response is taken before the delay.
    pub fn push_state_delay(&self, delay: Duration) {
        self.state_delays.lock().unwrap().push_back(delay);
    }

    pub fn push_bid(&self, response: Result<AcceptedBid, SyncError>) {
        self.bids.lock().unwrap().push_back(response);
    }

    pub fn set_bid_delay(&self, delay: Duration) {
        *self.bid_delay.lock().unwrap() = delay;
    }

    pub fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    pub fn bid_calls(&self) -> usize {
        self.bid_calls.load(Ordering::SeqCst)
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: &str) -> Result<(), SyncError> {
        self.actions.lock().unwrap().push(action.to_string());
        Ok(())
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn fetch_state(&self, _credential: &Credential) -> Result<SnapshotPayload, SyncError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state_delays.lock().unwrap().pop_front();
        let response = self
            .states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SnapshotPayload::default()));
        if let Some(delay) = delay.filter(|delay| !delay.is_zero()) {
            tokio::time::sleep(delay).await;
        }
        response
    }

    async fn place_bid(
        &self,
        credential: &Credential,
        amount: u64,
    ) -> Result<AcceptedBid, SyncError> {
        self.bid_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.bid_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.bids.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(AcceptedBid {
                team_id: credential.team_id().unwrap_or_default().to_string(),
                team_name: credential.team_name().unwrap_or_default().to_string(),
                amount,
                round_number: None,
            })
        })
    }

    async fn start_round(
        &self,
        _credential: &Credential,
        request: &StartRoundRequest,
    ) -> Result<(), SyncError> {
        self.record(&format!("start:{}", request.title))
    }

    async fn end_bidding(&self, _credential: &Credential) -> Result<(), SyncError> {
        self.record("end-bidding")
    }

    async fn mark_result(
        &self,
        _credential: &Credential,
        verdict: Verdict,
    ) -> Result<(), SyncError> {
        self.record(&format!("result:{:?}", verdict))
    }

    async fn force_reset(&self, _credential: &Credential) -> Result<(), SyncError> {
        self.record("force-reset")
    }

    async fn reset_game(&self, _credential: &Credential) -> Result<(), SyncError> {
        self.record("reset-game")
    }

    async fn round_history(&self, _credential: &Credential) -> Result<Vec<RoundRecord>, SyncError> {
        self.record("history")?;
        Ok(Vec::new())
    }

    async fn leaderboard(
        &self,
        _credential: &Credential,
    ) -> Result<Vec<LeaderboardEntry>, SyncError> {
        self.record("leaderboard")?;
        Ok(Vec::new())
    }
}

/// Connector whose connections are driven by the test through [`ScriptedLink`]s.
#[derive(Default)]
pub struct ScriptedConnector {
    links: Mutex<VecDeque<Result<mpsc::UnboundedReceiver<String>, ConnectError>>>,
    tokens: Mutex<Vec<String>>,
}

/// The server side of one scripted connection; dropping it closes the stream.
pub struct ScriptedLink {
    pub frames: mpsc::UnboundedSender<String>,
}

impl ScriptedLink {
    pub fn send(&self, frame: &str) {
        let _ = self.frames.send(frame.to_string());
    }
}

impl ScriptedConnector {
    pub fn accept(&self) -> ScriptedLink {
        let (frames, receiver) = mpsc::unbounded_channel();
        self.links.lock().unwrap().push_back(Ok(receiver));
        ScriptedLink { frames }
    }

    pub fn refuse(&self, error: ConnectError) {
        self.links.lock().unwrap().push_back(Err(error));
    }

    /// Tokens presented at each handshake, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, credential: &Credential) -> Result<FrameStream, ConnectError> {
        self.tokens.lock().unwrap().push(credential.token().to_string());
        let link = self.links.lock().unwrap().pop_front();
        match link {
            Some(Ok(receiver)) => Ok(futures_util::stream::unfold(receiver, |mut receiver| async {
                receiver.recv().await.map(|frame| (Ok(frame), receiver))
            })
            .boxed()),
            Some(Err(error)) => Err(error),
            None => Err(ConnectError::Unreachable("no scripted connection".to_string())),
        }
    }
}

/// Signs `claims` into a bearer token. The signature is never checked client-side.
pub fn mint_token(claims: serde_json::Value) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"coordinator-secret"),
    )
    .unwrap()
}
