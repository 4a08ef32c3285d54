use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use codebid_types::{
    AcceptedBid, HistoryResponse, LeaderboardEntry, LeaderboardResponse, MarkResultRequest,
    PlaceBidRequest, PlaceBidResponse, RejectionBody, RoundRecord, SnapshotPayload,
    StartRoundRequest, Verdict,
};

use crate::config::SyncConfig;
use crate::credential::{Credential, CredentialId, CredentialStore, LogoutReason};
use crate::errors::SyncError;

/// The request/response surface of the coordinator. Every call takes a
/// read-only copy of the credential it runs under.
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn fetch_state(&self, credential: &Credential) -> Result<SnapshotPayload, SyncError>;

    async fn place_bid(&self, credential: &Credential, amount: u64)
        -> Result<AcceptedBid, SyncError>;

    async fn start_round(
        &self,
        credential: &Credential,
        request: &StartRoundRequest,
    ) -> Result<(), SyncError>;

    async fn end_bidding(&self, credential: &Credential) -> Result<(), SyncError>;

    async fn mark_result(&self, credential: &Credential, verdict: Verdict)
        -> Result<(), SyncError>;

    async fn force_reset(&self, credential: &Credential) -> Result<(), SyncError>;

    async fn reset_game(&self, credential: &Credential) -> Result<(), SyncError>;

    async fn round_history(&self, credential: &Credential) -> Result<Vec<RoundRecord>, SyncError>;

    async fn leaderboard(&self, credential: &Credential)
        -> Result<Vec<LeaderboardEntry>, SyncError>;
}

pub struct HttpCoordinator {
    client: Client,
    config: SyncConfig,
}

impl HttpCoordinator {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Unreachable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn get(&self, path: &str, credential: &Credential) -> RequestBuilder {
        self.client
            .get(self.config.api_url(path))
            .bearer_auth(credential.token())
    }

    fn post(&self, path: &str, credential: &Credential) -> RequestBuilder {
        self.client
            .post(self.config.api_url(path))
            .bearer_auth(credential.token())
    }

    async fn send(request: RequestBuilder) -> Result<Response, SyncError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if status.is_server_error() {
            return Err(SyncError::Unreachable(format!("coordinator returned {}", status)));
        }

        // 4xx other than 401: the coordinator declined the action
        let body = response.text().await.unwrap_or_default();
        let rejection = serde_json::from_str::<RejectionBody>(&body).unwrap_or_else(|_| {
            RejectionBody {
                message: body.trim().to_string(),
                ..Default::default()
            }
        });
        Err(SyncError::Rejected {
            code: rejection.code,
            message: rejection.message,
        })
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SyncError> {
        let response = Self::send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| SyncError::MalformedResponse(e.to_string()))
    }

    async fn empty(request: RequestBuilder) -> Result<(), SyncError> {
        Self::send(request).await.map(|_| ())
    }
}

#[async_trait]
impl Coordinator for HttpCoordinator {
    async fn fetch_state(&self, credential: &Credential) -> Result<SnapshotPayload, SyncError> {
        Self::json(self.get("/game/state", credential)).await
    }

    async fn place_bid(
        &self,
        credential: &Credential,
        amount: u64,
    ) -> Result<AcceptedBid, SyncError> {
        let request = self
            .post("/game/bid", credential)
            .json(&PlaceBidRequest { amount });
        let response: PlaceBidResponse = Self::json(request).await?;
        Ok(response.bid)
    }

    async fn start_round(
        &self,
        credential: &Credential,
        request: &StartRoundRequest,
    ) -> Result<(), SyncError> {
        Self::empty(self.post("/game/start", credential).json(request)).await
    }

    async fn end_bidding(&self, credential: &Credential) -> Result<(), SyncError> {
        Self::empty(self.post("/game/end-bidding", credential)).await
    }

    async fn mark_result(
        &self,
        credential: &Credential,
        verdict: Verdict,
    ) -> Result<(), SyncError> {
        let request = self
            .post("/game/result", credential)
            .json(&MarkResultRequest { result: verdict });
        Self::empty(request).await
    }

    async fn force_reset(&self, credential: &Credential) -> Result<(), SyncError> {
        Self::empty(self.post("/game/force-reset", credential)).await
    }

    async fn reset_game(&self, credential: &Credential) -> Result<(), SyncError> {
        Self::empty(self.post("/teams/reset", credential)).await
    }

    async fn round_history(&self, credential: &Credential) -> Result<Vec<RoundRecord>, SyncError> {
        let response: HistoryResponse = Self::json(self.get("/game/history", credential)).await?;
        Ok(response.rounds)
    }

    async fn leaderboard(
        &self,
        credential: &Credential,
    ) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let response: LeaderboardResponse =
            Self::json(self.get("/teams/leaderboard", credential)).await?;
        Ok(response.leaderboard)
    }
}

/// Runs one coordinator call under `id`: bounded by `timeout`, cancelled the
/// moment `id` stops being the current credential. A 401 invalidates `id`.
pub(crate) async fn guarded_call<T, F>(
    credentials: &CredentialStore,
    id: CredentialId,
    timeout: Duration,
    call: F,
) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    let result = tokio::select! {
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(result) => result,
            Err(_) => Err(SyncError::Unreachable(format!(
                "request timed out after {}ms",
                timeout.as_millis()
            ))),
        },
        _ = credentials.invalidated(id) => Err(SyncError::Cancelled),
    };

    if let Err(SyncError::Unauthorized) = &result {
        credentials.invalidate(id, LogoutReason::Unauthorized);
    }
    result
}
