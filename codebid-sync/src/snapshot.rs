use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use codebid_core::{Snapshot, validate_snapshot};

use crate::backoff::Backoff;
use crate::coordinator::{Coordinator, guarded_call};
use crate::credential::{CredentialId, CredentialStore};
use crate::errors::SyncError;

/// A snapshot together with the credential it was fetched under.
#[derive(Debug, Clone)]
pub struct TaggedSnapshot {
    pub credential: Option<CredentialId>,
    pub result: Result<Snapshot, SyncError>,
}

/// Pulls `GET /game/state` on demand.
#[derive(Clone)]
pub struct SnapshotClient {
    coordinator: Arc<dyn Coordinator>,
    credentials: CredentialStore,
    backoff: Backoff,
    max_attempts: u32,
    timeout: Duration,
}

impl SnapshotClient {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        credentials: CredentialStore,
        backoff: Backoff,
        max_attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            credentials,
            backoff,
            max_attempts: max_attempts.max(1),
            timeout,
        }
    }

    /// One attempt. Cancelled as soon as the credential it started under is
    /// cleared or replaced.
    pub async fn fetch_snapshot(&self) -> TaggedSnapshot {
        let Some(active) = self.credentials.get() else {
            return TaggedSnapshot {
                credential: None,
                result: Err(SyncError::Unauthorized),
            };
        };
        let id = active.id;

        let result = guarded_call(
            &self.credentials,
            id,
            self.timeout,
            self.coordinator.fetch_state(&active),
        )
        .await
        .and_then(|payload| validate_snapshot(payload).map_err(SyncError::from));

        if let Err(SyncError::Unauthorized) = &result {
            warn!(credential = %active.fingerprint(), "Snapshot rejected credential");
        }
        let rejected = matches!(result, Err(SyncError::Unauthorized));
        if !rejected && !self.credentials.is_current(id) {
            return TaggedSnapshot {
                credential: Some(id),
                result: Err(SyncError::Cancelled),
            };
        }

        TaggedSnapshot {
            credential: Some(id),
            result,
        }
    }

    /// Retries retryable failures with jittered backoff, up to the attempt cap.
    pub async fn fetch_with_retry(&self) -> TaggedSnapshot {
        let mut attempt = 1;
        loop {
            let fetched = self.fetch_snapshot().await;
            match &fetched.result {
                Ok(snapshot) => {
                    debug!(
                        attempt,
                        round_number = ?snapshot.round_number(),
                        "Snapshot fetched"
                    );
                    return fetched;
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let Some(id) = fetched.credential else {
                        return fetched;
                    };
                    if let SyncError::MalformedResponse(reason) = e {
                        warn!(attempt, %reason, "Malformed snapshot, retrying");
                    }
                    let delay = self.backoff.delay(attempt);
                    info!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Snapshot failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.credentials.invalidated(id) => {
                            return TaggedSnapshot {
                                credential: Some(id),
                                result: Err(SyncError::Cancelled),
                            };
                        }
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Giving up on snapshot");
                    return fetched;
                }
            }
        }
    }
}
