use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use codebid_types::{LeaderboardEntry, RoundRecord, StartRoundRequest, Verdict};

use crate::coordinator::{Coordinator, guarded_call};
use crate::credential::{ActiveCredential, CredentialStore};
use crate::errors::SyncError;

/// Round lifecycle controls for admin credentials.
#[derive(Clone)]
pub struct Operator {
    coordinator: Arc<dyn Coordinator>,
    credentials: CredentialStore,
    timeout: Duration,
}

impl Operator {
    pub(crate) fn new(
        coordinator: Arc<dyn Coordinator>,
        credentials: CredentialStore,
        timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            credentials,
            timeout,
        }
    }

    fn current(&self) -> Result<ActiveCredential, SyncError> {
        self.credentials.get().ok_or(SyncError::Unauthorized)
    }

    fn admin(&self) -> Result<ActiveCredential, SyncError> {
        let active = self.current()?;
        if !active.is_admin() {
            return Err(SyncError::InvalidInput(format!(
                "operator controls need an admin credential, not {}",
                active.role()
            )));
        }
        Ok(active)
    }

    pub async fn start_round(
        &self,
        title: &str,
        category: &str,
        duration_seconds: Option<u32>,
    ) -> Result<(), SyncError> {
        let active = self.admin()?;
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::InvalidInput("round title is empty".to_string()));
        }
        if duration_seconds == Some(0) {
            return Err(SyncError::InvalidInput("round duration must be positive".to_string()));
        }

        let request = StartRoundRequest {
            title: title.to_string(),
            category: category.trim().to_string(),
            duration_seconds,
        };
        guarded_call(
            &self.credentials,
            active.id,
            self.timeout,
            self.coordinator.start_round(&active, &request),
        )
        .await?;
        info!(title = %request.title, category = %request.category, "Round start requested");
        Ok(())
    }

    pub async fn end_bidding(&self) -> Result<(), SyncError> {
        let active = self.admin()?;
        guarded_call(
            &self.credentials,
            active.id,
            self.timeout,
            self.coordinator.end_bidding(&active),
        )
        .await?;
        info!("End of bidding requested");
        Ok(())
    }

    pub async fn mark_result(&self, verdict: Verdict) -> Result<(), SyncError> {
        let active = self.admin()?;
        guarded_call(
            &self.credentials,
            active.id,
            self.timeout,
            self.coordinator.mark_result(&active, verdict),
        )
        .await?;
        info!(?verdict, "Round result submitted");
        Ok(())
    }

    pub async fn force_reset(&self) -> Result<(), SyncError> {
        let active = self.admin()?;
        guarded_call(
            &self.credentials,
            active.id,
            self.timeout,
            self.coordinator.force_reset(&active),
        )
        .await?;
        info!("Round force reset requested");
        Ok(())
    }

    /// Resets every team's coins and counters. Irreversible on the coordinator.
    pub async fn reset_game(&self) -> Result<(), SyncError> {
        let active = self.admin()?;
        guarded_call(
            &self.credentials,
            active.id,
            self.timeout,
            self.coordinator.reset_game(&active),
        )
        .await?;
        info!("Game reset requested");
        Ok(())
    }

    pub async fn round_history(&self) -> Result<Vec<RoundRecord>, SyncError> {
        let active = self.admin()?;
        guarded_call(
            &self.credentials,
            active.id,
            self.timeout,
            self.coordinator.round_history(&active),
        )
        .await
    }

    /// Any role may read the leaderboard.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let active = self.current()?;
        guarded_call(
            &self.credentials,
            active.id,
            self.timeout,
            self.coordinator.leaderboard(&active),
        )
        .await
    }
}
