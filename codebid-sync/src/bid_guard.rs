use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use codebid_core::{Outcome, check_bid};
use codebid_types::{Bid, RoundView};

use crate::coordinator::{Coordinator, guarded_call};
use crate::credential::{CredentialStore, Role};
use crate::errors::BidError;
use crate::session::Inbox;

/// Client-side bid submission. Local checks run against the live view before
/// anything is sent, and only one submission is in flight at a time.
#[derive(Clone)]
pub struct BidGuard {
    coordinator: Arc<dyn Coordinator>,
    credentials: CredentialStore,
    view: watch::Receiver<RoundView>,
    inbox: mpsc::UnboundedSender<Inbox>,
    timeout: Duration,
    submitting: Arc<Mutex<()>>,
}

impl BidGuard {
    pub(crate) fn new(
        coordinator: Arc<dyn Coordinator>,
        credentials: CredentialStore,
        view: watch::Receiver<RoundView>,
        inbox: mpsc::UnboundedSender<Inbox>,
        timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            credentials,
            view,
            inbox,
            timeout,
            submitting: Arc::new(Mutex::new(())),
        }
    }

    /// Places a bid for the logged-in team.
    ///
    /// On success the accepted bid is already part of the published view when
    /// this returns. A second call made while one is pending waits for it and
    /// then fails the "already bid" check without touching the network.
    pub async fn submit_bid(&self, amount: i64) -> Result<Bid, BidError> {
        let _submitting = self.submitting.lock().await;

        let active = self.credentials.get().ok_or(BidError::Unauthorized)?;
        let team_id = match (active.role(), active.team_id()) {
            (Role::Team, Some(team_id)) => team_id.to_string(),
            _ => return Err(BidError::NotATeam),
        };

        let view = self.view.borrow().clone();
        let amount = match check_bid(&view, &team_id, amount) {
            Ok(amount) => amount,
            Err(precondition) => {
                debug!(team = %team_id, %precondition, "Bid blocked locally");
                return Err(precondition.into());
            }
        };

        let accepted = guarded_call(
            &self.credentials,
            active.id,
            self.timeout,
            self.coordinator.place_bid(&active, amount),
        )
        .await
        .map_err(|e| {
            warn!(team = %team_id, amount, error = %e, "Bid failed");
            BidError::from(e)
        })?;

        if !self.credentials.is_current(active.id) {
            return Err(BidError::Cancelled);
        }

        let bid = accepted.bid();
        let (reply, applied) = oneshot::channel();
        self.inbox
            .send(Inbox::OwnBid {
                credential: active.id,
                round_number: accepted.round_number.or(Some(view.round_number)),
                bid: bid.clone(),
                reply,
            })
            .map_err(|_| BidError::Cancelled)?;

        match applied.await {
            Ok(Some(outcome)) => {
                if !matches!(outcome, Outcome::Applied) {
                    // Accepted by the coordinator; the view already moved on
                    debug!(team = %team_id, ?outcome, "Accepted bid not applied locally");
                }
                info!(team = %team_id, amount = bid.amount, round = view.round_number, "Bid accepted");
                Ok(bid)
            }
            Ok(None) | Err(_) => Err(BidError::Cancelled),
        }
    }
}
