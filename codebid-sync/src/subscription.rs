use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use codebid_types::RoundView;

use crate::credential::LogoutReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    /// Not connected and not trying: logged out or out of reconnect attempts.
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    View(RoundView),
    LoggedOut(LogoutReason),
    ConnectionChanged(ConnectionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Registry = DashMap<SubscriptionId, mpsc::UnboundedSender<SessionUpdate>>;

/// Fan-out of session updates. Publishing never waits on a slow consumer.
#[derive(Clone, Default)]
pub struct Subscribers {
    registry: Arc<Registry>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId::new();
        let (sender, updates) = mpsc::unbounded_channel();
        self.registry.insert(id, sender);
        tracing::debug!(subscription = %id, "Subscriber added");
        Subscription {
            id,
            updates,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn publish(&self, update: SessionUpdate) {
        self.registry
            .retain(|_, sender| sender.send(update.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

/// Disposer for one subscription: dropping it unregisters, and nothing is
/// delivered afterwards.
pub struct Subscription {
    id: SubscriptionId,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next update, or `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SessionUpdate> {
        self.updates.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
            tracing::debug!(subscription = %self.id, "Subscriber removed");
        }
    }
}
