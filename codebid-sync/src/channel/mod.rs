pub mod connection;
pub mod frame;

pub use connection::{ConnectError, Connector, FrameStream, WsConnector};
pub use frame::{FrameError, decode_frame};

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use codebid_core::SequencedEvent;
use codebid_types::ServerEvent;

use crate::backoff::Backoff;
use crate::credential::{ActiveCredential, CredentialId, CredentialState, CredentialStore, LogoutReason};

/// What the channel reports to the session, tagged with the credential the
/// connection was authenticated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Connected {
        credential: CredentialId,
    },
    Event {
        credential: CredentialId,
        event: SequencedEvent,
    },
    Disconnected {
        credential: CredentialId,
        reason: String,
    },
    ForcedLogout {
        credential: CredentialId,
        reason: String,
    },
    /// Reconnect attempts exhausted; the channel stays down until the next login.
    GaveUp {
        credential: CredentialId,
        attempts: u32,
    },
}

impl ChannelSignal {
    pub fn credential(&self) -> CredentialId {
        match self {
            ChannelSignal::Connected { credential }
            | ChannelSignal::Event { credential, .. }
            | ChannelSignal::Disconnected { credential, .. }
            | ChannelSignal::ForcedLogout { credential, .. }
            | ChannelSignal::GaveUp { credential, .. } => *credential,
        }
    }
}

enum StreamEnd {
    Closed(String),
    ForcedLogout(String),
    CredentialChanged,
    LoggedOut,
    Shutdown,
}

/// The push channel's receive loop. Runs as its own task so event delivery
/// never waits on snapshot fetches or bid submissions.
pub struct EventChannel {
    connector: Arc<dyn Connector>,
    credentials: CredentialStore,
    signals: mpsc::UnboundedSender<ChannelSignal>,
    backoff: Backoff,
    max_attempts: u32,
    shutdown: watch::Receiver<bool>,
}

impl EventChannel {
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: CredentialStore,
        signals: mpsc::UnboundedSender<ChannelSignal>,
        backoff: Backoff,
        max_attempts: u32,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            connector,
            credentials,
            signals,
            backoff,
            max_attempts,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    fn emit(&self, signal: ChannelSignal) -> bool {
        self.signals.send(signal).is_ok()
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run(mut self) {
        let mut credential_rx = self.credentials.subscribe();
        let mut failures: u32 = 0;

        loop {
            if self.is_shut_down() {
                return;
            }
            // Whatever credential is current now, not the one of the first connect
            let Some(active) = self.credentials.get() else {
                debug!("No credential, push channel stopping");
                return;
            };
            credential_rx.borrow_and_update();

            let connected = tokio::select! {
                connected = self.connector.connect(&active) => Some(connected),
                _ = self.shutdown.changed() => None,
            };
            let Some(connected) = connected else {
                return;
            };

            match connected {
                Ok(stream) => {
                    info!(credential = %active.fingerprint(), "Push channel connected");
                    failures = 0;
                    if !self.emit(ChannelSignal::Connected { credential: active.id }) {
                        return;
                    }
                    match self.pump(stream, &active, &mut credential_rx).await {
                        StreamEnd::Closed(reason) => {
                            warn!(credential = %active.fingerprint(), %reason, "Push channel disconnected");
                            if !self.emit(ChannelSignal::Disconnected {
                                credential: active.id,
                                reason,
                            }) {
                                return;
                            }
                        }
                        StreamEnd::ForcedLogout(reason) => {
                            info!(credential = %active.fingerprint(), %reason, "Forced logout from server");
                            self.credentials
                                .invalidate(active.id, LogoutReason::ForcedByServer(reason.clone()));
                            self.emit(ChannelSignal::ForcedLogout {
                                credential: active.id,
                                reason,
                            });
                            return;
                        }
                        StreamEnd::CredentialChanged => {
                            info!("Credential rotated, reconnecting with the new one");
                            continue;
                        }
                        StreamEnd::LoggedOut | StreamEnd::Shutdown => return,
                    }
                }
                Err(ConnectError::Unauthorized) => {
                    warn!(credential = %active.fingerprint(), "Push channel rejected credential");
                    self.credentials
                        .invalidate(active.id, LogoutReason::Unauthorized);
                    return;
                }
                Err(ConnectError::Unreachable(reason)) => {
                    debug!(%reason, attempt = failures + 1, "Push channel connect failed");
                }
            }

            failures += 1;
            if failures > self.max_attempts {
                warn!(attempts = failures - 1, "Giving up on push channel");
                self.emit(ChannelSignal::GaveUp {
                    credential: active.id,
                    attempts: failures - 1,
                });
                return;
            }

            let delay = self.backoff.delay(failures);
            debug!(attempt = failures, delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => return,
                changed = credential_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    // A freshly set credential gets a fresh budget and no wait
                    if self.credentials.current_id() != Some(active.id) {
                        failures = 0;
                    }
                }
            }
        }
    }

    async fn pump(
        &mut self,
        mut stream: FrameStream,
        active: &ActiveCredential,
        credential_rx: &mut watch::Receiver<CredentialState>,
    ) -> StreamEnd {
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(text)) => match decode_frame(&text) {
                        Ok(SequencedEvent { event: ServerEvent::ForceLogout(data), .. }) => {
                            return StreamEnd::ForcedLogout(data.reason);
                        }
                        Ok(event) => {
                            if !self.emit(ChannelSignal::Event { credential: active.id, event }) {
                                return StreamEnd::Shutdown;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping push frame"),
                    },
                    Some(Err(e)) => return StreamEnd::Closed(e.to_string()),
                    None => return StreamEnd::Closed("closed by server".to_string()),
                },
                changed = credential_rx.changed() => {
                    if changed.is_err() {
                        return StreamEnd::Shutdown;
                    }
                    match self.credentials.current_id() {
                        Some(id) if id == active.id => {}
                        Some(_) => return StreamEnd::CredentialChanged,
                        None => return StreamEnd::LoggedOut,
                    }
                }
                _ = self.shutdown.changed() => return StreamEnd::Shutdown,
            }
        }
    }
}
