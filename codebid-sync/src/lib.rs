pub mod backoff;
pub mod bid_guard;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod errors;
pub mod operator;
pub mod session;
pub mod snapshot;
pub mod subscription;

#[cfg(test)]
mod test_support;

pub use bid_guard::BidGuard;
pub use config::{ConfigError, SyncConfig};
pub use credential::{AuthError, Credential, CredentialId, CredentialStore, LogoutReason, Role};
pub use errors::{BidError, ErrorKind, SyncError};
pub use operator::Operator;
pub use session::SyncSession;
pub use subscription::{ConnectionState, SessionUpdate, Subscription};
