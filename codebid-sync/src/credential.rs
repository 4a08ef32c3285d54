use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use codebid_types::TeamId;

/// Token accepted as an anonymous read-only credential.
pub const SPECTATOR_TOKEN: &str = "spectator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Team,
    Admin,
    Spectator,
}

impl Role {
    fn parse(raw: &str) -> Option<Role> {
        match raw.to_ascii_lowercase().as_str() {
            "team" => Some(Role::Team),
            "admin" => Some(Role::Admin),
            "spectator" => Some(Role::Spectator),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Team => "team",
            Role::Admin => "admin",
            Role::Spectator => "spectator",
        };
        write!(f, "{}", name)
    }
}

/// Identity of one `set`. Responses tagged with an older id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialId(u64);

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    ForcedByServer(String),
    Unauthorized,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("empty token")]
    EmptyToken,
    #[error("token is not a readable JWT")]
    InvalidToken,
    #[error("token carries no known role")]
    MissingRole,
    #[error("team token carries no team id")]
    MissingTeamId,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    role: Option<String>,
    #[serde(default, rename = "teamId")]
    team_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "teamName")]
    team_name: Option<String>,
}

/// An opaque bearer token plus what the engine reads from it.
///
/// The role claim is read without verifying the signature; the coordinator
/// is the only validator.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    role: Role,
    team_id: Option<TeamId>,
    team_name: Option<String>,
}

impl Credential {
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        if token == SPECTATOR_TOKEN {
            return Ok(Self {
                token: token.to_string(),
                role: Role::Spectator,
                team_id: None,
                team_name: None,
            });
        }

        let header = decode_header(token).map_err(|e| {
            tracing::debug!("Failed to decode token header: {:?}", e);
            AuthError::InvalidToken
        })?;

        let mut validation = Validation::new(header.alg);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| {
                tracing::debug!("Failed to read token claims: {:?}", e);
                AuthError::InvalidToken
            })?
            .claims;

        let role = claims
            .role
            .as_deref()
            .and_then(Role::parse)
            .ok_or(AuthError::MissingRole)?;
        let team_id = claims.team_id.or(claims.id);
        if role == Role::Team && team_id.is_none() {
            return Err(AuthError::MissingTeamId);
        }

        Ok(Self {
            token: token.to_string(),
            role,
            team_id,
            team_name: claims.team_name,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    pub fn team_name(&self) -> Option<&str> {
        self.team_name.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Short SHA-256 prefix used wherever a credential has to be named in logs
    /// or cache keys.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.token.as_bytes());
        digest[..6].iter().map(|byte| format!("{:02x}", byte)).collect()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fingerprint", &self.fingerprint())
            .field("role", &self.role)
            .field("team_id", &self.team_id)
            .finish()
    }
}

/// A credential as handed out by the store: a read-only copy tagged with the
/// id of the `set` that installed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCredential {
    pub id: CredentialId,
    pub credential: Credential,
}

impl std::ops::Deref for ActiveCredential {
    type Target = Credential;

    fn deref(&self) -> &Credential {
        &self.credential
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    pub current: Option<ActiveCredential>,
    pub last_logout: Option<LogoutReason>,
}

impl CredentialState {
    pub fn current_id(&self) -> Option<CredentialId> {
        self.current.as_ref().map(|active| active.id)
    }
}

struct StoreInner {
    state: watch::Sender<CredentialState>,
    next_id: AtomicU64,
}

/// Sole owner of the current credential.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CredentialState::default());
        Self {
            inner: Arc::new(StoreInner {
                state,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn set(&self, credential: Credential) -> CredentialId {
        let id = CredentialId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::info!(
            credential = %credential.fingerprint(),
            role = %credential.role(),
            id = %id,
            "Credential set"
        );
        self.inner.state.send_modify(|state| {
            state.current = Some(ActiveCredential { id, credential });
            state.last_logout = None;
        });
        id
    }

    pub fn get(&self) -> Option<ActiveCredential> {
        self.inner.state.borrow().current.clone()
    }

    pub fn current_id(&self) -> Option<CredentialId> {
        self.inner.state.borrow().current_id()
    }

    pub fn is_current(&self, id: CredentialId) -> bool {
        self.current_id() == Some(id)
    }

    pub fn last_logout(&self) -> Option<LogoutReason> {
        self.inner.state.borrow().last_logout.clone()
    }

    /// Clears whatever credential is current. Returns whether one was held.
    pub fn clear(&self, reason: LogoutReason) -> bool {
        let mut cleared = false;
        self.inner.state.send_if_modified(|state| match state.current.take() {
            Some(active) => {
                tracing::info!(
                    credential = %active.fingerprint(),
                    ?reason,
                    "Credential cleared"
                );
                state.last_logout = Some(reason.clone());
                cleared = true;
                true
            }
            None => false,
        });
        cleared
    }

    /// Clears only if `id` is still current, so a late failure on an old
    /// credential cannot log out its successor.
    pub fn invalidate(&self, id: CredentialId, reason: LogoutReason) -> bool {
        let mut cleared = false;
        self.inner.state.send_if_modified(|state| {
            if state.current_id() != Some(id) {
                return false;
            }
            if let Some(active) = state.current.take() {
                tracing::info!(
                    credential = %active.fingerprint(),
                    ?reason,
                    "Credential invalidated"
                );
            }
            state.last_logout = Some(reason.clone());
            cleared = true;
            true
        });
        cleared
    }

    pub fn subscribe(&self) -> watch::Receiver<CredentialState> {
        self.inner.state.subscribe()
    }

    /// Resolves once `id` is no longer the current credential.
    pub async fn invalidated(&self, id: CredentialId) {
        let mut state = self.subscribe();
        let _ = state.wait_for(|state| state.current_id() != Some(id)).await;
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
