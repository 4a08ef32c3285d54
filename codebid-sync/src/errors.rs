use codebid_core::{BidPrecondition, SnapshotDefect};
use codebid_types::RejectionCode;
use thiserror::Error;

/// Coarse classification every failure degrades to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Unreachable,
    InvalidInput,
    Rejected,
    Desynchronized,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("credential missing or rejected")]
    Unauthorized,
    #[error("coordinator unreachable: {0}")]
    Unreachable(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("rejected ({code:?}): {message}")]
    Rejected {
        code: RejectionCode,
        message: String,
    },
    #[error("desynchronized: {0}")]
    Desynchronized(String),
    #[error("cancelled by a credential change")]
    Cancelled,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Unauthorized | SyncError::Cancelled => ErrorKind::Unauthorized,
            // Malformed payloads are retried like network failures
            SyncError::Unreachable(_) | SyncError::MalformedResponse(_) => ErrorKind::Unreachable,
            SyncError::InvalidInput(_) => ErrorKind::InvalidInput,
            SyncError::Rejected { .. } => ErrorKind::Rejected,
            SyncError::Desynchronized(_) => ErrorKind::Desynchronized,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unreachable
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::MalformedResponse(err.to_string())
        } else {
            SyncError::Unreachable(err.to_string())
        }
    }
}

impl From<SnapshotDefect> for SyncError {
    fn from(defect: SnapshotDefect) -> Self {
        SyncError::MalformedResponse(defect.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BidError {
    #[error("bid amount must be a positive integer")]
    InvalidAmount,
    #[error("bidding is not open")]
    RoundNotOpen,
    #[error("your team already bid this round")]
    AlreadyBid,
    #[error("only team credentials can bid")]
    NotATeam,
    #[error("bid rejected ({reason:?}): {message}")]
    Rejected {
        reason: RejectionCode,
        message: String,
    },
    #[error("credential missing or rejected")]
    Unauthorized,
    #[error("coordinator unreachable: {0}")]
    Unreachable(String),
    #[error("bid cancelled by a credential change")]
    Cancelled,
}

impl BidError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BidError::InvalidAmount
            | BidError::RoundNotOpen
            | BidError::AlreadyBid
            | BidError::NotATeam => ErrorKind::InvalidInput,
            BidError::Rejected { .. } => ErrorKind::Rejected,
            BidError::Unauthorized | BidError::Cancelled => ErrorKind::Unauthorized,
            BidError::Unreachable(_) => ErrorKind::Unreachable,
        }
    }
}

impl From<BidPrecondition> for BidError {
    fn from(precondition: BidPrecondition) -> Self {
        match precondition {
            BidPrecondition::InvalidAmount => BidError::InvalidAmount,
            BidPrecondition::RoundNotOpen => BidError::RoundNotOpen,
            BidPrecondition::AlreadyBid => BidError::AlreadyBid,
        }
    }
}

impl From<SyncError> for BidError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Unauthorized => BidError::Unauthorized,
            SyncError::Cancelled => BidError::Cancelled,
            SyncError::Rejected { code, message } => BidError::Rejected {
                reason: code,
                message,
            },
            SyncError::InvalidInput(_) => BidError::InvalidAmount,
            other => BidError::Unreachable(other.to_string()),
        }
    }
}
