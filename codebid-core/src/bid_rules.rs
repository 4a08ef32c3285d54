use codebid_types::{RoundStatus, RoundView};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BidPrecondition {
    #[error("bid amount must be a positive integer")]
    InvalidAmount,
    #[error("bidding is not open")]
    RoundNotOpen,
    #[error("your team already bid this round")]
    AlreadyBid,
}

/// Local checks run before any bid leaves the client, in the order
/// amount, round status, existing bid. Reads the live view only; there is no
/// separately tracked "already bid" flag.
pub fn check_bid(view: &RoundView, team_id: &str, amount: i64) -> Result<u64, BidPrecondition> {
    if amount <= 0 {
        return Err(BidPrecondition::InvalidAmount);
    }
    if view.status != RoundStatus::Bidding {
        return Err(BidPrecondition::RoundNotOpen);
    }
    if view.has_bid(team_id) {
        return Err(BidPrecondition::AlreadyBid);
    }
    Ok(amount as u64)
}
