use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Machine-readable reason the coordinator gives when it declines an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum RejectionCode {
    DuplicateBid,
    RoundClosed,
    InsufficientState,
    Forbidden,
    #[default]
    #[serde(other)]
    Other,
}

/// Error body returned by every action endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RejectionBody {
    #[serde(default)]
    pub code: RejectionCode,
    #[serde(default)]
    pub message: String,
}
