use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::TeamId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TeamRecord {
    #[serde(alias = "id", alias = "_id")]
    pub team_id: TeamId,
    pub team_name: String,
    pub coins: u64,
    #[serde(default)]
    pub correct_answers: u32,
    #[serde(default)]
    pub wrong_answers: u32,
}

/// A ranked leaderboard row. `rank` is 0 on the wire when the coordinator
/// leaves ranking to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LeaderboardEntry {
    #[serde(default)]
    pub rank: u32,
    #[serde(alias = "id", alias = "_id")]
    pub team_id: TeamId,
    #[serde(default)]
    pub team_name: String,
    pub coins: u64,
    #[serde(default)]
    pub correct_answers: u32,
    #[serde(default)]
    pub wrong_answers: u32,
}
