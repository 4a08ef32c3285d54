pub mod bid_rules;
pub mod leaderboard;
pub mod reconciler;
pub mod round_state;
pub mod snapshot;
pub mod sync_input;

// Re-export main components
pub use bid_rules::*;
pub use reconciler::*;
pub use round_state::*;
pub use snapshot::*;
pub use sync_input::*;
