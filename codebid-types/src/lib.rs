pub mod errors;
pub mod messages;
pub mod round;
pub mod team;
pub mod view;

pub type RoundNumber = u64;
pub type TeamId = String;

// Re-export all types
pub use errors::*;
pub use messages::*;
pub use round::*;
pub use team::*;
pub use view::*;
