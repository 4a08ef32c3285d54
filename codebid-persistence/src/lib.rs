pub mod connection;
pub mod entities;
pub mod repositories;

pub use connection::{connect_to_database, connect_to_memory_database};
pub use repositories::session_cache::{CachedCredential, SessionCacheRepository};
