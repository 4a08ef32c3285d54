pub mod cached_credentials;
pub mod cached_snapshots;

pub mod prelude {
    pub use super::cached_credentials::Entity as CachedCredentials;
    pub use super::cached_snapshots::Entity as CachedSnapshots;
}
