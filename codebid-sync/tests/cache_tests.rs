
use codebid_persistence::{SessionCacheRepository, connect_to_database};
use codebid_sync::{LogoutReason, SyncSession};
use codebid_types::SnapshotPayload;
use test_helpers::*;

struct TempCache {
    path: std::path::PathBuf,
}

impl TempCache {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("codebid-cache-{}.db", uuid::Uuid::new_v4()));
        Self { path }
    }

    async fn open(&self) -> SessionCacheRepository {
        let url = format!("sqlite://{}?mode=rwc", self.path.display());
        SessionCacheRepository::new(connect_to_database(&url).await.unwrap())
    }
}

impl Drop for TempCache {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[tokio::test]
async fn test_login_persists_credential_and_snapshot() {
    let mock = MockCoordinator::start().await;
    mock.set_snapshot(SnapshotPayload {
        round: Some(bidding_round(6, 20)),
        ..Default::default()
    });
    let temp = TempCache::new();
    let cache = temp.open().await;
    let token = team_token("t1", "Alpha");

    let session = SyncSession::new(mock.config(), Some(cache.clone())).unwrap();
    session.login(&token).await.unwrap();
    view_until(&session, |view| view.is_live() && view.round_number == 6).await;
    session.shutdown().await;

    let cached = cache.load_credential().await.unwrap().unwrap();
    assert_eq!(cached.token, token);
    assert_eq!(cached.role, "team");
    let snapshot = cache.load_snapshot(&cached.fingerprint).await.unwrap().unwrap();
    assert_eq!(snapshot.round.unwrap().round_number, 6);
}

#[tokio::test]
async fn test_restore_then_logout_clears_cache() {
    let mock = MockCoordinator::start().await;
    mock.set_snapshot(SnapshotPayload {
        round: Some(bidding_round(8, 15)),
        ..Default::default()
    });
    let temp = TempCache::new();
    let cache = temp.open().await;

    let first = SyncSession::new(mock.config(), Some(cache.clone())).unwrap();
    first.login(&team_token("t2", "Beta")).await.unwrap();
    view_until(&first, |view| view.is_live()).await;
    first.shutdown().await;

    let restored = SyncSession::new(mock.config(), Some(cache.clone())).unwrap();
    let mut updates = restored.subscribe();
    assert!(restored.restore().await.is_some());
    let view = view_until(&restored, |view| view.round_number == 8).await;
    assert_eq!(view.title, "Word Ladder");
    view_until(&restored, |view| view.is_live()).await;

    assert!(restored.logout());
    assert_eq!(next_logout(&mut updates).await, LogoutReason::UserRequested);
    restored.shutdown().await;

    assert!(cache.load_credential().await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_without_cache_entry() {
    let mock = MockCoordinator::start().await;
    let temp = TempCache::new();
    let cache = temp.open().await;

    let session = SyncSession::new(mock.config(), Some(cache)).unwrap();
    assert!(session.restore().await.is_none());
    assert!(session.credentials().get().is_none());
    session.shutdown().await;
}
