use tokio::signal;
use tracing::{error, info, warn};

use codebid_persistence::{SessionCacheRepository, connect_to_database};
use codebid_sync::{SessionUpdate, SyncConfig, SyncSession};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!(server = %config.server_url, ws = %config.ws_url, "Starting codebid console");

    // The console still works without a cache, it just cannot restore
    let cache = match connect_to_database(&config.cache_url).await {
        Ok(db) => Some(SessionCacheRepository::new(db)),
        Err(e) => {
            warn!("Session cache unavailable at {}: {}", config.cache_url, e);
            None
        }
    };

    let session = match SyncSession::new(config, cache) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to build session: {}", e);
            std::process::exit(1);
        }
    };
    let mut updates = session.subscribe();

    match std::env::var("CODEBID_TOKEN") {
        Ok(token) => {
            if let Err(e) = session.login(&token).await {
                error!("CODEBID_TOKEN rejected: {}", e);
                std::process::exit(1);
            }
        }
        Err(_) => {
            if session.restore().await.is_none() {
                error!("No CODEBID_TOKEN set and no cached session to restore");
                std::process::exit(1);
            }
        }
    }

    let mut printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            match update {
                SessionUpdate::View(view) => info!(
                    round_number = view.round_number,
                    status = ?view.status,
                    title = %view.title,
                    time_left = view.time_left_seconds,
                    bids = view.bids.len(),
                    leader = ?view.highest_bid().map(|bid| bid.team_name.as_str()),
                    teams_online = ?view.teams_online,
                    freshness = ?view.freshness,
                    "view"
                ),
                SessionUpdate::ConnectionChanged(state) => info!(?state, "connection"),
                SessionUpdate::LoggedOut(reason) => {
                    warn!(?reason, "logged out");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = wait_for_signal() => printer.abort(),
        _ = &mut printer => info!("Session ended, exiting"),
    }
    session.shutdown().await;
    info!("Console shutdown complete.");
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let (mut sigint, mut sigterm) = match (
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
            signal::unix::signal(signal::unix::SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C");
                wait_for_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

/// Resolves on Ctrl+C only. Without a usable handler the console runs until
/// the session ends.
async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
