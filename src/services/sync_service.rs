use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::warn;

use crate::{
    dao::models::QuestionRecord,
    state::{PeerUpdate, SharedStore},
};

/// Poll the remote store on the configured cadence until shutdown.
///
/// The first tick fires immediately, so a store that booted offline retries
/// without waiting a full interval.
pub async fn run_poller(store: SharedStore, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(store.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => store.sync_now().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Adopt superseding updates posted by other stores on the same device.
pub async fn run_peer_listener(
    store: SharedStore,
    mut feed: broadcast::Receiver<PeerUpdate>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = feed.recv() => match received {
                Ok(update) => {
                    if update.origin == store.origin() {
                        continue;
                    }
                    store.adopt_peer(update.document).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Dropped intermediate states are harmless; the next
                    // update carries the full document.
                    warn!(skipped, "peer update channel lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Adopt room documents delivered by a remote change feed, when the backend
/// offers one; polling remains the fallback either way.
pub async fn run_room_feed(
    store: SharedStore,
    mut feed: broadcast::Receiver<Value>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = feed.recv() => match received {
                Ok(raw) => store.adopt_room_change(raw).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "room change feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Adopt catalog snapshots delivered by a remote change feed.
pub async fn run_catalog_feed(
    store: SharedStore,
    mut feed: broadcast::Receiver<Vec<QuestionRecord>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = feed.recv() => match received {
                Ok(records) => store.adopt_catalog_change(records).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "catalog change feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
