use tokio::sync::broadcast;
use uuid::Uuid;

use crate::state::document::StateDocument;

/// A state update posted to same-device peers, tagged with the posting
/// store's origin id so a store can skip its own messages.
#[derive(Debug, Clone)]
pub struct PeerUpdate {
    /// Origin id of the store that produced the update.
    pub origin: Uuid,
    /// The full document after the mutation.
    pub document: StateDocument,
}

/// Broadcast hub connecting the stores of one device.
///
/// Clones share the same channel; handing one hub to several stores models
/// several browsing contexts sharing a device. There is no cross-device
/// guarantee, that is the remote store's job.
#[derive(Clone)]
pub struct PeerHub {
    sender: broadcast::Sender<PeerUpdate>,
}

impl PeerHub {
    /// Construct a new hub backed by a broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent updates.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerUpdate> {
        self.sender.subscribe()
    }

    /// Post an update to all current subscribers, ignoring delivery errors.
    pub fn post(&self, update: PeerUpdate) {
        let _ = self.sender.send(update);
    }
}

impl Default for PeerHub {
    fn default() -> Self {
        Self::new(16)
    }
}
