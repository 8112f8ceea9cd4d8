//! In-process remote backend.
//!
//! Implements both remote traits against shared memory so several stores in
//! one process can exercise the full sync protocol, including the atomic
//! buzzer-lock compare-and-set and push-based change feeds. Powers the
//! integration tests and single-device play; writes can be switched off to
//! simulate an outage.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::dao::models::QuestionRecord;
use crate::dao::room_store::{QuestionCatalog, RoomStore};
use crate::dao::storage::{StorageError, StorageResult};
use crate::state::document::{RoundStatus, TeamKey, now_ms};
use crate::state::validate::validate;

const FEED_CAPACITY: usize = 16;

/// Shared in-memory room + catalog store. Clones share the same backing data,
/// so handing clones to several stores models several clients of one room.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

struct Inner {
    room: Mutex<Option<Value>>,
    questions: Mutex<Vec<QuestionRecord>>,
    fail_writes: AtomicBool,
    room_feed: broadcast::Sender<Value>,
    catalog_feed: broadcast::Sender<Vec<QuestionRecord>>,
}

impl MemoryRemote {
    /// Fresh empty room.
    pub fn new() -> Self {
        let (room_feed, _) = broadcast::channel(FEED_CAPACITY);
        let (catalog_feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                room: Mutex::new(None),
                questions: Mutex::new(Vec::new()),
                fail_writes: AtomicBool::new(false),
                room_feed,
                catalog_feed,
            }),
        }
    }

    /// Make every write fail until switched back, simulating an outage.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Currently stored room document, if any.
    pub fn stored_room(&self) -> Option<Value> {
        self.inner.room.lock().expect("room lock poisoned").clone()
    }

    /// Currently stored catalog rows.
    pub fn stored_questions(&self) -> Vec<QuestionRecord> {
        self.inner
            .questions
            .lock()
            .expect("questions lock poisoned")
            .clone()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "memory remote refused the write",
                std::io::Error::other("simulated outage"),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore for MemoryRemote {
    fn load_room(&self) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.stored_room()) })
    }

    fn upsert_room(&self, document: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            *store.inner.room.lock().expect("room lock poisoned") = Some(document.clone());
            let _ = store.inner.room_feed.send(document);
            Ok(())
        })
    }

    fn try_lock_buzzer(
        &self,
        team: TeamKey,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;

            // Compare-and-set under the room lock: only the first claim while
            // the buzzer is open mutates the document, every caller gets the
            // resulting authoritative copy back.
            let mut slot = store.inner.room.lock().expect("room lock poisoned");
            let Some(raw) = slot.as_ref() else {
                return Ok(None);
            };

            let mut doc = validate(raw, &[]);
            let won = doc.round.status == RoundStatus::BuzzOpen
                && doc.round.buzzer_winner.is_none();
            if won {
                doc.round.buzzer_winner = Some(team);
                doc.round.status = RoundStatus::Locked;
                doc.state_version += 1;
                doc.updated_at = now_ms();
            }

            let value = serde_json::to_value(&doc).map_err(|err| {
                StorageError::unavailable("failed to encode room document", err)
            })?;
            if won {
                *slot = Some(value.clone());
                let _ = store.inner.room_feed.send(value.clone());
            }
            Ok(Some(value))
        })
    }

    fn room_changes(&self) -> Option<broadcast::Receiver<Value>> {
        Some(self.inner.room_feed.subscribe())
    }
}

impl QuestionCatalog for MemoryRemote {
    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionRecord>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.stored_questions()) })
    }

    fn replace_questions(
        &self,
        records: Vec<QuestionRecord>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            *store
                .inner
                .questions
                .lock()
                .expect("questions lock poisoned") = records.clone();
            let _ = store.inner.catalog_feed.send(records);
            Ok(())
        })
    }

    fn catalog_changes(&self) -> Option<broadcast::Receiver<Vec<QuestionRecord>>> {
        Some(self.inner.catalog_feed.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::state::document::StateDocument;

    use super::*;

    fn open_room() -> Value {
        let doc = validate(
            &json!({
                "round": {"status": "buzz-open", "buzzerWinner": null},
                "questions": [{"question": "Q", "answers": [{"text": "A", "points": 1}]}]
            }),
            &[],
        );
        serde_json::to_value(doc).unwrap()
    }

    #[tokio::test]
    async fn lock_is_first_writer_wins() {
        let remote = MemoryRemote::new();
        remote.upsert_room(open_room()).await.unwrap();

        let first = remote.try_lock_buzzer(TeamKey::A).await.unwrap().unwrap();
        let second = remote.try_lock_buzzer(TeamKey::B).await.unwrap().unwrap();

        let first: StateDocument = serde_json::from_value(first).unwrap();
        let second: StateDocument = serde_json::from_value(second).unwrap();
        assert_eq!(first.round.buzzer_winner, Some(TeamKey::A));
        // The loser still receives the authoritative document.
        assert_eq!(second.round.buzzer_winner, Some(TeamKey::A));
        assert_eq!(second.round.status, RoundStatus::Locked);
    }

    #[tokio::test]
    async fn lock_on_missing_room_returns_none() {
        let remote = MemoryRemote::new();
        assert!(remote.try_lock_buzzer(TeamKey::A).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_writes_surface_as_storage_errors() {
        let remote = MemoryRemote::new();
        remote.set_fail_writes(true);
        assert!(remote.upsert_room(open_room()).await.is_err());
        assert!(remote.replace_questions(Vec::new()).await.is_err());
        remote.set_fail_writes(false);
        assert!(remote.upsert_room(open_room()).await.is_ok());
    }
}
