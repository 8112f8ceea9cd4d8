//! Abstractions over the remote document store and the question catalog.

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::dao::models::QuestionRecord;
use crate::dao::storage::StorageResult;
use crate::state::document::TeamKey;

/// Remote store holding one authoritative room document per room.
///
/// Implementations are constructed for a single room; the room key never
/// appears in the call surface. Documents cross this boundary as raw JSON and
/// are validated on the way in, so a misbehaving backend cannot corrupt local
/// state.
pub trait RoomStore: Send + Sync {
    /// Load the room document, or `None` when the room was never written.
    fn load_room(&self) -> BoxFuture<'static, StorageResult<Option<Value>>>;

    /// Insert-or-replace the room document.
    fn upsert_room(&self, document: Value) -> BoxFuture<'static, StorageResult<()>>;

    /// Atomically claim the buzzer for `team` against the authoritative copy.
    ///
    /// Exactly one of N concurrent callers observes the winner transition;
    /// every caller gets back the resulting authoritative document. `None`
    /// when the room document does not exist yet.
    fn try_lock_buzzer(&self, team: TeamKey)
    -> BoxFuture<'static, StorageResult<Option<Value>>>;

    /// Push-based change feed delivering new room document values, when the
    /// backend supports one. Backends without push return `None` and rely on
    /// the polling loop.
    fn room_changes(&self) -> Option<broadcast::Receiver<Value>> {
        None
    }
}

/// Remote store for the question bank, kept in a separate table to bound the
/// room document size.
pub trait QuestionCatalog: Send + Sync {
    /// Read the full catalog in play order.
    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionRecord>>>;

    /// Replace the whole catalog (delete-all then insert-all; not atomic
    /// across the two steps, so callers treat any failure as "retry later").
    fn replace_questions(
        &self,
        records: Vec<QuestionRecord>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Push-based change feed delivering the new catalog contents, when the
    /// backend supports one.
    fn catalog_changes(&self) -> Option<broadcast::Receiver<Vec<QuestionRecord>>> {
        None
    }
}
