use thiserror::Error;

use crate::dao::storage::StorageError;

/// Errors surfaced by the store's public operations.
///
/// Malformed action payloads are deliberately absent from this list: those
/// no-op inside the transition function so a single bad client message can
/// never corrupt shared state. Only failures a caller must present to the
/// user become errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `dispatch` or `state` was called before `initialize` completed.
    #[error("state not initialized; call initialize first")]
    Uninitialized,
    /// A question-catalog edit was attempted without a configured remote
    /// store; the catalog's source of truth lives remotely.
    #[error("question edits require a connected remote store")]
    RemoteUnavailable,
    /// A question-catalog push exhausted its retries; the edit was rolled
    /// back and never became durable.
    #[error("failed to sync the question catalog; the edit was rolled back")]
    Sync {
        /// Underlying storage failure.
        #[source]
        source: StorageError,
    },
    /// A storage adapter could not be constructed or reached.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
