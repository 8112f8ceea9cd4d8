pub mod action;
pub mod document;
mod peers;
pub mod validate;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{questions_from_records, records_from_questions},
        room_store::{QuestionCatalog, RoomStore},
        snapshot::SnapshotStore,
        storage::{StorageError, StorageResult},
    },
    error::StoreError,
    services::sync_service,
    state::{
        action::{Action, apply},
        document::{RoundStatus, StateDocument, now_ms},
        validate::{QuestionDraft, normalize_questions, validate},
    },
};

pub use self::peers::{PeerHub, PeerUpdate};

#[cfg(feature = "supabase-store")]
use crate::dao::supabase::{SupabaseClient, SupabaseConfig};
use crate::{config::SyncConfig, dao::snapshot::FileSnapshotStore};

pub type SharedStore = Arc<SyncStore>;

/// Default remote polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);
/// Attempts made for each remote push before declaring it failed.
const PUSH_ATTEMPTS: u32 = 2;

/// Reachability of the remote store as observed by the last operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No remote operation has completed yet.
    Connecting,
    /// The last remote operation succeeded.
    Connected,
    /// The last remote operation failed, or no remote is configured.
    Disconnected,
}

/// Remote adapter pair for one room: the document side and the catalog side.
///
/// Both halves are usually the same backend object, split so tests can swap
/// one half independently.
#[derive(Clone)]
pub struct RemoteAdapters {
    /// Room-document store with the atomic buzzer-lock primitive.
    pub room: Arc<dyn RoomStore>,
    /// Question-catalog store.
    pub catalog: Arc<dyn QuestionCatalog>,
}

/// Everything a [`SyncStore`] persists through or talks to.
pub struct StoreAdapters {
    /// Device-local snapshot used for instant boot and offline play.
    pub snapshot: Arc<dyn SnapshotStore>,
    /// Same-device broadcast hub; stores sharing a hub converge without the
    /// remote round-trip.
    pub peers: PeerHub,
    /// Remote store, or `None` to run local-only.
    pub remote: Option<RemoteAdapters>,
}

/// Authoritative game-state store for one client.
///
/// All mutation goes through [`dispatch`](Self::dispatch); reads observe the
/// last validated document through [`state`](Self::state) or the
/// [`subscribe`](Self::subscribe) watch channel. Reconciliation against the
/// remote store and same-device peers runs on background tasks spawned by
/// [`initialize`](Self::initialize).
pub struct SyncStore {
    origin: Uuid,
    poll_interval: Duration,
    snapshot: Arc<dyn SnapshotStore>,
    peers: PeerHub,
    remote: Option<RemoteAdapters>,
    doc: RwLock<Option<StateDocument>>,
    // Serializes dispatches and remote adoptions so read-modify-write cycles
    // never interleave.
    dispatch_gate: Mutex<()>,
    pending_room: AtomicBool,
    pending_catalog: AtomicBool,
    // Set when remote bootstrap failed before the catalog was seeded; the
    // next successful cycle finishes the job.
    pending_seed: AtomicBool,
    // Set when a buzzer lock fell back to a local guess; the next remote
    // document settles the verdict.
    lock_guess: AtomicBool,
    updates: watch::Sender<Option<StateDocument>>,
    status: watch::Sender<ConnectionStatus>,
    shutdown: watch::Sender<bool>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl SyncStore {
    /// Construct a store with the default polling cadence.
    pub fn new(adapters: StoreAdapters) -> SharedStore {
        Self::with_poll_interval(adapters, DEFAULT_POLL_INTERVAL)
    }

    /// Construct a store polling the remote at the given cadence.
    pub fn with_poll_interval(adapters: StoreAdapters, poll_interval: Duration) -> SharedStore {
        let (updates, _) = watch::channel(None);
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            origin: Uuid::new_v4(),
            poll_interval,
            snapshot: adapters.snapshot,
            peers: adapters.peers,
            remote: adapters.remote,
            doc: RwLock::new(None),
            dispatch_gate: Mutex::new(()),
            pending_room: AtomicBool::new(false),
            pending_catalog: AtomicBool::new(false),
            pending_seed: AtomicBool::new(false),
            lock_guess: AtomicBool::new(false),
            updates,
            status,
            shutdown,
            tasks: StdMutex::new(Vec::new()),
        })
    }

    /// Build a store from environment-driven configuration: file snapshot,
    /// process-local peer hub and, when configured, the Supabase remote.
    pub fn from_config(config: &SyncConfig) -> Result<SharedStore, StoreError> {
        let snapshot: Arc<dyn SnapshotStore> =
            Arc::new(FileSnapshotStore::new(config.snapshot_path.clone()));
        Ok(Self::with_poll_interval(
            StoreAdapters {
                snapshot,
                peers: PeerHub::default(),
                remote: build_remote(config)?,
            },
            config.poll_interval,
        ))
    }

    /// Load the local snapshot, validate it against the seed questions,
    /// reconcile once with the remote store and start the background tasks.
    ///
    /// Idempotent: a second call returns the current document untouched.
    pub async fn initialize(
        self: &Arc<Self>,
        seed_questions: Vec<QuestionDraft>,
    ) -> Result<StateDocument, StoreError> {
        let _gate = self.dispatch_gate.lock().await;
        if let Some(existing) = self.doc.read().await.clone() {
            return Ok(existing);
        }

        let defaults = normalize_questions(seed_questions);
        let snapshot = match self.snapshot.load() {
            Ok(contents) => contents,
            Err(err) => {
                warn!(error = %err, "failed to read local snapshot; starting fresh");
                None
            }
        };
        let mut doc = match snapshot.and_then(|text| serde_json::from_str::<Value>(&text).ok()) {
            Some(raw) => validate(&raw, &defaults),
            None => StateDocument::seeded(defaults, now_ms()),
        };

        if let Some(remote) = self.remote.clone() {
            match self.bootstrap_remote(&remote, &mut doc).await {
                Ok(()) => self.set_status(ConnectionStatus::Connected),
                Err(err) => {
                    warn!(error = %err, "remote bootstrap failed; starting offline");
                    self.pending_room.store(true, Ordering::SeqCst);
                    self.pending_seed.store(true, Ordering::SeqCst);
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
        } else {
            self.set_status(ConnectionStatus::Disconnected);
        }

        self.commit(doc.clone()).await;
        self.spawn_background_tasks();
        Ok(doc)
    }

    /// Current document, or [`StoreError::Uninitialized`].
    pub async fn state(&self) -> Result<StateDocument, StoreError> {
        self.doc
            .read()
            .await
            .clone()
            .ok_or(StoreError::Uninitialized)
    }

    /// Watch channel carrying every committed document, local or adopted.
    ///
    /// Holds `None` until [`initialize`](Self::initialize) commits.
    pub fn subscribe(&self) -> watch::Receiver<Option<StateDocument>> {
        self.updates.subscribe()
    }

    /// Watch channel carrying remote-connectivity transitions.
    pub fn subscribe_connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Connectivity as observed by the most recent remote operation.
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Whether a remote store is configured and currently reachable.
    pub fn is_remote_connected(&self) -> bool {
        self.remote.is_some() && self.connection_status() == ConnectionStatus::Connected
    }

    /// Remote polling cadence of this store.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Validate, apply and propagate one action, returning the committed
    /// document.
    ///
    /// Room mutations are optimistic: a remote push failure keeps the local
    /// result and marks it for retry. Catalog mutations are not: they roll
    /// back unless the remote accepted them, because the catalog's source of
    /// truth is remote-only.
    pub async fn dispatch(&self, action: Action) -> Result<StateDocument, StoreError> {
        let _gate = self.dispatch_gate.lock().await;
        let current = self
            .doc
            .read()
            .await
            .clone()
            .ok_or(StoreError::Uninitialized)?;
        if action.is_catalog() && self.remote.is_none() {
            return Err(StoreError::RemoteUnavailable);
        }

        // Winner-take-all buzzer locks go through the remote atomic
        // compare-and-set first; its verdict is authoritative.
        if let (Action::LockBuzz { team }, Some(remote)) = (&action, &self.remote) {
            match remote.room.try_lock_buzzer(*team).await {
                Ok(Some(raw)) => {
                    let mut next = validate(&raw, &current.questions);
                    if next.state_version <= current.state_version {
                        next.state_version = current.state_version + 1;
                    }
                    self.lock_guess.store(false, Ordering::SeqCst);
                    self.set_status(ConnectionStatus::Connected);
                    self.commit_and_broadcast(next.clone()).await;
                    return Ok(next);
                }
                Ok(None) => {
                    warn!("buzzer lock procedure found no room document; locking locally");
                    self.lock_guess.store(true, Ordering::SeqCst);
                }
                Err(err) => {
                    warn!(error = %err, "remote buzzer lock failed; locking locally");
                    self.lock_guess.store(true, Ordering::SeqCst);
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
        }

        let mut next = current.clone();
        next.state_version += 1;
        next.updated_at = now_ms();
        apply(&mut next, &action);

        if let Some(remote) = self.remote.clone() {
            if action.is_catalog() {
                let records = records_from_questions(&next.questions);
                let catalog = remote.catalog.clone();
                let outcome = push_with_retry(
                    move || catalog.replace_questions(records.clone()),
                    "question catalog",
                )
                .await;
                if let Err(source) = outcome {
                    warn!(error = %source, "question catalog push failed; rolling back");
                    self.pending_catalog.store(true, Ordering::SeqCst);
                    self.set_status(ConnectionStatus::Disconnected);
                    self.commit(current).await;
                    return Err(StoreError::Sync { source });
                }
            }
            match self.push_room(&remote, &next).await {
                Ok(()) => {
                    self.pending_room.store(false, Ordering::SeqCst);
                    self.set_status(ConnectionStatus::Connected);
                }
                Err(err) => {
                    warn!(error = %err, "room push failed; keeping local state for retry");
                    self.pending_room.store(true, Ordering::SeqCst);
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
        }

        self.commit_and_broadcast(next.clone()).await;
        Ok(next)
    }

    /// Run one reconciliation cycle right now.
    ///
    /// The background poller calls this on its cadence; callers can use it to
    /// refresh on demand, e.g. when a UI regains focus.
    pub async fn sync_now(&self) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let _gate = self.dispatch_gate.lock().await;
        if self.doc.read().await.is_none() {
            return;
        }
        match self.reconcile_locked(&remote).await {
            Ok(()) => self.set_status(ConnectionStatus::Connected),
            Err(err) => {
                debug!(error = %err, "reconciliation cycle failed");
                self.set_status(ConnectionStatus::Disconnected);
            }
        }
    }

    /// Stop the background tasks. Further dispatches still work; the store
    /// simply stops reconciling.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    /// Adopt a same-device peer update when it supersedes the local document.
    pub(crate) async fn adopt_peer(&self, incoming: StateDocument) {
        let _gate = self.dispatch_gate.lock().await;
        let Some(current) = self.doc.read().await.clone() else {
            return;
        };
        if incoming != current && supersedes(&incoming, &current) {
            // Persist and notify, but never re-broadcast a received update.
            self.commit(incoming).await;
        }
    }

    /// Adopt a room document pushed by the remote change feed.
    pub(crate) async fn adopt_room_change(&self, raw: Value) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let _gate = self.dispatch_gate.lock().await;
        if let Err(err) = self.adopt_remote(&remote, raw).await {
            debug!(error = %err, "failed to adopt remote room change");
        }
    }

    /// Adopt a catalog snapshot pushed by the remote change feed.
    pub(crate) async fn adopt_catalog_change(
        &self,
        records: Vec<crate::dao::models::QuestionRecord>,
    ) {
        let _gate = self.dispatch_gate.lock().await;
        let Some(current) = self.doc.read().await.clone() else {
            return;
        };
        if records.is_empty() {
            return;
        }
        let questions = questions_from_records(records);
        if questions == current.questions {
            return;
        }
        let mut next = current;
        next.questions = questions;
        next.clamp_question_index();
        self.commit(next).await;
    }

    async fn bootstrap_remote(
        &self,
        remote: &RemoteAdapters,
        doc: &mut StateDocument,
    ) -> StorageResult<()> {
        let mut raw = remote.room.load_room().await?;
        if raw.is_none() {
            remote.room.upsert_room(room_payload(doc)?).await?;
            raw = remote.room.load_room().await?;
        }
        if let Some(raw) = raw {
            // An existing room is authoritative when joining; the local
            // snapshot may belong to a session that ended long ago.
            *doc = validate(&raw, &doc.questions);
        }

        let records = remote.catalog.list_questions().await?;
        if records.is_empty() {
            if !doc.questions.is_empty() {
                remote
                    .catalog
                    .replace_questions(records_from_questions(&doc.questions))
                    .await?;
            }
        } else {
            doc.questions = questions_from_records(records);
            doc.clamp_question_index();
        }
        Ok(())
    }

    /// One full cycle: drain pending pushes, then pull and maybe adopt the
    /// remote room document. Caller holds the dispatch gate.
    async fn reconcile_locked(&self, remote: &RemoteAdapters) -> StorageResult<()> {
        if self.pending_catalog.load(Ordering::SeqCst) {
            if let Some(current) = self.doc.read().await.clone() {
                remote
                    .catalog
                    .replace_questions(records_from_questions(&current.questions))
                    .await?;
            }
            self.pending_catalog.store(false, Ordering::SeqCst);
        }
        if self.pending_room.load(Ordering::SeqCst) {
            if let Some(current) = self.doc.read().await.clone() {
                remote.room.upsert_room(room_payload(&current)?).await?;
            }
            self.pending_room.store(false, Ordering::SeqCst);
        }
        if self.pending_seed.load(Ordering::SeqCst) {
            // Bootstrap never reached the catalog; seed it now, unless another
            // client populated it in the meantime, in which case take theirs.
            let records = remote.catalog.list_questions().await?;
            if let Some(current) = self.doc.read().await.clone() {
                if records.is_empty() {
                    if !current.questions.is_empty() {
                        remote
                            .catalog
                            .replace_questions(records_from_questions(&current.questions))
                            .await?;
                    }
                } else {
                    let questions = questions_from_records(records);
                    if questions != current.questions {
                        let mut next = current;
                        next.questions = questions;
                        next.clamp_question_index();
                        self.commit(next).await;
                    }
                }
            }
            self.pending_seed.store(false, Ordering::SeqCst);
        }
        if let Some(raw) = remote.room.load_room().await? {
            self.adopt_remote(remote, raw).await?;
        }
        Ok(())
    }

    async fn adopt_remote(&self, remote: &RemoteAdapters, raw: Value) -> StorageResult<()> {
        let Some(current) = self.doc.read().await.clone() else {
            return Ok(());
        };
        let candidate = validate(&raw, &current.questions);

        if supersedes(&candidate, &current) {
            self.lock_guess.store(false, Ordering::SeqCst);
            if candidate == current {
                return Ok(());
            }
            let mut next = candidate;
            // The room payload carries no questions; refresh them from the
            // catalog while we are adopting anyway.
            match remote.catalog.list_questions().await {
                Ok(records) if !records.is_empty() => {
                    next.questions = questions_from_records(records);
                    next.clamp_question_index();
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "failed to refresh question catalog during adoption")
                }
            }
            self.commit(next).await;
        } else if self.lock_guess.load(Ordering::SeqCst)
            && candidate.round.status == RoundStatus::Locked
        {
            // Our buzzer lock was only a local guess; the remote verdict wins
            // even when the rest of the remote document is older.
            self.lock_guess.store(false, Ordering::SeqCst);
            let mut next = current;
            next.round.status = candidate.round.status;
            next.round.buzzer_winner = candidate.round.buzzer_winner;
            self.commit(next).await;
        }
        Ok(())
    }

    async fn push_room(&self, remote: &RemoteAdapters, doc: &StateDocument) -> StorageResult<()> {
        let payload = room_payload(doc)?;
        let room = remote.room.clone();
        push_with_retry(move || room.upsert_room(payload.clone()), "room document").await
    }

    /// Store, persist and notify; the write path additionally broadcasts.
    async fn commit(&self, doc: StateDocument) {
        {
            let mut slot = self.doc.write().await;
            *slot = Some(doc.clone());
        }
        match serde_json::to_string(&doc) {
            Ok(text) => {
                if let Err(err) = self.snapshot.save(&text) {
                    warn!(error = %err, "failed to persist local snapshot");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize document for snapshot"),
        }
        self.updates.send_replace(Some(doc));
    }

    async fn commit_and_broadcast(&self, doc: StateDocument) {
        self.commit(doc.clone()).await;
        self.peers.post(PeerUpdate {
            origin: self.origin,
            document: doc,
        });
    }

    fn set_status(&self, value: ConnectionStatus) {
        if *self.status.borrow() != value {
            self.status.send_replace(value);
        }
    }

    fn spawn_background_tasks(self: &Arc<Self>) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        if !tasks.is_empty() {
            return;
        }
        tasks.push(tokio::spawn(sync_service::run_poller(
            self.clone(),
            self.shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(sync_service::run_peer_listener(
            self.clone(),
            self.peers.subscribe(),
            self.shutdown.subscribe(),
        )));
        if let Some(remote) = &self.remote {
            if let Some(feed) = remote.room.room_changes() {
                tasks.push(tokio::spawn(sync_service::run_room_feed(
                    self.clone(),
                    feed,
                    self.shutdown.subscribe(),
                )));
            }
            if let Some(feed) = remote.catalog.catalog_changes() {
                tasks.push(tokio::spawn(sync_service::run_catalog_feed(
                    self.clone(),
                    feed,
                    self.shutdown.subscribe(),
                )));
            }
        }
    }

    pub(crate) fn origin(&self) -> Uuid {
        self.origin
    }
}

impl Drop for SyncStore {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

/// Newer-wins rule deciding whether `incoming` replaces `current`: higher
/// version wins; on a version tie the incoming document wins unless its
/// timestamp is strictly older.
pub(crate) fn supersedes(incoming: &StateDocument, current: &StateDocument) -> bool {
    if incoming.state_version != current.state_version {
        return incoming.state_version > current.state_version;
    }
    incoming.updated_at >= current.updated_at
}

/// Serialize a document for the room table, eliding the questions: those
/// travel through the catalog table and would bloat every room write.
fn room_payload(doc: &StateDocument) -> StorageResult<Value> {
    let mut value = serde_json::to_value(doc)
        .map_err(|err| StorageError::unavailable("failed to serialize room document", err))?;
    if let Some(map) = value.as_object_mut() {
        map.insert("questions".into(), Value::Array(Vec::new()));
    }
    Ok(value)
}

async fn push_with_retry<F>(mut attempt_fn: F, what: &'static str) -> StorageResult<()>
where
    F: FnMut() -> BoxFuture<'static, StorageResult<()>>,
{
    let mut attempt = 0;
    loop {
        match attempt_fn().await {
            Ok(()) => return Ok(()),
            Err(err) => {
                attempt += 1;
                if attempt >= PUSH_ATTEMPTS {
                    return Err(err);
                }
                debug!(error = %err, attempt, what, "remote push failed; retrying");
            }
        }
    }
}

#[cfg(feature = "supabase-store")]
fn build_remote(config: &SyncConfig) -> Result<Option<RemoteAdapters>, StoreError> {
    let (Some(base_url), Some(api_key)) = (&config.supabase_url, &config.supabase_key) else {
        return Ok(None);
    };
    let client = SupabaseClient::new(SupabaseConfig {
        base_url: base_url.clone(),
        api_key: api_key.clone(),
        room: config.room.clone(),
    })
    .map_err(StorageError::from)?;
    Ok(Some(RemoteAdapters {
        room: Arc::new(client.clone()),
        catalog: Arc::new(client),
    }))
}

#[cfg(not(feature = "supabase-store"))]
fn build_remote(config: &SyncConfig) -> Result<Option<RemoteAdapters>, StoreError> {
    if config.supabase_url.is_some() {
        warn!("remote store configured but the supabase-store feature is disabled; running local-only");
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::document::now_ms;

    fn doc(version: u64, updated_at: i64) -> StateDocument {
        let mut doc = StateDocument::seeded(Vec::new(), now_ms());
        doc.state_version = version;
        doc.updated_at = updated_at;
        doc
    }

    #[test]
    fn higher_version_supersedes_regardless_of_timestamp() {
        assert!(supersedes(&doc(6, 100), &doc(5, 900)));
        assert!(!supersedes(&doc(4, 900), &doc(5, 100)));
    }

    #[test]
    fn version_tie_falls_back_to_timestamp_preferring_incoming() {
        assert!(supersedes(&doc(5, 200), &doc(5, 100)));
        assert!(supersedes(&doc(5, 100), &doc(5, 100)));
        assert!(!supersedes(&doc(5, 99), &doc(5, 100)));
    }

    #[test]
    fn room_payload_elides_questions() {
        let mut base = StateDocument::seeded(Vec::new(), now_ms());
        base.questions = vec![crate::state::document::Question {
            id: "q1".into(),
            text: "First".into(),
            answers: Vec::new(),
        }];
        let payload = room_payload(&base).unwrap();
        assert_eq!(payload["questions"], serde_json::json!([]));
        assert_eq!(payload["stateVersion"], serde_json::json!(base.state_version));
    }

    mod store {
        use std::sync::Arc;
        use std::time::Duration;

        use tokio::time::timeout;

        use super::super::*;
        use crate::dao::{memory::MemoryRemote, snapshot::MemorySnapshotStore};
        use crate::state::document::{RoundStatus, TeamKey, now_ms};
        use crate::state::validate::{AnswerDraft, QuestionDraft};

        const WAIT: Duration = Duration::from_secs(2);

        fn draft(text: &str) -> QuestionDraft {
            QuestionDraft {
                id: None,
                text: Some(text.to_string()),
                answers: vec![AnswerDraft {
                    text: Some("Yes".into()),
                    points: Some(10.0),
                }],
            }
        }

        fn local_store(peers: PeerHub) -> SharedStore {
            SyncStore::new(StoreAdapters {
                snapshot: Arc::new(MemorySnapshotStore::new()),
                peers,
                remote: None,
            })
        }

        fn remote_store(remote: &MemoryRemote, poll: Duration) -> SharedStore {
            SyncStore::with_poll_interval(
                StoreAdapters {
                    snapshot: Arc::new(MemorySnapshotStore::new()),
                    peers: PeerHub::default(),
                    remote: Some(RemoteAdapters {
                        room: Arc::new(remote.clone()),
                        catalog: Arc::new(remote.clone()),
                    }),
                },
                poll,
            )
        }

        #[tokio::test]
        async fn dispatch_before_initialize_is_rejected() {
            let store = local_store(PeerHub::default());
            let result = store.dispatch(Action::OpenBuzz).await;
            assert!(matches!(result, Err(StoreError::Uninitialized)));
        }

        #[tokio::test]
        async fn initialize_seeds_normalizes_and_persists() {
            let snapshot = Arc::new(MemorySnapshotStore::new());
            let store = SyncStore::new(StoreAdapters {
                snapshot: snapshot.clone(),
                peers: PeerHub::default(),
                remote: None,
            });

            let doc = store.initialize(vec![draft("Capital of France?")]).await.unwrap();
            assert_eq!(doc.questions.len(), 1);
            assert_eq!(doc.questions[0].id, "q1");
            assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);
            assert!(snapshot.contents().unwrap().contains("stateVersion"));

            let again = store.initialize(Vec::new()).await.unwrap();
            assert_eq!(again, doc);
            store.close();
        }

        #[tokio::test]
        async fn catalog_edits_require_a_remote() {
            let store = local_store(PeerHub::default());
            store.initialize(vec![draft("Only one")]).await.unwrap();
            let result = store
                .dispatch(Action::DeleteQuestion { index: 0 })
                .await;
            assert!(matches!(result, Err(StoreError::RemoteUnavailable)));
            store.close();
        }

        #[tokio::test]
        async fn local_dispatch_bumps_version_and_applies() {
            let store = local_store(PeerHub::default());
            let before = store.initialize(vec![draft("Q")]).await.unwrap();
            let after = store
                .dispatch(Action::AddScore {
                    team: TeamKey::A,
                    points: 30.0,
                })
                .await
                .unwrap();
            assert_eq!(after.state_version, before.state_version + 1);
            assert_eq!(after.teams.get(TeamKey::A).score, 30);
            store.close();
        }

        #[tokio::test]
        async fn concurrent_buzzer_locks_elect_one_winner() {
            let remote = MemoryRemote::new();
            let host = remote_store(&remote, Duration::from_millis(50));
            let guest = remote_store(&remote, Duration::from_millis(50));

            host.initialize(vec![draft("Q")]).await.unwrap();
            guest.initialize(Vec::new()).await.unwrap();

            host.dispatch(Action::OpenBuzz).await.unwrap();
            guest.sync_now().await;
            assert_eq!(
                guest.state().await.unwrap().round.status,
                RoundStatus::BuzzOpen
            );

            let (first, second) = tokio::join!(
                host.dispatch(Action::LockBuzz { team: TeamKey::A }),
                guest.dispatch(Action::LockBuzz { team: TeamKey::B }),
            );
            let first = first.unwrap();
            let second = second.unwrap();

            // Both observe the same single winner, whichever store won the race.
            let winner = first.round.buzzer_winner.unwrap();
            assert_eq!(second.round.buzzer_winner, Some(winner));
            assert_eq!(first.round.status, RoundStatus::Locked);
            assert_eq!(second.round.status, RoundStatus::Locked);

            // A late claim cannot steal the lock.
            let late = guest
                .dispatch(Action::LockBuzz {
                    team: winner.opponent(),
                })
                .await
                .unwrap();
            assert_eq!(late.round.buzzer_winner, Some(winner));
            host.close();
            guest.close();
        }

        #[tokio::test]
        async fn catalog_failure_rolls_back_and_recovers() {
            let remote = MemoryRemote::new();
            let store = remote_store(&remote, Duration::from_secs(30));
            store.initialize(vec![draft("First")]).await.unwrap();
            assert_eq!(remote.stored_questions().len(), 1);

            remote.set_fail_writes(true);
            let result = store
                .dispatch(Action::UpsertQuestion {
                    index: None,
                    question: draft("Second"),
                })
                .await;
            assert!(matches!(result, Err(StoreError::Sync { .. })));
            assert_eq!(store.state().await.unwrap().questions.len(), 1);
            assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);
            assert_eq!(remote.stored_questions().len(), 1);

            remote.set_fail_writes(false);
            store.sync_now().await;
            assert_eq!(store.connection_status(), ConnectionStatus::Connected);
            store.close();
        }

        #[tokio::test]
        async fn failed_bootstrap_seeds_catalog_after_recovery() {
            let remote = MemoryRemote::new();
            remote.set_fail_writes(true);
            let store = remote_store(&remote, Duration::from_secs(30));

            let doc = store.initialize(vec![draft("Q")]).await.unwrap();
            assert_eq!(doc.questions.len(), 1);
            assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);
            assert!(remote.stored_room().is_none());
            assert!(remote.stored_questions().is_empty());

            remote.set_fail_writes(false);
            store.sync_now().await;
            assert_eq!(store.connection_status(), ConnectionStatus::Connected);
            assert_eq!(remote.stored_questions().len(), 1);
            let pushed: StateDocument =
                serde_json::from_value(remote.stored_room().unwrap()).unwrap();
            assert_eq!(pushed.state_version, doc.state_version);
            assert_eq!(store.state().await.unwrap().questions.len(), 1);
            store.close();
        }

        #[tokio::test]
        async fn room_push_failure_keeps_local_result_and_retries() {
            let remote = MemoryRemote::new();
            let store = remote_store(&remote, Duration::from_secs(30));
            store.initialize(vec![draft("Q")]).await.unwrap();

            remote.set_fail_writes(true);
            let doc = store
                .dispatch(Action::AddScore {
                    team: TeamKey::B,
                    points: 20.0,
                })
                .await
                .unwrap();
            assert_eq!(doc.teams.get(TeamKey::B).score, 20);
            assert_eq!(store.connection_status(), ConnectionStatus::Disconnected);

            remote.set_fail_writes(false);
            store.sync_now().await;
            assert_eq!(store.connection_status(), ConnectionStatus::Connected);
            let pushed: StateDocument =
                serde_json::from_value(remote.stored_room().unwrap()).unwrap();
            assert_eq!(pushed.teams.get(TeamKey::B).score, 20);
            assert_eq!(pushed.state_version, doc.state_version);
            store.close();
        }

        #[tokio::test]
        async fn peer_updates_converge_without_a_remote() {
            let hub = PeerHub::default();
            let first = local_store(hub.clone());
            let second = local_store(hub);
            first.initialize(vec![draft("Q")]).await.unwrap();
            second.initialize(vec![draft("Q")]).await.unwrap();

            let mut updates = second.subscribe();
            first
                .dispatch(Action::SetTeamName {
                    team: TeamKey::A,
                    name: "Crimson".into(),
                })
                .await
                .unwrap();

            timeout(
                WAIT,
                updates.wait_for(|doc| {
                    doc.as_ref()
                        .is_some_and(|doc| doc.teams.get(TeamKey::A).name == "Crimson")
                }),
            )
            .await
            .expect("peer update never arrived")
            .unwrap();
            first.close();
            second.close();
        }

        #[tokio::test]
        async fn change_feed_adopts_newer_remote_documents() {
            let remote = MemoryRemote::new();
            let store = remote_store(&remote, Duration::from_secs(30));
            store.initialize(vec![draft("Q")]).await.unwrap();

            let mut newer = store.state().await.unwrap();
            newer.state_version += 5;
            newer.updated_at = now_ms();
            newer.teams.get_mut(TeamKey::B).score = 42;
            remote
                .upsert_room(serde_json::to_value(&newer).unwrap())
                .await
                .unwrap();

            let mut updates = store.subscribe();
            let adopted = timeout(
                WAIT,
                updates.wait_for(|doc| {
                    doc.as_ref()
                        .is_some_and(|doc| doc.teams.get(TeamKey::B).score == 42)
                }),
            )
            .await
            .expect("remote change never adopted")
            .unwrap()
            .clone()
            .unwrap();
            // Questions travel through the catalog, not the room payload.
            assert_eq!(adopted.questions.len(), 1);
            store.close();
        }

        #[tokio::test]
        async fn remote_verdict_overrides_a_guessed_lock() {
            let remote = MemoryRemote::new();
            let store = remote_store(&remote, Duration::from_secs(30));
            store.initialize(vec![draft("Q")]).await.unwrap();
            let opened = store.dispatch(Action::OpenBuzz).await.unwrap();

            remote.set_fail_writes(true);
            let guessed = store
                .dispatch(Action::LockBuzz { team: TeamKey::A })
                .await
                .unwrap();
            assert_eq!(guessed.round.buzzer_winner, Some(TeamKey::A));

            // The room actually locked for the other team while we were out,
            // at a version our optimistic bump has already passed.
            remote.set_fail_writes(false);
            let mut verdict = opened.clone();
            verdict.round.status = RoundStatus::Locked;
            verdict.round.buzzer_winner = Some(TeamKey::B);
            verdict.updated_at = opened.updated_at.saturating_sub(1);
            remote
                .upsert_room(serde_json::to_value(&verdict).unwrap())
                .await
                .unwrap();

            let mut updates = store.subscribe();
            let settled = timeout(
                WAIT,
                updates.wait_for(|doc| {
                    doc.as_ref()
                        .is_some_and(|doc| doc.round.buzzer_winner == Some(TeamKey::B))
                }),
            )
            .await
            .expect("verdict never adopted")
            .unwrap()
            .clone()
            .unwrap();
            // Only the verdict fields are taken; the local document stays newer.
            assert_eq!(settled.state_version, guessed.state_version);
            store.close();
        }
    }
}
