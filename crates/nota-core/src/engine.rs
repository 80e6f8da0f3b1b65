//! Sync Engine: routes every note operation through the server when it can,
//! falls back to optimistic local writes when it can't, and replays the queued
//! writes once connectivity returns.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::note::resolve_tags;
use crate::{
    is_temporary_id, CreateNote, Error, FailedChange, KeyValueStore, Listing, Note, NoteCache,
    NoteService, PendingChange, PendingLog, ReconcileOutcome, ReconcileReport, SyncEvent,
    TagCache, UpdateNote,
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Reconciling,
}

/// Holds the `Reconciling` state for the duration of a run.
struct ReconcileGuard<'a> {
    state: &'a Cell<SyncState>,
}

impl<'a> ReconcileGuard<'a> {
    fn enter(state: &'a Cell<SyncState>) -> Option<Self> {
        if state.get() == SyncState::Reconciling {
            return None;
        }
        state.set(SyncState::Reconciling);
        Some(Self { state })
    }
}

impl Drop for ReconcileGuard<'_> {
    fn drop(&mut self) {
        self.state.set(SyncState::Idle);
    }
}

/// The offline-first note engine.
///
/// Single-threaded by construction: the engine is `!Send`, and mutual
/// exclusion between reconciliation runs is a plain state flag.
pub struct SyncEngine<R, S> {
    remote: R,
    notes: NoteCache<Rc<S>>,
    tags: TagCache<Rc<S>>,
    log: PendingLog<Rc<S>>,
    state: Cell<SyncState>,
    last_temp_id: Cell<i64>,
    events: broadcast::Sender<SyncEvent>,
}

impl<R: NoteService, S: KeyValueStore> SyncEngine<R, S> {
    pub fn new(remote: R, store: S) -> Self {
        Self::with_shared_store(remote, Rc::new(store))
    }

    /// Build an engine over a store that other components (the tag book)
    /// persist into as well.
    pub fn with_shared_store(remote: R, store: Rc<S>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            remote,
            notes: NoteCache::new(Rc::clone(&store)),
            tags: TagCache::new(Rc::clone(&store)),
            log: PendingLog::new(store),
            state: Cell::new(SyncState::Idle),
            last_temp_id: Cell::new(0),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.state.get()
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub async fn cached_notes(&self) -> Result<Vec<Note>, Error> {
        self.notes.read().await
    }

    pub async fn pending_changes(&self) -> Result<Vec<PendingChange>, Error> {
        self.log.drain_all().await
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Fetch every note, falling back to the cached snapshot when offline.
    pub async fn list_notes(&self) -> Result<Listing<Note>, Error> {
        match self.remote.list().await {
            Ok(notes) => {
                self.store_snapshot(&notes).await?;
                Ok(Listing::from_network(notes))
            }
            Err(e) if e.is_network() => match self.notes.load().await? {
                Some(notes) => {
                    info!(notes = notes.len(), "server unreachable, serving cached notes");
                    Ok(Listing::from_cache(notes))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    pub async fn get_note(&self, id: i64) -> Result<Note, Error> {
        if !is_temporary_id(id) {
            match self.remote.get(id).await {
                Ok(note) => {
                    self.notes.upsert(note.clone()).await?;
                    return Ok(note);
                }
                Err(e) if e.is_network() => {
                    debug!(id, "server unreachable, reading note from cache");
                }
                Err(e) => return Err(e),
            }
        }
        self.notes
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("note {} is not cached", id)))
    }

    pub async fn create_note(&self, create: CreateNote) -> Result<Note, Error> {
        let create = create.validated()?;

        match self.remote.create(&create).await {
            Ok(note) => {
                self.notes.upsert(note.clone()).await?;
                self.emit_cache_updated().await?;
                Ok(note)
            }
            Err(e) if e.is_network() => {
                info!(error = %e, "server unreachable, creating note locally");
                let temp_id = self.next_temp_id().await?;
                let now = Utc::now();
                let known_tags = self.tags.read().await?;
                let note = Note {
                    id: temp_id,
                    title: create.title.clone(),
                    content: create.content.clone(),
                    archived: create.archived.unwrap_or(false),
                    tags: resolve_tags(create.tags.as_deref().unwrap_or_default(), &known_tags),
                    created_at: now,
                    updated_at: now,
                };
                self.notes.upsert(note.clone()).await?;
                self.queue(PendingChange::Create {
                    temp_id,
                    data: create,
                })
                .await?;
                self.emit_cache_updated().await?;
                Ok(note)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn update_note(&self, id: i64, update: UpdateNote) -> Result<Note, Error> {
        let update = update.validated()?;
        if update.is_empty() {
            return Err(Error::Validation("nothing to update".into()));
        }
        if is_temporary_id(id) {
            return self.update_offline(id, update).await;
        }

        match self.remote.update(id, &update).await {
            Ok(note) => {
                self.notes.upsert(note.clone()).await?;
                self.emit_cache_updated().await?;
                Ok(note)
            }
            Err(e) if e.is_network() => {
                info!(id, error = %e, "server unreachable, updating note locally");
                self.update_offline(id, update).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn archive_note(&self, id: i64) -> Result<Note, Error> {
        self.update_note(id, UpdateNote::archived(true)).await
    }

    pub async fn unarchive_note(&self, id: i64) -> Result<Note, Error> {
        self.update_note(id, UpdateNote::archived(false)).await
    }

    pub async fn delete_note(&self, id: i64) -> Result<(), Error> {
        if is_temporary_id(id) {
            return self.delete_offline(id).await;
        }

        match self.remote.delete(id).await {
            Ok(()) => {
                self.notes.remove(id).await?;
                self.emit_cache_updated().await
            }
            Err(e) if e.is_network() => {
                info!(id, error = %e, "server unreachable, deleting note locally");
                self.delete_offline(id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Attach a tag. Offline, the full resulting tag set is queued as an update.
    pub async fn add_tag_to_note(&self, note_id: i64, tag_id: i64) -> Result<Note, Error> {
        if !is_temporary_id(note_id) {
            match self.remote.add_tag(note_id, tag_id).await {
                Ok(note) => return self.store_note(note).await,
                Err(e) if e.is_network() => {
                    info!(note_id, tag_id, "server unreachable, tagging note locally");
                }
                Err(e) => return Err(e),
            }
        }
        let mut ids = self.cached_tag_ids(note_id).await?;
        ids.push(tag_id);
        self.update_offline(note_id, UpdateNote::tags(ids).validated()?)
            .await
    }

    pub async fn remove_tag_from_note(&self, note_id: i64, tag_id: i64) -> Result<Note, Error> {
        if !is_temporary_id(note_id) {
            match self.remote.remove_tag(note_id, tag_id).await {
                Ok(note) => return self.store_note(note).await,
                Err(e) if e.is_network() => {
                    info!(note_id, tag_id, "server unreachable, untagging note locally");
                }
                Err(e) => return Err(e),
            }
        }
        let mut ids = self.cached_tag_ids(note_id).await?;
        ids.retain(|id| *id != tag_id);
        self.update_offline(note_id, UpdateNote::tags(ids)).await
    }

    /// Replay the pending-change log against the server, then overwrite the
    /// cache with a fresh listing.
    ///
    /// Records are replayed strictly in append order. A record the server
    /// rejects is dropped and reported; losing the connection mid-run puts the
    /// unattempted remainder back into the log.
    pub async fn sync_pending_changes(&self) -> Result<ReconcileOutcome, Error> {
        let Some(_guard) = ReconcileGuard::enter(&self.state) else {
            debug!("reconciliation already running, ignoring trigger");
            return Ok(ReconcileOutcome::AlreadyRunning);
        };

        let changes = self.log.drain_all().await?;
        if changes.is_empty() {
            debug!("no pending changes");
            return Ok(ReconcileOutcome::NothingPending);
        }
        let consumed = changes.len();
        info!(pending = consumed, "replaying pending changes");
        self.emit(SyncEvent::ReconcileStarted { pending: consumed });

        let mut report = ReconcileReport::default();
        let mut server_ids: HashMap<i64, i64> = HashMap::new();
        let mut requeue = Vec::new();
        let mut changes = changes.into_iter();

        while let Some(change) = changes.next() {
            let change = change.with_substituted_ids(&server_ids);

            if let Some(target) = change.target_id().filter(|id| is_temporary_id(*id)) {
                warn!(%change, "skipping change for a note the server never created");
                report.failed.push(FailedChange {
                    reason: format!("note {} was never created on the server", target),
                    change,
                });
                continue;
            }

            match self.replay(&change).await {
                Ok(created) => {
                    if let Some((temp_id, server_id)) = created {
                        debug!(temp_id, server_id, "temporary id resolved");
                        server_ids.insert(temp_id, server_id);
                    }
                    report.replayed += 1;
                }
                Err(e) if e.is_network() => {
                    warn!(error = %e, "connection lost during replay, keeping remaining changes");
                    requeue.push(change);
                    requeue.extend(
                        changes
                            .by_ref()
                            .map(|rest| rest.with_substituted_ids(&server_ids)),
                    );
                    break;
                }
                Err(e) => {
                    warn!(%change, error = %e, "server rejected pending change, dropping it");
                    report.failed.push(FailedChange {
                        change,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.requeued = requeue.len();
        let interrupted = !requeue.is_empty();
        self.log.settle(consumed, requeue, &server_ids).await?;
        self.adopt_server_ids(&server_ids).await?;

        if interrupted {
            self.emit(SyncEvent::ReconcileFinished(report.clone()));
            return Ok(ReconcileOutcome::Interrupted(report));
        }

        let fresh = self.remote.list().await?;
        self.store_snapshot(&fresh).await?;
        info!(
            replayed = report.replayed,
            failed = report.failed.len(),
            "reconciliation complete"
        );
        self.emit(SyncEvent::ReconcileFinished(report.clone()));
        Ok(ReconcileOutcome::Completed(report))
    }

    /// Send one record. A replayed create yields `(temporary id, server id)`.
    async fn replay(&self, change: &PendingChange) -> Result<Option<(i64, i64)>, Error> {
        debug!(%change, "replaying");
        match change {
            PendingChange::Create { temp_id, data } => {
                let created = self.remote.create(data).await?;
                Ok(Some((*temp_id, created.id)))
            }
            PendingChange::Update { id, data } => {
                self.remote.update(*id, data).await?;
                Ok(None)
            }
            PendingChange::Delete { id } => {
                self.remote.delete(*id).await?;
                Ok(None)
            }
        }
    }

    async fn update_offline(&self, id: i64, update: UpdateNote) -> Result<Note, Error> {
        let mut note = self
            .notes
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("note {} is not cached", id)))?;
        let mut known_tags = self.tags.read().await?;
        known_tags.extend(note.tags.iter().cloned());
        update.apply_to(&mut note, &known_tags, Utc::now());

        self.notes.upsert(note.clone()).await?;
        self.queue(PendingChange::Update { id, data: update })
            .await?;
        self.emit_cache_updated().await?;
        Ok(note)
    }

    async fn delete_offline(&self, id: i64) -> Result<(), Error> {
        if !self.notes.remove(id).await? {
            return Err(Error::NotFound(format!("note {} is not cached", id)));
        }
        self.queue(PendingChange::Delete { id }).await?;
        self.emit_cache_updated().await
    }

    async fn queue(&self, change: PendingChange) -> Result<(), Error> {
        debug!(%change, "queueing change");
        let kind = change.kind();
        self.log.append(change).await?;
        self.emit(SyncEvent::ChangeQueued { kind });
        Ok(())
    }

    async fn store_note(&self, note: Note) -> Result<Note, Error> {
        self.notes.upsert(note.clone()).await?;
        self.emit_cache_updated().await?;
        Ok(note)
    }

    /// Re-key cached notes whose create was replayed before the run stopped.
    async fn adopt_server_ids(&self, server_ids: &HashMap<i64, i64>) -> Result<(), Error> {
        if server_ids.is_empty() {
            return Ok(());
        }
        let mut notes = self.notes.read().await?;
        for note in notes.iter_mut() {
            if let Some(server_id) = server_ids.get(&note.id) {
                note.id = *server_id;
            }
        }
        self.store_snapshot(&notes).await
    }

    async fn store_snapshot(&self, notes: &[Note]) -> Result<(), Error> {
        self.notes.write(notes).await?;
        self.emit(SyncEvent::CacheUpdated { notes: notes.len() });
        Ok(())
    }

    async fn emit_cache_updated(&self) -> Result<(), Error> {
        let notes = self.notes.read().await?.len();
        self.emit(SyncEvent::CacheUpdated { notes });
        Ok(())
    }

    async fn cached_tag_ids(&self, note_id: i64) -> Result<Vec<i64>, Error> {
        self.notes
            .find(note_id)
            .await?
            .map(|n| n.tag_ids())
            .ok_or_else(|| Error::NotFound(format!("note {} is not cached", note_id)))
    }

    /// Next temporary id: negative, derived from the wall clock, strictly
    /// decreasing, and unused by any cached note.
    async fn next_temp_id(&self) -> Result<i64, Error> {
        let mut candidate = -Utc::now().timestamp_millis();
        if candidate >= self.last_temp_id.get() {
            candidate = self.last_temp_id.get() - 1;
        }
        let cached = self.notes.read().await?;
        while cached.iter().any(|n| n.id == candidate) {
            candidate -= 1;
        }
        self.last_temp_id.set(candidate);
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{note, FakeRemote};
    use crate::{ChangeKind, MemoryStore, Tag};

    fn engine_with(remote: FakeRemote) -> SyncEngine<FakeRemote, MemoryStore> {
        SyncEngine::new(remote, MemoryStore::new())
    }

    async fn offline_engine_with_cached(notes: Vec<Note>) -> SyncEngine<FakeRemote, MemoryStore> {
        let engine = engine_with(FakeRemote::with_notes(notes));
        engine.list_notes().await.unwrap();
        engine.remote().set_online(false);
        engine
    }

    #[tokio::test]
    async fn test_online_create_caches_server_note() {
        let engine = engine_with(FakeRemote::new());

        let created = engine
            .create_note(CreateNote::new("T", "C"))
            .await
            .unwrap();

        assert_eq!(created.id, 100);
        assert_eq!(engine.cached_notes().await.unwrap(), vec![created]);
        assert!(engine.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_create_is_optimistic_and_queued() {
        let engine = engine_with(FakeRemote::new());
        engine.remote().set_online(false);

        let created = engine
            .create_note(CreateNote::new("T", "C"))
            .await
            .unwrap();

        assert!(created.is_temporary());
        assert_eq!(created.title, "T");
        assert_eq!(created.content, "C");
        assert!(!created.archived);
        assert_eq!(engine.cached_notes().await.unwrap(), vec![created.clone()]);
        assert_eq!(
            engine.pending_changes().await.unwrap(),
            vec![PendingChange::Create {
                temp_id: created.id,
                data: CreateNote::new("T", "C"),
            }]
        );
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_network_call() {
        let engine = engine_with(FakeRemote::new());

        let err = engine
            .create_note(CreateNote::new("  ", "C"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(engine.remote().calls().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_update_leaves_cache_and_log_alone() {
        let engine = engine_with(FakeRemote::with_notes(vec![note(1, "a")]));
        engine.list_notes().await.unwrap();
        let before = engine.cached_notes().await.unwrap();

        let err = engine
            .update_note(404, UpdateNote::archived(true))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(engine.cached_notes().await.unwrap(), before);
        assert!(engine.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_rejection_is_not_queued() {
        let engine = engine_with(FakeRemote::new());
        engine.remote().reject_title("bad");

        let err = engine
            .create_note(CreateNote::new("bad", "C"))
            .await
            .unwrap_err();

        assert_eq!(err, Error::server(400, "title rejected"));
        assert!(engine.cached_notes().await.unwrap().is_empty());
        assert!(engine.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_update_and_delete_touch_cached_copy() {
        let engine = offline_engine_with_cached(vec![note(1, "a"), note(2, "b")]).await;

        let archived = engine.archive_note(1).await.unwrap();
        assert!(archived.archived);
        engine.delete_note(2).await.unwrap();

        let cached = engine.cached_notes().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].archived);
        assert_eq!(
            engine.pending_changes().await.unwrap(),
            vec![
                PendingChange::Update {
                    id: 1,
                    data: UpdateNote::archived(true),
                },
                PendingChange::Delete { id: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_mutation_of_uncached_note_is_not_found() {
        let engine = offline_engine_with_cached(vec![]).await;

        assert!(matches!(
            engine.delete_note(9).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            engine.archive_note(9).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(engine.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_follows_append_order_with_resolved_ids() {
        let engine = engine_with(FakeRemote::new());
        engine.remote().set_online(false);

        let a = engine
            .create_note(CreateNote::new("A", "C"))
            .await
            .unwrap();
        engine
            .update_note(
                a.id,
                UpdateNote {
                    title: Some("A2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        engine.delete_note(a.id).await.unwrap();

        engine.remote().set_online(true);
        let outcome = engine.sync_pending_changes().await.unwrap();

        assert_eq!(
            engine.remote().mutation_calls(),
            vec!["create A", "update 100", "delete 100"]
        );
        let report = outcome.report().unwrap();
        assert_eq!(report.replayed, 3);
        assert!(report.failed.is_empty());
        assert!(engine.pending_changes().await.unwrap().is_empty());
        assert!(engine.remote().server_notes().is_empty());
        assert!(engine.cached_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_with_empty_log_makes_no_calls() {
        let engine = engine_with(FakeRemote::with_notes(vec![note(1, "a")]));

        let outcome = engine.sync_pending_changes().await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::NothingPending);
        assert!(engine.remote().calls().is_empty());
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_reconcile_overwrites_cache_with_server_listing() {
        let engine =
            offline_engine_with_cached(vec![note(1, "a"), note(2, "b"), note(3, "c")]).await;
        engine.archive_note(1).await.unwrap();

        engine.remote().set_online(true);
        engine
            .remote()
            .replace_server_notes(vec![note(1, "a"), note(7, "g")]);
        engine.sync_pending_changes().await.unwrap();

        let ids: Vec<i64> = engine
            .cached_notes()
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1, 7]);
    }

    #[tokio::test]
    async fn test_rejected_records_are_dropped_and_dependents_skipped() {
        let engine = engine_with(FakeRemote::new());
        engine.remote().reject_title("bad");
        engine.remote().set_online(false);

        let bad = engine
            .create_note(CreateNote::new("bad", "C"))
            .await
            .unwrap();
        engine.archive_note(bad.id).await.unwrap();
        engine
            .create_note(CreateNote::new("good", "C"))
            .await
            .unwrap();

        engine.remote().set_online(true);
        let outcome = engine.sync_pending_changes().await.unwrap();

        let ReconcileOutcome::Completed(report) = outcome else {
            panic!("expected a completed run, got {:?}", outcome);
        };
        assert_eq!(report.replayed, 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].change.kind(), ChangeKind::Create);
        assert_eq!(report.failed[1].change.target_id(), Some(bad.id));
        assert_eq!(
            engine.remote().mutation_calls(),
            vec!["create bad", "create good"]
        );
        assert!(engine.pending_changes().await.unwrap().is_empty());
        let titles: Vec<String> = engine
            .cached_notes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["good"]);
    }

    #[tokio::test]
    async fn test_connection_drop_requeues_remaining_changes() {
        let engine = engine_with(FakeRemote::new());
        engine.remote().set_online(false);
        let a = engine
            .create_note(CreateNote::new("A", "C"))
            .await
            .unwrap();
        engine.archive_note(a.id).await.unwrap();
        let b = engine
            .create_note(CreateNote::new("B", "C"))
            .await
            .unwrap();

        engine.remote().set_online(true);
        engine.remote().drop_connection_after(1);
        let outcome = engine.sync_pending_changes().await.unwrap();

        let ReconcileOutcome::Interrupted(report) = outcome else {
            panic!("expected an interrupted run, got {:?}", outcome);
        };
        assert_eq!(report.replayed, 1);
        assert_eq!(report.requeued, 2);

        let pending = engine.pending_changes().await.unwrap();
        assert_eq!(pending.len(), 2);
        // the update now targets the server id of the replayed create
        assert_eq!(pending[0].target_id(), Some(100));
        assert_eq!(pending[1].kind(), ChangeKind::Create);
        let cached: Vec<(i64, String)> = engine
            .cached_notes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| (n.id, n.title))
            .collect();
        assert_eq!(cached, vec![(b.id, "B".to_string()), (100, "A".to_string())]);

        engine.remote().set_online(true);
        engine.sync_pending_changes().await.unwrap();
        assert_eq!(
            engine.remote().mutation_calls(),
            vec!["create A", "update 100", "create B"]
        );
        assert!(engine.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_one_reconciliation_runs_at_a_time() {
        let engine = engine_with(FakeRemote::new());
        engine.remote().set_online(false);
        engine
            .create_note(CreateNote::new("A", "C"))
            .await
            .unwrap();
        engine.remote().set_online(true);
        engine.remote().cooperative();

        let (first, second) = tokio::join!(
            engine.sync_pending_changes(),
            engine.sync_pending_changes()
        );

        assert!(matches!(first.unwrap(), ReconcileOutcome::Completed(_)));
        assert_eq!(second.unwrap(), ReconcileOutcome::AlreadyRunning);
        assert_eq!(engine.remote().mutation_calls(), vec!["create A"]);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_changes_made_during_reconciliation_survive() {
        let engine = engine_with(FakeRemote::with_notes(vec![note(1, "a")]));
        engine.list_notes().await.unwrap();
        engine.remote().set_online(false);
        engine
            .create_note(CreateNote::new("A", "C"))
            .await
            .unwrap();
        engine.remote().set_online(true);
        engine.remote().cooperative();

        let temp = engine.cached_notes().await.unwrap()[0].id;
        let (outcome, update) = tokio::join!(
            engine.sync_pending_changes(),
            // temporary ids never go to the server directly
            engine.update_note(
                temp,
                UpdateNote {
                    content: Some("edited".into()),
                    ..Default::default()
                }
            )
        );
        outcome.unwrap();
        update.unwrap();

        assert_eq!(
            engine.pending_changes().await.unwrap(),
            vec![PendingChange::Update {
                id: 100,
                data: UpdateNote {
                    content: Some("edited".into()),
                    ..Default::default()
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_list_falls_back_to_cache_only_when_cached() {
        let engine = engine_with(FakeRemote::with_notes(vec![note(1, "a")]));
        engine.remote().set_online(false);
        assert!(engine.list_notes().await.unwrap_err().is_network());

        engine.remote().set_online(true);
        let listing = engine.list_notes().await.unwrap();
        assert!(!listing.is_offline());

        engine.remote().set_online(false);
        let listing = engine.list_notes().await.unwrap();
        assert!(listing.is_offline());
        assert_eq!(listing.items.len(), 1);
    }

    #[tokio::test]
    async fn test_temporary_ids_are_unique_and_decreasing() {
        let engine = engine_with(FakeRemote::new());
        engine.remote().set_online(false);

        let first = engine
            .create_note(CreateNote::new("A", "C"))
            .await
            .unwrap();
        let second = engine
            .create_note(CreateNote::new("B", "C"))
            .await
            .unwrap();

        assert!(first.id < 0);
        assert!(second.id < first.id);
    }

    #[tokio::test]
    async fn test_offline_tagging_queues_full_tag_set() {
        let tag = |id: i64, name: &str| Tag {
            id,
            name: name.into(),
            color: "#fff".into(),
        };
        let mut tagged = note(1, "a");
        tagged.tags = vec![tag(3, "work")];

        let store = Rc::new(MemoryStore::new());
        TagCache::new(Rc::clone(&store))
            .write(&[tag(3, "work"), tag(5, "home")])
            .await
            .unwrap();
        let engine = SyncEngine::with_shared_store(FakeRemote::with_notes(vec![tagged]), store);
        engine.list_notes().await.unwrap();
        engine.remote().set_online(false);

        let added = engine.add_tag_to_note(1, 5).await.unwrap();
        assert_eq!(added.tag_ids(), vec![3, 5]);
        engine.remove_tag_from_note(1, 3).await.unwrap();

        assert_eq!(
            engine.pending_changes().await.unwrap(),
            vec![
                PendingChange::Update {
                    id: 1,
                    data: UpdateNote::tags(vec![3, 5]),
                },
                PendingChange::Update {
                    id: 1,
                    data: UpdateNote::tags(vec![5]),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_tagging_without_cached_tags_keeps_every_id() {
        let engine = offline_engine_with_cached(vec![note(1, "a")]).await;

        let first = engine.add_tag_to_note(1, 5).await.unwrap();
        assert_eq!(first.tag_ids(), vec![5]);
        assert!(first.tags[0].is_placeholder());
        let second = engine.add_tag_to_note(1, 6).await.unwrap();
        assert_eq!(second.tag_ids(), vec![5, 6]);

        let pending = engine.pending_changes().await.unwrap();
        assert_eq!(
            pending.last(),
            Some(&PendingChange::Update {
                id: 1,
                data: UpdateNote::tags(vec![5, 6]),
            })
        );

        engine.remote().set_online(true);
        engine.sync_pending_changes().await.unwrap();
        assert_eq!(engine.remote().server_notes()[0].tag_ids(), vec![5, 6]);
        assert_eq!(engine.cached_notes().await.unwrap()[0].tag_ids(), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_failed_refresh_still_rekeys_replayed_creates() {
        let engine = engine_with(FakeRemote::new());
        engine.remote().set_online(false);
        engine
            .create_note(CreateNote::new("A", "C"))
            .await
            .unwrap();

        engine.remote().set_online(true);
        // the create goes through, the listing afterwards does not
        engine.remote().drop_connection_after(1);
        let err = engine.sync_pending_changes().await.unwrap_err();
        assert!(err.is_network());

        assert!(engine.pending_changes().await.unwrap().is_empty());
        let cached: Vec<i64> = engine
            .cached_notes()
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(cached, vec![100]);

        engine
            .update_note(100, UpdateNote {
                title: Some("A2".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(engine.pending_changes().await.unwrap().len(), 1);

        engine.remote().set_online(true);
        engine.sync_pending_changes().await.unwrap();
        assert_eq!(engine.remote().mutation_calls(), vec!["create A", "update 100"]);
        assert_eq!(engine.remote().server_notes()[0].title, "A2");
    }

    #[tokio::test]
    async fn test_online_tagging_replaces_cached_note() {
        let engine = engine_with(FakeRemote::with_notes(vec![note(1, "a")]));
        engine.list_notes().await.unwrap();

        let updated = engine.add_tag_to_note(1, 2).await.unwrap();

        assert_eq!(updated.tag_ids(), vec![2]);
        assert_eq!(engine.cached_notes().await.unwrap()[0].tag_ids(), vec![2]);
    }

    #[tokio::test]
    async fn test_events_announce_queue_and_cache_updates() {
        let engine = engine_with(FakeRemote::new());
        let mut events = engine.subscribe();
        engine.remote().set_online(false);

        engine
            .create_note(CreateNote::new("A", "C"))
            .await
            .unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::ChangeQueued {
                kind: ChangeKind::Create
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::CacheUpdated { notes: 1 }
        );
    }
}
