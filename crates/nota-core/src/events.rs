use crate::{ChangeKind, Note, NoteQuery, PendingChange};

/// Where a listing was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Fresh data from the server; the cache now mirrors it.
    Network,
    /// Server unreachable; last stored snapshot.
    Cache,
}

/// A list of entities plus where it came from.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub source: Source,
}

impl<T> Listing<T> {
    pub fn from_network(items: Vec<T>) -> Self {
        Self {
            items,
            source: Source::Network,
        }
    }

    pub fn from_cache(items: Vec<T>) -> Self {
        Self {
            items,
            source: Source::Cache,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.source == Source::Cache
    }
}

impl Listing<Note> {
    /// Unarchived notes carrying any of `tags`, or all of them if `tags` is empty.
    pub fn active_notes(&self, tags: &[i64]) -> Vec<&Note> {
        NoteQuery::active().with_tags(tags.to_vec()).apply(&self.items)
    }

    pub fn archived_notes(&self) -> Vec<&Note> {
        NoteQuery::archived().apply(&self.items)
    }
}

/// Notifications published by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The note snapshot was rewritten; readers should refresh.
    CacheUpdated { notes: usize },
    /// A mutation was applied optimistically and queued for replay.
    ChangeQueued { kind: ChangeKind },
    ReconcileStarted { pending: usize },
    ReconcileFinished(ReconcileReport),
    ConnectivityChanged { online: bool },
}

/// A queued change the server refused during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedChange {
    pub change: PendingChange,
    pub reason: String,
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub replayed: usize,
    pub failed: Vec<FailedChange>,
    /// Changes put back into the log because connectivity dropped mid-run.
    pub requeued: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The log was empty; no remote call was made.
    NothingPending,
    /// Another run holds the `Reconciling` state; this trigger was ignored.
    AlreadyRunning,
    /// Every record was attempted and the cache was refreshed from the server.
    Completed(ReconcileReport),
    /// Connectivity dropped during replay; the rest of the log was kept.
    Interrupted(ReconcileReport),
}

impl ReconcileOutcome {
    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            ReconcileOutcome::Completed(report) | ReconcileOutcome::Interrupted(report) => {
                Some(report)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::note;
    use crate::Tag;

    fn listing() -> Listing<Note> {
        let mut tagged = note(1, "tagged");
        tagged.tags = vec![Tag {
            id: 4,
            name: "work".into(),
            color: "#123".into(),
        }];
        let plain = note(2, "plain");
        let mut archived = note(3, "archived");
        archived.archived = true;
        Listing::from_cache(vec![tagged, plain, archived])
    }

    fn ids(notes: Vec<&Note>) -> Vec<i64> {
        notes.into_iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_views_split_on_archived() {
        let listing = listing();
        assert_eq!(ids(listing.active_notes(&[])), vec![1, 2]);
        assert_eq!(ids(listing.archived_notes()), vec![3]);
        assert!(listing.is_offline());
    }

    #[test]
    fn test_tag_filter_matches_any_selected_tag() {
        let listing = listing();
        assert_eq!(ids(listing.active_notes(&[4, 9])), vec![1]);
        assert!(listing.active_notes(&[9]).is_empty());
    }
}
