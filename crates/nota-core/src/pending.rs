//! Pending-Change Log: mutations made while offline, in arrival order.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CreateNote, Error, KeyValueStore, UpdateNote};

const STORAGE_KEY: &str = "pending_changes";

/// A mutation the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PendingChange {
    /// `temp_id` is the identifier the optimistic note carries locally.
    Create {
        #[serde(rename = "tempId")]
        temp_id: i64,
        data: CreateNote,
    },
    Update {
        id: i64,
        data: UpdateNote,
    },
    Delete {
        id: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

impl PendingChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            PendingChange::Create { .. } => ChangeKind::Create,
            PendingChange::Update { .. } => ChangeKind::Update,
            PendingChange::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// The existing note this change targets. `None` for creates.
    pub fn target_id(&self) -> Option<i64> {
        match self {
            PendingChange::Create { .. } => None,
            PendingChange::Update { id, .. } | PendingChange::Delete { id } => Some(*id),
        }
    }

    /// Rewrite the target id using a temporary-to-server id mapping.
    pub fn with_substituted_ids(self, ids: &HashMap<i64, i64>) -> Self {
        let map = |id: i64| ids.get(&id).copied().unwrap_or(id);
        match self {
            PendingChange::Update { id, data } => PendingChange::Update { id: map(id), data },
            PendingChange::Delete { id } => PendingChange::Delete { id: map(id) },
            create => create,
        }
    }
}

impl fmt::Display for PendingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingChange::Create { temp_id, data } => {
                write!(f, "create {} \"{}\"", temp_id, data.title)
            }
            PendingChange::Update { id, .. } => write!(f, "update {}", id),
            PendingChange::Delete { id } => write!(f, "delete {}", id),
        }
    }
}

/// Ordered durable queue of [`PendingChange`]s.
pub struct PendingLog<S> {
    store: S,
}

impl<S: KeyValueStore> PendingLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Add a record at the end of the log.
    pub async fn append(&self, change: PendingChange) -> Result<(), Error> {
        let mut changes = self.drain_all().await?;
        changes.push(change);
        self.write(&changes).await
    }

    /// Every record in append order. Nothing is removed.
    pub async fn drain_all(&self) -> Result<Vec<PendingChange>, Error> {
        match self.store.get(STORAGE_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("Failed to parse pending changes: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    pub async fn clear(&self) -> Result<(), Error> {
        self.store.remove(STORAGE_KEY).await
    }

    /// Close out a replay run in one write: drop the first `consumed` records,
    /// put `requeue` back at the front, and keep anything appended since the
    /// run began, rewritten onto the server ids in `resolved`.
    pub async fn settle(
        &self,
        consumed: usize,
        requeue: Vec<PendingChange>,
        resolved: &HashMap<i64, i64>,
    ) -> Result<(), Error> {
        let appended = self
            .drain_all()
            .await?
            .into_iter()
            .skip(consumed)
            .map(|change| change.with_substituted_ids(resolved));
        let remaining: Vec<PendingChange> = requeue.into_iter().chain(appended).collect();
        if remaining.is_empty() {
            self.clear().await
        } else {
            self.write(&remaining).await
        }
    }

    async fn write(&self, changes: &[PendingChange]) -> Result<(), Error> {
        let raw = serde_json::to_string(changes)
            .map_err(|e| Error::Storage(format!("Failed to serialize pending changes: {}", e)))?;
        self.store.set(STORAGE_KEY, &raw).await
    }
}
