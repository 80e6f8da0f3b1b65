//! Nota core library - note and tag types, the offline cache, the
//! pending-change log, and the sync engine that ties them to a server.
//!
//! This crate does no I/O of its own: storage and the remote API come in
//! through the [`KeyValueStore`], [`NoteService`] and [`TagService`] traits.

mod connectivity;
mod engine;
mod error;
mod events;
mod note;
mod pending;
mod remote;
mod snapshot;
mod store;
mod tag;
mod tags;

#[cfg(test)]
mod testing;

pub use connectivity::ConnectivityMonitor;
pub use engine::{SyncEngine, SyncState};
pub use error::Error;
pub use events::{FailedChange, Listing, ReconcileOutcome, ReconcileReport, Source, SyncEvent};
pub use note::{is_temporary_id, CreateNote, Note, NoteQuery, UpdateNote};
pub use pending::{ChangeKind, PendingChange, PendingLog};
pub use remote::{NoteService, Reachability, TagService};
pub use snapshot::{NoteCache, Snapshot, Snapshotted, TagCache};
pub use store::{KeyValueStore, MemoryStore};
pub use tag::{CreateTag, Tag, UpdateTag};
pub use tags::TagBook;
