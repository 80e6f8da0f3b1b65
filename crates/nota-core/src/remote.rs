use crate::{CreateNote, CreateTag, Error, Note, Tag, UpdateNote, UpdateTag};

/// Server-side note API consumed by the sync engine.
///
/// Uses `async_trait` with a `?Send` bound: the sync core runs on a single
/// logical thread and implementations are free to hold non-`Send` state.
///
/// Implementations must report a missing connection as
/// [`Error::NetworkUnavailable`], a 404 as [`Error::NotFound`], and every other
/// rejection (including authorization failures) as [`Error::Server`].
#[async_trait::async_trait(?Send)]
pub trait NoteService {
    /// All notes of the current user, newest first.
    async fn list(&self) -> Result<Vec<Note>, Error>;

    async fn get(&self, id: i64) -> Result<Note, Error>;

    async fn create(&self, note: &CreateNote) -> Result<Note, Error>;

    async fn update(&self, id: i64, update: &UpdateNote) -> Result<Note, Error>;

    async fn delete(&self, id: i64) -> Result<(), Error>;

    async fn add_tag(&self, note_id: i64, tag_id: i64) -> Result<Note, Error>;

    async fn remove_tag(&self, note_id: i64, tag_id: i64) -> Result<Note, Error>;
}

/// Server-side tag API, scoped to the authenticated owner.
#[async_trait::async_trait(?Send)]
pub trait TagService {
    async fn list(&self) -> Result<Vec<Tag>, Error>;

    async fn create(&self, tag: &CreateTag) -> Result<Tag, Error>;

    async fn update(&self, id: i64, update: &UpdateTag) -> Result<Tag, Error>;

    async fn delete(&self, id: i64) -> Result<(), Error>;
}

/// Cheap reachability check used to drive the connectivity monitor.
#[async_trait::async_trait(?Send)]
pub trait Reachability {
    async fn is_reachable(&self) -> bool;
}
