//! Local Durable Cache: the last known server snapshot, with optimistic local
//! mutations layered on top.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::{Error, KeyValueStore, Note, Tag};

/// Entities that are snapshotted as a whole list under one storage key.
pub trait Snapshotted: Clone + Serialize + DeserializeOwned {
    /// Storage key holding the serialized list.
    const STORAGE_KEY: &'static str;

    fn id(&self) -> i64;
}

impl Snapshotted for Note {
    const STORAGE_KEY: &'static str = "cached_notes";

    fn id(&self) -> i64 {
        self.id
    }
}

impl Snapshotted for Tag {
    const STORAGE_KEY: &'static str = "cached_tags";

    fn id(&self) -> i64 {
        self.id
    }
}

/// Ordered snapshot of `T` persisted in a [`KeyValueStore`].
///
/// Every write serializes the full list and stores it with a single `set`, so
/// readers see either the old or the new snapshot.
pub struct Snapshot<T, S> {
    store: S,
    _entity: PhantomData<T>,
}

pub type NoteCache<S> = Snapshot<Note, S>;
pub type TagCache<S> = Snapshot<Tag, S>;

impl<T: Snapshotted, S: KeyValueStore> Snapshot<T, S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// The stored snapshot, or `None` if nothing was ever written.
    pub async fn load(&self) -> Result<Option<Vec<T>>, Error> {
        match self.store.get(T::STORAGE_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                Error::Storage(format!("Failed to parse {}: {}", T::STORAGE_KEY, e))
            }),
            None => Ok(None),
        }
    }

    /// The stored snapshot, empty if nothing was ever written.
    pub async fn read(&self) -> Result<Vec<T>, Error> {
        Ok(self.load().await?.unwrap_or_default())
    }

    /// Replace the whole snapshot.
    pub async fn write(&self, items: &[T]) -> Result<(), Error> {
        let raw = serde_json::to_string(items).map_err(|e| {
            Error::Storage(format!("Failed to serialize {}: {}", T::STORAGE_KEY, e))
        })?;
        self.store.set(T::STORAGE_KEY, &raw).await
    }

    pub async fn find(&self, id: i64) -> Result<Option<T>, Error> {
        Ok(self.read().await?.into_iter().find(|item| item.id() == id))
    }

    /// Replace the entry with the same id in place, or insert at the front.
    pub async fn upsert(&self, item: T) -> Result<(), Error> {
        let mut items = self.read().await?;
        match items.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => *existing = item,
            None => items.insert(0, item),
        }
        self.write(&items).await
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub async fn remove(&self, id: i64) -> Result<bool, Error> {
        let mut items = self.read().await?;
        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() == before {
            return Ok(false);
        }
        self.write(&items).await?;
        Ok(true)
    }
}
