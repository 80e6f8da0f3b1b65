use tracing::info;

use crate::{CreateTag, Error, KeyValueStore, Listing, Tag, TagCache, TagService, UpdateTag};

/// Tag management. Mutations are online-only; the last listing is kept so
/// tags can still be shown, and resolved for offline note edits, without a
/// connection.
pub struct TagBook<T, S> {
    remote: T,
    cache: TagCache<S>,
}

impl<T: TagService, S: KeyValueStore> TagBook<T, S> {
    pub fn new(remote: T, store: S) -> Self {
        Self {
            remote,
            cache: TagCache::new(store),
        }
    }

    pub async fn list_tags(&self) -> Result<Listing<Tag>, Error> {
        match self.remote.list().await {
            Ok(tags) => {
                self.cache.write(&tags).await?;
                Ok(Listing::from_network(tags))
            }
            Err(e) if e.is_network() => match self.cache.load().await? {
                Some(tags) => {
                    info!(tags = tags.len(), "server unreachable, serving cached tags");
                    Ok(Listing::from_cache(tags))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    pub async fn create_tag(&self, create: CreateTag) -> Result<Tag, Error> {
        let create = create.validated()?;
        let tag = self.remote.create(&create).await?;
        self.cache.upsert(tag.clone()).await?;
        Ok(tag)
    }

    pub async fn update_tag(&self, id: i64, update: UpdateTag) -> Result<Tag, Error> {
        let update = update.validated()?;
        if update.is_empty() {
            return Err(Error::Validation("nothing to update".into()));
        }
        let tag = self.remote.update(id, &update).await?;
        self.cache.upsert(tag.clone()).await?;
        Ok(tag)
    }

    pub async fn delete_tag(&self, id: i64) -> Result<(), Error> {
        self.remote.delete(id).await?;
        self.cache.remove(id).await?;
        Ok(())
    }
}
