use nota_core::{
    CreateNote, CreateTag, Error, Note, NoteService, Reachability, Tag, TagService, UpdateNote,
    UpdateTag,
};
use reqwest::RequestBuilder;

use crate::ApiClient;

/// [`NoteService`] over `/notes`.
#[derive(Debug, Clone)]
pub struct HttpNoteService {
    client: ApiClient,
}

impl HttpNoteService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn list_request(&self) -> Result<RequestBuilder, Error> {
        self.client.get(&["notes"])
    }

    fn get_request(&self, id: i64) -> Result<RequestBuilder, Error> {
        self.client.get(&["notes", &id.to_string()])
    }

    fn create_request(&self, note: &CreateNote) -> Result<RequestBuilder, Error> {
        Ok(self.client.post(&["notes"])?.json(note))
    }

    fn update_request(&self, id: i64, update: &UpdateNote) -> Result<RequestBuilder, Error> {
        Ok(self.client.patch(&["notes", &id.to_string()])?.json(update))
    }

    fn delete_request(&self, id: i64) -> Result<RequestBuilder, Error> {
        self.client.delete(&["notes", &id.to_string()])
    }

    fn add_tag_request(&self, note_id: i64, tag_id: i64) -> Result<RequestBuilder, Error> {
        let (note_id, tag_id) = (note_id.to_string(), tag_id.to_string());
        self.client.post(&["notes", &note_id, "tags", &tag_id])
    }

    fn remove_tag_request(&self, note_id: i64, tag_id: i64) -> Result<RequestBuilder, Error> {
        let (note_id, tag_id) = (note_id.to_string(), tag_id.to_string());
        self.client.delete(&["notes", &note_id, "tags", &tag_id])
    }
}

#[async_trait::async_trait(?Send)]
impl NoteService for HttpNoteService {
    async fn list(&self) -> Result<Vec<Note>, Error> {
        self.client.json(self.list_request()?).await
    }

    async fn get(&self, id: i64) -> Result<Note, Error> {
        self.client.json(self.get_request(id)?).await
    }

    async fn create(&self, note: &CreateNote) -> Result<Note, Error> {
        self.client.json(self.create_request(note)?).await
    }

    async fn update(&self, id: i64, update: &UpdateNote) -> Result<Note, Error> {
        self.client.json(self.update_request(id, update)?).await
    }

    async fn delete(&self, id: i64) -> Result<(), Error> {
        self.client.send(self.delete_request(id)?).await?;
        Ok(())
    }

    async fn add_tag(&self, note_id: i64, tag_id: i64) -> Result<Note, Error> {
        self.client.json(self.add_tag_request(note_id, tag_id)?).await
    }

    async fn remove_tag(&self, note_id: i64, tag_id: i64) -> Result<Note, Error> {
        self.client
            .json(self.remove_tag_request(note_id, tag_id)?)
            .await
    }
}

#[async_trait::async_trait(?Send)]
impl Reachability for HttpNoteService {
    async fn is_reachable(&self) -> bool {
        self.client.is_reachable().await
    }
}

/// [`TagService`] over `/tags`.
#[derive(Debug, Clone)]
pub struct HttpTagService {
    client: ApiClient,
}

impl HttpTagService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn create_request(&self, tag: &CreateTag) -> Result<RequestBuilder, Error> {
        Ok(self.client.post(&["tags"])?.json(tag))
    }

    fn update_request(&self, id: i64, update: &UpdateTag) -> Result<RequestBuilder, Error> {
        Ok(self.client.patch(&["tags", &id.to_string()])?.json(update))
    }

    fn delete_request(&self, id: i64) -> Result<RequestBuilder, Error> {
        self.client.delete(&["tags", &id.to_string()])
    }
}

#[async_trait::async_trait(?Send)]
impl TagService for HttpTagService {
    async fn list(&self) -> Result<Vec<Tag>, Error> {
        self.client.json(self.client.get(&["tags"])?).await
    }

    async fn create(&self, tag: &CreateTag) -> Result<Tag, Error> {
        self.client.json(self.create_request(tag)?).await
    }

    async fn update(&self, id: i64, update: &UpdateTag) -> Result<Tag, Error> {
        self.client.json(self.update_request(id, update)?).await
    }

    async fn delete(&self, id: i64) -> Result<(), Error> {
        self.client.send(self.delete_request(id)?).await?;
        Ok(())
    }
}
