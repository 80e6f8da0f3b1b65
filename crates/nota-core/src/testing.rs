//! Scripted in-process server used by the engine and monitor tests.

use std::cell::{Cell, RefCell};

use chrono::Utc;

use crate::{CreateNote, Error, Note, NoteService, UpdateNote};

pub(crate) struct FakeRemote {
    notes: RefCell<Vec<Note>>,
    next_id: Cell<i64>,
    online: Cell<bool>,
    /// Calls that reached the server, in order.
    calls: RefCell<Vec<String>>,
    /// Titles whose create is rejected with a 400.
    rejected_titles: RefCell<Vec<String>>,
    /// Number of further calls served before the connection drops.
    drop_after: Cell<Option<usize>>,
    /// Yield to the scheduler inside every call.
    cooperative: Cell<bool>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self {
            notes: RefCell::new(Vec::new()),
            next_id: Cell::new(100),
            online: Cell::new(true),
            calls: RefCell::new(Vec::new()),
            rejected_titles: RefCell::new(Vec::new()),
            drop_after: Cell::new(None),
            cooperative: Cell::new(false),
        }
    }

    pub(crate) fn with_notes(notes: Vec<Note>) -> Self {
        let remote = Self::new();
        *remote.notes.borrow_mut() = notes;
        remote
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.set(online);
    }

    pub(crate) fn reject_title(&self, title: &str) {
        self.rejected_titles.borrow_mut().push(title.to_string());
    }

    pub(crate) fn drop_connection_after(&self, calls: usize) {
        self.drop_after.set(Some(calls));
    }

    pub(crate) fn cooperative(&self) {
        self.cooperative.set(true);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn mutation_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c != "list" && !c.starts_with("get "))
            .collect()
    }

    pub(crate) fn server_notes(&self) -> Vec<Note> {
        self.notes.borrow().clone()
    }

    pub(crate) fn replace_server_notes(&self, notes: Vec<Note>) {
        *self.notes.borrow_mut() = notes;
    }

    async fn enter(&self, call: String) -> Result<(), Error> {
        if self.cooperative.get() {
            tokio::task::yield_now().await;
        }
        if let Some(remaining) = self.drop_after.get() {
            if remaining == 0 {
                self.online.set(false);
                self.drop_after.set(None);
            } else {
                self.drop_after.set(Some(remaining - 1));
            }
        }
        if !self.online.get() {
            return Err(Error::NetworkUnavailable("connection refused".into()));
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }

    fn find(&self, id: i64) -> Result<Note, Error> {
        self.notes
            .borrow()
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Note with ID {} not found", id)))
    }
}

pub(crate) fn note(id: i64, title: &str) -> Note {
    Note {
        id,
        title: title.to_string(),
        content: "Body".to_string(),
        archived: false,
        tags: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[async_trait::async_trait(?Send)]
impl NoteService for FakeRemote {
    async fn list(&self) -> Result<Vec<Note>, Error> {
        self.enter("list".into()).await?;
        Ok(self.notes.borrow().clone())
    }

    async fn get(&self, id: i64) -> Result<Note, Error> {
        self.enter(format!("get {}", id)).await?;
        self.find(id)
    }

    async fn create(&self, create: &CreateNote) -> Result<Note, Error> {
        self.enter(format!("create {}", create.title)).await?;
        if self.rejected_titles.borrow().contains(&create.title) {
            return Err(Error::server(400, "title rejected"));
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let mut created = note(id, &create.title);
        created.content = create.content.clone();
        created.archived = create.archived.unwrap_or(false);
        self.notes.borrow_mut().insert(0, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, update: &UpdateNote) -> Result<Note, Error> {
        self.enter(format!("update {}", id)).await?;
        let mut existing = self.find(id)?;
        update.apply_to(&mut existing, &[], Utc::now());
        let mut notes = self.notes.borrow_mut();
        if let Some(slot) = notes.iter_mut().find(|n| n.id == id) {
            *slot = existing.clone();
        }
        Ok(existing)
    }

    async fn delete(&self, id: i64) -> Result<(), Error> {
        self.enter(format!("delete {}", id)).await?;
        self.find(id)?;
        self.notes.borrow_mut().retain(|n| n.id != id);
        Ok(())
    }

    async fn add_tag(&self, note_id: i64, tag_id: i64) -> Result<Note, Error> {
        self.enter(format!("add_tag {} {}", note_id, tag_id)).await?;
        let mut existing = self.find(note_id)?;
        existing.tags.push(crate::Tag {
            id: tag_id,
            name: format!("tag{}", tag_id),
            color: "#000".into(),
        });
        self.replace(existing.clone());
        Ok(existing)
    }

    async fn remove_tag(&self, note_id: i64, tag_id: i64) -> Result<Note, Error> {
        self.enter(format!("remove_tag {} {}", note_id, tag_id)).await?;
        let mut existing = self.find(note_id)?;
        existing.tags.retain(|t| t.id != tag_id);
        self.replace(existing.clone());
        Ok(existing)
    }
}

impl FakeRemote {
    fn replace(&self, updated: Note) {
        let mut notes = self.notes.borrow_mut();
        if let Some(slot) = notes.iter_mut().find(|n| n.id == updated.id) {
            *slot = updated;
        }
    }
}
