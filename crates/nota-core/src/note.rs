use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Tag};

/// A note as returned by `GET /notes`, tags nested.
///
/// Identifiers are positive when assigned by the server and negative while the
/// note only exists locally (see [`is_temporary_id`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

/// Whether `id` lives in the client-side temporary identifier space.
pub fn is_temporary_id(id: i64) -> bool {
    id < 0
}

impl Note {
    pub fn is_temporary(&self) -> bool {
        is_temporary_id(self.id)
    }

    /// Identifiers of the attached tags, sorted and deduplicated.
    pub fn tag_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.tags.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn has_any_tag(&self, tag_ids: &[i64]) -> bool {
        self.tags.iter().any(|t| tag_ids.contains(&t.id))
    }
}

/// Body of `POST /notes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNote {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<i64>>,
}

impl CreateNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<i64>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Trim title and content and reject them if empty.
    pub fn validated(self) -> Result<Self, Error> {
        Ok(Self {
            title: required_text("title", &self.title)?,
            content: required_text("content", &self.content)?,
            archived: self.archived,
            tags: self.tags.map(normalize_ids),
        })
    }
}

/// Body of `PATCH /notes/:id`. Absent fields are left untouched by the server;
/// `tags: Some(vec![])` clears every tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<i64>>,
}

impl UpdateNote {
    pub fn archived(archived: bool) -> Self {
        Self {
            archived: Some(archived),
            ..Default::default()
        }
    }

    pub fn tags(tags: Vec<i64>) -> Self {
        Self {
            tags: Some(tags),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.archived.is_none()
            && self.tags.is_none()
    }

    pub fn validated(self) -> Result<Self, Error> {
        Ok(Self {
            title: self
                .title
                .map(|t| required_text("title", &t))
                .transpose()?,
            content: self
                .content
                .map(|c| required_text("content", &c))
                .transpose()?,
            archived: self.archived,
            tags: self.tags.map(normalize_ids),
        })
    }

    /// Overlay this change on a local copy. Tag ids are resolved against
    /// `known_tags`; ids with no known tag are left off the local copy.
    pub fn apply_to(&self, note: &mut Note, known_tags: &[Tag], now: DateTime<Utc>) {
        if let Some(ref title) = self.title {
            note.title = title.clone();
        }
        if let Some(ref content) = self.content {
            note.content = content.clone();
        }
        if let Some(archived) = self.archived {
            note.archived = archived;
        }
        if let Some(ref ids) = self.tags {
            note.tags = resolve_tags(ids, known_tags);
        }
        note.updated_at = now;
    }
}

/// Filter applied to a listing, mirroring the active and archived views.
#[derive(Debug, Default, Clone)]
pub struct NoteQuery {
    pub archived: bool,
    /// Keep notes carrying ANY of these tags. Empty means no tag filter.
    pub tags: Vec<i64>,
}

impl NoteQuery {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn archived() -> Self {
        Self {
            archived: true,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<i64>) -> Self {
        self.tags = tags;
        self
    }

    pub fn matches(&self, note: &Note) -> bool {
        note.archived == self.archived && (self.tags.is_empty() || note.has_any_tag(&self.tags))
    }

    pub fn apply<'a>(&self, notes: &'a [Note]) -> Vec<&'a Note> {
        notes.iter().filter(|n| self.matches(n)).collect()
    }
}

/// Tags for `ids`, in order. Ids missing from `known_tags` get an unnamed
/// placeholder so the id survives until the server fills it in.
pub(crate) fn resolve_tags(ids: &[i64], known_tags: &[Tag]) -> Vec<Tag> {
    ids.iter()
        .map(|id| {
            known_tags
                .iter()
                .find(|t| t.id == *id)
                .cloned()
                .unwrap_or_else(|| Tag::placeholder(*id))
        })
        .collect()
}

fn required_text(field: &str, value: &str) -> Result<String, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn normalize_ids(mut ids: Vec<i64>) -> Vec<i64> {
    ids.sort_unstable();
    ids.dedup();
    ids
}
