use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Error;

const MAX_NAME_LEN: usize = 100;
const COLOR_PATTERN: &str = r"^#([A-Fa-f0-9]{6}|[A-Fa-f0-9]{3})$";

/// A tag owned by the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

/// Body of `POST /tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTag {
    pub name: String,
    pub color: String,
}

/// Body of `PATCH /tags/:id`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Tag {
    /// Stand-in for a tag attached offline before its details were cached.
    pub fn placeholder(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            color: String::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
    }

    /// The tag name, or `#<id>` for a placeholder.
    pub fn label(&self) -> String {
        if self.is_placeholder() {
            format!("#{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

impl CreateTag {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }

    pub fn validated(self) -> Result<Self, Error> {
        Ok(Self {
            name: validate_name(&self.name)?,
            color: validate_color(&self.color)?,
        })
    }
}

impl UpdateTag {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none()
    }

    pub fn validated(self) -> Result<Self, Error> {
        Ok(Self {
            name: self.name.map(|n| validate_name(&n)).transpose()?,
            color: self.color.map(|c| validate_color(&c)).transpose()?,
        })
    }

    pub fn apply_to(&self, tag: &mut Tag) {
        if let Some(ref name) = self.name {
            tag.name = name.clone();
        }
        if let Some(ref color) = self.color {
            tag.color = color.clone();
        }
    }
}

fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("tag name cannot be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "tag name cannot exceed {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn validate_color(color: &str) -> Result<String, Error> {
    let color = color.trim();
    let regex = Regex::new(COLOR_PATTERN).map_err(|e| Error::Internal(e.to_string()))?;
    if !regex.is_match(color) {
        return Err(Error::Validation(format!(
            "color must be a valid hex color (e.g. #ff0000), got '{}'",
            color
        )));
    }
    Ok(color.to_string())
}
