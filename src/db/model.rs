use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ContentItem, ContentPatch, ContentType, NewContent};

/// A row of the `content` table, snake_case on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentRow {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ContentType,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContentRow {
    /// Build a fresh row for `new` with the given id and image reference.
    pub fn from_new(id: String, new: NewContent, image_url: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: new.kind,
            title: new.title,
            content: new.content,
            excerpt: new.excerpt,
            category: new.category,
            tags: new.tags,
            author: new.author,
            image_url: Some(image_url),
            published: new.published,
            created_at: now,
            updated_at: Some(now),
        }
    }
}

impl From<ContentRow> for ContentItem {
    fn from(row: ContentRow) -> Self {
        ContentItem {
            id: row.id,
            kind: row.kind,
            title: row.title,
            content: row.content,
            excerpt: row.excerpt,
            category: row.category,
            tags: row.tags,
            author: row.author,
            image_url: row.image_url.unwrap_or_default(),
            created_at: row.created_at,
            published: row.published,
            updated_at: row.updated_at,
        }
    }
}

/// Column-level partial update. `updated_at` is always written.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowPatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl RowPatch {
    pub fn from_patch(patch: ContentPatch, now: DateTime<Utc>) -> Self {
        Self {
            kind: patch.kind,
            title: patch.title,
            content: patch.content,
            excerpt: patch.excerpt,
            category: patch.category,
            tags: patch.tags,
            author: patch.author,
            image_url: patch.image_url,
            published: patch.published,
            updated_at: now,
        }
    }
}
