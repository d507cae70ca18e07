use serde::{de, Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::content::{filter_by_category, filter_by_type, published_only, ContentService};
use crate::error::Result;
use crate::model::{ContentItem, ContentType};

/// Query string of a listing page.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ListingQuery {
    #[serde(rename = "type", default, deserialize_with = "blank_as_none")]
    pub kind: Option<ContentType>,
    #[serde(default)]
    pub category: Option<String>,
    /// Bypass the cached list, as a page regaining focus does.
    #[serde(default)]
    pub refresh: bool,
}

fn blank_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<ContentType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => ContentType::parse(s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("unknown content type '{s}'"))),
    }
}

/// A rendered listing page.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Listing {
    pub title: &'static str,
    pub categories: Vec<&'static str>,
    pub content: Vec<ContentItem>,
}

/// Published items of the selected type and category. Without a type the
/// page covers all content and offers every category.
pub fn build_listing(items: Vec<ContentItem>, query: &ListingQuery) -> Listing {
    let mut content = published_only(items);
    let (title, categories) = match query.kind {
        Some(kind) => {
            content = filter_by_type(content, kind);
            (kind.page_title(), kind.categories().to_vec())
        }
        None => {
            let mut all: Vec<&'static str> = Vec::new();
            for kind in ContentType::ALL {
                for &category in kind.categories() {
                    if !all.contains(&category) {
                        all.push(category);
                    }
                }
            }
            ("All Content", all)
        }
    };
    let content = filter_by_category(content, query.category.as_deref().unwrap_or(""));
    Listing {
        title,
        categories,
        content,
    }
}

/// Merged content list shared by the listing pages. Writes invalidate it,
/// the next read re-fetches.
#[derive(Debug, Default)]
pub struct ListingCache {
    state: RwLock<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    /// Bumped by every invalidation.
    generation: u64,
    items: Option<Vec<ContentItem>>,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached list, fetched on first use or after an invalidation.
    pub async fn current(&self, service: &ContentService) -> Vec<ContentItem> {
        if let Some(items) = self.state.read().await.items.as_ref() {
            return items.clone();
        }
        self.refresh(service).await
    }

    /// Re-fetch unconditionally. A fetch that overlaps an invalidation is
    /// returned to the caller but not cached.
    pub async fn refresh(&self, service: &ContentService) -> Vec<ContentItem> {
        let started = self.state.read().await.generation;
        let items = service.list_all().await;
        let mut state = self.state.write().await;
        if state.generation == started {
            debug!(count = items.len(), "refreshed content listing");
            state.items = Some(items.clone());
        } else {
            debug!(count = items.len(), "listing invalidated during fetch, not cached");
        }
        items
    }

    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.generation = state.generation.wrapping_add(1);
        state.items = None;
    }
}

/// A delete awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "nothing is deleted until the request is confirmed"]
pub struct PendingDelete {
    id: String,
}

pub fn request_delete(id: impl Into<String>) -> PendingDelete {
    PendingDelete { id: id.into() }
}

impl PendingDelete {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn confirm(self, service: &ContentService) -> Result<bool> {
        service.delete(&self.id).await
    }
}
