use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{Backend, Config};
use crate::db::model::{ContentRow, RowPatch};
use crate::db::SqliteStore;
use crate::error::{ContentError, Result};
use crate::model::{ContentItem, ContentPatch, ContentType, ImageUpload, NewContent};
use crate::storage::{object_name_for, LocalBucket};
use crate::store::{ContentStore, ImageStore};
use crate::supabase::SupabaseClient;

/// Id prefix reserved for bundled items.
pub const STATIC_ID_PREFIX: &str = "static-";

const BUNDLED_CONTENT: &str = include_str!("../data/content.json");

/// Parse a static content document and namespace its ids.
pub fn parse_static(raw: &str) -> Result<Vec<ContentItem>> {
    let mut items: Vec<ContentItem> = serde_json::from_str(raw)?;
    for item in &mut items {
        if !item.id.starts_with(STATIC_ID_PREFIX) {
            item.id = format!("{STATIC_ID_PREFIX}{}", item.id);
        }
    }
    Ok(items)
}

/// The static content shipped with the binary.
pub fn bundled_static() -> Result<Vec<ContentItem>> {
    parse_static(BUNDLED_CONTENT)
}

/// Load static content from `path`, or the bundled document when `path` is empty.
pub fn load_static(path: &str) -> Result<Vec<ContentItem>> {
    if path.trim().is_empty() {
        return bundled_static();
    }
    let raw = std::fs::read_to_string(Path::new(path))?;
    parse_static(&raw)
}

pub fn is_static_id(id: &str) -> bool {
    id.starts_with(STATIC_ID_PREFIX)
}

/// Remote items followed by the static ones, newest first. No de-duplication.
pub fn merge_with_static(remote: Vec<ContentItem>, static_items: &[ContentItem]) -> Vec<ContentItem> {
    let mut all = remote;
    all.extend_from_slice(static_items);
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    all
}

pub fn filter_by_type(items: Vec<ContentItem>, kind: ContentType) -> Vec<ContentItem> {
    items.into_iter().filter(|item| item.kind == kind).collect()
}

/// Keep items of `category`. An empty category keeps everything.
pub fn filter_by_category(items: Vec<ContentItem>, category: &str) -> Vec<ContentItem> {
    if category.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| item.category == category)
        .collect()
}

pub fn published_only(items: Vec<ContentItem>) -> Vec<ContentItem> {
    items.into_iter().filter(|item| item.published).collect()
}

/// Reads degrade to empty results and are only logged. Writes propagate
/// their errors.
pub struct ContentService {
    store: Arc<dyn ContentStore>,
    images: Arc<dyn ImageStore>,
    static_items: Arc<[ContentItem]>,
}

impl ContentService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        images: Arc<dyn ImageStore>,
        static_items: Vec<ContentItem>,
    ) -> Self {
        Self {
            store,
            images,
            static_items: static_items.into(),
        }
    }

    /// Wire up the configured backend, image bucket and static content.
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        let static_items = load_static(&cfg.app.static_content)?;
        let service = match cfg.store.backend {
            Backend::Supabase => {
                let client = Arc::new(SupabaseClient::from_config(cfg)?);
                info!(?client, "using hosted content store");
                Self::new(client.clone(), client, static_items)
            }
            Backend::Sqlite => {
                let store = SqliteStore::connect(&cfg.database_url()).await?;
                let bucket = LocalBucket::new(
                    cfg.uploads_dir(),
                    &cfg.supabase.bucket,
                    &cfg.app.public_base_url,
                );
                info!(bucket = %bucket.root().display(), "using local content store");
                Self::new(Arc::new(store), Arc::new(bucket), static_items)
            }
        };
        Ok(service)
    }

    pub fn static_items(&self) -> &[ContentItem] {
        &self.static_items
    }

    /// All remotely stored items, newest first. Failures yield an empty list.
    #[instrument(skip_all)]
    pub async fn list_remote(&self) -> Vec<ContentItem> {
        match self.store.list().await {
            Ok(rows) => rows.into_iter().map(ContentItem::from).collect(),
            Err(err) => {
                warn!(?err, "failed to list remote content; serving none");
                Vec::new()
            }
        }
    }

    /// Remote and static items merged, newest first.
    pub async fn list_all(&self) -> Vec<ContentItem> {
        merge_with_static(self.list_remote().await, &self.static_items)
    }

    /// Look up one item in the merged set.
    pub async fn find(&self, id: &str) -> Option<ContentItem> {
        if is_static_id(id) {
            return self.static_items.iter().find(|item| item.id == id).cloned();
        }
        match self.store.get(id).await {
            Ok(row) => row.map(ContentItem::from),
            Err(err) => {
                warn!(?err, id, "failed to fetch content");
                None
            }
        }
    }

    async fn upload_image(&self, image: ImageUpload) -> Result<String> {
        image.validate()?;
        let object_name = object_name_for(&image.file_name, &image.content_type);
        self.images
            .upload(&object_name, &image.content_type, image.bytes)
            .await
    }

    /// Remove an upload whose row write failed.
    async fn discard_upload(&self, url: &str) {
        if let Err(err) = self.images.remove(url).await {
            warn!(?err, image_url = %url, "failed to remove orphaned upload");
        }
    }

    /// Create a remote item. An image, when given, is uploaded first and its
    /// public URL replaces `new.image_url`.
    #[instrument(skip_all)]
    pub async fn create(&self, new: NewContent, image: Option<ImageUpload>) -> Result<ContentItem> {
        let (image_url, uploaded) = match image {
            Some(image) => {
                let url = self.upload_image(image).await?;
                (url.clone(), Some(url))
            }
            None => (new.image_url.clone(), None),
        };
        let row = ContentRow::from_new(Uuid::new_v4().to_string(), new, image_url, Utc::now());
        let created = match self.store.insert(&row).await {
            Ok(created) => created,
            Err(err) => {
                if let Some(url) = uploaded {
                    self.discard_upload(&url).await;
                }
                return Err(err);
            }
        };
        info!(id = %created.id, kind = %created.kind, "created content");
        Ok(created.into())
    }

    /// Apply a partial update. With `delete_old_image`, the previous image
    /// object is removed and, absent a replacement, the reference is cleared.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn update(
        &self,
        id: &str,
        mut patch: ContentPatch,
        image: Option<ImageUpload>,
        delete_old_image: bool,
    ) -> Result<ContentItem> {
        if is_static_id(id) {
            return Err(ContentError::ReadOnly(id.to_string()));
        }

        let previous_image = if delete_old_image {
            let existing = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| ContentError::NotFound(id.to_string()))?;
            existing.image_url.filter(|url| !url.is_empty())
        } else {
            None
        };

        let uploaded = match image {
            Some(image) => Some(self.upload_image(image).await?),
            None => None,
        };
        if let Some(url) = &uploaded {
            patch.image_url = Some(url.clone());
        }

        match self.apply_update(id, patch, previous_image).await {
            Ok(updated) => {
                info!("updated content");
                Ok(updated)
            }
            Err(err) => {
                if let Some(url) = uploaded {
                    self.discard_upload(&url).await;
                }
                Err(err)
            }
        }
    }

    async fn apply_update(
        &self,
        id: &str,
        mut patch: ContentPatch,
        previous_image: Option<String>,
    ) -> Result<ContentItem> {
        if let Some(old) = previous_image {
            if patch.image_url.as_deref() != Some(old.as_str()) {
                self.images.remove(&old).await?;
                if patch.image_url.is_none() {
                    patch.image_url = Some(String::new());
                }
            }
        }

        let updated = self
            .store
            .update(id, &RowPatch::from_patch(patch, Utc::now()))
            .await?
            .ok_or_else(|| ContentError::NotFound(id.to_string()))?;
        Ok(updated.into())
    }

    /// Delete a remote item and, best-effort, its image. Returns false when
    /// there was no such item.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        if is_static_id(id) {
            return Err(ContentError::ReadOnly(id.to_string()));
        }
        let Some(existing) = self.store.get(id).await? else {
            return Ok(false);
        };
        if !self.store.delete(id).await? {
            return Ok(false);
        }
        if let Some(url) = existing.image_url.filter(|url| !url.is_empty()) {
            if let Err(err) = self.images.remove(&url).await {
                warn!(?err, image_url = %url, "failed to remove image of deleted content");
            }
        }
        info!("deleted content");
        Ok(true)
    }
}
