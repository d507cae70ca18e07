use async_trait::async_trait;

use crate::db::model::{ContentRow, RowPatch};
use crate::error::Result;

/// Table access, implemented by the hosted and SQLite backends.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All rows, newest `created_at` first.
    async fn list(&self) -> Result<Vec<ContentRow>>;

    async fn get(&self, id: &str) -> Result<Option<ContentRow>>;

    async fn insert(&self, row: &ContentRow) -> Result<ContentRow>;

    /// Apply a partial update. `None` when no row has this id.
    async fn update(&self, id: &str, patch: &RowPatch) -> Result<Option<ContentRow>>;

    /// Remove a row. Returns whether a row was deleted.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store a new object and return its public URL. Existing names are not overwritten.
    async fn upload(&self, object_name: &str, content_type: &str, bytes: Vec<u8>)
        -> Result<String>;

    /// Remove the object behind a public URL. URLs outside this bucket and
    /// already-missing objects are ignored.
    async fn remove(&self, image_url: &str) -> Result<()>;
}
