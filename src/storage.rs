use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ContentError, Result};
use crate::store::ImageStore;

static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{1,8}$").unwrap());
static OBJECT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// Randomized object name `{unix_millis}-{8 hex}.{ext}` for an uploaded file.
pub fn object_name_for(file_name: &str, content_type: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        &suffix[..8],
        extension_for(file_name, content_type)
    )
}

fn extension_for(file_name: &str, content_type: &str) -> String {
    if let Some((_, ext)) = file_name.rsplit_once('.') {
        if EXTENSION.is_match(ext) {
            return ext.to_ascii_lowercase();
        }
    }
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "img",
    }
    .to_string()
}

/// Object name behind `url` when it lives under `public_prefix`.
pub(crate) fn object_name_from_url<'a>(url: &'a str, public_prefix: &str) -> Option<&'a str> {
    let prefix = public_prefix.trim_end_matches('/');
    let name = url.strip_prefix(prefix)?.strip_prefix('/')?;
    let name = name.split(['?', '#']).next().unwrap_or(name);
    OBJECT_NAME.is_match(name).then_some(name)
}

/// Image bucket stored as plain files under `root`, published at `public_prefix`.
#[derive(Debug, Clone)]
pub struct LocalBucket {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBucket {
    /// `uploads_dir/bucket` on disk, served as `{public_base_url}/uploads/{bucket}`.
    pub fn new(uploads_dir: impl AsRef<Path>, bucket: &str, public_base_url: &str) -> Self {
        Self {
            root: uploads_dir.as_ref().join(bucket),
            public_prefix: format!("{}/uploads/{}", public_base_url.trim_end_matches('/'), bucket),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self, object_name: &str) -> String {
        format!("{}/{}", self.public_prefix, object_name)
    }
}

#[async_trait]
impl ImageStore for LocalBucket {
    async fn upload(&self, object_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        if !OBJECT_NAME.is_match(object_name) {
            return Err(ContentError::ImageUpload(format!(
                "invalid object name '{object_name}'"
            )));
        }
        fs::create_dir_all(&self.root).await?;
        let path = self.root.join(object_name);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| ContentError::ImageUpload(format!("{}: {e}", path.display())))?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        info!(object = object_name, content_type, size = bytes.len(), "stored image");
        Ok(self.public_url(object_name))
    }

    async fn remove(&self, image_url: &str) -> Result<()> {
        let Some(name) = object_name_from_url(image_url, &self.public_prefix) else {
            debug!(image_url, "not a local bucket URL; nothing to remove");
            return Ok(());
        };
        match fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
