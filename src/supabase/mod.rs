use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::db::model::{ContentRow, RowPatch};
use crate::error::{ContentError, Result};
use crate::storage::object_name_from_url;
use crate::store::{ContentStore, ImageStore};

pub mod model;

use model::{RemoveObjects, UploadResponse};

/// Hosted backend: PostgREST table plus storage bucket of one project.
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: Url,
    anon_key: String,
    table: String,
    bucket: String,
}

impl fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("table", &self.table)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    pub fn new(
        base_url: Url,
        anon_key: impl Into<String>,
        table: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("turnaround-content/0.1")
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.into(),
            table: table.into(),
            bucket: bucket.into(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.supabase.url)
            .map_err(|e| ContentError::Invalid(format!("supabase.url: {e}")))?;
        Self::new(
            base_url,
            cfg.supabase.anon_key.clone(),
            cfg.supabase.table.clone(),
            cfg.supabase.bucket.clone(),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ContentError::Invalid(format!("invalid Supabase URL: {e}")))
    }

    fn table_url(&self) -> Result<Url> {
        self.endpoint(&format!("rest/v1/{}", self.table))
    }

    /// Public URL of an object in the bucket.
    pub fn public_url(&self, object_name: &str) -> String {
        format!("{}/{}", self.public_prefix(), object_name)
    }

    fn public_prefix(&self) -> String {
        format!(
            "{}/storage/v1/object/public/{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.bucket
        )
    }

    fn authed(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    pub fn build_list_request(&self) -> Result<reqwest::Request> {
        Ok(self
            .authed(Method::GET, self.table_url()?)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .build()?)
    }

    pub fn build_get_request(&self, id: &str) -> Result<reqwest::Request> {
        Ok(self
            .authed(Method::GET, self.table_url()?)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))])
            .build()?)
    }

    pub fn build_insert_request(&self, row: &ContentRow) -> Result<reqwest::Request> {
        Ok(self
            .authed(Method::POST, self.table_url()?)
            .header("Prefer", "return=representation")
            .json(row)
            .build()?)
    }

    pub fn build_update_request(&self, id: &str, patch: &RowPatch) -> Result<reqwest::Request> {
        Ok(self
            .authed(Method::PATCH, self.table_url()?)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(patch)
            .build()?)
    }

    pub fn build_delete_request(&self, id: &str) -> Result<reqwest::Request> {
        Ok(self
            .authed(Method::DELETE, self.table_url()?)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .build()?)
    }

    pub fn build_upload_request(
        &self,
        object_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<reqwest::Request> {
        let url = self.endpoint(&format!("storage/v1/object/{}/{}", self.bucket, object_name))?;
        Ok(self
            .authed(Method::POST, url)
            .header("Content-Type", content_type)
            .header("cache-control", "3600")
            .header("x-upsert", "false")
            .body(bytes)
            .build()?)
    }

    pub fn build_remove_request(&self, object_name: &str) -> Result<reqwest::Request> {
        let url = self.endpoint(&format!("storage/v1/object/{}", self.bucket))?;
        Ok(self
            .authed(Method::DELETE, url)
            .json(&RemoveObjects {
                prefixes: vec![object_name.to_string()],
            })
            .build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        debug!(method = %request.method(), url = %request.url(), "supabase request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by Supabase: {}", body);
            return Err(ContentError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %body, "Supabase API error");
            return Err(ContentError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res)
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T> {
        let res = self.execute(request).await?;
        Ok(res.json::<T>().await?)
    }
}

#[async_trait]
impl ContentStore for SupabaseClient {
    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<ContentRow>> {
        let request = self.build_list_request()?;
        self.execute_json(request).await
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn get(&self, id: &str) -> Result<Option<ContentRow>> {
        let request = self.build_get_request(id)?;
        let rows: Vec<ContentRow> = self.execute_json(request).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip_all)]
    async fn insert(&self, row: &ContentRow) -> Result<ContentRow> {
        let request = self.build_insert_request(row)?;
        let rows: Vec<ContentRow> = self.execute_json(request).await?;
        let created = rows.into_iter().next().ok_or_else(|| ContentError::Remote {
            status: 200,
            body: "insert returned no row".into(),
        })?;
        info!(id = %created.id, "inserted content row");
        Ok(created)
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn update(&self, id: &str, patch: &RowPatch) -> Result<Option<ContentRow>> {
        let request = self.build_update_request(id, patch)?;
        let rows: Vec<ContentRow> = self.execute_json(request).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn delete(&self, id: &str) -> Result<bool> {
        let request = self.build_delete_request(id)?;
        let rows: Vec<ContentRow> = self.execute_json(request).await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl ImageStore for SupabaseClient {
    #[instrument(skip_all, fields(object = %object_name))]
    async fn upload(&self, object_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        let request = self.build_upload_request(object_name, content_type, bytes)?;
        let uploaded: UploadResponse = self
            .execute_json(request)
            .await
            .map_err(|e| ContentError::ImageUpload(e.to_string()))?;
        debug!(key = %uploaded.key, "uploaded image");
        Ok(self.public_url(object_name))
    }

    #[instrument(skip_all)]
    async fn remove(&self, image_url: &str) -> Result<()> {
        let Some(name) = object_name_from_url(image_url, &self.public_prefix()) else {
            debug!(image_url, "not a bucket URL; nothing to remove");
            return Ok(());
        };
        let request = self.build_remove_request(name)?;
        self.execute(request).await?;
        Ok(())
    }
}
