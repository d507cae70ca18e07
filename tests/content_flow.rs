use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use turnaround_content::content::{
    bundled_static, filter_by_category, filter_by_type, merge_with_static, ContentService,
};
use turnaround_content::db::model::{ContentRow, RowPatch};
use turnaround_content::db::SqliteStore;
use turnaround_content::listing::{request_delete, ListingCache};
use turnaround_content::store::{ContentStore, ImageStore};
use turnaround_content::{
    ContentError, ContentItem, ContentPatch, ContentType, ImageUpload, NewContent, Result,
};

const BUCKET: &str = "https://cdn.test/content-images";

#[derive(Debug, Clone)]
struct UploadCall {
    object_name: String,
    content_type: String,
    size: usize,
}

#[derive(Clone, Default)]
struct RecordingImages {
    uploads: Arc<Mutex<Vec<UploadCall>>>,
    removed: Arc<Mutex<Vec<String>>>,
    fail_remove: bool,
}

impl RecordingImages {
    fn failing_remove() -> Self {
        Self {
            fail_remove: true,
            ..Default::default()
        }
    }

    async fn uploads(&self) -> Vec<UploadCall> {
        self.uploads.lock().await.clone()
    }

    async fn removed(&self) -> Vec<String> {
        self.removed.lock().await.clone()
    }
}

#[async_trait]
impl ImageStore for RecordingImages {
    async fn upload(&self, object_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        self.uploads.lock().await.push(UploadCall {
            object_name: object_name.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
        });
        Ok(format!("{BUCKET}/{object_name}"))
    }

    async fn remove(&self, image_url: &str) -> Result<()> {
        self.removed.lock().await.push(image_url.to_string());
        if self.fail_remove {
            return Err(ContentError::Remote {
                status: 404,
                body: "object not found".into(),
            });
        }
        Ok(())
    }
}

/// A remote store that is down.
struct UnreachableStore;

#[async_trait]
impl ContentStore for UnreachableStore {
    async fn list(&self) -> Result<Vec<ContentRow>> {
        Err(ContentError::Remote { status: 503, body: "down".into() })
    }
    async fn get(&self, _id: &str) -> Result<Option<ContentRow>> {
        Err(ContentError::Remote { status: 503, body: "down".into() })
    }
    async fn insert(&self, _row: &ContentRow) -> Result<ContentRow> {
        Err(ContentError::Remote { status: 503, body: "down".into() })
    }
    async fn update(&self, _id: &str, _patch: &RowPatch) -> Result<Option<ContentRow>> {
        Err(ContentError::Remote { status: 503, body: "down".into() })
    }
    async fn delete(&self, _id: &str) -> Result<bool> {
        Err(ContentError::Remote { status: 503, body: "down".into() })
    }
}

/// Reads its rows, then stalls before handing them back.
struct SlowList {
    inner: SqliteStore,
    delay: Duration,
}

#[async_trait]
impl ContentStore for SlowList {
    async fn list(&self) -> Result<Vec<ContentRow>> {
        let rows = self.inner.list().await?;
        tokio::time::sleep(self.delay).await;
        Ok(rows)
    }
    async fn get(&self, id: &str) -> Result<Option<ContentRow>> {
        self.inner.get(id).await
    }
    async fn insert(&self, row: &ContentRow) -> Result<ContentRow> {
        self.inner.insert(row).await
    }
    async fn update(&self, id: &str, patch: &RowPatch) -> Result<Option<ContentRow>> {
        self.inner.update(id, patch).await
    }
    async fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id).await
    }
}

async fn setup(images: RecordingImages) -> ContentService {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    ContentService::new(Arc::new(store), Arc::new(images), bundled_static().unwrap())
}

fn blog(title: &str) -> NewContent {
    let mut new = NewContent::new(ContentType::Article, title, "C", "A");
    new.excerpt = "E".into();
    new.category = "Governance Training".into();
    new
}

fn png() -> ImageUpload {
    ImageUpload::new("cover.png", "image/png", vec![137, 80, 78, 71])
}

#[tokio::test]
async fn create_without_image_is_first_in_listing() {
    let service = setup(RecordingImages::default()).await;
    let created = service.create(blog("T"), None).await.unwrap();

    assert_eq!(created.image_url, "");
    assert!(created.published);
    assert_eq!(created.kind, ContentType::Article);
    assert_eq!(created.title, "T");
    assert_eq!(created.excerpt, "E");
    assert!(uuid_like(&created.id));

    let other = service.create(blog("T"), None).await.unwrap();
    assert_ne!(other.id, created.id);

    let all = service.list_all().await;
    assert_eq!(all.len(), 2 + service.static_items().len());
    assert_eq!(all[0].id, other.id);
    assert_eq!(all[1].id, created.id);
}

fn uuid_like(id: &str) -> bool {
    id.len() == 36 && id.chars().filter(|c| *c == '-').count() == 4
}

#[tokio::test]
async fn image_upload_replaces_passed_url() {
    let images = RecordingImages::default();
    let service = setup(images.clone()).await;
    let mut new = blog("With image");
    new.image_url = "https://elsewhere.test/passed.png".into();

    let created = service.create(new, Some(png())).await.unwrap();

    let uploads = images.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].content_type, "image/png");
    assert_eq!(uploads[0].size, 4);
    assert!(uploads[0].object_name.ends_with(".png"));
    assert_eq!(created.image_url, format!("{BUCKET}/{}", uploads[0].object_name));
    assert_ne!(created.image_url, "https://elsewhere.test/passed.png");
}

#[tokio::test]
async fn invalid_image_aborts_create() {
    let images = RecordingImages::default();
    let service = setup(images.clone()).await;
    let pdf = ImageUpload::new("doc.pdf", "application/pdf", vec![1, 2, 3]);

    let err = service.create(blog("T"), Some(pdf)).await.unwrap_err();
    assert!(matches!(err, ContentError::InvalidImage(_)));
    assert!(images.uploads().await.is_empty());
    assert!(service.list_remote().await.is_empty());
}

#[tokio::test]
async fn update_changes_only_given_fields() {
    let service = setup(RecordingImages::default()).await;
    let created = service.create(blog("T"), None).await.unwrap();

    let updated = service
        .update(&created.id, ContentPatch::title("T2"), None, false)
        .await
        .unwrap();
    assert_eq!(updated.title, "T2");
    assert_eq!(updated.content, created.content);
    assert_eq!(updated.category, created.category);
    assert_eq!(updated.author, created.author);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at.unwrap() >= created.updated_at.unwrap());

    let err = service
        .update("no-such-id", ContentPatch::title("x"), None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::NotFound(_)));
}

#[tokio::test]
async fn replacing_image_removes_old_object() {
    let images = RecordingImages::default();
    let service = setup(images.clone()).await;
    let created = service.create(blog("T"), Some(png())).await.unwrap();

    let replacement = ImageUpload::new("new.jpg", "image/jpeg", vec![255, 216]);
    let updated = service
        .update(&created.id, ContentPatch::default(), Some(replacement), true)
        .await
        .unwrap();

    assert_ne!(updated.image_url, created.image_url);
    assert!(updated.image_url.ends_with(".jpg"));
    assert_eq!(images.removed().await, vec![created.image_url.clone()]);

    let cleared = service
        .update(&updated.id, ContentPatch::default(), None, true)
        .await
        .unwrap();
    assert_eq!(cleared.image_url, "");
    assert_eq!(images.removed().await.len(), 2);
}

#[tokio::test]
async fn failed_writes_discard_their_upload() {
    let images = RecordingImages::default();
    let service = ContentService::new(
        Arc::new(UnreachableStore),
        Arc::new(images.clone()),
        bundled_static().unwrap(),
    );
    let err = service.create(blog("T"), Some(png())).await.unwrap_err();
    assert!(matches!(err, ContentError::Remote { status: 503, .. }));
    let uploads = images.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        images.removed().await,
        vec![format!("{BUCKET}/{}", uploads[0].object_name)]
    );

    let images = RecordingImages::default();
    let service = setup(images.clone()).await;
    let err = service
        .update("no-such-id", ContentPatch::default(), Some(png()), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::NotFound(_)));
    let uploads = images.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        images.removed().await,
        vec![format!("{BUCKET}/{}", uploads[0].object_name)]
    );
}

#[tokio::test]
async fn failed_old_image_removal_keeps_row() {
    let images = RecordingImages::failing_remove();
    let service = setup(images.clone()).await;
    let created = service.create(blog("T"), Some(png())).await.unwrap();

    let replacement = ImageUpload::new("new.jpg", "image/jpeg", vec![255, 216]);
    let err = service
        .update(&created.id, ContentPatch::title("T2"), Some(replacement), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::Remote { status: 404, .. }));

    let uploads = images.uploads().await;
    assert_eq!(uploads.len(), 2);
    assert_eq!(
        images.removed().await,
        vec![
            created.image_url.clone(),
            format!("{BUCKET}/{}", uploads[1].object_name),
        ]
    );
    let stored = service.find(&created.id).await.unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn delete_survives_missing_image() {
    let images = RecordingImages::failing_remove();
    let service = setup(images.clone()).await;
    let created = service.create(blog("T"), Some(png())).await.unwrap();
    let kept = service.create(blog("Kept"), None).await.unwrap();

    assert!(service.delete(&created.id).await.unwrap());
    assert_eq!(images.removed().await, vec![created.image_url.clone()]);

    let remaining = service.list_remote().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, kept.id);

    assert!(!service.delete(&created.id).await.unwrap());
}

#[tokio::test]
async fn static_items_are_read_only() {
    let service = setup(RecordingImages::default()).await;
    let id = service.static_items()[0].id.clone();
    assert!(service.find(&id).await.is_some());

    let err = service
        .update(&id, ContentPatch::title("x"), None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::ReadOnly(_)));
    assert!(matches!(
        service.delete(&id).await,
        Err(ContentError::ReadOnly(_))
    ));
}

#[tokio::test]
async fn concurrent_updates_last_write_wins() {
    let service = Arc::new(setup(RecordingImages::default()).await);
    let created = service.create(blog("T"), None).await.unwrap();

    let patch_a = ContentPatch {
        title: Some("A".into()),
        content: Some("content A".into()),
        ..Default::default()
    };
    let patch_b = ContentPatch {
        title: Some("B".into()),
        content: Some("content B".into()),
        ..Default::default()
    };
    let (a, b) = futures::future::join(
        service.update(&created.id, patch_a, None, false),
        service.update(&created.id, patch_b, None, false),
    )
    .await;
    let (a, b) = (a.unwrap(), b.unwrap());

    // Each write returns the row it produced; the stored row is whichever
    // landed last, whole. On a timestamp tie `b` ran second.
    let last = if a.updated_at > b.updated_at { a } else { b };
    let stored = service.find(&created.id).await.unwrap();
    assert_eq!(stored, last);
}

#[tokio::test]
async fn reads_degrade_and_writes_fail_when_store_is_down() {
    let service = ContentService::new(
        Arc::new(UnreachableStore),
        Arc::new(RecordingImages::default()),
        bundled_static().unwrap(),
    );

    assert!(service.list_remote().await.is_empty());
    let all = service.list_all().await;
    assert_eq!(all.len(), service.static_items().len());
    assert!(service.find("some-id").await.is_none());

    let err = service.create(blog("T"), None).await.unwrap_err();
    assert!(matches!(err, ContentError::Remote { status: 503, .. }));
}

#[tokio::test]
async fn merged_listing_laws() {
    let service = setup(RecordingImages::default()).await;
    service.create(blog("One"), None).await.unwrap();
    let mut insight = NewContent::new(ContentType::IndustryInsight, "Two", "body", "A");
    insight.published = false;
    service.create(insight.with_defaults(), None).await.unwrap();

    let remote = service.list_remote().await;
    let statics = service.static_items();
    let merged = merge_with_static(remote.clone(), statics);
    assert_eq!(merged.len(), remote.len() + statics.len());
    assert!(merged.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    assert_eq!(filter_by_category(merged.clone(), ""), merged);
    let once = filter_by_type(merged.clone(), ContentType::IndustryInsight);
    assert_eq!(filter_by_type(once.clone(), ContentType::IndustryInsight), once);
    assert!(once.iter().any(|i: &ContentItem| !i.published));
}

#[tokio::test]
async fn cache_serves_until_invalidated() {
    let service = setup(RecordingImages::default()).await;
    let cache = ListingCache::new();
    let before = cache.current(&service).await;

    service.create(blog("Fresh"), None).await.unwrap();
    assert_eq!(cache.current(&service).await.len(), before.len());
    assert_eq!(cache.refresh(&service).await.len(), before.len() + 1);

    let created = service.create(blog("Fresher"), None).await.unwrap();
    cache.invalidate().await;
    let after = cache.current(&service).await;
    assert_eq!(after.len(), before.len() + 2);
    assert_eq!(after[0].id, created.id);
}

#[tokio::test]
async fn invalidation_during_fetch_is_not_lost() {
    let store = SlowList {
        inner: SqliteStore::connect("sqlite::memory:").await.unwrap(),
        delay: Duration::from_millis(200),
    };
    let service = ContentService::new(
        Arc::new(store),
        Arc::new(RecordingImages::default()),
        bundled_static().unwrap(),
    );
    let statics = service.static_items().len();
    let cache = ListingCache::new();

    let write = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let created = service.create(blog("Mid-fetch"), None).await.unwrap();
        cache.invalidate().await;
        created
    };
    let (stale, created) = futures::future::join(cache.current(&service), write).await;
    assert_eq!(stale.len(), statics);

    let fresh = cache.current(&service).await;
    assert_eq!(fresh.len(), statics + 1);
    assert_eq!(fresh[0].id, created.id);
}

#[tokio::test]
async fn delete_requires_confirmation() {
    let service = setup(RecordingImages::default()).await;
    let created = service.create(blog("T"), None).await.unwrap();

    let pending = request_delete(created.id.clone());
    assert_eq!(pending.id(), created.id);
    assert_eq!(service.list_remote().await.len(), 1);

    assert!(pending.confirm(&service).await.unwrap());
    assert!(service.list_remote().await.is_empty());
}
