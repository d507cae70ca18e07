use super::model::{ContentRow, RowPatch};
use crate::error::{ContentError, Result};
use crate::model::ContentType;
use crate::store::ContentStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

const SELECT_COLUMNS: &str = "id, type, title, content, excerpt, category, tags, author, \
     image_url, published, created_at, updated_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = normalized.starts_with("sqlite::memory");
    // Every connection to `sqlite::memory:` opens a separate database.
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .connect(&normalized)
        .await?;
    if !in_memory {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous=FULL;")
            .execute(&pool)
            .await?;
    }
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded_path}");
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ContentError::Invalid(format!("bad timestamp '{raw}': {e}")))
}

fn row_to_content(row: &SqliteRow) -> Result<ContentRow> {
    let kind: String = row.try_get("type")?;
    let tags: String = row.try_get("tags")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: Option<String> = row.try_get("updated_at")?;
    Ok(ContentRow {
        id: row.try_get("id")?,
        kind: kind.parse::<ContentType>()?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        excerpt: row.try_get("excerpt")?,
        category: row.try_get("category")?,
        tags: serde_json::from_str(&tags)?,
        author: row.try_get("author")?,
        image_url: row.try_get("image_url")?,
        published: row.try_get("published")?,
        created_at: decode_ts(&created_at)?,
        updated_at: updated_at.as_deref().map(decode_ts).transpose()?,
    })
}

/// `ContentStore` over a local SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `database_url` and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = init_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<ContentRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM content ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_content).collect()
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn get(&self, id: &str) -> Result<Option<ContentRow>> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM content WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_content).transpose()
    }

    #[instrument(skip_all)]
    async fn insert(&self, row: &ContentRow) -> Result<ContentRow> {
        let rec = sqlx::query(&format!(
            "INSERT INTO content (id, type, title, content, excerpt, category, tags, author, \
             image_url, published, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {SELECT_COLUMNS}"
        ))
        .bind(&row.id)
        .bind(row.kind.as_str())
        .bind(&row.title)
        .bind(&row.content)
        .bind(&row.excerpt)
        .bind(&row.category)
        .bind(serde_json::to_string(&row.tags)?)
        .bind(&row.author)
        .bind(row.image_url.as_deref())
        .bind(row.published)
        .bind(encode_ts(row.created_at))
        .bind(row.updated_at.map(encode_ts))
        .fetch_one(&self.pool)
        .await?;
        row_to_content(&rec)
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn update(&self, id: &str, patch: &RowPatch) -> Result<Option<ContentRow>> {
        let tags = patch.tags.as_ref().map(serde_json::to_string).transpose()?;
        let rec = sqlx::query(&format!(
            "UPDATE content SET \
               type = COALESCE(?, type), \
               title = COALESCE(?, title), \
               content = COALESCE(?, content), \
               excerpt = COALESCE(?, excerpt), \
               category = COALESCE(?, category), \
               tags = COALESCE(?, tags), \
               author = COALESCE(?, author), \
               image_url = COALESCE(?, image_url), \
               published = COALESCE(?, published), \
               updated_at = ? \
             WHERE id = ? RETURNING {SELECT_COLUMNS}"
        ))
        .bind(patch.kind.map(|k| k.as_str()))
        .bind(patch.title.as_deref())
        .bind(patch.content.as_deref())
        .bind(patch.excerpt.as_deref())
        .bind(patch.category.as_deref())
        .bind(tags)
        .bind(patch.author.as_deref())
        .bind(patch.image_url.as_deref())
        .bind(patch.published)
        .bind(encode_ts(patch.updated_at))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        rec.as_ref().map(row_to_content).transpose()
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn delete(&self, id: &str) -> Result<bool> {
        let done = sqlx::query("DELETE FROM content WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentPatch, NewContent};
    use chrono::{Duration, SubsecRound};

    async fn setup_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn row(id: &str, created_at: DateTime<Utc>) -> ContentRow {
        let mut new = NewContent::new(ContentType::Article, format!("title {id}"), "body", "A");
        new.tags = vec!["ngo".into()];
        ContentRow::from_new(id.into(), new.with_defaults(), String::new(), created_at)
    }

    #[test]
    fn sqlite_url_normalization() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/content.db");
        let url = prepare_sqlite_url(&format!("sqlite://{}", path.display()));
        assert!(url.ends_with("content.db?mode=rwc"));
        assert!(path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn insert_list_update_delete() {
        let store = setup_store().await;
        let t0 = Utc::now();
        store.insert(&row("a", t0)).await.unwrap();
        store
            .insert(&row("b", t0 + Duration::seconds(5)))
            .await
            .unwrap();

        let rows = store.list().await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(rows[0].tags, vec!["ngo"]);
        assert_eq!(rows[0].image_url.as_deref(), Some(""));

        let later = t0 + Duration::seconds(60);
        let patch = RowPatch::from_patch(ContentPatch::title("renamed"), later);
        let updated = store.update("a", &patch).await.unwrap().unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.content, "body");
        assert_eq!(updated.category, "Governance Training");
        assert_eq!(updated.updated_at, Some(later.trunc_subsecs(6)));

        assert!(store.update("missing", &patch).await.unwrap().is_none());

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let store = setup_store().await;
        store.insert(&row("dup", Utc::now())).await.unwrap();
        let err = store.insert(&row("dup", Utc::now())).await.unwrap_err();
        assert!(matches!(err, ContentError::Database(_)));
    }
}
