use thiserror::Error;

/// Errors raised by the content library and its backends.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("remote store error {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("content {0} not found")]
    NotFound(String),
    #[error("content {0} is bundled with the site and cannot be modified")]
    ReadOnly(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("image upload failed: {0}")]
    ImageUpload(String),
    #[error("invalid content: {0}")]
    Invalid(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = ContentError> = std::result::Result<T, E>;
