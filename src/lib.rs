pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod handlers;
pub mod listing;
pub mod model;
pub mod server;
pub mod session;
pub mod storage;
pub mod store;
pub mod supabase;

pub use content::ContentService;
pub use error::{ContentError, Result};
pub use model::{ContentItem, ContentPatch, ContentType, ImageUpload, NewContent};
