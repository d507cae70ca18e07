//! Configuration loader and validator for the content service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@turnitaround.com";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub supabase: Supabase,
    #[serde(default)]
    pub admin: Admin,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind: String,
    pub public_base_url: String,
    /// Optional path to a JSON document replacing the bundled static content.
    #[serde(default)]
    pub static_content: String,
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Supabase,
}

/// Which content backend to use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Store {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub database_url: String,
}

/// Hosted table + bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Supabase {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for Supabase {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            table: default_table(),
            bucket: default_bucket(),
        }
    }
}

/// Admin sign-in settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admin {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub session_secret: String,
    #[serde(default = "default_ttl_days")]
    pub session_ttl_days: u32,
}

impl Default for Admin {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            session_secret: String::new(),
            session_ttl_days: default_ttl_days(),
        }
    }
}

fn default_table() -> String {
    "content".into()
}

fn default_bucket() -> String {
    "content-images".into()
}

fn default_ttl_days() -> u32 {
    7
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite URL: `DATABASE_URL` wins, then `store.database_url`, then a file in `data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| Some(self.store.database_url.clone()).filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| format!("sqlite://{}/content.db", self.app.data_dir))
    }

    /// Directory holding the local image bucket.
    pub fn uploads_dir(&self) -> std::path::PathBuf {
        Path::new(&self.app.data_dir).join("uploads")
    }

    /// Apply environment overrides and hardcoded credential fallbacks.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("SUPABASE_URL") {
            self.supabase.url = v;
        }
        if let Some(v) = get("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = v;
        }
        if let Some(v) = get("ADMIN_EMAIL") {
            self.admin.email = v;
        }
        if let Some(v) = get("ADMIN_PASSWORD") {
            self.admin.password = v;
        }
        if let Some(v) = get("ADMIN_SESSION_SECRET") {
            self.admin.session_secret = v;
        }
        if self.admin.email.trim().is_empty() {
            self.admin.email = DEFAULT_ADMIN_EMAIL.into();
        }
        if self.admin.password.is_empty() {
            self.admin.password = DEFAULT_ADMIN_PASSWORD.into();
        }
    }
}

/// Load configuration from a YAML file, apply env overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

const MAX_SESSION_TTL_DAYS: u32 = 3650;

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind must be non-empty"));
    }
    if cfg.admin.session_ttl_days == 0 {
        return Err(ConfigError::Invalid("admin.session_ttl_days must be > 0"));
    }
    if cfg.admin.session_ttl_days > MAX_SESSION_TTL_DAYS {
        return Err(ConfigError::Invalid("admin.session_ttl_days must be <= 3650"));
    }
    if cfg.supabase.table.trim().is_empty() {
        return Err(ConfigError::Invalid("supabase.table must be non-empty"));
    }
    if cfg.supabase.bucket.trim().is_empty() {
        return Err(ConfigError::Invalid("supabase.bucket must be non-empty"));
    }

    if cfg.store.backend == Backend::Supabase {
        if cfg.supabase.url.trim().is_empty() {
            return Err(ConfigError::Invalid("supabase.url must be non-empty"));
        }
        if reqwest::Url::parse(&cfg.supabase.url).is_err() {
            return Err(ConfigError::Invalid("supabase.url must be a valid URL"));
        }
        if cfg.supabase.anon_key.trim().is_empty() {
            return Err(ConfigError::Invalid("supabase.anon_key must be non-empty"));
        }
    }

    Ok(())
}

/// Returns the example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./var"
  bind: "127.0.0.1:3000"
  public_base_url: "http://127.0.0.1:3000"
  static_content: ""
  secure_cookies: false

store:
  backend: "sqlite"
  database_url: ""

supabase:
  url: "https://YOUR_PROJECT.supabase.co"
  anon_key: "YOUR_SUPABASE_ANON_KEY"
  table: "content"
  bucket: "content-images"

admin:
  email: ""
  password: ""
  session_secret: ""
  session_ttl_days: 7
"#
}
