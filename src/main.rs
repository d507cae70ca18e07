use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use turnaround_content::config::{self, Backend};
use turnaround_content::server::{self, AppState};
use turnaround_content::session::SessionGate;
use turnaround_content::ContentService;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let content = ContentService::from_config(&cfg)
        .await
        .context("initializing content store")?;
    info!(
        backend = ?cfg.store.backend,
        bundled = content.static_items().len(),
        "content service ready"
    );
    let gate = SessionGate::from_config(&cfg.admin)?;

    let uploads = (cfg.store.backend == Backend::Sqlite).then(|| cfg.uploads_dir());
    let app = server::router(AppState::new(content, gate, cfg.app.secure_cookies), uploads);

    let listener = TcpListener::bind(&cfg.app.bind)
        .await
        .with_context(|| format!("binding {}", cfg.app.bind))?;
    server::serve(listener, app).await?;
    Ok(())
}
