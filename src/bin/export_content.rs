use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use turnaround_content::config::{self, Config};
use turnaround_content::content::filter_by_type;
use turnaround_content::{ContentItem, ContentService, ContentType};

#[derive(Debug, Parser)]
#[command(about = "Export content items as a dated JSON file.")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output directory
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Only export one type: blog, case-study or insight
    #[arg(long = "type")]
    kind: Option<String>,

    /// Skip the bundled static items
    #[arg(long)]
    remote_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let kind = args
        .kind
        .as_deref()
        .map(|k| ContentType::parse(k).ok_or_else(|| anyhow!("unknown content type '{k}'")))
        .transpose()?;
    let path = run(&cfg, &args.out, kind, args.remote_only).await?;
    println!("{}", path.display());
    Ok(())
}

async fn run(cfg: &Config, out: &Path, kind: Option<ContentType>, remote_only: bool) -> Result<PathBuf> {
    let service = ContentService::from_config(cfg)
        .await
        .context("initializing content store")?;
    let mut items: Vec<ContentItem> = if remote_only {
        service.list_remote().await
    } else {
        service.list_all().await
    };
    if let Some(kind) = kind {
        items = filter_by_type(items, kind);
    }

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;
    let path = out.join(format!("content-{}.json", Utc::now().format("%Y-%m-%d")));
    let body = serde_json::to_vec_pretty(&items)?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(count = items.len(), path = %path.display(), "exported content");
    Ok(path)
}
