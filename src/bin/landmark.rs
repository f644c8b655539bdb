//! Single-file sync tool
//!
//! Usage:
//!   landmark push <file> [--lang <language>]   # record comments, strip them to markers
//!   landmark pull <file> --lang <language>     # fill markers with text in <language>
//!
//! Required environment variables:
//! - DATABASE_URL
//! - DIFY_API_KEY (pull only; push never calls the translation provider)
//!
//! Optional:
//! - CANONICAL_LANGUAGE (default language for push, defaults to english)
//! - PROJECT_ROOT (files must live under it, defaults to .)
//! - COMMENT_FILES_DIR (sidecar directory under PROJECT_ROOT, defaults to comment_files)

use anyhow::{bail, Context, Result};
use landmark_sync::{
    config::Config,
    db::PgStore,
    detector::ChangeDetector,
    language::Language,
    metadata::SidecarLayout,
    metrics::SyncMetrics,
    provider::DifyProvider,
    resolver::TranslationResolver,
    store::VersionStore,
    sync,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "usage: landmark <push|pull> <file> [--lang <language>]";

enum Command {
    Push,
    Pull,
}

struct Args {
    command: Command,
    file: PathBuf,
    language: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let command = match args.first().map(String::as_str) {
        Some("push") => Command::Push,
        Some("pull") => Command::Pull,
        _ => bail!(USAGE),
    };

    let mut file = None;
    let mut language = None;
    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--lang" => language = Some(rest.next().context("--lang needs a value")?.clone()),
            other if file.is_none() => file = Some(PathBuf::from(other)),
            other => bail!("unexpected argument {:?}\n{}", other, USAGE),
        }
    }

    Ok(Args {
        command,
        file: file.context(USAGE)?,
        language,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("landmark_sync=info".parse()?),
        )
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&argv)?;
    let config = Config::from_env()?;

    let db = PgStore::connect(&config.database_url).await?;
    let store: Arc<dyn VersionStore> = Arc::new(db);
    let metrics = Arc::new(SyncMetrics::new());
    let layout = SidecarLayout::new(
        Path::new(&config.project_root),
        Path::new(&config.comment_files_dir),
    )?;

    match args.command {
        Command::Push => {
            let language = Language::parse(
                args.language.as_deref().unwrap_or(&config.canonical_language),
            )?;
            let detector = ChangeDetector::new(store, metrics);
            let outcome = sync::push_file(&args.file, &layout, &language, &detector).await?;

            if !outcome.is_complete() {
                bail!(
                    "{} comments in {} were not recorded and kept their text",
                    outcome.failed.len(),
                    args.file.display()
                );
            }
        }
        Command::Pull => {
            let raw = args.language.context("pull needs --lang <language>")?;
            let language = Language::parse(&raw)?;
            let provider = Arc::new(DifyProvider::new(&config)?);
            let resolver = TranslationResolver::new(store, provider, Arc::clone(&metrics));
            sync::pull_file(&args.file, &layout, &language, &resolver).await?;

            let report = metrics.report();
            info!(
                "{} cached, {} translated",
                report.cache_hits, report.provider_calls
            );
        }
    }

    Ok(())
}
