use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod cli;

use cli::{Args, Commands};
use wiki_indexer::{
    EntityReference, ExtractorRegistry, Indexer, IndexerConfig, MemoryContentSource,
    MemoryIndexStore, ReferenceResolver, ResyncRequest,
};

struct ResyncParams {
    content: PathBuf,
    root: Option<String>,
    purge: bool,
    config: Option<PathBuf>,
    quiet: bool,
}

fn load_config(path: Option<&Path>) -> Result<IndexerConfig> {
    match path {
        Some(path) => IndexerConfig::load_from(path),
        None => IndexerConfig::load(),
    }
}

fn handle_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

async fn handle_resync(params: ResyncParams) -> Result<()> {
    let config = load_config(params.config.as_deref())?;
    let source = Arc::new(MemoryContentSource::from_file(&params.content)?);

    let roots: Vec<EntityReference> = match &params.root {
        Some(root) => vec![root
            .parse()
            .with_context(|| format!("Invalid root reference '{root}'"))?],
        None => source.wikis().into_iter().map(EntityReference::wiki).collect(),
    };
    if roots.is_empty() {
        bail!("Content model {:?} contains no wiki", params.content);
    }

    eprintln!(
        "{} {} documents from {}",
        "Content:".bold().green(),
        source.document_count(),
        params.content.display()
    );

    let store = Arc::new(MemoryIndexStore::new());
    let indexer = Indexer::start(
        &config,
        ReferenceResolver::new(source.clone()),
        ExtractorRegistry::with_defaults(source),
        store.clone(),
    );

    let start = Instant::now();
    let mut last = None;
    for root in roots {
        eprintln!("{} {}", "Resync:".bold().green(), root);
        let request = ResyncRequest::new(root).with_purge(params.purge);
        last = Some(indexer.start_index(request));
    }

    // Markers complete in submission order, the last one covers every root
    if let Some(progress) = last {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = progress.wait() => break,
                _ = ticker.tick() => {
                    eprintln!("{} {}%", "Progress:".bold().cyan(), progress.percentage());
                }
            }
        }
        eprintln!("{} {}%", "Progress:".bold().cyan(), progress.percentage());
    }

    indexer.shutdown().await;
    let stats = indexer.stats();

    eprintln!(
        "{} {} documents indexed, {} skipped, {} commits ({} failed) in {:.2?}",
        "Done:".bold().green(),
        stats.documents_added,
        stats.skipped,
        stats.commits,
        stats.commit_failures,
        start.elapsed()
    );
    if stats.resolve_failures > 0 || stats.extraction_failures > 0 {
        eprintln!(
            "{} {} resolve failures, {} extraction failures",
            "Warning:".bold().yellow(),
            stats.resolve_failures,
            stats.extraction_failures
        );
    }

    if !params.quiet {
        let documents = store.documents().await;
        let rendered =
            serde_json::to_string_pretty(&documents).context("Failed to render documents")?;
        println!("{}", rendered);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    wiki_indexer::logging::init(&args.log_level);

    match args.command {
        Commands::Resync {
            content,
            root,
            purge,
            config,
            quiet,
        } => {
            handle_resync(ResyncParams {
                content,
                root,
                purge,
                config,
                quiet,
            })
            .await
        }
        Commands::Config { config } => handle_config(config.as_deref()),
    }
}
