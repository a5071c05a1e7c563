//! mdindex - Admin CLI and maintenance daemon
//!
//! This binary ingests metadata documents into the index, answers lookups
//! against it and runs periodic maintenance.

mod maintain;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mdindex_common::{Config, Error};
use mdindex_index::IndexStore;
use mdindex_metadata::Document;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mdindex")]
#[command(about = "Time-indexed federation metadata store")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/mdindex/mdindex.toml")]
    config: String,

    /// Path of the store database
    #[arg(long)]
    store: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index metadata documents
    Ingest {
        /// Document files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Store under this id instead of the document's own
        #[arg(long)]
        id: Option<String>,
        /// Explicit expiry (Unix seconds) for bare entities
        #[arg(long)]
        expires: Option<i64>,
    },
    /// Resolve a key (id, alias, group or `A+B` intersection)
    Lookup {
        key: String,
    },
    /// List the fresh members of a group
    Members {
        group: String,
    },
    /// Show the flat attribute record of an id
    Record {
        id: String,
    },
    /// List known collections
    Collections,
    /// List known categorical attributes
    Attributes,
    /// List the live values of an attribute
    Values {
        name: String,
    },
    /// Count fresh entities
    Size,
    /// Drop expired memberships and empty groups
    Reap,
    /// Remove everything from the store
    Reset,
    /// Run reaper and eviction periodically until interrupted
    Maintain,
}

fn ingest(
    store: &IndexStore,
    files: &[PathBuf],
    id: Option<&str>,
    expires: Option<i64>,
) -> Result<()> {
    let mut total = 0;
    for file in files {
        let bytes =
            std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        let doc = Document::parse(&bytes).with_context(|| format!("parsing {}", file.display()))?;
        match store.update(&doc, id, expires) {
            Ok(count) => {
                info!("Indexed {} ({} entities)", file.display(), count);
                total += count;
            }
            Err(e @ Error::UnsupportedDocumentKind(_)) => {
                warn!("Skipping {}: {}", file.display(), e);
            }
            Err(e) => return Err(e).with_context(|| format!("indexing {}", file.display())),
        }
    }
    println!("{total}");
    Ok(())
}

fn print_documents(docs: Vec<Document>) -> Result<()> {
    for doc in docs {
        println!("{}", String::from_utf8_lossy(&doc.to_bytes()?));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Merge CLI args with config file (CLI takes precedence)
    let mut config =
        Config::load(&args.config).with_context(|| format!("loading config {}", args.config))?;
    if let Some(store) = args.store {
        config.store.path = store;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = IndexStore::open(&config)
        .with_context(|| format!("opening store {}", config.store.path.display()))?;

    match args.command {
        Commands::Ingest { files, id, expires } => {
            ingest(&store, &files, id.as_deref(), expires)?;
        }
        Commands::Lookup { key } => print_documents(store.lookup(&key)?.into_documents())?,
        Commands::Members { group } => {
            for doc in store.members(&group)? {
                if let Some(id) = doc.identifier() {
                    println!("{id}");
                }
            }
        }
        Commands::Record { id } => match store.record(&id)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => bail!("no record for {id}"),
        },
        Commands::Collections => {
            for name in store.collections()? {
                println!("{name}");
            }
        }
        Commands::Attributes => {
            for name in store.attributes()? {
                println!("{name}");
            }
        }
        Commands::Values { name } => {
            for value in store.attribute_values(&name)? {
                println!("{value}");
            }
        }
        Commands::Size => println!("{}", store.size()?),
        Commands::Reap => {
            let stats = store.reap()?;
            println!("Expired members: {}", stats.expired_members);
            println!("Dropped collections: {}", stats.dropped_collections);
            println!("Dropped attributes: {}", stats.dropped_attributes);
        }
        Commands::Reset => store.reset()?,
        Commands::Maintain => {
            let interval = Duration::from_secs(config.maintenance.reap_interval_secs.max(1));
            info!(
                "Starting maintenance every {}s on {}",
                interval.as_secs(),
                config.store.path.display()
            );
            let task = tokio::spawn(maintain::maintain_loop(Arc::new(store), interval));
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down maintenance");
            task.abort();
        }
    }

    Ok(())
}
