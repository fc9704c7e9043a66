//! Audit Ingest - indexes gateway audit documents named by object-store events.
//!
//! Reads one event batch (JSON) from the file given as the first argument, or
//! from stdin, and prints the batch summary as JSON.

use std::env;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use audit_ingest::{Config, EventBatch, Ingestor, ObjectStoreLoader, SqliteIndexStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("audit-ingest {}", VERSION);
        return Ok(());
    }

    // Logs go to stderr, stdout carries the summary
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load()
        .map_err(|e| format!("Failed to load configuration: {}", e))?;

    let raw = match args.get(1) {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read event file {}: {}", path, e))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    let batch: EventBatch = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid event batch: {}", e))?;

    let loader = Arc::new(ObjectStoreLoader::new(config.source.region.clone()));
    let store = Arc::new(SqliteIndexStore::new(&config.store.path)?);
    let ingestor = Ingestor::new(loader, store, config.preview.max_chars);

    let summary = ingestor.handle_batch(&batch).await;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
