//! CSV to NDJSON streaming server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use csv_ndjson_stream::config::ServerConfig;
use csv_ndjson_stream::server::Server;

#[derive(Parser)]
#[command(name = "csv-ndjson-stream")]
#[command(about = "Stream CSV files over HTTP as newline-delimited JSON", long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "NDJSON_STREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "NDJSON_STREAM_BIND")]
    bind: Option<String>,

    /// Worker threads
    #[arg(long, env = "NDJSON_STREAM_WORKERS")]
    workers: Option<usize>,

    /// Records per batch when a request omits `chunksize`
    #[arg(long, env = "NDJSON_STREAM_CHUNK_SIZE")]
    default_chunk_size: Option<usize>,

    /// Pause after each data frame in milliseconds
    #[arg(long, env = "NDJSON_STREAM_FRAME_DELAY_MS")]
    frame_delay_ms: Option<u64>,

    /// Directory that request paths are resolved against
    #[arg(long, env = "NDJSON_STREAM_DATA_ROOT")]
    data_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.validate()?;

    let server = Server::bind(config.clone())
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let addr = server.local_addr()?;
    tracing::info!(
        "try: curl -N 'http://{addr}/stream?path=data.csv&chunksize={}&groupby=category'",
        config.default_chunk_size
    );
    server.run()?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ServerConfig::default(),
    };

    // Apply overrides
    if let Some(bind) = &cli.bind {
        config.bind = bind.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(n) = cli.default_chunk_size {
        config.default_chunk_size = n;
    }
    if let Some(ms) = cli.frame_delay_ms {
        config.frame_delay_ms = Some(ms);
    }
    if let Some(root) = &cli.data_root {
        config.data_root = Some(root.clone());
    }
    Ok(config)
}
