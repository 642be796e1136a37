//! deweb-cache
//!
//! Fetches a website resource from a node's datastore through the two-tier
//! cache and writes it to stdout or a file.
//!
//! ```text
//! deweb-cache --node-url http://127.0.0.1:33035 AS12abc... about
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deweb_cache::error::{Error, Result};
use deweb_cache::{Config, JsonRpcStore, ResourceService, TwoTierCache};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Website resource fetcher with a RAM + disk cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Website address in the datastore
    address: String,

    /// Requested resource path
    #[arg(default_value = "index.html")]
    resource: String,

    /// JSON-RPC URL of the node (overrides the config file)
    #[arg(long, env = "NODE_URL")]
    node_url: Option<String>,

    /// YAML configuration file
    #[arg(long, env = "DEWEB_CONFIG")]
    config: Option<PathBuf>,

    /// Disk cache directory (overrides the config file)
    #[arg(long, env = "DEWEB_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Maximum entries in the RAM tier
    #[arg(long, env = "DEWEB_MAX_RAM_ENTRIES")]
    max_ram_entries: Option<usize>,

    /// Maximum entries in the disk tier
    #[arg(long, env = "DEWEB_MAX_DISK_ENTRIES")]
    max_disk_entries: Option<usize>,

    /// Bypass the cache entirely
    #[arg(long, env = "DEWEB_NO_CACHE")]
    no_cache: bool,

    /// Node request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value = "30")]
    request_timeout_seconds: u64,

    /// Write the resource here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = load_config(&args)?;
    let node_url = config
        .node_url
        .clone()
        .ok_or_else(|| Error::Config("no node URL configured".into()))?;

    info!("Starting deweb-cache");
    info!("  Node URL: {}", node_url);
    info!("  Cache enabled: {}", config.cache.enabled);
    if config.cache.enabled {
        info!("  Cache directory: {}", config.cache.disk_cache_dir.display());
        info!(
            "  Max entries: {} RAM, {} disk",
            config.cache.max_ram_entries, config.cache.max_disk_entries
        );
    }

    let store = JsonRpcStore::with_timeout(
        node_url,
        Duration::from_secs(args.request_timeout_seconds),
    )?;
    let service = ResourceService::new(Arc::new(store), config.cache.file_list_cache_ttl());

    let cache = if config.cache.enabled {
        Some(TwoTierCache::open(&config.cache)?)
    } else {
        None
    };

    let result = service
        .get_website_resource(&args.address, &args.resource, cache.as_ref())
        .await;

    if let Some(cache) = cache {
        let metrics = cache.metrics();
        info!(
            ram_hits = metrics.ram_hits,
            disk_hits = metrics.disk_hits,
            misses = metrics.misses,
            "Cache statistics"
        );
        if let Err(e) = cache.close() {
            warn!("Failed to close cache cleanly: {}", e);
        }
    }

    let resource = result.map_err(|e| {
        error!("Failed to get {}/{}: {}", args.address, args.resource, e);
        e
    })?;

    info!(
        "Served {} ({} bytes) from {}",
        resource.resource,
        resource.content.len(),
        resource.source
    );
    let mut header_names: Vec<_> = resource.headers.iter().collect();
    header_names.sort();
    for (name, value) in header_names {
        info!("  {}: {}", name, value);
    }

    match &args.output {
        Some(path) => tokio::fs::write(path, &resource.content).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&resource.content).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

/// Config file (or defaults) with command line overrides applied
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(node_url) = &args.node_url {
        config.node_url = Some(node_url.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.disk_cache_dir = dir.clone();
    }
    if let Some(max) = args.max_ram_entries {
        config.cache.max_ram_entries = max;
    }
    if let Some(max) = args.max_disk_entries {
        config.cache.max_disk_entries = max;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries the resource itself
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
