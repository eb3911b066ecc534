//! kay CLI
//!
//! Moves queued items into Elasticsearch, once or forever.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use kay::config::{EndpointConfig, TransferConfig, TransferOptions};
use kay::connectors::mapping::SUPPORTED_TYPES;
use kay::{Pipeline, Registry, Shutdown};

#[derive(Parser)]
#[command(name = "kay")]
#[command(version)]
#[command(about = "Transfer queued items from one storage to another", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a transfer from a config file
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Stop after one cycle
        #[arg(long)]
        no_keep_alive: bool,

        /// Seconds to rest between cycles
        #[arg(long)]
        rest: Option<u64>,

        /// Hide the progress spinner
        #[arg(long)]
        no_progress: bool,
    },

    /// Transfer items from a Redis queue to Elasticsearch
    Redis2es(Redis2EsArgs),

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// List registered backends
    Backends,

    /// Generate example configuration
    Init {
        /// Backend (redis2es, json2es, redis2none)
        #[arg(short, long)]
        backend: String,

        /// Output file path
        #[arg(short, long, default_value = "kay.yaml")]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct Redis2EsArgs {
    /// Redis URL
    #[arg(long, env = "KAY_REDIS_URL")]
    redis_url: String,

    /// Redis list holding the items
    #[arg(long, default_value = "items")]
    redis_queue: String,

    /// Elasticsearch URL
    #[arg(long, env = "KAY_ES_URL")]
    es_url: String,

    /// Kind of the items
    #[arg(long, value_parser = SUPPORTED_TYPES)]
    es_items_type: String,

    /// Target index (default: <alias>_<timestamp>)
    #[arg(long)]
    es_index: Option<String>,

    /// Alias bound to the index (default: derived from the items type)
    #[arg(long)]
    es_index_alias: Option<String>,

    /// Elasticsearch request timeout in seconds
    #[arg(long, default_value_t = 3600)]
    es_timeout: u64,

    /// Retries for failed Elasticsearch connections
    #[arg(long, default_value_t = 50)]
    es_max_retries: u32,

    /// Do not retry timed out Elasticsearch requests
    #[arg(long)]
    es_no_retry_on_timeout: bool,

    /// Verify Elasticsearch TLS certificates
    #[arg(long)]
    es_verify_certs: bool,

    /// Stop after one cycle
    #[arg(long)]
    no_keep_alive: bool,

    /// Seconds to rest between cycles
    #[arg(long, default_value_t = 0)]
    rest: u64,

    /// Hide the progress spinner
    #[arg(long)]
    no_progress: bool,
}

impl Redis2EsArgs {
    fn into_config(self) -> TransferConfig {
        let mut sink = EndpointConfig::default()
            .with_param("url", self.es_url)
            .with_param("items_type", self.es_items_type)
            .with_param("timeout", self.es_timeout)
            .with_param("max_retries", self.es_max_retries)
            .with_param("retry_on_timeout", !self.es_no_retry_on_timeout)
            .with_param("verify_certs", self.es_verify_certs);
        if let Some(index) = self.es_index {
            sink = sink.with_param("index", index);
        }
        if let Some(alias) = self.es_index_alias {
            sink = sink.with_param("index_alias", alias);
        }

        TransferConfig {
            backend: Some("redis2es".to_string()),
            source: EndpointConfig::default()
                .with_param("url", self.redis_url)
                .with_param("queue", self.redis_queue),
            sink,
            options: TransferOptions {
                keep_alive: !self.no_keep_alive,
                rest: self.rest,
                ..TransferOptions::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            config,
            no_keep_alive,
            rest,
            no_progress,
        } => {
            info!("Loading configuration from {:?}", config);
            let mut config = TransferConfig::from_file(&config)?;
            if no_keep_alive {
                config.options.keep_alive = false;
            }
            if let Some(rest) = rest {
                config.options.rest = rest;
            }
            run_transfer(config, !no_progress).await?;
        }
        Commands::Redis2es(args) => {
            let progress = !args.no_progress;
            run_transfer(args.into_config(), progress).await?;
        }
        Commands::Validate { config } => {
            validate_config(&config)?;
        }
        Commands::Backends => {
            list_backends();
        }
        Commands::Init { backend, output } => {
            generate_config(&backend, &output)?;
        }
    }

    Ok(())
}

async fn run_transfer(config: TransferConfig, progress: bool) -> anyhow::Result<()> {
    let registry = Registry::with_defaults();
    let shutdown = Shutdown::new();

    let mut pipeline = Pipeline::from_config(config, &registry)
        .await?
        .with_shutdown(shutdown.clone())
        .with_progress(progress);
    shutdown.listen_for_signals()?;

    let stats = pipeline.run().await?;

    println!("\n✅ Transfer complete!");
    println!("   Cycles:     {} ({} failed)", stats.cycles, stats.failed_cycles);
    println!("   Processed:  {}", stats.processed);
    println!("   Committed:  {}", stats.committed);
    println!("   Lost:       {}", stats.lost);
    println!("   Duration:   {:.2}s", stats.duration_secs);
    println!("   Throughput: {:.0} items/sec", stats.throughput());

    Ok(())
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let registry = Registry::with_defaults();
    let mut config = TransferConfig::from_file(config_path)?;
    config.resolve(&registry)?;
    config.validate(&registry)?;

    println!("✅ Configuration is valid!");
    if let Some(backend) = &config.backend {
        println!("   Backend:    {}", backend);
    }
    println!("   Source:     {}", config.source.kind()?);
    println!("   Sink:       {}", config.sink.kind()?);
    println!("   Keep alive: {}", config.options.keep_alive);
    println!("   Rest:       {}s", config.options.rest);

    Ok(())
}

fn list_backends() {
    let registry = Registry::with_defaults();

    println!("Available backends:");
    for backend in registry.backends() {
        println!("   {:<12} {} -> {}", backend.name, backend.source, backend.sink);
    }
}

fn generate_config(backend: &str, output: &Path) -> anyhow::Result<()> {
    let template = match backend.to_lowercase().as_str() {
        "redis2es" => REDIS2ES_TEMPLATE,
        "json2es" => JSON2ES_TEMPLATE,
        "redis2none" => REDIS2NONE_TEMPLATE,
        _ => anyhow::bail!(
            "Unknown backend: {}. Supported backends: redis2es, json2es, redis2none",
            backend
        ),
    };

    std::fs::write(output, template)?;
    println!("✅ Generated configuration: {:?}", output);
    println!("   Edit the file and run: kay run --config {:?}", output);

    Ok(())
}

const REDIS2ES_TEMPLATE: &str = r#"# kay configuration - Redis to Elasticsearch
backend: redis2es

source:
  url: redis://localhost:6379
  # password: ${REDIS_PASSWORD}
  queue: items

sink:
  url: http://localhost:9200
  items_type: perceval  # perceval, graal or galahad
  # index: raw-items_20180101000000  # default: <alias>_<UTC timestamp>
  # index_alias: raw-items           # default: derived from items_type
  timeout: 3600
  max_retries: 50
  retry_on_timeout: true
  verify_certs: false
  bulk_size: 100

options:
  keep_alive: true
  rest: 0
  continue_on_error: false
"#;

const JSON2ES_TEMPLATE: &str = r#"# kay configuration - JSON file to Elasticsearch
backend: json2es

source:
  path: ./items.json
  array_path: ""  # dotted path to the items array, empty for a root array

sink:
  url: http://localhost:9200
  items_type: perceval  # perceval, graal or galahad
  bulk_size: 100

options:
  keep_alive: false
"#;

const REDIS2NONE_TEMPLATE: &str = r#"# kay configuration - empty a Redis queue
backend: redis2none

source:
  url: redis://localhost:6379
  queue: items

options:
  keep_alive: false
"#;
