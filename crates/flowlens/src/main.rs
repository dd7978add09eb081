//! Flowlens - dictionary and routing metadata for flow collectors

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, MetricsConfig};
use flowlens_dict::{Dictionaries, Dictionary, ObjectStorage};
use flowlens_routing::{Dependencies, LookupContext, Routing};

/// Flowlens - dictionary and routing metadata for flow collectors
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "FLOWLENS_CONFIG", default_value = "config/flowlens.toml")]
    config: String,

    /// Log level (overrides the configuration file)
    #[arg(long, env = "FLOWLENS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every dictionary source and the routing component, run until Ctrl-C
    Run,
    /// Fetch a configured dictionary and write it to stdout
    Fetch {
        /// Dictionary name
        dictionary: String,
    },
    /// Look up the routing metadata of a destination
    Lookup {
        destination: IpAddr,
        #[arg(long)]
        next_hop: Option<IpAddr>,
    },
    /// Print the configuration after decoding
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize logging
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, &config.logging.format);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Fetch { dictionary } => fetch(&config, &dictionary).await,
        Command::Lookup {
            destination,
            next_hop,
        } => lookup(&config, destination, next_hop).await,
        Command::Check => check(&config),
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting Flowlens v{}", env!("CARGO_PKG_VERSION"));

    init_metrics(&config.metrics)?;

    let shutdown = CancellationToken::new();

    // Initialize object storage gateway
    let gateway = Arc::new(
        ObjectStorage::new(&config.storage).context("Failed to initialize object storage")?,
    );

    // Initialize dictionary sources
    let dictionaries = Dictionaries::new(&config.dictionaries, gateway)
        .context("Failed to initialize dictionaries")?;
    info!("{} dictionaries configured", dictionaries.len());

    // Initialize routing
    let routing = Routing::new(
        &config.routing,
        Dependencies {
            shutdown: shutdown.clone(),
        },
    )
    .context("Failed to initialize routing")?;

    routing.start().await.context("Failed to start routing")?;

    shutdown_signal().await?;
    shutdown.cancel();

    if let Err(e) = routing.stop().await {
        error!("Failed to stop routing: {}", e);
    }

    info!("Flowlens stopped");
    Ok(())
}

async fn fetch(config: &Config, name: &str) -> Result<()> {
    let dictionary_config = config
        .dictionaries
        .get(name)
        .ok_or_else(|| anyhow!("Unknown dictionary: {}", name))?;

    let gateway = Arc::new(
        ObjectStorage::new(&config.storage).context("Failed to initialize object storage")?,
    );
    let dictionary = Dictionary::new(name, dictionary_config, gateway)
        .with_context(|| format!("Failed to initialize dictionary {}", name))?;

    let mut stream = dictionary
        .fetch()
        .await
        .with_context(|| format!("Failed to fetch dictionary {}", name))?;

    let mut stdout = tokio::io::stdout();
    let mut total = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Failed to read dictionary {}", name))?;
        total += chunk.len();
        stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;

    info!("Fetched dictionary {} ({} bytes)", name, total);
    Ok(())
}

async fn lookup(config: &Config, destination: IpAddr, next_hop: Option<IpAddr>) -> Result<()> {
    let routing = Routing::new(&config.routing, Dependencies::default())
        .context("Failed to initialize routing")?;
    routing.start().await.context("Failed to start routing")?;

    let result = routing
        .lookup(&LookupContext::new(), destination, next_hop)
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Err(e) = routing.stop().await {
        error!("Failed to stop routing: {}", e);
    }
    Ok(())
}

fn check(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Initialize logging
///
/// Logs go to stderr; stdout carries command output.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

/// Install the Prometheus exporter when a listen address is configured
fn init_metrics(config: &MetricsConfig) -> Result<()> {
    let Some(listen) = &config.listen else {
        return Ok(());
    };

    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid metrics listen address: {}", listen))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C handler")?;
    info!("Shutdown signal received");
    Ok(())
}
