//! Tracker client command-line entry point.
//!
//! ```text
//! tracker-client --config client.toml check
//! tracker-client --config client.toml get --endpoint acme --path wit/workitems/42 --repeat 3
//! tracker-client --config client.toml poll --endpoint acme --path wit/workitems/42
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use tracker_client::config::load_config;
use tracker_client::config::watcher::ConfigWatcher;
use tracker_client::observability::{logging, metrics};
use tracker_client::{ApiRequest, EndpointRegistry};

#[derive(Parser)]
#[command(name = "tracker-client")]
#[command(about = "Resilient client for a work-item tracking service", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and list endpoints
    Check,
    /// Run cacheable reads and print outcomes
    Get {
        #[arg(short, long)]
        endpoint: String,
        #[arg(short, long)]
        path: String,
        /// Resource identifier used for cache invalidation (defaults to the path)
        #[arg(short, long)]
        resource: Option<String>,
        /// Query parameter as key=value; repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Poll a resource until interrupted, reloading config on change
    Poll {
        #[arg(short, long)]
        endpoint: String,
        #[arg(short, long)]
        path: String,
        #[arg(long, default_value_t = 5_000)]
        interval_ms: u64,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn build_request(path: &str, resource: Option<&str>, params: &[(String, String)]) -> ApiRequest {
    let resource = resource.unwrap_or(path).to_string();
    params
        .iter()
        .fold(ApiRequest::read(resource, path), |req, (k, v)| req.with_param(k.clone(), v.clone()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        endpoints = config.endpoints.len(),
        path = ?cli.config,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Check => {
            for endpoint in &config.endpoints {
                println!("{}\t{}", endpoint.name, endpoint.base_url);
            }
            println!("configuration OK ({} endpoints)", config.endpoints.len());
        }
        Commands::Get {
            endpoint,
            path,
            resource,
            params,
            repeat,
        } => {
            let registry = EndpointRegistry::from_config(&config)?;
            let executor = registry
                .get(&endpoint)
                .ok_or_else(|| format!("unknown endpoint '{endpoint}'"))?;

            let request = build_request(&path, resource.as_deref(), &params);
            for _ in 0..repeat.max(1) {
                let outcome = executor.run(request.clone()).await;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            println!("{}", serde_json::to_string_pretty(&executor.metrics_snapshot())?);
        }
        Commands::Poll {
            endpoint,
            path,
            interval_ms,
        } => {
            if config.observability.metrics_enabled {
                match config.observability.metrics_address.parse() {
                    Ok(addr) => metrics::init_metrics(addr)?,
                    Err(_) => tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        "Failed to parse metrics address"
                    ),
                }
            }

            let registry = EndpointRegistry::from_config(&config)?;
            let (watcher, mut updates) = ConfigWatcher::new(&cli.config);
            let _watcher = watcher.run()?;

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, stopping");
                    trigger.cancel();
                }
            });

            let request = build_request(&path, None, &[]);
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    Some(next) = updates.recv() => {
                        if let Err(e) = registry.apply_config(&next) {
                            tracing::error!(error = %e, "Failed to apply reloaded config");
                        }
                    }
                    _ = ticker.tick() => {
                        let Some(executor) = registry.get(&endpoint) else {
                            tracing::warn!(endpoint = %endpoint, "Endpoint no longer configured");
                            continue;
                        };
                        let outcome = executor.run_with_cancel(request.clone(), &cancel).await;
                        println!("{}", serde_json::to_string(&outcome)?);
                    }
                }
            }

            for snapshot in registry.snapshots() {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
        }
    }

    Ok(())
}
