use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use imagewatch::cache::ResultCache;
use imagewatch::config::{Config, FETCH_TIMEOUT_MS};
use imagewatch::discovery::Directory;
use imagewatch::finder::Finder;
use imagewatch::logging;
use imagewatch::registry::{DistributionConnector, RegistryEndpoint};
use imagewatch::resolver::TagResolver;
use imagewatch::server::{self, AppState};
use imagewatch::version::Classifier;

#[derive(Parser)]
#[command(name = "imagewatch")]
#[command(version, about = "Export the update status of running container images to Prometheus")]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Registry as `scheme://[user[:password]@]host[:port]`, takes precedence
    /// over configured registries of the same address. Can be repeated.
    #[arg(long = "registry", value_name = "URL")]
    registries: Vec<RegistryEndpoint>,

    /// Log filter, e.g. `debug` or `imagewatch=trace`
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Address the HTTP server listens on
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    if let Some(listen) = cli.listen {
        config.http.address = listen;
    }
    config.validate()?;

    let _guard = logging::init(&config.log)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config, cli.registries))
}

async fn run(config: Config, cli_endpoints: Vec<RegistryEndpoint>) -> anyhow::Result<()> {
    let storage = Arc::new(Directory::create(config.discovery.directory.clone())?);
    info!("Reading discovery inputs from {:?}", storage.path());

    let cache = Arc::new(ResultCache::new(config.cache_ttl()));
    let _sweeper = cache.spawn_sweeper();

    let mut endpoints = cli_endpoints;
    endpoints.extend(config.endpoints());
    if endpoints.is_empty() {
        warn!("No registries configured, every image will be skipped");
    }
    for endpoint in &endpoints {
        info!("Using registry {} ({:?} auth)", endpoint.base_url(), endpoint.auth);
    }

    let connector = Arc::new(DistributionConnector::new(Duration::from_millis(
        FETCH_TIMEOUT_MS,
    ))?);
    let resolver = Arc::new(TagResolver::new(
        Arc::new(Classifier::default()),
        endpoints,
        connector,
    ));
    let finder = Arc::new(Finder::new(storage.clone(), cache, resolver));

    let app = server::router(
        AppState {
            finder,
            storage,
            namespace: Arc::from(config.prometheus.namespace.as_str()),
        },
        &config.prometheus.path,
    );

    let listener = TcpListener::bind(config.listen_address()?).await?;
    server::run(listener, app, shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
