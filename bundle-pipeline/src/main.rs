use anyhow::Context;
use bundle_pipeline::{
    config::Config,
    publisher::{LogPublisher, RedisPublisher, ResultPublisher},
    relay::{HttpBuilderClient, RelayGateway},
    server,
    simulator::{BundleSimulator, DeterministicExecutionModel, HttpNodeClient, NodeRpcClient, RemoteSimulator},
    BundleStore,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bundle-pipeline", version, about = "Bundle relay, simulator and block builder")]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Accept searcher bundles on the JSON-RPC endpoint
    Relay,
    /// Estimate bundle outcomes against the execution node
    Simulator,
    /// Rank submitted bundles and build blocks
    Builder {
        #[arg(long, env = "PUBLISHER", value_enum, default_value_t = PublisherKind::Redis)]
        publisher: PublisherKind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PublisherKind {
    Log,
    Redis,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.log_json);
    info!("[Config] Loaded configuration for {}", cli.config.environment);

    match cli.command {
        Command::Relay => run_relay(&cli.config).await,
        Command::Simulator => run_simulator(&cli.config).await,
        Command::Builder { publisher } => run_builder(&cli.config, publisher).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_relay(config: &Config) -> anyhow::Result<()> {
    let simulator = Arc::new(RemoteSimulator::new(&config.simulator_url(), config.simulation_timeout()));
    let builder = Arc::new(HttpBuilderClient::new(&config.builder_url(), config.builder_timeout()));
    let gateway = Arc::new(RelayGateway::new(simulator, builder));

    info!("🚀 Starting relay (simulator at {}, builder at {})", config.simulator_url(), config.builder_url());
    serve(config.relay_addr(), server::relay_router(gateway)).await
}

async fn run_simulator(config: &Config) -> anyhow::Result<()> {
    let nodes = config
        .node_urls()
        .into_iter()
        .map(|url| {
            HttpNodeClient::new(url, config.node_probe_timeout())
                .map(|node| Arc::new(node) as Arc<dyn NodeRpcClient>)
        })
        .collect::<Result<Vec<_>, _>>()
        .context("failed to build node client")?;

    anyhow::ensure!(!nodes.is_empty(), "no execution node configured (ANVIL_RPC / GETH_RPC)");

    let model = Arc::new(DeterministicExecutionModel::default());
    let simulator = Arc::new(
        BundleSimulator::new(nodes, model, config.simulation_timeout())
            .with_probe_timeout(config.node_probe_timeout()),
    );

    info!("🧠 Starting simulator against {:?}", config.node_urls());
    serve(config.simulator_addr(), server::simulator_router(simulator)).await
}

async fn run_builder(config: &Config, kind: PublisherKind) -> anyhow::Result<()> {
    let publisher: Arc<dyn ResultPublisher> = match kind {
        PublisherKind::Log => Arc::new(LogPublisher),
        PublisherKind::Redis => {
            let publisher = RedisPublisher::open(&config.database_url, config.publish_timeout())
                .context("invalid DATABASE_URL")?;
            publisher
                .ping()
                .await
                .with_context(|| format!("durable store at {} is unreachable", config.database_url))?;
            info!("Connected to durable store");
            Arc::new(publisher)
        }
    };

    let store = Arc::new(BundleStore::new(publisher));

    info!("🔨 Starting builder with {:?} publisher", kind);
    serve(config.builder_addr(), server::builder_router(store)).await
}

async fn serve(addr: SocketAddr, router: axum::Router) -> anyhow::Result<()> {
    let server = server::bind(addr, router).with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", server.local_addr());

    server.with_graceful_shutdown(shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received termination signal"),
    }
}
