use clap::Args;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Settings shared by the relay, simulator and builder.
///
/// Every option can be given on the command line or through the environment
/// (a `.env` file is loaded first).
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Durable store for build results
    #[arg(long, env = "DATABASE_URL", default_value = "redis://127.0.0.1:6379/", global = true)]
    pub database_url: String,

    #[arg(long, env = "RELAY_PORT", default_value_t = 8080, global = true)]
    pub relay_port: u16,

    #[arg(long, env = "SIMULATOR_PORT", default_value_t = 50051, global = true)]
    pub simulator_port: u16,

    #[arg(long, env = "BUILDER_PORT", default_value_t = 50052, global = true)]
    pub builder_port: u16,

    /// Host the relay uses to reach the simulator
    #[arg(long, env = "SIMULATOR_HOST", default_value = "127.0.0.1", global = true)]
    pub simulator_host: String,

    /// Host the relay uses to reach the builder
    #[arg(long, env = "BUILDER_HOST", default_value = "127.0.0.1", global = true)]
    pub builder_host: String,

    /// Interface the services listen on
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0", global = true)]
    pub bind_host: IpAddr,

    /// Primary execution node
    #[arg(long, env = "ANVIL_RPC", default_value = "http://anvil:8545", global = true)]
    pub anvil_rpc: String,

    /// Fallback execution node
    #[arg(long, env = "GETH_RPC", default_value = "http://geth:8545", global = true)]
    pub geth_rpc: String,

    #[arg(long = "env", env = "ENV", default_value = "development", global = true)]
    pub environment: String,

    #[arg(long, env = "SIMULATION_TIMEOUT_MS", default_value_t = 5_000, global = true)]
    pub simulation_timeout_ms: u64,

    /// Per-node bound on the `eth_chainId` liveness probe
    #[arg(long, env = "NODE_PROBE_TIMEOUT_MS", default_value_t = 1_000, global = true)]
    pub node_probe_timeout_ms: u64,

    #[arg(long, env = "PUBLISH_TIMEOUT_MS", default_value_t = 3_000, global = true)]
    pub publish_timeout_ms: u64,

    #[arg(long, env = "BUILDER_TIMEOUT_MS", default_value_t = 5_000, global = true)]
    pub builder_timeout_ms: u64,
}

impl Config {
    pub fn relay_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.relay_port)
    }

    pub fn simulator_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.simulator_port)
    }

    pub fn builder_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.builder_port)
    }

    pub fn simulator_url(&self) -> String {
        format!("http://{}:{}", self.simulator_host, self.simulator_port)
    }

    pub fn builder_url(&self) -> String {
        format!("http://{}:{}", self.builder_host, self.builder_port)
    }

    /// Execution nodes in probe order, blanks and duplicates removed.
    pub fn node_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for url in [&self.anvil_rpc, &self.geth_rpc] {
            let url = url.trim();
            if !url.is_empty() && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    pub fn simulation_timeout(&self) -> Duration {
        Duration::from_millis(self.simulation_timeout_ms)
    }

    pub fn node_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.node_probe_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn builder_timeout(&self) -> Duration {
        Duration::from_millis(self.builder_timeout_ms)
    }
}
