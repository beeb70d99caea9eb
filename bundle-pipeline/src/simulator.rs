use crate::bundle::Bundle;
use crate::rpc::{SimulateRequest, SimulateResponse, JSONRPC_VERSION};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_SIMULATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for one node's `eth_chainId` answer.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub const SIMULATE_PATH: &str = "/simulator/v1/simulate";

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub bundle_id: String,
    pub success: bool,
    pub estimated_profit: f64,
    pub latency: Duration,
    pub failure_reason: Option<String>,
}

impl SimulationOutcome {
    /// Failed outcome: zero profit, `success = false`.
    pub fn failed(bundle_id: &str, latency: Duration, reason: &SimulationError) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            success: false,
            estimated_profit: 0.0,
            latency,
            failure_reason: Some(reason.to_string()),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),
    #[error("simulation timed out after {0:?}")]
    SimulationTimeout(Duration),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("simulator unreachable: {0}")]
    Upstream(String),
}

/// Estimates the outcome of a bundle.
///
/// Node and timeout failures come back as a failed `SimulationOutcome`;
/// `Err` is reserved for a simulator that cannot be reached at all.
#[async_trait]
pub trait SimulationClient: Send + Sync {
    async fn simulate(&self, bundle: &Bundle) -> Result<SimulationOutcome, SimulationError>;
}

// --- Upstream node ---

#[async_trait]
pub trait NodeRpcClient: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn chain_id(&self) -> Result<u64, SimulationError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcFault>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcFault {
    message: String,
}

pub struct HttpNodeClient {
    url: String,
    client: Client,
}

impl HttpNodeClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SimulationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SimulationError::NodeUnavailable(e.to_string()))?;
        Ok(Self { url: url.into(), client })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SimulationError> {
        let body = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
            "id": 1,
        });

        let reply: JsonRpcReply = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SimulationError::NodeUnavailable(format!("{}: {}", self.url, e)))?
            .json()
            .await
            .map_err(|e| SimulationError::NodeUnavailable(format!("invalid RPC response: {e}")))?;

        if let Some(fault) = reply.error {
            return Err(SimulationError::NodeUnavailable(format!("EVM error: {}", fault.message)));
        }

        reply
            .result
            .ok_or_else(|| SimulationError::NodeUnavailable("empty RPC result".to_string()))
    }
}

#[async_trait]
impl NodeRpcClient for HttpNodeClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn chain_id(&self) -> Result<u64, SimulationError> {
        let value = self.call("eth_chainId", json!([])).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| SimulationError::NodeUnavailable("chain id is not a string".into()))?;
        parse_quantity(raw)
    }
}

fn parse_quantity(raw: &str) -> Result<u64, SimulationError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|_| SimulationError::NodeUnavailable(format!("malformed quantity {raw}")))
}

// --- Execution model ---

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEstimate {
    pub success: bool,
    pub profit_eth: f64,
    pub reason: Option<String>,
}

/// Execution-cost model run once the node answered the liveness probe.
#[async_trait]
pub trait ExecutionModel: Send + Sync {
    async fn execute(&self, bundle: &Bundle) -> Result<ExecutionEstimate, SimulationError>;
}

/// Reproducible stand-in for trace-based profit accounting.
///
/// Profit falls in `[min_profit, min_profit + profit_span)` and is derived from
/// a SHA-256 digest of the ordered transaction set, so the same bundle always
/// yields the same estimate.
#[derive(Debug, Clone)]
pub struct DeterministicExecutionModel {
    pub min_profit: f64,
    pub profit_span: f64,
    pub failure_rate_pct: u8,
}

impl Default for DeterministicExecutionModel {
    fn default() -> Self {
        Self {
            min_profit: 0.001,
            profit_span: 0.005,
            failure_rate_pct: 10,
        }
    }
}

impl DeterministicExecutionModel {
    pub fn estimate(&self, transactions: &[String]) -> ExecutionEstimate {
        let mut hasher = Sha256::new();
        for tx in transactions {
            hasher.update((tx.len() as u64).to_le_bytes());
            hasher.update(tx.as_bytes());
        }
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let fraction = u64::from_le_bytes(head) as f64 / u64::MAX as f64;
        let success = digest[8] % 100 >= self.failure_rate_pct;

        ExecutionEstimate {
            success,
            profit_eth: self.min_profit + fraction * self.profit_span,
            reason: (!success).then(|| "execution reverted".to_string()),
        }
    }
}

#[async_trait]
impl ExecutionModel for DeterministicExecutionModel {
    async fn execute(&self, bundle: &Bundle) -> Result<ExecutionEstimate, SimulationError> {
        Ok(self.estimate(&bundle.transactions))
    }
}

// --- Simulator service side ---

pub struct BundleSimulator {
    nodes: Vec<Arc<dyn NodeRpcClient>>,
    model: Arc<dyn ExecutionModel>,
    timeout: Duration,
    probe_timeout: Duration,
}

impl BundleSimulator {
    pub fn new(
        nodes: Vec<Arc<dyn NodeRpcClient>>,
        model: Arc<dyn ExecutionModel>,
        timeout: Duration,
    ) -> Self {
        Self {
            nodes,
            model,
            timeout,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Caps each node's liveness probe so a hung node cannot starve the next one.
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Succeeds once any configured node answers `eth_chainId`, tried in order.
    async fn probe_nodes(&self) -> Result<(), SimulationError> {
        let mut last_error = SimulationError::NodeUnavailable("no upstream node configured".into());

        for node in &self.nodes {
            let probe = tokio::time::timeout(self.probe_timeout, node.chain_id())
                .await
                .unwrap_or_else(|_| {
                    Err(SimulationError::NodeUnavailable(format!(
                        "{} did not answer within {:?}",
                        node.endpoint(),
                        self.probe_timeout
                    )))
                });

            match probe {
                Ok(chain_id) => {
                    debug!("Node {} is live (chain id {})", node.endpoint(), chain_id);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Node {} failed liveness probe: {}", node.endpoint(), e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn run(&self, bundle: &Bundle) -> Result<ExecutionEstimate, SimulationError> {
        self.probe_nodes().await?;
        self.model.execute(bundle).await
    }
}

#[async_trait]
impl SimulationClient for BundleSimulator {
    async fn simulate(&self, bundle: &Bundle) -> Result<SimulationOutcome, SimulationError> {
        let start = Instant::now();
        info!(
            "Simulating bundle {} targeting block {} ({} txs)",
            bundle.id,
            bundle.target_block,
            bundle.transactions.len()
        );

        let estimate = match tokio::time::timeout(self.timeout, self.run(bundle)).await {
            Ok(result) => result,
            Err(_) => Err(SimulationError::SimulationTimeout(self.timeout)),
        };

        let outcome = match estimate {
            Ok(estimate) => SimulationOutcome {
                bundle_id: bundle.id.clone(),
                success: estimate.success,
                estimated_profit: estimate.profit_eth,
                latency: start.elapsed(),
                failure_reason: estimate.reason,
            },
            Err(e) => {
                warn!("Simulation of bundle {} failed: {}", bundle.id, e);
                SimulationOutcome::failed(&bundle.id, start.elapsed(), &e)
            }
        };

        info!(
            "Bundle {} profit={:.6} ETH (success={})",
            outcome.bundle_id, outcome.estimated_profit, outcome.success
        );
        Ok(outcome)
    }
}

// --- Relay side ---

/// Calls the simulator service over HTTP.
pub struct RemoteSimulator {
    url: String,
    client: Client,
    timeout: Duration,
}

impl RemoteSimulator {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), SIMULATE_PATH),
            client: Client::new(),
            timeout,
        }
    }

    async fn call(&self, request: &SimulateRequest) -> Result<SimulateResponse, reqwest::Error> {
        self.client
            .post(&self.url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl SimulationClient for RemoteSimulator {
    async fn simulate(&self, bundle: &Bundle) -> Result<SimulationOutcome, SimulationError> {
        let start = Instant::now();
        let request = SimulateRequest::from(bundle);

        match tokio::time::timeout(self.timeout, self.call(&request)).await {
            Ok(Ok(response)) => {
                debug!(
                    "Simulation result for bundle {}: profit={:.6} ETH success={}",
                    response.bundle_id, response.profit_eth, response.success
                );
                Ok(response.into())
            }
            Ok(Err(e)) => Err(SimulationError::Upstream(e.to_string())),
            Err(_) => {
                warn!("Simulator did not answer for bundle {} within {:?}", bundle.id, self.timeout);
                let timeout = SimulationError::SimulationTimeout(self.timeout);
                Ok(SimulationOutcome::failed(&bundle.id, start.elapsed(), &timeout))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct MockNodeClient {
        pub live: bool,
        pub hangs: bool,
        pub probes: AtomicUsize,
    }

    impl MockNodeClient {
        pub fn live() -> Arc<Self> {
            Arc::new(Self { live: true, hangs: false, probes: AtomicUsize::new(0) })
        }

        pub fn down() -> Arc<Self> {
            Arc::new(Self { live: false, hangs: false, probes: AtomicUsize::new(0) })
        }

        /// Accepts the probe and never answers.
        pub fn hanging() -> Arc<Self> {
            Arc::new(Self { live: true, hangs: true, probes: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl NodeRpcClient for MockNodeClient {
        fn endpoint(&self) -> &str {
            "mock://node"
        }

        async fn chain_id(&self) -> Result<u64, SimulationError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.hangs {
                std::future::pending::<()>().await;
            }
            if self.live {
                Ok(31337)
            } else {
                Err(SimulationError::NodeUnavailable("connection refused".into()))
            }
        }
    }

    /// Fixed outcome, optionally after a delay.
    pub struct FixedExecutionModel {
        pub profit_eth: f64,
        pub success: bool,
        pub delay: Duration,
    }

    #[async_trait]
    impl ExecutionModel for FixedExecutionModel {
        async fn execute(&self, _bundle: &Bundle) -> Result<ExecutionEstimate, SimulationError> {
            tokio::time::sleep(self.delay).await;
            Ok(ExecutionEstimate {
                success: self.success,
                profit_eth: self.profit_eth,
                reason: None,
            })
        }
    }

    pub fn nodes(list: Vec<Arc<MockNodeClient>>) -> Vec<Arc<dyn NodeRpcClient>> {
        list.into_iter().map(|n| n as Arc<dyn NodeRpcClient>).collect()
    }

    fn bundle() -> Bundle {
        Bundle::new("sim-1", vec!["0x01".into(), "0x02".into()], 0.0, "0x10")
    }

    #[tokio::test]
    async fn test_simulation_success() {
        let model = Arc::new(FixedExecutionModel { profit_eth: 0.004, success: true, delay: Duration::ZERO });
        let simulator = BundleSimulator::new(nodes(vec![MockNodeClient::live()]), model, DEFAULT_SIMULATION_TIMEOUT);

        let outcome = simulator.simulate(&bundle()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.estimated_profit, 0.004);
        assert!(outcome.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_node_unavailable_degrades() {
        let model = Arc::new(FixedExecutionModel { profit_eth: 0.004, success: true, delay: Duration::ZERO });
        let simulator = BundleSimulator::new(nodes(vec![MockNodeClient::down()]), model, DEFAULT_SIMULATION_TIMEOUT);

        let outcome = simulator.simulate(&bundle()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.estimated_profit, 0.0);
        assert!(outcome.failure_reason.unwrap().contains("node unavailable"));
    }

    #[tokio::test]
    async fn test_falls_back_to_second_node() {
        let down = MockNodeClient::down();
        let live = MockNodeClient::live();
        let model = Arc::new(FixedExecutionModel { profit_eth: 0.002, success: true, delay: Duration::ZERO });
        let simulator = BundleSimulator::new(
            nodes(vec![down.clone(), live.clone()]),
            model,
            DEFAULT_SIMULATION_TIMEOUT,
        );

        let outcome = simulator.simulate(&bundle()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(down.probes.load(Ordering::SeqCst), 1);
        assert_eq!(live.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_node_falls_back_to_next() {
        let hung = MockNodeClient::hanging();
        let live = MockNodeClient::live();
        let model = Arc::new(FixedExecutionModel { profit_eth: 0.002, success: true, delay: Duration::ZERO });
        let simulator = BundleSimulator::new(
            nodes(vec![hung.clone(), live.clone()]),
            model,
            Duration::from_millis(300),
        )
        .with_probe_timeout(Duration::from_millis(50));

        let outcome = simulator.simulate(&bundle()).await.unwrap();
        assert!(outcome.success, "reason: {:?}", outcome.failure_reason);
        assert_eq!(hung.probes.load(Ordering::SeqCst), 1);
        assert_eq!(live.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_silent_http_node_falls_back_to_next() {
        // accepts connections and never writes a byte
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let silent: Arc<dyn NodeRpcClient> =
            Arc::new(HttpNodeClient::new(format!("http://{addr}"), Duration::from_secs(5)).unwrap());
        let live = MockNodeClient::live();
        let model = Arc::new(FixedExecutionModel { profit_eth: 0.002, success: true, delay: Duration::ZERO });
        let simulator = BundleSimulator::new(
            vec![silent, live.clone() as Arc<dyn NodeRpcClient>],
            model,
            Duration::from_millis(300),
        )
        .with_probe_timeout(Duration::from_millis(100));

        let outcome = simulator.simulate(&bundle()).await.unwrap();
        assert!(outcome.success, "reason: {:?}", outcome.failure_reason);
        assert_eq!(live.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_simulation_timeout_degrades() {
        let model = Arc::new(FixedExecutionModel {
            profit_eth: 0.004,
            success: true,
            delay: Duration::from_millis(500),
        });
        let simulator = BundleSimulator::new(nodes(vec![MockNodeClient::live()]), model, Duration::from_millis(50));

        let outcome = simulator.simulate(&bundle()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.estimated_profit, 0.0);
        assert!(outcome.failure_reason.unwrap().contains("timed out"));
        assert!(outcome.latency < Duration::from_millis(500));
    }

    #[test]
    fn test_deterministic_model_is_reproducible() {
        let model = DeterministicExecutionModel::default();
        let txs = vec!["0xdead".to_string(), "0xbeef".to_string()];

        let first = model.estimate(&txs);
        let second = model.estimate(&txs);
        assert_eq!(first, second);
        assert!(first.profit_eth >= 0.001 && first.profit_eth < 0.006 + f64::EPSILON);
    }

    #[test]
    fn test_deterministic_model_failure_rate() {
        let model = DeterministicExecutionModel::default();
        let failures = (0..1000)
            .map(|i| model.estimate(&[format!("0x{i:04x}")]))
            .filter(|e| !e.success)
            .count();

        // ~10% expected
        assert!(failures > 40 && failures < 200, "failures = {failures}");
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x7a69").unwrap(), 31337);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[tokio::test]
    async fn test_remote_simulator_unreachable() {
        let remote = RemoteSimulator::new("http://127.0.0.1:1", Duration::from_millis(500));
        let result = remote.simulate(&bundle()).await;
        assert!(matches!(result, Err(SimulationError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_http_node_client_unreachable() {
        let node = HttpNodeClient::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        assert!(matches!(node.chain_id().await, Err(SimulationError::NodeUnavailable(_))));
    }
}
