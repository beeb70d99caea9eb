use crate::block_assembler::BuildResult;
use crate::bundle::Bundle;
use crate::bundle_store::{BundleStore, StoreError};
use crate::rpc::{BundleParams, BundleSubmission, RelayResult};
use crate::simulator::{SimulationClient, SimulationError};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const SUBMIT_PATH: &str = "/builder/v1/bundle";

pub const DEFAULT_BUILDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Hands simulated bundles to a builder.
#[async_trait]
pub trait BuilderClient: Send + Sync {
    async fn submit(&self, submission: BundleSubmission) -> Result<BuildResult, RelayError>;
}

#[async_trait]
impl BuilderClient for BundleStore {
    async fn submit(&self, submission: BundleSubmission) -> Result<BuildResult, RelayError> {
        BundleStore::submit(self, submission.into_bundle())
            .await
            .map_err(RelayError::from)
    }
}

pub struct HttpBuilderClient {
    url: String,
    client: Client,
    timeout: Duration,
}

impl HttpBuilderClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), SUBMIT_PATH),
            client: Client::new(),
            timeout,
        }
    }

    async fn call(&self, submission: &BundleSubmission) -> Result<BuildResult, RelayError> {
        let unavailable = |e: reqwest::Error| RelayError::UpstreamUnavailable(format!("builder: {e}"));

        let response = self
            .client
            .post(&self.url)
            .json(submission)
            .send()
            .await
            .map_err(unavailable)?;

        // a 4xx means the builder refused this bundle, not that it is down
        let status = response.status();
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RelayError::InvalidRequest(format!(
                "builder rejected bundle ({status}): {detail}"
            )));
        }

        response
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)
    }
}

#[async_trait]
impl BuilderClient for HttpBuilderClient {
    async fn submit(&self, submission: BundleSubmission) -> Result<BuildResult, RelayError> {
        tokio::time::timeout(self.timeout, self.call(&submission))
            .await
            .map_err(|_| {
                RelayError::UpstreamUnavailable(format!("builder did not answer within {:?}", self.timeout))
            })?
    }
}

/// Searcher-facing entry point: validate, simulate, then forward to the builder.
pub struct RelayGateway {
    simulator: Arc<dyn SimulationClient>,
    builder: Arc<dyn BuilderClient>,
}

impl RelayGateway {
    pub fn new(simulator: Arc<dyn SimulationClient>, builder: Arc<dyn BuilderClient>) -> Self {
        Self { simulator, builder }
    }

    pub async fn handle(&self, params: BundleParams) -> Result<RelayResult, RelayError> {
        let start = Instant::now();
        validate_params(&params)?;

        if let Some(replacement) = &params.replacement_uuid {
            // replacement of earlier bundles is not tracked; the uuid is only logged
            info!("Bundle submission carries replacement uuid {}", replacement);
        }

        let bundle = Bundle::new(Bundle::generate_id(), params.txs, 0.0, params.block_number);
        info!(
            "Received bundle {} with {} txs targeting block {}",
            bundle.id,
            bundle.transactions.len(),
            bundle.target_block
        );

        let outcome = self.simulator.simulate(&bundle).await?;
        let simulated_at = Utc::now();

        if !outcome.success {
            warn!(
                "Bundle {} failed simulation: {}",
                bundle.id,
                outcome.failure_reason.as_deref().unwrap_or("unknown")
            );
            return Ok(RelayResult {
                bundle_hash: bundle.id,
                profit_eth: outcome.estimated_profit,
                latency_ms: start.elapsed().as_millis() as u64,
                simulated_at,
                success: false,
                block_hash: None,
                included: None,
                reason: outcome.failure_reason,
            });
        }

        let submission = BundleSubmission {
            bundle_id: bundle.id.clone(),
            txs: bundle.transactions,
            profit_eth: outcome.estimated_profit,
            target_block: bundle.target_block,
        };
        let build = self.builder.submit(submission).await?;

        info!(
            "Bundle {} built into block {} (profit={:.6} ETH)",
            bundle.id, build.block_hash, outcome.estimated_profit
        );

        Ok(RelayResult {
            bundle_hash: bundle.id,
            profit_eth: outcome.estimated_profit,
            latency_ms: start.elapsed().as_millis() as u64,
            simulated_at,
            success: true,
            block_hash: Some(build.block_hash),
            included: Some(build.included),
            reason: None,
        })
    }
}

fn validate_params(params: &BundleParams) -> Result<(), RelayError> {
    if params.txs.is_empty() {
        return Err(RelayError::InvalidRequest("bundle has no transactions".into()));
    }

    if params.txs.iter().any(|tx| tx.trim().is_empty()) {
        return Err(RelayError::InvalidRequest("bundle contains an empty transaction".into()));
    }

    if params.block_number.trim().is_empty() {
        return Err(RelayError::InvalidRequest("missing blockNumber".into()));
    }

    if params.min_timestamp > 0 && params.max_timestamp > 0 && params.min_timestamp > params.max_timestamp {
        return Err(RelayError::InvalidRequest("minTimestamp is after maxTimestamp".into()));
    }

    Ok(())
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("build failed: {0}")]
    Build(String),
}

impl From<SimulationError> for RelayError {
    fn from(e: SimulationError) -> Self {
        RelayError::UpstreamUnavailable(e.to_string())
    }
}

impl From<StoreError> for RelayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidBundle(inner) => RelayError::InvalidRequest(inner.to_string()),
            other => RelayError::Build(other.to_string()),
        }
    }
}
