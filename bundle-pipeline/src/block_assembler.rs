use crate::bundle::Bundle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const HIGHEST_PROFIT_REASON: &str = "highest profit";

/// Outcome of one build cycle. Always tied to exactly one selected bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub block_hash: String,
    pub included: bool,
    pub inclusion_reason: String,
    pub inclusion_latency_ms: u64,
    pub produced_at: DateTime<Utc>,
    #[serde(default)]
    pub bundle_id: String,
    #[serde(default)]
    pub profit_eth: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BlockAssembler;

impl BlockAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Picks the single winner of a ranked set: its first element.
    pub fn select_top<'a>(&self, ranked: &'a [Bundle]) -> Result<&'a Bundle, AssemblyError> {
        ranked.first().ok_or(AssemblyError::NoCandidates)
    }

    pub fn assemble(&self, selected: &Bundle, latency: Duration) -> BuildResult {
        let result = BuildResult {
            block_hash: block_hash(&selected.id),
            included: true,
            inclusion_reason: HIGHEST_PROFIT_REASON.to_string(),
            inclusion_latency_ms: latency.as_millis() as u64,
            produced_at: Utc::now(),
            bundle_id: selected.id.clone(),
            profit_eth: selected.declared_profit,
        };

        tracing::debug!(
            "Assembled block {} from bundle {} ({} txs, profit {:.6} ETH)",
            result.block_hash,
            selected.id,
            selected.transactions.len(),
            selected.declared_profit
        );

        result
    }
}

/// Short deterministic block digest: `0x` followed by the first 8 bytes of SHA-256(bundle id).
pub fn block_hash(bundle_id: &str) -> String {
    let digest = Sha256::digest(bundle_id.as_bytes());
    format!("0x{}", hex::encode(&digest[..8]))
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("No candidate bundles to select from")]
    NoCandidates,
}
