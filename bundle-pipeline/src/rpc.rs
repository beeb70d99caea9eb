//! Wire types shared by the relay, simulator and builder services.

use crate::bundle::Bundle;
use crate::simulator::SimulationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const JSONRPC_VERSION: &str = "2.0";

pub const INVALID_REQUEST: i64 = -32600;
pub const INVALID_PARAMS: i64 = -32602;
pub const UPSTREAM_ERROR: i64 = -32000;
pub const INTERNAL_ERROR: i64 = -32603;

// --- Relay ingress (JSON-RPC) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Vec<BundleParams>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleParams {
    #[serde(default)]
    pub txs: Vec<String>,
    #[serde(default)]
    pub block_number: String,
    #[serde(default)]
    pub min_timestamp: i64,
    #[serde(default)]
    pub max_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_uuid: Option<String>,
}

/// `result` payload of a relay response. Field names follow the public relay API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResult {
    #[serde(rename = "bundleHash")]
    pub bundle_hash: String,
    pub profit_eth: f64,
    pub latency_ms: u64,
    pub simulated_at: DateTime<Utc>,
    pub success: bool,
    #[serde(rename = "blockHash", default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse<T> {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl<T> RpcResponse<T> {
    pub fn success(id: Value, result: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// --- Relay -> Simulator ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub bundle_id: String,
    pub txs: Vec<String>,
    #[serde(default)]
    pub target_block: String,
}

impl From<&Bundle> for SimulateRequest {
    fn from(bundle: &Bundle) -> Self {
        Self {
            bundle_id: bundle.id.clone(),
            txs: bundle.transactions.clone(),
            target_block: bundle.target_block.clone(),
        }
    }
}

impl SimulateRequest {
    pub fn into_bundle(self) -> Bundle {
        Bundle::new(self.bundle_id, self.txs, 0.0, self.target_block)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    pub bundle_id: String,
    pub profit_eth: f64,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub reason: String,
}

impl From<SimulationOutcome> for SimulateResponse {
    fn from(outcome: SimulationOutcome) -> Self {
        Self {
            bundle_id: outcome.bundle_id,
            profit_eth: outcome.estimated_profit,
            latency_ms: outcome.latency.as_millis() as u64,
            success: outcome.success,
            reason: outcome.failure_reason.unwrap_or_default(),
        }
    }
}

impl From<SimulateResponse> for SimulationOutcome {
    fn from(response: SimulateResponse) -> Self {
        Self {
            bundle_id: response.bundle_id,
            success: response.success,
            estimated_profit: response.profit_eth,
            latency: Duration::from_millis(response.latency_ms),
            failure_reason: (!response.reason.is_empty()).then_some(response.reason),
        }
    }
}

// --- Relay -> Builder ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSubmission {
    pub bundle_id: String,
    pub txs: Vec<String>,
    pub profit_eth: f64,
    #[serde(default)]
    pub target_block: String,
}

impl BundleSubmission {
    pub fn into_bundle(self) -> Bundle {
        Bundle::new(self.bundle_id, self.txs, self.profit_eth, self.target_block)
    }
}
