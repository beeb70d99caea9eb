use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A searcher-submitted, ordered set of opaque transaction payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    pub transactions: Vec<String>,
    pub declared_profit: f64,
    pub target_block: String,
    pub submitted_at: DateTime<Utc>,
}

impl Bundle {
    pub fn new(
        id: impl Into<String>,
        transactions: Vec<String>,
        declared_profit: f64,
        target_block: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            transactions,
            declared_profit,
            target_block: target_block.into(),
            submitted_at: Utc::now(),
        }
    }

    /// Fresh random identifier. Timestamps collide under burst traffic, v4 uuids do not.
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn validate(&self) -> Result<(), BundleError> {
        if self.id.trim().is_empty() {
            return Err(BundleError::MissingId);
        }

        if self.transactions.is_empty() {
            return Err(BundleError::EmptyBundle);
        }

        if self.transactions.iter().any(|tx| tx.trim().is_empty()) {
            return Err(BundleError::EmptyTransaction);
        }

        if !self.declared_profit.is_finite() {
            return Err(BundleError::InvalidProfit(self.declared_profit));
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BundleError {
    #[error("Bundle id cannot be empty")]
    MissingId,
    #[error("Bundle cannot be empty")]
    EmptyBundle,
    #[error("Bundle contains an empty transaction payload")]
    EmptyTransaction,
    #[error("Bundle profit must be a finite number, got {0}")]
    InvalidProfit(f64),
}
