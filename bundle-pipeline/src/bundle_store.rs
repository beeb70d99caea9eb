use crate::block_assembler::{AssemblyError, BlockAssembler, BuildResult};
use crate::bundle::{Bundle, BundleError};
use crate::publisher::ResultPublisher;
use crate::ranking::rank_bundles;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Default)]
struct StoreState {
    pending: Vec<Bundle>,
    history: Vec<BuildResult>,
    included_profit: f64,
}

/// Pending bundles plus the history of build cycles.
///
/// `submit` holds one exclusive lock for enqueue, rank, select and the history
/// append, so build cycles never interleave. The lock is released before the
/// result is published.
pub struct BundleStore {
    state: Mutex<StoreState>,
    assembler: BlockAssembler,
    publisher: Arc<dyn ResultPublisher>,
}

impl BundleStore {
    pub fn new(publisher: Arc<dyn ResultPublisher>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            assembler: BlockAssembler::new(),
            publisher,
        }
    }

    pub async fn submit(&self, bundle: Bundle) -> Result<BuildResult, StoreError> {
        bundle.validate()?;
        let received = Instant::now();

        let result = self.build_cycle(bundle, received)?;

        if let Err(e) = self.publisher.publish(&result).await {
            error!("Failed to publish build result for block {}: {}", result.block_hash, e);
        }

        Ok(result)
    }

    /// Latency runs from `received`, so time spent waiting for the lock counts.
    fn build_cycle(&self, bundle: Bundle, received: Instant) -> Result<BuildResult, StoreError> {
        let mut state = self.state.lock();

        info!(
            "Received bundle: {}, profit={:.6} ETH",
            bundle.id, bundle.declared_profit
        );
        state.pending.push(bundle);

        if state.pending.is_empty() {
            return Err(StoreError::EmptyQueue);
        }

        // unselected bundles are dropped with the rest of the queue
        let ranked = rank_bundles(std::mem::take(&mut state.pending));
        let selected = self.assembler.select_top(&ranked)?;
        info!(
            "Selected bundle {} for inclusion out of {} pending",
            selected.id,
            ranked.len()
        );

        let result = self.assembler.assemble(selected, received.elapsed());
        state.included_profit += result.profit_eth;
        state.history.push(result.clone());

        Ok(result)
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn history(&self) -> Vec<BuildResult> {
        self.state.lock().history.clone()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();

        StoreStats {
            pending: state.pending.len(),
            build_cycles: state.history.len(),
            last_block_hash: state.history.last().map(|r| r.block_hash.clone()),
            total_included_profit: state.included_profit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub pending: usize,
    pub build_cycles: usize,
    pub last_block_hash: Option<String>,
    pub total_included_profit: f64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Pending queue is empty")]
    EmptyQueue,
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("Invalid bundle: {0}")]
    InvalidBundle(#[from] BundleError),
}
