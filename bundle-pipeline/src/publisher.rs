use crate::block_assembler::BuildResult;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

const SEQUENCE_KEY: &str = "block_builds:seq";
const INDEX_KEY: &str = "block_builds";

// KEYS[1] = sequence counter, KEYS[2] = index list; ARGV = field/value pairs.
// Runs as one script so a failure never leaves a gap in the sequence.
const STORE_RECORD: &str = r"
local seq = redis.call('INCR', KEYS[1])
redis.call('HSET', KEYS[2] .. ':' .. seq, unpack(ARGV))
redis.call('RPUSH', KEYS[2], seq)
return seq
";

/// Sink for completed build results.
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(&self, result: &BuildResult) -> Result<(), PublishError>;
}

/// Writes every build result to the structured log.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl ResultPublisher for LogPublisher {
    async fn publish(&self, result: &BuildResult) -> Result<(), PublishError> {
        let payload = serde_json::to_string(result)?;
        info!(
            target: "build_result",
            block_hash = %result.block_hash,
            included = result.included,
            inclusion_latency_ms = result.inclusion_latency_ms,
            "📦 Build result: {}",
            payload
        );
        Ok(())
    }
}

/// Durable sink backed by redis.
///
/// Each result becomes a hash `block_builds:<seq>` with the fields
/// `block_hash, included, inclusion_reason, inclusion_latency_ms, timestamp`,
/// and `<seq>` is appended to the `block_builds` list so records keep their
/// insertion order. The connection manager is shared by all concurrent
/// publishes and reconnects on its own.
pub struct RedisPublisher {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    script: redis::Script,
    timeout: Duration,
}

impl RedisPublisher {
    /// Parses the url without connecting; the first publish (or `ping`) connects.
    pub fn open(url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            script: redis::Script::new(STORE_RECORD),
            timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, PublishError> {
        let manager = self
            .connection
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }

    pub async fn ping(&self) -> Result<(), PublishError> {
        tokio::time::timeout(self.timeout, async {
            let mut con = self.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut con).await?;
            Ok::<_, PublishError>(())
        })
        .await
        .map_err(|_| PublishError::Timeout(self.timeout))?
    }

    async fn store(&self, result: &BuildResult) -> Result<u64, PublishError> {
        let mut con = self.connection().await?;

        let mut invocation = self.script.key(SEQUENCE_KEY);
        invocation.key(INDEX_KEY);
        for (field, value) in record_fields(result) {
            invocation.arg(field).arg(value);
        }

        let seq: u64 = invocation.invoke_async(&mut con).await?;
        Ok(seq)
    }
}

#[async_trait]
impl ResultPublisher for RedisPublisher {
    async fn publish(&self, result: &BuildResult) -> Result<(), PublishError> {
        let seq = tokio::time::timeout(self.timeout, self.store(result))
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))??;

        debug!("Stored block {} as build record {}", result.block_hash, seq);
        Ok(())
    }
}

/// Columns of a stored build record, in order.
fn record_fields(result: &BuildResult) -> [(&'static str, String); 5] {
    [
        ("block_hash", result.block_hash.clone()),
        ("included", result.included.to_string()),
        ("inclusion_reason", result.inclusion_reason.clone()),
        ("inclusion_latency_ms", result.inclusion_latency_ms.to_string()),
        ("timestamp", result.produced_at.to_rfc3339()),
    ]
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize build result: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Durable store error: {0}")]
    Storage(#[from] redis::RedisError),
    #[error("Durable store did not answer within {0:?}")]
    Timeout(Duration),
}
