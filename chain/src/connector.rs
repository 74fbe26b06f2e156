use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A connector call failed to reach or be understood by the backing
/// daemon. The dispatcher recovers these into `{"error": ...}` reply
/// objects so the client quorum can still compare them.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connector transport error: {0}")]
    Transport(String),
    #[error("connector rpc error: {0}")]
    Rpc(Value),
}

/// Adapter over one blockchain's RPC surface.
///
/// Implementations are supplied by the host per enabled currency and
/// registered in the [`ConnectorRegistry`](crate::ConnectorRegistry).
/// Results are JSON-shaped so replies can travel verbatim.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Currency tag this connector serves, e.g. `"BTC"`.
    fn currency(&self) -> &str;

    async fn get_block_count(&self) -> Result<Value, ConnectorError>;

    async fn get_block_hash(&self, block_id: &str) -> Result<Value, ConnectorError>;

    async fn get_block(&self, block_hash: &str) -> Result<Value, ConnectorError>;

    async fn get_transaction(&self, tx_hash: &str) -> Result<Value, ConnectorError>;

    /// All blocks starting at height `from`.
    async fn get_all_blocks(&self, from: i64) -> Result<Value, ConnectorError>;

    /// All transactions touching `account` within the last `blocks` blocks.
    async fn get_all_transactions(
        &self,
        account: &str,
        blocks: i64,
    ) -> Result<Value, ConnectorError>;

    async fn get_balance(&self, account: &str) -> Result<Value, ConnectorError>;

    /// Balance delta for `account` over the last `blocks` blocks.
    async fn get_balance_update(
        &self,
        account: &str,
        blocks: i64,
    ) -> Result<Value, ConnectorError>;

    /// Transactions matching a serialized bloom filter, scanning the
    /// last `blocks` blocks.
    async fn get_transactions_bloom_filter(
        &self,
        blocks: i64,
        filter: &str,
    ) -> Result<Value, ConnectorError>;

    /// Broadcasts a raw transaction, returning the daemon's verdict.
    async fn send_transaction(&self, raw_tx: &str) -> Result<Value, ConnectorError>;
}
