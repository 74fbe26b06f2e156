use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::Connector;

/// Thread-safe mapping from currency tag to its connector.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connector` under its own currency tag, replacing any
    /// previous connector for that currency.
    pub fn register(&self, connector: Arc<dyn Connector>) {
        self.connectors
            .write()
            .insert(connector.currency().to_string(), connector);
    }

    pub fn lookup(&self, currency: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.read().get(currency).cloned()
    }

    pub fn currencies(&self) -> Vec<String> {
        self.connectors.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectorError;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FixedCount(&'static str, i64);

    #[async_trait]
    impl Connector for FixedCount {
        fn currency(&self) -> &str {
            self.0
        }

        async fn get_block_count(&self) -> Result<Value, ConnectorError> {
            Ok(json!(self.1))
        }

        async fn get_block_hash(&self, _: &str) -> Result<Value, ConnectorError> {
            unimplemented!()
        }

        async fn get_block(&self, _: &str) -> Result<Value, ConnectorError> {
            unimplemented!()
        }

        async fn get_transaction(&self, _: &str) -> Result<Value, ConnectorError> {
            unimplemented!()
        }

        async fn get_all_blocks(&self, _: i64) -> Result<Value, ConnectorError> {
            unimplemented!()
        }

        async fn get_all_transactions(&self, _: &str, _: i64) -> Result<Value, ConnectorError> {
            unimplemented!()
        }

        async fn get_balance(&self, _: &str) -> Result<Value, ConnectorError> {
            unimplemented!()
        }

        async fn get_balance_update(&self, _: &str, _: i64) -> Result<Value, ConnectorError> {
            unimplemented!()
        }

        async fn get_transactions_bloom_filter(
            &self,
            _: i64,
            _: &str,
        ) -> Result<Value, ConnectorError> {
            unimplemented!()
        }

        async fn send_transaction(&self, _: &str) -> Result<Value, ConnectorError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn register_and_lookup_by_currency() {
        let registry = ConnectorRegistry::new();
        registry.register(Arc::new(FixedCount("BTC", 100)));
        registry.register(Arc::new(FixedCount("ETH", 200)));

        let btc = registry.lookup("BTC").expect("registered");
        assert_eq!(btc.get_block_count().await.unwrap(), json!(100));
        assert!(registry.lookup("LTC").is_none());

        // Re-registering a currency replaces the connector.
        registry.register(Arc::new(FixedCount("BTC", 101)));
        let btc = registry.lookup("BTC").expect("still registered");
        assert_eq!(btc.get_block_count().await.unwrap(), json!(101));
    }
}
