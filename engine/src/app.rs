use std::path::PathBuf;
use std::sync::Arc;

use chain::{ChainBackend, Connector, ConnectorRegistry, StakeWallet};
use parking_lot::RwLock;
use serde_json::json;
use settings::NodeSettings;
use tracing::info;

use crate::error::{error_json_with_id, ERR_NO_REPLIES};
use crate::{EngineError, PeerDirectory, PendingQueries, PluginExecutor, Transport};

/// The overlay engine: one instance drives both the client and server
/// sides of the protocol for a node.
///
/// All collaborators are injected at construction and the handle is
/// cheap to clone; per-call state lives in the shared directories.
#[derive(Clone)]
pub struct XRouterApp {
    pub(crate) settings: Arc<RwLock<Arc<NodeSettings>>>,
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) connectors: Arc<ConnectorRegistry>,
    pub(crate) backend: Arc<dyn ChainBackend>,
    pub(crate) wallet: Arc<dyn StakeWallet>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) peers: Arc<PeerDirectory>,
    pub(crate) queries: Arc<PendingQueries>,
    pub(crate) executor: PluginExecutor,
}

impl XRouterApp {
    pub fn new(
        settings: NodeSettings,
        backend: Arc<dyn ChainBackend>,
        wallet: Arc<dyn StakeWallet>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            settings: Arc::new(RwLock::new(Arc::new(settings))),
            config_path: None,
            connectors: Arc::new(ConnectorRegistry::new()),
            backend,
            wallet,
            transport,
            peers: Arc::new(PeerDirectory::new()),
            queries: Arc::new(PendingQueries::new()),
            executor: PluginExecutor::new(),
        }
    }

    /// Like [`XRouterApp::new`], reading the config (and the plugin
    /// manifests it names) from disk so `reload_configs` can re-read it.
    pub fn from_config_file(
        path: impl Into<PathBuf>,
        backend: Arc<dyn ChainBackend>,
        wallet: Arc<dyn StakeWallet>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineError> {
        let path = path.into();
        let settings = NodeSettings::load(&path)?;
        let mut app = Self::new(settings, backend, wallet, transport);
        app.config_path = Some(path);
        Ok(app)
    }

    pub fn register_connector(&self, connector: Arc<dyn Connector>) {
        self.connectors.register(connector);
    }

    pub(crate) fn settings_snapshot(&self) -> Arc<NodeSettings> {
        self.settings.read().clone()
    }

    /// Re-reads the node's own config and plugin manifests from disk.
    /// A no-op for apps constructed from an in-memory config.
    pub fn reload_configs(&self) -> Result<(), EngineError> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        info!(path = %path.display(), "reloading config");
        let fresh = NodeSettings::load(path)?;
        *self.settings.write() = Arc::new(fresh);
        Ok(())
    }

    /// Transport callback: a peer connection came up.
    pub fn on_peer_connected(&self, addr: &str) {
        self.peers.connected(addr);
    }

    /// Transport callback: a peer went away. Its record, settings and
    /// rate stamps die with it.
    pub fn on_peer_disconnected(&self, addr: &str) {
        self.peers.disconnected(addr);
    }

    /// Scoring hook for a future peer-quality policy.
    pub fn adjust_peer_score(&self, addr: &str, delta: i64) {
        self.peers.adjust_score(addr, delta);
    }

    /// Replies gathered so far for a query id, numbered in arrival
    /// order.
    pub fn get_reply(&self, id: &str) -> String {
        let responses = self.queries.responses(id);
        if responses.is_empty() {
            return error_json_with_id(ERR_NO_REPLIES, id);
        }
        let mut out = serde_json::Map::new();
        for (index, reply) in responses.iter().enumerate() {
            out.insert(format!("reply{}", index + 1), json!(reply));
        }
        serde_json::Value::Object(out).to_string()
    }

    /// Engine status: own config and plugins, plus every peer whose
    /// advertised config is known.
    pub fn get_status(&self) -> String {
        let settings = self.settings_snapshot();
        let mut plugins = serde_json::Map::new();
        for name in settings.plugins() {
            if let Some(plugin) = settings.plugin_settings(name) {
                plugins.insert(name.to_string(), json!(plugin.raw_text()));
            }
        }

        let mut nodes = serde_json::Map::new();
        for (addr, remote) in self.peers.known_configs() {
            let mut remote_plugins = serde_json::Map::new();
            for name in remote.plugins() {
                if let Some(plugin) = remote.plugin_settings(name) {
                    remote_plugins.insert(name.to_string(), json!(plugin.raw_text()));
                }
            }
            nodes.insert(
                addr,
                json!({
                    "config": remote.raw_text(),
                    "plugins": remote_plugins,
                }),
            );
        }

        json!({
            "enabled": settings.xrouter_enabled(),
            "config": settings.raw_text(),
            "plugins": plugins,
            "nodes": nodes,
        })
        .to_string()
    }

    /// Every known peer config as a JSON array of `{node, config}`.
    pub fn print_configs(&self) -> String {
        let entries: Vec<_> = self
            .peers
            .known_configs()
            .into_iter()
            .map(|(addr, remote)| {
                json!({
                    "node": addr,
                    "config": remote.raw_text(),
                })
            })
            .collect();
        json!(entries).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chain::{Stake, TxOutInfo};
    use std::fs;

    struct NullChain;

    #[async_trait]
    impl ChainBackend for NullChain {
        async fn utxo_outputs(&self, _: &[u8; 32]) -> Option<Vec<TxOutInfo>> {
            None
        }

        async fn tx_outputs(&self, _: &[u8; 32]) -> Option<Vec<TxOutInfo>> {
            None
        }

        fn extract_key_id(&self, _: &[u8]) -> Option<[u8; 20]> {
            None
        }
    }

    struct NullWallet;

    #[async_trait]
    impl StakeWallet for NullWallet {
        async fn find_stake(&self, _: u64) -> Option<Stake> {
            None
        }
    }

    struct NullTransport;

    #[async_trait]
    impl crate::Transport for NullTransport {
        async fn send(&self, _: &str, _: Vec<u8>) -> Result<(), crate::TransportError> {
            Ok(())
        }

        fn penalize(&self, _: &str, _: u32) {}
    }

    fn app_from(dir: &std::path::Path) -> XRouterApp {
        XRouterApp::from_config_file(
            dir.join("xrouter.conf"),
            Arc::new(NullChain),
            Arc::new(NullWallet),
            Arc::new(NullTransport),
        )
        .expect("load config")
    }

    #[tokio::test]
    async fn reload_picks_up_edited_config_and_plugins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conf = dir.path().join("xrouter.conf");
        fs::write(&conf, "[Main]\nxrouter = 0\n").unwrap();

        let app = app_from(dir.path());
        assert!(!app.settings_snapshot().xrouter_enabled());

        fs::create_dir_all(dir.path().join("plugins")).unwrap();
        fs::write(
            dir.path().join("plugins/echo.conf"),
            "type = \"shell\"\ncmd = \"echo\"\nmaxParamCount = 1\n",
        )
        .unwrap();
        fs::write(&conf, "[Main]\nxrouter = 1\nplugins = \"echo\"\n").unwrap();
        app.reload_configs().expect("reload");

        let fresh = app.settings_snapshot();
        assert!(fresh.xrouter_enabled());
        assert!(fresh.has_plugin("echo"));
    }

    #[tokio::test]
    async fn status_reports_own_config_and_plugins() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("plugins")).unwrap();
        fs::write(
            dir.path().join("xrouter.conf"),
            "[Main]\nxrouter = 1\nplugins = \"echo\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("plugins/echo.conf"),
            "type = \"shell\"\ncmd = \"echo\"\nmaxParamCount = 1\n",
        )
        .unwrap();

        let app = app_from(dir.path());
        let status: serde_json::Value = serde_json::from_str(&app.get_status()).unwrap();
        assert_eq!(status["enabled"], true);
        assert!(status["plugins"]["echo"].is_string());
        assert!(status["nodes"].as_object().unwrap().is_empty());

        // No replies gathered for an unknown id.
        let miss: serde_json::Value = serde_json::from_str(&app.get_reply("q")).unwrap();
        assert_eq!(miss["error"], "No replies found");
    }
}
