use std::sync::Arc;

use protocol::{Command, Packet};
use serde_json::{json, Value};
use settings::{NodeSettings, PluginSettings};
use tracing::{debug, info, warn};

use crate::{EngineError, XRouterApp, CONFIG_REFRESH};

/// Builds the JSON envelope a node advertises:
/// `{"config": raw-text, "plugins": {name: raw-text, ...}}`.
pub(crate) fn config_envelope(cfg: &NodeSettings) -> String {
    let mut plugins = serde_json::Map::new();
    for name in cfg.plugins() {
        if let Some(plugin) = cfg.plugin_settings(name) {
            plugins.insert(name.to_string(), json!(plugin.raw_text()));
        }
    }
    json!({
        "config": cfg.raw_text(),
        "plugins": plugins,
    })
    .to_string()
}

impl XRouterApp {
    /// Asks every connected peer whose advertised config is missing or
    /// stale for its configuration. Each peer is asked at most once per
    /// refresh window, whether or not it answers.
    pub async fn update_configs(&self) {
        if !self.settings_snapshot().xrouter_enabled() {
            return;
        }
        for addr in self.peers.peers_needing_config(CONFIG_REFRESH) {
            let id = protocol::new_query_id();
            let mut packet = Packet::new(Command::GetConfig);
            packet.append_str(&id);
            packet.append_str("self");
            debug!(peer = %addr, query = %id, "requesting peer config");
            if let Err(err) = self.transport.send(&addr, packet.into_wire()).await {
                warn!(peer = %addr, error = %err, "config request failed");
                continue;
            }
            self.peers.mark_config_requested(&addr);
        }
    }

    /// Parses a peer's advertised config envelope and stores it as that
    /// peer's settings. Unparseable plugin manifests are skipped rather
    /// than poisoning the whole config.
    pub(crate) fn ingest_config_reply(
        &self,
        peer: &str,
        payload: &str,
    ) -> Result<(), EngineError> {
        let envelope: Value = serde_json::from_str(payload)?;
        let raw = envelope
            .get("config")
            .and_then(Value::as_str)
            .ok_or(EngineError::ConfigEnvelope("missing config field"))?;
        let mut remote = NodeSettings::parse(raw)?;

        if let Some(plugins) = envelope.get("plugins").and_then(Value::as_object) {
            for (name, blob) in plugins {
                let Some(blob) = blob.as_str() else {
                    continue;
                };
                match PluginSettings::parse(name, blob) {
                    Ok(plugin) => remote.add_plugin(plugin),
                    Err(err) => {
                        warn!(peer, plugin = %name, error = %err, "skipping bad plugin manifest")
                    }
                }
            }
        }

        info!(peer, "stored advertised peer config");
        self.peers.store_settings(peer, Arc::new(remote));
        Ok(())
    }
}
