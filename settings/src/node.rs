use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use protocol::Command;

use crate::{PluginSettings, SettingsError};

/// Default client-side per-call wait in milliseconds (`Main.wait`).
pub const DEFAULT_WAIT_MS: u64 = 20_000;

/// Immutable snapshot of one node's configuration: the raw TOML text,
/// its parsed tree, and the plugin manifests attached to it.
///
/// Both the local node's own config and each peer's advertised config
/// are represented this way; the raw text is what travels over the
/// config-exchange wire.
#[derive(Clone, Debug)]
pub struct NodeSettings {
    raw: String,
    tree: toml::Value,
    plugins: BTreeMap<String, PluginSettings>,
}

impl NodeSettings {
    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let tree: toml::Value = raw.parse()?;
        Ok(Self {
            raw: raw.to_string(),
            tree,
            plugins: BTreeMap::new(),
        })
    }

    /// Reads a config file plus the plugin manifests it names in
    /// `Main.plugins`, each expected at `<dir>/plugins/<name>.conf`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut settings = Self::parse(&raw)?;

        let names = settings.get("Main.plugins", String::new());
        let plugin_dir = path.parent().unwrap_or_else(|| Path::new(".")).join("plugins");
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let blob = fs::read_to_string(plugin_dir.join(format!("{name}.conf")))?;
            let plugin = PluginSettings::parse(name, &blob)?;
            settings.plugins.insert(name.to_string(), plugin);
        }
        Ok(settings)
    }

    /// The raw config text as read or received, used verbatim on the wire.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    /// Typed lookup along a dotted path, falling back to `default` when
    /// the key is absent or of the wrong shape.
    pub fn get<T: serde::de::DeserializeOwned>(&self, path: &str, default: T) -> T {
        self.lookup(path)
            .and_then(|value| value.clone().try_into().ok())
            .unwrap_or(default)
    }

    fn lookup(&self, path: &str) -> Option<&toml::Value> {
        let mut node = &self.tree;
        for part in path.split('.') {
            node = node.as_table()?.get(part)?;
        }
        Some(node)
    }

    /// `Main.xrouter` gates the whole engine; zero means off.
    pub fn xrouter_enabled(&self) -> bool {
        self.get("Main.xrouter", 0i64) != 0
    }

    /// Client-side wall-clock budget per query wait slice, milliseconds.
    pub fn wait_ms(&self) -> u64 {
        self.get("Main.wait", DEFAULT_WAIT_MS as i64).max(0) as u64
    }

    /// True when `currency` appears in the `Main.wallets` list.
    pub fn wallet_enabled(&self, currency: &str) -> bool {
        self.get("Main.wallets", String::new())
            .split(',')
            .map(str::trim)
            .any(|w| w == currency)
    }

    /// Whether this node serves `command` for `currency`. Config and
    /// reply kinds are always available; authenticated kinds require the
    /// wallet to be enabled and the command not to be disabled for it.
    pub fn is_available_command(&self, command: Command, currency: &str) -> bool {
        if !command.requires_auth() {
            return true;
        }
        if command == Command::CustomCall {
            return self.has_plugin(currency);
        }
        if !self.wallet_enabled(currency) {
            return false;
        }
        !self.get(&format!("{currency}.{command}.disabled"), false)
    }

    /// Rate-limit window for `command` on `currency`, in (possibly
    /// fractional) seconds. Falls back to `Main.timeout`, then to 0.0,
    /// meaning no throttle.
    pub fn command_timeout(&self, command: Command, currency: &str) -> f64 {
        let fallback = self.get("Main.timeout", 0.0f64);
        self.get(&format!("{currency}.{command}.timeout"), fallback)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn plugin_settings(&self, name: &str) -> Option<&PluginSettings> {
        self.plugins.get(name)
    }

    /// Attaches a plugin manifest, as done when ingesting a peer's
    /// advertised config envelope.
    pub fn add_plugin(&mut self, plugin: PluginSettings) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[Main]
xrouter = 1
wait = 5000
wallets = "BTC, ETH"
timeout = 2.0

[BTC.GetBlockCount]
timeout = 0.5

[BTC.SendTransaction]
disabled = true
"#;

    #[test]
    fn typed_path_lookup_with_defaults() {
        let settings = NodeSettings::parse(CONFIG).unwrap();
        assert!(settings.xrouter_enabled());
        assert_eq!(settings.wait_ms(), 5000);
        assert_eq!(settings.get("Main.missing", 42i64), 42);
        assert_eq!(settings.get("BTC.GetBlockCount.timeout", 0.0f64), 0.5);
    }

    #[test]
    fn wallet_list_is_comma_separated_and_trimmed() {
        let settings = NodeSettings::parse(CONFIG).unwrap();
        assert!(settings.wallet_enabled("BTC"));
        assert!(settings.wallet_enabled("ETH"));
        assert!(!settings.wallet_enabled("LTC"));
    }

    #[test]
    fn command_availability_honors_disabled_and_wallets() {
        let settings = NodeSettings::parse(CONFIG).unwrap();
        assert!(settings.is_available_command(Command::GetBlockCount, "BTC"));
        assert!(!settings.is_available_command(Command::SendTransaction, "BTC"));
        assert!(!settings.is_available_command(Command::GetBlockCount, "LTC"));
        // Config and reply kinds bypass the filter entirely.
        assert!(settings.is_available_command(Command::GetConfig, "LTC"));
        assert!(settings.is_available_command(Command::Reply, ""));
    }

    #[test]
    fn command_timeout_falls_back_to_main_then_zero() {
        let settings = NodeSettings::parse(CONFIG).unwrap();
        assert_eq!(settings.command_timeout(Command::GetBlockCount, "BTC"), 0.5);
        assert_eq!(settings.command_timeout(Command::GetBlock, "BTC"), 2.0);

        let bare = NodeSettings::parse("[Main]\nxrouter = 1\n").unwrap();
        assert_eq!(bare.command_timeout(Command::GetBlock, "BTC"), 0.0);
    }

    #[test]
    fn custom_call_availability_tracks_plugins() {
        let mut settings = NodeSettings::parse(CONFIG).unwrap();
        assert!(!settings.is_available_command(Command::CustomCall, "psbt"));
        let plugin = PluginSettings::parse(
            "psbt",
            "type = \"shell\"\ncmd = \"/usr/local/bin/psbt-tool\"\nmaxParamCount = 1\n",
        )
        .unwrap();
        settings.add_plugin(plugin);
        assert!(settings.is_available_command(Command::CustomCall, "psbt"));
    }
}
