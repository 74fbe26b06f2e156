use crate::SettingsError;

/// How a plugin executes on the serving node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginType {
    /// Parameterised JSON-RPC call against a local daemon.
    Rpc,
    /// Parameterised shell command, stdout captured.
    Shell,
}

/// Declared type of one positional plugin parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    String,
    Int,
    Bool,
}

/// An operator-declared plugin manifest.
///
/// The raw text is kept verbatim so it can be forwarded in the
/// config-exchange envelope exactly as the operator wrote it.
#[derive(Clone, Debug)]
pub struct PluginSettings {
    name: String,
    raw: String,
    tree: toml::Value,
    plugin_type: PluginType,
    params_type: Vec<ParamType>,
    min_param_count: usize,
    max_param_count: usize,
}

impl PluginSettings {
    pub fn parse(name: &str, raw: &str) -> Result<Self, SettingsError> {
        let tree: toml::Value = raw.parse()?;
        let get_str = |key: &str| {
            tree.get(key)
                .and_then(toml::Value::as_str)
                .map(str::to_string)
        };

        let type_str = get_str("type")
            .ok_or_else(|| SettingsError::MissingPluginField(name.to_string(), "type"))?;
        let plugin_type = match type_str.as_str() {
            "rpc" => PluginType::Rpc,
            "shell" => PluginType::Shell,
            other => {
                return Err(SettingsError::UnknownPluginType(
                    name.to_string(),
                    other.to_string(),
                ))
            }
        };

        let mut params_type = Vec::new();
        if let Some(spec) = get_str("paramsType") {
            for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                params_type.push(match part {
                    "string" => ParamType::String,
                    "int" => ParamType::Int,
                    "bool" => ParamType::Bool,
                    other => {
                        return Err(SettingsError::UnknownParamType(
                            name.to_string(),
                            other.to_string(),
                        ))
                    }
                });
            }
        }

        let as_count = |key: &str| {
            tree.get(key)
                .and_then(toml::Value::as_integer)
                .map(|n| n.max(0) as usize)
        };
        let max_param_count = as_count("maxParamCount").unwrap_or(params_type.len());
        let min_param_count = as_count("minParamCount").unwrap_or(max_param_count);

        Ok(Self {
            name: name.to_string(),
            raw: raw.to_string(),
            tree,
            plugin_type,
            params_type,
            min_param_count,
            max_param_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    pub fn params_type(&self) -> &[ParamType] {
        &self.params_type
    }

    pub fn min_param_count(&self) -> usize {
        self.min_param_count
    }

    pub fn max_param_count(&self) -> usize {
        self.max_param_count
    }

    /// Per-plugin rate-limit window in seconds; negative means unmetered.
    pub fn timeout(&self) -> f64 {
        match self.tree.get("timeout") {
            Some(toml::Value::Float(f)) => *f,
            Some(toml::Value::Integer(i)) => *i as f64,
            _ => -1.0,
        }
    }

    fn param(&self, key: &str) -> String {
        self.tree
            .get(key)
            .and_then(toml::Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn rpc_user(&self) -> String {
        self.param("rpcUser")
    }

    pub fn rpc_password(&self) -> String {
        self.param("rpcPassword")
    }

    pub fn rpc_ip(&self) -> String {
        let ip = self.param("rpcIp");
        if ip.is_empty() {
            "127.0.0.1".to_string()
        } else {
            ip
        }
    }

    pub fn rpc_port(&self) -> String {
        self.param("rpcPort")
    }

    pub fn rpc_command(&self) -> String {
        self.param("rpcCommand")
    }

    pub fn shell_cmd(&self) -> String {
        self.param("cmd")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rpc_manifest() {
        let plugin = PluginSettings::parse(
            "getblockstats",
            r#"
type = "rpc"
paramsType = "int, string, bool"
minParamCount = 1
maxParamCount = 3
timeout = 1.5
rpcUser = "user"
rpcPassword = "pass"
rpcPort = "8332"
rpcCommand = "getblockstats"
"#,
        )
        .unwrap();

        assert_eq!(plugin.plugin_type(), PluginType::Rpc);
        assert_eq!(
            plugin.params_type(),
            &[ParamType::Int, ParamType::String, ParamType::Bool]
        );
        assert_eq!(plugin.min_param_count(), 1);
        assert_eq!(plugin.max_param_count(), 3);
        assert_eq!(plugin.timeout(), 1.5);
        assert_eq!(plugin.rpc_ip(), "127.0.0.1");
        assert_eq!(plugin.rpc_port(), "8332");
    }

    #[test]
    fn arity_defaults_follow_params_type() {
        let plugin = PluginSettings::parse(
            "echo",
            "type = \"shell\"\ncmd = \"echo\"\nparamsType = \"string, string\"\n",
        )
        .unwrap();
        assert_eq!(plugin.max_param_count(), 2);
        assert_eq!(plugin.min_param_count(), 2);
        assert!(plugin.timeout() < 0.0);
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(matches!(
            PluginSettings::parse("x", "type = \"wasm\"\n"),
            Err(SettingsError::UnknownPluginType(_, _))
        ));
        assert!(matches!(
            PluginSettings::parse("x", "type = \"rpc\"\nparamsType = \"float\"\n"),
            Err(SettingsError::UnknownParamType(_, _))
        ));
        assert!(matches!(
            PluginSettings::parse("x", "cmd = \"ls\"\n"),
            Err(SettingsError::MissingPluginField(_, "type"))
        ));
    }
}
