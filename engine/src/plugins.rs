use serde_json::{json, Value};
use settings::{ParamType, PluginSettings, PluginType};
use tracing::debug;

use crate::error::{error_json, ERR_TOO_FEW_PARAMS, ERR_TOO_MANY_PARAMS};

/// Executes operator-declared plugins: a parameterised JSON-RPC call
/// against a local daemon, or a parameterised shell command.
///
/// Every outcome, including coercion and arity failures, is a JSON
/// string so the reply can travel back through the quorum engine.
#[derive(Clone, Default)]
pub struct PluginExecutor {
    http: reqwest::Client,
}

impl PluginExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arity gate, applied on the client before send and on the server
    /// before execution.
    pub fn check_arity(plugin: &PluginSettings, count: usize) -> Result<(), String> {
        if count < plugin.min_param_count() {
            return Err(error_json(ERR_TOO_FEW_PARAMS));
        }
        if count > plugin.max_param_count() {
            return Err(error_json(ERR_TOO_MANY_PARAMS));
        }
        Ok(())
    }

    pub async fn run(&self, plugin: &PluginSettings, params: &[String]) -> String {
        if let Err(reply) = Self::check_arity(plugin, params.len()) {
            return reply;
        }
        debug!(plugin = plugin.name(), kind = ?plugin.plugin_type(), "plugin call");
        match plugin.plugin_type() {
            PluginType::Rpc => self.run_rpc(plugin, params).await,
            PluginType::Shell => run_shell(plugin, params).await,
        }
    }

    async fn run_rpc(&self, plugin: &PluginSettings, params: &[String]) -> String {
        let rpc_params = match coerce_params(plugin, params) {
            Ok(values) => values,
            Err(reply) => return reply,
        };

        let url = format!("http://{}:{}", plugin.rpc_ip(), plugin.rpc_port());
        let body = json!({
            "jsonrpc": "2.0",
            "method": plugin.rpc_command(),
            "params": rpc_params,
            "id": 1,
        });

        let response = self
            .http
            .post(&url)
            .basic_auth(plugin.rpc_user(), Some(plugin.rpc_password()))
            .json(&body)
            .send()
            .await;

        let value: Value = match response {
            Ok(response) => match response.json().await {
                Ok(value) => value,
                Err(err) => return error_json(&err.to_string()),
            },
            Err(err) => return error_json(&err.to_string()),
        };

        match value.get("error") {
            Some(err) if !err.is_null() => json!({ "error": err }).to_string(),
            _ => json!({ "result": value.get("result").cloned().unwrap_or(Value::Null) })
                .to_string(),
        }
    }
}

/// Casts each positional argument per the manifest's declared types.
/// Empty arguments are skipped, letting trailing optionals be omitted.
fn coerce_params(plugin: &PluginSettings, params: &[String]) -> Result<Vec<Value>, String> {
    let types = plugin.params_type();
    let mut out = Vec::with_capacity(params.len());
    for (index, param) in params.iter().enumerate() {
        if param.is_empty() {
            continue;
        }
        let ty = types.get(index).copied().unwrap_or(ParamType::String);
        let value = match ty {
            ParamType::String => Value::String(param.clone()),
            ParamType::Int => match param.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => {
                    return Err(error_json(&format!(
                        "Parameter #{} can not be converted to integer",
                        index + 1
                    )))
                }
            },
            ParamType::Bool => match param.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => {
                    return Err(error_json(&format!(
                        "Parameter #{} can not be converted to bool",
                        index + 1
                    )))
                }
            },
        };
        out.push(value);
    }
    Ok(out)
}

async fn run_shell(plugin: &PluginSettings, params: &[String]) -> String {
    let mut cmdline = plugin.shell_cmd();
    for param in params {
        cmdline.push(' ');
        cmdline.push_str(param);
    }
    debug!(%cmdline, "executing shell plugin");

    match tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&cmdline)
        .output()
        .await
    {
        Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
        Err(err) => error_json(&err.to_string()),
    }
}
