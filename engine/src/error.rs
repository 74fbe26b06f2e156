use serde_json::json;
use thiserror::Error;

use crate::TransportError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),
    #[error("settings error: {0}")]
    Settings(#[from] settings::SettingsError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed config envelope: {0}")]
    ConfigEnvelope(&'static str),
}

/// `{"error": msg}`, the shape every client-local failure takes on the
/// public API.
pub(crate) fn error_json(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// `{"error": msg, "uuid": id}` for failures tied to a specific query.
pub(crate) fn error_json_with_id(message: &str, id: &str) -> String {
    json!({ "error": message, "uuid": id }).to_string()
}

pub(crate) const ERR_DISABLED: &str =
    "XRouter is turned off. Please check that xrouter.conf is set up correctly.";
pub(crate) const ERR_NO_STAKE: &str =
    "Minimum block requirement not satisfied. Make sure that your wallet is unlocked.";
pub(crate) const ERR_NO_NODES: &str = "Could not find available nodes for your request";
pub(crate) const ERR_NO_RESPONSE: &str = "Failed to get response";
pub(crate) const ERR_NO_CONSENSUS: &str = "No consensus between responses";
pub(crate) const ERR_NO_REPLIES: &str = "No replies found";
pub(crate) const ERR_NO_PLUGIN: &str = "Custom call not found";
pub(crate) const ERR_TOO_FEW_PARAMS: &str = "Not enough plugin parameters";
pub(crate) const ERR_TOO_MANY_PARAMS: &str = "Too many plugin parameters";
