//! Configuration snapshots for the overlay engine.
//!
//! A node's own configuration and every peer's advertised configuration
//! are immutable [`NodeSettings`] snapshots over a TOML tree. Plugin
//! manifests travel as separate raw blobs (the config-exchange envelope
//! ships them per name) and are parsed into [`PluginSettings`].

use thiserror::Error;

mod node;
mod plugin;

pub use node::{NodeSettings, DEFAULT_WAIT_MS};
pub use plugin::{ParamType, PluginSettings, PluginType};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("plugin {0}: unknown type {1:?}")]
    UnknownPluginType(String, String),
    #[error("plugin {0}: unknown parameter type {1:?}")]
    UnknownParamType(String, String),
    #[error("plugin {0}: missing {1}")]
    MissingPluginField(String, &'static str),
}
