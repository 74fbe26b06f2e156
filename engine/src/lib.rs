//! The distributed query fabric of the XRouter overlay.
//!
//! One [`XRouterApp`] drives both sides of the protocol: as a client it
//! fans signed queries out to staked service nodes and returns a quorum
//! answer; as a server it admits, rate-limits, and dispatches inbound
//! queries to blockchain connectors and operator plugins. The host
//! supplies the P2P transport, the chain view, and the wallet through
//! the seams in [`Transport`], [`chain::ChainBackend`], and
//! [`chain::StakeWallet`].

use std::time::Duration;

mod app;
mod client;
mod config_exchange;
mod error;
mod peers;
mod plugins;
mod queries;
mod server;
mod transport;

pub use app::XRouterApp;
pub use error::EngineError;
pub use peers::PeerDirectory;
pub use plugins::PluginExecutor;
pub use queries::PendingQueries;
pub use transport::{Transport, TransportError};

/// How long a peer's advertised config stays fresh before a new
/// `GetConfig` is issued.
pub const CONFIG_REFRESH: Duration = Duration::from_secs(300);

/// Server-side per-peer throttle on `GetConfig` requests.
pub const CONFIG_RATE_LIMIT: Duration = Duration::from_secs(10);

/// Per-peer wait used by the `send_transaction` retry loop.
pub const SEND_RETRY_WAIT: Duration = Duration::from_millis(3000);
