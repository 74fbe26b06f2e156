//! Blockchain-facing seams for the overlay engine: the per-currency
//! [`Connector`] adapters and their registry, the [`ChainBackend`] and
//! [`StakeWallet`] traits the host node implements, and the
//! block-requirement verifier that gates every authenticated packet.

mod backend;
mod connector;
mod registry;
mod verifier;

pub use backend::{ChainBackend, Stake, StakeWallet, TxOutInfo};
pub use connector::{Connector, ConnectorError};
pub use registry::ConnectorRegistry;
pub use verifier::{hash160, verify_block_requirement, AdmissionError, MIN_STAKE};
