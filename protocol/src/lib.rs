//! Wire protocol for the XRouter overlay: the command enumeration, the
//! framed packet body, and the secp256k1 signature discipline.
//!
//! Packets travel opaquely inside the host P2P transport under the
//! `"xrouter"` channel tag. Authenticated request kinds carry a UTXO
//! preamble and are signed from the command word through the last
//! argument; reply and config kinds carry neither preamble nor
//! signature.

use thiserror::Error;

mod command;
mod packet;

pub use command::Command;
pub use packet::{AuthPreamble, Packet, PUBKEY_SIZE, SIGNATURE_SIZE};

pub use secp256k1::{PublicKey, SecretKey};

/// Channel tag the host transport routes our packets under.
pub const CHANNEL: &str = "xrouter";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
    #[error("unknown command {0}")]
    UnknownCommand(u16),
    #[error("packet is not an authenticated kind")]
    NotAuthenticated,
    #[error("crypto error: {0}")]
    Crypto(#[from] secp256k1::Error),
}

/// Generates a fresh process-unique query id (36-char UUID text).
pub fn new_query_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Compressed public key for `secret`, as embedded in packet trailers.
pub fn public_key_for(secret: &SecretKey) -> PublicKey {
    let secp = secp256k1::Secp256k1::signing_only();
    PublicKey::from_secret_key(&secp, secret)
}
