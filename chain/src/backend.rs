use async_trait::async_trait;
use protocol::SecretKey;

/// One transaction output as seen by the verifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutInfo {
    /// Output value in base units.
    pub value: u64,
    /// Raw output script.
    pub script_pubkey: Vec<u8>,
}

/// A wallet output able to satisfy the stake requirement, together with
/// the private key that signs the packet.
pub struct Stake {
    pub tx_hash: [u8; 32],
    pub vout: u32,
    pub key: SecretKey,
}

/// Read-only view of the host blockchain node, as needed by the
/// block-requirement verifier.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Outputs of `tx_hash` according to the UTXO set, or `None` when
    /// the transaction is absent from it.
    async fn utxo_outputs(&self, tx_hash: &[u8; 32]) -> Option<Vec<TxOutInfo>>;

    /// Outputs of `tx_hash` from a full transaction fetch; the fallback
    /// when the UTXO set has no entry.
    async fn tx_outputs(&self, tx_hash: &[u8; 32]) -> Option<Vec<TxOutInfo>>;

    /// Extracts the single-address destination of an output script, if
    /// it has one. Multisig and nonstandard forms yield `None`.
    fn extract_key_id(&self, script_pubkey: &[u8]) -> Option<[u8; 20]>;
}

/// The local wallet's side of the stake requirement: find an output
/// worth at least `min_value` whose private key we hold.
#[async_trait]
pub trait StakeWallet: Send + Sync {
    async fn find_stake(&self, min_value: u64) -> Option<Stake>;
}
