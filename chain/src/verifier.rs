use protocol::{Packet, ProtocolError};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::ChainBackend;

/// Minimum stake value, in base units, a request's backing UTXO must hold.
pub const MIN_STAKE: u64 = 200;

/// Why an authenticated packet was refused admission. Rejections are
/// never answered; the sender simply never hears back.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("packet error: {0}")]
    Packet(#[from] ProtocolError),
    #[error("staking utxo {0} not found")]
    UnknownUtxo(String),
    #[error("vout {vout} out of range ({outputs} outputs)")]
    InvalidVout { vout: u32, outputs: usize },
    #[error("stake value {value} below minimum {MIN_STAKE}")]
    InsufficientStake { value: u64 },
    #[error("stake output is not a single-address script")]
    UnsupportedScript,
    #[error("packet pubkey does not match the stake destination")]
    KeyMismatch,
}

/// HASH160: RIPEMD-160 over SHA-256, the key-id form single-address
/// output scripts pay to.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(sha));
    out
}

/// The sole admission gate for authenticated packets: the referenced
/// UTXO must exist, hold at least [`MIN_STAKE`], and pay to the key
/// that signed the packet.
pub async fn verify_block_requirement(
    packet: &Packet,
    backend: &dyn ChainBackend,
) -> Result<(), AdmissionError> {
    let preamble = packet.auth_preamble()?;
    let tx_hash = preamble.utxo_tx_hash;
    let vout = preamble.utxo_vout;

    let outputs = match backend.utxo_outputs(&tx_hash).await {
        Some(outputs) => outputs,
        None => backend
            .tx_outputs(&tx_hash)
            .await
            .ok_or_else(|| AdmissionError::UnknownUtxo(hex::encode(tx_hash)))?,
    };

    let output = outputs
        .get(vout as usize)
        .ok_or(AdmissionError::InvalidVout {
            vout,
            outputs: outputs.len(),
        })?;

    if output.value < MIN_STAKE {
        return Err(AdmissionError::InsufficientStake {
            value: output.value,
        });
    }

    let key_id = backend
        .extract_key_id(&output.script_pubkey)
        .ok_or(AdmissionError::UnsupportedScript)?;

    if hash160(&packet.pubkey_bytes()?) != key_id {
        return Err(AdmissionError::KeyMismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TxOutInfo;
    use async_trait::async_trait;
    use protocol::{AuthPreamble, Command, SecretKey};
    use std::collections::HashMap;

    struct MockBackend {
        utxos: HashMap<[u8; 32], Vec<TxOutInfo>>,
        transactions: HashMap<[u8; 32], Vec<TxOutInfo>>,
    }

    #[async_trait]
    impl ChainBackend for MockBackend {
        async fn utxo_outputs(&self, tx_hash: &[u8; 32]) -> Option<Vec<TxOutInfo>> {
            self.utxos.get(tx_hash).cloned()
        }

        async fn tx_outputs(&self, tx_hash: &[u8; 32]) -> Option<Vec<TxOutInfo>> {
            self.transactions.get(tx_hash).cloned()
        }

        fn extract_key_id(&self, script_pubkey: &[u8]) -> Option<[u8; 20]> {
            // Test scripts are `0x01 || key_id`; anything else is
            // treated as a nonstandard form.
            if script_pubkey.len() == 21 && script_pubkey[0] == 0x01 {
                let mut id = [0u8; 20];
                id.copy_from_slice(&script_pubkey[1..]);
                Some(id)
            } else {
                None
            }
        }
    }

    fn signed_packet(tx_hash: [u8; 32], vout: u32) -> Packet {
        let mut packet = Packet::new(Command::GetBlockCount);
        packet.append_preamble(&AuthPreamble {
            utxo_tx_hash: tx_hash,
            utxo_vout: vout,
        });
        packet.append_str("11111111-2222-3333-4444-555555555555");
        packet.append_str("BTC");
        packet
            .sign(&SecretKey::from_slice(&[9u8; 32]).unwrap())
            .unwrap();
        packet
    }

    fn script_paying_to(packet: &Packet) -> Vec<u8> {
        let mut script = vec![0x01];
        script.extend_from_slice(&hash160(&packet.pubkey_bytes().unwrap()));
        script
    }

    fn backend_with(tx_hash: [u8; 32], outputs: Vec<TxOutInfo>) -> MockBackend {
        MockBackend {
            utxos: HashMap::from([(tx_hash, outputs)]),
            transactions: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn accepts_a_well_staked_packet() {
        let tx_hash = [3u8; 32];
        let packet = signed_packet(tx_hash, 0);
        let backend = backend_with(
            tx_hash,
            vec![TxOutInfo {
                value: MIN_STAKE,
                script_pubkey: script_paying_to(&packet),
            }],
        );
        assert!(verify_block_requirement(&packet, &backend).await.is_ok());
    }

    #[tokio::test]
    async fn falls_back_to_full_transaction_lookup() {
        let tx_hash = [4u8; 32];
        let packet = signed_packet(tx_hash, 0);
        let backend = MockBackend {
            utxos: HashMap::new(),
            transactions: HashMap::from([(
                tx_hash,
                vec![TxOutInfo {
                    value: 500,
                    script_pubkey: script_paying_to(&packet),
                }],
            )]),
        };
        assert!(verify_block_requirement(&packet, &backend).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_unknown_utxo() {
        let packet = signed_packet([5u8; 32], 0);
        let backend = MockBackend {
            utxos: HashMap::new(),
            transactions: HashMap::new(),
        };
        assert!(matches!(
            verify_block_requirement(&packet, &backend).await,
            Err(AdmissionError::UnknownUtxo(_))
        ));
    }

    #[tokio::test]
    async fn rejects_out_of_range_vout() {
        let tx_hash = [6u8; 32];
        let packet = signed_packet(tx_hash, 3);
        let backend = backend_with(
            tx_hash,
            vec![TxOutInfo {
                value: 1000,
                script_pubkey: vec![],
            }],
        );
        assert!(matches!(
            verify_block_requirement(&packet, &backend).await,
            Err(AdmissionError::InvalidVout { vout: 3, outputs: 1 })
        ));
    }

    #[tokio::test]
    async fn rejects_insufficient_stake() {
        let tx_hash = [7u8; 32];
        let packet = signed_packet(tx_hash, 0);
        let backend = backend_with(
            tx_hash,
            vec![TxOutInfo {
                value: MIN_STAKE - 1,
                script_pubkey: script_paying_to(&packet),
            }],
        );
        assert!(matches!(
            verify_block_requirement(&packet, &backend).await,
            Err(AdmissionError::InsufficientStake { value }) if value == MIN_STAKE - 1
        ));
    }

    #[tokio::test]
    async fn rejects_nonstandard_script() {
        let tx_hash = [8u8; 32];
        let packet = signed_packet(tx_hash, 0);
        let backend = backend_with(
            tx_hash,
            vec![TxOutInfo {
                value: 1000,
                script_pubkey: vec![0xff, 0xee],
            }],
        );
        assert!(matches!(
            verify_block_requirement(&packet, &backend).await,
            Err(AdmissionError::UnsupportedScript)
        ));
    }

    #[tokio::test]
    async fn rejects_pubkey_not_matching_destination() {
        let tx_hash = [9u8; 32];
        let packet = signed_packet(tx_hash, 0);
        let mut script = vec![0x01];
        script.extend_from_slice(&[0u8; 20]);
        let backend = backend_with(
            tx_hash,
            vec![TxOutInfo {
                value: 1000,
                script_pubkey: script,
            }],
        );
        assert!(matches!(
            verify_block_requirement(&packet, &backend).await,
            Err(AdmissionError::KeyMismatch)
        ));
    }
}
