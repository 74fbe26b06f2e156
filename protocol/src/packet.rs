use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::{Command, ProtocolError};

/// Compact ECDSA signature length appended to authenticated packets.
pub const SIGNATURE_SIZE: usize = 64;
/// Compressed secp256k1 public key length appended after the signature.
pub const PUBKEY_SIZE: usize = 33;

const HEADER_SIZE: usize = 2;
const PREAMBLE_SIZE: usize = 32 + 4;
const TRAILER_SIZE: usize = SIGNATURE_SIZE + PUBKEY_SIZE;

/// UTXO reference carried by authenticated kinds, naming the stake that
/// backs the request signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthPreamble {
    pub utxo_tx_hash: [u8; 32],
    pub utxo_vout: u32,
}

/// A framed overlay packet: a 2-byte command word followed by the
/// command-specific body.
///
/// Construction is strictly append-only, mirroring the wire layout:
/// preamble (authenticated kinds), NUL-terminated string fields, then
/// `sign` to attach the signature trailer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    command: Command,
    body: Vec<u8>,
}

impl Packet {
    pub fn new(command: Command) -> Self {
        let mut body = Vec::with_capacity(64);
        body.extend_from_slice(&command.as_u16().to_le_bytes());
        Self { command, body }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// Full wire bytes, ready for the transport.
    pub fn wire(&self) -> &[u8] {
        &self.body
    }

    pub fn into_wire(self) -> Vec<u8> {
        self.body
    }

    pub fn append_str(&mut self, value: &str) {
        self.body.extend_from_slice(value.as_bytes());
        self.body.push(0);
    }

    pub fn append_hash(&mut self, hash: &[u8; 32]) {
        self.body.extend_from_slice(hash);
    }

    pub fn append_u32(&mut self, value: u32) {
        self.body.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends the UTXO preamble. Must come directly after the command
    /// word on authenticated kinds.
    pub fn append_preamble(&mut self, preamble: &AuthPreamble) {
        self.append_hash(&preamble.utxo_tx_hash);
        self.append_u32(preamble.utxo_vout);
    }

    /// Signs everything appended so far and attaches the
    /// signature + compressed pubkey trailer.
    pub fn sign(&mut self, secret: &SecretKey) -> Result<(), ProtocolError> {
        let secp = Secp256k1::signing_only();
        let digest = Sha256::digest(&self.body);
        let message = Message::from_digest_slice(&digest)?;
        let signature = secp.sign_ecdsa(&message, secret);
        let pubkey = PublicKey::from_secret_key(&secp, secret);
        self.body.extend_from_slice(&signature.serialize_compact());
        self.body.extend_from_slice(&pubkey.serialize());
        Ok(())
    }

    /// Recomputes the digest over the covered range and checks the
    /// embedded signature against the embedded pubkey. Any failure,
    /// including a packet too short to carry a trailer, is `false`.
    pub fn verify(&self) -> bool {
        let Some(covered) = self.signed_range() else {
            return false;
        };
        let trailer = &self.body[covered.len()..];
        let secp = Secp256k1::verification_only();
        let digest = Sha256::digest(covered);
        let Ok(message) = Message::from_digest_slice(&digest) else {
            return false;
        };
        let Ok(signature) = Signature::from_compact(&trailer[..SIGNATURE_SIZE]) else {
            return false;
        };
        let Ok(pubkey) = PublicKey::from_slice(&trailer[SIGNATURE_SIZE..]) else {
            return false;
        };
        secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
    }

    /// Bytes covered by the signature (command word through last
    /// argument), when the packet is long enough to carry a trailer.
    fn signed_range(&self) -> Option<&[u8]> {
        if !self.command.requires_auth() {
            return None;
        }
        let min = HEADER_SIZE + PREAMBLE_SIZE + TRAILER_SIZE;
        if self.body.len() < min {
            return None;
        }
        Some(&self.body[..self.body.len() - TRAILER_SIZE])
    }

    pub fn auth_preamble(&self) -> Result<AuthPreamble, ProtocolError> {
        if !self.command.requires_auth() {
            return Err(ProtocolError::NotAuthenticated);
        }
        let mut reader = ByteReader::new(&self.body);
        reader.skip(HEADER_SIZE)?;
        let mut utxo_tx_hash = [0u8; 32];
        utxo_tx_hash.copy_from_slice(reader.take(32)?);
        let utxo_vout = reader.u32_le()?;
        Ok(AuthPreamble {
            utxo_tx_hash,
            utxo_vout,
        })
    }

    pub fn pubkey_bytes(&self) -> Result<[u8; PUBKEY_SIZE], ProtocolError> {
        if self.signed_range().is_none() {
            return Err(ProtocolError::NotAuthenticated);
        }
        let mut out = [0u8; PUBKEY_SIZE];
        out.copy_from_slice(&self.body[self.body.len() - PUBKEY_SIZE..]);
        Ok(out)
    }

    /// The NUL-terminated string fields between the header (and
    /// preamble/trailer, for authenticated kinds) in wire order:
    /// query id, currency or plugin name, then command-specific args.
    pub fn strings(&self) -> Result<Vec<String>, ProtocolError> {
        let (start, end) = self.string_region()?;
        let mut reader = ByteReader::new(&self.body[start..end]);
        let mut fields = Vec::new();
        while !reader.is_empty() {
            fields.push(reader.cstr()?.to_string());
        }
        Ok(fields)
    }

    fn string_region(&self) -> Result<(usize, usize), ProtocolError> {
        if self.command.requires_auth() {
            let min = HEADER_SIZE + PREAMBLE_SIZE + TRAILER_SIZE;
            if self.body.len() < min {
                return Err(ProtocolError::Malformed("truncated authenticated packet"));
            }
            Ok((HEADER_SIZE + PREAMBLE_SIZE, self.body.len() - TRAILER_SIZE))
        } else {
            Ok((HEADER_SIZE, self.body.len()))
        }
    }

    /// Parses and validates a packet received from the transport.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Malformed("missing command word"));
        }
        let command = Command::from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))?;
        let packet = Self {
            command,
            body: bytes.to_vec(),
        };
        // Every kind carries a query id plus a second field (currency,
        // plugin name, target address, or reply payload). The parse also
        // rejects any string without a terminator in bounds.
        let fields = packet.strings()?;
        if fields.len() < 2 {
            return Err(ProtocolError::Malformed("missing required fields"));
        }
        Ok(packet)
    }
}

/// Length-checked cursor over a byte slice. All reads fail cleanly
/// instead of slicing out of bounds.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() - self.pos < n {
            return Err(ProtocolError::Malformed("unexpected end of packet"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32_le(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn cstr(&mut self) -> Result<&'a str, ProtocolError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::Malformed("unterminated string"))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| ProtocolError::Malformed("invalid utf-8 in string"))?;
        self.pos += nul + 1;
        Ok(s)
    }
}
