use crate::{LedgerError, Result};
use secp256k1::ecdsa::Signature as Secp256k1Signature;
use serde::{Deserialize, Serialize};

/// ECDSA signature in 64-byte compact form: `r ‖ s`, both big-endian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
}

impl Signature {
    pub const LEN: usize = 64;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(LedgerError::Crypto("Invalid signature length".to_string()));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];

        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);

        Ok(Self { r, s })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LEN);
        bytes.extend_from_slice(&self.r);
        bytes.extend_from_slice(&self.s);
        bytes
    }

    pub fn from_secp256k1(signature: Secp256k1Signature) -> Self {
        let compact = signature.serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[0..32]);
        s.copy_from_slice(&compact[32..64]);

        Self { r, s }
    }

    pub fn to_secp256k1(&self) -> Result<Secp256k1Signature> {
        Secp256k1Signature::from_compact(&self.to_bytes())
            .map_err(|e| LedgerError::Crypto(format!("Invalid signature: {}", e)))
    }
}
