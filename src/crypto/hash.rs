use sha2::{Sha256, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version byte prefixed to every public-key-hash.
pub const ADDRESS_VERSION: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn hash(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn double_hash(data: &[u8]) -> Self {
        let first_hash = Self::hash(data);
        Self::hash(first_hash.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        Self::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let array: [u8; 32] = slice.try_into().ok()?;
        Some(Self(array))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// RIPEMD160 hash for public-key-hash generation
use ripemd::Ripemd160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash160([u8; 20]);

impl Hash160 {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn hash(data: &[u8]) -> Self {
        let mut hasher = Ripemd160::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn hash_sha256(data: &[u8]) -> Self {
        let sha256_hash = Hash256::hash(data);
        Self::hash(sha256_hash.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// `version ‖ ripemd160(sha256(pubkey))`, the lock placed on transaction outputs.
pub fn pubkey_hash(public_key: &[u8]) -> Vec<u8> {
    let hash160 = Hash160::hash_sha256(public_key);

    let mut data = Vec::with_capacity(21);
    data.push(ADDRESS_VERSION);
    data.extend_from_slice(hash160.as_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256() {
        let data = b"hello world";
        let hash1 = Hash256::hash(data);
        let hash2 = Hash256::hash(data);

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, Hash256::zero());
        assert!(Hash256::zero().is_zero());
    }

    #[test]
    fn test_hash256_hex() {
        let hash = Hash256::hash(b"test");
        let parsed_hash = Hash256::from_hex(&hash.to_hex()).unwrap();

        assert_eq!(hash, parsed_hash);
        assert!(Hash256::from_hex("abcd").is_err());
    }

    #[test]
    fn test_known_sha256_vector() {
        assert_eq!(
            Hash256::hash(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pubkey_hash_layout() {
        let pkh = pubkey_hash(b"some public key bytes");

        assert_eq!(pkh.len(), 21);
        assert_eq!(pkh[0], ADDRESS_VERSION);
        assert_eq!(&pkh[1..], Hash160::hash_sha256(b"some public key bytes").as_bytes());
    }
}
