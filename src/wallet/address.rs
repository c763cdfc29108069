use crate::crypto::hash::{pubkey_hash, Hash256, ADDRESS_VERSION};
use crate::{LedgerError, Result};

const CHECKSUM_LEN: usize = 4;
const PUBKEY_HASH_LEN: usize = 21;

fn checksum(versioned_hash: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = Hash256::double_hash(versioned_hash);
    let mut check = [0u8; CHECKSUM_LEN];
    check.copy_from_slice(&hash.as_bytes()[0..CHECKSUM_LEN]);
    check
}

/// Base58 address of a raw public key.
pub fn public_key_to_address(public_key: &[u8]) -> String {
    pubkey_hash_to_address(&pubkey_hash(public_key))
}

pub fn pubkey_hash_to_address(pubkey_hash: &[u8]) -> String {
    let mut data = pubkey_hash.to_vec();
    data.extend_from_slice(&checksum(pubkey_hash));
    bs58::encode(data).into_string()
}

/// Decodes an address to its `version ‖ hash160` public-key-hash, checking the checksum.
pub fn address_to_pubkey_hash(address: &str) -> Result<Vec<u8>> {
    let decoded = bs58::decode(address).into_vec()
        .map_err(|e| LedgerError::Validation(format!("Invalid address encoding {}: {}", address, e)))?;

    if decoded.len() != PUBKEY_HASH_LEN + CHECKSUM_LEN {
        return Err(LedgerError::Validation(format!("Invalid address length: {}", address)));
    }

    let (versioned_hash, check) = decoded.split_at(PUBKEY_HASH_LEN);
    if checksum(versioned_hash) != check {
        return Err(LedgerError::Validation(format!("Invalid address checksum: {}", address)));
    }
    if versioned_hash[0] != ADDRESS_VERSION {
        return Err(LedgerError::Validation(format!("Unknown address version: {}", address)));
    }

    Ok(versioned_hash.to_vec())
}

pub fn is_valid_address(address: &str) -> bool {
    address_to_pubkey_hash(address).is_ok()
}
