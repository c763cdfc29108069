use crate::crypto::keys::KeyPair;
use crate::Result;

/// Address book consulted by the ledger when building transactions.
pub trait AddressResolver {
    /// Checksum validation of an address string.
    fn check_address(&self, address: &str) -> bool;

    /// The public-key-hash an address encodes.
    fn pubkey_hash(&self, address: &str) -> Result<Vec<u8>>;

    /// Key pair owning `address`; `NotFound` when the address is not managed here.
    fn key_pair(&self, address: &str) -> Result<KeyPair>;
}
