//! Addresses, key storage and the resolver seam used by the ledger

pub mod address;
pub mod resolver;
pub mod wallet;

pub use address::{address_to_pubkey_hash, is_valid_address, pubkey_hash_to_address, public_key_to_address};
pub use resolver::AddressResolver;
pub use wallet::Keystore;
