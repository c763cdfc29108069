//! Cryptographic primitives for the ledger

pub mod keys;
pub mod signatures;
pub mod hash;

pub use keys::{PrivateKey, PublicKey, KeyPair};
pub use signatures::Signature;
pub use hash::{Hash256, Hash160, pubkey_hash};
