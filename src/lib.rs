//! UTXO Ledger - a single-node proof-of-work ledger engine
//!
//! This library implements:
//! - Hash-linked blocks with a fixed big-endian binary encoding
//! - Cancellable proof-of-work block admission
//! - UTXO-based transactions signed with secp256k1 ECDSA
//! - Atomic block and chain-head persistence on sled
//! - A keystore wallet and a command line client

pub mod core;
pub mod crypto;
pub mod wallet;
pub mod mining;
pub mod storage;
pub mod cli;
pub mod error;
pub mod config;

pub use error::{LedgerError, Result};
