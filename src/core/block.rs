use crate::core::codec::{Decoder, Encoder};
use crate::core::Transaction;
use crate::crypto::hash::Hash256;
use crate::mining::Consensus;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use chrono::Utc;

pub const BLOCK_VERSION: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub version: u64,
    pub prev_hash: Hash256,
    pub hash: Hash256,
    pub timestamp: u64,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Byte offset of the nonce in the serialized block: height, version, prev_hash, timestamp.
    pub const NONCE_OFFSET: usize = 8 + 8 + 32 + 8;

    fn candidate(height: u64, prev_hash: Hash256, transactions: Vec<Transaction>) -> Self {
        Self {
            height,
            version: BLOCK_VERSION,
            prev_hash,
            hash: Hash256::zero(),
            timestamp: Utc::now().timestamp().max(0) as u64,
            nonce: 0,
            transactions,
        }
    }

    /// Height 0 block over the all-zero previous hash, mined before returning.
    pub fn genesis<C: Consensus + ?Sized>(transactions: Vec<Transaction>, engine: &C) -> Result<Self> {
        Self::candidate(0, Hash256::zero(), transactions).sealed(engine)
    }

    /// Successor of the block at `prev_height`, mined before returning.
    pub fn next<C: Consensus + ?Sized>(
        prev_height: u64,
        prev_hash: Hash256,
        transactions: Vec<Transaction>,
        engine: &C,
    ) -> Result<Self> {
        let height = prev_height.checked_add(1)
            .ok_or_else(|| LedgerError::Validation("block height overflow".to_string()))?;

        Self::candidate(height, prev_hash, transactions).sealed(engine)
    }

    fn sealed<C: Consensus + ?Sized>(mut self, engine: &C) -> Result<Self> {
        let seal = engine.seal(&self)?;
        self.nonce = seal.nonce;
        self.hash = seal.hash;
        Ok(self)
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// Canonical encoding of every field except the block's own hash.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::with_capacity(Self::NONCE_OFFSET + 8 + 4);
        enc.put_u64(self.height);
        enc.put_u64(self.version);
        enc.put_hash(&self.prev_hash);
        enc.put_u64(self.timestamp);
        enc.put_u64(self.nonce);

        enc.put_len(self.transactions.len())?;
        for tx in &self.transactions {
            tx.encode(&mut enc)?;
        }

        Ok(enc.into_bytes())
    }

    /// Inverse of [`Block::serialize`]; the own hash is recomputed from the bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);

        let height = dec.get_u64()?;
        let version = dec.get_u64()?;
        let prev_hash = dec.get_hash()?;
        let timestamp = dec.get_u64()?;
        let nonce = dec.get_u64()?;

        let tx_count = dec.get_len()?;
        let mut transactions = Vec::new();
        for _ in 0..tx_count {
            transactions.push(Transaction::decode(&mut dec)?);
        }
        dec.finish()?;

        Ok(Self {
            height,
            version,
            prev_hash,
            hash: Hash256::hash(bytes),
            timestamp,
            nonce,
            transactions,
        })
    }

    pub fn calculate_hash(&self) -> Result<Hash256> {
        Ok(Hash256::hash(&self.serialize()?))
    }
}
