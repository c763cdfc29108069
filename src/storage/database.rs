use crate::core::transaction::{OutPoint, TxOutput};
use crate::core::{Block, Utxo};
use crate::crypto::hash::{pubkey_hash, Hash256};
use crate::{LedgerError, Result};
use sled::transaction::{abort, ConflictableTransactionResult, TransactionError, TransactionalTree};
use sled::{Db, IVec, Transactional, Tree};
use std::path::Path;
use std::sync::Arc;

// Tree names
const TREE_BLOCKS: &str = "blocks";
const TREE_UTXOS: &str = "utxoset";
const TREE_TRANSACTIONS: &str = "transactions";

/// Sentinel key in the blocks tree holding the chain head hash.
const LAST_HASH_KEY: &[u8] = b"lasthash";

/// txid + big-endian vout
const OUTPOINT_KEY_LEN: usize = 36;

#[derive(Debug, Clone)]
pub struct Database {
    db: Arc<Db>,
    blocks: Tree,
    utxos: Tree,
    transactions: Tree,
}

fn transaction_error(err: TransactionError<LedgerError>) -> LedgerError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => LedgerError::Storage(format!("Transaction failed: {}", e)),
    }
}

/// UTXO index key: the owner's public-key-hash followed by the outpoint, so
/// one address's outputs form a contiguous prefix.
fn utxo_key(pubkey_hash: &[u8], outpoint: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(pubkey_hash.len() + OUTPOINT_KEY_LEN);
    key.extend_from_slice(pubkey_hash);
    key.extend_from_slice(outpoint.txid.as_bytes());
    key.extend_from_slice(&outpoint.vout.to_be_bytes());
    key
}

fn key_to_outpoint(key: &[u8]) -> Result<OutPoint> {
    if key.len() < OUTPOINT_KEY_LEN {
        return Err(LedgerError::Storage("Invalid UTXO key length".to_string()));
    }

    let tail = &key[key.len() - OUTPOINT_KEY_LEN..];
    let txid = Hash256::from_slice(&tail[..32])
        .ok_or_else(|| LedgerError::Storage("Invalid UTXO key txid".to_string()))?;

    let mut vout_bytes = [0u8; 4];
    vout_bytes.copy_from_slice(&tail[32..]);

    Ok(OutPoint::new(txid, u32::from_be_bytes(vout_bytes)))
}

enum UtxoWrite {
    Spend(Vec<u8>),
    Create(Vec<u8>, Vec<u8>),
}

/// A block encoded ahead of time, so the sled transaction closure only copies bytes.
struct StagedBlock {
    hash: Hash256,
    body: Vec<u8>,
    tx_hashes: Vec<Hash256>,
    utxo_writes: Vec<UtxoWrite>,
}

impl StagedBlock {
    fn new(block: &Block) -> Result<Self> {
        let mut utxo_writes = Vec::new();

        // In block order, so an output created and spent in the same block nets out
        for tx in &block.transactions {
            for input in &tx.inputs {
                let owner = pubkey_hash(&input.pub_key);
                utxo_writes.push(UtxoWrite::Spend(utxo_key(&owner, &input.outpoint())));
            }
            for (vout, output) in tx.outputs.iter().enumerate() {
                let key = utxo_key(&output.pubkey_hash, &OutPoint::new(tx.hash, vout as u32));
                utxo_writes.push(UtxoWrite::Create(key, bincode::serialize(output)?));
            }
        }

        Ok(Self {
            hash: block.hash,
            body: block.serialize()?,
            tx_hashes: block.transactions.iter().map(|tx| tx.hash).collect(),
            utxo_writes,
        })
    }

    fn write_index(
        &self,
        utxos: &TransactionalTree,
        transactions: &TransactionalTree,
    ) -> ConflictableTransactionResult<(), LedgerError> {
        for tx_hash in &self.tx_hashes {
            transactions.insert(&tx_hash.as_bytes()[..], &self.hash.as_bytes()[..])?;
        }
        for write in &self.utxo_writes {
            match write {
                UtxoWrite::Spend(key) => {
                    utxos.remove(key.as_slice())?;
                }
                UtxoWrite::Create(key, value) => {
                    utxos.insert(key.as_slice(), value.as_slice())?;
                }
            }
        }
        Ok(())
    }

    /// Body, index updates and the new head pointer.
    fn write(
        &self,
        blocks: &TransactionalTree,
        utxos: &TransactionalTree,
        transactions: &TransactionalTree,
    ) -> ConflictableTransactionResult<(), LedgerError> {
        blocks.insert(&self.hash.as_bytes()[..], self.body.as_slice())?;
        self.write_index(utxos, transactions)?;
        blocks.insert(LAST_HASH_KEY, &self.hash.as_bytes()[..])?;
        Ok(())
    }
}

fn collect_keys(tree: &Tree) -> Result<Vec<IVec>> {
    tree.iter()
        .keys()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| LedgerError::Storage(format!("Failed to read index: {}", e)))
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| LedgerError::Storage(format!("Failed to open database: {}", e)))?;

        let open = |name: &str| {
            db.open_tree(name)
                .map_err(|e| LedgerError::Storage(format!("Failed to open tree {}: {}", name, e)))
        };
        let blocks = open(TREE_BLOCKS)?;
        let utxos = open(TREE_UTXOS)?;
        let transactions = open(TREE_TRANSACTIONS)?;

        Ok(Self {
            db: Arc::new(db),
            blocks,
            utxos,
            transactions,
        })
    }

    pub fn get_tree(&self, tree_name: &str) -> Result<Tree> {
        self.db.open_tree(tree_name)
            .map_err(|e| LedgerError::Storage(format!("Failed to open tree {}: {}", tree_name, e)))
    }

    // Chain head
    pub fn get_last_hash(&self) -> Result<Option<Hash256>> {
        match self.blocks.get(LAST_HASH_KEY)
            .map_err(|e| LedgerError::Storage(format!("Failed to read chain head: {}", e)))? {
            Some(bytes) => {
                let hash = Hash256::from_slice(&bytes)
                    .ok_or_else(|| LedgerError::Storage("Invalid chain head length".to_string()))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    // Block operations
    pub fn contains_block(&self, hash: &Hash256) -> Result<bool> {
        self.blocks.contains_key(hash.as_bytes())
            .map_err(|e| LedgerError::Storage(format!("Failed to look up block: {}", e)))
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>> {
        match self.blocks.get(hash.as_bytes())
            .map_err(|e| LedgerError::Storage(format!("Failed to get block: {}", e)))? {
            Some(data) => {
                let block = Block::deserialize(&data)
                    .map_err(|e| LedgerError::Storage(format!("Failed to deserialize block {}: {}", hash, e)))?;

                if block.hash != *hash {
                    return Err(LedgerError::Storage(format!(
                        "Block stored under {} hashes to {}",
                        hash, block.hash
                    )));
                }
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Writes the genesis body, its index entries and the head pointer
    /// together. Returns `false` without writing anything when a head already exists.
    pub fn save_genesis(&self, block: &Block) -> Result<bool> {
        let staged = StagedBlock::new(block)?;

        let written = (&self.blocks, &self.utxos, &self.transactions)
            .transaction(|(blocks, utxos, transactions)| -> ConflictableTransactionResult<bool, LedgerError> {
                if blocks.get(LAST_HASH_KEY)?.is_some() {
                    return Ok(false);
                }
                staged.write(blocks, utxos, transactions)?;
                Ok(true)
            })
            .map_err(transaction_error)?;

        if written {
            self.flush()?;
            log::debug!("💾 Saved genesis block {}", staged.hash);
        }
        Ok(written)
    }

    /// Writes `block`, applies it to the UTXO index and advances the head to it
    /// in one transaction, provided the head is still `expected_head`.
    pub fn append_block(&self, block: &Block, expected_head: &Hash256) -> Result<()> {
        if block.prev_hash != *expected_head {
            return Err(LedgerError::Validation(format!(
                "Block {} does not extend head {}",
                block.hash, expected_head
            )));
        }

        let staged = StagedBlock::new(block)?;

        (&self.blocks, &self.utxos, &self.transactions)
            .transaction(|(blocks, utxos, transactions)| -> ConflictableTransactionResult<(), LedgerError> {
                let current = blocks.get(LAST_HASH_KEY)?;
                if current.as_deref() != Some(&expected_head.as_bytes()[..]) {
                    return abort(LedgerError::Storage(format!(
                        "chain head moved; expected {}",
                        expected_head
                    )));
                }
                staged.write(blocks, utxos, transactions)
            })
            .map_err(transaction_error)?;

        self.flush()?;
        log::debug!("💾 Saved block {} at height {}", staged.hash, block.height);
        Ok(())
    }

    /// Replaces the UTXO and transaction indexes with ones derived from
    /// `blocks`, which must run from genesis to head.
    pub fn rebuild_index(&self, blocks: &[Block]) -> Result<()> {
        let staged = blocks.iter()
            .map(StagedBlock::new)
            .collect::<Result<Vec<_>>>()?;
        let stale_utxos = collect_keys(&self.utxos)?;
        let stale_transactions = collect_keys(&self.transactions)?;

        (&self.utxos, &self.transactions)
            .transaction(|(utxos, transactions)| -> ConflictableTransactionResult<(), LedgerError> {
                for key in &stale_utxos {
                    utxos.remove(key.clone())?;
                }
                for key in &stale_transactions {
                    transactions.remove(key.clone())?;
                }
                for block in &staged {
                    block.write_index(utxos, transactions)?;
                }
                Ok(())
            })
            .map_err(transaction_error)?;

        self.flush()?;
        log::debug!("💾 Rebuilt UTXO index over {} blocks", blocks.len());
        Ok(())
    }

    // UTXO index
    pub fn get_utxos(&self, pubkey_hash: &[u8]) -> Result<Vec<Utxo>> {
        let mut utxos = Vec::new();

        for item in self.utxos.scan_prefix(pubkey_hash) {
            let (key, value) = item
                .map_err(|e| LedgerError::Storage(format!("Failed to read UTXO index: {}", e)))?;
            let output: TxOutput = bincode::deserialize(&value)
                .map_err(|e| LedgerError::Storage(format!("Failed to deserialize UTXO: {}", e)))?;

            // Longer hashes can share the prefix
            if !output.is_locked_to(pubkey_hash) {
                continue;
            }
            let outpoint = key_to_outpoint(&key)?;
            utxos.push(Utxo::new(outpoint.txid, outpoint.vout, output));
        }

        Ok(utxos)
    }

    /// The unspent output at `outpoint`, if it is locked to `pubkey_hash`.
    pub fn get_utxo(&self, pubkey_hash: &[u8], outpoint: &OutPoint) -> Result<Option<TxOutput>> {
        match self.utxos.get(utxo_key(pubkey_hash, outpoint))
            .map_err(|e| LedgerError::Storage(format!("Failed to get UTXO: {}", e)))? {
            Some(data) => {
                let output = bincode::deserialize(&data)
                    .map_err(|e| LedgerError::Storage(format!("Failed to deserialize UTXO: {}", e)))?;
                Ok(Some(output))
            }
            None => Ok(None),
        }
    }

    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }

    // Transaction index
    pub fn contains_transaction(&self, txid: &Hash256) -> Result<bool> {
        self.transactions.contains_key(txid.as_bytes())
            .map_err(|e| LedgerError::Storage(format!("Failed to look up transaction: {}", e)))
    }

    /// Hash of the block holding `txid`.
    pub fn get_transaction_block(&self, txid: &Hash256) -> Result<Option<Hash256>> {
        match self.transactions.get(txid.as_bytes())
            .map_err(|e| LedgerError::Storage(format!("Failed to look up transaction: {}", e)))? {
            Some(bytes) => {
                let hash = Hash256::from_slice(&bytes)
                    .ok_or_else(|| LedgerError::Storage("Invalid transaction index entry".to_string()))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    pub fn index_is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    // Database maintenance
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
            .map_err(|e| LedgerError::Storage(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }

    pub fn block_count(&self) -> Result<usize> {
        let has_head = self.blocks.contains_key(LAST_HASH_KEY)
            .map_err(|e| LedgerError::Storage(format!("Failed to read chain head: {}", e)))?;
        Ok(self.blocks.len().saturating_sub(usize::from(has_head)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::crypto::KeyPair;
    use crate::mining::ProofOfWork;
    use tempfile::TempDir;

    fn mined_genesis(pow: &ProofOfWork) -> Result<Block> {
        let owner = KeyPair::new()?;
        let coinbase = Transaction::new_coinbase(owner.public_key.pubkey_hash(), 50)?;
        Block::genesis(vec![coinbase], pow)
    }

    #[test]
    fn test_genesis_written_once() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db"))?;
        let pow = ProofOfWork::new(4)?;

        assert_eq!(db.get_last_hash()?, None);

        let genesis = mined_genesis(&pow)?;
        assert!(db.save_genesis(&genesis)?);
        assert_eq!(db.get_last_hash()?, Some(genesis.hash));
        assert_eq!(db.get_block(&genesis.hash)?, Some(genesis.clone()));

        let other = mined_genesis(&pow)?;
        assert!(!db.save_genesis(&other)?);
        assert_eq!(db.get_last_hash()?, Some(genesis.hash));
        assert!(!db.contains_block(&other.hash)?);
        assert_eq!(db.block_count()?, 1);
        assert_eq!(db.utxo_count(), 1);

        Ok(())
    }

    #[test]
    fn test_stale_head_leaves_no_partial_write() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db"))?;
        let pow = ProofOfWork::new(4)?;

        let genesis = mined_genesis(&pow)?;
        db.save_genesis(&genesis)?;

        let first = Block::next(0, genesis.hash, genesis.transactions.clone(), &pow)?;
        db.append_block(&first, &genesis.hash)?;

        // A second writer still believing genesis is the head
        let other = mined_genesis(&pow)?;
        let stale = Block::next(0, genesis.hash, other.transactions, &pow)?;
        let err = db.append_block(&stale, &genesis.hash).unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));

        assert_eq!(db.get_last_hash()?, Some(first.hash));
        assert!(!db.contains_block(&stale.hash)?);

        Ok(())
    }

    #[test]
    fn test_reopen_keeps_chain() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");
        let pow = ProofOfWork::new(4)?;
        let genesis = mined_genesis(&pow)?;

        {
            let db = Database::new(&path)?;
            db.save_genesis(&genesis)?;
        }

        let db = Database::new(&path)?;
        assert_eq!(db.get_last_hash()?, Some(genesis.hash));
        assert_eq!(db.get_block(&genesis.hash)?.map(|b| b.height), Some(0));

        Ok(())
    }

    #[test]
    fn test_append_updates_utxo_index() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db"))?;
        let pow = ProofOfWork::new(4)?;

        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let alice_pkh = alice.public_key.pubkey_hash();
        let bob_pkh = bob.public_key.pubkey_hash();

        let coinbase = Transaction::new_coinbase(alice_pkh.clone(), 50)?;
        let genesis = Block::genesis(vec![coinbase.clone()], &pow)?;
        db.save_genesis(&genesis)?;

        let funding = db.get_utxos(&alice_pkh)?;
        assert_eq!(funding.len(), 1);
        assert_eq!(funding[0].outpoint(), OutPoint::new(coinbase.hash, 0));
        assert_eq!(db.get_transaction_block(&coinbase.hash)?, Some(genesis.hash));

        let mut spend = Transaction::new_transfer(&funding, &alice_pkh, &alice.public_key, &bob_pkh, 20)?;
        spend.sign(&alice.private_key, &funding)?;
        let block = Block::next(0, genesis.hash, vec![spend.clone()], &pow)?;
        db.append_block(&block, &genesis.hash)?;

        // Only the change is left for Alice
        let alice_utxos = db.get_utxos(&alice_pkh)?;
        assert_eq!(alice_utxos.len(), 1);
        assert_eq!(alice_utxos[0].outpoint(), OutPoint::new(spend.hash, 1));
        assert_eq!(alice_utxos[0].value(), 30);

        assert_eq!(db.get_utxo(&bob_pkh, &OutPoint::new(spend.hash, 0))?.map(|o| o.value), Some(20));
        assert_eq!(db.get_utxo(&alice_pkh, &OutPoint::new(coinbase.hash, 0))?, None);
        assert!(db.contains_transaction(&spend.hash)?);
        assert_eq!(db.utxo_count(), 2);

        Ok(())
    }

    #[test]
    fn test_rebuild_index_replaces_contents() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db"))?;
        let pow = ProofOfWork::new(4)?;

        let genesis = mined_genesis(&pow)?;
        db.save_genesis(&genesis)?;
        let owner = genesis.transactions[0].outputs[0].pubkey_hash.clone();

        db.get_tree(TREE_UTXOS)?.clear()?;
        db.get_tree(TREE_TRANSACTIONS)?.clear()?;
        assert!(db.index_is_empty());
        assert!(db.get_utxos(&owner)?.is_empty());

        db.rebuild_index(std::slice::from_ref(&genesis))?;
        assert!(!db.index_is_empty());
        assert_eq!(db.get_utxos(&owner)?.len(), 1);

        // Rebuilding again leaves nothing stale behind
        db.rebuild_index(std::slice::from_ref(&genesis))?;
        assert_eq!(db.utxo_count(), 1);

        Ok(())
    }
}
