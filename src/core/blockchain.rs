use crate::config::Config;
use crate::core::cursor::{BlockIter, ChainCursor};
use crate::core::transaction::{OutPoint, TxOutput};
use crate::core::utxo::{self, Utxo, UtxoView};
use crate::core::{Block, Transaction};
use crate::crypto::hash::{pubkey_hash, Hash256};
use crate::mining::{Consensus, MiningControl, ProofOfWork};
use crate::storage::Database;
use crate::{LedgerError, Result};
use std::collections::{HashMap, HashSet};

/// The persisted chain: a block store plus the engine admitting new blocks.
pub struct Blockchain {
    db: Database,
    engine: Box<dyn Consensus>,
    coinbase_reward: u64,
}

/// Every output and spend seen by one full walk of the chain.
#[derive(Debug, Default)]
struct ChainIndex {
    outputs: HashMap<OutPoint, TxOutput>,
    order: Vec<OutPoint>,
    spent: HashSet<OutPoint>,
}

impl ChainIndex {
    fn unspent_for(&self, pubkey_hash: &[u8]) -> Vec<Utxo> {
        self.order.iter()
            .filter(|outpoint| !self.spent.contains(outpoint))
            .filter_map(|outpoint| {
                self.outputs.get(outpoint)
                    .filter(|output| output.is_locked_to(pubkey_hash))
                    .map(|output| Utxo::new(outpoint.txid, outpoint.vout, output.clone()))
            })
            .collect()
    }
}

impl Blockchain {
    /// Opens the chain under the configured data directory with a proof-of-work engine.
    /// The engine's [`MiningControl`] is reachable through [`Blockchain::mining_control`].
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with_control(config, MiningControl::from_config(&config.mining))
    }

    /// Like [`Blockchain::open`], mining under a control the caller already holds.
    pub fn open_with_control(config: &Config, control: MiningControl) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.data_dir)?;
        let db = Database::new(config.db_path())?;
        let engine = ProofOfWork::with_control(config.mining.difficulty, control)?;

        let chain = Self::with_engine(db, Box::new(engine), config.consensus.coinbase_reward);
        if chain.head()?.is_some() && chain.db.index_is_empty() {
            chain.reindex_utxos()?;
        }
        Ok(chain)
    }

    pub fn with_engine(db: Database, engine: Box<dyn Consensus>, coinbase_reward: u64) -> Self {
        Self {
            db,
            engine,
            coinbase_reward,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn engine(&self) -> &dyn Consensus {
        self.engine.as_ref()
    }

    pub fn coinbase_reward(&self) -> u64 {
        self.coinbase_reward
    }

    /// Cancellation and timeout handle of the mining engine.
    pub fn mining_control(&self) -> Option<&MiningControl> {
        self.engine.control()
    }

    /// Rebuilds the UTXO index from the blocks alone.
    pub fn reindex_utxos(&self) -> Result<()> {
        let mut blocks = self.all_blocks()?;
        blocks.reverse();
        self.db.rebuild_index(&blocks)?;

        log::info!("🔁 Rebuilt UTXO index from {} blocks", blocks.len());
        Ok(())
    }

    pub fn head(&self) -> Result<Option<Hash256>> {
        self.db.get_last_hash()
    }

    pub fn last_block(&self) -> Result<Block> {
        let head = self.head()?
            .ok_or_else(|| LedgerError::NotFound("no genesis block; create one first".to_string()))?;

        self.db.get_block(&head)?
            .ok_or_else(|| LedgerError::Storage(format!("head {} has no stored block", head)))
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>> {
        self.db.get_block(hash)
    }

    /// Cursor positioned at the current head.
    pub fn cursor(&self) -> Result<ChainCursor> {
        Ok(match self.head()? {
            Some(head) => ChainCursor::new(head),
            None => ChainCursor::empty(),
        })
    }

    pub fn iter(&self) -> Result<BlockIter<'_>> {
        Ok(BlockIter::new(&self.db, self.cursor()?))
    }

    pub fn iter_from(&self, start: Hash256) -> BlockIter<'_> {
        BlockIter::new(&self.db, ChainCursor::new(start))
    }

    /// Every block from head to genesis, in descending height.
    pub fn all_blocks(&self) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for block in self.iter()? {
            let block = block.map_err(|e| match e {
                LedgerError::NotFound(what) => LedgerError::Storage(format!("chain broken: missing {}", what)),
                other => other,
            })?;
            blocks.push(block);
        }

        if let Some(last) = blocks.last() {
            if !last.is_genesis() {
                return Err(LedgerError::Storage(format!(
                    "chain ends at height {} instead of genesis",
                    last.height
                )));
            }
        }

        Ok(blocks)
    }

    /// Mines and stores the genesis block. Once a head exists this is a no-op
    /// returning the current head block.
    pub fn create_genesis(&self, transactions: Vec<Transaction>) -> Result<Block> {
        if self.head()?.is_some() {
            log::debug!("Genesis already present, keeping existing chain");
            return self.last_block();
        }

        self.validate_transactions(&transactions)?;

        let block = Block::genesis(transactions, self.engine.as_ref())?;
        if !self.db.save_genesis(&block)? {
            return self.last_block();
        }

        log::info!("🌱 Genesis block {} created", block.hash);
        Ok(block)
    }

    /// Validates `transactions`, mines them on top of the head and commits the
    /// block together with the new head pointer.
    pub fn commit_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        let head = self.last_block()?;
        self.validate_transactions(&transactions)?;

        let block = Block::next(head.height, head.hash, transactions, self.engine.as_ref())?;
        if !self.engine.validate(&block)? {
            return Err(LedgerError::Mining(format!(
                "{} produced a block it does not accept",
                self.engine.name()
            )));
        }

        self.db.append_block(&block, &head.hash)?;

        log::info!(
            "✅ Block {} committed at height {} with {} transactions",
            block.hash,
            block.height,
            block.transactions.len()
        );
        Ok(block)
    }

    /// Unspent outputs of `pubkey_hash` found by walking every block, without the index.
    pub fn chain_utxos(&self, pubkey_hash: &[u8]) -> Result<Vec<Utxo>> {
        Ok(self.scan()?.unspent_for(pubkey_hash))
    }

    pub fn balance(&self, pubkey_hash: &[u8], pending: &[Transaction]) -> Result<u64> {
        let (balance, _) = self.utxos_with_balance(pubkey_hash, pending)?;
        Ok(balance)
    }

    pub fn utxos_with_balance(&self, pubkey_hash: &[u8], pending: &[Transaction]) -> Result<(u64, Vec<Utxo>)> {
        let persisted = self.chain_utxos(pubkey_hash)?;
        let utxos = utxo::apply_pending(persisted, pubkey_hash, pending);
        Ok((utxo::total_value(&utxos), utxos))
    }

    fn scan(&self) -> Result<ChainIndex> {
        let mut index = ChainIndex::default();

        for block in self.iter()? {
            let block = block?;
            for tx in &block.transactions {
                index.spent.extend(tx.outpoints());

                for (vout, output) in tx.outputs.iter().enumerate() {
                    let outpoint = OutPoint::new(tx.hash, vout as u32);
                    index.order.push(outpoint);
                    index.outputs.insert(outpoint, output.clone());
                }
            }
        }

        Ok(index)
    }

    fn reject(&self, tx: &Transaction, err: LedgerError) -> LedgerError {
        log::warn!("❌ Rejected transaction {}: {}", tx.hash, err);
        err
    }

    /// Explains why an input found no indexed output for its key: the output
    /// never existed, belongs to another key, or was already spent.
    fn missing_output(&self, outpoint: &OutPoint, owner: &[u8]) -> Result<LedgerError> {
        let block_hash = match self.db.get_transaction_block(&outpoint.txid)? {
            Some(hash) => hash,
            None => return Ok(LedgerError::NotFound(format!("output {}", outpoint))),
        };
        let block = self.db.get_block(&block_hash)?
            .ok_or_else(|| LedgerError::Storage(format!("indexed block {} is missing", block_hash)))?;

        let output = block.transactions.iter()
            .find(|tx| tx.hash == outpoint.txid)
            .and_then(|tx| tx.outputs.get(outpoint.vout as usize));

        Ok(match output {
            None => LedgerError::NotFound(format!("output {}", outpoint)),
            Some(output) if !output.is_locked_to(owner) => {
                LedgerError::SignatureInvalid(format!("key does not own {}", outpoint))
            }
            Some(_) => LedgerError::DoubleSpend(outpoint.to_string()),
        })
    }

    /// Checks a candidate block body against the persisted chain. Later
    /// transactions may spend outputs of earlier ones in the same list.
    fn validate_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        if transactions.is_empty() {
            return Err(LedgerError::Validation("block has no transactions".to_string()));
        }

        let mut block_outputs: HashMap<OutPoint, TxOutput> = HashMap::new();
        let mut block_spent: HashSet<OutPoint> = HashSet::new();
        let mut seen: HashSet<Hash256> = HashSet::new();
        let mut coinbase_seen = false;

        for tx in transactions {
            if tx.calculate_hash()? != tx.hash {
                return Err(self.reject(tx, LedgerError::Validation("hash does not match contents".to_string())));
            }
            if self.db.contains_transaction(&tx.hash)? || !seen.insert(tx.hash) {
                return Err(self.reject(tx, LedgerError::Validation("duplicate transaction".to_string())));
            }

            let output_total = tx.output_value()
                .ok_or_else(|| self.reject(tx, LedgerError::Validation("output value overflow".to_string())))?;

            if tx.inputs.is_empty() {
                if !tx.is_coinbase() {
                    return Err(self.reject(tx, LedgerError::Validation("transaction has no inputs".to_string())));
                }
                if coinbase_seen {
                    return Err(self.reject(tx, LedgerError::Validation("block has more than one coinbase".to_string())));
                }
                coinbase_seen = true;

                if output_total > self.coinbase_reward {
                    return Err(self.reject(tx, LedgerError::Validation(format!(
                        "coinbase pays {} but the reward is {}",
                        output_total, self.coinbase_reward
                    ))));
                }
            } else {
                let mut spent = Vec::with_capacity(tx.inputs.len());
                for input in &tx.inputs {
                    let outpoint = input.outpoint();
                    if !block_spent.insert(outpoint) {
                        return Err(self.reject(tx, LedgerError::DoubleSpend(outpoint.to_string())));
                    }

                    let owner = pubkey_hash(&input.pub_key);
                    let output = match block_outputs.get(&outpoint) {
                        Some(output) if output.is_locked_to(&owner) => output.clone(),
                        Some(_) => {
                            return Err(self.reject(tx, LedgerError::SignatureInvalid(format!(
                                "key does not own {}",
                                outpoint
                            ))));
                        }
                        None => match self.db.get_utxo(&owner, &outpoint)? {
                            Some(output) => output,
                            None => {
                                let err = self.missing_output(&outpoint, &owner)?;
                                return Err(self.reject(tx, err));
                            }
                        },
                    };
                    spent.push(Utxo::new(outpoint.txid, outpoint.vout, output));
                }

                if !tx.verify(&spent)? {
                    return Err(self.reject(tx, LedgerError::SignatureInvalid(format!("transaction {}", tx.hash))));
                }

                let input_total = spent.iter()
                    .try_fold(0u64, |acc, utxo| acc.checked_add(utxo.value()))
                    .ok_or_else(|| self.reject(tx, LedgerError::Validation("input value overflow".to_string())))?;
                if output_total > input_total {
                    return Err(self.reject(tx, LedgerError::Validation(format!(
                        "outputs {} exceed inputs {}",
                        output_total, input_total
                    ))));
                }
            }

            for (vout, output) in tx.outputs.iter().enumerate() {
                block_outputs.insert(OutPoint::new(tx.hash, vout as u32), output.clone());
            }
        }

        Ok(())
    }
}

impl UtxoView for Blockchain {
    fn unspent_outputs(&self, pubkey_hash: &[u8]) -> Result<Vec<Utxo>> {
        self.db.get_utxos(pubkey_hash)
    }
}
