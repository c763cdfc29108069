use crate::core::Block;
use crate::crypto::hash::Hash256;
use crate::storage::Database;
use crate::{LedgerError, Result};

/// Restartable walk from a starting hash back towards genesis.
///
/// The cursor holds nothing but the hash of the block it will yield next,
/// so it can be cloned, stored and resumed against the same database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainCursor {
    next: Option<Hash256>,
}

impl ChainCursor {
    pub fn new(start: Hash256) -> Self {
        Self { next: Some(start) }
    }

    /// A cursor that yields nothing, used for a chain without genesis.
    pub fn empty() -> Self {
        Self { next: None }
    }

    pub fn position(&self) -> Option<Hash256> {
        self.next
    }

    /// Whether the block the cursor points at exists in `db`.
    pub fn has_next(&self, db: &Database) -> Result<bool> {
        match &self.next {
            Some(hash) => db.contains_block(hash),
            None => Ok(false),
        }
    }

    /// Yields the current block and steps to its predecessor. Stops after height 0.
    pub fn next(&mut self, db: &Database) -> Result<Block> {
        let hash = self.next
            .ok_or_else(|| LedgerError::NotFound("cursor is past genesis".to_string()))?;

        let block = db.get_block(&hash)?
            .ok_or_else(|| LedgerError::NotFound(format!("block {}", hash)))?;

        self.next = if block.is_genesis() { None } else { Some(block.prev_hash) };
        Ok(block)
    }
}

/// [`ChainCursor`] bound to a database as a standard iterator.
pub struct BlockIter<'a> {
    db: &'a Database,
    cursor: ChainCursor,
    failed: bool,
}

impl<'a> BlockIter<'a> {
    pub fn new(db: &'a Database, cursor: ChainCursor) -> Self {
        Self { db, cursor, failed: false }
    }

    pub fn cursor(&self) -> ChainCursor {
        self.cursor
    }
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.position().is_none() {
            return None;
        }

        // A broken link ends the walk after reporting it once
        match self.cursor.next(self.db) {
            Ok(block) => Some(Ok(block)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
