use crate::config::MiningConfig;
use crate::core::Block;
use crate::crypto::hash::Hash256;
use crate::mining::{Consensus, DifficultyTarget, MiningControl, Seal};
use crate::{LedgerError, Result};
use std::time::Instant;

/// Hashes between cancellation/deadline checks.
const CHECK_INTERVAL: u64 = 4096;

#[derive(Debug, Clone)]
pub struct ProofOfWork {
    target: DifficultyTarget,
    control: MiningControl,
}

impl ProofOfWork {
    pub fn new(difficulty: u32) -> Result<Self> {
        Ok(Self {
            target: DifficultyTarget::new(difficulty)?,
            control: MiningControl::new(),
        })
    }

    pub fn with_control(difficulty: u32, control: MiningControl) -> Result<Self> {
        Ok(Self {
            target: DifficultyTarget::new(difficulty)?,
            control,
        })
    }

    pub fn from_config(config: &MiningConfig) -> Result<Self> {
        Self::with_control(config.difficulty, MiningControl::from_config(config))
    }

    pub fn difficulty(&self) -> u32 {
        self.target.difficulty
    }

    pub fn target(&self) -> &DifficultyTarget {
        &self.target
    }

    pub fn control(&self) -> &MiningControl {
        &self.control
    }
}

impl Consensus for ProofOfWork {
    fn name(&self) -> &'static str {
        "proof-of-work"
    }

    fn seal(&self, block: &Block) -> Result<Seal> {
        let mut data = block.serialize()?;
        let nonce_range = Block::NONCE_OFFSET..Block::NONCE_OFFSET + 8;
        let started = Instant::now();
        let mut nonce = 0u64;

        loop {
            data[nonce_range.clone()].copy_from_slice(&nonce.to_be_bytes());
            let hash = Hash256::hash(&data);

            if self.target.is_met_by(&hash) {
                log::debug!(
                    "⛏️ Sealed block {} with nonce {} after {:?}",
                    block.height,
                    nonce,
                    started.elapsed()
                );
                return Ok(Seal { hash, nonce });
            }

            if nonce % CHECK_INTERVAL == 0 {
                self.control.check(started)?;
            }

            nonce = nonce.checked_add(1)
                .ok_or_else(|| LedgerError::Mining("nonce space exhausted".to_string()))?;
        }
    }

    fn validate(&self, block: &Block) -> Result<bool> {
        let hash = block.calculate_hash()?;
        Ok(hash == block.hash && self.target.is_met_by(&hash))
    }

    fn control(&self) -> Option<&MiningControl> {
        Some(&self.control)
    }
}
