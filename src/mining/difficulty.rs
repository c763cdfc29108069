use crate::crypto::hash::Hash256;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) a block hash must fall under: `2^(255 - difficulty)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyTarget {
    pub difficulty: u32,
    pub target_hash: [u8; 32],
}

impl DifficultyTarget {
    pub fn new(difficulty: u32) -> Result<Self> {
        // 2^(255 - d) only exists for d in 0..=255; anything larger can never be met
        if difficulty > 255 {
            return Err(LedgerError::InvalidDifficulty(difficulty));
        }

        let bit = 255 - difficulty as usize;
        let mut target_hash = [0u8; 32];
        target_hash[31 - bit / 8] = 1 << (bit % 8);

        Ok(Self {
            difficulty,
            target_hash,
        })
    }

    /// Big-endian comparison: `hash < target`.
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        hash.as_bytes() < &self.target_hash
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.target_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_bit_position() -> Result<()> {
        let easiest = DifficultyTarget::new(0)?;
        assert_eq!(easiest.target_hash[0], 0x80);

        let default = DifficultyTarget::new(10)?;
        assert_eq!(default.target_hash[0], 0x00);
        assert_eq!(default.target_hash[1], 0x20);
        assert!(default.target_hash[2..].iter().all(|b| *b == 0));

        let hardest = DifficultyTarget::new(255)?;
        assert_eq!(hardest.target_hash[31], 0x01);
        assert!(hardest.target_hash[..31].iter().all(|b| *b == 0));

        Ok(())
    }

    #[test]
    fn test_unreachable_difficulty_rejected() {
        assert!(matches!(DifficultyTarget::new(256), Err(LedgerError::InvalidDifficulty(256))));
        assert!(DifficultyTarget::new(u32::MAX).is_err());
    }

    #[test]
    fn test_comparison_is_strict() -> Result<()> {
        let target = DifficultyTarget::new(8)?;

        let mut below = [0xFFu8; 32];
        below[0] = 0x00;
        below[1] = 0x7F;
        assert!(target.is_met_by(&Hash256::new(below)));

        let mut equal = [0u8; 32];
        equal[1] = 0x80;
        assert!(!target.is_met_by(&Hash256::new(equal)));

        let mut above = [0u8; 32];
        above[0] = 0x01;
        assert!(!target.is_met_by(&Hash256::new(above)));

        Ok(())
    }
}
