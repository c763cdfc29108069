//! Block admission: the consensus strategy trait and its proof-of-work engine

pub mod pow;
pub mod difficulty;

pub use pow::ProofOfWork;
pub use difficulty::DifficultyTarget;

use crate::config::MiningConfig;
use crate::core::Block;
use crate::crypto::hash::Hash256;
use crate::{LedgerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_DIFFICULTY: u32 = 10;

/// Result of admitting a candidate block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    pub hash: Hash256,
    pub nonce: u64,
}

/// Admission scheme deciding which candidate blocks may join the chain.
pub trait Consensus: Send + Sync {
    fn name(&self) -> &'static str;

    /// Finds the nonce admitting `block`; every other field is taken as fixed.
    fn seal(&self, block: &Block) -> Result<Seal>;

    /// Whether an already-sealed block satisfies this scheme.
    fn validate(&self, block: &Block) -> Result<bool>;

    /// Handle for abandoning a running [`Consensus::seal`], if the scheme has one.
    fn control(&self) -> Option<&MiningControl> {
        None
    }
}

/// Cancellation flag and optional deadline shared with a running search.
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    cancelled: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

impl MiningControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            timeout: Some(timeout),
        }
    }

    /// Control carrying the configured search timeout, if any.
    pub fn from_config(config: &MiningConfig) -> Self {
        match config.timeout_secs {
            Some(secs) => Self::with_timeout(Duration::from_secs(secs)),
            None => Self::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Flag another thread can set to abandon the search.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn check(&self, started: Instant) -> Result<()> {
        if self.is_cancelled() {
            return Err(LedgerError::Mining("nonce search cancelled".to_string()));
        }
        if let Some(timeout) = self.timeout {
            if started.elapsed() >= timeout {
                return Err(LedgerError::Mining(format!(
                    "nonce search timed out after {:?}",
                    timeout
                )));
            }
        }
        Ok(())
    }
}
