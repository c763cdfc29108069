use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub mining: MiningConfig,
    pub consensus: ConsensusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Target is 2^(255 - difficulty)
    pub difficulty: u32,
    /// Abandon a nonce search after this many seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub coinbase_reward: u64,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_dir = PathBuf::from(home_dir).join(".utxo-ledger");

        Self {
            storage: StorageConfig { data_dir },
            mining: MiningConfig {
                difficulty: crate::mining::DEFAULT_DIFFICULTY,
                timeout_secs: None,
            },
            consensus: ConsensusConfig {
                coinbase_reward: crate::core::transaction::COINBASE_REWARD,
            },
        }
    }
}

impl Config {
    /// Configuration rooted at `data_dir`, with every other value at its default.
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        let mut config = Self::default();
        config.storage.data_dir = data_dir.as_ref().to_path_buf();
        config
    }

    /// Loads `config.json` from `data_dir`, writing the defaults there on first use.
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let mut config: Config = serde_json::from_str(&content)?;
            config.storage.data_dir = data_dir.as_ref().to_path_buf();
            Ok(config)
        } else {
            let config = Self::with_data_dir(data_dir);
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.storage.data_dir)?;

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(self.config_path(), content)?;

        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.storage.data_dir.join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage.data_dir.join("chain.db")
    }
}
