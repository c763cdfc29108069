use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Double spend detected: {0}")]
    DoubleSpend(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    #[error("Input count mismatch: {inputs} inputs, {outputs} referenced outputs")]
    InputCountMismatch { inputs: usize, outputs: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Mining error: {0}")]
    Mining(String),

    #[error("Invalid difficulty {0}: target would be unreachable")]
    InvalidDifficulty(u32),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(format!("bincode: {}", err))
    }
}
