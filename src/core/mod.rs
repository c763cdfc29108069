//! Core ledger components

pub mod block;
pub mod blockchain;
pub mod codec;
pub mod cursor;
pub mod ledger;
pub mod transaction;
pub mod utxo;

pub use block::Block;
pub use blockchain::Blockchain;
pub use cursor::{BlockIter, ChainCursor};
pub use ledger::{Ledger, Transfer};
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};
pub use utxo::{Utxo, UtxoView};
