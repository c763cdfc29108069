use crate::core::utxo::{self, Utxo};
use crate::core::{Block, Blockchain, Transaction};
use crate::wallet::AddressResolver;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// One requested payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub amount: u64,
}

impl Transfer {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: u64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }
}

/// Address-level operations over a chain, resolving addresses and keys
/// through an injected [`AddressResolver`].
pub struct Ledger<'a, R: AddressResolver + ?Sized> {
    chain: &'a Blockchain,
    resolver: &'a R,
}

impl<'a, R: AddressResolver + ?Sized> Ledger<'a, R> {
    pub fn new(chain: &'a Blockchain, resolver: &'a R) -> Self {
        Self { chain, resolver }
    }

    pub fn chain(&self) -> &Blockchain {
        self.chain
    }

    fn resolve(&self, address: &str) -> Result<Vec<u8>> {
        if !self.resolver.check_address(address) {
            return Err(LedgerError::Validation(format!("Invalid address: {}", address)));
        }
        self.resolver.pubkey_hash(address)
    }

    /// Reward-only transaction paying the configured reward to `address`.
    pub fn create_coinbase(&self, address: &str) -> Result<Transaction> {
        let pubkey_hash = self.resolve(address)?;
        Transaction::new_coinbase(pubkey_hash, self.chain.coinbase_reward())
    }

    pub fn select_utxos(&self, address: &str, required: u64, pending: &[Transaction]) -> Result<Vec<Utxo>> {
        let pubkey_hash = self.resolve(address)?;
        utxo::select_utxos(self.chain, &pubkey_hash, required, pending)
    }

    /// Builds and signs a payment from `from` to `to`, treating `pending` as
    /// already applied.
    pub fn create_transfer(&self, from: &str, to: &str, amount: u64, pending: &[Transaction]) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::Validation("Amount must be positive".to_string()));
        }
        if from == to {
            return Err(LedgerError::Validation("Sender and recipient are the same address".to_string()));
        }

        let from_pkh = self.resolve(from)?;
        let to_pkh = self.resolve(to)?;

        let keypair = self.resolver.key_pair(from)?;
        if keypair.public_key.pubkey_hash() != from_pkh {
            return Err(LedgerError::Validation(format!("Key for {} does not match the address", from)));
        }

        let selected = utxo::select_utxos(self.chain, &from_pkh, amount, pending)?;
        let mut tx = Transaction::new_transfer(&selected, &from_pkh, &keypair.public_key, &to_pkh, amount)?;
        tx.sign(&keypair.private_key, &selected)?;

        log::debug!("💸 Built transfer {} of {} from {} to {}", tx.hash, amount, from, to);
        Ok(tx)
    }

    pub fn balance(&self, address: &str, pending: &[Transaction]) -> Result<u64> {
        let pubkey_hash = self.resolve(address)?;
        self.chain.balance(&pubkey_hash, pending)
    }

    pub fn utxos_with_balance(&self, address: &str, pending: &[Transaction]) -> Result<(u64, Vec<Utxo>)> {
        let pubkey_hash = self.resolve(address)?;
        self.chain.utxos_with_balance(&pubkey_hash, pending)
    }

    /// Genesis paying the reward to `address`; returns the existing head block
    /// when the chain is already initialised.
    pub fn create_genesis(&self, address: &str) -> Result<Block> {
        let coinbase = self.create_coinbase(address)?;
        self.chain.create_genesis(vec![coinbase])
    }

    /// Builds every transfer in order, each seeing the earlier ones as pending,
    /// and commits them together in one mined block.
    pub fn send(&self, transfers: &[Transfer]) -> Result<Block> {
        if transfers.is_empty() {
            return Err(LedgerError::Validation("No transfers given".to_string()));
        }

        let mut pending = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            let tx = self.create_transfer(&transfer.from, &transfer.to, transfer.amount, &pending)?;
            pending.push(tx);
        }

        self.chain.commit_block(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::mining::ProofOfWork;
    use crate::storage::Database;
    use crate::wallet::address::{address_to_pubkey_hash, is_valid_address, public_key_to_address};
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryResolver {
        keys: HashMap<String, KeyPair>,
    }

    impl MemoryResolver {
        fn add(&mut self) -> Result<String> {
            let keypair = KeyPair::new()?;
            let address = public_key_to_address(keypair.public_key.to_bytes());
            self.keys.insert(address.clone(), keypair);
            Ok(address)
        }
    }

    impl AddressResolver for MemoryResolver {
        fn check_address(&self, address: &str) -> bool {
            is_valid_address(address)
        }

        fn pubkey_hash(&self, address: &str) -> Result<Vec<u8>> {
            address_to_pubkey_hash(address)
        }

        fn key_pair(&self, address: &str) -> Result<KeyPair> {
            self.keys.get(address)
                .cloned()
                .ok_or_else(|| LedgerError::NotFound(format!("key for {}", address)))
        }
    }

    fn test_chain(temp_dir: &TempDir) -> Result<Blockchain> {
        let db = Database::new(temp_dir.path().join("chain.db"))?;
        Ok(Blockchain::with_engine(db, Box::new(ProofOfWork::new(4)?), 50))
    }

    #[test]
    fn test_genesis_and_send() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let chain = test_chain(&temp_dir)?;
        let mut resolver = MemoryResolver::default();
        let alice = resolver.add()?;
        let bob = resolver.add()?;
        let ledger = Ledger::new(&chain, &resolver);

        ledger.create_genesis(&alice)?;
        assert_eq!(ledger.balance(&alice, &[])?, 50);
        assert_eq!(ledger.balance(&bob, &[])?, 0);

        let block = ledger.send(&[Transfer::new(alice.as_str(), bob.as_str(), 20)])?;
        assert_eq!(block.height, 1);
        assert_eq!(ledger.balance(&alice, &[])?, 30);
        assert_eq!(ledger.balance(&bob, &[])?, 20);

        Ok(())
    }

    #[test]
    fn test_batch_send_uses_pending_overlay() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let chain = test_chain(&temp_dir)?;
        let mut resolver = MemoryResolver::default();
        let alice = resolver.add()?;
        let bob = resolver.add()?;
        let carol = resolver.add()?;
        let ledger = Ledger::new(&chain, &resolver);
        ledger.create_genesis(&alice)?;

        let block = ledger.send(&[
            Transfer::new(alice.as_str(), bob.as_str(), 20),
            Transfer::new(alice.as_str(), carol.as_str(), 10),
            Transfer::new(bob.as_str(), carol.as_str(), 5),
        ])?;

        assert_eq!(block.transactions.len(), 3);
        assert_eq!(ledger.balance(&alice, &[])?, 20);
        assert_eq!(ledger.balance(&bob, &[])?, 15);
        assert_eq!(ledger.balance(&carol, &[])?, 15);

        Ok(())
    }

    #[test]
    fn test_overspend_in_batch_fails_without_commit() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let chain = test_chain(&temp_dir)?;
        let mut resolver = MemoryResolver::default();
        let alice = resolver.add()?;
        let bob = resolver.add()?;
        let ledger = Ledger::new(&chain, &resolver);
        ledger.create_genesis(&alice)?;
        let head = chain.head()?;

        let err = ledger.send(&[
            Transfer::new(alice.as_str(), bob.as_str(), 30),
            Transfer::new(alice.as_str(), bob.as_str(), 30),
        ]).unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { required: 30, available: 20 }));
        assert_eq!(chain.head()?, head);
        assert_eq!(ledger.balance(&alice, &[])?, 50);

        Ok(())
    }

    #[test]
    fn test_transfer_input_checks() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let chain = test_chain(&temp_dir)?;
        let mut resolver = MemoryResolver::default();
        let alice = resolver.add()?;
        let ledger = Ledger::new(&chain, &resolver);
        ledger.create_genesis(&alice)?;

        // Valid address with no key in the resolver
        let stranger = public_key_to_address(KeyPair::new()?.public_key.to_bytes());

        assert!(matches!(ledger.create_transfer(&alice, &alice, 5, &[]), Err(LedgerError::Validation(_))));
        assert!(matches!(ledger.create_transfer(&alice, &stranger, 0, &[]), Err(LedgerError::Validation(_))));
        assert!(matches!(ledger.create_transfer(&alice, "not-an-address", 5, &[]), Err(LedgerError::Validation(_))));
        assert!(matches!(ledger.create_transfer(&stranger, &alice, 5, &[]), Err(LedgerError::NotFound(_))));
        assert!(matches!(ledger.send(&[]), Err(LedgerError::Validation(_))));

        Ok(())
    }

    #[test]
    fn test_coinbase_uses_configured_reward() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("chain.db"))?;
        let chain = Blockchain::with_engine(db, Box::new(ProofOfWork::new(4)?), 75);
        let mut resolver = MemoryResolver::default();
        let alice = resolver.add()?;
        let ledger = Ledger::new(&chain, &resolver);

        let coinbase = ledger.create_coinbase(&alice)?;
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.outputs[0].value, 75);

        ledger.create_genesis(&alice)?;
        let (balance, utxos) = ledger.utxos_with_balance(&alice, &[])?;
        assert_eq!(balance, 75);
        assert_eq!(utxos.len(), 1);
        assert_eq!(ledger.select_utxos(&alice, 75, &[])?, utxos);

        Ok(())
    }
}
