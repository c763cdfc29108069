use crate::crypto::keys::{KeyPair, PrivateKey, PublicKey};
use crate::storage::Database;
use crate::wallet::address::{address_to_pubkey_hash, is_valid_address, public_key_to_address};
use crate::wallet::AddressResolver;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use sled::Tree;

const TREE_KEYSTORE: &str = "keystores";

/// Key material persisted per address.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredKey {
    private_key: Vec<u8>,
    public_key: Vec<u8>,
}

impl StoredKey {
    fn from_keypair(keypair: &KeyPair) -> Self {
        Self {
            private_key: keypair.private_key.to_bytes().to_vec(),
            public_key: keypair.public_key.to_bytes().to_vec(),
        }
    }

    fn to_keypair(&self) -> Result<KeyPair> {
        let keypair = KeyPair::from_private_key(PrivateKey::from_bytes(&self.private_key)?);
        if keypair.public_key != PublicKey::from_bytes(&self.public_key)? {
            return Err(LedgerError::Crypto("Stored public key does not match private key".to_string()));
        }
        Ok(keypair)
    }
}

/// Address book of locally generated keys, kept beside the chain in sled.
#[derive(Debug, Clone)]
pub struct Keystore {
    keys: Tree,
}

impl Keystore {
    pub fn open(db: &Database) -> Result<Self> {
        Ok(Self {
            keys: db.get_tree(TREE_KEYSTORE)?,
        })
    }

    /// Generates a key pair, stores it and returns its address.
    pub fn new_address(&self) -> Result<String> {
        let keypair = KeyPair::new()?;
        let address = public_key_to_address(keypair.public_key.to_bytes());

        let record = bincode::serialize(&StoredKey::from_keypair(&keypair))?;
        self.keys.insert(address.as_bytes(), record)
            .map_err(|e| LedgerError::Storage(format!("Failed to store key: {}", e)))?;
        self.keys.flush()
            .map_err(|e| LedgerError::Storage(format!("Failed to flush keystore: {}", e)))?;

        log::info!("🔑 Generated new address {}", address);
        Ok(address)
    }

    /// Every stored address, in key order.
    pub fn addresses(&self) -> Result<Vec<String>> {
        let mut addresses = Vec::new();
        for item in self.keys.iter() {
            let (key, _) = item
                .map_err(|e| LedgerError::Storage(format!("Failed to read keystore: {}", e)))?;
            let address = String::from_utf8(key.to_vec())
                .map_err(|e| LedgerError::Storage(format!("Corrupt keystore entry: {}", e)))?;
            addresses.push(address);
        }
        Ok(addresses)
    }

    pub fn contains(&self, address: &str) -> Result<bool> {
        self.keys.contains_key(address.as_bytes())
            .map_err(|e| LedgerError::Storage(format!("Failed to read keystore: {}", e)))
    }

    /// Hex encoding of the private key behind `address`.
    pub fn export_private_key(&self, address: &str) -> Result<String> {
        Ok(self.key_pair(address)?.private_key.to_hex())
    }

    fn load(&self, address: &str) -> Result<StoredKey> {
        let data = self.keys.get(address.as_bytes())
            .map_err(|e| LedgerError::Storage(format!("Failed to read keystore: {}", e)))?
            .ok_or_else(|| LedgerError::NotFound(format!("No key for address {}", address)))?;

        Ok(bincode::deserialize(&data)?)
    }
}

impl AddressResolver for Keystore {
    fn check_address(&self, address: &str) -> bool {
        is_valid_address(address)
    }

    fn pubkey_hash(&self, address: &str) -> Result<Vec<u8>> {
        address_to_pubkey_hash(address)
    }

    fn key_pair(&self, address: &str) -> Result<KeyPair> {
        self.load(address)?.to_keypair()
    }
}
