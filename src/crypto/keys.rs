use crate::crypto::hash::{pubkey_hash, Hash256};
use crate::crypto::signatures::Signature;
use crate::{LedgerError, Result};
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone)]
pub struct PrivateKey {
    key: SecretKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key: Vec<u8>, // Compressed SEC1 encoding
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl PrivateKey {
    pub fn new() -> Result<Self> {
        let mut rng = OsRng;
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);

        Self::from_bytes(&secret_bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(LedgerError::Crypto("Private key must be 32 bytes".to_string()));
        }

        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid private key: {}", e)))?;

        Ok(Self { key: secret_key })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.secret_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key.secret_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        let public_key = Secp256k1PublicKey::from_secret_key(&secp, &self.key);

        PublicKey {
            key: public_key.serialize().to_vec(),
        }
    }

    pub fn sign(&self, message: &Hash256) -> Result<Signature> {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest_slice(message.as_bytes())
            .map_err(|e| LedgerError::Crypto(format!("Invalid message: {}", e)))?;

        let signature = secp.sign_ecdsa(&message, &self.key);
        Ok(Signature::from_secp256k1(signature))
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 33 && bytes.len() != 65 {
            return Err(LedgerError::Crypto("Invalid public key length".to_string()));
        }

        let _ = Secp256k1PublicKey::from_slice(bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            key: bytes.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn pubkey_hash(&self) -> Vec<u8> {
        pubkey_hash(&self.key)
    }

    /// Standard ECDSA verification of `signature` over the 32-byte `message` digest.
    pub fn verify(&self, message: &Hash256, signature: &Signature) -> Result<bool> {
        let secp = Secp256k1::verification_only();

        let public_key = Secp256k1PublicKey::from_slice(&self.key)
            .map_err(|e| LedgerError::Crypto(format!("Invalid public key: {}", e)))?;

        let message = Message::from_digest_slice(message.as_bytes())
            .map_err(|e| LedgerError::Crypto(format!("Invalid message: {}", e)))?;

        let secp_signature = signature.to_secp256k1()?;

        match secp.verify_ecdsa(&message, &secp_signature, &public_key) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

impl KeyPair {
    pub fn new() -> Result<Self> {
        let private_key = PrivateKey::new()?;
        Ok(Self::from_private_key(private_key))
    }

    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();

        Self {
            private_key,
            public_key,
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() -> Result<()> {
        let keypair = KeyPair::new()?;

        assert_eq!(keypair.public_key.to_bytes().len(), 33);
        assert_eq!(keypair.public_key.pubkey_hash().len(), 21);

        Ok(())
    }

    #[test]
    fn test_private_key_roundtrip() -> Result<()> {
        let private_key = PrivateKey::new()?;
        let restored_key = PrivateKey::from_bytes(&private_key.to_bytes())?;

        assert_eq!(private_key.to_bytes(), restored_key.to_bytes());
        assert_eq!(private_key.public_key(), restored_key.public_key());

        Ok(())
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(PrivateKey::from_bytes(&[0u8; 31]).is_err());
        assert!(PrivateKey::from_bytes(&[0u8; 32]).is_err());
        assert!(PublicKey::from_bytes(&[2u8; 20]).is_err());
    }

    #[test]
    fn test_verify_with_wrong_key_fails() -> Result<()> {
        let signer = KeyPair::new()?;
        let other = KeyPair::new()?;
        let message = Hash256::hash(b"transfer");

        let signature = signer.private_key.sign(&message)?;

        assert!(signer.public_key.verify(&message, &signature)?);
        assert!(!other.public_key.verify(&message, &signature)?);

        Ok(())
    }
}
