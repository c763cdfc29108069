use crate::core::codec::{Decoder, Encoder};
use crate::core::utxo::Utxo;
use crate::crypto::hash::Hash256;
use crate::crypto::keys::{PrivateKey, PublicKey};
use crate::crypto::signatures::Signature;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Fixed block reward paid by a coinbase transaction. There is no halving schedule.
pub const COINBASE_REWARD: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub txid: Hash256,
    pub vout: u32,
    pub signature: Vec<u8>,
    pub pub_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pubkey_hash: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl TxInput {
    pub fn new(txid: Hash256, vout: u32, pub_key: Vec<u8>) -> Self {
        Self {
            txid,
            vout,
            signature: Vec::new(),
            pub_key,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

impl TxOutput {
    pub fn new(value: u64, pubkey_hash: Vec<u8>) -> Self {
        Self { value, pubkey_hash }
    }

    pub fn is_locked_to(&self, pubkey_hash: &[u8]) -> bool {
        self.pubkey_hash == pubkey_hash
    }
}

impl Transaction {
    /// Reward-only transaction: no inputs and a single output.
    pub fn new_coinbase(pubkey_hash: Vec<u8>, reward: u64) -> Result<Self> {
        let mut tx = Self {
            hash: Hash256::zero(),
            inputs: Vec::new(),
            outputs: vec![TxOutput::new(reward, pubkey_hash)],
        };
        tx.hash = tx.calculate_hash()?;
        Ok(tx)
    }

    /// Spends every `selected` output: `amount` goes to `to_pkh`, any surplus returns to `from_pkh`.
    pub fn new_transfer(
        selected: &[Utxo],
        from_pkh: &[u8],
        from_pubkey: &PublicKey,
        to_pkh: &[u8],
        amount: u64,
    ) -> Result<Self> {
        if selected.is_empty() {
            return Err(LedgerError::Validation("transfer has no inputs".to_string()));
        }

        let total = selected.iter()
            .try_fold(0u64, |acc, utxo| acc.checked_add(utxo.output.value))
            .ok_or_else(|| LedgerError::Validation("input value overflow".to_string()))?;

        if total < amount {
            return Err(LedgerError::InsufficientFunds { required: amount, available: total });
        }

        let inputs = selected.iter()
            .map(|utxo| TxInput::new(utxo.txid, utxo.vout, from_pubkey.to_bytes().to_vec()))
            .collect();

        let mut outputs = vec![TxOutput::new(amount, to_pkh.to_vec())];
        if total > amount {
            outputs.push(TxOutput::new(total - amount, from_pkh.to_vec()));
        }

        let mut tx = Self {
            hash: Hash256::zero(),
            inputs,
            outputs,
        };
        tx.hash = tx.calculate_hash()?;
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty() && self.outputs.len() == 1
    }

    pub fn output_value(&self) -> Option<u64> {
        self.outputs.iter().try_fold(0u64, |acc, output| acc.checked_add(output.value))
    }

    pub fn outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.inputs.iter().map(TxInput::outpoint)
    }

    /// SHA256 over inputs and outputs with every signature cleared, so the
    /// hash is fixed before signing and can be recomputed afterwards.
    pub fn calculate_hash(&self) -> Result<Hash256> {
        let mut enc = Encoder::new();
        self.encode_body(&mut enc, true)?;
        Ok(Hash256::hash(&enc.into_bytes()))
    }

    fn encode_body(&self, enc: &mut Encoder, clear_signatures: bool) -> Result<()> {
        enc.put_len(self.inputs.len())?;
        for input in &self.inputs {
            enc.put_hash(&input.txid);
            enc.put_u32(input.vout);
            if clear_signatures {
                enc.put_bytes(&[])?;
            } else {
                enc.put_bytes(&input.signature)?;
            }
            enc.put_bytes(&input.pub_key)?;
        }

        enc.put_len(self.outputs.len())?;
        for output in &self.outputs {
            enc.put_u64(output.value);
            enc.put_bytes(&output.pubkey_hash)?;
        }

        Ok(())
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.put_hash(&self.hash);
        self.encode_body(enc, false)
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let hash = dec.get_hash()?;

        let input_count = dec.get_len()?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let txid = dec.get_hash()?;
            let vout = dec.get_u32()?;
            let signature = dec.get_bytes()?;
            let pub_key = dec.get_bytes()?;
            inputs.push(TxInput { txid, vout, signature, pub_key });
        }

        let output_count = dec.get_len()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = dec.get_u64()?;
            let pubkey_hash = dec.get_bytes()?;
            outputs.push(TxOutput { value, pubkey_hash });
        }

        Ok(Self { hash, inputs, outputs })
    }

    /// Copy with every signature cleared and input `index` carrying the
    /// spent output's public-key-hash in place of its public key.
    fn trimmed_copy(&self, index: usize, spent: &Utxo) -> Transaction {
        let mut copy = self.clone();
        for input in copy.inputs.iter_mut() {
            input.signature.clear();
        }
        copy.inputs[index].pub_key = spent.output.pubkey_hash.clone();
        copy
    }

    pub fn signature_hash(&self, index: usize, spent: &Utxo) -> Result<Hash256> {
        let copy = self.trimmed_copy(index, spent);

        let mut enc = Encoder::new();
        copy.encode_body(&mut enc, false)?;
        Ok(Hash256::hash(&enc.into_bytes()))
    }

    fn check_spent_count(&self, spent: &[Utxo]) -> Result<()> {
        if self.inputs.len() != spent.len() {
            return Err(LedgerError::InputCountMismatch {
                inputs: self.inputs.len(),
                outputs: spent.len(),
            });
        }
        Ok(())
    }

    /// Signs every input; `spent[i]` must be the output referenced by input `i`.
    pub fn sign(&mut self, private_key: &PrivateKey, spent: &[Utxo]) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        self.check_spent_count(spent)?;

        for (index, utxo) in spent.iter().enumerate() {
            if self.inputs[index].outpoint() != utxo.outpoint() {
                return Err(LedgerError::Validation(format!(
                    "input {} references {}, not {}",
                    index,
                    self.inputs[index].outpoint(),
                    utxo.outpoint()
                )));
            }

            let message = self.signature_hash(index, utxo)?;
            let signature = private_key.sign(&message)?;
            self.inputs[index].signature = signature.to_bytes();
        }

        log::debug!("✍️ Signed transaction {} ({} inputs)", self.hash, self.inputs.len());
        Ok(())
    }

    /// `Ok(false)` as soon as any input fails to verify.
    pub fn verify(&self, spent: &[Utxo]) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }
        self.check_spent_count(spent)?;

        for (index, (input, utxo)) in self.inputs.iter().zip(spent).enumerate() {
            if input.outpoint() != utxo.outpoint() {
                return Ok(false);
            }

            let public_key = match PublicKey::from_bytes(&input.pub_key) {
                Ok(key) => key,
                Err(_) => return Ok(false),
            };
            let signature = match Signature::from_bytes(&input.signature) {
                Ok(sig) => sig,
                Err(_) => return Ok(false),
            };

            let message = self.signature_hash(index, utxo)?;
            // Non-canonical signature bytes cannot verify
            if !public_key.verify(&message, &signature).unwrap_or(false) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
