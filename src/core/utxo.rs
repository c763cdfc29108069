use crate::core::transaction::{OutPoint, Transaction, TxOutput};
use crate::crypto::hash::Hash256;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One currently-unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: Hash256,
    pub vout: u32,
    pub output: TxOutput,
}

impl Utxo {
    pub fn new(txid: Hash256, vout: u32, output: TxOutput) -> Self {
        Self { txid, vout, output }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    pub fn value(&self) -> u64 {
        self.output.value
    }
}

/// Source of persisted unspent outputs, in a stable order.
pub trait UtxoView {
    fn unspent_outputs(&self, pubkey_hash: &[u8]) -> Result<Vec<Utxo>>;
}

pub fn total_value(utxos: &[Utxo]) -> u64 {
    utxos.iter().fold(0u64, |acc, utxo| acc.saturating_add(utxo.value()))
}

/// Overlays `pending` on the persisted set: outputs referenced by pending
/// inputs are dropped and unspent pending outputs locked to `pubkey_hash`
/// are appended after the persisted ones.
pub fn apply_pending(persisted: Vec<Utxo>, pubkey_hash: &[u8], pending: &[Transaction]) -> Vec<Utxo> {
    let spent: HashSet<OutPoint> = pending.iter()
        .flat_map(|tx| tx.outpoints())
        .collect();

    let mut spendable: Vec<Utxo> = persisted.into_iter()
        .filter(|utxo| !spent.contains(&utxo.outpoint()))
        .collect();

    for tx in pending {
        for (vout, output) in tx.outputs.iter().enumerate() {
            let utxo = Utxo::new(tx.hash, vout as u32, output.clone());
            if output.is_locked_to(pubkey_hash) && !spent.contains(&utxo.outpoint()) {
                spendable.push(utxo);
            }
        }
    }

    spendable
}

/// Spendable outputs of `pubkey_hash` with `pending` shadowing the persisted set.
pub fn spendable_utxos<V: UtxoView + ?Sized>(
    view: &V,
    pubkey_hash: &[u8],
    pending: &[Transaction],
) -> Result<Vec<Utxo>> {
    let persisted = view.unspent_outputs(pubkey_hash)?;
    Ok(apply_pending(persisted, pubkey_hash, pending))
}

/// Accumulates spendable outputs in order until their total exceeds `required`.
pub fn select_utxos<V: UtxoView + ?Sized>(
    view: &V,
    pubkey_hash: &[u8],
    required: u64,
    pending: &[Transaction],
) -> Result<Vec<Utxo>> {
    let spendable = spendable_utxos(view, pubkey_hash, pending)?;

    let available = total_value(&spendable);
    if available < required {
        return Err(LedgerError::InsufficientFunds { required, available });
    }

    let mut selected = Vec::new();
    let mut accumulated = 0u64;
    for utxo in spendable {
        if accumulated > required {
            break;
        }
        accumulated = accumulated.saturating_add(utxo.value());
        selected.push(utxo);
    }

    Ok(selected)
}
