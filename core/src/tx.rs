//! Transaction deserialization: full record parse and the block-mode fast
//! path. Ref: original `parser.py`.

use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::error::CoreResult;
use crate::hashes::{double_sha256, reversed_hex};

#[derive(Debug, Clone, Serialize)]
pub struct TxIn {
    pub txid: String,
    pub vout: u32,
    pub script_sig_hex: String,
    pub sequence: u32,
    #[serde(skip)]
    pub witness: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxOut {
    pub n: u32,
    pub value_sats: u64,
    pub script_pubkey_hex: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub locktime: u32,
    pub segwit: bool,
    pub txid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wtxid: Option<String>,
    pub size_bytes: usize,
    pub non_witness_size: usize,
    pub witness_size: usize,
    pub weight: usize,
    pub vbytes: usize,
}

/// Parses a full transaction from raw bytes, retaining input/output/witness
/// records. Used in transaction mode.
pub fn parse_transaction(raw: &[u8]) -> CoreResult<Transaction> {
    let mut cursor = ByteCursor::new(raw);

    let version = cursor.read_i32()?;

    let saved = cursor.offset();
    let marker = cursor.read_u8()?;
    let flag = cursor.read_u8()?;
    let is_segwit = marker == 0x00 && flag == 0x01;
    if !is_segwit {
        cursor.seek(saved);
    }

    let start_inputs = cursor.offset();

    let num_inputs = cursor.read_compact_size()?;
    let mut vin = Vec::with_capacity(num_inputs as usize);
    for _ in 0..num_inputs {
        let txid_bytes = cursor.read_hash()?;
        let txid = reversed_hex(&txid_bytes);
        let vout = cursor.read_u32()?;
        let script_sig_len = cursor.read_compact_size()?;
        let script_sig = cursor.read_bytes(script_sig_len as usize)?;
        let sequence = cursor.read_u32()?;
        vin.push(TxIn {
            txid,
            vout,
            script_sig_hex: hex::encode(&script_sig),
            sequence,
            witness: Vec::new(),
        });
    }

    let num_outputs = cursor.read_compact_size()?;
    let mut vout = Vec::with_capacity(num_outputs as usize);
    for n in 0..num_outputs {
        let value = cursor.read_u64()?;
        let script_len = cursor.read_compact_size()?;
        let script_pubkey = cursor.read_bytes(script_len as usize)?;
        vout.push(TxOut {
            n: n as u32,
            value_sats: value,
            script_pubkey_hex: hex::encode(&script_pubkey),
        });
    }

    let end_outputs = cursor.offset();

    if is_segwit {
        for input in vin.iter_mut() {
            let num_items = cursor.read_compact_size()?;
            let mut items = Vec::with_capacity(num_items as usize);
            for _ in 0..num_items {
                let item_len = cursor.read_compact_size()?;
                items.push(cursor.read_bytes(item_len as usize)?);
            }
            input.witness = items;
        }
    }

    let locktime = cursor.read_u32()?;

    let total_size = raw.len();

    let (txid, wtxid, non_witness_size, witness_size, weight) = if is_segwit {
        let mut non_witness = Vec::with_capacity(4 + (end_outputs - start_inputs) + 4);
        non_witness.extend_from_slice(&raw[0..4]);
        non_witness.extend_from_slice(&raw[start_inputs..end_outputs]);
        non_witness.extend_from_slice(&raw[raw.len() - 4..]);

        let txid = reversed_hex(&double_sha256(&non_witness));
        let wtxid = reversed_hex(&double_sha256(raw));

        let non_witness_size = non_witness.len();
        let witness_size = total_size - non_witness_size;
        let weight = non_witness_size * 4 + witness_size;
        (txid, Some(wtxid), non_witness_size, witness_size, weight)
    } else {
        let txid = reversed_hex(&double_sha256(raw));
        (txid, None, total_size, 0, total_size * 4)
    };

    let vbytes = (weight + 3) / 4;

    Ok(Transaction {
        version,
        vin,
        vout,
        locktime,
        segwit: is_segwit,
        txid,
        wtxid,
        size_bytes: total_size,
        non_witness_size,
        witness_size,
        weight,
        vbytes,
    })
}

/// A stripped-down transaction record for block-mode aggregation: no
/// input/witness bodies are materialized beyond the coinbase script-sig.
pub struct FastTx {
    pub txid: String,
    /// Internal (non-reversed) wire-order double-SHA256, as needed for
    /// Merkle tree construction. `txid` holds the display-reversed form.
    pub txid_bytes: [u8; 32],
    pub version: i32,
    pub num_inputs: u64,
    pub is_coinbase: bool,
    pub coinbase_script_sig: Vec<u8>,
    pub input_prevouts: Vec<(String, u32)>,
    pub output_values: Vec<u64>,
    pub output_scripts: Vec<Vec<u8>>,
    pub weight: usize,
    pub vbytes: usize,
}

/// Parses just enough of a transaction to drive per-block aggregation
/// (fee totals, script-type histogram, coinbase height) without building
/// full `TxIn`/witness records.
pub fn parse_transaction_fast(raw: &[u8]) -> CoreResult<FastTx> {
    let mut cursor = ByteCursor::new(raw);

    let version = cursor.read_i32()?;

    let saved = cursor.offset();
    let marker = cursor.read_u8()?;
    let flag = cursor.read_u8()?;
    let is_segwit = marker == 0x00 && flag == 0x01;
    if !is_segwit {
        cursor.seek(saved);
    }

    let start_inputs = cursor.offset();

    let num_inputs = cursor.read_compact_size()?;
    let is_coinbase = num_inputs == 1;
    let mut coinbase_script_sig = Vec::new();
    let mut input_prevouts = Vec::with_capacity(num_inputs as usize);

    for i in 0..num_inputs {
        let txid_bytes = cursor.read_hash()?;
        let txid = reversed_hex(&txid_bytes);
        let vout = cursor.read_u32()?;
        let script_sig_len = cursor.read_compact_size()?;
        let script_sig = cursor.read_bytes(script_sig_len as usize)?;
        cursor.read_u32()?; // sequence

        if i == 0 && is_coinbase && txid_bytes == [0u8; 32] && vout == 0xFFFFFFFF {
            coinbase_script_sig = script_sig;
        } else {
            input_prevouts.push((txid, vout));
        }
    }

    let num_outputs = cursor.read_compact_size()?;
    let mut output_values = Vec::with_capacity(num_outputs as usize);
    let mut output_scripts = Vec::with_capacity(num_outputs as usize);
    for _ in 0..num_outputs {
        let value = cursor.read_u64()?;
        let script_len = cursor.read_compact_size()?;
        output_values.push(value);
        output_scripts.push(cursor.read_bytes(script_len as usize)?);
    }

    let end_outputs = cursor.offset();

    if is_segwit {
        for _ in 0..num_inputs {
            let num_items = cursor.read_compact_size()?;
            for _ in 0..num_items {
                let item_len = cursor.read_compact_size()?;
                cursor.read_bytes(item_len as usize)?;
            }
        }
    }

    cursor.read_u32()?; // locktime

    let total_size = raw.len();
    let (non_witness_size, witness_size) = if is_segwit {
        let non_witness_size = 4 + (end_outputs - start_inputs) + 4;
        (non_witness_size, total_size - non_witness_size)
    } else {
        (total_size, 0)
    };
    let weight = non_witness_size * 4 + witness_size;
    let vbytes = (weight + 3) / 4;

    let txid_hash = if is_segwit {
        let mut non_witness = Vec::with_capacity(non_witness_size);
        non_witness.extend_from_slice(&raw[0..4]);
        non_witness.extend_from_slice(&raw[start_inputs..end_outputs]);
        non_witness.extend_from_slice(&raw[raw.len() - 4..]);
        double_sha256(&non_witness)
    } else {
        double_sha256(raw)
    };
    let txid = reversed_hex(&txid_hash);

    Ok(FastTx {
        txid,
        txid_bytes: txid_hash,
        version,
        num_inputs,
        is_coinbase,
        coinbase_script_sig,
        input_prevouts,
        output_values,
        output_scripts,
        weight,
        vbytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_segwit_has_no_wtxid() {
        let raw = minimal_legacy_tx();
        let tx = parse_transaction(&raw).unwrap();
        assert!(!tx.segwit);
        assert!(tx.wtxid.is_none());
        assert_eq!(tx.witness_size, 0);
        assert_eq!(tx.weight, tx.size_bytes * 4);
    }

    fn minimal_legacy_tx() -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes()); // version
        raw.push(0x01); // 1 input
        raw.extend_from_slice(&[0u8; 32]); // prevout txid
        raw.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // vout
        raw.push(0x00); // empty scriptSig
        raw.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // sequence
        raw.push(0x01); // 1 output
        raw.extend_from_slice(&5_000_000_000u64.to_le_bytes()); // value
        raw.push(0x00); // empty scriptPubKey
        raw.extend_from_slice(&0u32.to_le_bytes()); // locktime
        raw
    }

    #[test]
    fn weight_and_vbytes_formula_holds() {
        let raw = minimal_legacy_tx();
        let tx = parse_transaction(&raw).unwrap();
        assert_eq!(tx.weight, tx.non_witness_size * 4 + tx.witness_size);
        assert_eq!(tx.vbytes, (tx.weight + 3) / 4);
    }

    #[test]
    fn fast_path_matches_full_parse_txid() {
        let raw = minimal_legacy_tx();
        let full = parse_transaction(&raw).unwrap();
        let fast = parse_transaction_fast(&raw).unwrap();
        assert_eq!(full.txid, fast.txid);
        assert_eq!(full.weight, fast.weight);
    }
}
