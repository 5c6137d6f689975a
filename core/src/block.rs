//! `blk*.dat`/`rev*.dat` framing, XOR de-obfuscation, block-to-undo
//! matching, Merkle root recomputation, and per-block aggregation.
//! Ref: original `block.py`.

use std::collections::HashMap;

use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::error::{CoreError, CoreResult};
use crate::hashes::double_sha256;
use crate::script::classify_output;
use crate::tx::parse_transaction_fast;
use crate::undo::{parse_undo_data, PrevoutRecord};

pub const BLOCK_MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

/// Reverses `key` across `data` in place; a zero-length or all-zero key is
/// a no-op (unobfuscated legacy datadirs).
pub fn xor_decode(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() || key.iter().all(|&b| b == 0) {
        return data.to_vec();
    }
    data.iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[i % key.len()])
        .collect()
}

/// Pairwise double-SHA256 with duplicate-last-on-odd-length, per the
/// classic Bitcoin Merkle tree construction.
pub fn compute_merkle_root(txid_hashes: &[[u8; 32]]) -> [u8; 32] {
    if txid_hashes.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<[u8; 32]> = txid_hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().unwrap();
            level.push(last);
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut concat = Vec::with_capacity(64);
            concat.extend_from_slice(&pair[0]);
            concat.extend_from_slice(&pair[1]);
            next.push(double_sha256(&concat));
        }
        level = next;
    }
    level[0]
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: String,
    pub merkle_root: String,
    pub timestamp: u32,
    pub bits: String,
    pub nonce: u32,
    pub block_hash: String,
    pub merkle_root_valid: bool,
}

fn parse_block_header(cursor: &mut ByteCursor, txid_hashes: &[[u8; 32]]) -> CoreResult<BlockHeader> {
    let header_start = cursor.offset();
    let version = cursor.read_i32()?;
    let prev_block = cursor.read_hash()?;
    let merkle_root = cursor.read_hash()?;
    let timestamp = cursor.read_u32()?;
    let bits = cursor.read_u32()?;
    let nonce = cursor.read_u32()?;
    let header_bytes = &cursor.data()[header_start..cursor.offset()];
    let block_hash = double_sha256(header_bytes);

    let computed_merkle = compute_merkle_root(txid_hashes);
    let merkle_root_valid = computed_merkle == merkle_root;

    Ok(BlockHeader {
        version,
        prev_block_hash: crate::hashes::reversed_hex(&prev_block),
        merkle_root: crate::hashes::reversed_hex(&merkle_root),
        timestamp,
        bits: format!("{:08x}", bits),
        nonce,
        block_hash: crate::hashes::reversed_hex(&block_hash),
        merkle_root_valid,
    })
}

/// Advances the cursor over one transaction without building any record,
/// returning the byte range it occupied (for pass-1 scanning).
fn skip_transaction(cursor: &mut ByteCursor) -> CoreResult<(usize, usize)> {
    let start = cursor.offset();
    cursor.read(4)?; // version

    let saved = cursor.offset();
    let marker = cursor.read_u8()?;
    let flag = cursor.read_u8()?;
    let is_segwit = marker == 0x00 && flag == 0x01;
    if !is_segwit {
        cursor.seek(saved);
    }

    let num_inputs = cursor.read_compact_size()?;
    for _ in 0..num_inputs {
        cursor.read(36)?; // txid + vout
        let sl = cursor.read_compact_size()?;
        cursor.read(sl as usize + 4)?; // scriptSig + sequence
    }

    let num_outputs = cursor.read_compact_size()?;
    for _ in 0..num_outputs {
        cursor.read(8)?; // value
        let sl = cursor.read_compact_size()?;
        cursor.read(sl as usize)?;
    }

    if is_segwit {
        for _ in 0..num_inputs {
            let ni = cursor.read_compact_size()?;
            for _ in 0..ni {
                let il = cursor.read_compact_size()?;
                cursor.read(il as usize)?;
            }
        }
    }

    cursor.read(4)?; // locktime
    Ok((start, cursor.offset()))
}

/// BIP34 coinbase height: `script[0]` is the declared length (1..=8),
/// clamped to what's actually present, interpreted little-endian.
pub fn decode_bip34_height(script_sig: &[u8]) -> u64 {
    if script_sig.is_empty() {
        return 0;
    }
    let mut height_len = script_sig[0] as usize;
    if height_len == 0 || height_len > 8 {
        return 0;
    }
    if height_len > script_sig.len() - 1 {
        height_len = script_sig.len() - 1;
    }
    let mut value: u64 = 0;
    for (i, &b) in script_sig[1..1 + height_len].iter().enumerate() {
        value |= (b as u64) << (8 * i);
    }
    value
}

struct BlockInfo {
    data_start: usize,
    block_size: u32,
    num_txs: u64,
    tx_ranges: Vec<(usize, usize)>,
}

fn scan_blocks(blk_data: &[u8]) -> CoreResult<Vec<BlockInfo>> {
    let mut cursor = ByteCursor::new(blk_data);
    let mut infos = Vec::new();

    while cursor.has_more() && cursor.remaining() >= 8 {
        let magic = cursor.read_bytes(4)?;
        if magic != BLOCK_MAGIC {
            break;
        }
        let block_size = cursor.read_u32()?;
        let data_start = cursor.offset();
        cursor.read(80)?; // header
        let num_txs = cursor.read_compact_size()?;
        let mut tx_ranges = Vec::with_capacity(num_txs as usize);
        for _ in 0..num_txs {
            tx_ranges.push(skip_transaction(&mut cursor)?);
        }
        infos.push(BlockInfo {
            data_start,
            block_size,
            num_txs,
            tx_ranges,
        });
        cursor.seek(data_start + block_size as usize);
    }

    Ok(infos)
}

fn pre_parse_rev_blocks(rev_data: &[u8]) -> CoreResult<Vec<(u64, Vec<u8>)>> {
    let mut cursor = ByteCursor::new(rev_data);
    let mut rev_blocks = Vec::new();

    while cursor.has_more() && cursor.remaining() >= 8 {
        let magic = cursor.read_bytes(4)?;
        if magic != BLOCK_MAGIC {
            break;
        }
        let rev_size = cursor.read_u32()?;
        let data_start = cursor.offset();
        let num_txundo = cursor.read_compact_size()?;
        cursor.seek(data_start);
        let raw_data = cursor.read_bytes(rev_size as usize)?;
        if cursor.remaining() >= 32 {
            cursor.read_bytes(32)?; // checksum, unverified
        }
        rev_blocks.push((num_txundo, raw_data));
    }

    Ok(rev_blocks)
}

/// Matches each blk block to the earliest not-yet-used rev block whose
/// non-coinbase tx count matches. Flagged in the spec as fragile: two
/// blocks with identical non-coinbase counts are disambiguated only by
/// file order, not by any content check.
fn match_rev_blocks(blk_tx_counts: &[u64], rev_blocks: &[(u64, Vec<u8>)]) -> CoreResult<Vec<Option<usize>>> {
    let mut rev_by_count: HashMap<u64, Vec<usize>> = HashMap::new();
    for (idx, (count, _)) in rev_blocks.iter().enumerate() {
        rev_by_count.entry(*count).or_default().push(idx);
    }

    let mut matched = vec![None; blk_tx_counts.len()];
    let mut used = vec![false; rev_blocks.len()];

    for (blk_idx, &num_txs) in blk_tx_counts.iter().enumerate() {
        let non_cb = num_txs - 1;
        if let Some(candidates) = rev_by_count.get(&non_cb) {
            for &rev_idx in candidates {
                if !used[rev_idx] {
                    matched[blk_idx] = Some(rev_idx);
                    used[rev_idx] = true;
                    break;
                }
            }
        }
        if matched[blk_idx].is_none() && non_cb > 0 {
            return Err(CoreError::BlockUndoMismatch {
                block_index: blk_idx,
                non_coinbase_txs: non_cb,
            });
        }
    }

    Ok(matched)
}

#[derive(Debug, Clone, Serialize)]
pub struct CoinbaseInfo {
    pub bip34_height: u64,
    pub coinbase_script_hex: String,
    pub total_output_sats: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxOutSummary {
    pub script_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedTx {
    pub txid: String,
    pub version: i32,
    pub vin_count: u64,
    pub vout: Vec<TxOutSummary>,
    pub fee_sats: i64,
    pub weight: usize,
    pub vbytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockStats {
    pub total_fees_sats: i64,
    pub total_weight: usize,
    pub avg_fee_rate_sat_vb: f64,
    pub script_type_summary: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockResult {
    pub ok: bool,
    pub mode: &'static str,
    pub block_header: BlockHeader,
    pub tx_count: u64,
    pub coinbase: Option<CoinbaseInfo>,
    pub transactions: Vec<AnalyzedTx>,
    pub block_stats: BlockStats,
}

pub struct BlockSummary {
    pub block_hash: String,
    pub tx_count: u64,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Parses every block in `blk_data`/`rev_data` (already XOR-decoded) and
/// invokes `on_block` once per finished block so the caller can flush the
/// result and drop it before the next block is built.
pub fn parse_block_file(
    blk_data: &[u8],
    rev_data: &[u8],
    mut on_block: impl FnMut(&BlockResult) -> CoreResult<()>,
) -> CoreResult<Vec<BlockSummary>> {
    let block_infos = scan_blocks(blk_data)?;
    let rev_blocks = pre_parse_rev_blocks(rev_data)?;
    log::info!(
        "scanned {} blocks, {} undo records",
        block_infos.len(),
        rev_blocks.len()
    );

    let blk_tx_counts: Vec<u64> = block_infos.iter().map(|b| b.num_txs).collect();
    let matched_rev = match_rev_blocks(&blk_tx_counts, &rev_blocks)?;

    let mut summaries = Vec::with_capacity(block_infos.len());

    for (blk_idx, info) in block_infos.iter().enumerate() {
        let mut header_cursor = ByteCursor::new(blk_data);
        header_cursor.seek(info.data_start);

        let mut txid_hashes = Vec::with_capacity(info.tx_ranges.len());
        let mut fast_txs = Vec::with_capacity(info.tx_ranges.len());
        for &(start, end) in &info.tx_ranges {
            let fast = parse_transaction_fast(&blk_data[start..end])?;
            txid_hashes.push(fast.txid_bytes);
            fast_txs.push(fast);
        }

        let header = parse_block_header(&mut header_cursor, &txid_hashes)?;
        log::debug!("block {blk_idx} hash={} txs={}", header.block_hash, info.num_txs);
        if !header.merkle_root_valid {
            log::warn!("merkle root mismatch for block {}", header.block_hash);
        }

        let undo_prevouts: Vec<Vec<PrevoutRecord>> = match matched_rev[blk_idx] {
            Some(rev_idx) if info.num_txs > 1 => {
                let mut rev_cursor = ByteCursor::new(&rev_blocks[rev_idx].1);
                parse_undo_data(&mut rev_cursor)?
            }
            _ => Vec::new(),
        };

        let mut analyzed_txs = Vec::with_capacity(fast_txs.len());
        let mut coinbase_info = None;
        let mut total_fees: i64 = 0;
        let mut total_weight: usize = 0;
        let mut script_type_counts: HashMap<String, u64> = HashMap::new();

        for (tx_idx, fast) in fast_txs.iter().enumerate() {
            let total_output_sats: u64 = fast.output_values.iter().sum();
            let out_types: Vec<_> = fast
                .output_scripts
                .iter()
                .map(|s| classify_output(s))
                .collect();

            let is_coinbase = tx_idx == 0;
            let fee_sats = if is_coinbase {
                let bip34_height = decode_bip34_height(&fast.coinbase_script_sig);
                coinbase_info = Some(CoinbaseInfo {
                    bip34_height,
                    coinbase_script_hex: hex::encode(&fast.coinbase_script_sig),
                    total_output_sats,
                });
                0
            } else {
                let undo_idx = tx_idx - 1;
                let prevouts = undo_prevouts.get(undo_idx).cloned().unwrap_or_default();
                let total_input_sats: u64 = prevouts.iter().map(|p| p.value_sats).sum();
                let fee = total_input_sats as i64 - total_output_sats as i64;
                total_fees += fee;
                fee
            };

            total_weight += fast.weight;
            for st in &out_types {
                *script_type_counts.entry(st.as_str().to_string()).or_insert(0) += 1;
            }

            analyzed_txs.push(AnalyzedTx {
                txid: fast.txid.clone(),
                version: fast.version,
                vin_count: fast.num_inputs,
                vout: out_types
                    .iter()
                    .map(|st| TxOutSummary {
                        script_type: st.as_str().to_string(),
                    })
                    .collect(),
                fee_sats,
                weight: fast.weight,
                vbytes: fast.vbytes,
            });
        }

        let total_vbytes_non_coinbase: usize = if info.num_txs > 1 {
            analyzed_txs[1..].iter().map(|t| t.vbytes).sum()
        } else {
            0
        };
        let avg_fee_rate_sat_vb = if total_vbytes_non_coinbase > 0 {
            round1(total_fees as f64 / total_vbytes_non_coinbase as f64)
        } else {
            0.0
        };

        let block_result = BlockResult {
            ok: true,
            mode: "block",
            block_header: header,
            tx_count: info.num_txs,
            coinbase: coinbase_info,
            transactions: analyzed_txs,
            block_stats: BlockStats {
                total_fees_sats: total_fees,
                total_weight,
                avg_fee_rate_sat_vb,
                script_type_summary: script_type_counts,
            },
        };

        on_block(&block_result)?;

        summaries.push(BlockSummary {
            block_hash: block_result.block_header.block_hash.clone(),
            tx_count: info.num_txs,
        });
    }

    Ok(summaries)
}
