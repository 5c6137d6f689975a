//! Assembles the transaction-mode success envelope: binds prevouts to
//! inputs, classifies every input/output, and runs fee/locktime/warning
//! analysis. Ref: original `main.py::analyze_transaction`.

use std::collections::HashSet;

use serde::Serialize;

use crate::address::derive_address;
use crate::analysis::{
    analyze_relative_timelock, classify_locktime, compute_fees, compute_segwit_savings,
    detect_rbf, generate_warnings, LocktimeType, OutputForWarnings, RelativeTimelockKind,
    SegwitSavings, Warning,
};
use crate::error::{CoreError, CoreResult};
use crate::script::{classify_input, classify_output, decode_op_return, disassemble, InputType, ScriptType};
use crate::tx::parse_transaction;

/// One `{txid, vout, value_sats, script_pubkey_hex}` entry as supplied by
/// a transaction-mode fixture.
pub struct PrevoutInput {
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
    pub script_pubkey_hex: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrevoutSummary {
    pub value_sats: u64,
    pub script_pubkey_hex: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelativeTimelockSummary {
    pub enabled: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<RelativeTimelockKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VinEntry {
    pub txid: String,
    pub vout: u32,
    pub sequence: u32,
    pub script_sig_hex: String,
    pub script_asm: String,
    pub witness: Vec<String>,
    pub script_type: InputType,
    pub address: Option<String>,
    pub prevout: PrevoutSummary,
    pub relative_timelock: RelativeTimelockSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness_script_asm: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoutEntry {
    pub n: u32,
    pub value_sats: u64,
    pub script_pubkey_hex: String,
    pub script_asm: String,
    pub script_type: ScriptType,
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_data_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_data_utf8: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_protocol: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxAnalysis {
    pub ok: bool,
    pub network: String,
    pub segwit: bool,
    pub txid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wtxid: Option<String>,
    pub version: i32,
    pub locktime: u32,
    pub size_bytes: usize,
    pub weight: usize,
    pub vbytes: usize,
    pub total_input_sats: u64,
    pub total_output_sats: u64,
    pub fee_sats: i64,
    pub fee_rate_sat_vb: f64,
    pub rbf_signaling: bool,
    pub locktime_type: LocktimeType,
    pub locktime_value: u32,
    pub segwit_savings: Option<SegwitSavings>,
    pub vin: Vec<VinEntry>,
    pub vout: Vec<VoutEntry>,
    pub warnings: Vec<Warning>,
}

pub fn analyze_transaction(raw: &[u8], prevouts: &[PrevoutInput], network: &str) -> CoreResult<TxAnalysis> {
    let tx = parse_transaction(raw)?;

    let mut prevout_map: std::collections::HashMap<(String, u32), &PrevoutInput> =
        std::collections::HashMap::new();
    for p in prevouts {
        let key = (p.txid.clone(), p.vout);
        if prevout_map.insert(key.clone(), p).is_some() {
            return Err(CoreError::DuplicatePrevout {
                txid: key.0,
                vout: key.1,
            });
        }
    }

    let mut total_input_sats: u64 = 0;
    let mut bound_prevouts = Vec::with_capacity(tx.vin.len());
    for input in &tx.vin {
        let key = (input.txid.clone(), input.vout);
        let prevout = prevout_map.get(&key).ok_or_else(|| CoreError::MissingPrevout {
            txid: key.0.clone(),
            vout: key.1,
        })?;
        total_input_sats += prevout.value_sats;
        bound_prevouts.push(*prevout);
    }

    let used_keys: HashSet<(String, u32)> = tx.vin.iter().map(|i| (i.txid.clone(), i.vout)).collect();
    for key in prevout_map.keys() {
        if !used_keys.contains(key) {
            return Err(CoreError::UnusedPrevout {
                txid: key.0.clone(),
                vout: key.1,
            });
        }
    }

    let mut total_output_sats: u64 = 0;
    let mut vout_result = Vec::with_capacity(tx.vout.len());
    for out in &tx.vout {
        let script = hex::decode(&out.script_pubkey_hex)?;
        let script_type = classify_output(&script);
        let address = derive_address(script_type, &script);
        total_output_sats += out.value_sats;

        let (op_return_data_hex, op_return_data_utf8, op_return_protocol) =
            if script_type == ScriptType::OpReturn {
                let decoded = decode_op_return(&script);
                (
                    Some(hex::encode(&decoded.data)),
                    decoded.data_utf8,
                    Some(decoded.protocol),
                )
            } else {
                (None, None, None)
            };

        vout_result.push(VoutEntry {
            n: out.n,
            value_sats: out.value_sats,
            script_pubkey_hex: out.script_pubkey_hex.clone(),
            script_asm: disassemble(&script),
            script_type,
            address,
            op_return_data_hex,
            op_return_data_utf8,
            op_return_protocol,
        });
    }

    let mut vin_result = Vec::with_capacity(tx.vin.len());
    for (input, prevout) in tx.vin.iter().zip(bound_prevouts.iter()) {
        let prevout_script = hex::decode(&prevout.script_pubkey_hex)?;
        let script_sig = hex::decode(&input.script_sig_hex)?;
        let input_type = classify_input(&prevout_script, &script_sig, &input.witness);
        let prevout_type = classify_output(&prevout_script);
        let address = derive_address(prevout_type, &prevout_script);

        let timelock = analyze_relative_timelock(input.sequence);

        let witness_script_asm = if matches!(input_type, InputType::P2wsh | InputType::P2shP2wsh)
            && !input.witness.is_empty()
        {
            input.witness.last().map(|script| disassemble(script))
        } else {
            None
        };

        vin_result.push(VinEntry {
            txid: input.txid.clone(),
            vout: input.vout,
            sequence: input.sequence,
            script_sig_hex: input.script_sig_hex.clone(),
            script_asm: disassemble(&script_sig),
            witness: input.witness.iter().map(hex::encode).collect(),
            script_type: input_type,
            address,
            prevout: PrevoutSummary {
                value_sats: prevout.value_sats,
                script_pubkey_hex: prevout.script_pubkey_hex.clone(),
            },
            relative_timelock: RelativeTimelockSummary {
                enabled: timelock.enabled,
                r#type: timelock.kind,
                value: timelock.value,
            },
            witness_script_asm,
        });
    }

    let fees = compute_fees(total_input_sats, total_output_sats, tx.vbytes);
    let sequences: Vec<u32> = tx.vin.iter().map(|i| i.sequence).collect();
    let rbf = detect_rbf(&sequences);
    let (locktime_type, locktime_value) = classify_locktime(tx.locktime);

    let outputs_for_warnings: Vec<OutputForWarnings> = vout_result
        .iter()
        .map(|o| OutputForWarnings {
            script_type: o.script_type.as_str(),
            value_sats: o.value_sats,
        })
        .collect();
    let warnings = generate_warnings(fees.fee_sats, fees.fee_rate_sat_vb, &outputs_for_warnings, rbf);

    let segwit_savings = compute_segwit_savings(
        tx.segwit,
        tx.size_bytes,
        tx.weight,
        tx.non_witness_size,
        tx.witness_size,
    );

    Ok(TxAnalysis {
        ok: true,
        network: network.to_string(),
        segwit: tx.segwit,
        txid: tx.txid,
        wtxid: tx.wtxid,
        version: tx.version,
        locktime: tx.locktime,
        size_bytes: tx.size_bytes,
        weight: tx.weight,
        vbytes: tx.vbytes,
        total_input_sats,
        total_output_sats,
        fee_sats: fees.fee_sats,
        fee_rate_sat_vb: fees.fee_rate_sat_vb,
        rbf_signaling: rbf,
        locktime_type,
        locktime_value,
        segwit_savings,
        vin: vin_result,
        vout: vout_result,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_legacy_tx() -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes());
        raw.push(0x01);
        raw.extend_from_slice(&[0xAAu8; 32]);
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.push(0x00);
        raw.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        raw.push(0x01);
        raw.extend_from_slice(&4_000_000_000u64.to_le_bytes());
        raw.push(0x19);
        raw.extend_from_slice(&hex::decode("76a914aabbccddeeff00112233445566778899aabbccdd88ac").unwrap());
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw
    }

    #[test]
    fn rejects_missing_prevout() {
        let raw = minimal_legacy_tx();
        let result = analyze_transaction(&raw, &[], "mainnet");
        assert!(matches!(result, Err(CoreError::MissingPrevout { .. })));
    }

    #[test]
    fn rejects_unused_prevout() {
        let raw = minimal_legacy_tx();
        let mut txid_bytes = [0xAAu8; 32];
        txid_bytes.reverse();
        let prevouts = vec![
            PrevoutInput {
                txid: hex::encode(txid_bytes),
                vout: 0,
                value_sats: 5_000_000_000,
                script_pubkey_hex: "76a914000000000000000000000000000000000000000088ac".to_string(),
            },
            PrevoutInput {
                txid: hex::encode(txid_bytes),
                vout: 1,
                value_sats: 1,
                script_pubkey_hex: "76a914000000000000000000000000000000000000000088ac".to_string(),
            },
        ];
        let result = analyze_transaction(&raw, &prevouts, "mainnet");
        assert!(matches!(result, Err(CoreError::UnusedPrevout { .. })));
    }

    #[test]
    fn computes_fee_from_bound_prevout() {
        let raw = minimal_legacy_tx();
        let mut txid_bytes = [0xAAu8; 32];
        txid_bytes.reverse();
        let prevouts = vec![PrevoutInput {
            txid: hex::encode(txid_bytes),
            vout: 0,
            value_sats: 4_000_010_000,
            script_pubkey_hex: "76a914000000000000000000000000000000000000000088ac".to_string(),
        }];
        let result = analyze_transaction(&raw, &prevouts, "mainnet").unwrap();
        assert_eq!(result.fee_sats, 10_000);
        assert!(!result.segwit);
        assert!(result.wtxid.is_none());
    }

    // Literal vectors, one per boundary scenario, with pinned txid/wtxid/
    // fee_sats/vbytes/addresses.

    #[test]
    fn legacy_one_in_two_out_p2pkh() {
        let raw = hex::decode("010000000111111111111111111111111111111111111111111111111111111111111111110000000000ffffffff02005ed0b2000000001976a914aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa88ac00ca9a3b000000001976a914bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb88ac00000000").unwrap();
        let prevouts = vec![PrevoutInput {
            txid: "11".repeat(32),
            vout: 0,
            value_sats: 4_000_010_000,
            script_pubkey_hex: "76a914abababababababababababababababababababab88ac".to_string(),
        }];
        let result = analyze_transaction(&raw, &prevouts, "mainnet").unwrap();

        assert!(!result.segwit);
        assert!(result.wtxid.is_none());
        assert_eq!(result.txid, "d746877195488c04e25a7d9fd32ac7ba3799cfa3baae0afdaf76a328c92b157f");
        assert_eq!(result.fee_sats, 10_000);
        assert_eq!(result.vbytes, 119);
        assert!(!result.rbf_signaling);
        assert_eq!(result.locktime_type, LocktimeType::None);
        assert_eq!(result.vout[0].address.as_deref(), Some("1GZQKjsC97yasxRj1wtYf5rC61AxpR1zmr"));
        assert_eq!(result.vout[1].address.as_deref(), Some("1J7eFp9p48g3U3yCREyhd6LJzhnkywhi5s"));
    }

    #[test]
    fn segwit_v0_p2wpkh_spend_signals_rbf() {
        let raw = hex::decode("0200000000010122222222222222222222222222222222222222222222222222222222222222220000000000fdffffff01605af40500000000160014cccccccccccccccccccccccccccccccccccccccc024730450221001111111111111111111111111111111111111111111111111111111111111111022022222222222222222222222222222222222222222222222222222222222222222102333333333333333333333333333333333333333333333333333333333333333300000000").unwrap();
        let prevouts = vec![PrevoutInput {
            txid: "22".repeat(32),
            vout: 0,
            value_sats: 99_910_000,
            script_pubkey_hex: "0014dddddddddddddddddddddddddddddddddddddddd".to_string(),
        }];
        let result = analyze_transaction(&raw, &prevouts, "mainnet").unwrap();

        assert!(result.segwit);
        assert_eq!(result.txid, "208d396d60c7779d3814f4a3055a0e8fd9f6151d45a5321f7492ed80b82027d1");
        assert_eq!(result.wtxid.as_deref(), Some("03c08b6db49a522253da1512a9e92ccb38084b6c282a4961c8755013d13e7593"));
        assert_eq!(result.fee_sats, 10_000);
        assert_eq!(result.vbytes, 110);
        assert!(result.vbytes < result.size_bytes);
        assert!(result.rbf_signaling);
        assert_eq!(result.vout[0].address.as_deref(), Some("bc1qenxvenxvenxvenxvenxvenxvenxvenxvenxvx46avd"));
        assert_eq!(result.vin[0].address.as_deref(), Some("bc1qmhwamhwamhwamhwamhwamhwamhwamhwa5tdqel"));
    }

    #[test]
    fn taproot_keypath_spend() {
        let raw = hex::decode("020000000001013333333333333333333333333333333333333333333333333333333333333333000000000\
0ffffffff0180f0fa0200000000225120eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee0140ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff00000000").unwrap();
        let prevouts = vec![PrevoutInput {
            txid: "33".repeat(32),
            vout: 0,
            value_sats: 50_010_000,
            script_pubkey_hex: "5120".to_string() + &"11".repeat(32),
        }];
        let result = analyze_transaction(&raw, &prevouts, "mainnet").unwrap();

        assert!(result.segwit);
        assert_eq!(result.txid, "1f207fafebde0417b348bbc9c84721e16ec63bc76257f8c62d20379f77c468b7");
        assert_eq!(result.fee_sats, 10_000);
        assert_eq!(result.vin[0].script_type, InputType::P2trKeypath);
        assert_eq!(result.vout[0].script_type, ScriptType::P2tr);
        assert_eq!(
            result.vout[0].address.as_deref(),
            Some("bc1pamhwamhwamhwamhwamhwamhwamhwamhwamhwamhwamhwamhwamhqct09sz")
        );
    }

    #[test]
    fn p2sh_wrapped_p2wpkh_spend() {
        let raw = hex::decode("02000000000101444444444444444444444444444444444444444444444444444444444444444400000000160014555555555555555555555555555555555555555\
5ffffffff01005a6202000000001976a914666666666666666666666666666666666666666688ac024730450221007777777777777777777777777777777777777777777777777777777777777777022088888888888888888888888888888888888888888888888888888888888888882102999999999999999999999999999999999999999999999999999999999999999900000000").unwrap();
        let prevouts = vec![PrevoutInput {
            txid: "44".repeat(32),
            vout: 0,
            value_sats: 40_010_000,
            script_pubkey_hex: "a914d08b88827990d96769e3dfdb6c2484dd531f0db587".to_string(),
        }];
        let result = analyze_transaction(&raw, &prevouts, "mainnet").unwrap();

        assert!(result.segwit);
        assert_eq!(result.txid, "78bda2d4f6d7c782ee7c6d0c7f63ac82bf2e10af424c5f82c5589919514bff86");
        assert_eq!(result.fee_sats, 10_000);
        assert_eq!(result.vin[0].script_type, InputType::P2shP2wpkh);
        assert_eq!(result.vin[0].address.as_deref(), Some("3LhhdPE6uUuS57CdFgUv4KZNTp3Etyxrwe"));
        assert_eq!(result.vout[0].address.as_deref(), Some("1ALSbSiiV5BkXaFqQmXvo3uiTChn6o1u8e"));
    }

    #[test]
    fn op_return_omni_payload_is_not_dust() {
        let raw = hex::decode("010000000155555555555555555555555555555555555555555555555555555555555555550000000000ffffffff020000000000000000126a106f6d6e690000001f00000000035798a080969800000000001976a914777777777777777777777777777777777777777788ac00000000").unwrap();
        let prevouts = vec![PrevoutInput {
            txid: "55".repeat(32),
            vout: 0,
            value_sats: 10_010_000,
            script_pubkey_hex: "76a914abababababababababababababababababababab88ac".to_string(),
        }];
        let result = analyze_transaction(&raw, &prevouts, "mainnet").unwrap();

        assert_eq!(result.txid, "dfaedcaf1ac4b593b7c137fab449be96e592ba88cc24ecbe1056f21506b69fbc");
        assert_eq!(result.fee_sats, 10_000);
        assert_eq!(result.vout[0].script_type, ScriptType::OpReturn);
        assert_eq!(result.vout[0].op_return_protocol, Some("omni"));
        assert_eq!(result.vout[1].address.as_deref(), Some("1BtgXX1LQ5tD7foJp4d5m4PqMuKaDuAe2w"));
        assert!(!result
            .warnings
            .iter()
            .any(|w| matches!(w.code, crate::analysis::WarningCode::DustOutput)));
    }
}
