//! Fee computation, locktime/RBF classification, and warning generation.
//! Ref: original `analysis.py`.

use serde::Serialize;

const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 0x8000_0000;
const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 0x0040_0000;
const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_FFFF;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub struct FeeResult {
    pub fee_sats: i64,
    pub fee_rate_sat_vb: f64,
}

pub fn compute_fees(total_input_sats: u64, total_output_sats: u64, vbytes: usize) -> FeeResult {
    let fee_sats = total_input_sats as i64 - total_output_sats as i64;
    let fee_rate_sat_vb = if vbytes > 0 {
        round2(fee_sats as f64 / vbytes as f64)
    } else {
        0.0
    };
    FeeResult {
        fee_sats,
        fee_rate_sat_vb,
    }
}

/// BIP125: any input signaling sequence below `0xFFFFFFFE` opts the
/// transaction into replace-by-fee.
pub fn detect_rbf(sequences: &[u32]) -> bool {
    sequences.iter().any(|&s| s < 0xFFFFFFFE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocktimeType {
    None,
    BlockHeight,
    UnixTimestamp,
}

pub fn classify_locktime(locktime: u32) -> (LocktimeType, u32) {
    if locktime == 0 {
        (LocktimeType::None, 0)
    } else if locktime < 500_000_000 {
        (LocktimeType::BlockHeight, locktime)
    } else {
        (LocktimeType::UnixTimestamp, locktime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeTimelockKind {
    Blocks,
    Time,
}

pub struct RelativeTimelock {
    pub enabled: bool,
    pub kind: Option<RelativeTimelockKind>,
    pub value: Option<u32>,
}

/// BIP68 relative timelock encoded in a single input's sequence field.
pub fn analyze_relative_timelock(sequence: u32) -> RelativeTimelock {
    if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
        return RelativeTimelock {
            enabled: false,
            kind: None,
            value: None,
        };
    }

    let value = sequence & SEQUENCE_LOCKTIME_MASK;

    if sequence & SEQUENCE_LOCKTIME_TYPE_FLAG != 0 {
        RelativeTimelock {
            enabled: true,
            kind: Some(RelativeTimelockKind::Time),
            value: Some(value * 512),
        }
    } else {
        RelativeTimelock {
            enabled: true,
            kind: Some(RelativeTimelockKind::Blocks),
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    HighFee,
    DustOutput,
    UnknownOutputScript,
    RbfSignaling,
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub code: WarningCode,
}

const DUST_THRESHOLD_SATS: u64 = 546;
const HIGH_FEE_SATS: i64 = 1_000_000;
const HIGH_FEE_RATE: f64 = 200.0;

/// Output shape just wide enough for warning evaluation, decoupled from
/// the full JSON-envelope `TxOut`.
pub struct OutputForWarnings<'a> {
    pub script_type: &'a str,
    pub value_sats: u64,
}

pub fn generate_warnings(
    fee_sats: i64,
    fee_rate_sat_vb: f64,
    outputs: &[OutputForWarnings],
    rbf: bool,
) -> Vec<Warning> {
    let mut warnings = Vec::new();

    if fee_sats > HIGH_FEE_SATS || fee_rate_sat_vb > HIGH_FEE_RATE {
        warnings.push(Warning {
            code: WarningCode::HighFee,
        });
    }

    if outputs
        .iter()
        .any(|o| o.script_type != "op_return" && o.value_sats < DUST_THRESHOLD_SATS)
    {
        warnings.push(Warning {
            code: WarningCode::DustOutput,
        });
    }

    if outputs.iter().any(|o| o.script_type == "unknown") {
        warnings.push(Warning {
            code: WarningCode::UnknownOutputScript,
        });
    }

    if rbf {
        warnings.push(Warning {
            code: WarningCode::RbfSignaling,
        });
    }

    warnings
}

#[derive(Debug, Clone, Serialize)]
pub struct SegwitSavings {
    pub witness_bytes: usize,
    pub non_witness_bytes: usize,
    pub total_bytes: usize,
    pub weight_actual: usize,
    pub weight_if_legacy: usize,
    pub savings_pct: f64,
}

pub fn compute_segwit_savings(
    is_segwit: bool,
    size_bytes: usize,
    weight: usize,
    non_witness_size: usize,
    witness_size: usize,
) -> Option<SegwitSavings> {
    if !is_segwit {
        return None;
    }

    let weight_if_legacy = size_bytes * 4;
    let savings_pct = if weight_if_legacy > 0 {
        round2((1.0 - weight as f64 / weight_if_legacy as f64) * 100.0)
    } else {
        0.0
    };

    Some(SegwitSavings {
        witness_bytes: witness_size,
        non_witness_bytes: non_witness_size,
        total_bytes: size_bytes,
        weight_actual: weight,
        weight_if_legacy,
        savings_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rate_rounds_to_two_decimals() {
        let result = compute_fees(100_300, 100_000, 300);
        assert_eq!(result.fee_sats, 300);
        assert_eq!(result.fee_rate_sat_vb, 1.0);
    }

    #[test]
    fn fee_rate_zero_when_vbytes_zero() {
        let result = compute_fees(100, 0, 0);
        assert_eq!(result.fee_rate_sat_vb, 0.0);
    }

    #[test]
    fn rbf_detected_below_threshold() {
        assert!(detect_rbf(&[0xFFFFFFFD]));
        assert!(!detect_rbf(&[0xFFFFFFFE, 0xFFFFFFFF]));
    }

    #[test]
    fn locktime_classification_buckets() {
        assert_eq!(classify_locktime(0).0, LocktimeType::None);
        assert_eq!(classify_locktime(500_000).0, LocktimeType::BlockHeight);
        assert_eq!(classify_locktime(1_700_000_000).0, LocktimeType::UnixTimestamp);
    }

    #[test]
    fn relative_timelock_disabled_flag_wins() {
        let t = analyze_relative_timelock(0x80000005);
        assert!(!t.enabled);
    }

    #[test]
    fn relative_timelock_time_based_scales_by_512() {
        let t = analyze_relative_timelock(SEQUENCE_LOCKTIME_TYPE_FLAG | 2);
        assert_eq!(t.kind, Some(RelativeTimelockKind::Time));
        assert_eq!(t.value, Some(1024));
    }

    #[test]
    fn dust_warning_ignores_op_return_outputs() {
        let outputs = [OutputForWarnings {
            script_type: "op_return",
            value_sats: 0,
        }];
        let warnings = generate_warnings(0, 0.0, &outputs, false);
        assert!(warnings.is_empty());
    }

    #[test]
    fn segwit_savings_none_for_legacy() {
        assert!(compute_segwit_savings(false, 100, 400, 100, 0).is_none());
    }
}
