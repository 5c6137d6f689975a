//! Output/input script classification, opcode disassembly, and `OP_RETURN`
//! payload extraction.
//!
//! Classification looks only at exact byte patterns (no script
//! interpretation); ref: <https://en.bitcoin.it/wiki/Script>.

use serde::Serialize;

/// How a `scriptPubKey` (output side) classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    OpReturn,
    Unknown,
}

/// How a `scriptSig`/witness (input side) classifies. Extends [`ScriptType`]
/// with the nested-SegWit and Taproot spend-path variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    P2pkh,
    P2wpkh,
    P2wsh,
    P2shP2wpkh,
    P2shP2wsh,
    P2trKeypath,
    P2trScriptpath,
    Unknown,
}

impl ScriptType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptType::P2pkh => "p2pkh",
            ScriptType::P2sh => "p2sh",
            ScriptType::P2wpkh => "p2wpkh",
            ScriptType::P2wsh => "p2wsh",
            ScriptType::P2tr => "p2tr",
            ScriptType::OpReturn => "op_return",
            ScriptType::Unknown => "unknown",
        }
    }
}

impl InputType {
    pub fn as_str(self) -> &'static str {
        match self {
            InputType::P2pkh => "p2pkh",
            InputType::P2wpkh => "p2wpkh",
            InputType::P2wsh => "p2wsh",
            InputType::P2shP2wpkh => "p2sh-p2wpkh",
            InputType::P2shP2wsh => "p2sh-p2wsh",
            InputType::P2trKeypath => "p2tr_keypath",
            InputType::P2trScriptpath => "p2tr_scriptpath",
            InputType::Unknown => "unknown",
        }
    }
}

/// Classifies a `scriptPubKey` by exact byte pattern.
pub fn classify_output(script: &[u8]) -> ScriptType {
    let len = script.len();

    // p2pkh: OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    if len == 25
        && script[0] == 0x76
        && script[1] == 0xa9
        && script[2] == 0x14
        && script[23] == 0x88
        && script[24] == 0xac
    {
        return ScriptType::P2pkh;
    }

    // p2sh: OP_HASH160 <20> OP_EQUAL
    if len == 23 && script[0] == 0xa9 && script[1] == 0x14 && script[22] == 0x87 {
        return ScriptType::P2sh;
    }

    // p2wpkh: OP_0 <20>
    if len == 22 && script[0] == 0x00 && script[1] == 0x14 {
        return ScriptType::P2wpkh;
    }

    // p2wsh: OP_0 <32>
    if len == 34 && script[0] == 0x00 && script[1] == 0x20 {
        return ScriptType::P2wsh;
    }

    // p2tr: OP_1 <32>
    if len == 34 && script[0] == 0x51 && script[1] == 0x20 {
        return ScriptType::P2tr;
    }

    if len >= 1 && script[0] == 0x6a {
        return ScriptType::OpReturn;
    }

    ScriptType::Unknown
}

const OPCODE_NAMES: &[(u8, &str)] = &[
    (0x00, "OP_0"),
    (0x4c, "OP_PUSHDATA1"),
    (0x4d, "OP_PUSHDATA2"),
    (0x4e, "OP_PUSHDATA4"),
    (0x4f, "OP_1NEGATE"),
    (0x50, "OP_RESERVED"),
    (0x51, "OP_1"),
    (0x52, "OP_2"),
    (0x53, "OP_3"),
    (0x54, "OP_4"),
    (0x55, "OP_5"),
    (0x56, "OP_6"),
    (0x57, "OP_7"),
    (0x58, "OP_8"),
    (0x59, "OP_9"),
    (0x5a, "OP_10"),
    (0x5b, "OP_11"),
    (0x5c, "OP_12"),
    (0x5d, "OP_13"),
    (0x5e, "OP_14"),
    (0x5f, "OP_15"),
    (0x60, "OP_16"),
    (0x61, "OP_NOP"),
    (0x62, "OP_VER"),
    (0x63, "OP_IF"),
    (0x64, "OP_NOTIF"),
    (0x65, "OP_VERIF"),
    (0x66, "OP_VERNOTIF"),
    (0x67, "OP_ELSE"),
    (0x68, "OP_ENDIF"),
    (0x69, "OP_VERIFY"),
    (0x6a, "OP_RETURN"),
    (0x6b, "OP_TOALTSTACK"),
    (0x6c, "OP_FROMALTSTACK"),
    (0x6d, "OP_2DROP"),
    (0x6e, "OP_2DUP"),
    (0x6f, "OP_3DUP"),
    (0x70, "OP_2OVER"),
    (0x71, "OP_2ROT"),
    (0x72, "OP_2SWAP"),
    (0x73, "OP_IFDUP"),
    (0x74, "OP_DEPTH"),
    (0x75, "OP_DROP"),
    (0x76, "OP_DUP"),
    (0x77, "OP_NIP"),
    (0x78, "OP_OVER"),
    (0x79, "OP_PICK"),
    (0x7a, "OP_ROLL"),
    (0x7b, "OP_ROT"),
    (0x7c, "OP_SWAP"),
    (0x7d, "OP_TUCK"),
    (0x7e, "OP_CAT"),
    (0x7f, "OP_SUBSTR"),
    (0x80, "OP_LEFT"),
    (0x81, "OP_RIGHT"),
    (0x82, "OP_SIZE"),
    (0x83, "OP_INVERT"),
    (0x84, "OP_AND"),
    (0x85, "OP_OR"),
    (0x86, "OP_XOR"),
    (0x87, "OP_EQUAL"),
    (0x88, "OP_EQUALVERIFY"),
    (0x89, "OP_RESERVED1"),
    (0x8a, "OP_RESERVED2"),
    (0x8b, "OP_1ADD"),
    (0x8c, "OP_1SUB"),
    (0x8d, "OP_2MUL"),
    (0x8e, "OP_2DIV"),
    (0x8f, "OP_NEGATE"),
    (0x90, "OP_ABS"),
    (0x91, "OP_NOT"),
    (0x92, "OP_0NOTEQUAL"),
    (0x93, "OP_ADD"),
    (0x94, "OP_SUB"),
    (0x95, "OP_MUL"),
    (0x96, "OP_DIV"),
    (0x97, "OP_MOD"),
    (0x98, "OP_LSHIFT"),
    (0x99, "OP_RSHIFT"),
    (0x9a, "OP_BOOLAND"),
    (0x9b, "OP_BOOLOR"),
    (0x9c, "OP_NUMEQUAL"),
    (0x9d, "OP_NUMEQUALVERIFY"),
    (0x9e, "OP_NUMNOTEQUAL"),
    (0x9f, "OP_LESSTHAN"),
    (0xa0, "OP_GREATERTHAN"),
    (0xa1, "OP_LESSTHANOREQUAL"),
    (0xa2, "OP_GREATERTHANOREQUAL"),
    (0xa3, "OP_MIN"),
    (0xa4, "OP_MAX"),
    (0xa5, "OP_WITHIN"),
    (0xa6, "OP_RIPEMD160"),
    (0xa7, "OP_SHA1"),
    (0xa8, "OP_SHA256"),
    (0xa9, "OP_HASH160"),
    (0xaa, "OP_HASH256"),
    (0xab, "OP_CODESEPARATOR"),
    (0xac, "OP_CHECKSIG"),
    (0xad, "OP_CHECKSIGVERIFY"),
    (0xae, "OP_CHECKMULTISIG"),
    (0xaf, "OP_CHECKMULTISIGVERIFY"),
    (0xb0, "OP_NOP1"),
    (0xb1, "OP_CHECKLOCKTIMEVERIFY"),
    (0xb2, "OP_CHECKSEQUENCEVERIFY"),
    (0xb3, "OP_NOP4"),
    (0xb4, "OP_NOP5"),
    (0xb5, "OP_NOP6"),
    (0xb6, "OP_NOP7"),
    (0xb7, "OP_NOP8"),
    (0xb8, "OP_NOP9"),
    (0xb9, "OP_NOP10"),
    (0xba, "OP_CHECKSIGADD"),
];

fn opcode_name(op: u8) -> Option<&'static str> {
    OPCODE_NAMES
        .iter()
        .find(|(code, _)| *code == op)
        .map(|(_, name)| *name)
}

/// Walks a script's opcodes and renders them as an ASM string, one token
/// per opcode/push, space-joined. A push whose declared length runs past
/// the end of the script truncates the disassembly at that point instead
/// of erroring.
pub fn disassemble(script: &[u8]) -> String {
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < script.len() {
        let opcode = script[i];
        i += 1;

        if (0x01..=0x4b).contains(&opcode) {
            let len = opcode as usize;
            if i + len > script.len() {
                tokens.push(format!("OP_PUSHBYTES_{} {}", opcode, hex::encode(&script[i..])));
                break;
            }
            tokens.push(format!("OP_PUSHBYTES_{} {}", opcode, hex::encode(&script[i..i + len])));
            i += len;
        } else if opcode == 0x4c {
            if i >= script.len() {
                break;
            }
            let len = script[i] as usize;
            i += 1;
            if i + len > script.len() {
                break;
            }
            tokens.push(format!("OP_PUSHDATA1 {}", hex::encode(&script[i..i + len])));
            i += len;
        } else if opcode == 0x4d {
            if i + 2 > script.len() {
                break;
            }
            let len = u16::from_le_bytes([script[i], script[i + 1]]) as usize;
            i += 2;
            if i + len > script.len() {
                break;
            }
            tokens.push(format!("OP_PUSHDATA2 {}", hex::encode(&script[i..i + len])));
            i += len;
        } else if opcode == 0x4e {
            if i + 4 > script.len() {
                break;
            }
            let len =
                u32::from_le_bytes([script[i], script[i + 1], script[i + 2], script[i + 3]]) as usize;
            i += 4;
            if i + len > script.len() {
                break;
            }
            tokens.push(format!("OP_PUSHDATA4 {}", hex::encode(&script[i..i + len])));
            i += len;
        } else if let Some(name) = opcode_name(opcode) {
            tokens.push(name.to_string());
        } else {
            tokens.push(format!("OP_UNKNOWN_{:#04x}", opcode));
        }
    }

    tokens.join(" ")
}

/// Decoded `OP_RETURN` payload: the raw concatenated push bytes, an
/// optional UTF-8 rendering, and the recognized protocol tag.
pub struct OpReturnPayload {
    pub data: Vec<u8>,
    pub data_utf8: Option<String>,
    pub protocol: &'static str,
}

/// Concatenates every push payload following the leading `OP_RETURN`,
/// stopping at the first non-push opcode or truncated push.
pub fn decode_op_return(script: &[u8]) -> OpReturnPayload {
    let mut data = Vec::new();

    if script.is_empty() || script[0] != 0x6a {
        return OpReturnPayload {
            data,
            data_utf8: None,
            protocol: "unknown",
        };
    }

    let mut i = 1usize;
    while i < script.len() {
        let opcode = script[i];
        i += 1;

        if (0x01..=0x4b).contains(&opcode) {
            let len = opcode as usize;
            if i + len > script.len() {
                data.extend_from_slice(&script[i..]);
                break;
            }
            data.extend_from_slice(&script[i..i + len]);
            i += len;
        } else if opcode == 0x4c {
            if i >= script.len() {
                break;
            }
            let len = script[i] as usize;
            i += 1;
            if i + len > script.len() {
                break;
            }
            data.extend_from_slice(&script[i..i + len]);
            i += len;
        } else if opcode == 0x4d {
            if i + 2 > script.len() {
                break;
            }
            let len = u16::from_le_bytes([script[i], script[i + 1]]) as usize;
            i += 2;
            if i + len > script.len() {
                break;
            }
            data.extend_from_slice(&script[i..i + len]);
            i += len;
        } else if opcode == 0x4e {
            if i + 4 > script.len() {
                break;
            }
            let len =
                u32::from_le_bytes([script[i], script[i + 1], script[i + 2], script[i + 3]]) as usize;
            i += 4;
            if i + len > script.len() {
                break;
            }
            data.extend_from_slice(&script[i..i + len]);
            i += len;
        } else if opcode == 0x00 {
            // OP_0 pushes an empty item.
        } else {
            break;
        }
    }

    let data_hex = hex::encode(&data);
    let protocol = if data_hex.starts_with("6f6d6e69") {
        "omni"
    } else if data_hex.starts_with("0109f91102") {
        "opentimestamps"
    } else {
        "unknown"
    };

    let data_utf8 = String::from_utf8(data.clone()).ok();

    OpReturnPayload {
        data,
        data_utf8,
        protocol,
    }
}

/// Classifies how an input is being spent, given its matched prevout's
/// `scriptPubKey`, its `scriptSig`, and its witness stack.
pub fn classify_input(prevout_script: &[u8], script_sig: &[u8], witness: &[Vec<u8>]) -> InputType {
    match classify_output(prevout_script) {
        ScriptType::P2pkh => InputType::P2pkh,
        ScriptType::P2wpkh => InputType::P2wpkh,
        ScriptType::P2wsh => InputType::P2wsh,
        ScriptType::P2tr => classify_taproot_input(witness),
        ScriptType::P2sh => classify_nested_segwit_input(script_sig, witness),
        _ => InputType::Unknown,
    }
}

fn classify_taproot_input(witness: &[Vec<u8>]) -> InputType {
    if witness.len() == 1 {
        let len = witness[0].len();
        if len == 64 || len == 65 {
            return InputType::P2trKeypath;
        }
    }
    if witness.len() >= 2 {
        if let Some(first_byte) = witness.last().and_then(|item| item.first()) {
            if first_byte & 0xFE == 0xC0 {
                return InputType::P2trScriptpath;
            }
        }
    }
    // Fallback per spec: anything else on a taproot prevout defaults to
    // the keypath tag.
    InputType::P2trKeypath
}

fn classify_nested_segwit_input(script_sig: &[u8], witness: &[Vec<u8>]) -> InputType {
    if script_sig.is_empty() || witness.is_empty() {
        return InputType::Unknown;
    }

    let push_len = script_sig[0] as usize;
    if !(0x01..=0x4b).contains(&script_sig[0]) || push_len + 1 != script_sig.len() {
        return InputType::Unknown;
    }

    let redeem_script = &script_sig[1..];
    match classify_output(redeem_script) {
        ScriptType::P2wpkh => InputType::P2shP2wpkh,
        ScriptType::P2wsh => InputType::P2shP2wsh,
        _ => InputType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    #[test]
    fn classifies_standard_output_patterns() {
        assert_eq!(
            classify_output(&h("76a914000000000000000000000000000000000000000088ac")),
            ScriptType::P2pkh
        );
        assert_eq!(
            classify_output(&h("a914000000000000000000000000000000000000000087")),
            ScriptType::P2sh
        );
        assert_eq!(
            classify_output(&h("00140000000000000000000000000000000000000000")),
            ScriptType::P2wpkh
        );
        assert_eq!(
            classify_output(&h(
                "00200000000000000000000000000000000000000000000000000000000000000000"
            )),
            ScriptType::P2wsh
        );
        assert_eq!(
            classify_output(&h(
                "51200000000000000000000000000000000000000000000000000000000000000000"
            )),
            ScriptType::P2tr
        );
        assert_eq!(classify_output(&h("6a026869")), ScriptType::OpReturn);
        assert_eq!(classify_output(&h("51")), ScriptType::Unknown);
    }

    #[test]
    fn disassembles_direct_pushes_and_named_opcodes() {
        let script = h("76a914aabbccddeeff00112233445566778899aabbccddee88ac");
        let asm = disassemble(&script);
        assert!(asm.starts_with("OP_DUP OP_HASH160 OP_PUSHBYTES_20"));
        assert!(asm.ends_with("OP_EQUALVERIFY OP_CHECKSIG"));
    }

    #[test]
    fn disassemble_unknown_opcode() {
        assert_eq!(disassemble(&[0xfd]), "OP_UNKNOWN_0xfd");
    }

    #[test]
    fn op_return_decodes_omni_protocol_tag() {
        // OP_RETURN OP_PUSHBYTES_20 6f6d6e69...
        let mut script = vec![0x6a, 0x14];
        script.extend_from_slice(&h("6f6d6e690000001f00000000035798a0"));
        let decoded = decode_op_return(&script);
        assert_eq!(decoded.protocol, "omni");
    }

    #[test]
    fn taproot_keypath_from_single_schnorr_sig() {
        let witness = vec![vec![0u8; 64]];
        assert_eq!(classify_taproot_input(&witness), InputType::P2trKeypath);
    }

    #[test]
    fn taproot_scriptpath_from_control_block() {
        let witness = vec![vec![1u8; 10], vec![0xc0u8; 33]];
        assert_eq!(classify_taproot_input(&witness), InputType::P2trScriptpath);
    }

    #[test]
    fn nested_segwit_p2wpkh_detected() {
        let mut script_sig = vec![0x16];
        script_sig.extend_from_slice(&h("0014aabbccddeeff00112233445566778899aabbccdd"));
        let witness = vec![vec![1u8], vec![2u8]];
        assert_eq!(
            classify_nested_segwit_input(&script_sig, &witness),
            InputType::P2shP2wpkh
        );
    }
}
