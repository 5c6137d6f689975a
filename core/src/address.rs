//! Mainnet address derivation: Base58Check (P2PKH/P2SH) and Bech32/Bech32m
//! (P2WPKH/P2WSH/P2TR). Ref: BIP13, BIP173, BIP350.

use crate::error::{CoreError, CoreResult};
use crate::hashes::double_sha256;
use crate::script::ScriptType;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BECH32_CONST: u32 = 1;
const BECH32M_CONST: u32 = 0x2bc8_30a3;

/// Base58Check-encodes a version-prefixed payload (checksum = first 4
/// bytes of the double-SHA256).
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = double_sha256(payload);
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[..4]);

    let mut digits: Vec<u8> = vec![0];
    for &byte in &data {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let leading_zeros = data.iter().take_while(|&&b| b == 0).count();
    let mut out: Vec<u8> = std::iter::repeat(BASE58_ALPHABET[0])
        .take(leading_zeros)
        .collect();
    out.extend(digits.iter().rev().map(|&d| BASE58_ALPHABET[d as usize]));
    String::from_utf8(out).expect("base58 alphabet is ASCII")
}

/// Decodes a Base58Check string back into its version byte and payload,
/// verifying the trailing 4-byte checksum. Inverse of [`base58check_encode`].
pub fn base58check_decode(s: &str) -> CoreResult<(u8, Vec<u8>)> {
    let mut bytes: Vec<u8> = vec![0];
    for c in s.bytes() {
        let digit = BASE58_ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| CoreError::InvalidAddress(format!("invalid base58 character: {}", c as char)))?;
        let mut carry = digit as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    bytes.reverse();

    let leading_ones = s.bytes().take_while(|&c| c == BASE58_ALPHABET[0]).count();
    let mut data: Vec<u8> = std::iter::repeat(0u8).take(leading_ones).collect();
    data.extend(bytes.into_iter().skip_while(|&b| b == 0));

    if data.len() < 5 {
        return Err(CoreError::InvalidAddress("base58check payload too short".to_string()));
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    let expected = double_sha256(payload);
    if &expected[..4] != checksum {
        return Err(CoreError::InvalidAddress("base58check checksum mismatch".to_string()));
    }

    Ok((payload[0], payload[1..].to_vec()))
}

pub fn p2pkh_address(pubkey_hash: &[u8]) -> String {
    let mut payload = vec![0x00];
    payload.extend_from_slice(pubkey_hash);
    base58check_encode(&payload)
}

pub fn p2sh_address(script_hash: &[u8]) -> String {
    let mut payload = vec![0x05];
    payload.extend_from_slice(script_hash);
    base58check_encode(&payload)
}

fn bech32_polymod(values: &[u32]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    let mut chk: u32 = 1;
    for &v in values {
        let b = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ v;
        for (i, g) in GEN.iter().enumerate() {
            if (b >> i) & 1 != 0 {
                chk ^= g;
            }
        }
    }
    chk
}

fn bech32_hrp_expand(hrp: &str) -> Vec<u32> {
    let mut v: Vec<u32> = hrp.bytes().map(|c| (c >> 5) as u32).collect();
    v.push(0);
    v.extend(hrp.bytes().map(|c| (c & 31) as u32));
    v
}

fn bech32_create_checksum(hrp: &str, data: &[u32], witver: u8) -> [u32; 6] {
    let const_ = if witver > 0 { BECH32M_CONST } else { BECH32_CONST };
    let mut values = bech32_hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    let polymod = bech32_polymod(&values) ^ const_;
    let mut checksum = [0u32; 6];
    for (i, slot) in checksum.iter_mut().enumerate() {
        *slot = (polymod >> (5 * (5 - i))) & 31;
    }
    checksum
}

/// Regroups 8-bit bytes into 5-bit words (BIP173 `convertbits`, padded).
fn convert_bits_8_to_5(data: &[u8]) -> Vec<u32> {
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    let mut ret = Vec::new();
    for &value in data {
        acc = (acc << 8) | value as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            ret.push((acc >> bits) & 0x1f);
        }
    }
    if bits > 0 {
        ret.push((acc << (5 - bits)) & 0x1f);
    }
    ret
}

pub fn bech32_encode(hrp: &str, witver: u8, witprog: &[u8]) -> String {
    let mut data = vec![witver as u32];
    data.extend(convert_bits_8_to_5(witprog));
    let checksum = bech32_create_checksum(hrp, &data, witver);

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    out.push_str(hrp);
    out.push('1');
    for d in data.iter().chain(checksum.iter()) {
        out.push(BECH32_CHARSET[*d as usize] as char);
    }
    out
}

/// Regroups 5-bit words back into 8-bit bytes. Inverse of
/// [`convert_bits_8_to_5`]; rejects non-zero padding bits or a short final
/// group per BIP173.
fn convert_bits_5_to_8(data: &[u32]) -> CoreResult<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    let mut ret = Vec::new();
    for &value in data {
        if value > 31 {
            return Err(CoreError::InvalidAddress("bech32 data value out of range".to_string()));
        }
        acc = (acc << 5) | value;
        bits += 5;
        while bits >= 8 {
            bits -= 8;
            ret.push(((acc >> bits) & 0xff) as u8);
        }
    }
    if bits >= 5 || (acc << (8 - bits)) & 0xff != 0 {
        return Err(CoreError::InvalidAddress("bech32 non-zero padding".to_string()));
    }
    Ok(ret)
}

/// Decodes a Bech32/Bech32m string into `(witver, witprog)`, verifying the
/// checksum against whichever constant the embedded witness version
/// requires (`BECH32_CONST` for v0, `BECH32M_CONST` for v>=1). Inverse of
/// [`bech32_encode`].
pub fn bech32_decode(s: &str) -> CoreResult<(u8, Vec<u8>)> {
    let lower = s.to_ascii_lowercase();
    if s.chars().any(|c| c.is_ascii_uppercase()) && s != lower.to_ascii_uppercase() {
        return Err(CoreError::InvalidAddress("mixed-case bech32 string".to_string()));
    }

    let sep = lower
        .rfind('1')
        .ok_or_else(|| CoreError::InvalidAddress("missing bech32 separator".to_string()))?;
    let hrp = &lower[..sep];
    let data_part = &lower[sep + 1..];
    if hrp.is_empty() || data_part.len() < 6 {
        return Err(CoreError::InvalidAddress("bech32 string too short".to_string()));
    }

    let mut data = Vec::with_capacity(data_part.len());
    for c in data_part.bytes() {
        let v = BECH32_CHARSET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| CoreError::InvalidAddress(format!("invalid bech32 character: {}", c as char)))?;
        data.push(v as u32);
    }

    let (payload, checksum) = data.split_at(data.len() - 6);
    let mut values = bech32_hrp_expand(hrp);
    values.extend_from_slice(payload);
    values.extend_from_slice(checksum);
    let polymod = bech32_polymod(&values);
    if polymod != BECH32_CONST && polymod != BECH32M_CONST {
        return Err(CoreError::InvalidAddress("bech32 checksum mismatch".to_string()));
    }

    let witver = payload[0];
    let expected_const = if witver > 0 { BECH32M_CONST } else { BECH32_CONST };
    if polymod != expected_const {
        return Err(CoreError::InvalidAddress(
            "bech32 checksum constant does not match witness version".to_string(),
        ));
    }

    let witprog = convert_bits_5_to_8(&payload[1..])?;
    if witprog.len() < 2 || witprog.len() > 40 {
        return Err(CoreError::InvalidAddress("witness program length out of range".to_string()));
    }
    if witver > 16 {
        return Err(CoreError::InvalidAddress("witness version out of range".to_string()));
    }

    Ok((witver as u8, witprog))
}

/// Derives the mainnet address for a classified output script, or `None`
/// for `op_return`/`unknown` scripts.
pub fn derive_address(script_type: ScriptType, script: &[u8]) -> Option<String> {
    match script_type {
        ScriptType::P2pkh => Some(p2pkh_address(&script[3..23])),
        ScriptType::P2sh => Some(p2sh_address(&script[2..22])),
        ScriptType::P2wpkh => Some(bech32_encode("bc", 0, &script[2..22])),
        ScriptType::P2wsh => Some(bech32_encode("bc", 0, &script[2..34])),
        ScriptType::P2tr => Some(bech32_encode("bc", 1, &script[2..34])),
        ScriptType::OpReturn | ScriptType::Unknown => None,
    }
}
