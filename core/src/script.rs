//! Output/input script classification and the address taxonomy, plus
//! OP_RETURN payload decoding and a conventional disassembler.

use crate::address;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    P2shP2wpkh,
    P2shP2wsh,
    P2trKeypath,
    P2trScriptpath,
    OpReturn,
    Unknown,
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptType::P2pkh => "p2pkh",
            ScriptType::P2sh => "p2sh",
            ScriptType::P2wpkh => "p2wpkh",
            ScriptType::P2wsh => "p2wsh",
            ScriptType::P2tr => "p2tr",
            ScriptType::P2shP2wpkh => "p2sh-p2wpkh",
            ScriptType::P2shP2wsh => "p2sh-p2wsh",
            ScriptType::P2trKeypath => "p2tr_keypath",
            ScriptType::P2trScriptpath => "p2tr_scriptpath",
            ScriptType::OpReturn => "op_return",
            ScriptType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classifies a `scriptPubKey` by its exact byte pattern.
pub fn classify_output(script: &[u8]) -> ScriptType {
    if script.len() == 25
        && script[0] == 0x76
        && script[1] == 0xa9
        && script[2] == 0x14
        && script[23] == 0x88
        && script[24] == 0xac
    {
        return ScriptType::P2pkh;
    }
    if script.len() == 23 && script[0] == 0xa9 && script[1] == 0x14 && script[22] == 0x87 {
        return ScriptType::P2sh;
    }
    if script.len() == 22 && script[0] == 0x00 && script[1] == 0x14 {
        return ScriptType::P2wpkh;
    }
    if script.len() == 34 && script[0] == 0x00 && script[1] == 0x20 {
        return ScriptType::P2wsh;
    }
    if script.len() == 34 && script[0] == 0x51 && script[1] == 0x20 {
        return ScriptType::P2tr;
    }
    if !script.is_empty() && script[0] == 0x6a {
        return ScriptType::OpReturn;
    }
    ScriptType::Unknown
}

/// Derives the display address for a `scriptPubKey`, or `None` for script
/// types with no canonical single address (OP_RETURN, unknown, bare
/// multisig, ...).
pub fn address_for_script(script: &[u8], network: address::Network) -> Option<String> {
    match classify_output(script) {
        ScriptType::P2pkh => Some(address::base58check_encode(
            network.p2pkh_version(),
            &script[3..23],
        )),
        ScriptType::P2sh => Some(address::base58check_encode(
            network.p2sh_version(),
            &script[2..22],
        )),
        ScriptType::P2wpkh => address::segwit_encode(network.bech32_hrp(), 0, &script[2..22]),
        ScriptType::P2wsh => address::segwit_encode(network.bech32_hrp(), 0, &script[2..34]),
        ScriptType::P2tr => address::segwit_encode(network.bech32_hrp(), 1, &script[2..34]),
        _ => None,
    }
}

/// Walks a push-only `scriptSig`, returning the last pushed data (the
/// redeem-script candidate for P2SH-wrapped segwit), or `None` if the
/// script is empty or contains a non-push opcode.
fn last_push(script: &[u8]) -> Option<Vec<u8>> {
    let mut i = 0;
    let mut last: Option<Vec<u8>> = None;
    while i < script.len() {
        let op = script[i];
        match op {
            0x00 => {
                last = Some(Vec::new());
                i += 1;
            }
            0x01..=0x4b => {
                let len = op as usize;
                if i + 1 + len > script.len() {
                    return None;
                }
                last = Some(script[i + 1..i + 1 + len].to_vec());
                i += 1 + len;
            }
            0x4c => {
                if i + 2 > script.len() {
                    return None;
                }
                let len = script[i + 1] as usize;
                if i + 2 + len > script.len() {
                    return None;
                }
                last = Some(script[i + 2..i + 2 + len].to_vec());
                i += 2 + len;
            }
            0x4d => {
                if i + 3 > script.len() {
                    return None;
                }
                let len = u16::from_le_bytes([script[i + 1], script[i + 2]]) as usize;
                if i + 3 + len > script.len() {
                    return None;
                }
                last = Some(script[i + 3..i + 3 + len].to_vec());
                i += 3 + len;
            }
            0x4e => {
                if i + 5 > script.len() {
                    return None;
                }
                let len = u32::from_le_bytes([
                    script[i + 1],
                    script[i + 2],
                    script[i + 3],
                    script[i + 4],
                ]) as usize;
                if i + 5 + len > script.len() {
                    return None;
                }
                last = Some(script[i + 5..i + 5 + len].to_vec());
                i += 5 + len;
            }
            _ => {
                last = None;
                i = script.len();
            }
        }
    }
    last
}

/// Classifies a transaction input using its `scriptSig`, witness, and the
/// prevout `scriptPubKey` it spends. Every native-segwit/Taproot/P2SH-wrapped
/// result additionally requires the scriptSig/witness preconditions in the
/// table this follows; anything that doesn't meet them, including a bare
/// P2SH scriptSig that isn't a nested-segwit wrapper, is `Unknown`.
pub fn classify_input(script_sig: &[u8], witness: &[Vec<u8>], prevout_script: &[u8]) -> ScriptType {
    let prevout_type = classify_output(prevout_script);
    let has_witness = witness.iter().any(|item| !item.is_empty());

    if prevout_type == ScriptType::P2wpkh && script_sig.is_empty() && has_witness {
        return ScriptType::P2wpkh;
    }
    if prevout_type == ScriptType::P2wsh && script_sig.is_empty() && has_witness {
        return ScriptType::P2wsh;
    }
    if prevout_type == ScriptType::P2tr && script_sig.is_empty() {
        if witness.len() >= 2 {
            let last = &witness[witness.len() - 1];
            if last.len() >= 33 && (last[0] & 0xFE) == 0xC0 {
                return ScriptType::P2trScriptpath;
            }
        }
        return ScriptType::P2trKeypath;
    }
    if prevout_type == ScriptType::P2pkh {
        return ScriptType::P2pkh;
    }
    if prevout_type == ScriptType::P2sh {
        if !script_sig.is_empty() && has_witness {
            if let Some(redeem) = last_push(script_sig) {
                if redeem.len() == 22 && redeem[0] == 0x00 && redeem[1] == 0x14 {
                    return ScriptType::P2shP2wpkh;
                }
                if redeem.len() == 34 && redeem[0] == 0x00 && redeem[1] == 0x20 {
                    return ScriptType::P2shP2wsh;
                }
            }
        }
        return ScriptType::Unknown;
    }
    ScriptType::Unknown
}

/// The data payload and (best-effort) protocol tag of an OP_RETURN script.
pub struct OpReturnInfo {
    pub data_hex: String,
    pub data_utf8: Option<String>,
    pub protocol: &'static str,
}

pub fn op_return_info(script: &[u8]) -> OpReturnInfo {
    debug_assert!(!script.is_empty() && script[0] == 0x6a);
    let data = last_push(&script[1..]).unwrap_or_default();
    let data_hex = hex::encode(&data);
    let protocol = if data_hex.starts_with("6f6d6e69") {
        "omni"
    } else if data_hex.starts_with("0109f91102") {
        "opentimestamps"
    } else {
        "unknown"
    };
    let data_utf8 = String::from_utf8(data).ok();
    OpReturnInfo {
        data_hex,
        data_utf8,
        protocol,
    }
}

/// A conventional, non-authoritative textual disassembly: named opcodes by
/// mnemonic, pushes as their hex payload.
pub fn disassemble(script: &[u8]) -> String {
    let mut i = 0;
    let mut parts = Vec::new();
    while i < script.len() {
        let op = script[i];
        match op {
            0x00 => {
                parts.push("OP_0".to_string());
                i += 1;
            }
            0x01..=0x4b => {
                let len = op as usize;
                let end = (i + 1 + len).min(script.len());
                parts.push(hex::encode(&script[i + 1..end]));
                i = end;
            }
            0x4c..=0x4e => {
                let (header, len) = match op {
                    0x4c if i + 2 <= script.len() => (2, script[i + 1] as usize),
                    0x4d if i + 3 <= script.len() => {
                        (3, u16::from_le_bytes([script[i + 1], script[i + 2]]) as usize)
                    }
                    0x4e if i + 5 <= script.len() => (
                        5,
                        u32::from_le_bytes([
                            script[i + 1],
                            script[i + 2],
                            script[i + 3],
                            script[i + 4],
                        ]) as usize,
                    ),
                    _ => {
                        parts.push(format!("OP_INVALIDOPCODE({op:#04x})"));
                        i = script.len();
                        continue;
                    }
                };
                let end = (i + header + len).min(script.len());
                parts.push(hex::encode(&script[i + header..end]));
                i = end;
            }
            0x51..=0x60 => {
                parts.push(format!("OP_{}", op - 0x50));
                i += 1;
            }
            0x6a => {
                parts.push("OP_RETURN".to_string());
                i += 1;
            }
            0x76 => {
                parts.push("OP_DUP".to_string());
                i += 1;
            }
            0xa9 => {
                parts.push("OP_HASH160".to_string());
                i += 1;
            }
            0x87 => {
                parts.push("OP_EQUAL".to_string());
                i += 1;
            }
            0x88 => {
                parts.push("OP_EQUALVERIFY".to_string());
                i += 1;
            }
            0xac => {
                parts.push("OP_CHECKSIG".to_string());
                i += 1;
            }
            other => {
                parts.push(format!("OP_UNKNOWN({other:#04x})"));
                i += 1;
            }
        }
    }
    parts.join(" ")
}
