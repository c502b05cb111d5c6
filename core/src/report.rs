//! Assembles the final JSON-shaped transaction and block reports: fee
//! accounting, relative-timelock derivation, warning detection, and script
//! classification wired together.

use crate::address;
use crate::error::{AnalyzerError, Result};
use crate::script::{self, ScriptType};
use crate::tx::{LocktimeType, RelativeTimelock, Transaction};
use crate::undo::Prevout;
use serde::{Deserialize, Serialize};

const DUST_THRESHOLD_SATS: u64 = 546;
const HIGH_FEE_SATS: u64 = 1_000_000;
const HIGH_FEE_RATE_SAT_VB: f64 = 200.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrevoutInput {
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
    pub script_pubkey_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxAnalysisInput {
    pub network: String,
    pub raw_tx: String,
    pub prevouts: Vec<PrevoutInput>,
}

/// Matches each of `tx`'s inputs to its prevout in `prevouts_input` by
/// `(txid, vout)`, returning an ordered list aligned with `tx.inputs`.
/// Every prevout must be used exactly once.
pub fn match_prevouts(tx: &Transaction, prevouts_input: &[PrevoutInput]) -> Result<Vec<Prevout>> {
    if prevouts_input.len() != tx.inputs.len() {
        return Err(AnalyzerError::InvalidFixture(format!(
            "expected {} prevouts, got {}",
            tx.inputs.len(),
            prevouts_input.len()
        )));
    }

    let mut used = vec![false; prevouts_input.len()];
    let mut out = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let input_txid = hex::encode(input.prev_txid);
        let mut found = None;
        for (i, candidate) in prevouts_input.iter().enumerate() {
            if !used[i] && candidate.txid == input_txid && candidate.vout == input.vout {
                found = Some(i);
                break;
            }
        }
        let idx = found.ok_or_else(|| {
            AnalyzerError::InvalidFixture(format!(
                "no prevout supplied for input {input_txid}:{}",
                input.vout
            ))
        })?;
        used[idx] = true;
        let candidate = &prevouts_input[idx];
        let script_pubkey = hex::decode(&candidate.script_pubkey_hex).map_err(|e| {
            AnalyzerError::InvalidFixture(format!("invalid script_pubkey_hex: {e}"))
        })?;
        out.push(Prevout {
            height: 0,
            is_coinbase: false,
            value_sats: candidate.value_sats,
            script_pubkey,
        });
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct WarningEntry {
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RelativeTimelockReport {
    pub enabled: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
}

impl From<RelativeTimelock> for RelativeTimelockReport {
    fn from(t: RelativeTimelock) -> Self {
        match t {
            RelativeTimelock::Disabled => RelativeTimelockReport {
                enabled: false,
                kind: None,
                value: None,
            },
            RelativeTimelock::Blocks(v) => RelativeTimelockReport {
                enabled: true,
                kind: Some("blocks"),
                value: Some(v),
            },
            RelativeTimelock::Time(v) => RelativeTimelockReport {
                enabled: true,
                kind: Some("time"),
                value: Some(v),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VinReport {
    pub txid: String,
    pub vout: u32,
    pub sequence: u32,
    pub script_sig_hex: String,
    pub script_asm: String,
    pub witness: Vec<String>,
    pub script_type: ScriptType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub prevout: PrevoutSummary,
    pub relative_timelock: RelativeTimelockReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness_script_asm: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PrevoutSummary {
    pub value_sats: u64,
    pub script_pubkey_hex: String,
}

#[derive(Debug, Serialize)]
pub struct VoutReport {
    pub n: u32,
    pub value_sats: u64,
    pub script_pubkey_hex: String,
    pub script_asm: String,
    pub script_type: ScriptType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_data_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_data_utf8: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_protocol: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct SegwitSavings {
    pub witness_bytes: usize,
    pub non_witness_bytes: usize,
    pub total_bytes: usize,
    pub weight_actual: u64,
    pub weight_if_legacy: u64,
    pub savings_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct TxReport {
    pub ok: bool,
    pub network: String,
    pub segwit: bool,
    pub txid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wtxid: Option<String>,
    pub version: i32,
    pub locktime: u32,
    pub size_bytes: usize,
    pub weight: u64,
    pub vbytes: u64,
    pub total_input_sats: u64,
    pub total_output_sats: u64,
    pub fee_sats: u64,
    pub fee_rate_sat_vb: f64,
    pub rbf_signaling: bool,
    pub locktime_type: &'static str,
    pub locktime_value: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segwit_savings: Option<SegwitSavings>,
    pub vin: Vec<VinReport>,
    pub vout: Vec<VoutReport>,
    pub warnings: Vec<WarningEntry>,
}

fn locktime_type_str(t: LocktimeType) -> &'static str {
    match t {
        LocktimeType::None => "none",
        LocktimeType::BlockHeight => "block_height",
        LocktimeType::UnixTimestamp => "unix_timestamp",
    }
}

fn build_vout(out: &crate::tx::TxOut, network: address::Network) -> VoutReport {
    let script_type = script::classify_output(&out.script_pubkey);
    let address = script::address_for_script(&out.script_pubkey, network);
    let (op_return_data_hex, op_return_data_utf8, op_return_protocol) =
        if script_type == ScriptType::OpReturn {
            let info = script::op_return_info(&out.script_pubkey);
            (
                Some(info.data_hex),
                info.data_utf8,
                Some(info.protocol),
            )
        } else {
            (None, None, None)
        };
    VoutReport {
        n: out.n,
        value_sats: out.value_sats,
        script_pubkey_hex: hex::encode(&out.script_pubkey),
        script_asm: script::disassemble(&out.script_pubkey),
        script_type,
        address,
        op_return_data_hex,
        op_return_data_utf8,
        op_return_protocol,
    }
}

/// Builds the full transaction analysis report from a parsed transaction
/// and its matched prevouts (index-aligned with `tx.inputs`).
pub fn analyze_transaction(
    network: address::Network,
    tx: &Transaction,
    prevouts: &[crate::undo::Prevout],
) -> Result<TxReport> {
    if prevouts.len() != tx.inputs.len() {
        return Err(AnalyzerError::InvalidFixture(format!(
            "expected {} prevouts, got {}",
            tx.inputs.len(),
            prevouts.len()
        )));
    }

    let total_input_sats: u64 = prevouts.iter().map(|p| p.value_sats).sum();
    let total_output_sats: u64 = tx.outputs.iter().map(|o| o.value_sats).sum();
    if total_output_sats > total_input_sats {
        return Err(AnalyzerError::InvalidTx(
            "total output value exceeds total input value".into(),
        ));
    }
    let fee_sats = total_input_sats - total_output_sats;
    let vbytes = tx.vbytes();
    let fee_rate_sat_vb = round2(fee_sats as f64 / vbytes as f64);

    let mut vin = Vec::with_capacity(tx.inputs.len());
    for (input, prevout) in tx.inputs.iter().zip(prevouts.iter()) {
        let script_type =
            script::classify_input(&input.script_sig, &input.witness, &prevout.script_pubkey);
        let address = script::address_for_script(&prevout.script_pubkey, network);
        let witness_script_asm = if matches!(script_type, ScriptType::P2wsh | ScriptType::P2shP2wsh)
            && !input.witness.is_empty()
        {
            input.witness.last().map(|w| script::disassemble(w))
        } else {
            None
        };
        vin.push(VinReport {
            txid: hex::encode(input.prev_txid),
            vout: input.vout,
            sequence: input.sequence,
            script_sig_hex: hex::encode(&input.script_sig),
            script_asm: script::disassemble(&input.script_sig),
            witness: input.witness.iter().map(hex::encode).collect(),
            script_type,
            address,
            prevout: PrevoutSummary {
                value_sats: prevout.value_sats,
                script_pubkey_hex: hex::encode(&prevout.script_pubkey),
            },
            relative_timelock: RelativeTimelock::from_sequence(input.sequence).into(),
            witness_script_asm,
        });
    }

    let vout: Vec<VoutReport> = tx.outputs.iter().map(|out| build_vout(out, network)).collect();

    let segwit_savings = tx.segwit_savings_pct().map(|pct| SegwitSavings {
        witness_bytes: tx.witness_bytes(),
        non_witness_bytes: tx.non_witness_bytes(),
        total_bytes: tx.size_bytes(),
        weight_actual: tx.weight(),
        weight_if_legacy: tx.size_bytes() as u64 * 4,
        savings_pct: pct,
    });

    let warnings = detect_warnings(fee_sats, fee_rate_sat_vb, &vout, tx.rbf_signaling());

    Ok(TxReport {
        ok: true,
        network: network.as_str().to_string(),
        segwit: tx.is_segwit,
        txid: hex::encode(tx.txid()),
        wtxid: tx.wtxid().map(hex::encode),
        version: tx.version,
        locktime: tx.locktime,
        size_bytes: tx.size_bytes(),
        weight: tx.weight(),
        vbytes,
        total_input_sats,
        total_output_sats,
        fee_sats,
        fee_rate_sat_vb,
        rbf_signaling: tx.rbf_signaling(),
        locktime_type: locktime_type_str(tx.locktime_type()),
        locktime_value: tx.locktime,
        segwit_savings,
        vin,
        vout,
        warnings,
    })
}

fn detect_warnings(
    fee_sats: u64,
    fee_rate_sat_vb: f64,
    vout: &[VoutReport],
    rbf_signaling: bool,
) -> Vec<WarningEntry> {
    let mut warnings = Vec::new();
    if fee_sats > HIGH_FEE_SATS || fee_rate_sat_vb > HIGH_FEE_RATE_SAT_VB {
        warnings.push(WarningEntry { code: "HIGH_FEE" });
    }
    if vout
        .iter()
        .any(|o| o.script_type != ScriptType::OpReturn && o.value_sats < DUST_THRESHOLD_SATS)
    {
        warnings.push(WarningEntry { code: "DUST_OUTPUT" });
    }
    if vout.iter().any(|o| o.script_type == ScriptType::Unknown) {
        warnings.push(WarningEntry {
            code: "UNKNOWN_OUTPUT_SCRIPT",
        });
    }
    if rbf_signaling {
        warnings.push(WarningEntry {
            code: "RBF_SIGNALING",
        });
    }
    warnings
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
pub struct BlockHeaderReport {
    pub version: i32,
    pub prev_block_hash: String,
    pub merkle_root: String,
    pub timestamp: u32,
    pub bits: String,
    pub nonce: u32,
    pub block_hash: String,
    pub merkle_root_valid: bool,
}

#[derive(Debug, Serialize)]
pub struct CoinbaseSummary {
    pub height: u32,
    pub script_sig_hex: String,
    pub total_output_sats: u64,
}

#[derive(Debug, Serialize)]
pub struct BlockStats {
    pub total_fee_sats: u64,
    pub total_weight: u64,
    pub total_vbytes: u64,
    pub avg_fee_rate_sat_vb: f64,
    pub script_type_summary: std::collections::BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct BlockReport {
    pub ok: bool,
    pub network: String,
    pub header: BlockHeaderReport,
    pub coinbase: CoinbaseSummary,
    pub transactions: Vec<TxReport>,
    pub stats: BlockStats,
}

/// Parses `blk`/`rev` byte buffers (after XOR de-obfuscating a copy of
/// each with `xor_key`) into the single block's full report. Returns a
/// one-element list, matching the external contract's shape.
pub fn analyze_block(
    network: address::Network,
    blk_bytes: &[u8],
    rev_bytes: &[u8],
    xor_key: &[u8],
) -> Result<Vec<BlockReport>> {
    let mut blk = blk_bytes.to_vec();
    crate::block::xor_decode(&mut blk, xor_key);
    let mut rev = rev_bytes.to_vec();
    crate::block::xor_decode(&mut rev, xor_key);

    let (body_start, body_end) = crate::block::find_first_record(&blk, crate::block::MAINNET_MAGIC)?;
    let block = crate::block::parse_block(&blk[body_start..body_end])?;

    if !block.merkle_root_valid {
        return Err(AnalyzerError::MerkleRootMismatch {
            header: hex::encode(block.header.merkle_root),
            computed: hex::encode(crate::merkle::compute_merkle_root(
                &block
                    .transactions
                    .iter()
                    .map(|t| t.txid())
                    .collect::<Vec<_>>(),
            )),
        });
    }

    let coinbase_tx = block
        .transactions
        .first()
        .ok_or_else(|| AnalyzerError::InvalidBlock("block has no transactions".into()))?;
    let coinbase_script_sig = coinbase_tx
        .inputs
        .first()
        .map(|i| i.script_sig.as_slice())
        .unwrap_or(&[]);
    let height = crate::block::decode_bip34_height(coinbase_script_sig);
    let total_output_sats: u64 = coinbase_tx.outputs.iter().map(|o| o.value_sats).sum();

    let undo_records = crate::block::find_all_records(&rev, crate::block::MAINNET_MAGIC, true);
    let non_coinbase_count = (block.transactions.len() - 1) as u64;
    let undo_record =
        crate::undo::match_undo_record(&undo_records, &rev, non_coinbase_count)?;

    let mut tx_reports = Vec::with_capacity(block.transactions.len());
    let mut total_fee_sats: u64 = 0;
    let mut total_weight: u64 = 0;
    let mut total_vbytes: u64 = 0;
    let mut script_type_summary: std::collections::BTreeMap<String, u64> =
        std::collections::BTreeMap::new();

    for (i, tx) in block.transactions.iter().enumerate() {
        total_weight += tx.weight();
        for out in &tx.outputs {
            let tag = script::classify_output(&out.script_pubkey).to_string();
            *script_type_summary.entry(tag).or_insert(0) += 1;
        }

        if i == 0 {
            // Coinbase: no real prevouts, fee is always zero.
            let vout: Vec<VoutReport> = tx.outputs.iter().map(|out| build_vout(out, network)).collect();
            tx_reports.push(TxReport {
                ok: true,
                network: network.as_str().to_string(),
                segwit: tx.is_segwit,
                txid: hex::encode(tx.txid()),
                wtxid: tx.wtxid().map(hex::encode),
                version: tx.version,
                locktime: tx.locktime,
                size_bytes: tx.size_bytes(),
                weight: tx.weight(),
                vbytes: tx.vbytes(),
                total_input_sats: 0,
                total_output_sats,
                fee_sats: 0,
                fee_rate_sat_vb: 0.0,
                rbf_signaling: tx.rbf_signaling(),
                locktime_type: locktime_type_str(tx.locktime_type()),
                locktime_value: tx.locktime,
                segwit_savings: None,
                vin: Vec::new(),
                vout,
                warnings: Vec::new(),
            });
            continue;
        }

        let prevouts = undo_record
            .transactions
            .get(i - 1)
            .ok_or_else(|| AnalyzerError::UndoDataError("missing undo entry for transaction".into()))?;
        let report = analyze_transaction(network, tx, prevouts)?;
        total_fee_sats += report.fee_sats;
        total_vbytes += report.vbytes;
        tx_reports.push(report);
    }

    let avg_fee_rate_sat_vb = if total_vbytes > 0 {
        round2(total_fee_sats as f64 / total_vbytes as f64)
    } else {
        0.0
    };

    Ok(vec![BlockReport {
        ok: true,
        network: network.as_str().to_string(),
        header: BlockHeaderReport {
            version: block.header.version,
            prev_block_hash: hex::encode(block.header.prev_block_hash),
            merkle_root: hex::encode(block.header.merkle_root),
            timestamp: block.header.timestamp,
            bits: block.header.bits_hex.clone(),
            nonce: block.header.nonce,
            block_hash: hex::encode(block.header.block_hash),
            merkle_root_valid: block.merkle_root_valid,
        },
        coinbase: CoinbaseSummary {
            height,
            script_sig_hex: hex::encode(coinbase_script_sig),
            total_output_sats,
        },
        transactions: tx_reports,
        stats: BlockStats {
            total_fee_sats,
            total_weight,
            total_vbytes,
            avg_fee_rate_sat_vb,
            script_type_summary,
        },
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p2pkh_script() -> Vec<u8> {
        let mut s = vec![0x76, 0xa9, 0x14];
        s.extend_from_slice(&[0u8; 20]);
        s.extend_from_slice(&[0x88, 0xac]);
        s
    }

    fn sample_tx() -> Transaction {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes());
        raw.push(0x01);
        raw.extend_from_slice(&[0u8; 32]);
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.push(0x00);
        raw.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        raw.push(0x01);
        raw.extend_from_slice(&100_000_000u64.to_le_bytes());
        let script = p2pkh_script();
        raw.push(script.len() as u8);
        raw.extend_from_slice(&script);
        raw.extend_from_slice(&0u32.to_le_bytes());
        Transaction::parse(&raw).unwrap()
    }

    #[test]
    fn computes_fee_and_report_fields() {
        let tx = sample_tx();
        let prevouts = vec![Prevout {
            height: 1,
            is_coinbase: false,
            value_sats: 200_000_000,
            script_pubkey: p2pkh_script(),
        }];
        let report = analyze_transaction(address::Network::Mainnet, &tx, &prevouts).unwrap();
        assert_eq!(report.fee_sats, 100_000_000);
        assert_eq!(report.vout[0].script_type, ScriptType::P2pkh);
        assert_eq!(
            report.vout[0].address.as_deref(),
            Some("1111111111111111111114oLvT2")
        );
        assert!(report.warnings.iter().any(|w| w.code == "HIGH_FEE"));
    }

    #[test]
    fn rejects_mismatched_prevout_count() {
        let tx = sample_tx();
        let err = analyze_transaction(address::Network::Mainnet, &tx, &[]).unwrap_err();
        assert_eq!(err.code(), "INVALID_FIXTURE");
    }

    #[test]
    fn rejects_negative_fee() {
        let tx = sample_tx();
        let prevouts = vec![Prevout {
            height: 1,
            is_coinbase: false,
            value_sats: 1,
            script_pubkey: p2pkh_script(),
        }];
        let err = analyze_transaction(address::Network::Mainnet, &tx, &prevouts).unwrap_err();
        assert_eq!(err.code(), "INVALID_TX");
    }

    #[test]
    fn dust_output_warning_triggers_below_threshold() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes());
        raw.push(0x01);
        raw.extend_from_slice(&[0u8; 32]);
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.push(0x00);
        raw.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        raw.push(0x01);
        raw.extend_from_slice(&500u64.to_le_bytes()); // below dust threshold
        let script = p2pkh_script();
        raw.push(script.len() as u8);
        raw.extend_from_slice(&script);
        raw.extend_from_slice(&0u32.to_le_bytes());
        let tx = Transaction::parse(&raw).unwrap();

        let prevouts = vec![Prevout {
            height: 1,
            is_coinbase: false,
            value_sats: 1_000,
            script_pubkey: p2pkh_script(),
        }];
        let report = analyze_transaction(address::Network::Mainnet, &tx, &prevouts).unwrap();
        assert!(report.warnings.iter().any(|w| w.code == "DUST_OUTPUT"));
    }
}
