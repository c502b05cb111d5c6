//! Legacy and BIP141 SegWit transaction deserialization, txid/wtxid
//! hashing, weight/vbytes accounting, and BIP68/BIP125 sequence semantics.

use crate::error::{AnalyzerError, Result};
use crate::hash::{hash256, reverse32};
use crate::varint::Cursor;

#[derive(Debug, Clone)]
pub struct TxIn {
    /// Previous txid in display (byte-reversed) order.
    pub prev_txid: [u8; 32],
    pub vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct TxOut {
    pub n: u32,
    pub value_sats: u64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub version: i32,
    pub is_segwit: bool,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub locktime: u32,
    pub raw_bytes: Vec<u8>,
    /// Half-open byte range of the witness section within `raw_bytes`;
    /// empty for legacy transactions.
    pub witness_byte_range: (usize, usize),
}

/// Describes a sequence number's BIP68 relative-timelock semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelativeTimelock {
    Disabled,
    Blocks(u32),
    Time(u32),
}

impl RelativeTimelock {
    pub fn from_sequence(sequence: u32) -> RelativeTimelock {
        if sequence & 0x8000_0000 != 0 {
            return RelativeTimelock::Disabled;
        }
        let value = sequence & 0xFFFF;
        if sequence & 0x0040_0000 != 0 {
            RelativeTimelock::Time(value * 512)
        } else {
            RelativeTimelock::Blocks(value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocktimeType {
    None,
    BlockHeight,
    UnixTimestamp,
}

pub fn locktime_type(locktime: u32) -> LocktimeType {
    if locktime == 0 {
        LocktimeType::None
    } else if locktime < 500_000_000 {
        LocktimeType::BlockHeight
    } else {
        LocktimeType::UnixTimestamp
    }
}

impl Transaction {
    /// Parses a transaction from its raw serialized bytes. The entire
    /// buffer must be consumed; trailing bytes are an error.
    pub fn parse(raw: &[u8]) -> Result<Transaction> {
        let mut c = Cursor::new(raw);
        let tx = Transaction::parse_from_cursor(&mut c)?;
        if !c.is_at_end() {
            return Err(AnalyzerError::InvalidTx(format!(
                "{} trailing bytes after locktime",
                c.remaining()
            )));
        }
        Ok(tx)
    }

    /// Parses one transaction starting at the cursor's current position,
    /// advancing it exactly past the transaction's end. Used both for
    /// standalone transactions and for transactions embedded in a block,
    /// where more bytes follow.
    pub fn parse_from_cursor<'a>(c: &mut Cursor<'a>) -> Result<Transaction> {
        let tx_start = c.pos();
        let version = c.take_i32_le("version")?;

        let mut is_segwit = false;
        if let (Some(0x00), Some(0x01)) = (c.peek_at(0), c.peek_at(1)) {
            is_segwit = true;
            c.take(2, "segwit marker/flag")?;
        }

        let in_count = c.take_compact_size("input count")?;
        let mut inputs = Vec::with_capacity(in_count as usize);
        for _ in 0..in_count {
            let prev_txid_wire = c.take(32, "prevout txid")?;
            let mut prev_txid = [0u8; 32];
            prev_txid.copy_from_slice(prev_txid_wire);
            prev_txid = reverse32(&prev_txid);
            let vout = c.take_u32_le("prevout vout")?;
            let script_len = c.take_compact_size("scriptSig length")? as usize;
            let script_sig = c.take(script_len, "scriptSig")?.to_vec();
            let sequence = c.take_u32_le("sequence")?;
            inputs.push(TxIn {
                prev_txid,
                vout,
                script_sig,
                sequence,
                witness: Vec::new(),
            });
        }

        let out_count = c.take_compact_size("output count")?;
        let mut outputs = Vec::with_capacity(out_count as usize);
        for n in 0..out_count {
            let value_sats = c.take_u64_le("output value")?;
            let script_len = c.take_compact_size("scriptPubKey length")? as usize;
            let script_pubkey = c.take(script_len, "scriptPubKey")?.to_vec();
            outputs.push(TxOut {
                n: n as u32,
                value_sats,
                script_pubkey,
            });
        }

        let witness_start = c.pos();
        if is_segwit {
            for input in inputs.iter_mut() {
                let item_count = c.take_compact_size("witness item count")?;
                let mut items = Vec::with_capacity(item_count as usize);
                for _ in 0..item_count {
                    let len = c.take_compact_size("witness item length")? as usize;
                    items.push(c.take(len, "witness item")?.to_vec());
                }
                input.witness = items;
            }
        }
        let witness_end = c.pos();

        let locktime = c.take_u32_le("locktime")?;
        let tx_end = c.pos();

        let raw_bytes = c.slice(tx_start, tx_end).to_vec();
        let witness_byte_range = if is_segwit {
            (witness_start - tx_start, witness_end - tx_start)
        } else {
            (0, 0)
        };

        Ok(Transaction {
            version,
            is_segwit,
            inputs,
            outputs,
            locktime,
            raw_bytes,
            witness_byte_range,
        })
    }

    /// Rebuilds the legacy (non-witness) serialization, field by field,
    /// for txid hashing — rather than slicing `raw_bytes`, since the
    /// witness section for SegWit transactions is interleaved between
    /// outputs and locktime in the wire format but absent from the legacy
    /// form entirely.
    fn legacy_serialization(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        crate::varint::write_compact_size(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            let wire_txid = reverse32(&input.prev_txid);
            out.extend_from_slice(&wire_txid);
            out.extend_from_slice(&input.vout.to_le_bytes());
            crate::varint::write_compact_size(&mut out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        crate::varint::write_compact_size(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value_sats.to_le_bytes());
            crate::varint::write_compact_size(&mut out, output.script_pubkey.len() as u64);
            out.extend_from_slice(&output.script_pubkey);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    pub fn txid(&self) -> [u8; 32] {
        reverse32(&hash256(&self.legacy_serialization()))
    }

    /// `None` for legacy transactions, where wtxid is undefined.
    pub fn wtxid(&self) -> Option<[u8; 32]> {
        if !self.is_segwit {
            return None;
        }
        Some(reverse32(&hash256(&self.raw_bytes)))
    }

    pub fn size_bytes(&self) -> usize {
        self.raw_bytes.len()
    }

    /// Bytes spanned by the witness section, including the 2-byte
    /// marker+flag for SegWit transactions. Zero for legacy transactions.
    pub fn witness_bytes(&self) -> usize {
        if !self.is_segwit {
            return 0;
        }
        (self.witness_byte_range.1 - self.witness_byte_range.0) + 2
    }

    pub fn non_witness_bytes(&self) -> usize {
        self.size_bytes() - self.witness_bytes()
    }

    /// BIP141 weight: non-witness bytes counted 4x, witness bytes 1x.
    pub fn weight(&self) -> u64 {
        self.non_witness_bytes() as u64 * 4 + self.witness_bytes() as u64
    }

    pub fn vbytes(&self) -> u64 {
        self.weight().div_ceil(4)
    }

    /// Percentage of weight saved versus serializing the same transaction
    /// without witness data (weight `size_bytes * 4`).
    pub fn segwit_savings_pct(&self) -> Option<f64> {
        if !self.is_segwit {
            return None;
        }
        let weight_if_legacy = self.size_bytes() as f64 * 4.0;
        let weight_actual = self.weight() as f64;
        Some(((1.0 - weight_actual / weight_if_legacy) * 100.0 * 100.0).round() / 100.0)
    }

    /// `true` iff any input signals BIP125 replace-by-fee.
    pub fn rbf_signaling(&self) -> bool {
        self.inputs.iter().any(|i| i.sequence < 0xFFFF_FFFE)
    }

    pub fn locktime_type(&self) -> LocktimeType {
        locktime_type(self.locktime)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_txid == [0u8; 32] && self.inputs[0].vout == u32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_1in_1out_raw() -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_le_bytes()); // version
        raw.push(0x01); // input count
        raw.extend_from_slice(&[0u8; 32]); // prev txid
        raw.extend_from_slice(&0u32.to_le_bytes()); // vout
        raw.push(0x00); // empty scriptSig
        raw.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // sequence
        raw.push(0x01); // output count
        raw.extend_from_slice(&100_000_000u64.to_le_bytes()); // value
        raw.push(25); // script len
        raw.push(0x76);
        raw.push(0xa9);
        raw.push(0x14);
        raw.extend_from_slice(&[0u8; 20]);
        raw.push(0x88);
        raw.push(0xac);
        raw.extend_from_slice(&0u32.to_le_bytes()); // locktime
        raw
    }

    #[test]
    fn parses_legacy_transaction() {
        let raw = legacy_1in_1out_raw();
        let tx = Transaction::parse(&raw).unwrap();
        assert!(!tx.is_segwit);
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value_sats, 100_000_000);
        assert!(tx.wtxid().is_none());
        assert_eq!(tx.weight(), tx.size_bytes() as u64 * 4);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut raw = legacy_1in_1out_raw();
        raw.push(0xFF);
        assert!(Transaction::parse(&raw).is_err());
    }

    #[test]
    fn parses_segwit_transaction_and_computes_weight() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&2i32.to_le_bytes());
        raw.push(0x00); // marker
        raw.push(0x01); // flag
        raw.push(0x01); // input count
        raw.extend_from_slice(&[0u8; 32]);
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.push(0x00); // empty scriptSig
        raw.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        raw.push(0x01); // output count
        raw.extend_from_slice(&50_000_000u64.to_le_bytes());
        raw.push(22);
        raw.push(0x00);
        raw.push(0x14);
        raw.extend_from_slice(&[0u8; 20]);
        // witness: 1 item of 1 byte
        raw.push(0x01);
        raw.push(0x01);
        raw.push(0xAB);
        raw.extend_from_slice(&0u32.to_le_bytes()); // locktime

        let tx = Transaction::parse(&raw).unwrap();
        assert!(tx.is_segwit);
        assert!(tx.wtxid().is_some());
        assert_ne!(tx.txid(), tx.wtxid().unwrap());
        assert_eq!(tx.witness_bytes(), 2 /* marker+flag */ + 2 /* item count + len */ + 1);
        let expected_weight = tx.non_witness_bytes() as u64 * 4 + tx.witness_bytes() as u64;
        assert_eq!(tx.weight(), expected_weight);
    }

    #[test]
    fn relative_timelock_disabled_when_top_bit_set() {
        assert_eq!(
            RelativeTimelock::from_sequence(0x8000_0000),
            RelativeTimelock::Disabled
        );
    }

    #[test]
    fn relative_timelock_blocks_form() {
        assert_eq!(
            RelativeTimelock::from_sequence(0x0000_0010),
            RelativeTimelock::Blocks(16)
        );
    }

    #[test]
    fn relative_timelock_time_form() {
        assert_eq!(
            RelativeTimelock::from_sequence(0x0040_0002),
            RelativeTimelock::Time(1024)
        );
    }

    #[test]
    fn rbf_signaling_true_when_any_sequence_below_max_minus_one() {
        let mut raw = legacy_1in_1out_raw();
        // Lower the sequence field (bytes 42..46 in this fixed layout) below
        // 0xFFFFFFFE to signal RBF: 4 (version) + 1 (input count) + 32 (txid)
        // + 4 (vout) + 1 (empty scriptSig length) = 42.
        raw[42..46].copy_from_slice(&0xFFFF_FFFDu32.to_le_bytes());
        let tx = Transaction::parse(&raw).unwrap();
        assert!(tx.rbf_signaling());
    }

    #[test]
    fn rbf_signaling_false_at_max_sequence() {
        let tx = Transaction::parse(&legacy_1in_1out_raw()).unwrap();
        assert!(!tx.rbf_signaling());
    }

    #[test]
    fn locktime_type_classification() {
        assert_eq!(locktime_type(0), LocktimeType::None);
        assert_eq!(locktime_type(500_000), LocktimeType::BlockHeight);
        assert_eq!(locktime_type(600_000_000), LocktimeType::UnixTimestamp);
    }
}
