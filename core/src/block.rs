//! Block-file record framing (XOR de-obfuscation, magic-delimited records),
//! block header parsing, and BIP34 coinbase height decoding.

use crate::error::{AnalyzerError, Result};
use crate::hash::{hash256, reverse32};
use crate::tx::Transaction;
use crate::varint::Cursor;

pub const MAINNET_MAGIC: [u8; 4] = [0xF9, 0xBE, 0xB4, 0xD9];

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub version: i32,
    /// Display (byte-reversed) order.
    pub prev_block_hash: [u8; 32],
    /// Display (byte-reversed) order.
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    /// Rendered as Bitcoin Core does: the 4 wire bytes, byte-reversed, as
    /// hex — not as a decimal integer.
    pub bits_hex: String,
    pub nonce: u32,
    /// hash256 of the 80-byte header, display order.
    pub block_hash: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub merkle_root_valid: bool,
}

/// XORs `data` in place with `key`, cycling the key. A no-op for an empty
/// or all-zero key.
pub fn xor_decode(data: &mut [u8], key: &[u8]) {
    if key.is_empty() || key.iter().all(|&b| b == 0) {
        return;
    }
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % key.len()];
    }
}

/// Parses the fixed 80-byte block header.
pub fn parse_header(bytes: &[u8]) -> Result<BlockHeader> {
    if bytes.len() < 80 {
        return Err(AnalyzerError::InvalidBlock(format!(
            "header truncated: {} bytes, need 80",
            bytes.len()
        )));
    }
    let header_bytes = &bytes[..80];
    let mut c = Cursor::new(header_bytes);
    let version = c.take_i32_le("header version")?;
    let mut prev = [0u8; 32];
    prev.copy_from_slice(c.take(32, "prev block hash")?);
    let mut merkle = [0u8; 32];
    merkle.copy_from_slice(c.take(32, "merkle root")?);
    let timestamp = c.take_u32_le("timestamp")?;
    let bits_wire = c.take(4, "bits")?;
    let mut bits_rev = bits_wire.to_vec();
    bits_rev.reverse();
    let nonce = c.take_u32_le("nonce")?;

    Ok(BlockHeader {
        version,
        prev_block_hash: reverse32(&prev),
        merkle_root: reverse32(&merkle),
        timestamp,
        bits_hex: hex::encode(bits_rev),
        nonce,
        block_hash: reverse32(&hash256(header_bytes)),
    })
}

/// Scans for the first occurrence of `magic`, reads its 4-byte LE size, and
/// returns the byte range `(start, end)` of the record body.
pub fn find_first_record(data: &[u8], magic: [u8; 4]) -> Result<(usize, usize)> {
    let pos = data
        .windows(4)
        .position(|w| w == magic)
        .ok_or_else(|| AnalyzerError::InvalidBlock("block magic bytes not found".into()))?;
    let size_start = pos + 4;
    if data.len() < size_start + 4 {
        return Err(AnalyzerError::InvalidBlock(
            "truncated record size field".into(),
        ));
    }
    let size = u32::from_le_bytes([
        data[size_start],
        data[size_start + 1],
        data[size_start + 2],
        data[size_start + 3],
    ]) as usize;
    let body_start = size_start + 4;
    let body_end = body_start + size;
    if data.len() < body_end {
        return Err(AnalyzerError::InvalidBlock(
            "truncated record body".into(),
        ));
    }
    Ok((body_start, body_end))
}

/// Scans every `magic`-delimited record in `data`. When `has_trailing_hash`
/// is set (undo files), the reported body range excludes the trailing
/// 32-byte hash that follows each record.
pub fn find_all_records(
    data: &[u8],
    magic: [u8; 4],
    has_trailing_hash: bool,
) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos + 8 <= data.len() {
        if data[pos..pos + 4] != magic {
            pos += 1;
            continue;
        }
        let size_start = pos + 4;
        if data.len() < size_start + 4 {
            break;
        }
        let size = u32::from_le_bytes([
            data[size_start],
            data[size_start + 1],
            data[size_start + 2],
            data[size_start + 3],
        ]) as usize;
        let body_start = size_start + 4;
        let trailer = if has_trailing_hash { 32 } else { 0 };
        let body_end = body_start + size;
        let record_end = body_end + trailer;
        if data.len() < record_end {
            break;
        }
        out.push((body_start, body_end));
        pos = record_end;
    }
    out
}

/// Decodes a BIP34 coinbase height: the first byte of the coinbase
/// `scriptSig` is a push length, the following bytes (little-endian) are
/// the height. Truncated or zero-length pushes decode to height 0.
/// A push longer than 4 bytes is unusual (no real chain height needs one) but
/// still decodes: only the low 4 bytes (the push's first 4 LE bytes) are
/// kept, matching what fits in the return type rather than rejecting it.
pub fn decode_bip34_height(coinbase_script_sig: &[u8]) -> u32 {
    if coinbase_script_sig.is_empty() {
        return 0;
    }
    let len = coinbase_script_sig[0] as usize;
    if len == 0 || coinbase_script_sig.len() < 1 + len {
        return 0;
    }
    let mut buf = [0u8; 4];
    let used = len.min(4);
    buf[..used].copy_from_slice(&coinbase_script_sig[1..1 + used]);
    u32::from_le_bytes(buf)
}

/// Parses a single block: 80-byte header, compact-size tx count, then that
/// many transactions, validating the merkle root against the header.
pub fn parse_block(body: &[u8]) -> Result<Block> {
    let header = parse_header(body)?;
    let mut c = Cursor::new(body);
    c.take(80, "header")?;
    let tx_count = c.take_compact_size("tx count")?;
    let mut transactions = Vec::with_capacity(tx_count as usize);
    for _ in 0..tx_count {
        transactions.push(Transaction::parse_from_cursor(&mut c)?);
    }

    let txids: Vec<[u8; 32]> = transactions.iter().map(|t| t.txid()).collect();
    let computed = crate::merkle::compute_merkle_root(&txids);
    let merkle_root_valid = computed == header.merkle_root;

    Ok(Block {
        header,
        transactions,
        merkle_root_valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_decode_is_noop_with_all_zero_key() {
        let mut data = vec![1, 2, 3];
        xor_decode(&mut data, &[0, 0, 0, 0]);
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn xor_decode_is_self_inverse() {
        let original = vec![0xDEu8, 0xAD, 0xBE, 0xEF, 0x01];
        let key = [0x11u8, 0x22, 0x33];
        let mut data = original.clone();
        xor_decode(&mut data, &key);
        assert_ne!(data, original);
        xor_decode(&mut data, &key);
        assert_eq!(data, original);
    }

    #[test]
    fn decode_bip34_height_basic() {
        // push length 3, height 500000 (LE: a0 86 07).
        let script = [0x03u8, 0xa0, 0x86, 0x07];
        assert_eq!(decode_bip34_height(&script), 500_000);
    }

    #[test]
    fn decode_bip34_height_truncated_is_zero() {
        assert_eq!(decode_bip34_height(&[]), 0);
        assert_eq!(decode_bip34_height(&[0x03, 0x01]), 0);
    }

    #[test]
    fn decode_bip34_height_over_length_push_keeps_low_4_bytes() {
        // push length 6; only the first 4 LE bytes (a0 86 07 00) are kept.
        let script = [0x06u8, 0xa0, 0x86, 0x07, 0x00, 0xFF, 0xFF];
        assert_eq!(decode_bip34_height(&script), 500_000);
    }

    #[test]
    fn find_first_record_locates_body_after_magic_and_size() {
        let mut data = Vec::new();
        data.extend_from_slice(&MAINNET_MAGIC);
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        let (start, end) = find_first_record(&data, MAINNET_MAGIC).unwrap();
        assert_eq!(&data[start..end], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn find_all_records_skips_trailing_hash_for_undo_files() {
        let mut data = Vec::new();
        for body in [[0xAAu8; 2], [0xBBu8; 2]] {
            data.extend_from_slice(&MAINNET_MAGIC);
            data.extend_from_slice(&(body.len() as u32).to_le_bytes());
            data.extend_from_slice(&body);
            data.extend_from_slice(&[0u8; 32]); // trailing hash
        }
        let records = find_all_records(&data, MAINNET_MAGIC, true);
        assert_eq!(records.len(), 2);
        assert_eq!(&data[records[0].0..records[0].1], &[0xAAu8; 2]);
        assert_eq!(&data[records[1].0..records[1].1], &[0xBBu8; 2]);
    }
}
