//! Bitcoin Core's `CTxOutCompressor` inverse operations, used to expand the
//! compact amounts and scripts stored in undo data.

use crate::error::{AnalyzerError, Result};
use crate::secp;
use crate::varint::Cursor;

/// Inverse of Bitcoin Core's `CompressAmount`. `0` decompresses to `0`;
/// otherwise the compressed value encodes a digit-by-digit reconstruction
/// of the original satoshi amount with trailing zeros factored out.
pub fn decompress_amount(compressed: u64) -> Result<u64> {
    if compressed == 0 {
        return Ok(0);
    }
    let mut x = compressed - 1;
    let e = x % 10;
    x /= 10;
    let n = if e < 9 {
        let d = x % 9 + 1;
        x /= 9;
        x * 10 + d
    } else {
        x + 1
    };
    n.checked_mul(10u64.pow(e as u32))
        .ok_or_else(|| AnalyzerError::UndoDataError("amount overflow during decompression".into()))
}

/// Reads one core-varint `nSize` and the bytes that follow it, and expands
/// them into a full `scriptPubKey`, per Bitcoin Core's `CScriptCompressor`.
pub fn decompress_script(cursor: &mut Cursor<'_>) -> Result<Vec<u8>> {
    let n_size = cursor.take_core_varint("script nSize")?;
    match n_size {
        0 => {
            let h = cursor.take(20, "p2pkh hash")?;
            let mut out = vec![0x76, 0xa9, 0x14];
            out.extend_from_slice(h);
            out.extend_from_slice(&[0x88, 0xac]);
            Ok(out)
        }
        1 => {
            let h = cursor.take(20, "p2sh hash")?;
            let mut out = vec![0xa9, 0x14];
            out.extend_from_slice(h);
            out.push(0x87);
            Ok(out)
        }
        2 | 3 => {
            let x = cursor.take(32, "compressed pubkey x")?;
            let mut out = vec![0x21, n_size as u8];
            out.extend_from_slice(x);
            out.push(0xac);
            Ok(out)
        }
        4 | 5 => {
            let x_bytes = cursor.take(32, "compressed pubkey x")?;
            let mut x = [0u8; 32];
            x.copy_from_slice(x_bytes);
            let want_odd = n_size == 5;
            let y = secp::recover_y(&x, want_odd).ok_or_else(|| {
                AnalyzerError::UndoDataError("x is not a valid secp256k1 coordinate".into())
            })?;
            let mut out = vec![0x41, 0x04];
            out.extend_from_slice(&x);
            out.extend_from_slice(&y);
            out.push(0xac);
            Ok(out)
        }
        n => {
            let len = (n - 6) as usize;
            Ok(cursor.take(len, "raw undo script")?.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompress_amount_zero_is_zero() {
        assert_eq!(decompress_amount(0).unwrap(), 0);
    }

    #[test]
    fn decompress_amount_matches_bitcoin_core_pattern() {
        // compressed = 1 -> x = 0, e = 0, x/=10 -> 0, d = 0%9+1 = 1, x/=9 -> 0,
        // n = 0*10+1 = 1, result = 1 * 10^0 = 1.
        assert_eq!(decompress_amount(1).unwrap(), 1);
    }

    #[test]
    fn decompress_amount_e_equals_nine_branch() {
        // compressed - 1 = 9 so e = 9 % 10 = 9, x /= 10 -> 0, n = x + 1 = 1,
        // result = 1 * 10^9.
        let compressed = 10;
        assert_eq!(decompress_amount(compressed).unwrap(), 1_000_000_000);
    }

    #[test]
    fn decompress_script_p2pkh_template() {
        let mut raw = vec![0x00]; // core-varint nSize = 0
        raw.extend_from_slice(&[0xAAu8; 20]);
        let mut c = Cursor::new(&raw);
        let script = decompress_script(&mut c).unwrap();
        assert_eq!(script[0], 0x76);
        assert_eq!(&script[3..23], &[0xAAu8; 20]);
    }

    #[test]
    fn decompress_script_raw_script_branch() {
        let payload = vec![0x51, 0x52, 0x53];
        let mut raw = vec![(payload.len() + 6) as u8];
        raw.extend_from_slice(&payload);
        let mut c = Cursor::new(&raw);
        let script = decompress_script(&mut c).unwrap();
        assert_eq!(script, payload);
    }
}
