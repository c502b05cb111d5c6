//! Merkle root reconstruction from an ordered list of txids, matching
//! Bitcoin Core's duplicate-last-element handling for odd-sized levels.

use crate::hash::{hash256, reverse32};

/// Computes the merkle root from a list of txids given in display (reversed)
/// order, returning the root in the same display order. An empty list
/// yields the all-zero root.
pub fn compute_merkle_root(txids: &[[u8; 32]]) -> [u8; 32] {
    if txids.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<[u8; 32]> = txids.iter().map(reverse32).collect();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().unwrap();
            level.push(last);
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(&pair[0]);
            buf.extend_from_slice(&pair[1]);
            next.push(hash256(&buf));
        }
        level = next;
    }
    reverse32(&level[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_all_zero() {
        assert_eq!(compute_merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn single_txid_is_its_own_root() {
        let txid = [0x11u8; 32];
        assert_eq!(compute_merkle_root(&[txid]), txid);
    }

    #[test]
    fn odd_count_duplicates_last_element() {
        let a = [0x01u8; 32];
        let b = [0x02u8; 32];
        let c = [0x03u8; 32];
        let root_three = compute_merkle_root(&[a, b, c]);
        let root_four = compute_merkle_root(&[a, b, c, c]);
        assert_eq!(root_three, root_four);
    }

    #[test]
    fn two_txids_hash_pairwise() {
        let a = [0x01u8; 32];
        let b = [0x02u8; 32];
        let mut buf = Vec::new();
        buf.extend_from_slice(&reverse32(&a));
        buf.extend_from_slice(&reverse32(&b));
        let expected = reverse32(&hash256(&buf));
        assert_eq!(compute_merkle_root(&[a, b]), expected);
    }
}
