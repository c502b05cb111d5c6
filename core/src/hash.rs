use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Double SHA-256, as used throughout the consensus layer for txids, block
/// hashes and merkle nodes.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// RIPEMD-160(SHA-256(x)), used to derive pubkey/script hashes for P2PKH and
/// P2SH.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    ripemd.into()
}

/// Reverses a 32-byte digest between wire (internal) order and display
/// order. Self-inverse.
pub fn reverse32(bytes: &[u8; 32]) -> [u8; 32] {
    let mut out = *bytes;
    out.reverse();
    out
}
