//! secp256k1 field arithmetic, just enough to recover the `y` coordinate of
//! a compressed public key from its `x` coordinate and parity bit.

use crate::bigint::{add_mod, mod_pow, mul_mod, U256};

const P_BYTES: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe, 0xff, 0xff, 0xfc, 0x2f,
];

// (p + 1) / 4, valid since p ≡ 3 (mod 4), which lets us take a square root
// by a single modular exponentiation.
const SQRT_EXP_BYTES: [u8; 32] = [
    0x3f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xbf, 0xff, 0xff, 0x0c,
];

fn p() -> U256 {
    U256::from_be_bytes(&P_BYTES)
}

/// Recovers `y` such that `y^2 = x^3 + 7 (mod p)` and `y`'s parity matches
/// `want_odd`. Returns `None` if `x` is not on the curve (should not happen
/// for valid compressed pubkeys, but undo data is untrusted input).
pub fn recover_y(x: &[u8; 32], want_odd: bool) -> Option<[u8; 32]> {
    let p = p();
    let x = U256::from_be_bytes(x);
    let x2 = mul_mod(&x, &x, &p);
    let x3 = mul_mod(&x2, &x, &p);
    let y2 = add_mod(&x3, &U256::from_u64(7), &p);

    let sqrt_exp = U256::from_be_bytes(&SQRT_EXP_BYTES);
    let y = mod_pow(&y2, &sqrt_exp, &p);

    // Verify y^2 == y2; if not, x has no square root mod p.
    if mul_mod(&y, &y, &p) != y2 {
        return None;
    }

    let is_odd = y.to_be_bytes()[31] & 1 != 0;
    let y = if is_odd == want_odd { y } else { p.sub(&y) };
    Some(y.to_be_bytes())
}
