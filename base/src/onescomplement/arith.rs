//! Word arithmetic.
//!
//! ADD treats its operands as one's-complement values and folds the
//! carry out of the top bit back into the bottom ("end-around
//! carry").  TAD is a plain 19-bit addition over L:AC, so a carry out
//! of AC complements the link.  The index registers of the largest
//! machine are two's-complement values.

use super::unsigned::Unsigned18Bit;

const WORD_MASK: u32 = 0o777_777;

/// The result of a one's-complement addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnesComplementSum {
    pub sum: Unsigned18Bit,
    /// Both operands had the same sign but the sum does not.
    pub overflow: bool,
}

pub fn ones_complement_add(a: Unsigned18Bit, b: Unsigned18Bit) -> OnesComplementSum {
    let mut total = a.bits() + b.bits();
    if total > WORD_MASK {
        total = (total + 1) & WORD_MASK;
    }
    let sum = Unsigned18Bit::truncate(total);
    OnesComplementSum {
        sum,
        overflow: a.sign_bit() == b.sign_bit() && sum.sign_bit() != a.sign_bit(),
    }
}

/// Adds `m` to the 19-bit quantity `link`:`ac`, returning the new link
/// and accumulator.
pub fn twos_complement_add_with_link(
    link: bool,
    ac: Unsigned18Bit,
    m: Unsigned18Bit,
) -> (bool, Unsigned18Bit) {
    let total = ac.bits() + m.bits();
    let carry = total > WORD_MASK;
    (link ^ carry, Unsigned18Bit::truncate(total))
}

/// Sign-extends the low `width` bits of `value`.
pub const fn sign_extend(value: u32, width: u32) -> i32 {
    let shift = 32 - width;
    ((value << shift) as i32) >> shift
}

/// Reads an 18-bit word as a two's-complement value.
pub fn twos_complement_value(w: Unsigned18Bit) -> i32 {
    sign_extend(w.bits(), 18)
}

/// The 18-bit two's-complement encoding of `n` (modulo 2^18).
pub fn from_twos_complement(n: i32) -> Unsigned18Bit {
    Unsigned18Bit::truncate(n as u32)
}
