//! Splitting double words into halves and joining them again.  The
//! EAE treats AC:MQ as a single 36-bit register, AC being the more
//! significant half.

use super::onescomplement::unsigned::{Unsigned18Bit, Unsigned36Bit};

pub fn join_halves(left: Unsigned18Bit, right: Unsigned18Bit) -> Unsigned36Bit {
    Unsigned36Bit::truncate((u64::from(left) << 18) | u64::from(right))
}

pub fn left_half(w: Unsigned36Bit) -> Unsigned18Bit {
    Unsigned18Bit::truncate((w.bits() >> 18) as u32)
}

pub fn right_half(w: Unsigned36Bit) -> Unsigned18Bit {
    Unsigned18Bit::truncate((w.bits() & 0o777_777) as u32)
}

/// Returns `(left, right)`.
pub fn split_halves(w: Unsigned36Bit) -> (Unsigned18Bit, Unsigned18Bit) {
    (left_half(w), right_half(w))
}
