//! Unpacked floating-point values and their memory formats.
//!
//! A [`Ufp`] holds a sign, a binary exponent and a 35-bit magnitude;
//! its value is `mantissa * 2^(exp - 35)`.  Integers use the same
//! representation with an exponent of 35.  A value is normalized when
//! mantissa bit 34 is set.
//!
//! Arithmetic returns the result together with up to 35 further bits
//! of precision, which the processor keeps in its FMQ register.
use std::fmt::{self, Display, Formatter};
use std::ops::RangeInclusive;

use serde::Serialize;

use base::arith::sign_extend;

use super::Fp15Exception;

pub const MANTISSA_BITS: u32 = 35;
pub const MANTISSA_MASK: u64 = (1 << MANTISSA_BITS) - 1;
pub const NORMALIZED_BIT: u64 = 1 << 34;
/// The top bit of FMQ.
pub const GUARD_BIT: u64 = 1 << 34;

const HI_MASK: u32 = 0o377_777;
const WORD_MASK: u32 = 0o777_777;
const WORD_SIGN: u32 = 0o400_000;

/// Single precision keeps 26 bits of mantissa; these are the bits
/// below them.
const SINGLE_DROPPED: u64 = 0o777;
const SINGLE_LSB: u64 = 1 << 9;
const SINGLE_GUARD: u64 = 1 << 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    pub fn exponent_range(self) -> RangeInclusive<i32> {
        match self {
            Precision::Single => -0o400..=0o377,
            Precision::Double => -0o400_000..=0o377_777,
        }
    }

    /// Integers which fit the memory format.
    fn integer_range(self) -> RangeInclusive<i128> {
        match self {
            Precision::Single => -(1 << 17)..=(1 << 17) - 1,
            Precision::Double => -(MANTISSA_MASK as i128)..=MANTISSA_MASK as i128,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Ufp {
    pub sign: bool,
    pub exp: i32,
    /// High 17 bits of the mantissa.
    pub hi: u32,
    /// Low 18 bits of the mantissa.
    pub lo: u32,
}

impl Ufp {
    pub const ZERO: Ufp = Ufp {
        sign: false,
        exp: 0,
        hi: 0,
        lo: 0,
    };

    pub fn from_parts(sign: bool, exp: i32, mantissa: u64) -> Ufp {
        let mantissa = mantissa & MANTISSA_MASK;
        Ufp {
            sign,
            exp,
            hi: (mantissa >> 18) as u32,
            lo: (mantissa as u32) & WORD_MASK,
        }
    }

    pub fn integer(negative: bool, magnitude: u64) -> Ufp {
        Ufp::from_parts(negative, MANTISSA_BITS as i32, magnitude)
    }

    pub fn mantissa(&self) -> u64 {
        (u64::from(self.hi) << 18) | u64::from(self.lo)
    }

    pub fn is_zero(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }

    pub fn is_normalized(&self) -> bool {
        self.mantissa() & NORMALIZED_BIT != 0
    }

    pub fn to_f64(&self) -> f64 {
        let magnitude = self.mantissa() as f64 * 2f64.powi(self.exp - MANTISSA_BITS as i32);
        if self.sign {
            -magnitude
        } else {
            magnitude
        }
    }

    /// The integer part of the value, or `None` if it does not fit in
    /// 35 bits.
    pub fn fix(&self) -> Option<i128> {
        let mant = self.mantissa();
        let magnitude = if mant == 0 || self.exp <= 0 {
            0
        } else if self.exp > MANTISSA_BITS as i32 {
            return None;
        } else {
            mant >> (MANTISSA_BITS as i32 - self.exp)
        };
        let magnitude = i128::from(magnitude);
        Some(if self.sign { -magnitude } else { magnitude })
    }

    /// Builds an integer value, failing if it is out of range for
    /// `precision`.
    pub fn from_integer(n: i128, precision: Precision) -> Result<Ufp, Fp15Exception> {
        if !precision.integer_range().contains(&n) {
            return Err(Fp15Exception::Overflow);
        }
        Ok(Ufp::integer(n < 0, n.unsigned_abs() as u64))
    }
}

impl Display for Ufp {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.to_f64())
    }
}

/// Shifts `v` left until it is normalized, taking bits from `fmq`,
/// then optionally rounds.  A true zero comes back with a zero sign
/// and exponent.
pub fn normalize(v: Ufp, fmq: u64, round: bool, precision: Precision) -> (Ufp, u64) {
    let mut mant = v.mantissa();
    let mut fmq = fmq & MANTISSA_MASK;
    let mut exp = v.exp;
    if mant == 0 && fmq == 0 {
        return (Ufp::ZERO, 0);
    }
    while mant & NORMALIZED_BIT == 0 {
        mant = (mant << 1) | (fmq >> (MANTISSA_BITS - 1));
        fmq = (fmq << 1) & MANTISSA_MASK;
        exp -= 1;
    }
    if round {
        match precision {
            Precision::Double => {
                if fmq & GUARD_BIT != 0 {
                    mant += 1;
                }
            }
            Precision::Single => {
                if mant & SINGLE_GUARD != 0 {
                    mant += SINGLE_LSB;
                }
                mant &= !SINGLE_DROPPED;
            }
        }
        if mant > MANTISSA_MASK {
            mant >>= 1;
            exp += 1;
        }
    }
    (Ufp::from_parts(v.sign, exp, mant), fmq)
}

pub fn add(a: Ufp, b: Ufp) -> (Ufp, u64) {
    if b.is_zero() {
        return (a, 0);
    }
    if a.is_zero() {
        return (b, 0);
    }
    let (big, small) = if a.exp >= b.exp { (a, b) } else { (b, a) };
    let shift = big.exp.abs_diff(small.exp);
    let mb = u128::from(big.mantissa()) << MANTISSA_BITS;
    let ms = if shift >= 2 * MANTISSA_BITS {
        0
    } else {
        (u128::from(small.mantissa()) << MANTISSA_BITS) >> shift
    };
    let (sign, mut sum) = if big.sign == small.sign {
        (big.sign, mb + ms)
    } else if mb >= ms {
        (big.sign, mb - ms)
    } else {
        (small.sign, ms - mb)
    };
    let mut exp = big.exp;
    if sum >> (2 * MANTISSA_BITS) != 0 {
        sum >>= 1;
        exp += 1;
    }
    split(sign, exp, sum)
}

pub fn negate(v: Ufp) -> Ufp {
    Ufp { sign: !v.sign, ..v }
}

pub fn multiply(a: Ufp, b: Ufp) -> (Ufp, u64) {
    let product = u128::from(a.mantissa()) * u128::from(b.mantissa());
    split(a.sign != b.sign, a.exp + b.exp, product)
}

pub fn divide(a: Ufp, b: Ufp) -> Result<(Ufp, u64), Fp15Exception> {
    if b.is_zero() {
        return Err(Fp15Exception::DivideCheck);
    }
    if a.is_zero() {
        return Ok((Ufp::ZERO, 0));
    }
    let mut quotient = divide_mantissas(a.mantissa(), b.mantissa());
    let mut exp = a.exp - b.exp;
    while quotient >> (2 * MANTISSA_BITS) != 0 {
        quotient >>= 1;
        exp += 1;
    }
    Ok(split(a.sign != b.sign, exp, quotient))
}

/// 70 fraction bits of `dividend / divisor`.
fn divide_mantissas(dividend: u64, divisor: u64) -> u128 {
    (u128::from(dividend) << (2 * MANTISSA_BITS)) / u128::from(divisor)
}

/// Splits a 70-bit result into the mantissa and FMQ.
fn split(sign: bool, exp: i32, wide: u128) -> (Ufp, u64) {
    let mant = (wide >> MANTISSA_BITS) as u64;
    let fmq = (wide as u64) & MANTISSA_MASK;
    (Ufp::from_parts(sign, exp, mant), fmq)
}

/// The layouts of operands in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperandFormat {
    /// One word, two's complement.
    SingleInteger,
    /// Two words, 36-bit two's complement.
    DoubleInteger,
    /// Exponent (9 bits, two's complement), sign and 26 bits of
    /// mantissa in two words.
    SingleFloat,
    /// Exponent word, then sign and 35 bits of mantissa.
    DoubleFloat,
}

impl OperandFormat {
    pub fn select(double: bool, float: bool) -> OperandFormat {
        match (double, float) {
            (false, false) => OperandFormat::SingleInteger,
            (true, false) => OperandFormat::DoubleInteger,
            (false, true) => OperandFormat::SingleFloat,
            (true, true) => OperandFormat::DoubleFloat,
        }
    }

    pub fn words(self) -> usize {
        match self {
            OperandFormat::SingleInteger => 1,
            OperandFormat::DoubleInteger | OperandFormat::SingleFloat => 2,
            OperandFormat::DoubleFloat => 3,
        }
    }

    pub fn precision(self) -> Precision {
        match self {
            OperandFormat::SingleInteger | OperandFormat::SingleFloat => Precision::Single,
            OperandFormat::DoubleInteger | OperandFormat::DoubleFloat => Precision::Double,
        }
    }
}

/// Decodes an operand.  `words` must hold at least `format.words()`
/// words.  The most negative double integer, -2^35, has no 35-bit
/// magnitude and overflows.
pub fn unpack(format: OperandFormat, words: &[u32]) -> Result<Ufp, Fp15Exception> {
    let w = |i: usize| words.get(i).copied().unwrap_or(0) & WORD_MASK;
    Ok(match format {
        OperandFormat::SingleInteger => {
            let n = i128::from(sign_extend(w(0), 18));
            Ufp::integer(n < 0, n.unsigned_abs() as u64)
        }
        OperandFormat::DoubleInteger => {
            let raw = (u64::from(w(0)) << 18) | u64::from(w(1));
            let negative = raw & (1 << 35) != 0;
            let magnitude = if negative { (1u64 << 36) - raw } else { raw };
            if magnitude > MANTISSA_MASK {
                return Err(Fp15Exception::Overflow);
            }
            Ufp::integer(negative, magnitude)
        }
        OperandFormat::SingleFloat => {
            let exp = sign_extend(w(0) >> 9, 9);
            let mant26 = (u64::from(w(0) & 0o377) << 18) | u64::from(w(1));
            Ufp::from_parts(w(0) & 0o400 != 0, exp, mant26 << 9)
        }
        OperandFormat::DoubleFloat => {
            let exp = sign_extend(w(0), 18);
            let mant = (u64::from(w(1) & HI_MASK) << 18) | u64::from(w(2));
            Ufp::from_parts(w(1) & WORD_SIGN != 0, exp, mant)
        }
    })
}

/// Encodes a value for storing.  Fails when the value cannot be
/// represented.
pub fn pack(format: OperandFormat, v: Ufp) -> Result<Vec<u32>, Fp15Exception> {
    match format {
        OperandFormat::SingleInteger => {
            let n = v.fix().ok_or(Fp15Exception::Overflow)?;
            if !Precision::Single.integer_range().contains(&n) {
                return Err(Fp15Exception::Overflow);
            }
            Ok(vec![(n as u32) & WORD_MASK])
        }
        OperandFormat::DoubleInteger => {
            let n = v.fix().ok_or(Fp15Exception::Overflow)?;
            let raw = (n as u64) & ((1 << 36) - 1);
            Ok(vec![(raw >> 18) as u32, (raw as u32) & WORD_MASK])
        }
        OperandFormat::SingleFloat => {
            if v.is_zero() {
                return Ok(vec![0, 0]);
            }
            check_exponent(v.exp, Precision::Single)?;
            let mant26 = v.mantissa() >> 9;
            let sign = if v.sign { 0o400 } else { 0 };
            Ok(vec![
                (((v.exp as u32) & 0o777) << 9) | sign | ((mant26 >> 18) as u32 & 0o377),
                (mant26 as u32) & WORD_MASK,
            ])
        }
        OperandFormat::DoubleFloat => {
            if v.is_zero() {
                return Ok(vec![0, 0, 0]);
            }
            check_exponent(v.exp, Precision::Double)?;
            let sign = if v.sign { WORD_SIGN } else { 0 };
            Ok(vec![(v.exp as u32) & WORD_MASK, sign | v.hi, v.lo])
        }
    }
}

pub fn check_exponent(exp: i32, precision: Precision) -> Result<(), Fp15Exception> {
    let range = precision.exponent_range();
    if exp > *range.end() {
        Err(Fp15Exception::Overflow)
    } else if exp < *range.start() {
        Err(Fp15Exception::Underflow)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    /// Builds a normalized value from a double.
    fn ufp(x: f64) -> Ufp {
        if x == 0.0 {
            return Ufp::ZERO;
        }
        let mut m = x.abs();
        let mut exp = 0;
        while m >= 1.0 {
            m /= 2.0;
            exp += 1;
        }
        while m < 0.5 {
            m *= 2.0;
            exp -= 1;
        }
        Ufp::from_parts(x < 0.0, exp, (m * (1u64 << 35) as f64) as u64)
    }

    #[test]
    fn test_ufp_helper() {
        let one = ufp(1.0);
        assert_eq!(one.exp, 1);
        assert_eq!(one.mantissa(), NORMALIZED_BIT);
        assert_eq!(one.to_f64(), 1.0);
        assert!(one.is_normalized());
    }

    #[test]
    fn test_normalize_zero() {
        let v = Ufp::from_parts(true, 12, 0);
        assert_eq!(normalize(v, 0, true, Precision::Double), (Ufp::ZERO, 0));
    }

    #[test]
    fn test_normalize_pulls_from_fmq() {
        let v = Ufp::from_parts(false, 35, 1);
        let (n, fmq) = normalize(v, GUARD_BIT, false, Precision::Double);
        assert_eq!(n.exp, 1);
        assert_eq!(n.mantissa(), NORMALIZED_BIT | (NORMALIZED_BIT >> 1));
        assert_eq!(fmq, 0);
    }

    #[test]
    fn test_rounding_carry_renormalizes() {
        let v = Ufp::from_parts(false, 3, MANTISSA_MASK);
        let (n, _) = normalize(v, GUARD_BIT, true, Precision::Double);
        assert_eq!(n.exp, 4);
        assert_eq!(n.mantissa(), NORMALIZED_BIT);
    }

    #[test]
    fn test_single_precision_rounding() {
        let v = Ufp::from_parts(false, 1, NORMALIZED_BIT | SINGLE_GUARD | 1);
        let (n, _) = normalize(v, 0, true, Precision::Single);
        assert_eq!(n.mantissa(), NORMALIZED_BIT | SINGLE_LSB);
    }

    #[test]
    fn test_arithmetic() {
        let (sum, _) = add(ufp(1.5), ufp(2.25));
        assert_eq!(normalize(sum, 0, true, Precision::Double).0.to_f64(), 3.75);
        let (diff, fmq) = add(ufp(1.5), negate(ufp(2.25)));
        assert_eq!(normalize(diff, fmq, true, Precision::Double).0.to_f64(), -0.75);
        let (p, fmq) = multiply(ufp(-3.0), ufp(0.5));
        assert_eq!(normalize(p, fmq, true, Precision::Double).0.to_f64(), -1.5);
        let (q, fmq) = divide(ufp(10.0), ufp(4.0)).expect("divisor is not zero");
        assert_eq!(normalize(q, fmq, true, Precision::Double).0.to_f64(), 2.5);
    }

    #[test]
    fn test_cancellation_gives_true_zero() {
        let (diff, fmq) = add(ufp(6.0), ufp(-6.0));
        assert_eq!(normalize(diff, fmq, true, Precision::Double), (Ufp::ZERO, 0));
    }

    #[test]
    fn test_divide_check() {
        assert_eq!(divide(ufp(1.0), Ufp::ZERO), Err(Fp15Exception::DivideCheck));
        assert_eq!(divide(Ufp::ZERO, ufp(3.0)), Ok((Ufp::ZERO, 0)));
    }

    #[test]
    fn test_fix() {
        assert_eq!(ufp(7.75).fix(), Some(7));
        assert_eq!(ufp(-2.5).fix(), Some(-2));
        assert_eq!(ufp(0.25).fix(), Some(0));
        assert_eq!(Ufp::from_parts(false, 40, NORMALIZED_BIT).fix(), None);
    }

    #[test]
    fn test_integer_formats() {
        let minus_two = unpack(OperandFormat::SingleInteger, &[0o777_776]).expect("fits");
        assert_eq!(minus_two, Ufp::integer(true, 2));
        assert_eq!(pack(OperandFormat::SingleInteger, minus_two), Ok(vec![0o777_776]));
        assert_eq!(
            pack(OperandFormat::SingleInteger, Ufp::integer(false, 1 << 17)),
            Err(Fp15Exception::Overflow)
        );
        let big = Ufp::integer(true, 0o1_000_000);
        assert_eq!(pack(OperandFormat::DoubleInteger, big), Ok(vec![0o777_777, 0]));
        assert_eq!(unpack(OperandFormat::DoubleInteger, &[0o777_777, 0]), Ok(big));
    }

    #[test]
    fn test_most_negative_double_integer_overflows() {
        assert_eq!(
            unpack(OperandFormat::DoubleInteger, &[0o400_000, 0]),
            Err(Fp15Exception::Overflow)
        );
        assert_eq!(
            unpack(OperandFormat::DoubleInteger, &[0o400_000, 1]),
            Ok(Ufp::integer(true, MANTISSA_MASK))
        );
    }

    #[proptest]
    fn single_integer_survives_memory(#[strategy(-(1i64 << 17)..(1i64 << 17))] n: i64) {
        let v = Ufp::integer(n < 0, n.unsigned_abs());
        let words = pack(OperandFormat::SingleInteger, v).expect("in single range");
        assert_eq!(words.len(), 1);
        assert_eq!(unpack(OperandFormat::SingleInteger, &words), Ok(v));
    }

    #[proptest]
    fn double_integer_survives_memory(
        negative: bool,
        #[strategy(0..=MANTISSA_MASK)] magnitude: u64,
    ) {
        let v = Ufp::integer(negative && magnitude != 0, magnitude);
        let words = pack(OperandFormat::DoubleInteger, v).expect("in double range");
        assert_eq!(unpack(OperandFormat::DoubleInteger, &words), Ok(v));
    }

    #[proptest]
    fn single_float_survives_memory(
        negative: bool,
        #[strategy(-0o400i32..=0o377i32)] exp: i32,
        #[strategy((1u64 << 25)..(1u64 << 26))] mant26: u64,
    ) {
        let v = Ufp::from_parts(negative, exp, mant26 << 9);
        let words = pack(OperandFormat::SingleFloat, v).expect("exponent is in range");
        assert_eq!(unpack(OperandFormat::SingleFloat, &words), Ok(v));
    }

    #[test]
    fn test_single_float_layout() {
        let words = pack(OperandFormat::SingleFloat, ufp(-1.0)).expect("in range");
        assert_eq!(words, vec![(1 << 9) | 0o400 | 0o200, 0]);
        let back = unpack(OperandFormat::SingleFloat, &words).expect("floats always unpack");
        assert_eq!(back.to_f64(), -1.0);
    }

    #[test]
    fn test_exponent_limits() {
        let huge = Ufp::from_parts(false, 0o400, NORMALIZED_BIT);
        assert_eq!(pack(OperandFormat::SingleFloat, huge), Err(Fp15Exception::Overflow));
        assert!(pack(OperandFormat::DoubleFloat, huge).is_ok());
        let tiny = Ufp::from_parts(false, -0o401, NORMALIZED_BIT);
        assert_eq!(pack(OperandFormat::SingleFloat, tiny), Err(Fp15Exception::Underflow));
    }

    #[proptest]
    fn double_float_survives_memory(
        negative: bool,
        #[strategy(-0o400_000i32..=0o377_777i32)] exp: i32,
        #[strategy(NORMALIZED_BIT..=MANTISSA_MASK)] mant: u64,
    ) {
        let v = Ufp::from_parts(negative, exp, mant);
        let words = pack(OperandFormat::DoubleFloat, v).expect("exponent is in range");
        assert_eq!(unpack(OperandFormat::DoubleFloat, &words), Ok(v));
    }

    #[proptest]
    fn addition_is_commutative(
        #[strategy(-1_000_000i32..1_000_000i32)] x: i32,
        #[strategy(-1_000_000i32..1_000_000i32)] y: i32,
    ) {
        let (a, b) = (ufp(f64::from(x) / 64.0), ufp(f64::from(y) / 64.0));
        let (s1, q1) = add(a, b);
        let (s2, q2) = add(b, a);
        let n1 = normalize(s1, q1, true, Precision::Double).0;
        let n2 = normalize(s2, q2, true, Precision::Double).0;
        assert_eq!(n1, n2);
        assert_eq!(n1.to_f64(), f64::from(x + y) / 64.0);
    }

    #[proptest]
    fn integer_multiply_matches(
        #[strategy(-5_000i32..5_000i32)] x: i32,
        #[strategy(-5_000i32..5_000i32)] y: i32,
    ) {
        let a = Ufp::from_integer(i128::from(x), Precision::Double).expect("small");
        let b = Ufp::from_integer(i128::from(y), Precision::Double).expect("small");
        let (p, fmq) = multiply(a, b);
        let n = normalize(p, fmq, false, Precision::Double).0;
        assert_eq!(n.to_f64(), f64::from(x) * f64::from(y));
    }
}
