//! The `base` crate defines the word-level things shared by the
//! 18-bit machine simulator and any tools built around it.  An
//! assembler or loader would depend on this crate but would not
//! need the simulator library itself.

mod onescomplement;
mod types;

pub mod instruction;
pub mod prelude;
pub mod subword;
pub use crate::onescomplement::arith;
pub use crate::onescomplement::unsigned::*;

#[macro_export]
macro_rules! u6 {
    ($n:expr) => {
        $crate::prelude::Unsigned6Bit::new::<{ $n }>()
    };
}

#[macro_export]
macro_rules! u18 {
    ($n:expr) => {
        $crate::prelude::Unsigned18Bit::new::<{ $n }>()
    };
}

#[macro_export]
macro_rules! u36 {
    ($n:expr) => {
        $crate::prelude::Unsigned36Bit::new::<{ $n }>()
    };
}

#[test]
fn test_u18() {
    use prelude::Unsigned18Bit;
    let p: Unsigned18Bit = u18!(0o400_000);
    let q: Unsigned18Bit =
        Unsigned18Bit::try_from(1u32 << 17).expect("test data should be in range");
    assert_eq!(p, q);
}

#[test]
fn test_u6() {
    use prelude::Unsigned6Bit;
    let p: Unsigned6Bit = u6!(0o77);
    assert_eq!(p, Unsigned6Bit::MAX);
}

#[test]
fn test_u36() {
    use prelude::Unsigned36Bit;
    let m: Unsigned36Bit = u36!(1u64 << 35);
    let n: Unsigned36Bit =
        Unsigned36Bit::try_from(0o400_000_000_000_u64).expect("test data should be in range");
    assert_eq!(m, n);
}
