//! Unsigned word types of the widths the 18-bit machines use: 6 bits
//! (device numbers, the EAE step counter), 18 bits (the machine
//! word) and 36 bits (the AC:MQ pair).
//!
//! The stored bits carry no sign.  Whether a word is read as a
//! one's-complement or two's-complement value is decided by the
//! operation, see [`super::arith`].

use std::fmt::{self, Debug, Display, Formatter, Octal};

use serde::{Deserialize, Serialize};

use super::error::ConversionFailed;


macro_rules! unsigned_word {
    (
        $(#[$meta:meta])*
        $SelfT:ident, $BITS:expr, $InnerT:ty,
        widen_from: [$($from:ty),*],
        narrow_from: [$($tryfrom:ty),*],
        widen_to: [$($to:ty),*],
        narrow_to: [$($tryto:ty),*]
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        pub struct $SelfT {
            pub(crate) bits: $InnerT,
        }

        impl $SelfT {
            pub const BITS: u32 = $BITS;
            const VALUE_BITS: $InnerT = ((1 as $InnerT) << $BITS) - 1;

            pub const MAX: Self = Self { bits: Self::VALUE_BITS };
            pub const ZERO: Self = Self { bits: 0 };
            pub const ONE: Self = Self { bits: 1 };

            /// Builds a value from a constant, failing at compile
            /// time when it is out of range.  This is pub so that the
            /// `u18!` family of macros can use it.
            pub const fn new<const N: $InnerT>() -> Self {
                struct Check<const M: $InnerT>;
                impl<const M: $InnerT> Check<M> {
                    const VALUE: $SelfT = {
                        if M > $SelfT::VALUE_BITS {
                            panic!("input value is out of range");
                        }
                        $SelfT { bits: M }
                    };
                }
                Check::<N>::VALUE
            }

            /// Keeps only the low-order bits of `value` which fit.
            pub const fn truncate(value: $InnerT) -> Self {
                Self {
                    bits: value & Self::VALUE_BITS,
                }
            }

            pub const fn bits(self) -> $InnerT {
                self.bits
            }

            pub const fn is_zero(self) -> bool {
                self.bits == 0
            }

            /// True when the most significant bit is set.
            pub const fn sign_bit(self) -> bool {
                (self.bits >> ($BITS - 1)) & 1 != 0
            }

            pub const fn complement(self) -> Self {
                Self {
                    bits: !self.bits & Self::VALUE_BITS,
                }
            }

            pub const fn wrapping_add(self, rhs: Self) -> Self {
                Self::truncate(self.bits.wrapping_add(rhs.bits))
            }

            pub const fn wrapping_sub(self, rhs: Self) -> Self {
                Self::truncate(self.bits.wrapping_sub(rhs.bits))
            }

            pub fn checked_add(self, rhs: Self) -> Option<Self> {
                match self.bits.checked_add(rhs.bits) {
                    Some(sum) if sum <= Self::VALUE_BITS => Some(Self { bits: sum }),
                    _ => None,
                }
            }

            // Trait methods cannot be const, so these work-alikes of
            // BitAnd and BitOr exist for const contexts.
            pub const fn and(self, mask: $InnerT) -> Self {
                Self {
                    bits: self.bits & mask,
                }
            }

            pub const fn bitor(self, mask: $InnerT) -> Self {
                Self::truncate(self.bits | mask)
            }
        }

        impl Display for $SelfT {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
                Octal::fmt(&self.bits, f)
            }
        }

        impl Octal for $SelfT {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
                Octal::fmt(&self.bits, f)
            }
        }

        impl Debug for $SelfT {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($SelfT), "({:#o})"), self.bits)
            }
        }

        impl std::ops::Not for $SelfT {
            type Output = Self;
            fn not(self) -> Self {
                self.complement()
            }
        }

        impl std::ops::BitAnd for $SelfT {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self {
                    bits: self.bits & rhs.bits,
                }
            }
        }

        impl std::ops::BitAnd<$InnerT> for $SelfT {
            type Output = Self;
            fn bitand(self, mask: $InnerT) -> Self {
                self.and(mask)
            }
        }

        impl std::ops::BitOr for $SelfT {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self {
                    bits: self.bits | rhs.bits,
                }
            }
        }

        impl std::ops::BitXor for $SelfT {
            type Output = Self;
            fn bitxor(self, rhs: Self) -> Self {
                Self {
                    bits: self.bits ^ rhs.bits,
                }
            }
        }

        $(
            impl From<$from> for $SelfT {
                fn from(n: $from) -> Self {
                    Self { bits: n.into() }
                }
            }
        )*

        $(
            impl TryFrom<$tryfrom> for $SelfT {
                type Error = ConversionFailed;

                #[allow(unused_comparisons)]
                fn try_from(n: $tryfrom) -> Result<Self, ConversionFailed> {
                    if n < 0 {
                        return Err(ConversionFailed::TooSmall);
                    }
                    match <$InnerT>::try_from(n) {
                        Ok(bits) if bits <= Self::VALUE_BITS => Ok(Self { bits }),
                        _ => Err(ConversionFailed::TooLarge),
                    }
                }
            }
        )*

        $(
            impl From<$SelfT> for $to {
                fn from(n: $SelfT) -> $to {
                    // The value range is narrower than the storage
                    // type's, so this cast never truncates.
                    n.bits as $to
                }
            }
        )*

        $(
            impl TryFrom<$SelfT> for $tryto {
                type Error = ConversionFailed;
                fn try_from(n: $SelfT) -> Result<$tryto, ConversionFailed> {
                    <$tryto>::try_from(n.bits).map_err(|_| ConversionFailed::TooLarge)
                }
            }
        )*
    };
}

unsigned_word!(
    /// Device numbers, IOT pulses and the EAE step counter.
    Unsigned6Bit, 6, u8,
    widen_from: [],
    narrow_from: [u8, u16, u32, u64, usize, i8, i16, i32, i64],
    widen_to: [u8, u16, u32, u64, usize, i8, i16, i32, i64],
    narrow_to: []
);

unsigned_word!(
    /// A machine word.
    Unsigned18Bit, 18, u32,
    widen_from: [u8, u16],
    narrow_from: [u32, u64, usize, i8, i16, i32, i64],
    widen_to: [u32, u64, usize, i32, i64],
    narrow_to: [u8, u16, i8, i16]
);

unsigned_word!(
    /// A double word, such as the AC:MQ pair the EAE shifts.
    Unsigned36Bit, 36, u64,
    widen_from: [u8, u16, u32],
    narrow_from: [u64, usize, i8, i16, i32, i64],
    widen_to: [u64, i64],
    narrow_to: [u8, u16, u32, usize, i8, i16, i32]
);

impl From<Unsigned6Bit> for Unsigned18Bit {
    fn from(n: Unsigned6Bit) -> Unsigned18Bit {
        Unsigned18Bit {
            bits: u32::from(n.bits),
        }
    }
}

impl From<Unsigned18Bit> for Unsigned36Bit {
    fn from(n: Unsigned18Bit) -> Unsigned36Bit {
        Unsigned36Bit {
            bits: u64::from(n.bits),
        }
    }
}
