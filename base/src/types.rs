use std::fmt::{self, Debug, Display, Formatter, Octal};

use serde::{Deserialize, Serialize};

use super::onescomplement::error::ConversionFailed;
use super::onescomplement::unsigned::Unsigned18Bit;

/// A memory address.  The largest machine of the family addresses
/// 128K words, so an address has 17 significant bits; the smaller
/// machines use fewer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address {
    bits: u32,
}

impl Address {
    pub const MASK: u32 = 0o377_777;
    pub const ZERO: Address = Address { bits: 0 };
    pub const MAX: Address = Address { bits: Address::MASK };

    /// Keeps only the low 17 bits of `value`.
    pub const fn truncate(value: u32) -> Address {
        Address {
            bits: value & Address::MASK,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bits
    }

    /// Adds `delta`, wrapping within the 17-bit address space.
    pub const fn offset(self, delta: u32) -> Address {
        Address::truncate(self.bits.wrapping_add(delta))
    }
}

impl TryFrom<u32> for Address {
    type Error = ConversionFailed;
    fn try_from(n: u32) -> Result<Address, ConversionFailed> {
        if n > Address::MASK {
            Err(ConversionFailed::TooLarge)
        } else {
            Ok(Address { bits: n })
        }
    }
}

impl From<Address> for u32 {
    fn from(a: Address) -> u32 {
        a.bits
    }
}

impl From<Address> for usize {
    fn from(a: Address) -> usize {
        a.bits as usize
    }
}

impl From<Address> for Unsigned18Bit {
    fn from(a: Address) -> Unsigned18Bit {
        Unsigned18Bit::truncate(a.bits)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:06o}", self.bits)
    }
}

impl Octal for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        Octal::fmt(&self.bits, f)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#o})", self.bits)
    }
}

#[test]
fn test_address_wraps() {
    assert_eq!(Address::MAX.offset(1), Address::ZERO);
    assert_eq!(Address::truncate(0o1_000_005), Address::truncate(5));
    assert_eq!(Address::try_from(0o400_000), Err(ConversionFailed::TooLarge));
    assert_eq!(Address::truncate(0o20).to_string(), "000020");
}
