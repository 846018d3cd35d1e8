//! Core memory.
//!
//! Memory is a flat array of 18-bit words indexed by physical
//! address.  Addresses at or beyond the installed size are not
//! mapped; what happens on such a reference (a trap or just a flag)
//! is decided by the address translation unit, not here.
use std::error;
use std::fmt::{self, Debug, Display, Formatter};

use base::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOpFailure {
    NotMapped(Address),
}

impl Display for MemoryOpFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            MemoryOpFailure::NotMapped(addr) => {
                write!(f, "address {addr:o} is not mapped to installed memory")
            }
        }
    }
}

impl error::Error for MemoryOpFailure {}

pub struct MemoryUnit {
    words: Vec<Unsigned18Bit>,
}

impl MemoryUnit {
    pub fn new(size_in_words: u32) -> MemoryUnit {
        MemoryUnit {
            words: vec![Unsigned18Bit::ZERO; size_in_words as usize],
        }
    }

    /// Installed size, in words.
    pub fn size(&self) -> u32 {
        // Sizes are validated against the variant's maximum (at most
        // 128K words) before a MemoryUnit is built.
        self.words.len() as u32
    }

    pub fn fetch(&self, addr: Address) -> Result<Unsigned18Bit, MemoryOpFailure> {
        self.words
            .get(usize::from(addr))
            .copied()
            .ok_or(MemoryOpFailure::NotMapped(addr))
    }

    pub fn store(&mut self, addr: Address, value: Unsigned18Bit) -> Result<(), MemoryOpFailure> {
        match self.words.get_mut(usize::from(addr)) {
            Some(w) => {
                *w = value;
                Ok(())
            }
            None => Err(MemoryOpFailure::NotMapped(addr)),
        }
    }

    pub fn clear(&mut self) {
        self.words.fill(Unsigned18Bit::ZERO);
    }
}

impl Debug for MemoryUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryUnit")
            .field("size", &format_args!("{:o}", self.words.len()))
            .finish_non_exhaustive()
    }
}
