//! Effective address calculation for memory-reference instructions.
//!
//! The direct address is taken from the current field (bank mode, 13
//! bits) or page (page mode, 12 bits).  One level of indirection is
//! supported; its reach depends on the variant and the addressing
//! mode:
//!
//! | Variant  | Indirect address                               |
//! | -------- | ---------------------------------------------- |
//! | PDP-4    | 13 bits, in the current field                  |
//! | PDP-7, 9 | 15 bits in extend mode, else the current field |
//! | PDP-15   | 15 bits, in the current 32K block              |
//!
//! Indirect references through locations 10-17 increment the pointer
//! before it is used.  In page mode an auto-incremented pointer
//! reaches all 17 bits, and the index bit adds XR to the address
//! after any indirection.
use tracing::{event, Level};

use base::prelude::*;

use super::{Aborted, ControlUnit};
use crate::memory::MemoryUnit;
use crate::mmu::AccessKind;
use crate::registers::WORD_MASK;
use crate::variant::Variant;

const FIELD_BITS: u32 = !BANK_ADDRESS_MASK & Address::MASK;
const PAGE_BITS: u32 = !PAGE_ADDRESS_MASK & Address::MASK;
const BLOCK_BITS: u32 = 0o300_000;
const EXTENDED_INDIRECT_MASK: u32 = 0o077_777;

const AUTO_INDEX_FIRST: u32 = 0o10;
const AUTO_INDEX_LAST: u32 = 0o17;

impl ControlUnit {
    /// True when the PDP-15 uses page addressing (bank mode off).
    pub(crate) fn page_mode(&self) -> bool {
        self.config.variant == Variant::Pdp15 && !self.mm.memm
    }

    /// Computes the effective address of a memory-reference
    /// instruction.  Auto-index increments happen here.
    pub(crate) fn resolve(
        &mut self,
        inst: Instruction,
        mem: &mut MemoryUnit,
    ) -> Result<Address, Aborted> {
        let origin = self.origin.bits();
        let page_mode = self.page_mode();
        let offset = if page_mode {
            inst.page_address()
        } else {
            inst.bank_address()
        };
        let direct = if page_mode {
            (origin & PAGE_BITS) | offset
        } else {
            (origin & FIELD_BITS) | offset
        };
        self.last_pointer = None;

        let mut ea = direct;
        if inst.is_indirect() {
            let auto_index = (AUTO_INDEX_FIRST..=AUTO_INDEX_LAST).contains(&offset);
            let pointer = if auto_index {
                let location = Address::truncate(if self.config.variant.auto_index_in_field_zero() {
                    offset
                } else {
                    direct
                });
                let value = (self.read(mem, location, AccessKind::Read)? + 1) & WORD_MASK;
                self.write(mem, location, value)?;
                event!(Level::TRACE, "auto-index {} now {:06o}", location, value);
                value
            } else {
                self.read(mem, Address::truncate(direct), AccessKind::Read)?
            };
            self.last_pointer = Some(pointer);
            ea = if page_mode && auto_index {
                pointer & Address::MASK
            } else {
                self.indirect_target(pointer)
            };
        }
        if page_mode && inst.is_page_indexed() {
            ea = ea.wrapping_add(self.regs.xr) & Address::MASK;
        }
        let ea = Address::truncate(ea);
        self.last_ea = Some(ea);
        Ok(ea)
    }

    /// Where a pointer word points, for the current variant and mode.
    pub(crate) fn indirect_target(&self, pointer: u32) -> u32 {
        let origin = self.origin.bits();
        let in_field = (origin & FIELD_BITS) | (pointer & BANK_ADDRESS_MASK);
        match self.config.variant {
            Variant::Pdp4 => in_field,
            Variant::Pdp7 | Variant::Pdp9 => {
                if self.mm.memm {
                    pointer & EXTENDED_INDIRECT_MASK
                } else {
                    in_field
                }
            }
            Variant::Pdp15 => (origin & BLOCK_BITS) | (pointer & EXTENDED_INDIRECT_MASK),
        }
    }
}
