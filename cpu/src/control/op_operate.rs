//! ## Operate class instructions
//!
//! - OPR (octal 74): [`ControlUnit::op_opr`]
//! - LAW (octal 76): [`ControlUnit::op_law`]
//! - EAE (octal 64): [`ControlUnit::op_eae`]
//!
//! The OPR micro-operations happen in a fixed order: the skip
//! conditions are sensed from the original AC and link, then CLA and
//! CLL, CMA and CML, OAS, the rotates, and finally HLT.
use tracing::{event, Level};

use base::prelude::*;

use super::{Aborted, ControlUnit};
use crate::memory::MemoryUnit;
use crate::registers::{LINK, SIGN, WORD_MASK};
use crate::stop::StopReason;
use crate::variant::Variant;

const CMA: u32 = 0o000_001;
const CML: u32 = 0o000_002;
const OAS: u32 = 0o000_004;
const RAL: u32 = 0o000_010;
const RAR: u32 = 0o000_020;
const HLT: u32 = 0o000_040;
const SMA: u32 = 0o000_100;
const SZA: u32 = 0o000_200;
const SNL: u32 = 0o000_400;
const REVERSE_SENSE: u32 = 0o001_000;
const ROTATE_TWICE: u32 = 0o002_000;
const CLL: u32 = 0o004_000;
const CLA: u32 = 0o010_000;

const LAC_MASK: u32 = LINK | WORD_MASK;

fn rotate_left(lac: u32) -> u32 {
    ((lac << 1) | (lac >> 18)) & LAC_MASK
}

fn rotate_right(lac: u32) -> u32 {
    ((lac >> 1) | ((lac & 1) << 18)) & LAC_MASK
}

/// Exchanges the two 9-bit halves of AC.
fn swap_halves(lac: u32) -> u32 {
    let ac = lac & WORD_MASK;
    (lac & LINK) | ((ac << 9) & 0o777_000) | (ac >> 9)
}

impl ControlUnit {
    pub(crate) fn op_opr(&mut self, inst: Instruction) -> Result<(), Aborted> {
        let ir = inst.bits().bits();
        if ir & HLT != 0 {
            self.privileged()?;
        }
        let ac = self.regs.ac();
        let mut skip = (ir & SMA != 0 && ac & SIGN != 0)
            || (ir & SZA != 0 && ac == 0)
            || (ir & SNL != 0 && self.regs.link());
        if ir & REVERSE_SENSE != 0 {
            skip = !skip;
        }

        let mut lac = self.regs.lac;
        if ir & CLA != 0 {
            lac &= LINK;
        }
        if ir & CLL != 0 {
            lac &= WORD_MASK;
        }
        if ir & CML != 0 {
            lac ^= LINK;
        }
        if ir & CMA != 0 {
            lac ^= WORD_MASK;
        }
        if ir & OAS != 0 {
            lac |= self.regs.sr & WORD_MASK;
        }
        let twice = ir & ROTATE_TWICE != 0;
        lac = match (ir & RAL != 0, ir & RAR != 0) {
            (false, false) => lac,
            (true, false) if twice => rotate_left(rotate_left(lac)),
            (true, false) => rotate_left(lac),
            (false, true) if twice => rotate_right(rotate_right(lac)),
            (false, true) => rotate_right(lac),
            (true, true) => match self.config.variant {
                // IAC, and BSW when "twice" is also set.
                Variant::Pdp15 if twice => swap_halves(lac),
                Variant::Pdp15 => (lac + 1) & LAC_MASK,
                _ => lac,
            },
        };
        self.regs.lac = lac;
        if skip {
            self.skip();
        }
        if ir & HLT != 0 {
            event!(Level::INFO, "HLT at {}", self.origin);
            return Err(Aborted::Stop(StopReason::Halt { pc: self.origin }));
        }
        Ok(())
    }

    /// Loads the instruction word itself into AC.
    pub(crate) fn op_law(&mut self, inst: Instruction) {
        self.regs.set_ac(inst.bits().bits());
    }

    pub(crate) fn op_eae(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        if !self.config.eae {
            return self.unimplemented(inst);
        }
        let mut eae = self.eae;
        let mut lac = self.regs.lac;
        eae.execute(inst.bits().bits(), &mut lac, || self.fetch_immediate(mem))?;
        self.eae = eae;
        self.regs.lac = lac;
        Ok(())
    }
}
