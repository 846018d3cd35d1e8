//! ## Memory reference instructions
//!
//! - CAL: [`ControlUnit::op_cal`]
//! - DAC, DZM: [`ControlUnit::op_dac`], [`ControlUnit::op_dzm`]
//! - JMS, JMP: [`ControlUnit::op_jms`], [`ControlUnit::op_jmp`]
//! - LAC, XOR, AND: [`ControlUnit::op_lac`], [`ControlUnit::op_xor`], [`ControlUnit::op_and`]
//! - ADD, TAD: [`ControlUnit::op_add`], [`ControlUnit::op_tad`]
//! - XCT: [`ControlUnit::op_xct`]
//! - ISZ, SAD: [`ControlUnit::op_isz`], [`ControlUnit::op_sad`]
use tracing::{event, Level};

use base::arith::{ones_complement_add, twos_complement_add_with_link};
use base::prelude::*;

use super::{Aborted, Bus, ControlUnit, IdleLoop};
use crate::memory::MemoryUnit;
use crate::mmu::AccessKind;
use crate::registers::{SIGN, WORD_MASK};
use crate::stop::StopReason;
use crate::variant::Variant;

/// CAL is a JMS to this location, in field (or page) zero.
const CAL_VECTOR: u32 = 0o20;
/// The API level CAL activates.
const CAL_API_LEVEL: u8 = 4;

/// The PC part of a pointer word restored by JMP I after DBR or RES.
const RESTORE_PC_MASK: u32 = 0o077_777;

impl ControlUnit {
    fn operand(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<u32, Aborted> {
        let ea = self.resolve(inst, mem)?;
        self.read(mem, ea, AccessKind::Read)
    }

    /// Implements CAL, the system call.  The return word goes in
    /// location 20 and execution continues at 21 in executive mode.
    /// With the API enabled, software level 4 becomes active.
    pub(crate) fn op_cal(&mut self, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let word = self.take_return_word();
        self.mm.enter_executive();
        if self.interrupts.api_installed() && self.interrupts.api_enable {
            self.interrupts.activate_level(CAL_API_LEVEL);
        }
        self.interrupts.defer();
        let target = Address::truncate(CAL_VECTOR);
        self.write(mem, target, word)?;
        self.pc_queue.record(self.origin);
        self.regs.pc = target.offset(1);
        Ok(())
    }

    pub(crate) fn op_dac(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let ea = self.resolve(inst, mem)?;
        let ac = self.regs.ac();
        self.write(mem, ea, ac)
    }

    pub(crate) fn op_dzm(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let ea = self.resolve(inst, mem)?;
        self.write(mem, ea, 0)
    }

    pub(crate) fn op_jms(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let ea = self.resolve(inst, mem)?;
        let word = self.take_return_word();
        self.write(mem, ea, word)?;
        self.pc_queue.record(self.origin);
        self.regs.pc = self.next_pc(ea);
        Ok(())
    }

    /// Implements JMP.  After DBR (or RES/EMIR), the first `JMP I`
    /// also restores the link and the modes saved in the pointer
    /// word.
    pub(crate) fn op_jmp(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let mut target = self.resolve(inst, mem)?;
        if inst.is_indirect() && (self.mm.rest_pending || self.mm.emir_pending) {
            if let Some(word) = self.last_pointer {
                if self.mm.rest_pending {
                    self.regs.set_link(word & SIGN != 0);
                    self.mm.restore_from_return_word(word);
                } else {
                    self.mm.restore_extend_mode(word);
                }
                if self.config.variant != Variant::Pdp15 {
                    target = Address::truncate(word & RESTORE_PC_MASK);
                }
                event!(
                    Level::DEBUG,
                    "JMP I restored state from {:06o}, continuing at {}",
                    word,
                    target
                );
            }
            self.mm.rest_pending = false;
            self.mm.emir_pending = false;
        }
        if target == self.origin {
            self.idle = Some(IdleLoop::JumpToSelf);
        } else if self.previous_was_iot && target.offset(1) == self.origin {
            self.idle = Some(IdleLoop::Poll);
        }
        self.pc_queue.record(self.origin);
        self.regs.pc = target;
        Ok(())
    }

    pub(crate) fn op_lac(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let m = self.operand(inst, mem)?;
        self.regs.set_ac(m);
        Ok(())
    }

    pub(crate) fn op_xor(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let m = self.operand(inst, mem)?;
        self.regs.set_ac(self.regs.ac() ^ m);
        Ok(())
    }

    pub(crate) fn op_and(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let m = self.operand(inst, mem)?;
        self.regs.set_ac(self.regs.ac() & m);
        Ok(())
    }

    /// One's complement addition.  Overflow sets the link (and never
    /// clears it).
    pub(crate) fn op_add(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let m = self.operand(inst, mem)?;
        let sum = ones_complement_add(
            Unsigned18Bit::truncate(self.regs.ac()),
            Unsigned18Bit::truncate(m),
        );
        self.regs.set_ac(sum.sum.bits());
        if sum.overflow {
            self.regs.set_link(true);
        }
        Ok(())
    }

    /// Two's complement addition; a carry out of AC complements the
    /// link.
    pub(crate) fn op_tad(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let m = self.operand(inst, mem)?;
        let (link, ac) = twos_complement_add_with_link(
            self.regs.link(),
            Unsigned18Bit::truncate(self.regs.ac()),
            Unsigned18Bit::truncate(m),
        );
        self.regs.set_ac(ac.bits());
        self.regs.set_link(link);
        Ok(())
    }

    /// Executes the word at the effective address.  XCTs may be
    /// nested up to the configured limit.
    pub(crate) fn op_xct(
        &mut self,
        inst: Instruction,
        depth: u32,
        bus: &mut Bus<'_>,
    ) -> Result<(), Aborted> {
        let ea = self.resolve(inst, bus.mem)?;
        if depth >= self.config.xct_max {
            event!(
                Level::WARN,
                "XCT nesting limit ({}) exceeded at {}",
                self.config.xct_max,
                self.origin
            );
            return Err(Aborted::Stop(StopReason::XctLimit { pc: self.origin }));
        }
        let word = self.read(bus.mem, ea, AccessKind::Fetch)?;
        self.last_ea = None;
        self.execute(Instruction::from(Unsigned18Bit::truncate(word)), depth + 1, bus)
    }

    pub(crate) fn op_isz(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let ea = self.resolve(inst, mem)?;
        let m = (self.read(mem, ea, AccessKind::Read)? + 1) & WORD_MASK;
        self.write(mem, ea, m)?;
        if m == 0 {
            self.skip();
        }
        Ok(())
    }

    /// Skips if AC differs from the operand.
    pub(crate) fn op_sad(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let m = self.operand(inst, mem)?;
        if m != self.regs.ac() {
            self.skip();
        }
        Ok(())
    }
}
