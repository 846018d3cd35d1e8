//! ## FP15 instructions (PDP-15)
//!
//! Octal 71xxxx.  The second word holds the operand address; bit 0
//! of that word requests one level of indirection.  The arithmetic
//! itself lives in [`crate::fp15`].
use tracing::{event, Level};

use base::prelude::*;

use super::{Aborted, ControlUnit};
use crate::fp15::{Fp15Exception, Fp15Outcome, OperandMemory};
use crate::memory::MemoryUnit;
use crate::mmu::{AccessKind, MemoryManagement, TranslationFault};

const OPERAND_INDIRECT: u32 = 0o400_000;

/// Gives the FP15 access to memory through address translation.
struct TranslatedMemory<'a> {
    mm: &'a mut MemoryManagement,
    mem: &'a mut MemoryUnit,
}

impl OperandMemory for TranslatedMemory<'_> {
    type Error = TranslationFault;

    fn read(&mut self, addr: Address) -> Result<Unsigned18Bit, TranslationFault> {
        match self.mm.translate(addr, AccessKind::Read) {
            Ok(pa) => Ok(self.mem.fetch(pa).unwrap_or(Unsigned18Bit::ZERO)),
            Err(fault) if fault.trapped => Err(fault),
            Err(_) => Ok(Unsigned18Bit::ZERO),
        }
    }

    fn write(&mut self, addr: Address, value: Unsigned18Bit) -> Result<(), TranslationFault> {
        match self.mm.translate(addr, AccessKind::Write) {
            Ok(pa) => {
                if let Err(e) = self.mem.store(pa, value) {
                    event!(Level::WARN, "FP15 store failed: {}", e);
                }
                Ok(())
            }
            Err(fault) if fault.trapped => Err(fault),
            Err(_) => Ok(()),
        }
    }
}

impl ControlUnit {
    pub(crate) fn op_fpu(&mut self, inst: Instruction, mem: &mut MemoryUnit) -> Result<(), Aborted> {
        let operand = self.fetch_immediate(mem)?;
        let mut ea = Address::truncate(operand);
        if operand & OPERAND_INDIRECT != 0 {
            ea = Address::truncate(self.read(mem, ea, AccessKind::Read)?);
        }
        self.last_ea = Some(ea);

        let mut fp15 = std::mem::take(&mut self.fp15);
        let result = fp15.execute(
            inst.bits().bits(),
            ea,
            &mut TranslatedMemory {
                mm: &mut self.mm,
                mem: &mut *mem,
            },
        );
        self.fp15 = fp15;

        let outcome = result.unwrap_or_else(|fault| {
            event!(Level::DEBUG, "FP15 operand fault ({:?}) at {}", fault.kind, ea);
            Fp15Outcome::Exception(Fp15Exception::MemoryFault)
        });
        match outcome {
            Fp15Outcome::Completed => Ok(()),
            Fp15Outcome::Branch(target) => {
                self.pc_queue.record(self.origin);
                self.regs.pc = target;
                Ok(())
            }
            Fp15Outcome::Exception(exception) => {
                let slot = self.fp15.exception_vector(exception, self.regs.pc);
                event!(
                    Level::DEBUG,
                    "{} at {}, vectoring through {}",
                    exception,
                    self.origin,
                    slot
                );
                let word = self.return_word();
                self.write(mem, slot, word)?;
                self.pc_queue.record(self.origin);
                self.regs.pc = slot.offset(1);
                Ok(())
            }
            Fp15Outcome::Unimplemented => self.unimplemented(inst),
        }
    }
}
