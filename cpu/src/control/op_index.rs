//! ## Index register instructions (PDP-15)
//!
//! Octal 72xxxx and 73xxxx operate on the index register XR and the
//! limit register LR.  Bits 9-17 are a signed immediate operand.
use tracing::{event, Level};

use base::arith::twos_complement_value;
use base::prelude::*;

use super::{Aborted, ControlUnit};
use crate::registers::WORD_MASK;

fn add_immediate(value: u32, immediate: i32) -> u32 {
    (value as i32).wrapping_add(immediate) as u32 & WORD_MASK
}

fn signed(value: u32) -> i32 {
    twos_complement_value(Unsigned18Bit::truncate(value))
}

impl ControlUnit {
    pub(crate) fn op_index(&mut self, inst: Instruction) -> Result<(), Aborted> {
        let Some(op) = inst.index_operation() else {
            return self.unimplemented(inst);
        };
        let immediate = inst.index_immediate();
        let ac = self.regs.ac();
        match op {
            IndexOperation::Pax => self.regs.xr = ac,
            IndexOperation::Pal => self.regs.lr = ac,
            IndexOperation::Aac => self.regs.set_ac(add_immediate(ac, immediate)),
            IndexOperation::Pxa => self.regs.set_ac(self.regs.xr),
            IndexOperation::Axs => {
                self.regs.xr = add_immediate(self.regs.xr, immediate);
                if signed(self.regs.xr) >= signed(self.regs.lr) {
                    self.skip();
                }
            }
            IndexOperation::Pxl => self.regs.lr = self.regs.xr,
            IndexOperation::Pla => self.regs.set_ac(self.regs.lr),
            IndexOperation::Plx => self.regs.xr = self.regs.lr,
            IndexOperation::Clx => self.regs.xr = 0,
            IndexOperation::Cllr => self.regs.lr = 0,
            IndexOperation::Axr => self.regs.xr = add_immediate(self.regs.xr, immediate),
        }
        event!(
            Level::TRACE,
            "{} {}: XR={:06o} LR={:06o}",
            op,
            immediate,
            self.regs.xr,
            self.regs.lr
        );
        Ok(())
    }
}

#[test]
fn test_add_immediate_wraps() {
    use base::arith::from_twos_complement;
    assert_eq!(add_immediate(0o777_777, 1), 0);
    assert_eq!(add_immediate(0, -1), 0o777_777);
    assert_eq!(add_immediate(5, -3), 2);
    assert_eq!(signed(from_twos_complement(-2).bits()), -2);
}
