//! Examine and deposit, for front panels and debuggers.
use base::arith::sign_extend;
use base::prelude::*;

use super::ControlUnit;
use crate::fp15::ufp::GUARD_BIT;
use crate::registers::{RegisterName, WORD_MASK};

const FMQ_LOW_BITS: u32 = 18;

impl ControlUnit {
    pub fn examine(&self, name: RegisterName) -> u32 {
        let flag = |b: bool| u32::from(b);
        match name {
            RegisterName::Pc => self.regs.pc.bits(),
            RegisterName::Ac => self.regs.ac(),
            RegisterName::Link => flag(self.regs.link()),
            RegisterName::Mq => self.eae.mq,
            RegisterName::Sc => self.eae.sc,
            RegisterName::Ir => self.regs.ir.bits(),
            RegisterName::Sr => self.regs.sr,
            RegisterName::Asw => self.regs.asw.bits(),
            RegisterName::Xr => self.regs.xr,
            RegisterName::Lr => self.regs.lr,
            RegisterName::Bounds => self.mm.bounds,
            RegisterName::Relocation => self.mm.relocation,
            RegisterName::Mmr => self.mm.mmr,
            RegisterName::Slr => self.mm.slr,
            RegisterName::ExtendMode => flag(self.mm.memm),
            RegisterName::UserMode => flag(self.mm.usmd),
            RegisterName::Nexm => flag(self.mm.nexm),
            RegisterName::Prvn => flag(self.mm.prvn),
            RegisterName::Ion => flag(self.interrupts.ion),
            RegisterName::ApiEnable => flag(self.interrupts.api_enable),
            RegisterName::ApiActive => u32::from(self.interrupts.api_active),
            RegisterName::ApiRequest => u32::from(self.interrupts.api_request),
            RegisterName::Jea => self.fp15.jea,
            RegisterName::FmaSign => flag(self.fp15.a.sign),
            RegisterName::FmaExponent => (self.fp15.a.exp as u32) & WORD_MASK,
            RegisterName::FmaHigh => self.fp15.a.hi,
            RegisterName::FmaLow => self.fp15.a.lo,
            RegisterName::FmbSign => flag(self.fp15.b.sign),
            RegisterName::FmbExponent => (self.fp15.b.exp as u32) & WORD_MASK,
            RegisterName::FmbHigh => self.fp15.b.hi,
            RegisterName::FmbLow => self.fp15.b.lo,
            RegisterName::FmqHigh => (self.fp15.fmq >> FMQ_LOW_BITS) as u32,
            RegisterName::FmqLow => (self.fp15.fmq as u32) & WORD_MASK,
            RegisterName::Guard => flag(self.fp15.guard()),
            RegisterName::TrapPending => flag(self.mm.trap_pending),
        }
    }

    /// Sets a register.  The value is masked to the register's width.
    pub fn deposit(&mut self, name: RegisterName, value: u32) {
        let value = value & name.mask();
        let on = value != 0;
        match name {
            RegisterName::Pc => self.regs.pc = Address::truncate(value),
            RegisterName::Ac => self.regs.set_ac(value),
            RegisterName::Link => self.regs.set_link(on),
            RegisterName::Mq => self.eae.mq = value,
            RegisterName::Sc => self.eae.sc = value,
            RegisterName::Ir => self.regs.ir = Unsigned18Bit::truncate(value),
            RegisterName::Sr => self.regs.sr = value,
            RegisterName::Asw => self.regs.asw = Address::truncate(value),
            RegisterName::Xr => self.regs.xr = value,
            RegisterName::Lr => self.regs.lr = value,
            RegisterName::Bounds => self.mm.bounds = value,
            RegisterName::Relocation => self.mm.relocation = value,
            RegisterName::Mmr => self.mm.mmr = value,
            RegisterName::Slr => self.mm.slr = value,
            RegisterName::ExtendMode => self.mm.memm = on,
            RegisterName::UserMode => self.mm.usmd = on,
            RegisterName::Nexm => self.mm.nexm = on,
            RegisterName::Prvn => self.mm.prvn = on,
            RegisterName::Ion => self.interrupts.ion = on,
            RegisterName::ApiEnable => self.interrupts.api_enable = on,
            RegisterName::ApiActive => self.interrupts.api_active = value as u8,
            RegisterName::ApiRequest => self.interrupts.api_request = value as u8,
            RegisterName::Jea => self.fp15.jea = value,
            RegisterName::FmaSign => self.fp15.a.sign = on,
            RegisterName::FmaExponent => self.fp15.a.exp = sign_extend(value, 18),
            RegisterName::FmaHigh => self.fp15.a.hi = value,
            RegisterName::FmaLow => self.fp15.a.lo = value,
            RegisterName::FmbSign => self.fp15.b.sign = on,
            RegisterName::FmbExponent => self.fp15.b.exp = sign_extend(value, 18),
            RegisterName::FmbHigh => self.fp15.b.hi = value,
            RegisterName::FmbLow => self.fp15.b.lo = value,
            RegisterName::FmqHigh => {
                let low = self.fp15.fmq & u64::from(WORD_MASK);
                self.fp15.fmq = (u64::from(value) << FMQ_LOW_BITS) | low;
            }
            RegisterName::FmqLow => {
                let high = self.fp15.fmq & !u64::from(WORD_MASK);
                self.fp15.fmq = high | u64::from(value);
            }
            RegisterName::Guard => {
                self.fp15.fmq = if on {
                    self.fp15.fmq | GUARD_BIT
                } else {
                    self.fp15.fmq & !GUARD_BIT
                };
            }
            RegisterName::TrapPending => self.mm.trap_pending = on,
        }
        // A deposited PC starts a fresh instruction stream.
        if name == RegisterName::Pc {
            self.idle = None;
        }
    }
}
