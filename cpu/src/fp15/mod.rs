//! The FP15 floating-point processor.
//!
//! FP15 instructions are two words long: `71xxxx` followed by an
//! address word (bit 0 indirect, bits 1-17 address).  The engine
//! resolves the address and calls [`Fp15::execute`].
//!
//! Bits 8-11 select the operation and the remaining bits modify it:
//!
//! | Bit  | Meaning                                   |
//! | ---- | ----------------------------------------- |
//! | 0200 | use FMB as the operand, don't load it     |
//! | 0100 | double precision                          |
//! | 0040 | floating point (otherwise integer)        |
//! | 0020 | don't normalize the result                |
//! | 0010 | don't round the result                    |
//! | 0003 | result sign: keep, abs, negate, negative  |
//!
//! Errors vector through a table whose base is in the JEA register;
//! see [`Fp15Exception`].
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

pub mod ufp;
#[cfg(test)]
mod tests;

use ufp::{OperandFormat, Precision, Ufp, GUARD_BIT};

const NO_LOAD: u32 = 0o200;
const DOUBLE: u32 = 0o100;
const FLOAT: u32 = 0o040;
const NO_NORMALIZE: u32 = 0o020;
const NO_ROUND: u32 = 0o010;

/// JEA with this bit stores the control word rather than loading it.
const JEA_STORE: u32 = 0o100;

const JEA_SIGN: u32 = 0o400_000;
const JEA_GUARD: u32 = 0o200_000;
const JEA_BASE: u32 = 0o077_777;

// Branch conditions of BR.
const BR_ZERO: u32 = 0o040;
const BR_NEGATIVE: u32 = 0o020;
const BR_POSITIVE: u32 = 0o010;
const BR_GUARD: u32 = 0o004;

/// An FP15 error.  Each has a two-word slot in the exception table:
/// the return word goes in the first and execution continues in the
/// second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Fp15Exception {
    Overflow,
    Underflow,
    DivideCheck,
    /// An operand reference failed.  The memory management trap
    /// stays pending as well.
    MemoryFault,
}

impl Fp15Exception {
    pub const fn offset(self) -> u32 {
        match self {
            Fp15Exception::Overflow => 0,
            Fp15Exception::Underflow => 2,
            Fp15Exception::DivideCheck => 4,
            Fp15Exception::MemoryFault => 6,
        }
    }
}

impl Display for Fp15Exception {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Fp15Exception::Overflow => "floating-point overflow",
            Fp15Exception::Underflow => "floating-point underflow",
            Fp15Exception::DivideCheck => "floating-point divide check",
            Fp15Exception::MemoryFault => "floating-point operand fault",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Fp15Op {
    Subtract,
    ReverseSubtract,
    Multiply,
    Divide,
    ReverseDivide,
    Load,
    Store,
    Float,
    Fix,
    SwapFmq,
    ExceptionAddress,
    Add,
    Branch,
}

impl Fp15Op {
    pub fn decode(ir: u32) -> Option<Fp15Op> {
        match (ir >> 8) & 0o17 {
            0o01 => Some(Fp15Op::Subtract),
            0o02 => Some(Fp15Op::ReverseSubtract),
            0o03 => Some(Fp15Op::Multiply),
            0o04 => Some(Fp15Op::Divide),
            0o05 => Some(Fp15Op::ReverseDivide),
            0o06 => Some(Fp15Op::Load),
            0o07 => Some(Fp15Op::Store),
            0o10 => Some(Fp15Op::Float),
            0o11 => Some(Fp15Op::Fix),
            0o12 => Some(Fp15Op::SwapFmq),
            0o13 => Some(Fp15Op::ExceptionAddress),
            0o14 => Some(Fp15Op::Add),
            0o15 => Some(Fp15Op::Branch),
            _ => None,
        }
    }
}

/// How an FP15 instruction finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fp15Outcome {
    Completed,
    /// BR took the branch.
    Branch(Address),
    Exception(Fp15Exception),
    /// The operation code is not assigned.
    Unimplemented,
}

/// Operand access for the FP15.  The engine's implementation goes
/// through address translation.
pub trait OperandMemory {
    type Error;

    fn read(&mut self, addr: Address) -> Result<Unsigned18Bit, Self::Error>;
    fn write(&mut self, addr: Address, value: Unsigned18Bit) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy)]
struct Modifiers(u32);

impl Modifiers {
    fn no_load(self) -> bool {
        self.0 & NO_LOAD != 0
    }

    fn double(self) -> bool {
        self.0 & DOUBLE != 0
    }

    fn float(self) -> bool {
        self.0 & FLOAT != 0
    }

    fn normalize(self) -> bool {
        self.0 & NO_NORMALIZE == 0
    }

    fn round(self) -> bool {
        self.0 & NO_ROUND == 0
    }

    fn precision(self) -> Precision {
        if self.double() {
            Precision::Double
        } else {
            Precision::Single
        }
    }

    fn format(self) -> OperandFormat {
        OperandFormat::select(self.double(), self.float())
    }

    fn apply_sign(self, v: Ufp) -> Ufp {
        if v.is_zero() {
            return v;
        }
        let sign = match self.0 & 3 {
            0 => v.sign,
            1 => false,
            2 => !v.sign,
            _ => true,
        };
        Ufp { sign, ..v }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fp15 {
    /// FMA, the accumulator.
    pub a: Ufp,
    /// FMB, the operand register.
    pub b: Ufp,
    /// Low-order bits of the last result.
    pub fmq: u64,
    /// Base of the exception table.
    pub jea: u32,
}

impl Fp15 {
    pub fn reset(&mut self) {
        *self = Fp15::default();
    }

    pub fn guard(&self) -> bool {
        self.fmq & GUARD_BIT != 0
    }

    /// The address of the exception table slot for `exception`, in
    /// the 32K block holding `pc`.
    pub fn exception_vector(&self, exception: Fp15Exception, pc: Address) -> Address {
        let slot = (self.jea + exception.offset()) & JEA_BASE;
        Address::truncate((pc.bits() & !JEA_BASE) | slot)
    }

    pub fn execute<M: OperandMemory>(
        &mut self,
        ir: u32,
        ea: Address,
        mem: &mut M,
    ) -> Result<Fp15Outcome, M::Error> {
        let Some(op) = Fp15Op::decode(ir) else {
            return Ok(Fp15Outcome::Unimplemented);
        };
        let m = Modifiers(ir);
        event!(Level::TRACE, "FP15 {:?} {:06o} ea={}", op, ir, ea);
        let outcome = match op {
            Fp15Op::ExceptionAddress => {
                if ir & JEA_STORE != 0 {
                    let mut word = self.jea & JEA_BASE;
                    if self.a.sign {
                        word |= JEA_SIGN;
                    }
                    if self.guard() {
                        word |= JEA_GUARD;
                    }
                    mem.write(ea, Unsigned18Bit::truncate(word))?;
                } else {
                    let word = mem.read(ea)?.bits();
                    self.jea = word & JEA_BASE;
                    self.a.sign = word & JEA_SIGN != 0;
                    if word & JEA_GUARD != 0 {
                        self.fmq |= GUARD_BIT;
                    } else {
                        self.fmq &= !GUARD_BIT;
                    }
                }
                Fp15Outcome::Completed
            }
            Fp15Op::Branch => {
                if self.branch_condition(ir) {
                    Fp15Outcome::Branch(ea)
                } else {
                    Fp15Outcome::Completed
                }
            }
            Fp15Op::Store => {
                let value = m.apply_sign(self.a);
                match ufp::pack(m.format(), value) {
                    Ok(words) => {
                        self.a = value;
                        for (i, w) in words.into_iter().enumerate() {
                            mem.write(ea.offset(i as u32), Unsigned18Bit::truncate(w))?;
                        }
                        Fp15Outcome::Completed
                    }
                    Err(e) => Fp15Outcome::Exception(e),
                }
            }
            Fp15Op::SwapFmq => {
                let old_mantissa = self.a.mantissa();
                let swapped = Ufp::from_parts(self.a.sign, self.a.exp, self.fmq);
                let (v, _) = ufp::normalize(swapped, 0, false, Precision::Double);
                self.a = m.apply_sign(v);
                self.fmq = old_mantissa;
                Fp15Outcome::Completed
            }
            Fp15Op::Float => {
                let format = OperandFormat::select(m.double(), false);
                let loaded = self.load_operand(m, format, ea, mem)?;
                let b = self.b;
                let result = loaded.map(|()| {
                    let magnitude = b.fix().map_or(0, |n| n.unsigned_abs() as u64);
                    (Ufp::integer(b.sign, magnitude), 0)
                });
                self.finish_float(result, m)
            }
            Fp15Op::Fix => {
                let format = OperandFormat::select(m.double(), true);
                let loaded = self.load_operand(m, format, ea, mem)?;
                let b = self.b;
                let result = loaded.and_then(|()| {
                    b.fix()
                        .ok_or(Fp15Exception::Overflow)
                        .and_then(|n| Ufp::from_integer(n, m.precision()))
                });
                self.finish_integer(result, m)
            }
            Fp15Op::Load => {
                let loaded = self.load_operand(m, m.format(), ea, mem)?;
                let b = self.b;
                if m.float() {
                    self.finish_float(loaded.map(|()| (b, 0)), m)
                } else {
                    self.finish_integer(loaded.map(|()| b), m)
                }
            }
            Fp15Op::Add
            | Fp15Op::Subtract
            | Fp15Op::ReverseSubtract
            | Fp15Op::Multiply
            | Fp15Op::Divide
            | Fp15Op::ReverseDivide => {
                let loaded = self.load_operand(m, m.format(), ea, mem)?;
                if m.float() {
                    let result = loaded.and_then(|()| self.float_arithmetic(op));
                    self.finish_float(result, m)
                } else {
                    let result = loaded.and_then(|()| self.integer_arithmetic(op, m.precision()));
                    self.finish_integer(result, m)
                }
            }
        };
        if let Fp15Outcome::Exception(e) = outcome {
            event!(Level::DEBUG, "FP15 exception: {}", e);
        }
        Ok(outcome)
    }

    /// Loads FMB.  The outer error is a failed memory access; the
    /// inner one an operand the FP15 cannot hold.
    fn load_operand<M: OperandMemory>(
        &mut self,
        m: Modifiers,
        format: OperandFormat,
        ea: Address,
        mem: &mut M,
    ) -> Result<Result<(), Fp15Exception>, M::Error> {
        if m.no_load() {
            return Ok(Ok(()));
        }
        let mut words = [0u32; 3];
        for (i, w) in words.iter_mut().take(format.words()).enumerate() {
            *w = mem.read(ea.offset(i as u32))?.bits();
        }
        Ok(ufp::unpack(format, &words).map(|b| self.b = b))
    }

    fn branch_condition(&self, ir: u32) -> bool {
        let zero = self.a.is_zero();
        (ir & BR_ZERO != 0 && zero)
            || (ir & BR_NEGATIVE != 0 && !zero && self.a.sign)
            || (ir & BR_POSITIVE != 0 && !zero && !self.a.sign)
            || (ir & BR_GUARD != 0 && self.guard())
    }

    fn float_arithmetic(&self, op: Fp15Op) -> Result<(Ufp, u64), Fp15Exception> {
        let (a, b) = (self.a, self.b);
        match op {
            Fp15Op::Add => Ok(ufp::add(a, b)),
            Fp15Op::Subtract => Ok(ufp::add(a, ufp::negate(b))),
            Fp15Op::ReverseSubtract => Ok(ufp::add(b, ufp::negate(a))),
            Fp15Op::Multiply => Ok(ufp::multiply(a, b)),
            Fp15Op::Divide => ufp::divide(a, b),
            Fp15Op::ReverseDivide => ufp::divide(b, a),
            _ => Ok((a, self.fmq)),
        }
    }

    fn integer_arithmetic(&self, op: Fp15Op, precision: Precision) -> Result<Ufp, Fp15Exception> {
        let x = self.a.fix().ok_or(Fp15Exception::Overflow)?;
        let y = self.b.fix().ok_or(Fp15Exception::Overflow)?;
        let result = match op {
            Fp15Op::Add => x + y,
            Fp15Op::Subtract => x - y,
            Fp15Op::ReverseSubtract => y - x,
            Fp15Op::Multiply => x * y,
            Fp15Op::Divide => x.checked_div(y).ok_or(Fp15Exception::DivideCheck)?,
            Fp15Op::ReverseDivide => y.checked_div(x).ok_or(Fp15Exception::DivideCheck)?,
            _ => x,
        };
        Ufp::from_integer(result, precision)
    }

    /// Normalizes and range-checks a floating result, then puts it in
    /// FMA.  On overflow FMA is left alone; on underflow it is
    /// cleared.
    fn finish_float(&mut self, result: Result<(Ufp, u64), Fp15Exception>, m: Modifiers) -> Fp15Outcome {
        let (v, fmq) = match result {
            Ok(r) => r,
            Err(e) => return Fp15Outcome::Exception(e),
        };
        let (v, fmq) = if m.normalize() {
            ufp::normalize(v, fmq, m.round(), m.precision())
        } else {
            (v, fmq)
        };
        if !v.is_zero() {
            match ufp::check_exponent(v.exp, m.precision()) {
                Ok(()) => (),
                Err(Fp15Exception::Underflow) => {
                    self.a = Ufp::ZERO;
                    self.fmq = 0;
                    return Fp15Outcome::Exception(Fp15Exception::Underflow);
                }
                Err(e) => return Fp15Outcome::Exception(e),
            }
        }
        self.a = m.apply_sign(v);
        self.fmq = fmq;
        Fp15Outcome::Completed
    }

    fn finish_integer(&mut self, result: Result<Ufp, Fp15Exception>, m: Modifiers) -> Fp15Outcome {
        match result {
            Ok(v) => {
                self.a = m.apply_sign(v);
                self.fmq = 0;
                Fp15Outcome::Completed
            }
            Err(e) => Fp15Outcome::Exception(e),
        }
    }
}
