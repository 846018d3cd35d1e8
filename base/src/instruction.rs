//! Decoding of 18-bit instruction words.
//!
//! ## Instruction Format
//!
//! | Bits  | 0-3    | 4        | 5-17                 |
//! | ----- | ------ | -------- | -------------------- |
//! | Field | opcode | indirect | address (13 bits)    |
//!
//! In page mode (the largest machine only) bit 5 is instead an index
//! bit and the address is 12 bits.  Octal opcodes 64 (EAE), 70 (IOT)
//! and 74 (OPR) use the remaining bits as micro-operations; 76 (LAW)
//! is the OPR opcode with the indirect bit set.  On the largest
//! machine 71 is a floating-point instruction (when the FP15 is
//! installed) and 72/73 are index-register operations.
//!
//! Bits are numbered from 0 at the most significant end, as in the
//! machine documentation.

use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;

use super::onescomplement::arith::sign_extend;
use super::onescomplement::unsigned::{Unsigned18Bit, Unsigned6Bit};


pub const INDIRECT_BIT: u32 = 0o020_000;
pub const PAGE_INDEX_BIT: u32 = 0o010_000;
pub const BANK_ADDRESS_MASK: u32 = 0o017_777;
pub const PAGE_ADDRESS_MASK: u32 = 0o007_777;

/// IOT bit 14 clears AC before the transfer.
pub const IOT_CLEAR_AC: u32 = 0o000_010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Opcode {
    Cal,
    Dac,
    Jms,
    Dzm,
    Lac,
    Xor,
    Add,
    Tad,
    Xct,
    Isz,
    And,
    Sad,
    Jmp,
    Eae,
    Iot,
    Fpu,
    IndexOperate,
    Opr,
    Law,
}

const MEMORY_REFERENCE_OPCODES: [Opcode; 13] = [
    Opcode::Cal,
    Opcode::Dac,
    Opcode::Jms,
    Opcode::Dzm,
    Opcode::Lac,
    Opcode::Xor,
    Opcode::Add,
    Opcode::Tad,
    Opcode::Xct,
    Opcode::Isz,
    Opcode::And,
    Opcode::Sad,
    Opcode::Jmp,
];

impl Opcode {
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Cal => "CAL",
            Opcode::Dac => "DAC",
            Opcode::Jms => "JMS",
            Opcode::Dzm => "DZM",
            Opcode::Lac => "LAC",
            Opcode::Xor => "XOR",
            Opcode::Add => "ADD",
            Opcode::Tad => "TAD",
            Opcode::Xct => "XCT",
            Opcode::Isz => "ISZ",
            Opcode::And => "AND",
            Opcode::Sad => "SAD",
            Opcode::Jmp => "JMP",
            Opcode::Eae => "EAE",
            Opcode::Iot => "IOT",
            Opcode::Fpu => "FPU",
            Opcode::IndexOperate => "IDX",
            Opcode::Opr => "OPR",
            Opcode::Law => "LAW",
        }
    }

    /// True for opcodes whose operand is found by the usual
    /// direct/indirect address calculation.
    #[must_use]
    pub fn is_memory_reference(&self) -> bool {
        MEMORY_REFERENCE_OPCODES.contains(self)
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(self.mnemonic())
    }
}

/// Which optional instruction groups the decoder should recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    /// Octal 72/73 are index-register operations.
    pub index_operate: bool,
    /// Octal 71 is a floating-point instruction.
    pub fp15: bool,
}

/// Index-register operations (octal 72xxxx and 73xxxx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IndexOperation {
    /// AC to XR.
    Pax,
    /// AC to LR.
    Pal,
    /// Add the immediate to AC.
    Aac,
    /// XR to AC.
    Pxa,
    /// Add the immediate to XR, skip if XR is at least LR.
    Axs,
    /// XR to LR.
    Pxl,
    /// LR to AC.
    Pla,
    /// LR to XR.
    Plx,
    /// Clear XR.
    Clx,
    /// Clear LR.
    Cllr,
    /// Add the immediate to XR.
    Axr,
}

impl Display for IndexOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            IndexOperation::Pax => "PAX",
            IndexOperation::Pal => "PAL",
            IndexOperation::Aac => "AAC",
            IndexOperation::Pxa => "PXA",
            IndexOperation::Axs => "AXS",
            IndexOperation::Pxl => "PXL",
            IndexOperation::Pla => "PLA",
            IndexOperation::Plx => "PLX",
            IndexOperation::Clx => "CLX",
            IndexOperation::Cllr => "CLLR",
            IndexOperation::Axr => "AXR",
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Instruction(Unsigned18Bit);

impl Instruction {
    pub const fn new(bits: Unsigned18Bit) -> Instruction {
        Instruction(bits)
    }

    pub const fn bits(&self) -> Unsigned18Bit {
        self.0
    }

    const fn raw(&self) -> u32 {
        self.0.bits()
    }

    /// Bits 0-3 of the instruction.
    pub const fn major_opcode(&self) -> u8 {
        ((self.raw() >> 14) & 0o17) as u8
    }

    pub const fn is_indirect(&self) -> bool {
        self.raw() & INDIRECT_BIT != 0
    }

    /// The index bit of page-mode addressing.
    pub const fn is_page_indexed(&self) -> bool {
        self.raw() & PAGE_INDEX_BIT != 0
    }

    /// The address field as seen in bank mode.
    pub const fn bank_address(&self) -> u32 {
        self.raw() & BANK_ADDRESS_MASK
    }

    /// The address field as seen in page mode.
    pub const fn page_address(&self) -> u32 {
        self.raw() & PAGE_ADDRESS_MASK
    }

    /// The device selected by an IOT.
    pub fn device(&self) -> Unsigned6Bit {
        Unsigned6Bit::truncate(((self.raw() >> 6) & 0o77) as u8)
    }

    /// The pulse field of an IOT (bits 12-17).
    pub const fn pulse(&self) -> u8 {
        (self.raw() & 0o77) as u8
    }

    pub const fn clears_ac(&self) -> bool {
        self.raw() & IOT_CLEAR_AC != 0
    }

    #[must_use]
    pub fn opcode(&self, options: DecodeOptions) -> Opcode {
        match self.major_opcode() {
            13 => Opcode::Eae,
            14 => match (self.raw() >> 12) & 3 {
                0 => Opcode::Iot,
                1 if options.fp15 => Opcode::Fpu,
                2 | 3 if options.index_operate => Opcode::IndexOperate,
                _ => Opcode::Iot,
            },
            15 => {
                if self.is_indirect() {
                    Opcode::Law
                } else {
                    Opcode::Opr
                }
            }
            n => MEMORY_REFERENCE_OPCODES[usize::from(n)],
        }
    }

    /// Decodes bits 5-8 of an index-register instruction.  Returns
    /// `None` for the unassigned codes.
    pub fn index_operation(&self) -> Option<IndexOperation> {
        match (self.raw() >> 9) & 0o17 {
            0o01 => Some(IndexOperation::Pax),
            0o02 => Some(IndexOperation::Pal),
            0o03 => Some(IndexOperation::Aac),
            0o04 => Some(IndexOperation::Pxa),
            0o05 => Some(IndexOperation::Axs),
            0o06 => Some(IndexOperation::Pxl),
            0o10 => Some(IndexOperation::Pla),
            0o11 => Some(IndexOperation::Plx),
            0o15 => Some(IndexOperation::Clx),
            0o16 => Some(IndexOperation::Cllr),
            0o17 => Some(IndexOperation::Axr),
            _ => None,
        }
    }

    /// The signed 9-bit immediate operand of an index-register
    /// instruction.
    pub const fn index_immediate(&self) -> i32 {
        sign_extend(self.raw() & 0o777, 9)
    }
}

impl From<Unsigned18Bit> for Instruction {
    fn from(bits: Unsigned18Bit) -> Instruction {
        Instruction(bits)
    }
}

impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Instruction({:06o})", self.raw())
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:06o}", self.raw())
    }
}
