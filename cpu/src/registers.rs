//! Processor registers, and the names by which front ends examine
//! and deposit them.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

pub const LINK: u32 = 0o1_000_000;
pub const WORD_MASK: u32 = 0o777_777;
pub const SIGN: u32 = 0o400_000;

/// The central processor's own registers.  The EAE, FP15, memory
/// management and interrupt registers live in their own units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Registers {
    /// Link (bit 18) and accumulator.
    pub lac: u32,
    pub pc: Address,
    /// The instruction most recently fetched.
    pub ir: Unsigned18Bit,
    /// Data switches.
    pub sr: u32,
    /// Address switches; the start address.
    pub asw: Address,
    /// PDP-15 index register.
    pub xr: u32,
    /// PDP-15 limit register.
    pub lr: u32,
}

impl Registers {
    pub fn ac(&self) -> u32 {
        self.lac & WORD_MASK
    }

    pub fn link(&self) -> bool {
        self.lac & LINK != 0
    }

    pub fn set_ac(&mut self, ac: u32) {
        self.lac = (self.lac & LINK) | (ac & WORD_MASK);
    }

    pub fn set_link(&mut self, link: bool) {
        self.lac = if link {
            self.lac | LINK
        } else {
            self.lac & WORD_MASK
        };
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize)]
pub enum RegisterName {
    Pc,
    Ac,
    Link,
    Mq,
    Sc,
    Ir,
    Sr,
    Asw,
    Xr,
    Lr,
    Bounds,
    Relocation,
    Mmr,
    Slr,
    ExtendMode,
    UserMode,
    Nexm,
    Prvn,
    Ion,
    ApiEnable,
    ApiActive,
    ApiRequest,
    Jea,
    FmaSign,
    FmaExponent,
    FmaHigh,
    FmaLow,
    FmbSign,
    FmbExponent,
    FmbHigh,
    FmbLow,
    FmqHigh,
    FmqLow,
    Guard,
    TrapPending,
}

impl RegisterName {
    #[must_use]
    pub const fn all_register_names() -> [RegisterName; 35] {
        [
            RegisterName::Pc,
            RegisterName::Ac,
            RegisterName::Link,
            RegisterName::Mq,
            RegisterName::Sc,
            RegisterName::Ir,
            RegisterName::Sr,
            RegisterName::Asw,
            RegisterName::Xr,
            RegisterName::Lr,
            RegisterName::Bounds,
            RegisterName::Relocation,
            RegisterName::Mmr,
            RegisterName::Slr,
            RegisterName::ExtendMode,
            RegisterName::UserMode,
            RegisterName::Nexm,
            RegisterName::Prvn,
            RegisterName::Ion,
            RegisterName::ApiEnable,
            RegisterName::ApiActive,
            RegisterName::ApiRequest,
            RegisterName::Jea,
            RegisterName::FmaSign,
            RegisterName::FmaExponent,
            RegisterName::FmaHigh,
            RegisterName::FmaLow,
            RegisterName::FmbSign,
            RegisterName::FmbExponent,
            RegisterName::FmbHigh,
            RegisterName::FmbLow,
            RegisterName::FmqHigh,
            RegisterName::FmqLow,
            RegisterName::Guard,
            RegisterName::TrapPending,
        ]
    }

    /// The largest value the register holds.  Deposits are masked
    /// to this.
    pub const fn mask(&self) -> u32 {
        match self {
            RegisterName::Link
            | RegisterName::ExtendMode
            | RegisterName::UserMode
            | RegisterName::Nexm
            | RegisterName::Prvn
            | RegisterName::Ion
            | RegisterName::ApiEnable
            | RegisterName::FmaSign
            | RegisterName::FmbSign
            | RegisterName::Guard
            | RegisterName::TrapPending => 1,
            RegisterName::Sc => 0o77,
            RegisterName::ApiActive | RegisterName::ApiRequest => 0o377,
            RegisterName::Pc | RegisterName::Asw => Address::MASK,
            RegisterName::Jea => 0o77_777,
            RegisterName::FmaHigh | RegisterName::FmbHigh | RegisterName::FmqHigh => 0o377_777,
            _ => WORD_MASK,
        }
    }
}

impl Display for RegisterName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            RegisterName::Pc => "PC",
            RegisterName::Ac => "AC",
            RegisterName::Link => "L",
            RegisterName::Mq => "MQ",
            RegisterName::Sc => "SC",
            RegisterName::Ir => "IR",
            RegisterName::Sr => "SR",
            RegisterName::Asw => "ASW",
            RegisterName::Xr => "XR",
            RegisterName::Lr => "LR",
            RegisterName::Bounds => "BR",
            RegisterName::Relocation => "RR",
            RegisterName::Mmr => "MMR",
            RegisterName::Slr => "SLR",
            RegisterName::ExtendMode => "MEMM",
            RegisterName::UserMode => "USMD",
            RegisterName::Nexm => "NEXM",
            RegisterName::Prvn => "PRVN",
            RegisterName::Ion => "ION",
            RegisterName::ApiEnable => "APIENB",
            RegisterName::ApiActive => "APIACT",
            RegisterName::ApiRequest => "APIREQ",
            RegisterName::Jea => "JEA",
            RegisterName::FmaSign => "FMAS",
            RegisterName::FmaExponent => "FMAE",
            RegisterName::FmaHigh => "FMAH",
            RegisterName::FmaLow => "FMAL",
            RegisterName::FmbSign => "FMBS",
            RegisterName::FmbExponent => "FMBE",
            RegisterName::FmbHigh => "FMBH",
            RegisterName::FmbLow => "FMBL",
            RegisterName::FmqHigh => "FMQH",
            RegisterName::FmqLow => "FMQL",
            RegisterName::Guard => "GUARD",
            RegisterName::TrapPending => "TRAP",
        })
    }
}

#[derive(Debug)]
pub struct UnknownRegisterName(String);

impl Display for UnknownRegisterName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "unknown register name '{}'", self.0)
    }
}

impl Error for UnknownRegisterName {}

impl TryFrom<&str> for RegisterName {
    type Error = UnknownRegisterName;
    fn try_from(s: &str) -> Result<RegisterName, UnknownRegisterName> {
        RegisterName::all_register_names()
            .into_iter()
            .find(|r| r.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRegisterName(s.to_owned()))
    }
}

#[test]
fn test_register_name_round_trip() {
    for orig in RegisterName::all_register_names() {
        let name = orig.to_string();
        match RegisterName::try_from(name.as_str()) {
            Ok(r) => {
                assert_eq!(r, orig);
            }
            Err(_) => {
                panic!("unable to round-trip register name {orig:?}");
            }
        }
    }
    assert_eq!(RegisterName::try_from("mq").ok(), Some(RegisterName::Mq));
    assert_eq!(
        RegisterName::try_from("fmae").ok(),
        Some(RegisterName::FmaExponent)
    );
    assert_eq!(RegisterName::try_from("TRAP").ok(), Some(RegisterName::TrapPending));
    assert!(RegisterName::try_from("R7").is_err());
}

#[test]
fn test_link_and_ac_are_separate() {
    let mut r = Registers::default();
    r.set_ac(0o1_777_777);
    assert_eq!(r.lac, 0o777_777);
    r.set_link(true);
    assert_eq!(r.lac, 0o1_777_777);
    r.set_ac(5);
    assert!(r.link());
    assert_eq!(r.ac(), 5);
}
