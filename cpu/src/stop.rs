//! Reasons for which [`crate::Cpu::run`] returns.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

/// The kinds of stop, without their details.  The names are those a
/// front end would print or accept in a "stop on" command.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize)]
pub enum StopKind {
    Halt,
    Breakpoint,
    StepLimit,
    ExternalStop,
    Unimplemented,
    XctLimit,
    BadApiVector,
    InfiniteLoop,
    IoStop,
    SchedulerStop,
}

impl Display for StopKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            StopKind::Halt => "HALT",
            StopKind::Breakpoint => "BREAKPOINT",
            StopKind::StepLimit => "STEP",
            StopKind::ExternalStop => "USER",
            StopKind::Unimplemented => "UNIMPLEMENTED",
            StopKind::XctLimit => "XCTLIMIT",
            StopKind::BadApiVector => "APIVECTOR",
            StopKind::InfiniteLoop => "LOOP",
            StopKind::IoStop => "IO",
            StopKind::SchedulerStop => "SCHEDULER",
        })
    }
}

impl StopKind {
    #[must_use]
    pub const fn all_stop_kinds() -> [StopKind; 10] {
        [
            StopKind::Halt,
            StopKind::Breakpoint,
            StopKind::StepLimit,
            StopKind::ExternalStop,
            StopKind::Unimplemented,
            StopKind::XctLimit,
            StopKind::BadApiVector,
            StopKind::InfiniteLoop,
            StopKind::IoStop,
            StopKind::SchedulerStop,
        ]
    }

    /// True for stops which indicate that the guest program (or the
    /// machine configuration) is broken, as opposed to stops the
    /// operator asked for.
    pub const fn is_fault(&self) -> bool {
        matches!(
            self,
            StopKind::Unimplemented
                | StopKind::XctLimit
                | StopKind::BadApiVector
                | StopKind::IoStop
                | StopKind::SchedulerStop
        )
    }
}

#[derive(Debug)]
pub struct UnknownStopName(String);

impl Display for UnknownStopName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "unknown stop name '{}'", self.0)
    }
}

impl Error for UnknownStopName {}

impl TryFrom<&str> for StopKind {
    type Error = UnknownStopName;
    fn try_from(s: &str) -> Result<StopKind, UnknownStopName> {
        StopKind::all_stop_kinds()
            .into_iter()
            .find(|k| k.to_string() == s)
            .ok_or_else(|| UnknownStopName(s.to_owned()))
    }
}

#[test]
fn test_stop_kind_round_trip() {
    for orig_kind in StopKind::all_stop_kinds() {
        let name = orig_kind.to_string();
        match StopKind::try_from(name.as_str()) {
            Ok(k) => {
                assert_eq!(k, orig_kind);
            }
            Err(_) => {
                panic!("unable to round-trip stop kind {orig_kind:?}");
            }
        }
    }
    assert!(StopKind::try_from("this is not a stop name").is_err());
}

/// Why execution stopped.  Addresses are those of the instruction
/// concerned; the PC itself may already have moved past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// A HLT instruction was executed.
    Halt { pc: Address },
    Breakpoint { pc: Address },
    /// The instruction budget of the run was used up.
    StepLimit,
    /// The external stop flag was raised.
    ExternalStop,
    UnimplementedInstruction { pc: Address, ir: Unsigned18Bit },
    /// XCT instructions were nested more deeply than allowed.
    XctLimit { pc: Address },
    /// An API level won arbitration but no vector is assigned to the
    /// requesting line.
    BadApiVector { level: u8 },
    /// The program is waiting for something which can never happen.
    InfiniteLoop { pc: Address },
    /// A device returned a fatal status.
    IoStop { device: Unsigned6Bit, reason: u32 },
    /// The scheduler reported a fatal condition.
    SchedulerStop { reason: u32 },
}

impl StopReason {
    pub fn kind(&self) -> StopKind {
        match self {
            StopReason::Halt { .. } => StopKind::Halt,
            StopReason::Breakpoint { .. } => StopKind::Breakpoint,
            StopReason::StepLimit => StopKind::StepLimit,
            StopReason::ExternalStop => StopKind::ExternalStop,
            StopReason::UnimplementedInstruction { .. } => StopKind::Unimplemented,
            StopReason::XctLimit { .. } => StopKind::XctLimit,
            StopReason::BadApiVector { .. } => StopKind::BadApiVector,
            StopReason::InfiniteLoop { .. } => StopKind::InfiniteLoop,
            StopReason::IoStop { .. } => StopKind::IoStop,
            StopReason::SchedulerStop { .. } => StopKind::SchedulerStop,
        }
    }
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            StopReason::Halt { pc } => write!(f, "HALT instruction at {pc}"),
            StopReason::Breakpoint { pc } => write!(f, "breakpoint at {pc}"),
            StopReason::StepLimit => f.write_str("step limit reached"),
            StopReason::ExternalStop => f.write_str("stopped by request"),
            StopReason::UnimplementedInstruction { pc, ir } => {
                write!(f, "unimplemented instruction {ir:06o} at {pc}")
            }
            StopReason::XctLimit { pc } => write!(f, "XCT nesting limit exceeded at {pc}"),
            StopReason::BadApiVector { level } => {
                write!(f, "API level {level} requested with no valid vector")
            }
            StopReason::InfiniteLoop { pc } => write!(f, "infinite loop at {pc}"),
            StopReason::IoStop { device, reason } => {
                write!(f, "device {device:02o} stopped the machine (reason {reason})")
            }
            StopReason::SchedulerStop { reason } => {
                write!(f, "scheduler stopped the machine (reason {reason})")
            }
        }
    }
}

impl Error for StopReason {}
