//! Emulation of the 18-bit processor family: the PDP-4, PDP-7,
//! PDP-9 and PDP-15, with the EAE, the automatic priority interrupt,
//! memory protection and relocation, and the FP15 floating-point
//! processor.
//!
//! Peripheral devices are supplied by the caller through the
//! [`Device`] trait, and time is managed by a [`Scheduler`].
#![crate_name = "cpu"]

mod config;
mod control;
mod eae;
pub mod fp15;
mod history;
mod interrupt;
mod io;
mod machine;
mod memory;
mod mmu;
mod registers;
mod scheduler;
mod stop;
mod variant;

pub use config::{ConfigurationError, CpuConfiguration, Protection};
pub use eae::Eae;
pub use fp15::{Fp15, Fp15Exception};
pub use history::{HistoryEntry, InstructionHistory, PcQueue, PC_QUEUE_DEPTH};
pub use interrupt::{Grant, InterruptRequests, RequestLevel};
pub use io::{Device, DeviceRegistration, DeviceTable, IoContext, IotResponse, IotResult};
pub use machine::{Cpu, StopConditions};
pub use memory::MemoryOpFailure;
pub use mmu::{AccessKind, FaultKind, TranslationFault};
pub use registers::{RegisterName, UnknownRegisterName};
pub use scheduler::{NullScheduler, Scheduler, VirtualTimeScheduler, NO_SUCH_DEVICE};
pub use stop::{StopKind, StopReason, UnknownStopName};
pub use variant::{UnknownVariantName, Variant};
