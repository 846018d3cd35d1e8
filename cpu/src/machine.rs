//! The whole machine: processor, memory, devices and scheduler.
//!
//! Front ends build a [`Cpu`] from a [`CpuConfiguration`] and a list
//! of [`DeviceRegistration`]s, load a program with
//! [`Cpu::load_word`], and call [`Cpu::run`] until it returns a
//! [`StopReason`].
use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{event, span, Level};

use base::prelude::*;

use crate::config::{ConfigurationError, CpuConfiguration};
use crate::control::{reserved_devices, Bus, ControlUnit};
use crate::fp15::Fp15;
use crate::history::{InstructionHistory, PcQueue};
use crate::interrupt::{InterruptRequests, VectorTable};
use crate::io::{DeviceRegistration, DeviceTable};
use crate::memory::{MemoryOpFailure, MemoryUnit};
use crate::registers::RegisterName;
use crate::scheduler::{NullScheduler, Scheduler};
use crate::stop::StopReason;

/// When [`Cpu::run`] should give control back.  Whatever happens, a
/// stop caused by the guest program (HLT, a bad API vector, and so
/// on) also ends the run.
#[derive(Debug, Clone, Default)]
pub struct StopConditions {
    /// Stop before executing the instruction at any of these
    /// addresses.  The instruction at the starting PC is exempt, so
    /// that a run can continue from a breakpoint.
    pub breakpoints: BTreeSet<Address>,
    /// Stop after this many steps.  One step is a single instruction
    /// (or interrupt grant); `Some(1)` single-steps.
    pub max_instructions: Option<u64>,
    /// Checked before every step; another thread sets it to stop the
    /// run.
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl StopConditions {
    pub fn single_step() -> StopConditions {
        StopConditions {
            max_instructions: Some(1),
            ..StopConditions::default()
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

pub struct Cpu {
    control: ControlUnit,
    mem: MemoryUnit,
    devices: DeviceTable,
    scheduler: Box<dyn Scheduler>,
}

impl Cpu {
    /// Builds a machine.  Fails if the configuration is not valid for
    /// its variant, or if device numbers or API lines are claimed
    /// twice.
    pub fn new(
        config: CpuConfiguration,
        registrations: Vec<DeviceRegistration>,
    ) -> Result<Cpu, ConfigurationError> {
        config.validate()?;
        let mut vectors = VectorTable::default();
        let devices = DeviceTable::build(registrations, &reserved_devices(&config), &mut vectors)?;
        let mem = MemoryUnit::new(config.memory_words);
        event!(
            Level::INFO,
            "built a {} with {}K words of memory",
            config.variant,
            config.memory_words / 1024
        );
        Ok(Cpu {
            control: ControlUnit::new(config, vectors),
            mem,
            devices,
            scheduler: Box::new(NullScheduler),
        })
    }

    /// Replaces the scheduler.  Events already scheduled with the old
    /// one are lost.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Cpu {
        self.scheduler = scheduler;
        self
    }

    pub fn config(&self) -> &CpuConfiguration {
        self.control.config()
    }

    /// Resets the processor and every device, as the console RESET
    /// key does.  Memory is kept.
    pub fn reset(&mut self) {
        self.control.reset();
        self.devices.reset_all(&mut self.control.requests);
    }

    /// Runs until one of `conditions` is met or the machine stops by
    /// itself.
    pub fn run(&mut self, conditions: &StopConditions) -> StopReason {
        let span = span!(Level::INFO, "run", variant=%self.control.variant());
        let _enter = span.enter();
        let mut steps: u64 = 0;
        loop {
            if conditions.stop_requested() {
                event!(Level::INFO, "stop requested");
                return StopReason::ExternalStop;
            }
            if conditions.max_instructions.is_some_and(|max| steps >= max) {
                return StopReason::StepLimit;
            }
            let pc = self.control.regs.pc;
            if steps > 0 && conditions.breakpoints.contains(&pc) {
                event!(Level::INFO, "breakpoint at {}", pc);
                return StopReason::Breakpoint { pc };
            }
            if let Err(reason) = self.step() {
                if reason.kind().is_fault() {
                    event!(Level::WARN, "stopped: {}", reason);
                } else {
                    event!(Level::INFO, "stopped: {}", reason);
                }
                return reason;
            }
            steps += 1;
        }
    }

    /// Performs one step of the machine.
    pub fn step(&mut self) -> Result<(), StopReason> {
        let mut bus = Bus {
            mem: &mut self.mem,
            devices: &mut self.devices,
            scheduler: self.scheduler.as_mut(),
        };
        self.control.iterate(&mut bus)
    }

    /// Stores a word in physical memory, bypassing translation.
    pub fn load_word(&mut self, addr: Address, value: Unsigned18Bit) -> Result<(), MemoryOpFailure> {
        self.mem.store(addr, value)
    }

    /// Reads a word of physical memory.
    pub fn read_word(&self, addr: Address) -> Result<Unsigned18Bit, MemoryOpFailure> {
        self.mem.fetch(addr)
    }

    pub fn set_pc(&mut self, pc: Address) {
        self.control.deposit(RegisterName::Pc, pc.bits());
    }

    pub fn examine(&self, name: RegisterName) -> u32 {
        self.control.examine(name)
    }

    pub fn deposit(&mut self, name: RegisterName, value: u32) {
        self.control.deposit(name, value);
    }

    pub fn pc_queue(&self) -> &PcQueue {
        self.control.pc_queue()
    }

    pub fn history(&self) -> &InstructionHistory {
        self.control.history()
    }

    pub fn clear_history(&mut self) {
        self.control.history.clear();
    }

    /// Sets how many instructions the history keeps.  Zero turns
    /// recording off.
    pub fn set_history_capacity(&mut self, capacity: usize) {
        self.control.history.set_capacity(capacity);
    }

    /// Which device (or processor function) answers to a device
    /// number, if any.
    pub fn device_name(&self, device: Unsigned6Bit) -> Option<String> {
        self.devices.name_of(device)
    }

    /// The request lines, for a front end to raise or drop an
    /// interrupt by hand.
    pub fn interrupt_requests_mut(&mut self) -> &mut InterruptRequests {
        &mut self.control.requests
    }

    pub fn scheduler_mut(&mut self) -> &mut dyn Scheduler {
        self.scheduler.as_mut()
    }

    pub fn fp15(&self) -> &Fp15 {
        &self.control.fp15
    }

    /// Virtual time, in instructions executed.
    pub fn virtual_time(&self) -> u64 {
        self.control.now()
    }
}

impl Debug for Cpu {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("control", &self.control)
            .field("memory_words", &self.mem.size())
            .field("devices", &self.devices)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
