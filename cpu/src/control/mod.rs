//! Emulates the central processor.
//!
//! Each call to [`ControlUnit::iterate`] performs one step of the
//! machine, in this order:
//!
//! 1. Run any scheduler events which have fallen due.
//! 2. Commit a delayed addressing-mode or user-mode change.
//! 3. Service a pending memory management trap.
//! 4. Otherwise, unless the previous instruction deferred it, deliver
//!    an interrupt.
//! 5. Fetch and decode the next instruction (an API grant instead
//!    executes the word at its vector).
//! 6. Resolve the operand address and execute the instruction.
//! 7. Record history.
//!
//! Instruction handlers are grouped by class in the `op_*` modules.
use tracing::{event, span, Level};

mod examine;
mod op_fpu;
mod op_index;
mod op_iot;
mod op_memref;
mod op_operate;
mod resolve;

#[cfg(test)]
mod tests;

use base::prelude::*;

use crate::config::{CpuConfiguration, Protection};
use crate::eae::Eae;
use crate::fp15::Fp15;
use crate::history::{HistoryEntry, InstructionHistory, PcQueue};
use crate::interrupt::{Grant, InterruptRequests, InterruptState, VectorTable};
use crate::io::DeviceTable;
use crate::memory::MemoryUnit;
use crate::mmu::{AccessKind, MemoryManagement, RETURN_WORD_USER};
use crate::registers::{Registers, SIGN, WORD_MASK};
use crate::scheduler::Scheduler;
use crate::stop::StopReason;
use crate::variant::Variant;

/// Device numbers the processor decodes itself.
pub(crate) const DEV_PI: u8 = 0o00;
pub(crate) const DEV_STATUS: u8 = 0o03;
pub(crate) const DEV_PROTECTION: u8 = 0o17;
pub(crate) const DEV_CLEAR_FLAGS: u8 = 0o33;
pub(crate) const DEV_API: u8 = 0o55;
pub(crate) const DEV_ADDRESSING: u8 = 0o77;

/// The device numbers owned by the processor in this configuration.
pub(crate) fn reserved_devices(config: &CpuConfiguration) -> Vec<(u8, &'static str)> {
    let mut reserved = vec![
        (DEV_PI, "program interrupt"),
        (DEV_STATUS, "status"),
        (DEV_CLEAR_FLAGS, "clear flags"),
        (DEV_ADDRESSING, "addressing mode"),
    ];
    if config.api {
        reserved.push((DEV_API, "API"));
    }
    if config.protection != Protection::None {
        reserved.push((DEV_PROTECTION, "memory protection"));
    }
    reserved
}

/// Why an instruction did not run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Aborted {
    /// A memory management trap is now pending; the instruction has
    /// been abandoned.
    Trap,
    Stop(StopReason),
}

impl From<StopReason> for Aborted {
    fn from(reason: StopReason) -> Aborted {
        Aborted::Stop(reason)
    }
}

/// Everything outside the processor which an instruction can reach.
pub(crate) struct Bus<'a> {
    pub(crate) mem: &'a mut MemoryUnit,
    pub(crate) devices: &'a mut DeviceTable,
    pub(crate) scheduler: &'a mut dyn Scheduler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdleLoop {
    /// `JMP .`
    JumpToSelf,
    /// `JMP .-1` just after an IOT (a skip-on-flag wait loop).
    Poll,
}

#[derive(Debug)]
pub struct ControlUnit {
    config: CpuConfiguration,
    pub(crate) regs: Registers,
    pub(crate) eae: Eae,
    pub(crate) fp15: Fp15,
    pub(crate) mm: MemoryManagement,
    pub(crate) interrupts: InterruptState,
    pub(crate) vectors: VectorTable,
    pub(crate) requests: InterruptRequests,
    pub(crate) pc_queue: PcQueue,
    pub(crate) history: InstructionHistory,
    /// Virtual time, counted in instructions.
    now: u64,
    /// The address of the instruction being executed.  For an
    /// instruction run by XCT, this is the address of the XCT.
    origin: Address,
    /// The effective address of the current instruction, if it has
    /// one.
    last_ea: Option<Address>,
    /// The pointer word used by the current instruction's indirect
    /// reference.
    last_pointer: Option<u32>,
    /// The return word saved when an API interrupt was granted; used
    /// by the JMS at the vector.
    saved_return_word: Option<u32>,
    previous_was_iot: bool,
    idle: Option<IdleLoop>,
}

impl ControlUnit {
    pub fn new(config: CpuConfiguration, vectors: VectorTable) -> ControlUnit {
        let variant = config.variant;
        ControlUnit {
            regs: Registers::default(),
            eae: Eae::default(),
            fp15: Fp15::default(),
            mm: MemoryManagement::new(
                variant,
                config.protection,
                config.memory_words,
                config.bank_mode_at_reset,
            ),
            interrupts: InterruptState::new(variant, config.api),
            vectors,
            requests: InterruptRequests::default(),
            pc_queue: PcQueue::default(),
            history: InstructionHistory::new(config.history_capacity),
            now: 0,
            origin: Address::ZERO,
            last_ea: None,
            last_pointer: None,
            saved_return_word: None,
            previous_was_iot: false,
            idle: None,
            config,
        }
    }

    pub fn config(&self) -> &CpuConfiguration {
        &self.config
    }

    pub fn variant(&self) -> Variant {
        self.config.variant
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Returns the processor to its power-on state.  The PC, the
    /// switches and the recorded history are kept.
    pub fn reset(&mut self) {
        let span = span!(Level::ERROR, "reset", variant=%self.config.variant);
        let _enter = span.enter();
        event!(Level::INFO, "resetting the processor");
        self.regs = Registers {
            pc: self.regs.pc,
            sr: self.regs.sr,
            asw: self.regs.asw,
            ..Registers::default()
        };
        self.eae.reset();
        self.fp15.reset();
        self.mm.reset();
        self.interrupts.reset();
        self.requests.clear_all();
        self.saved_return_word = None;
        self.previous_was_iot = false;
        self.idle = None;
    }

    fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            index_operate: self.config.variant.has_index_registers(),
            fp15: self.config.fp15,
        }
    }

    /// The address after `pc`, wrapping within the current block.
    fn next_pc(&self, pc: Address) -> Address {
        let mask = self.config.variant.pc_increment_mask();
        let bits = pc.bits();
        Address::truncate((bits & !mask) | (bits.wrapping_add(1) & mask))
    }

    fn skip(&mut self) {
        self.regs.pc = self.next_pc(self.regs.pc);
    }

    /// The word saved by JMS and by interrupts: link, addressing
    /// mode, user mode and the PC.
    fn return_word(&self) -> u32 {
        let link = if self.regs.link() { SIGN } else { 0 };
        link | self.mm.return_word_bits()
            | (self.regs.pc.bits() & self.config.variant.return_pc_mask())
    }

    fn take_return_word(&mut self) -> u32 {
        match self.saved_return_word.take() {
            Some(word) => word,
            None => self.return_word(),
        }
    }

    /// Reads through address translation.  A fault which does not
    /// trap reads as zero.
    fn read(
        &mut self,
        mem: &MemoryUnit,
        va: Address,
        access: AccessKind,
    ) -> Result<u32, Aborted> {
        match self.mm.translate(va, access) {
            Ok(pa) => Ok(mem.fetch(pa).map_or(0, u32::from)),
            Err(fault) if fault.trapped => Err(Aborted::Trap),
            Err(_) => Ok(0),
        }
    }

    /// Writes through address translation.  A write which faults
    /// without trapping is dropped.
    fn write(&mut self, mem: &mut MemoryUnit, va: Address, value: u32) -> Result<(), Aborted> {
        match self.mm.translate(va, AccessKind::Write) {
            Ok(pa) => {
                event!(Level::TRACE, "write @{} <- {:06o}", pa, value & WORD_MASK);
                if let Err(e) = mem.store(pa, Unsigned18Bit::truncate(value)) {
                    event!(Level::WARN, "memory store failed: {}", e);
                }
                Ok(())
            }
            Err(fault) if fault.trapped => Err(Aborted::Trap),
            Err(_) => Ok(()),
        }
    }

    /// Reads the word at the PC and steps past it.  Used for the
    /// second word of EAE and FP15 instructions.
    fn fetch_immediate(&mut self, mem: &MemoryUnit) -> Result<u32, Aborted> {
        let pc = self.regs.pc;
        let word = self.read(mem, pc, AccessKind::Fetch)?;
        self.regs.pc = self.next_pc(pc);
        Ok(word)
    }

    fn store_physical(mem: &mut MemoryUnit, addr: Address, value: u32) {
        if let Err(e) = mem.store(addr, Unsigned18Bit::truncate(value)) {
            event!(Level::WARN, "cannot save return word: {}", e);
        }
    }

    fn unimplemented(&self, inst: Instruction) -> Result<(), Aborted> {
        if self.config.stop_on_unimplemented {
            event!(
                Level::WARN,
                "unimplemented instruction {} at {}",
                inst,
                self.origin
            );
            Err(Aborted::Stop(StopReason::UnimplementedInstruction {
                pc: self.origin,
                ir: inst.bits(),
            }))
        } else {
            event!(
                Level::WARN,
                "unimplemented instruction {} at {} treated as a no-op",
                inst,
                self.origin
            );
            Ok(())
        }
    }

    /// Instructions which may not run in user mode call this first.
    fn privileged(&mut self) -> Result<(), Aborted> {
        if self.mm.usmd {
            event!(
                Level::DEBUG,
                "privileged instruction at {} in user mode",
                self.origin
            );
            self.mm.prvn = true;
            self.mm.trap_pending = true;
            Err(Aborted::Trap)
        } else {
            Ok(())
        }
    }

    /// Performs one step of the machine.
    pub(crate) fn iterate(&mut self, bus: &mut Bus<'_>) -> Result<(), StopReason> {
        if let Some(idle) = self.idle.take() {
            self.skip_idle_time(idle, bus)?;
        }
        if bus
            .scheduler
            .next_event()
            .is_some_and(|due| due <= self.now)
        {
            bus.scheduler
                .service(self.now, &mut *bus.devices, &mut self.requests)
                .map_err(|reason| {
                    event!(Level::WARN, "scheduler stopped the machine: {}", reason);
                    StopReason::SchedulerStop { reason }
                })?;
        }
        self.mm.advance_pending_modes();

        if self.mm.trap_pending {
            self.service_trap(bus.mem);
        } else if !self.interrupts.is_deferred() {
            match self.interrupts.arbitrate(&self.requests, &self.vectors) {
                Ok(None) => (),
                Ok(Some(Grant::Pi)) => self.deliver_pi(bus.mem),
                Ok(Some(Grant::Api { level, vector })) => {
                    return self.deliver_api(level, vector, bus);
                }
                Err(stop) => {
                    event!(Level::WARN, "interrupt arbitration failed: {}", stop);
                    return Err(stop);
                }
            }
        }

        self.interrupts.clear_deferral();
        let pc = self.regs.pc;
        self.origin = pc;
        self.last_ea = None;
        let word = match self.read(bus.mem, pc, AccessKind::Fetch) {
            Ok(word) => word,
            Err(Aborted::Trap) => {
                self.now += 1;
                return Ok(());
            }
            Err(Aborted::Stop(reason)) => return Err(reason),
        };
        self.regs.pc = self.next_pc(pc);
        self.regs.ir = Unsigned18Bit::truncate(word);
        let inst = Instruction::from(self.regs.ir);
        let result = self.execute(inst, 0, bus);
        self.previous_was_iot = inst.opcode(self.decode_options()) == Opcode::Iot;
        self.retire(pc, inst);
        match result {
            Ok(()) | Err(Aborted::Trap) => Ok(()),
            Err(Aborted::Stop(reason)) => Err(reason),
        }
    }

    fn retire(&mut self, pc: Address, inst: Instruction) {
        self.now += 1;
        if self.history.is_enabled() {
            self.history.record(HistoryEntry::Instruction {
                pc,
                ir: inst.bits(),
                lac: self.regs.lac,
                mq: self.eae.mq,
                ea: self.last_ea,
            });
        }
    }

    /// Executes `inst`, which has already been fetched.  `depth` is
    /// the number of XCT instructions enclosing it.
    fn execute(&mut self, inst: Instruction, depth: u32, bus: &mut Bus<'_>) -> Result<(), Aborted> {
        let opcode = inst.opcode(self.decode_options());
        let span = span!(Level::INFO, "xop", pc=%self.origin, op=%opcode);
        let _enter = span.enter();
        event!(Level::TRACE, "executing {}", inst);
        match opcode {
            Opcode::Cal => self.op_cal(bus.mem),
            Opcode::Dac => self.op_dac(inst, bus.mem),
            Opcode::Jms => self.op_jms(inst, bus.mem),
            Opcode::Dzm => self.op_dzm(inst, bus.mem),
            Opcode::Lac => self.op_lac(inst, bus.mem),
            Opcode::Xor => self.op_xor(inst, bus.mem),
            Opcode::Add => self.op_add(inst, bus.mem),
            Opcode::Tad => self.op_tad(inst, bus.mem),
            Opcode::Xct => self.op_xct(inst, depth, bus),
            Opcode::Isz => self.op_isz(inst, bus.mem),
            Opcode::And => self.op_and(inst, bus.mem),
            Opcode::Sad => self.op_sad(inst, bus.mem),
            Opcode::Jmp => self.op_jmp(inst, bus.mem),
            Opcode::Eae => self.op_eae(inst, bus.mem),
            Opcode::Iot => self.op_iot(inst, bus),
            Opcode::Fpu => self.op_fpu(inst, bus.mem),
            Opcode::IndexOperate => self.op_index(inst),
            Opcode::Opr => self.op_opr(inst),
            Opcode::Law => {
                self.op_law(inst);
                Ok(())
            }
        }
    }

    fn service_trap(&mut self, mem: &mut MemoryUnit) {
        let mut word = self.return_word();
        if self.config.variant.saves_user_mode() {
            word |= RETURN_WORD_USER;
        }
        event!(
            Level::INFO,
            "memory management trap at {} (nexm={}, prvn={}), return word {:06o}",
            self.regs.pc,
            self.mm.nexm,
            self.mm.prvn,
            word
        );
        self.mm.trap_pending = false;
        self.mm.emir_pending = false;
        self.mm.rest_pending = false;
        self.mm.enter_executive();
        self.interrupts.ion = false;
        ControlUnit::store_physical(mem, Address::ZERO, word);
        self.pc_queue.record(self.regs.pc);
        self.history.record(HistoryEntry::Trap {
            pc: self.regs.pc,
            return_word: word,
        });
        self.regs.pc = Address::truncate(2);
    }

    fn deliver_pi(&mut self, mem: &mut MemoryUnit) {
        let word = self.return_word();
        event!(
            Level::INFO,
            "program interrupt at {}, return word {:06o}",
            self.regs.pc,
            word
        );
        self.interrupts.acknowledge(Grant::Pi);
        self.mm.enter_executive();
        ControlUnit::store_physical(mem, Address::ZERO, word);
        self.pc_queue.record(self.regs.pc);
        self.history.record(HistoryEntry::Interrupt {
            pc: self.regs.pc,
            grant: Grant::Pi,
        });
        self.regs.pc = Address::truncate(1);
    }

    /// Grants an API level and executes the instruction at its
    /// vector, as XCT would.
    fn deliver_api(
        &mut self,
        level: u8,
        vector: Address,
        bus: &mut Bus<'_>,
    ) -> Result<(), StopReason> {
        let grant = Grant::Api { level, vector };
        let word = self.return_word();
        event!(
            Level::INFO,
            "API level {} interrupt at {} through {}",
            level,
            self.regs.pc,
            vector
        );
        self.interrupts.acknowledge(grant);
        self.mm.enter_executive();
        self.history.record(HistoryEntry::Interrupt {
            pc: self.regs.pc,
            grant,
        });
        self.origin = vector;
        self.last_ea = None;
        self.saved_return_word = Some(word);
        let result = match self.read(bus.mem, vector, AccessKind::Fetch) {
            Ok(w) => {
                let inst = Instruction::from(Unsigned18Bit::truncate(w));
                self.execute(inst, 0, bus)
            }
            Err(e) => Err(e),
        };
        self.saved_return_word = None;
        self.now += 1;
        match result {
            Ok(()) | Err(Aborted::Trap) => Ok(()),
            Err(Aborted::Stop(reason)) => Err(reason),
        }
    }

    /// Called at the start of the step after an idle loop was
    /// detected.  Moves virtual time on to the next scheduled event.
    fn skip_idle_time(&mut self, idle: IdleLoop, bus: &mut Bus<'_>) -> Result<(), StopReason> {
        if self.mm.trap_pending || self.interrupts.deliverable(&self.requests, &self.vectors) {
            return Ok(());
        }
        match bus.scheduler.next_event() {
            Some(due) => {
                if due > self.now {
                    event!(
                        Level::TRACE,
                        "idle at {}: skipping from {} to {}",
                        self.origin,
                        self.now,
                        due
                    );
                    self.now = due;
                }
                Ok(())
            }
            None if idle == IdleLoop::JumpToSelf => {
                event!(Level::INFO, "infinite loop at {}", self.origin);
                Err(StopReason::InfiniteLoop { pc: self.origin })
            }
            None => Ok(()),
        }
    }

    pub(crate) fn pc_queue(&self) -> &PcQueue {
        &self.pc_queue
    }

    pub(crate) fn history(&self) -> &InstructionHistory {
        &self.history
    }
}
