//! Execution history: the PC queue and the optional instruction
//! history.
use std::collections::VecDeque;

use serde::Serialize;

use base::prelude::*;

use crate::interrupt::Grant;

pub const PC_QUEUE_DEPTH: usize = 8;

/// The addresses of the last few instructions which changed the flow
/// of control (jumps, skips that skipped, interrupts), most recent
/// first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PcQueue {
    entries: VecDeque<Address>,
}

impl PcQueue {
    pub fn record(&mut self, pc: Address) {
        if self.entries.len() == PC_QUEUE_DEPTH {
            self.entries.pop_back();
        }
        self.entries.push_front(pc);
    }

    /// `get(0)` is the most recent entry.
    pub fn get(&self, n: usize) -> Option<Address> {
        self.entries.get(n).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HistoryEntry {
    /// A retired instruction, with the registers as they were after
    /// it executed.
    Instruction {
        pc: Address,
        ir: Unsigned18Bit,
        lac: u32,
        mq: u32,
        ea: Option<Address>,
    },
    Interrupt {
        pc: Address,
        grant: Grant,
    },
    Trap {
        pc: Address,
        return_word: u32,
    },
}

/// A ring buffer of [`HistoryEntry`] records, oldest first.  With a
/// capacity of zero nothing is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstructionHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl InstructionHistory {
    pub fn new(capacity: usize) -> InstructionHistory {
        InstructionHistory {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changing the capacity discards the recorded entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        *self = InstructionHistory::new(capacity);
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
