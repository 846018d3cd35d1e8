//! The interface to the discrete-event scheduler.
//!
//! Time is counted in instructions.  The engine asks the scheduler
//! when the next event is due and calls [`Scheduler::service`] once
//! that time has been reached.  Device simulators only see an
//! [`IoContext`], so they can change their own request lines and ask
//! to be woken again, but cannot reach the engine.
use std::cmp::Reverse;
use std::fmt::Debug;

use keyed_priority_queue::KeyedPriorityQueue;
use tracing::{event, Level};

use base::prelude::*;

use crate::interrupt::InterruptRequests;
use crate::io::{DeviceTable, IoContext};

pub trait Scheduler: Debug {
    /// Arranges for `device` to be serviced at time `at`, replacing
    /// any earlier arrangement for the same device.
    fn schedule(&mut self, device: Unsigned6Bit, at: u64);

    fn cancel(&mut self, device: Unsigned6Bit);

    /// When the earliest pending event is due.
    fn next_event(&self) -> Option<u64>;

    /// Runs every event due at or before `now`.  A non-zero `Err`
    /// value stops the machine with
    /// [`crate::StopReason::SchedulerStop`].
    fn service(
        &mut self,
        now: u64,
        devices: &mut DeviceTable,
        requests: &mut InterruptRequests,
    ) -> Result<(), u32>;
}

/// A scheduler with nothing ever scheduled.
#[derive(Debug, Default)]
pub struct NullScheduler;

impl Scheduler for NullScheduler {
    fn schedule(&mut self, device: Unsigned6Bit, at: u64) {
        event!(
            Level::DEBUG,
            "ignoring event for device {:02o} at {}",
            device,
            at
        );
    }

    fn cancel(&mut self, _device: Unsigned6Bit) {}

    fn next_event(&self) -> Option<u64> {
        None
    }

    fn service(
        &mut self,
        _now: u64,
        _devices: &mut DeviceTable,
        _requests: &mut InterruptRequests,
    ) -> Result<(), u32> {
        Ok(())
    }
}

/// Stop reason reported when an event is due for a device number
/// that has no device.
pub const NO_SUCH_DEVICE: u32 = 1;

/// Keeps one pending wake-up per device, earliest first.
#[derive(Debug)]
pub struct VirtualTimeScheduler {
    queue: KeyedPriorityQueue<Unsigned6Bit, Reverse<u64>>,
}

impl VirtualTimeScheduler {
    pub fn new() -> VirtualTimeScheduler {
        VirtualTimeScheduler {
            queue: KeyedPriorityQueue::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn pop_due(&mut self, now: u64) -> Option<(Unsigned6Bit, u64)> {
        if self.next_event()? > now {
            return None;
        }
        self.queue.pop().map(|(device, Reverse(at))| (device, at))
    }
}

impl Default for VirtualTimeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualTimeScheduler {
    fn schedule(&mut self, device: Unsigned6Bit, at: u64) {
        if let Some(Reverse(prev)) = self.queue.push(device, Reverse(at)) {
            if prev < at {
                event!(
                    Level::WARN,
                    "device {:02o} event pushed back from {} to {}",
                    device,
                    prev,
                    at
                );
            }
        }
    }

    fn cancel(&mut self, device: Unsigned6Bit) {
        self.queue.remove(&device);
    }

    fn next_event(&self) -> Option<u64> {
        self.queue.peek().map(|(_, Reverse(at))| *at)
    }

    fn service(
        &mut self,
        now: u64,
        devices: &mut DeviceTable,
        requests: &mut InterruptRequests,
    ) -> Result<(), u32> {
        while let Some((device, due)) = self.pop_due(now) {
            event!(
                Level::TRACE,
                "servicing device {:02o} (due at {}, now {})",
                device,
                due,
                now
            );
            let mut ctx = IoContext::new(requests, now);
            if !devices.service(device, &mut ctx) {
                event!(
                    Level::ERROR,
                    "event due for device {:02o}, which is not attached",
                    device
                );
                return Err(NO_SUCH_DEVICE);
            }
            if let Some(delay) = ctx.wake() {
                // A device asking for a zero delay would otherwise
                // be serviced forever within this call.
                self.schedule(device, now + delay.max(1));
            }
        }
        Ok(())
    }
}
