//! Dispatch of IOT instructions to device simulators.
//!
//! The device field of an IOT (bits 6-11) selects one of 64 device
//! numbers.  A few numbers belong to the processor itself (PI, API,
//! memory management, addressing mode); the rest are assigned to
//! devices when the [`DeviceTable`] is built, and cannot change
//! afterwards.
//!
//! ## IOT result word
//!
//! A device answers an IOT with a word laid out like this:
//!
//! | Stop reason | Skip  | Data (new AC) |
//! | ----------- | ----- | ------------- |
//! | bits 19-31  | 18    | 0-17          |
//!
//! A non-zero stop reason stops the machine with
//! [`crate::StopReason::IoStop`]; the data and skip bits are then
//! ignored.
use std::fmt::{self, Debug, Formatter};

use tracing::{event, Level};

use base::prelude::*;

use crate::config::ConfigurationError;
use crate::interrupt::{InterruptRequests, VectorTable};

pub const IOT_DATA_MASK: u32 = 0o777_777;
pub const IOT_SKIP: u32 = 0o1_000_000;
const IOT_STOP_SHIFT: u32 = 19;

pub const DEVICE_SLOTS: usize = 64;

/// The answer of a device to an IOT.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IotResult(u32);

/// An [`IotResult`], unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IotResponse {
    Transfer { ac: u32, skip: bool },
    Stop { reason: u32 },
}

impl IotResult {
    /// Leave `ac` in the accumulator, don't skip.
    pub const fn data(ac: u32) -> IotResult {
        IotResult(ac & IOT_DATA_MASK)
    }

    /// Also skip the next instruction.
    #[must_use]
    pub const fn and_skip(self) -> IotResult {
        IotResult(self.0 | IOT_SKIP)
    }

    /// Skip if `condition` holds.
    #[must_use]
    pub const fn skip_if(self, condition: bool) -> IotResult {
        if condition {
            self.and_skip()
        } else {
            self
        }
    }

    /// Stop the machine.  `reason` must be non-zero.
    pub const fn stop(reason: u32) -> IotResult {
        IotResult(reason << IOT_STOP_SHIFT)
    }

    pub const fn from_bits(bits: u32) -> IotResult {
        IotResult(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn decode(self) -> IotResponse {
        match self.0 >> IOT_STOP_SHIFT {
            0 => IotResponse::Transfer {
                ac: self.0 & IOT_DATA_MASK,
                skip: self.0 & IOT_SKIP != 0,
            },
            reason => IotResponse::Stop { reason },
        }
    }
}

impl Debug for IotResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "IotResult({:o})", self.0)
    }
}

/// What a device can reach while handling an IOT or a scheduled
/// event.  Devices may only touch their own request lines.
pub struct IoContext<'a> {
    pub requests: &'a mut InterruptRequests,
    /// Current virtual time, in instructions.
    pub now: u64,
    wake: Option<u64>,
}

impl<'a> IoContext<'a> {
    pub fn new(requests: &'a mut InterruptRequests, now: u64) -> IoContext<'a> {
        IoContext {
            requests,
            now,
            wake: None,
        }
    }

    /// Asks for [`Device::service`] to be called `delay` instructions
    /// from now.
    pub fn wake_after(&mut self, delay: u64) {
        self.wake = Some(delay);
    }

    pub fn wake(&self) -> Option<u64> {
        self.wake
    }
}

/// A device simulator.
pub trait Device {
    fn name(&self) -> String;

    /// Performs an IOT.  `device` is the device number from the
    /// instruction (for devices occupying several numbers), `pulse`
    /// its low six bits and `ac` the accumulator (already cleared if
    /// the instruction asked for that).
    fn io_transfer(
        &mut self,
        device: Unsigned6Bit,
        pulse: u8,
        ac: u32,
        ctx: &mut IoContext<'_>,
    ) -> IotResult;

    /// Bits this device contributes to the IORS status word.
    fn status(&self, _requests: &InterruptRequests) -> u32 {
        0
    }

    /// CAF or a machine reset.
    fn reset(&mut self, _requests: &mut InterruptRequests) {}

    /// A wake-up asked for through [`IoContext::wake_after`] is due.
    fn service(&mut self, _ctx: &mut IoContext<'_>) {}
}

/// An API line owned by a device, and where it vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiAssignment {
    pub level: u8,
    pub line: u8,
    pub vector: Address,
}

pub struct DeviceRegistration {
    pub base: Unsigned6Bit,
    /// The number of consecutive device numbers the device answers.
    pub slots: u8,
    pub api: Vec<ApiAssignment>,
    pub device: Box<dyn Device>,
}

impl DeviceRegistration {
    pub fn new(base: Unsigned6Bit, slots: u8, device: Box<dyn Device>) -> DeviceRegistration {
        DeviceRegistration {
            base,
            slots,
            api: Vec::new(),
            device,
        }
    }

    #[must_use]
    pub fn with_api_line(mut self, level: u8, line: u8, vector: Address) -> DeviceRegistration {
        self.api.push(ApiAssignment {
            level,
            line,
            vector,
        });
        self
    }
}

impl Debug for DeviceRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistration")
            .field("base", &self.base)
            .field("slots", &self.slots)
            .field("api", &self.api)
            .field("device", &format_args!("<device: {}>", self.device.name()))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotOwner {
    Processor(&'static str),
    Device(usize),
}

struct AttachedDevice {
    base: u8,
    inner: Box<dyn Device>,
}

impl Debug for AttachedDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedDevice")
            .field("base", &format_args!("{:02o}", self.base))
            .field("inner", &format_args!("<device: {}>", self.inner.name()))
            .finish()
    }
}

/// The device number to device map.
#[derive(Debug)]
pub struct DeviceTable {
    slots: [Option<SlotOwner>; DEVICE_SLOTS],
    devices: Vec<AttachedDevice>,
}

impl DeviceTable {
    /// Builds the table.  `reserved` lists the device numbers the
    /// processor handles itself.  API assignments of the
    /// registrations go into `vectors`.
    pub(crate) fn build(
        registrations: Vec<DeviceRegistration>,
        reserved: &[(u8, &'static str)],
        vectors: &mut VectorTable,
    ) -> Result<DeviceTable, ConfigurationError> {
        let mut slots: [Option<SlotOwner>; DEVICE_SLOTS] = [None; DEVICE_SLOTS];
        let mut devices: Vec<AttachedDevice> = Vec::with_capacity(registrations.len());
        let mut names: Vec<String> = Vec::with_capacity(registrations.len());

        for &(number, name) in reserved {
            slots[usize::from(number) % DEVICE_SLOTS] = Some(SlotOwner::Processor(name));
        }
        for reg in registrations {
            let base = u8::from(reg.base);
            let end = usize::from(base) + usize::from(reg.slots);
            if reg.slots == 0 || end > DEVICE_SLOTS {
                return Err(ConfigurationError::DeviceRange {
                    base: reg.base,
                    slots: reg.slots,
                });
            }
            let index = devices.len();
            let name = reg.device.name();
            for number in usize::from(base)..end {
                match slots[number] {
                    None => {
                        slots[number] = Some(SlotOwner::Device(index));
                    }
                    Some(owner) => {
                        let first = match owner {
                            SlotOwner::Processor(what) => what.to_string(),
                            SlotOwner::Device(i) => names[i].clone(),
                        };
                        return Err(ConfigurationError::DeviceConflict {
                            device: Unsigned6Bit::truncate(number as u8),
                            first,
                            second: name,
                        });
                    }
                }
            }
            for api in &reg.api {
                vectors.assign(api.level, api.line, api.vector)?;
            }
            event!(
                Level::DEBUG,
                "device {} attached at {:02o} ({} slots)",
                name,
                base,
                reg.slots
            );
            names.push(name);
            devices.push(AttachedDevice {
                base,
                inner: reg.device,
            });
        }
        Ok(DeviceTable { slots, devices })
    }

    fn device_index(&self, device: Unsigned6Bit) -> Option<usize> {
        match self.slots[usize::from(device) % DEVICE_SLOTS] {
            Some(SlotOwner::Device(i)) => Some(i),
            _ => None,
        }
    }

    pub fn name_of(&self, device: Unsigned6Bit) -> Option<String> {
        match self.slots[usize::from(device) % DEVICE_SLOTS]? {
            SlotOwner::Processor(what) => Some(what.to_string()),
            SlotOwner::Device(i) => Some(self.devices[i].inner.name()),
        }
    }

    /// Performs an IOT.  Returns `None` if no device has the number.
    pub fn transfer(
        &mut self,
        device: Unsigned6Bit,
        pulse: u8,
        ac: u32,
        ctx: &mut IoContext<'_>,
    ) -> Option<IotResult> {
        let index = self.device_index(device)?;
        let attached = &mut self.devices[index];
        let result = attached.inner.io_transfer(device, pulse, ac & IOT_DATA_MASK, ctx);
        event!(
            Level::TRACE,
            "IOT {:02o}{:02o} -> {:?}",
            u8::from(device),
            pulse,
            result
        );
        Some(result)
    }

    /// The OR of all devices' status words.
    pub fn status_poll(&self, requests: &InterruptRequests) -> u32 {
        self.devices
            .iter()
            .fold(0, |acc, d| acc | d.inner.status(requests))
            & IOT_DATA_MASK
    }

    pub fn reset_all(&mut self, requests: &mut InterruptRequests) {
        for d in self.devices.iter_mut() {
            d.inner.reset(requests);
        }
    }

    /// Runs the scheduled event of `device`.  Returns false if there
    /// is no such device.
    pub fn service(&mut self, device: Unsigned6Bit, ctx: &mut IoContext<'_>) -> bool {
        match self.device_index(device) {
            Some(index) => {
                self.devices[index].inner.service(ctx);
                true
            }
            None => false,
        }
    }
}
