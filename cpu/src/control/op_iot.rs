//! ## IOT instructions
//!
//! Bits 6-11 select a device and bits 12-17 are the pulse.  If bit
//! 14 (octal 10) is set, AC is cleared before the transfer.  A few
//! device numbers are decoded by the processor itself:
//!
//! | Device | IOTs                                             |
//! | ------ | ------------------------------------------------ |
//! | 00     | IOF 700002, ION 700042                           |
//! | 03     | IORS 700314                                      |
//! | 17     | memory protection (MPSK, MPSNE, MPCV, ...)       |
//! | 33     | CAF 703302, DBK 703304, DBR 703344               |
//! | 55     | SPI 705501, RPL 705502, ISA 705504               |
//! | 77     | EEM 707724, LEM 707704, EMIR/RES 707742, SEM 707701 |
//!
//! Every IOT holds off interrupts until after the next instruction.
//! IOTs are privileged in user mode.
use tracing::{event, Level};

use base::prelude::*;

use super::{
    Aborted, Bus, ControlUnit, DEV_ADDRESSING, DEV_API, DEV_CLEAR_FLAGS, DEV_PI, DEV_PROTECTION,
    DEV_STATUS,
};
use crate::config::Protection;
use crate::io::{IoContext, IotResponse};
use crate::mmu::PROTECTION_GRANULE_MASK;
use crate::registers::{SIGN, WORD_MASK};
use crate::stop::StopReason;
use crate::variant::Variant;

/// The outcome of an IOT decoded by the processor.
enum Internal {
    /// Not a processor IOT; pass it to the device table.
    NotMine,
    Done { ac: u32, skip: bool },
}

impl ControlUnit {
    pub(crate) fn op_iot(&mut self, inst: Instruction, bus: &mut Bus<'_>) -> Result<(), Aborted> {
        self.privileged()?;
        self.interrupts.defer();
        let device = inst.device();
        let pulse = inst.pulse();
        let ac = if inst.clears_ac() { 0 } else { self.regs.ac() };

        let (ac, skip) = match self.internal_iot(device, pulse, ac, bus) {
            Internal::Done { ac, skip } => (ac, skip),
            Internal::NotMine => {
                let mut ctx = IoContext::new(&mut self.requests, self.now);
                let Some(result) = bus.devices.transfer(device, pulse, ac, &mut ctx) else {
                    return self.unimplemented(inst);
                };
                if let Some(delay) = ctx.wake() {
                    bus.scheduler.schedule(device, self.now + delay);
                }
                match result.decode() {
                    IotResponse::Transfer { ac, skip } => (ac, skip),
                    IotResponse::Stop { reason } => {
                        event!(
                            Level::WARN,
                            "device {:02o} stopped the machine (reason {})",
                            device,
                            reason
                        );
                        return Err(Aborted::Stop(StopReason::IoStop { device, reason }));
                    }
                }
            }
        };
        self.regs.set_ac(ac);
        if skip {
            self.skip();
        }
        Ok(())
    }

    fn internal_iot(
        &mut self,
        device: Unsigned6Bit,
        pulse: u8,
        ac: u32,
        bus: &mut Bus<'_>,
    ) -> Internal {
        let variant = self.config.variant;
        let done = |ac: u32, skip: bool| Internal::Done { ac, skip };
        match u8::from(device) {
            DEV_PI => match pulse {
                0o02 => {
                    self.interrupts.ion = false;
                    done(ac, false)
                }
                0o42 => {
                    self.interrupts.ion = true;
                    done(ac, false)
                }
                _ => done(ac, false),
            },
            DEV_STATUS => {
                let mut status = bus.devices.status_poll(&self.requests);
                if self.interrupts.ion {
                    status |= SIGN;
                }
                done(ac | status, false)
            }
            DEV_PROTECTION if self.mm.protection() != Protection::None => {
                self.protection_iot(pulse, ac)
            }
            DEV_CLEAR_FLAGS => match pulse {
                0o02 => {
                    event!(Level::DEBUG, "CAF");
                    bus.devices.reset_all(&mut self.requests);
                    self.requests.clear_all();
                    self.interrupts.reset();
                    self.interrupts.defer();
                    done(ac, false)
                }
                0o04 => {
                    self.interrupts.dismiss_highest();
                    done(ac, false)
                }
                0o44 => {
                    self.interrupts.dismiss_highest();
                    self.mm.rest_pending = true;
                    done(ac, false)
                }
                _ => done(ac, false),
            },
            DEV_API if self.interrupts.api_installed() => match pulse {
                0o01 => done(ac, self.interrupts.api_active == 0),
                0o02 => done(ac | self.interrupts.read_priority_levels(&self.requests), false),
                0o04 => {
                    self.interrupts.initiate_software_activity(ac);
                    done(ac, false)
                }
                _ => done(ac, false),
            },
            DEV_ADDRESSING if variant.has_extend_mode() => match pulse {
                0o24 => {
                    self.mm.defer_extend_mode(true);
                    done(ac, false)
                }
                0o04 => {
                    self.mm.defer_extend_mode(false);
                    done(ac, false)
                }
                0o42 => {
                    if variant == Variant::Pdp7 {
                        self.mm.defer_extend_mode(true);
                        self.mm.emir_pending = true;
                    } else {
                        self.mm.rest_pending = true;
                    }
                    done(ac, false)
                }
                0o01 => done(ac, self.mm.memm),
                _ => done(ac, false),
            },
            _ => Internal::NotMine,
        }
    }

    fn protection_iot(&mut self, pulse: u8, ac: u32) -> Internal {
        let done = |ac: u32, skip: bool| Internal::Done { ac, skip };
        let xvm = self.mm.protection() == Protection::Xvm;
        match pulse {
            0o01 => done(ac, self.mm.prvn),
            0o41 => done(ac, self.mm.nexm),
            0o02 => {
                self.mm.prvn = false;
                done(ac, false)
            }
            0o44 => {
                self.mm.nexm = false;
                done(ac, false)
            }
            0o42 => {
                event!(Level::DEBUG, "entering user mode");
                self.mm.defer_user_mode(true);
                done(ac, false)
            }
            0o04 => {
                self.mm.bounds = ac & PROTECTION_GRANULE_MASK;
                done(ac, false)
            }
            0o62 => {
                self.mm.relocation = ac & PROTECTION_GRANULE_MASK;
                done(ac, false)
            }
            0o22 if xvm => {
                self.mm.mmr = ac & WORD_MASK;
                done(ac, false)
            }
            0o64 if xvm => {
                self.mm.slr = ac & WORD_MASK;
                done(ac, false)
            }
            _ => done(ac, false),
        }
    }
}
