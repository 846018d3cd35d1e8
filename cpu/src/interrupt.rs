//! Program interrupt (PI) and automatic priority interrupt (API).
//!
//! Devices assert request lines: 32 lines on each of the four
//! hardware API levels (0-3) and 32 on the single PI level.  Levels
//! 4-7 are software levels, requested through ISA and CAL.
//!
//! Arbitration is a pure function of the request lines and the
//! [`InterruptState`]; it may be evaluated any number of times per
//! instruction.  Granting an interrupt is a separate step
//! ([`InterruptState::acknowledge`]).
//!
//! The order of preference is: hardware levels 0-3, then PI, then
//! software levels 4-7.  An API level is only granted when it is of
//! higher priority (numerically lower) than every active level.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use crate::config::ConfigurationError;
use crate::stop::StopReason;
use crate::variant::Variant;

pub const LINES_PER_LEVEL: u8 = 32;
pub const HARDWARE_API_LEVELS: u8 = 4;
pub const API_LEVELS: u8 = 8;

/// Software level 4 vectors through 40, level 5 through 41 and so on.
pub const SOFTWARE_LEVEL_VECTOR_BASE: u32 = 0o40;

/// Where a device's request lines are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RequestLevel {
    /// Hardware API level 0-3.
    Api(u8),
    Pi,
}

impl RequestLevel {
    /// Where this level's lines are kept; `None` for a level which
    /// does not exist.
    fn index(self) -> Option<usize> {
        match self {
            RequestLevel::Api(n) if n < HARDWARE_API_LEVELS => Some(usize::from(n)),
            RequestLevel::Api(_) => None,
            RequestLevel::Pi => Some(usize::from(HARDWARE_API_LEVELS)),
        }
    }
}

impl Display for RequestLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            RequestLevel::Api(n) => write!(f, "API{n}"),
            RequestLevel::Pi => f.write_str("PI"),
        }
    }
}

/// The request lines of all devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterruptRequests {
    lines: [u32; 5],
}

impl InterruptRequests {
    fn locate(level: RequestLevel, line: u8) -> Option<(usize, u32)> {
        match level.index() {
            Some(i) if line < LINES_PER_LEVEL => Some((i, 1 << line)),
            _ => None,
        }
    }

    /// Asserts a request line.  Requests on lines which do not exist
    /// are ignored.
    pub fn set(&mut self, level: RequestLevel, line: u8) {
        match InterruptRequests::locate(level, line) {
            Some((i, bit)) => self.lines[i] |= bit,
            None => {
                event!(Level::WARN, "ignoring request on nonexistent line {} of {}", line, level);
            }
        }
    }

    pub fn clear(&mut self, level: RequestLevel, line: u8) {
        match InterruptRequests::locate(level, line) {
            Some((i, bit)) => self.lines[i] &= !bit,
            None => {
                event!(Level::WARN, "ignoring clear of nonexistent line {} of {}", line, level);
            }
        }
    }

    /// Sets or clears a line according to `on`.
    pub fn assign(&mut self, level: RequestLevel, line: u8, on: bool) {
        if on {
            self.set(level, line);
        } else {
            self.clear(level, line);
        }
    }

    pub fn test(&self, level: RequestLevel, line: u8) -> bool {
        InterruptRequests::locate(level, line).is_some_and(|(i, bit)| self.lines[i] & bit != 0)
    }

    pub fn any(&self, level: RequestLevel) -> bool {
        level.index().is_some_and(|i| self.lines[i] != 0)
    }

    /// The asserted line which wins within a level: lines are
    /// scanned from 31 down to 0.
    pub fn winning_line(&self, level: RequestLevel) -> Option<u8> {
        match self.lines[level.index()?] {
            0 => None,
            bits => Some((31 - bits.leading_zeros()) as u8),
        }
    }

    pub fn clear_all(&mut self) {
        self.lines = [0; 5];
    }
}

/// API vector addresses of the hardware request lines, assigned when
/// the device table is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorTable {
    vectors: [[Option<Address>; LINES_PER_LEVEL as usize]; HARDWARE_API_LEVELS as usize],
}

impl Default for VectorTable {
    fn default() -> VectorTable {
        VectorTable {
            vectors: [[None; LINES_PER_LEVEL as usize]; HARDWARE_API_LEVELS as usize],
        }
    }
}

impl VectorTable {
    pub fn assign(&mut self, level: u8, line: u8, vector: Address) -> Result<(), ConfigurationError> {
        if level >= HARDWARE_API_LEVELS || line >= LINES_PER_LEVEL {
            return Err(ConfigurationError::ApiLineRange { level, line });
        }
        let slot = &mut self.vectors[usize::from(level)][usize::from(line)];
        if slot.is_some() {
            return Err(ConfigurationError::ApiLineConflict { level, line });
        }
        *slot = Some(vector);
        Ok(())
    }

    pub fn get(&self, level: u8, line: u8) -> Option<Address> {
        self.vectors
            .get(usize::from(level))
            .and_then(|lines| lines.get(usize::from(line)))
            .copied()
            .flatten()
    }
}

/// The outcome of arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grant {
    /// A program interrupt: the return word goes to location 0 and
    /// execution continues at 1.
    Pi,
    /// An API break: the instruction at `vector` is executed.
    Api { level: u8, vector: Address },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterruptState {
    variant: Variant,
    api_installed: bool,
    /// PI enabled.
    pub ion: bool,
    pub api_enable: bool,
    /// Bit n set while level n is being serviced.
    pub api_active: u8,
    /// Software requests; bit n requests level n (4-7 only).
    pub api_request: u8,
    /// Suppress arbitration until the next fetch.
    deferred: bool,
}

impl InterruptState {
    pub fn new(variant: Variant, api_installed: bool) -> InterruptState {
        InterruptState {
            variant,
            api_installed: api_installed && variant.can_have_api(),
            ion: false,
            api_enable: false,
            api_active: 0,
            api_request: 0,
            deferred: false,
        }
    }

    pub fn api_installed(&self) -> bool {
        self.api_installed
    }

    pub fn reset(&mut self) {
        self.ion = false;
        self.api_enable = false;
        self.api_active = 0;
        self.api_request = 0;
        self.deferred = false;
    }

    /// No interrupt will be granted before the next instruction has
    /// been fetched.
    pub fn defer(&mut self) {
        self.deferred = true;
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn clear_deferral(&mut self) {
        self.deferred = false;
    }

    /// The numerically lowest active level, if any.
    pub fn highest_active_level(&self) -> Option<u8> {
        match self.api_active {
            0 => None,
            bits => Some(bits.trailing_zeros() as u8),
        }
    }

    /// Pending API levels (bit n for level n) and whether PI is
    /// pending.
    fn pending(&self, requests: &InterruptRequests) -> (u8, bool) {
        let api_on = self.api_installed && self.api_enable;
        let mut levels: u8 = 0;
        if api_on {
            for level in 0..HARDWARE_API_LEVELS {
                if requests.any(RequestLevel::Api(level)) {
                    levels |= 1 << level;
                }
            }
            levels |= self.api_request & 0xF0;
        }
        let pi = self.ion
            && requests.any(RequestLevel::Pi)
            && match self.variant {
                Variant::Pdp15 => self.api_active == 0,
                Variant::Pdp9 => self.api_active & 0x0F == 0,
                Variant::Pdp4 | Variant::Pdp7 => true,
            };
        if pi && self.variant == Variant::Pdp9 {
            // On the PDP-9 a pending program interrupt holds off the
            // software levels.
            levels &= 0x0F;
        }
        (levels, pi)
    }

    /// Decides which interrupt, if any, should be taken now.  This
    /// changes nothing; calling it twice gives the same answer.
    pub fn arbitrate(
        &self,
        requests: &InterruptRequests,
        vectors: &VectorTable,
    ) -> Result<Option<Grant>, StopReason> {
        let (levels, pi) = self.pending(requests);
        let threshold = self.highest_active_level().unwrap_or(API_LEVELS);
        let eligible = |level: u8| level < threshold && levels & (1 << level) != 0;

        for level in 0..HARDWARE_API_LEVELS {
            if eligible(level) {
                let line = requests
                    .winning_line(RequestLevel::Api(level))
                    .ok_or(StopReason::BadApiVector { level })?;
                return match vectors.get(level, line) {
                    Some(vector) => Ok(Some(Grant::Api { level, vector })),
                    None => Err(StopReason::BadApiVector { level }),
                };
            }
        }
        if pi {
            return Ok(Some(Grant::Pi));
        }
        for level in HARDWARE_API_LEVELS..API_LEVELS {
            if eligible(level) {
                let vector = Address::truncate(
                    SOFTWARE_LEVEL_VECTOR_BASE + u32::from(level - HARDWARE_API_LEVELS),
                );
                return Ok(Some(Grant::Api { level, vector }));
            }
        }
        Ok(None)
    }

    /// True if arbitration would grant something now (ignoring any
    /// deferral).  A bad vector counts as deliverable, since taking
    /// it stops the machine.
    pub fn deliverable(&self, requests: &InterruptRequests, vectors: &VectorTable) -> bool {
        !matches!(self.arbitrate(requests, vectors), Ok(None))
    }

    /// Marks a grant as taken.
    pub fn acknowledge(&mut self, grant: Grant) {
        match grant {
            Grant::Pi => {
                self.ion = false;
            }
            Grant::Api { level, .. } => {
                self.api_active |= 1 << level;
                self.api_request &= !(1 << level);
            }
        }
        event!(Level::DEBUG, "interrupt granted: {:?}", grant);
    }

    /// Ends service of the highest active level (DBK, DBR).
    pub fn dismiss_highest(&mut self) {
        if let Some(level) = self.highest_active_level() {
            self.api_active &= !(1 << level);
            event!(Level::TRACE, "API level {} dismissed", level);
        }
    }

    /// The word read by RPL: active levels in bits 1-8 (level 0 in
    /// bit 1), pending requests in bits 10-17 (level 0 in bit 10).
    pub fn read_priority_levels(&self, requests: &InterruptRequests) -> u32 {
        let mut word = 0;
        for level in 0..API_LEVELS {
            if self.api_active & (1 << level) != 0 {
                word |= 0o400_000 >> level;
            }
            let requested = if level < HARDWARE_API_LEVELS {
                requests.any(RequestLevel::Api(level))
            } else {
                self.api_request & (1 << level) != 0
            };
            if requested {
                word |= 0o200 >> level;
            }
        }
        word
    }

    /// ISA.  AC bit 1 enables API, bit 2 disables it; bits 10-13 make
    /// software levels 4-7 active and bits 14-17 request them.
    pub fn initiate_software_activity(&mut self, ac: u32) {
        if ac & 0o200_000 != 0 {
            self.api_enable = true;
        }
        if ac & 0o100_000 != 0 {
            self.api_enable = false;
        }
        for n in 0..4u8 {
            let level = HARDWARE_API_LEVELS + n;
            if ac & (0o10 >> n) != 0 {
                self.api_request |= 1 << level;
            }
            if ac & (0o200 >> n) != 0 {
                self.api_active |= 1 << level;
            }
        }
    }

    /// CAL under API makes level 4 active directly.
    pub fn activate_level(&mut self, level: u8) {
        if level < API_LEVELS {
            self.api_active |= 1 << level;
        }
    }
}
