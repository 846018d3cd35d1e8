//! The extended arithmetic element.
//!
//! Every EAE instruction first performs the setup steps selected by
//! bits 4-8, then the operation in bits 9-11 with the step count in
//! bits 12-17:
//!
//! | Bit    | Setup step                                         |
//! | ------ | -------------------------------------------------- |
//! | 020000 | copy the AC sign to the link                       |
//! | 010000 | clear MQ                                           |
//! | 004000 | note a negative AC (signed operations)             |
//! | 002000 | OR AC into MQ; otherwise take \|AC\| if noted      |
//! | 001000 | clear AC, keeping the link                         |
//!
//! Signed arithmetic is one's complement, as in the rest of the
//! machine.
use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use crate::registers::{LINK, SIGN, WORD_MASK as DMASK};

const SETUP_LINK_FROM_SIGN: u32 = 0o020_000;
const SETUP_CLEAR_MQ: u32 = 0o010_000;
const SETUP_SIGNED: u32 = 0o004_000;
const SETUP_OR_AC_INTO_MQ: u32 = 0o002_000;
const SETUP_CLEAR_AC: u32 = 0o001_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Eae {
    pub mq: u32,
    /// Step counter, 6 bits.
    pub sc: u32,
}

fn link_of(lac: u32) -> u32 {
    (lac >> 18) & 1
}

impl Eae {
    pub fn reset(&mut self) {
        *self = Eae::default();
    }

    /// Executes an EAE instruction.  `lac` is the link and AC.  The
    /// multiply and divide operations take their operand from the
    /// word after the instruction, which `fetch_operand` supplies.
    pub fn execute<E, F>(&mut self, ir: u32, lac: &mut u32, fetch_operand: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<u32, E>,
    {
        let mut ac_sign = false;
        if ir & SETUP_LINK_FROM_SIGN != 0 {
            *lac = (*lac & DMASK) | if *lac & SIGN != 0 { LINK } else { 0 };
        }
        if ir & SETUP_CLEAR_MQ != 0 {
            self.mq = 0;
        }
        if ir & SETUP_SIGNED != 0 && *lac & SIGN != 0 {
            ac_sign = true;
        }
        if ir & SETUP_OR_AC_INTO_MQ != 0 {
            self.mq |= *lac & DMASK;
        } else if ac_sign {
            *lac ^= DMASK;
        }
        if ir & SETUP_CLEAR_AC != 0 {
            *lac &= LINK;
        }
        let link_init = link_of(*lac);
        let steps = ir & 0o77;

        match (ir >> 6) & 7 {
            0 => {
                if ir & 0o4 != 0 {
                    self.mq ^= DMASK;
                }
                if ir & 0o2 != 0 {
                    *lac |= self.mq;
                }
                if ir & 0o1 != 0 {
                    *lac |= self.sc.wrapping_neg() & 0o77;
                }
            }
            1 => {
                let operand = fetch_operand()?;
                self.multiply(ir, lac, operand, steps, ac_sign);
            }
            3 => {
                let operand = fetch_operand()?;
                self.divide(ir, lac, operand, steps, ac_sign);
            }
            4 => self.normalize(lac, steps, link_init),
            5 => {
                let fill = u64::from(link_init) << 35;
                let mut pair = self.pair(*lac).bits();
                for _ in 0..steps {
                    pair = (pair >> 1) | fill;
                }
                self.set_pair(lac, Unsigned36Bit::truncate(pair));
                self.sc = 0;
            }
            6 => {
                for _ in 0..steps {
                    self.shift_pair_left(lac, link_init);
                }
                self.sc = 0;
            }
            7 => {
                for _ in 0..steps {
                    *lac = (*lac & LINK) | (((*lac << 1) | link_init) & DMASK);
                }
                self.sc = 0;
            }
            _ => {
                event!(Level::TRACE, "EAE operation 2 does nothing beyond setup");
            }
        }
        Ok(())
    }

    /// AC:MQ as one double word, AC being the more significant half.
    fn pair(&self, lac: u32) -> Unsigned36Bit {
        join_halves(
            Unsigned18Bit::truncate(lac & DMASK),
            Unsigned18Bit::truncate(self.mq),
        )
    }

    fn set_pair(&mut self, lac: &mut u32, pair: Unsigned36Bit) {
        let (ac, mq) = split_halves(pair);
        *lac = (*lac & LINK) | u32::from(ac);
        self.mq = u32::from(mq);
    }

    fn shift_pair_left(&mut self, lac: &mut u32, fill: u32) {
        let pair = (self.pair(*lac).bits() << 1) | u64::from(fill);
        self.set_pair(lac, Unsigned36Bit::truncate(pair));
    }

    fn multiply(&mut self, ir: u32, lac: &mut u32, operand: u32, steps: u32, ac_sign: bool) {
        let mut mb = operand & DMASK;
        let mut mb_neg = false;
        if ac_sign {
            self.mq ^= DMASK;
        }
        if ir & SETUP_SIGNED != 0 && mb & SIGN != 0 {
            mb ^= DMASK;
            mb_neg = true;
        }
        // The product is added into AC:MQ, so whatever setup left in
        // AC ends up shifted down into MQ.
        let mut acc = u64::from(*lac & DMASK);
        let mut mq = u64::from(self.mq);
        for _ in 0..steps {
            if mq & 1 != 0 {
                acc += u64::from(mb);
            }
            mq = (mq >> 1) | ((acc & 1) << 17);
            acc >>= 1;
        }
        let (mut ac, mut mq) = ((acc as u32) & DMASK, (mq as u32) & DMASK);
        if ac_sign != mb_neg {
            ac ^= DMASK;
            mq ^= DMASK;
        }
        *lac = (*lac & LINK) | ac;
        self.mq = mq;
        self.sc = 0;
    }

    fn divide(&mut self, ir: u32, lac: &mut u32, operand: u32, steps: u32, ac_sign: bool) {
        let mut mb = operand & DMASK;
        let mut mb_neg = false;
        if ac_sign {
            self.mq ^= DMASK;
        }
        if ir & SETUP_SIGNED != 0 && mb & SIGN != 0 {
            mb ^= DMASK;
            mb_neg = true;
        }
        let ac = *lac & DMASK;
        if ac >= mb {
            // The quotient would not fit (this includes division by
            // zero).  Only the link reports it.
            event!(Level::DEBUG, "EAE divide overflow: {:06o} / {:06o}", ac, mb);
            *lac |= LINK;
            return;
        }
        let mut rem = u64::from(ac);
        let mut mq = self.mq;
        for _ in 0..steps.saturating_sub(1) {
            rem = (rem << 1) | u64::from((mq >> 17) & 1);
            mq = (mq << 1) & DMASK;
            if rem >= u64::from(mb) {
                rem -= u64::from(mb);
                mq |= 1;
            }
        }
        let mut rem = (rem as u32) & DMASK;
        if ac_sign != mb_neg {
            mq ^= DMASK;
        }
        if ac_sign {
            rem ^= DMASK;
        }
        *lac = rem;
        self.mq = mq;
        self.sc = 0;
    }

    fn normalize(&mut self, lac: &mut u32, steps: u32, fill: u32) {
        let mut shifts = 0;
        while shifts < steps {
            let ac = *lac & DMASK;
            if ((ac >> 17) ^ (ac >> 16)) & 1 != 0 {
                break;
            }
            self.shift_pair_left(lac, fill);
            shifts += 1;
        }
        self.sc = (steps - shifts) & 0o77;
    }
}
