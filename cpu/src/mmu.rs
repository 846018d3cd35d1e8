//! Address translation and memory protection.
//!
//! Executive-mode references pass straight through (masked to the
//! implemented address width).  User-mode references go through
//! exactly one of the installed protection schemes:
//!
//! | Scheme     | Violation when                       | Physical address          |
//! | ---------- | ------------------------------------ | ------------------------- |
//! | bounds     | address < BR                         | address                   |
//! | relocation | address > BR+377                     | (RR + address) & 377777   |
//! | XVM        | as relocation, outside the window    | bypass, window or reloc.  |
//!
//! Every scheme (and executive mode) also checks the result against
//! the installed memory size.  Faults only set the sticky flags and
//! `trap_pending`; the instruction engine decides what to do with
//! them.
//!
//! This module also holds the addressing mode (extend/bank mode) and
//! user mode flags, whose changes are deferred by one instruction.

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use crate::config::Protection;
use crate::variant::Variant;

/// Bounds and relocation registers have 256-word granularity.
pub const PROTECTION_GRANULE_MASK: u32 = 0o377_400;

/// XVM control register: disable relocation entirely.
pub const MMR_RELOCATION_DISABLE: u32 = 0o004_000;
/// XVM control register: enable the shared window.
pub const MMR_SHARED: u32 = 0o010_000;
/// XVM control register: the shared window is read-only.
pub const MMR_WRITE_PROTECT: u32 = 0o020_000;
const MMR_WINDOW_SHIFT: u32 = 8;

/// Virtual base of the shared window, selected by MMR bits 8-9.
const SHARED_WINDOW_BASES: [u32; 4] = [0o060_000, 0o070_000, 0o100_000, 0o140_000];

/// Return-word bits holding the addressing and user modes.
pub const RETURN_WORD_EXTEND: u32 = 0o200_000;
pub const RETURN_WORD_USER: u32 = 0o100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessKind {
    Fetch,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FaultKind {
    NonExistentMemory,
    ProtectionViolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TranslationFault {
    pub kind: FaultKind,
    /// The fault set `trap_pending`.  Untrapped faults (non-existent
    /// memory in executive mode) only set the flag: reads see zero
    /// and writes are lost.
    pub trapped: bool,
}

/// A mode change waiting for its instruction of grace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deferred {
    value: bool,
    delay: u8,
}

impl Deferred {
    fn new(value: bool) -> Deferred {
        Deferred { value, delay: 1 }
    }

    /// Returns the new value once the change is due.
    fn tick(&mut self) -> Option<bool> {
        if self.delay == 0 {
            Some(self.value)
        } else {
            self.delay -= 1;
            None
        }
    }
}

#[derive(Debug)]
pub struct MemoryManagement {
    variant: Variant,
    protection: Protection,
    memory_size: u32,

    /// Extend mode (PDP-7/9) or bank mode (PDP-15).
    pub memm: bool,
    /// Value `memm` takes after a reset, interrupt or trap.
    pub memm_init: bool,
    /// User (protected) mode.
    pub usmd: bool,
    pending_memm: Option<Deferred>,
    pending_usmd: Option<Deferred>,

    pub bounds: u32,
    pub relocation: u32,
    /// XVM control register.
    pub mmr: u32,
    /// XVM shared-window register: length in bits 0-8, physical base
    /// in bits 9-17, both in 256-word units.
    pub slr: u32,

    pub nexm: bool,
    pub prvn: bool,
    pub trap_pending: bool,

    /// PDP-7: leave extend mode at the next JMP I if the pointer's
    /// extend bit is clear.
    pub emir_pending: bool,
    /// Restore link and modes from the pointer of the next JMP I.
    pub rest_pending: bool,
}

impl MemoryManagement {
    pub fn new(
        variant: Variant,
        protection: Protection,
        memory_size: u32,
        memm_init: bool,
    ) -> MemoryManagement {
        let memm_init = variant == Variant::Pdp15 && memm_init;
        MemoryManagement {
            variant,
            protection,
            memory_size,
            memm: memm_init,
            memm_init,
            usmd: false,
            pending_memm: None,
            pending_usmd: None,
            bounds: 0,
            relocation: 0,
            mmr: 0,
            slr: 0,
            nexm: false,
            prvn: false,
            trap_pending: false,
            emir_pending: false,
            rest_pending: false,
        }
    }

    pub fn reset(&mut self) {
        *self = MemoryManagement::new(
            self.variant,
            self.protection,
            self.memory_size,
            self.memm_init,
        );
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Translates a virtual address.  This is deterministic, and has
    /// no side effects other than setting the fault flags.
    pub fn translate(
        &mut self,
        va: Address,
        access: AccessKind,
    ) -> Result<Address, TranslationFault> {
        let ma = va.bits() & self.variant.address_mask();
        if !self.usmd {
            return self.check_exists(ma, false);
        }
        let pa = match self.protection {
            Protection::None => ma,
            Protection::Bounds => {
                if ma < self.bounds {
                    return Err(self.violation(ma));
                }
                ma
            }
            Protection::Relocation => self.relocate(ma)?,
            Protection::Xvm => {
                if self.mmr & MMR_RELOCATION_DISABLE != 0 {
                    ma
                } else if let Some(pa) = self.shared_window(ma, access)? {
                    pa
                } else {
                    self.relocate(ma)?
                }
            }
        };
        self.check_exists(pa, true)
    }

    fn relocate(&mut self, ma: u32) -> Result<u32, TranslationFault> {
        if ma > (self.bounds | 0o377) {
            Err(self.violation(ma))
        } else {
            Ok((self.relocation + ma) & Address::MASK)
        }
    }

    /// Returns `Ok(None)` when `ma` lies outside the shared window.
    fn shared_window(
        &mut self,
        ma: u32,
        access: AccessKind,
    ) -> Result<Option<u32>, TranslationFault> {
        if self.mmr & MMR_SHARED == 0 {
            return Ok(None);
        }
        let window_base = SHARED_WINDOW_BASES[((self.mmr >> MMR_WINDOW_SHIFT) & 3) as usize];
        let window_length = ((self.slr >> 9) & 0o777) << 8;
        if ma < window_base || ma >= window_base + window_length {
            return Ok(None);
        }
        if access == AccessKind::Write && self.mmr & MMR_WRITE_PROTECT != 0 {
            return Err(self.violation(ma));
        }
        let physical_base = (self.slr & 0o777) << 8;
        Ok(Some((physical_base + (ma - window_base)) & Address::MASK))
    }

    fn violation(&mut self, ma: u32) -> TranslationFault {
        event!(Level::DEBUG, "protection violation at {:06o}", ma);
        self.prvn = true;
        self.trap_pending = true;
        TranslationFault {
            kind: FaultKind::ProtectionViolation,
            trapped: true,
        }
    }

    fn check_exists(&mut self, pa: u32, user: bool) -> Result<Address, TranslationFault> {
        if pa < self.memory_size {
            return Ok(Address::truncate(pa));
        }
        self.nexm = true;
        let trapped = user && self.variant.saves_user_mode();
        if trapped {
            self.prvn = true;
            self.trap_pending = true;
        }
        event!(
            Level::DEBUG,
            "reference to non-existent memory at {:06o} (trapped: {})",
            pa,
            trapped
        );
        Err(TranslationFault {
            kind: FaultKind::NonExistentMemory,
            trapped,
        })
    }

    /// Requests a change of addressing mode, effective after the next
    /// instruction.
    pub fn defer_extend_mode(&mut self, on: bool) {
        self.pending_memm = Some(Deferred::new(on));
    }

    /// Requests a change of user mode, effective after the next
    /// instruction.
    pub fn defer_user_mode(&mut self, on: bool) {
        self.pending_usmd = Some(Deferred::new(on));
    }

    /// Called once per instruction cycle, before the fetch.
    pub fn advance_pending_modes(&mut self) {
        if let Some(mut d) = self.pending_memm {
            match d.tick() {
                Some(value) => {
                    self.memm = value;
                    self.pending_memm = None;
                }
                None => self.pending_memm = Some(d),
            }
        }
        if let Some(mut d) = self.pending_usmd {
            match d.tick() {
                Some(value) => {
                    event!(Level::DEBUG, "user mode now {}", value);
                    self.usmd = value;
                    self.pending_usmd = None;
                }
                None => self.pending_usmd = Some(d),
            }
        }
    }

    /// The mode bits of a return word.
    pub fn return_word_bits(&self) -> u32 {
        let mut bits = 0;
        if self.memm && self.variant.has_extend_mode() {
            bits |= RETURN_WORD_EXTEND;
        }
        if self.usmd && self.variant.saves_user_mode() {
            bits |= RETURN_WORD_USER;
        }
        bits
    }

    /// Interrupts and traps drop into executive mode with the
    /// power-on addressing mode.  Pending changes are abandoned.
    pub fn enter_executive(&mut self) {
        self.usmd = false;
        self.memm = self.memm_init;
        self.pending_memm = None;
        self.pending_usmd = None;
    }

    /// Applies only the extend mode bit of a return word, dropping
    /// any pending mode change (EMIR).
    pub fn restore_extend_mode(&mut self, word: u32) {
        self.memm = word & RETURN_WORD_EXTEND != 0;
        self.pending_memm = None;
    }

    /// Applies the modes saved in a return word, immediately.
    pub fn restore_from_return_word(&mut self, word: u32) {
        if self.variant.has_extend_mode() {
            self.memm = word & RETURN_WORD_EXTEND != 0;
        }
        if self.variant.saves_user_mode() && self.protection != Protection::None {
            self.usmd = word & RETURN_WORD_USER != 0;
        }
        self.pending_memm = None;
        self.pending_usmd = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(n: u32) -> Address {
        Address::truncate(n)
    }

    fn user_mmu(protection: Protection) -> MemoryManagement {
        let mut mm = MemoryManagement::new(Variant::Pdp15, protection, 0o100_000, true);
        mm.usmd = true;
        mm
    }

    #[test]
    fn test_executive_mode_passes_through() {
        let mut mm = MemoryManagement::new(Variant::Pdp15, Protection::Relocation, 0o100_000, true);
        mm.bounds = 0o1_000;
        mm.relocation = 0o40_000;
        assert_eq!(mm.translate(a(0o5_000), AccessKind::Read), Ok(a(0o5_000)));
        assert!(!mm.trap_pending);
    }

    #[test]
    fn test_bounds_boundary() {
        let mut mm = user_mmu(Protection::Bounds);
        mm.bounds = 0o4_000;
        assert_eq!(mm.translate(a(0o4_000), AccessKind::Write), Ok(a(0o4_000)));
        assert!(!mm.prvn);
        assert_eq!(
            mm.translate(a(0o3_777), AccessKind::Write),
            Err(TranslationFault {
                kind: FaultKind::ProtectionViolation,
                trapped: true
            })
        );
        assert!(mm.prvn);
        assert!(mm.trap_pending);
    }

    #[test]
    fn test_relocation_boundary() {
        let mut mm = user_mmu(Protection::Relocation);
        mm.bounds = 0o1_000;
        mm.relocation = 0o20_000;
        assert_eq!(mm.translate(a(0o1_377), AccessKind::Read), Ok(a(0o21_377)));
        assert!(!mm.trap_pending);
        assert!(mm.translate(a(0o1_400), AccessKind::Read).is_err());
        assert!(mm.prvn && mm.trap_pending);
    }

    #[test]
    fn test_relocation_beyond_installed_memory() {
        let mut mm = user_mmu(Protection::Relocation);
        mm.bounds = 0o77_400;
        mm.relocation = 0o70_000;
        let fault = mm.translate(a(0o10_000), AccessKind::Read);
        assert_eq!(
            fault,
            Err(TranslationFault {
                kind: FaultKind::NonExistentMemory,
                trapped: true
            })
        );
        assert!(mm.nexm && mm.prvn && mm.trap_pending);
    }

    #[test]
    fn test_executive_nxm_is_only_flagged() {
        let mut mm = MemoryManagement::new(Variant::Pdp9, Protection::Bounds, 0o20_000, false);
        let fault = mm.translate(a(0o20_000), AccessKind::Read);
        assert_eq!(
            fault,
            Err(TranslationFault {
                kind: FaultKind::NonExistentMemory,
                trapped: false
            })
        );
        assert!(mm.nexm);
        assert!(!mm.trap_pending);
    }

    #[test]
    fn test_xvm_shared_window() {
        let mut mm = user_mmu(Protection::Xvm);
        mm.bounds = 0o7_400;
        mm.relocation = 0o10_000;
        // Window at 070000, 01000 words long, mapped to 050000.
        mm.mmr = MMR_SHARED | (1 << MMR_WINDOW_SHIFT);
        mm.slr = (0o2 << 9) | (0o50_000 >> 8);
        assert_eq!(mm.translate(a(0o70_010), AccessKind::Read), Ok(a(0o50_010)));
        assert_eq!(mm.translate(a(0o70_777), AccessKind::Write), Ok(a(0o50_777)));
        // Just past the window, relocation applies (and bounds fail).
        assert!(mm.translate(a(0o71_000), AccessKind::Read).is_err());
        mm.prvn = false;
        mm.trap_pending = false;
        // Inside the bounds, relocation applies.
        assert_eq!(mm.translate(a(0o100), AccessKind::Read), Ok(a(0o10_100)));

        mm.mmr |= MMR_WRITE_PROTECT;
        assert_eq!(mm.translate(a(0o70_010), AccessKind::Read), Ok(a(0o50_010)));
        assert!(mm.translate(a(0o70_010), AccessKind::Write).is_err());
        assert!(mm.prvn);
    }

    #[test]
    fn test_xvm_relocation_disable() {
        let mut mm = user_mmu(Protection::Xvm);
        mm.mmr = MMR_RELOCATION_DISABLE;
        assert_eq!(mm.translate(a(0o60_000), AccessKind::Read), Ok(a(0o60_000)));
    }

    #[test]
    fn test_translate_is_deterministic() {
        let mut mm = user_mmu(Protection::Relocation);
        mm.bounds = 0o2_000;
        mm.relocation = 0o30_000;
        let first = mm.translate(a(0o1_234), AccessKind::Fetch);
        let second = mm.translate(a(0o1_234), AccessKind::Fetch);
        assert_eq!(first, second);
        assert_eq!(first, Ok(a(0o31_234)));
    }

    #[test]
    fn test_user_mode_change_is_deferred() {
        let mut mm = MemoryManagement::new(Variant::Pdp9, Protection::Bounds, 0o100_000, false);
        mm.defer_user_mode(true);
        assert!(!mm.usmd);
        // The instruction after the one which asked for the change
        // still runs in executive mode.
        mm.advance_pending_modes();
        assert!(!mm.usmd);
        mm.advance_pending_modes();
        assert!(mm.usmd);
    }

    #[test]
    fn test_enter_executive_abandons_pending_changes() {
        let mut mm = MemoryManagement::new(Variant::Pdp15, Protection::Bounds, 0o100_000, true);
        mm.memm = false;
        mm.usmd = true;
        mm.defer_extend_mode(false);
        mm.enter_executive();
        assert!(!mm.usmd);
        assert!(mm.memm);
        mm.advance_pending_modes();
        mm.advance_pending_modes();
        assert!(mm.memm);
    }

    #[test]
    fn test_return_word_bits() {
        let mut mm = MemoryManagement::new(Variant::Pdp9, Protection::Bounds, 0o100_000, false);
        mm.memm = true;
        mm.usmd = true;
        assert_eq!(mm.return_word_bits(), RETURN_WORD_EXTEND | RETURN_WORD_USER);
        let mut mm7 = MemoryManagement::new(Variant::Pdp7, Protection::None, 0o100_000, false);
        mm7.memm = true;
        mm7.usmd = true;
        assert_eq!(mm7.return_word_bits(), RETURN_WORD_EXTEND);
    }

    #[test]
    fn test_restore_extend_mode_cancels_pending_change() {
        let mut mm = MemoryManagement::new(Variant::Pdp7, Protection::None, 0o100_000, false);
        mm.defer_extend_mode(true);
        mm.advance_pending_modes();
        mm.restore_extend_mode(0o400_300);
        mm.advance_pending_modes();
        mm.advance_pending_modes();
        assert!(!mm.memm);
        mm.restore_extend_mode(RETURN_WORD_EXTEND);
        assert!(mm.memm);
    }
}
