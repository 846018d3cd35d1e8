use base::prelude::*;

use super::{reserved_devices, Bus, ControlUnit};
use crate::config::{CpuConfiguration, Protection};
use crate::interrupt::{RequestLevel, VectorTable};
use crate::io::DeviceTable;
use crate::memory::MemoryUnit;
use crate::registers::RegisterName;
use crate::scheduler::NullScheduler;
use crate::stop::StopReason;
use crate::variant::Variant;

const HLT: u32 = 0o740_040;
const NOP: u32 = 0o740_000;
const ION: u32 = 0o700_042;

struct Rig {
    control: ControlUnit,
    mem: MemoryUnit,
    devices: DeviceTable,
    scheduler: NullScheduler,
}

impl Rig {
    fn new(config: CpuConfiguration) -> Rig {
        let mut vectors = VectorTable::default();
        let devices = DeviceTable::build(Vec::new(), &reserved_devices(&config), &mut vectors)
            .expect("an empty device table should be valid");
        let mem = MemoryUnit::new(config.memory_words);
        let mut control = ControlUnit::new(config, vectors);
        control.deposit(RegisterName::Pc, 0o100);
        Rig {
            control,
            mem,
            devices,
            scheduler: NullScheduler,
        }
    }

    fn for_variant(variant: Variant) -> Rig {
        Rig::new(CpuConfiguration::for_variant(variant))
    }

    fn load(&mut self, addr: u32, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            self.mem
                .store(
                    Address::truncate(addr + i as u32),
                    Unsigned18Bit::truncate(*w),
                )
                .expect("test program should fit in memory");
        }
    }

    fn peek(&self, addr: u32) -> u32 {
        self.mem
            .fetch(Address::truncate(addr))
            .expect("test address should be mapped")
            .bits()
    }

    fn step(&mut self) -> Result<(), StopReason> {
        let mut bus = Bus {
            mem: &mut self.mem,
            devices: &mut self.devices,
            scheduler: &mut self.scheduler,
        };
        self.control.iterate(&mut bus)
    }

    fn reg(&self, name: RegisterName) -> u32 {
        self.control.examine(name)
    }
}

#[test]
fn test_cla_cma_then_iac() {
    let mut rig = Rig::for_variant(Variant::Pdp15);
    // CLA CMA; IAC (RAL+RAR on the PDP-15)
    rig.load(0o100, &[0o750_001, 0o740_030]);
    rig.step().expect("CLA CMA should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0o777_777);
    assert_eq!(rig.reg(RegisterName::Link), 0);
    rig.step().expect("IAC should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0);
    assert_eq!(rig.reg(RegisterName::Link), 1);
}

#[test]
fn test_ral_rar_is_nop_before_pdp15() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    rig.control.deposit(RegisterName::Ac, 0o123_456);
    rig.load(0o100, &[0o740_030]);
    rig.step().expect("OPR should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0o123_456);
}

#[test]
fn test_skip_on_zero_ac() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    // SZA
    rig.load(0o100, &[0o740_200]);
    rig.step().expect("SZA should not stop");
    assert_eq!(rig.reg(RegisterName::Pc), 0o102);
}

#[test]
fn test_hlt_stops_at_its_own_address() {
    let mut rig = Rig::for_variant(Variant::Pdp7);
    rig.load(0o100, &[HLT]);
    assert_eq!(
        rig.step(),
        Err(StopReason::Halt {
            pc: Address::truncate(0o100)
        })
    );
    assert_eq!(rig.reg(RegisterName::Pc), 0o101);
}

#[test]
fn test_add_overflow_sets_link() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    // LAC 200; ADD 201
    rig.load(0o100, &[0o200_200, 0o300_201]);
    rig.load(0o200, &[0o377_777, 0o000_001]);
    rig.step().expect("LAC should not stop");
    rig.step().expect("ADD should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0o400_000);
    assert_eq!(rig.reg(RegisterName::Link), 1);
}

#[test]
fn test_tad_carry_complements_link() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    rig.control.deposit(RegisterName::Ac, 0o777_777);
    rig.control.deposit(RegisterName::Link, 1);
    // TAD 200
    rig.load(0o100, &[0o340_200]);
    rig.load(0o200, &[1]);
    rig.step().expect("TAD should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0);
    assert_eq!(rig.reg(RegisterName::Link), 0);
}

#[test]
fn test_isz_skips_when_result_is_zero() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    // ISZ 200
    rig.load(0o100, &[0o440_200]);
    rig.load(0o200, &[0o777_777]);
    rig.step().expect("ISZ should not stop");
    assert_eq!(rig.peek(0o200), 0);
    assert_eq!(rig.reg(RegisterName::Pc), 0o102);
}

#[test]
fn test_jms_saves_link_and_pc() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    rig.control.deposit(RegisterName::Link, 1);
    // JMS 200
    rig.load(0o100, &[0o100_200]);
    rig.step().expect("JMS should not stop");
    assert_eq!(rig.peek(0o200), 0o400_101);
    assert_eq!(rig.reg(RegisterName::Pc), 0o201);
    assert_eq!(
        rig.control.pc_queue().get(0),
        Some(Address::truncate(0o100))
    );
}

#[test]
fn test_auto_index_increments_before_use() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    // LAC I 10
    rig.load(0o100, &[0o220_010]);
    rig.load(0o10, &[0o177]);
    rig.load(0o200, &[0o123_456]);
    rig.step().expect("LAC I should not stop");
    assert_eq!(rig.peek(0o10), 0o200);
    assert_eq!(rig.reg(RegisterName::Ac), 0o123_456);
}

#[test]
fn test_xct_nesting_limit() {
    let mut config = CpuConfiguration::for_variant(Variant::Pdp9);
    config.xct_max = 2;
    let mut rig = Rig::new(config);
    // XCT .
    rig.load(0o100, &[0o400_100]);
    assert_eq!(
        rig.step(),
        Err(StopReason::XctLimit {
            pc: Address::truncate(0o100)
        })
    );
}

#[test]
fn test_xct_executes_target() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    // XCT 200, where 200 holds CLA CMA
    rig.load(0o100, &[0o400_200]);
    rig.load(0o200, &[0o750_001]);
    rig.step().expect("XCT should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0o777_777);
    assert_eq!(rig.reg(RegisterName::Pc), 0o101);
}

#[test]
fn test_iot_defers_program_interrupt() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    rig.control.requests.set(RequestLevel::Pi, 0);
    rig.load(0o100, &[ION, NOP]);
    rig.load(1, &[HLT]);
    rig.step().expect("ION should not stop");
    // The instruction after an IOT always runs.
    rig.step().expect("NOP should not stop");
    assert_eq!(rig.reg(RegisterName::Pc), 0o102);
    assert_eq!(
        rig.step(),
        Err(StopReason::Halt {
            pc: Address::truncate(1)
        })
    );
    assert_eq!(rig.peek(0), 0o102);
    assert_eq!(rig.reg(RegisterName::Ion), 0);
}

#[test]
fn test_privileged_iot_traps_in_user_mode() {
    let mut config = CpuConfiguration::for_variant(Variant::Pdp9);
    config.protection = Protection::Bounds;
    let mut rig = Rig::new(config);
    rig.control.deposit(RegisterName::UserMode, 1);
    rig.load(0o100, &[ION]);
    rig.load(2, &[HLT]);
    rig.step().expect("a trap is not a stop");
    assert_eq!(rig.reg(RegisterName::Ion), 0);
    assert_eq!(rig.reg(RegisterName::Prvn), 1);
    assert_eq!(
        rig.step(),
        Err(StopReason::Halt {
            pc: Address::truncate(2)
        })
    );
    assert_eq!(rig.peek(0), 0o100_101);
    assert_eq!(rig.reg(RegisterName::UserMode), 0);
}

#[test]
fn test_unimplemented_instruction_stops() {
    let mut rig = Rig::for_variant(Variant::Pdp4);
    // EAE is not available on the PDP-4.
    rig.load(0o100, &[0o640_000]);
    assert_eq!(
        rig.step(),
        Err(StopReason::UnimplementedInstruction {
            pc: Address::truncate(0o100),
            ir: Unsigned18Bit::truncate(0o640_000),
        })
    );
}

#[test]
fn test_jump_to_self_with_nothing_pending_is_an_infinite_loop() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    // JMP .
    rig.load(0o100, &[0o600_100]);
    rig.step().expect("the first JMP should run");
    assert_eq!(
        rig.step(),
        Err(StopReason::InfiniteLoop {
            pc: Address::truncate(0o100)
        })
    );
}

#[test]
fn test_deposit_masks_to_register_width() {
    let mut rig = Rig::for_variant(Variant::Pdp15);
    rig.control.deposit(RegisterName::Sc, 0o777);
    assert_eq!(rig.reg(RegisterName::Sc), 0o77);
    rig.control.deposit(RegisterName::Ac, 0o3_000_001);
    assert_eq!(rig.reg(RegisterName::Ac), 0o000_001);
    assert_eq!(rig.reg(RegisterName::Link), 0);
}

fn page_mode_rig() -> Rig {
    let mut config = CpuConfiguration::for_variant(Variant::Pdp15);
    config.bank_mode_at_reset = false;
    Rig::new(config)
}

#[test]
fn test_page_mode_direct_address_is_in_current_page() {
    let mut rig = page_mode_rig();
    rig.control.deposit(RegisterName::Pc, 0o10_100);
    // LAC 200
    rig.load(0o10_100, &[0o200_200]);
    rig.load(0o200, &[0o222]);
    rig.load(0o10_200, &[0o111]);
    rig.step().expect("LAC should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0o111);
}

#[test]
fn test_bank_mode_direct_address_is_in_current_field() {
    let mut rig = Rig::for_variant(Variant::Pdp15);
    rig.control.deposit(RegisterName::Pc, 0o10_100);
    rig.control.deposit(RegisterName::Xr, 5);
    // LAC 10200; in page mode this would be LAC 200,X
    rig.load(0o10_100, &[0o210_200]);
    rig.load(0o205, &[0o555]);
    rig.load(0o10_200, &[0o111]);
    rig.step().expect("LAC should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0o111);
}

#[test]
fn test_page_mode_index_is_added_after_indirection() {
    let mut rig = page_mode_rig();
    rig.control.deposit(RegisterName::Xr, 5);
    // LAC 200,X; LAC I 300,X
    rig.load(0o100, &[0o210_200, 0o230_300]);
    rig.load(0o205, &[0o333]);
    rig.load(0o300, &[0o400]);
    rig.load(0o405, &[0o444]);
    rig.step().expect("indexed LAC should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0o333);
    rig.step().expect("indirect indexed LAC should not stop");
    assert_eq!(rig.reg(RegisterName::Ac), 0o444);
}

#[test]
fn test_page_mode_auto_index_reaches_all_of_memory() {
    let mut rig = page_mode_rig();
    // LAC I 10
    rig.load(0o100, &[0o220_010]);
    rig.load(0o10, &[0o177_776]);
    rig.load(0o77_777, &[0o111]);
    rig.load(0o177_777, &[0o654_321]);
    rig.step().expect("LAC I should not stop");
    assert_eq!(rig.peek(0o10), 0o177_777);
    assert_eq!(rig.reg(RegisterName::Ac), 0o654_321);
}

#[test]
fn test_cal_with_api_enabled_activates_level_four() {
    let mut rig = Rig::for_variant(Variant::Pdp15);
    rig.control.deposit(RegisterName::ApiEnable, 1);
    rig.control.deposit(RegisterName::Link, 1);
    // CAL
    rig.load(0o100, &[0o000_000]);
    rig.step().expect("CAL should not stop");
    assert_eq!(rig.reg(RegisterName::Pc), 0o21);
    assert_eq!(rig.peek(0o20) & 0o477_777, 0o400_101);
    assert_eq!(rig.reg(RegisterName::ApiActive), 0o20);
}

#[test]
fn test_cal_without_api_leaves_levels_alone() {
    let mut rig = Rig::for_variant(Variant::Pdp15);
    rig.load(0o100, &[0o000_000]);
    rig.step().expect("CAL should not stop");
    assert_eq!(rig.reg(RegisterName::Pc), 0o21);
    assert_eq!(rig.reg(RegisterName::ApiActive), 0);
}

const DBR: u32 = 0o703_344;
const RES: u32 = 0o707_742;

/// Runs the restore IOT at 100 and then `JMP I 200` at 101, where
/// 200 holds `pointer`.
fn restore_then_jump(variant: Variant, restore: u32, pointer: u32) -> Rig {
    let mut rig = Rig::for_variant(variant);
    rig.load(0o100, &[restore, 0o620_200]);
    rig.load(0o200, &[pointer]);
    rig.step().expect("the restore IOT should not stop");
    rig.step().expect("JMP I should not stop");
    rig
}

#[test]
fn test_jmp_i_after_dbr_restores_link_and_extend_mode() {
    let rig = restore_then_jump(Variant::Pdp9, DBR, 0o600_300);
    assert_eq!(rig.reg(RegisterName::Pc), 0o300);
    assert_eq!(rig.reg(RegisterName::Link), 1);
    assert_eq!(rig.reg(RegisterName::ExtendMode), 1);
}

#[test]
fn test_jmp_i_after_res_restores_link_and_extend_mode() {
    let rig = restore_then_jump(Variant::Pdp9, RES, 0o400_300);
    assert_eq!(rig.reg(RegisterName::Pc), 0o300);
    assert_eq!(rig.reg(RegisterName::Link), 1);
    assert_eq!(rig.reg(RegisterName::ExtendMode), 0);
}

#[test]
fn test_plain_jmp_i_restores_nothing() {
    let mut rig = Rig::for_variant(Variant::Pdp9);
    // JMP I 200
    rig.load(0o100, &[0o620_200]);
    rig.load(0o200, &[0o600_300]);
    rig.step().expect("JMP I should not stop");
    assert_eq!(rig.reg(RegisterName::Pc), 0o300);
    assert_eq!(rig.reg(RegisterName::Link), 0);
    assert_eq!(rig.reg(RegisterName::ExtendMode), 0);
}

#[test]
fn test_jmp_i_after_emir_restores_extend_mode_only() {
    let mut rig = restore_then_jump(Variant::Pdp7, RES, 0o400_300);
    assert_eq!(rig.reg(RegisterName::Pc), 0o300);
    assert_eq!(rig.reg(RegisterName::Link), 0);
    assert_eq!(rig.reg(RegisterName::ExtendMode), 0);
    // The extend mode EMIR asked for must not arrive late.
    rig.load(0o300, &[NOP]);
    rig.step().expect("NOP should not stop");
    assert_eq!(rig.reg(RegisterName::ExtendMode), 0);

    let rig = restore_then_jump(Variant::Pdp7, RES, 0o200_300);
    assert_eq!(rig.reg(RegisterName::ExtendMode), 1);
}

#[test]
fn test_fp15_registers_examine_and_deposit() {
    let mut rig = Rig::for_variant(Variant::Pdp15);
    rig.control.deposit(RegisterName::FmaSign, 1);
    rig.control.deposit(RegisterName::FmaExponent, 0o777_776);
    rig.control.deposit(RegisterName::FmaHigh, 0o777_777);
    rig.control.deposit(RegisterName::FmaLow, 0o123_456);
    assert!(rig.control.fp15.a.sign);
    assert_eq!(rig.control.fp15.a.exp, -2);
    assert_eq!(rig.control.fp15.a.hi, 0o377_777);
    assert_eq!(rig.reg(RegisterName::FmaExponent), 0o777_776);
    assert_eq!(rig.reg(RegisterName::FmaLow), 0o123_456);

    rig.control.deposit(RegisterName::FmbExponent, 3);
    assert_eq!(rig.control.fp15.b.exp, 3);
    assert_eq!(rig.reg(RegisterName::FmbSign), 0);

    rig.control.deposit(RegisterName::FmqHigh, 0o200_001);
    rig.control.deposit(RegisterName::FmqLow, 0o000_007);
    assert_eq!(rig.control.fp15.fmq, (0o200_001 << 18) | 7);
    assert_eq!(rig.reg(RegisterName::Guard), 1);
    rig.control.deposit(RegisterName::Guard, 0);
    assert_eq!(rig.reg(RegisterName::FmqHigh), 0o000_001);
    assert_eq!(rig.reg(RegisterName::FmqLow), 7);
}

#[test]
fn test_trap_pending_examine_and_deposit() {
    let mut rig = Rig::for_variant(Variant::Pdp15);
    assert_eq!(rig.reg(RegisterName::TrapPending), 0);
    rig.control.deposit(RegisterName::TrapPending, 1);
    assert!(rig.control.mm.trap_pending);
    assert_eq!(rig.reg(RegisterName::TrapPending), 1);
}
