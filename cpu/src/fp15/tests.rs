use std::convert::Infallible;

use base::prelude::*;

use super::ufp::{self, OperandFormat, Precision, Ufp, NORMALIZED_BIT};
use super::*;

struct TestMemory {
    words: Vec<Unsigned18Bit>,
}

impl TestMemory {
    fn new() -> TestMemory {
        TestMemory {
            words: vec![Unsigned18Bit::ZERO; 0o1_000],
        }
    }

    fn put(&mut self, addr: u32, values: &[u32]) {
        for (i, v) in values.iter().enumerate() {
            self.words[addr as usize + i] = Unsigned18Bit::truncate(*v);
        }
    }

    fn get(&self, addr: u32, n: usize) -> Vec<u32> {
        self.words[addr as usize..addr as usize + n]
            .iter()
            .map(|w| w.bits())
            .collect()
    }
}

impl OperandMemory for TestMemory {
    type Error = Infallible;

    fn read(&mut self, addr: Address) -> Result<Unsigned18Bit, Infallible> {
        Ok(self.words[usize::from(addr)])
    }

    fn write(&mut self, addr: Address, value: Unsigned18Bit) -> Result<(), Infallible> {
        self.words[usize::from(addr)] = value;
        Ok(())
    }
}

fn ufp(x: f64) -> Ufp {
    if x == 0.0 {
        return Ufp::ZERO;
    }
    let mut m = x.abs();
    let mut exp = 0;
    while m >= 1.0 {
        m /= 2.0;
        exp += 1;
    }
    while m < 0.5 {
        m *= 2.0;
        exp -= 1;
    }
    Ufp::from_parts(x < 0.0, exp, (m * (1u64 << 35) as f64) as u64)
}

fn single(x: f64) -> Vec<u32> {
    ufp::pack(OperandFormat::SingleFloat, ufp(x)).expect("test value should be in range")
}

fn fp_ir(op: u32, modifiers: u32) -> u32 {
    0o710_000 | (op << 8) | modifiers
}

fn run(fp: &mut Fp15, ir: u32, ea: u32, mem: &mut TestMemory) -> Fp15Outcome {
    match fp.execute(ir, Address::truncate(ea), mem) {
        Ok(outcome) => outcome,
        Err(e) => match e {},
    }
}

const LD: u32 = 0o06;
const ST: u32 = 0o07;
const ADD: u32 = 0o14;
const SUB: u32 = 0o01;
const RSUB: u32 = 0o02;
const MUL: u32 = 0o03;
const DIV: u32 = 0o04;
const FLT: u32 = 0o10;
const FIX: u32 = 0o11;
const LFMQ: u32 = 0o12;
const JEA: u32 = 0o13;
const BR: u32 = 0o15;

#[test]
fn test_load_add_store() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &single(1.5));
    mem.put(0o102, &single(2.25));
    assert_eq!(run(&mut fp, fp_ir(LD, FLOAT), 0o100, &mut mem), Fp15Outcome::Completed);
    assert_eq!(run(&mut fp, fp_ir(ADD, FLOAT), 0o102, &mut mem), Fp15Outcome::Completed);
    assert_eq!(fp.a.to_f64(), 3.75);
    assert_eq!(
        run(&mut fp, fp_ir(ST, FLOAT | DOUBLE), 0o200, &mut mem),
        Fp15Outcome::Completed
    );
    let stored = ufp::unpack(OperandFormat::DoubleFloat, &mem.get(0o200, 3))
        .expect("floats always unpack");
    assert_eq!(stored.to_f64(), 3.75);
}

#[test]
fn test_reverse_operations() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &single(10.0));
    fp.a = ufp(4.0);
    run(&mut fp, fp_ir(SUB, FLOAT), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), -6.0);
    fp.a = ufp(4.0);
    run(&mut fp, fp_ir(RSUB, FLOAT), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), 6.0);
    fp.a = ufp(4.0);
    run(&mut fp, fp_ir(0o05, FLOAT), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), 2.5);
    fp.a = ufp(4.0);
    run(&mut fp, fp_ir(MUL, FLOAT), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), 40.0);
}

#[test]
fn test_no_load_uses_fmb() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    fp.a = ufp(9.0);
    fp.b = ufp(3.0);
    run(&mut fp, fp_ir(DIV, FLOAT | NO_LOAD), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), 3.0);
}

#[test]
fn test_divide_check_leaves_accumulator() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    fp.a = ufp(1.0);
    assert_eq!(
        run(&mut fp, fp_ir(DIV, FLOAT), 0o100, &mut mem),
        Fp15Outcome::Exception(Fp15Exception::DivideCheck)
    );
    assert_eq!(fp.a, ufp(1.0));
}

#[test]
fn test_integer_overflow_depends_on_precision() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &[1]);
    mem.put(0o110, &[0, 1]);
    fp.a = Ufp::integer(false, 0o377_777);
    assert_eq!(
        run(&mut fp, fp_ir(ADD, 0), 0o100, &mut mem),
        Fp15Outcome::Exception(Fp15Exception::Overflow)
    );
    assert_eq!(fp.a, Ufp::integer(false, 0o377_777));
    assert_eq!(
        run(&mut fp, fp_ir(ADD, DOUBLE), 0o110, &mut mem),
        Fp15Outcome::Completed
    );
    assert_eq!(fp.a, Ufp::integer(false, 0o400_000));
    assert_eq!(
        run(&mut fp, fp_ir(ST, DOUBLE), 0o120, &mut mem),
        Fp15Outcome::Completed
    );
    assert_eq!(mem.get(0o120, 2), vec![0, 0o400_000]);
}

#[test]
fn test_loading_most_negative_double_integer_overflows() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &[0o400_000, 0]);
    fp.a = Ufp::integer(false, 9);
    assert_eq!(
        run(&mut fp, fp_ir(LD, DOUBLE), 0o100, &mut mem),
        Fp15Outcome::Exception(Fp15Exception::Overflow)
    );
    assert_eq!(fp.a, Ufp::integer(false, 9));
}

#[test]
fn test_integer_divide() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &[0o777_772]); // -6
    fp.a = Ufp::integer(false, 45);
    run(&mut fp, fp_ir(DIV, 0), 0o100, &mut mem);
    assert_eq!(fp.a, Ufp::integer(true, 7));
    mem.put(0o101, &[0]);
    assert_eq!(
        run(&mut fp, fp_ir(DIV, 0), 0o101, &mut mem),
        Fp15Outcome::Exception(Fp15Exception::DivideCheck)
    );
}

#[test]
fn test_float_and_fix() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &[0o777_773]);
    run(&mut fp, fp_ir(FLT, 0), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), -5.0);
    assert!(fp.a.is_normalized());

    mem.put(0o110, &single(7.75));
    run(&mut fp, fp_ir(FIX, 0), 0o110, &mut mem);
    assert_eq!(fp.a, Ufp::integer(false, 7));
}

#[test]
fn test_fix_overflow_in_single_precision() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &single(262_144.0));
    assert_eq!(
        run(&mut fp, fp_ir(FIX, 0), 0o100, &mut mem),
        Fp15Outcome::Exception(Fp15Exception::Overflow)
    );
}

#[test]
fn test_sign_operations() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &single(-1.5));
    run(&mut fp, fp_ir(LD, FLOAT | 1), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), 1.5);
    run(&mut fp, fp_ir(LD, FLOAT | 2), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), 1.5);
    run(&mut fp, fp_ir(LD, FLOAT | 3), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), -1.5);
    run(&mut fp, fp_ir(LD, FLOAT), 0o100, &mut mem);
    assert_eq!(fp.a.to_f64(), -1.5);
}

#[test]
fn test_underflow_clears_accumulator() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    fp.a = Ufp::from_parts(false, -250, NORMALIZED_BIT);
    fp.b = Ufp::from_parts(false, -10, NORMALIZED_BIT);
    assert_eq!(
        run(&mut fp, fp_ir(MUL, FLOAT | NO_LOAD), 0, &mut mem),
        Fp15Outcome::Exception(Fp15Exception::Underflow)
    );
    assert_eq!(fp.a, Ufp::ZERO);
}

#[test]
fn test_overflow_keeps_accumulator() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    let big = Ufp::from_parts(false, 200, NORMALIZED_BIT);
    fp.a = big;
    fp.b = big;
    assert_eq!(
        run(&mut fp, fp_ir(MUL, FLOAT | NO_LOAD), 0, &mut mem),
        Fp15Outcome::Exception(Fp15Exception::Overflow)
    );
    assert_eq!(fp.a, big);
    // Double precision has room for the result.
    assert_eq!(
        run(&mut fp, fp_ir(MUL, FLOAT | DOUBLE | NO_LOAD), 0, &mut mem),
        Fp15Outcome::Completed
    );
    assert_eq!(fp.a.exp, 399);
}

#[test]
fn test_branch_conditions() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    fp.a = ufp(-2.0);
    assert_eq!(
        run(&mut fp, fp_ir(BR, BR_NEGATIVE), 0o4321, &mut mem),
        Fp15Outcome::Branch(Address::truncate(0o4321))
    );
    assert_eq!(
        run(&mut fp, fp_ir(BR, BR_ZERO | BR_POSITIVE), 0o4321, &mut mem),
        Fp15Outcome::Completed
    );
    fp.a = Ufp::ZERO;
    assert_eq!(
        run(&mut fp, fp_ir(BR, BR_ZERO), 0o4321, &mut mem),
        Fp15Outcome::Branch(Address::truncate(0o4321))
    );
    fp.fmq = ufp::GUARD_BIT;
    assert_eq!(
        run(&mut fp, fp_ir(BR, BR_GUARD), 0o10, &mut mem),
        Fp15Outcome::Branch(Address::truncate(0o10))
    );
}

#[test]
fn test_exception_address_register() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    mem.put(0o100, &[JEA_SIGN | JEA_GUARD | 0o1_000]);
    run(&mut fp, fp_ir(JEA, 0), 0o100, &mut mem);
    assert_eq!(fp.jea, 0o1_000);
    assert!(fp.a.sign);
    assert!(fp.guard());
    assert_eq!(
        fp.exception_vector(Fp15Exception::DivideCheck, Address::truncate(0o123_456)),
        Address::truncate(0o101_004)
    );
    run(&mut fp, fp_ir(JEA, JEA_STORE), 0o101, &mut mem);
    assert_eq!(mem.get(0o101, 1), vec![JEA_SIGN | JEA_GUARD | 0o1_000]);
}

#[test]
fn test_swap_fmq() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    fp.a = Ufp::from_parts(false, 10, NORMALIZED_BIT | 5);
    fp.fmq = 1 << 30;
    run(&mut fp, fp_ir(LFMQ, 0), 0, &mut mem);
    assert_eq!(fp.fmq, NORMALIZED_BIT | 5);
    assert_eq!(fp.a.mantissa(), NORMALIZED_BIT);
    assert_eq!(fp.a.exp, 6);
}

#[test]
fn test_unassigned_operation() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    assert_eq!(run(&mut fp, fp_ir(0, 0), 0, &mut mem), Fp15Outcome::Unimplemented);
    assert_eq!(run(&mut fp, fp_ir(0o17, 0), 0, &mut mem), Fp15Outcome::Unimplemented);
}

#[test]
fn test_single_precision_result_is_rounded() {
    let mut fp = Fp15::default();
    let mut mem = TestMemory::new();
    let third = ufp::divide(ufp(1.0), ufp(3.0)).expect("nonzero divisor");
    let (rounded, _) = ufp::normalize(third.0, third.1, true, Precision::Single);
    fp.a = ufp(1.0);
    fp.b = ufp(3.0);
    run(&mut fp, fp_ir(DIV, FLOAT | NO_LOAD), 0, &mut mem);
    assert_eq!(fp.a, rounded);
    assert_eq!(fp.a.mantissa() & 0o777, 0);
}
