//! Atomic operations on a word in simulated memory.

mod common;

use common::{compile, load};
use rvjit::riscv::{Gpr, Simulator};

const CELL: u64 = 0x5000_0000;

fn with_cell(sim: &mut Simulator, value: u64) {
    sim.map(CELL, 8);
    sim.write(CELL, 8, value).unwrap();
}

#[test]
fn compare_and_swap_stores_only_on_match() {
    // a0 = cas(*a1, expected = a2, desired = a3), returning the old value.
    let code = compile(|jit| {
        jit.cas_atomic(Gpr::A0, Gpr::A1, Gpr::A2, Gpr::A3);
        jit.ret();
    });

    let mut sim = load(&code);
    with_cell(&mut sim, 5);
    assert_eq!(sim.call(code.address(), &[0, CELL, 5, 9]).unwrap(), 5);
    assert_eq!(sim.read(CELL, 8).unwrap(), 9);

    assert_eq!(sim.call(code.address(), &[0, CELL, 5, 11]).unwrap(), 9);
    assert_eq!(sim.read(CELL, 8).unwrap(), 9);
    assert_eq!(code.stats().max_temps, 2);
}

#[test]
fn compare_and_swap_may_overwrite_its_inputs() {
    let code = compile(|jit| {
        jit.cas_atomic(Gpr::A2, Gpr::A1, Gpr::A2, Gpr::A3);
        jit.movr(Gpr::A0, Gpr::A2);
        jit.ret();
    });
    let mut sim = load(&code);
    with_cell(&mut sim, u64::MAX);
    assert_eq!(sim.call(code.address(), &[0, CELL, u64::MAX, 1]).unwrap(), u64::MAX);
    assert_eq!(sim.read(CELL, 8).unwrap(), 1);
}

#[test]
fn swap_returns_previous_value() {
    let code = compile(|jit| {
        jit.swap_atomic(Gpr::A0, Gpr::A1, Gpr::A2);
        jit.ret();
    });
    let mut sim = load(&code);
    with_cell(&mut sim, 0x1122_3344_5566_7788);
    assert_eq!(sim.call(code.address(), &[0, CELL, 42]).unwrap(), 0x1122_3344_5566_7788);
    assert_eq!(sim.read(CELL, 8).unwrap(), 42);
}

#[test]
fn ordered_load_and_store_move_full_words() {
    let code = compile(|jit| {
        jit.ldr_atomic(Gpr::A2, Gpr::A0);
        jit.str_atomic(Gpr::A0, Gpr::A1);
        jit.movr(Gpr::A0, Gpr::A2);
        jit.ret();
    });
    let mut sim = load(&code);
    with_cell(&mut sim, 0xdead_beef_0000_0001);
    assert_eq!(sim.call(code.address(), &[CELL, 7]).unwrap(), 0xdead_beef_0000_0001);
    assert_eq!(sim.read(CELL, 8).unwrap(), 7);
}
