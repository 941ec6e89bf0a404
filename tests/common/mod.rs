//! Shared helpers for the integration tests: emit into a fresh session and run
//! the result on the reference interpreter.

#![allow(dead_code)]

use bumpalo::Bump;
use rvjit::riscv::{FinishedCode, Jit, Simulator};
use rvjit::{CodeBuffer, JitConfig};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Emit one function with the default configuration.
pub fn compile(build: impl FnOnce(&mut Jit<'_>)) -> FinishedCode {
    compile_with(JitConfig::default(), build)
}

pub fn compile_with(config: JitConfig, build: impl FnOnce(&mut Jit<'_>)) -> FinishedCode {
    init_logging();
    let arena = Bump::new();
    let mut jit = Jit::new(&arena, config);
    jit.begin(CodeBuffer::new(1 << 20).expect("code buffer"));
    build(&mut jit);
    jit.end().expect("emission failed")
}

/// Simulator with `code` loaded.
pub fn load(code: &FinishedCode) -> Simulator {
    let mut sim = Simulator::new();
    sim.load_code(code);
    sim
}

/// Call `code` with integer arguments and return `a0`.
pub fn run(code: &FinishedCode, args: &[u64]) -> u64 {
    load(code).call(code.address(), args).expect("simulation failed")
}

/// Deterministic 64-bit values covering small, boundary and mixed-bit inputs.
pub fn sample_values() -> Vec<i64> {
    let mut values = vec![
        0,
        1,
        -1,
        2,
        -2,
        2047,
        2048,
        -2048,
        -2049,
        0x7fff_ffff,
        0x8000_0000,
        -0x8000_0000,
        -0x8000_0001,
        0xffff_ffff,
        0x1_0000_0000,
        i64::MAX,
        i64::MIN,
        i64::MIN + 1,
    ];
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    for _ in 0..32 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        values.push(state as i64);
        values.push((state >> (state % 61)) as i64);
    }
    values
}
