//! Floating-point arithmetic, conversions and the full branch relation matrix.

mod common;

use common::{compile, load};
use rvjit::riscv::{FinishedCode, FpCond, FpWidth, Fpr, Gpr, Simulator};

const PAIRS: [(f64, f64); 8] = [
    (1.0, 2.0),
    (2.0, 1.0),
    (1.0, 1.0),
    (f64::NAN, 1.0),
    (1.0, f64::NAN),
    (f64::NAN, f64::NAN),
    (-0.0, 0.0),
    (f64::NEG_INFINITY, f64::INFINITY),
];

/// `a0 = cond(fa0, fa1) ? 1 : 0`.
fn relation_fn(w: FpWidth, cond: FpCond) -> FinishedCode {
    compile(|jit| {
        let taken = jit.fp_branch(w, cond, Fpr::FA0, Fpr::FA1);
        jit.movi(Gpr::A0, 0);
        jit.ret();
        jit.patch_here(taken);
        jit.movi(Gpr::A0, 1);
        jit.ret();
    })
}

fn set_pair(sim: &mut Simulator, w: FpWidth, a: f64, b: f64) {
    match w {
        FpWidth::Single => {
            sim.set_fpr_f32(Fpr::FA0, a as f32);
            sim.set_fpr_f32(Fpr::FA1, b as f32);
        }
        FpWidth::Double => {
            sim.set_fpr_f64(Fpr::FA0, a);
            sim.set_fpr_f64(Fpr::FA1, b);
        }
    }
}

#[test]
fn every_relation_matches_ieee_truth_table() {
    for w in [FpWidth::Single, FpWidth::Double] {
        for cond in FpCond::ALL {
            let code = relation_fn(w, cond);
            let mut sim = load(&code);
            for (a, b) in PAIRS {
                set_pair(&mut sim, w, a, b);
                let taken = sim.call(code.address(), &[]).unwrap() == 1;
                assert_eq!(taken, cond.holds(a, b), "{w:?} {cond:?}({a}, {b})");
            }
        }
    }
}

#[test]
fn named_branches_use_the_same_relations() {
    let code = compile(|jit| {
        let lt = jit.bunltr_d(Fpr::FA0, Fpr::FA1);
        jit.movi(Gpr::A0, 0);
        jit.ret();
        jit.patch_here(lt);
        jit.movi(Gpr::A0, 1);
        jit.ret();
    });
    let mut sim = load(&code);
    sim.set_fpr_f64(Fpr::FA0, f64::NAN);
    sim.set_fpr_f64(Fpr::FA1, 0.0);
    assert_eq!(sim.call(code.address(), &[]).unwrap(), 1);
    sim.set_fpr_f64(Fpr::FA0, 3.0);
    assert_eq!(sim.call(code.address(), &[]).unwrap(), 0);
}

#[test]
fn double_arithmetic() {
    let cases: [(fn(&mut rvjit::Jit<'_>), fn(f64, f64) -> f64); 7] = [
        (|j| j.addr_d(Fpr::FA0, Fpr::FA0, Fpr::FA1), |a, b| a + b),
        (|j| j.subr_d(Fpr::FA0, Fpr::FA0, Fpr::FA1), |a, b| a - b),
        (|j| j.mulr_d(Fpr::FA0, Fpr::FA0, Fpr::FA1), |a, b| a * b),
        (|j| j.divr_d(Fpr::FA0, Fpr::FA0, Fpr::FA1), |a, b| a / b),
        (|j| j.sqrtr_d(Fpr::FA0, Fpr::FA0), |a, _| a.sqrt()),
        (|j| j.negr_d(Fpr::FA0, Fpr::FA0), |a, _| -a),
        (|j| j.absr_d(Fpr::FA0, Fpr::FA0), |a, _| a.abs()),
    ];
    for (build, expected) in cases {
        let code = compile(|jit| {
            build(jit);
            jit.ret();
        });
        let mut sim = load(&code);
        for (a, b) in [(1.5, 0.25), (-7.0, 2.0), (1e300, 1e-300), (9.0, -0.0)] {
            sim.set_fpr_f64(Fpr::FA0, a);
            sim.set_fpr_f64(Fpr::FA1, b);
            sim.call(code.address(), &[]).unwrap();
            let got = sim.fpr_f64(Fpr::FA0);
            let want = expected(a, b);
            assert!(got == want || got.is_nan() && want.is_nan(), "{got} != {want}");
        }
    }
}

#[test]
fn single_results_stay_boxed() {
    let code = compile(|jit| {
        jit.mulr_f(Fpr::FA0, Fpr::FA0, Fpr::FA1);
        jit.retr_f(Fpr::FA0);
    });
    let mut sim = load(&code);
    sim.set_fpr_f32(Fpr::FA0, 1.5);
    sim.set_fpr_f32(Fpr::FA1, -4.0);
    sim.call(code.address(), &[]).unwrap();
    assert_eq!(sim.fpr_f32(Fpr::FA0), -6.0);
    assert_eq!(sim.f[Fpr::FA0.regno() as usize] >> 32, 0xffff_ffff);
}

#[test]
fn constants_and_precision_conversions() {
    let code = compile(|jit| {
        jit.movi_d(Fpr::FA0, 3.25);
        jit.movi_f(Fpr::FA1, -0.5);
        jit.extr_f_d(Fpr::FA1, Fpr::FA1);
        jit.addr_d(Fpr::FA0, Fpr::FA0, Fpr::FA1);
        jit.extr_d_f(Fpr::FA2, Fpr::FA0);
        jit.ret();
    });
    let mut sim = load(&code);
    sim.call(code.address(), &[]).unwrap();
    assert_eq!(sim.fpr_f64(Fpr::FA0), 2.75);
    assert_eq!(sim.fpr_f32(Fpr::FA2), 2.75);
    // Each constant goes through one scratch GPR.
    assert_eq!(code.stats().max_temps, 1);
}

#[test]
fn truncation_and_integer_conversion() {
    let to_long = compile(|jit| {
        jit.truncr_d_l(Gpr::A0, Fpr::FA0);
        jit.ret();
    });
    let to_int = compile(|jit| {
        jit.truncr_f_i(Gpr::A0, Fpr::FA0);
        jit.ret();
    });
    let from_long = compile(|jit| {
        jit.extr_d(Fpr::FA0, Gpr::A0);
        jit.ret();
    });

    let mut sim = load(&to_long);
    for (input, expected) in [(2.9, 2i64), (-2.9, -2), (1e30, i64::MAX), (-1e30, i64::MIN), (f64::NAN, i64::MAX)] {
        sim.set_fpr_f64(Fpr::FA0, input);
        assert_eq!(sim.call(to_long.address(), &[]).unwrap() as i64, expected, "{input}");
    }

    let mut sim = load(&to_int);
    for (input, expected) in [(7.99f32, 7i64), (-7.99, -7), (3e9, i32::MAX as i64)] {
        sim.set_fpr_f32(Fpr::FA0, input);
        assert_eq!(sim.call(to_int.address(), &[]).unwrap() as i64, expected, "{input}");
    }

    let mut sim = load(&from_long);
    for v in [0i64, -5, 1 << 53, i64::MIN] {
        sim.call(from_long.address(), &[v as u64]).unwrap();
        assert_eq!(sim.fpr_f64(Fpr::FA0), v as f64);
    }
}

#[test]
fn loads_and_stores_through_memory() {
    const DATA: u64 = 0x5000_0000;
    let code = compile(|jit| {
        jit.ldxi_d(Fpr::FA0, Gpr::A0, 0);
        jit.ldxi_f(Fpr::FA1, Gpr::A0, 8);
        jit.extr_f_d(Fpr::FA1, Fpr::FA1);
        jit.mulr_d(Fpr::FA0, Fpr::FA0, Fpr::FA1);
        jit.stxi_d(16, Gpr::A0, Fpr::FA0);
        // Past the 12-bit displacement range.
        jit.stxi_d(4096, Gpr::A0, Fpr::FA0);
        jit.ret();
    });
    let mut sim = load(&code);
    sim.map(DATA, 8192);
    sim.write(DATA, 8, 1.25f64.to_bits()).unwrap();
    sim.write(DATA + 8, 4, 8.0f32.to_bits() as u64).unwrap();
    sim.call(code.address(), &[DATA]).unwrap();
    assert_eq!(f64::from_bits(sim.read(DATA + 16, 8).unwrap()), 10.0);
    assert_eq!(f64::from_bits(sim.read(DATA + 4096, 8).unwrap()), 10.0);
}
