// This module holds the floating-point side of the composer: arithmetic, moves,
// conversions, loads, stores and compare-and-branch for single (_f) and double (_d)
// precision. The FP unit only offers feq, flt and fle, each writing 0 or 1 to an
// integer register and each false when either operand is NaN. All fourteen branch
// relations are built from those three predicates: ordered relations branch when the
// predicate is set (swapping operands for ge/gt), the unordered-or-X relations branch
// when the complementary ordered predicate is clear, uneq and ltgt combine lt in both
// directions, and ord/unord test each operand for equality with itself. Both widths
// share one implementation parameterized by FpWidth; the public _f/_d entry points
// are generated by macros.

//! Floating-point operations and branches.

use super::encoding::simm12_p;
use super::insn::{self, FpWidth, IntWidth, RM_RNE, RM_RTZ};
use super::jit::Jit;
use super::regs::{Fpr, Gpr};
use super::reloc::Reloc;

/// Relation tested by a floating-point branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpCond {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    /// Unordered or not equal.
    Ne,
    Unlt,
    Unle,
    Uneq,
    Unge,
    Ungt,
    /// Ordered and not equal.
    Ltgt,
    Ord,
    Unord,
}

impl FpCond {
    pub const ALL: [FpCond; 14] = [
        FpCond::Lt,
        FpCond::Le,
        FpCond::Eq,
        FpCond::Ge,
        FpCond::Gt,
        FpCond::Ne,
        FpCond::Unlt,
        FpCond::Unle,
        FpCond::Uneq,
        FpCond::Unge,
        FpCond::Ungt,
        FpCond::Ltgt,
        FpCond::Ord,
        FpCond::Unord,
    ];

    /// IEEE-754 truth value of the relation.
    pub fn holds(self, a: f64, b: f64) -> bool {
        let unordered = a.is_nan() || b.is_nan();
        match self {
            FpCond::Lt => a < b,
            FpCond::Le => a <= b,
            FpCond::Eq => a == b,
            FpCond::Ge => a >= b,
            FpCond::Gt => a > b,
            FpCond::Ne => a != b,
            FpCond::Unlt => unordered || a < b,
            FpCond::Unle => unordered || a <= b,
            FpCond::Uneq => unordered || a == b,
            FpCond::Unge => unordered || a >= b,
            FpCond::Ungt => unordered || a > b,
            FpCond::Ltgt => !unordered && a != b,
            FpCond::Ord => !unordered,
            FpCond::Unord => unordered,
        }
    }
}

type FpPredicate = fn(FpWidth, Gpr, Fpr, Fpr) -> u32;

impl Jit<'_> {
    // ==== BRANCHES ====

    /// Branch on `cond(a, b)`.
    pub fn fp_branch(&mut self, w: FpWidth, cond: FpCond, a: Fpr, b: Fpr) -> Reloc {
        match cond {
            FpCond::Lt => self.fp_branch_one(w, insn::flt, a, b, true),
            FpCond::Le => self.fp_branch_one(w, insn::fle, a, b, true),
            FpCond::Eq => self.fp_branch_one(w, insn::feq, a, b, true),
            FpCond::Ge => self.fp_branch_one(w, insn::fle, b, a, true),
            FpCond::Gt => self.fp_branch_one(w, insn::flt, b, a, true),
            FpCond::Ne => self.fp_branch_one(w, insn::feq, a, b, false),
            FpCond::Unlt => self.fp_branch_one(w, insn::fle, b, a, false),
            FpCond::Unle => self.fp_branch_one(w, insn::flt, b, a, false),
            FpCond::Unge => self.fp_branch_one(w, insn::flt, a, b, false),
            FpCond::Ungt => self.fp_branch_one(w, insn::fle, a, b, false),
            FpCond::Uneq => self.fp_branch_two(w, (insn::flt, a, b), (insn::flt, b, a), false, false),
            FpCond::Ltgt => self.fp_branch_two(w, (insn::flt, b, a), (insn::flt, a, b), false, true),
            FpCond::Ord => self.fp_branch_two(w, (insn::feq, a, a), (insn::feq, b, b), true, true),
            FpCond::Unord => self.fp_branch_two(w, (insn::feq, a, a), (insn::feq, b, b), true, false),
        }
    }

    /// One predicate, then branch if it is set (`when_set`) or clear.
    fn fp_branch_one(&mut self, w: FpWidth, pred: FpPredicate, a: Fpr, b: Fpr, when_set: bool) -> Reloc {
        self.with_temp(|jit, t| {
            jit.emit_u32_with_pool(pred(w, t, a, b));
            if when_set {
                jit.bner(t, Gpr::ZERO)
            } else {
                jit.beqr(t, Gpr::ZERO)
            }
        })
    }

    /// Two predicates combined with `and` (`conjunction`) or `or`, then branch on
    /// the combination being set or clear.
    fn fp_branch_two(
        &mut self,
        w: FpWidth,
        first: (FpPredicate, Fpr, Fpr),
        second: (FpPredicate, Fpr, Fpr),
        conjunction: bool,
        when_set: bool,
    ) -> Reloc {
        let t0 = self.get_temp_gpr();
        let t1 = self.get_temp_gpr();
        self.emit_u32_with_pool((first.0)(w, t0, first.1, first.2));
        self.emit_u32_with_pool((second.0)(w, t1, second.1, second.2));
        if conjunction {
            self.andr(t0, t0, t1);
        } else {
            self.orr(t0, t0, t1);
        }
        let reloc = if when_set {
            self.bner(t0, Gpr::ZERO)
        } else {
            self.beqr(t0, Gpr::ZERO)
        };
        self.unget_temp_gpr(t1);
        self.unget_temp_gpr(t0);
        reloc
    }

    // ==== ARITHMETIC AND MOVES ====

    pub fn fp_movr(&mut self, w: FpWidth, r0: Fpr, r1: Fpr) {
        if r0 != r1 {
            self.emit_u32_with_pool(insn::fmv(w, r0, r1));
        }
    }

    /// Load raw IEEE bits into `r0` through a scratch GPR.
    pub fn fp_movi_bits(&mut self, w: FpWidth, r0: Fpr, bits: u64) {
        let value = match w {
            FpWidth::Single => bits as u32 as i32 as i64,
            FpWidth::Double => bits as i64,
        };
        self.with_imm(value, |jit, t| jit.emit_u32_with_pool(insn::fmv_from_int(w, r0, t)));
    }

    // ==== MEMORY ====

    pub fn fp_load(&mut self, w: FpWidth, r0: Fpr, base: Gpr, off: i64) {
        if simm12_p(off) {
            self.emit_u32_with_pool(insn::fload(w, r0, base, off));
        } else {
            self.with_temp(|jit, t| {
                jit.addi(t, base, off);
                jit.emit_u32_with_pool(insn::fload(w, r0, t, 0));
            });
        }
    }

    pub fn fp_store(&mut self, w: FpWidth, base: Gpr, src: Fpr, off: i64) {
        if simm12_p(off) {
            self.emit_u32_with_pool(insn::fstore(w, base, src, off));
        } else {
            self.with_temp(|jit, t| {
                jit.addi(t, base, off);
                jit.emit_u32_with_pool(insn::fstore(w, t, src, 0));
            });
        }
    }

    fn fp_load_absolute(&mut self, w: FpWidth, r0: Fpr, addr: i64) {
        if simm12_p(addr) {
            self.emit_u32_with_pool(insn::fload(w, r0, Gpr::ZERO, addr));
        } else {
            self.with_imm(addr, |jit, t| jit.emit_u32_with_pool(insn::fload(w, r0, t, 0)));
        }
    }

    fn fp_store_absolute(&mut self, w: FpWidth, addr: i64, src: Fpr) {
        if simm12_p(addr) {
            self.emit_u32_with_pool(insn::fstore(w, Gpr::ZERO, src, addr));
        } else {
            self.with_imm(addr, |jit, t| jit.emit_u32_with_pool(insn::fstore(w, t, src, 0)));
        }
    }

    fn fp_load_indexed(&mut self, w: FpWidth, r0: Fpr, base: Gpr, index: Gpr) {
        self.with_temp(|jit, t| {
            jit.addr(t, base, index);
            jit.emit_u32_with_pool(insn::fload(w, r0, t, 0));
        });
    }

    fn fp_store_indexed(&mut self, w: FpWidth, base: Gpr, index: Gpr, src: Fpr) {
        self.with_temp(|jit, t| {
            jit.addr(t, base, index);
            jit.emit_u32_with_pool(insn::fstore(w, t, src, 0));
        });
    }

    // ==== CONVERSIONS ====

    /// Convert double to single precision.
    pub fn extr_d_f(&mut self, r0: Fpr, r1: Fpr) {
        self.emit_u32_with_pool(insn::fcvt_s_d(r0, r1));
    }

    /// Convert single to double precision.
    pub fn extr_f_d(&mut self, r0: Fpr, r1: Fpr) {
        self.emit_u32_with_pool(insn::fcvt_d_s(r0, r1));
    }
}

macro_rules! fp_ops {
    (
        $w:expr;
        $addr:ident, $subr:ident, $mulr:ident, $divr:ident, $sqrtr:ident, $negr:ident, $absr:ident;
        $movr:ident, $movi:ident: $imm:ty;
        $ldr:ident, $ldi:ident, $ldxr:ident, $ldxi:ident, $str:ident, $sti:ident, $stxr:ident, $stxi:ident;
        $truncr_i:ident, $truncr_l:ident, $extr:ident;
        $retr:ident, $retval:ident;
        $($bname:ident => $cond:ident),* $(,)?
    ) => {
        impl Jit<'_> {
            pub fn $addr(&mut self, r0: Fpr, r1: Fpr, r2: Fpr) {
                self.emit_u32_with_pool(insn::fadd($w, r0, r1, r2));
            }

            pub fn $subr(&mut self, r0: Fpr, r1: Fpr, r2: Fpr) {
                self.emit_u32_with_pool(insn::fsub($w, r0, r1, r2));
            }

            pub fn $mulr(&mut self, r0: Fpr, r1: Fpr, r2: Fpr) {
                self.emit_u32_with_pool(insn::fmul($w, r0, r1, r2));
            }

            pub fn $divr(&mut self, r0: Fpr, r1: Fpr, r2: Fpr) {
                self.emit_u32_with_pool(insn::fdiv($w, r0, r1, r2));
            }

            pub fn $sqrtr(&mut self, r0: Fpr, r1: Fpr) {
                self.emit_u32_with_pool(insn::fsqrt($w, r0, r1));
            }

            pub fn $negr(&mut self, r0: Fpr, r1: Fpr) {
                self.emit_u32_with_pool(insn::fneg($w, r0, r1));
            }

            pub fn $absr(&mut self, r0: Fpr, r1: Fpr) {
                self.emit_u32_with_pool(insn::fabs($w, r0, r1));
            }

            pub fn $movr(&mut self, r0: Fpr, r1: Fpr) {
                self.fp_movr($w, r0, r1);
            }

            pub fn $movi(&mut self, r0: Fpr, i0: $imm) {
                self.fp_movi_bits($w, r0, i0.to_bits() as u64);
            }

            pub fn $ldr(&mut self, r0: Fpr, r1: Gpr) {
                self.fp_load($w, r0, r1, 0);
            }

            pub fn $ldi(&mut self, r0: Fpr, i0: i64) {
                self.fp_load_absolute($w, r0, i0);
            }

            pub fn $ldxr(&mut self, r0: Fpr, r1: Gpr, r2: Gpr) {
                self.fp_load_indexed($w, r0, r1, r2);
            }

            pub fn $ldxi(&mut self, r0: Fpr, r1: Gpr, i0: i64) {
                self.fp_load($w, r0, r1, i0);
            }

            pub fn $str(&mut self, r0: Gpr, r1: Fpr) {
                self.fp_store($w, r0, r1, 0);
            }

            pub fn $sti(&mut self, i0: i64, r0: Fpr) {
                self.fp_store_absolute($w, i0, r0);
            }

            pub fn $stxr(&mut self, r0: Gpr, r1: Gpr, r2: Fpr) {
                self.fp_store_indexed($w, r0, r1, r2);
            }

            pub fn $stxi(&mut self, i0: i64, r0: Gpr, r1: Fpr) {
                self.fp_store($w, r0, r1, i0);
            }

            /// Truncate toward zero into a 32-bit integer.
            pub fn $truncr_i(&mut self, r0: Gpr, r1: Fpr) {
                self.emit_u32_with_pool(insn::fcvt_to_int($w, IntWidth::W, r0, r1, RM_RTZ));
            }

            /// Truncate toward zero into a 64-bit integer.
            pub fn $truncr_l(&mut self, r0: Gpr, r1: Fpr) {
                self.emit_u32_with_pool(insn::fcvt_to_int($w, IntWidth::L, r0, r1, RM_RTZ));
            }

            /// Convert a signed 64-bit integer.
            pub fn $extr(&mut self, r0: Fpr, r1: Gpr) {
                self.emit_u32_with_pool(insn::fcvt_from_int($w, IntWidth::L, r0, r1, RM_RNE));
            }

            pub fn $retr(&mut self, r0: Fpr) {
                self.fp_movr($w, Fpr::FA0, r0);
                self.ret();
            }

            pub fn $retval(&mut self, r0: Fpr) {
                self.fp_movr($w, r0, Fpr::FA0);
            }

            $(
                pub fn $bname(&mut self, r0: Fpr, r1: Fpr) -> Reloc {
                    self.fp_branch($w, FpCond::$cond, r0, r1)
                }
            )*
        }
    };
}

fp_ops! {
    FpWidth::Single;
    addr_f, subr_f, mulr_f, divr_f, sqrtr_f, negr_f, absr_f;
    movr_f, movi_f: f32;
    ldr_f, ldi_f, ldxr_f, ldxi_f, str_f, sti_f, stxr_f, stxi_f;
    truncr_f_i, truncr_f_l, extr_f;
    retr_f, retval_f;
    bltr_f => Lt, bler_f => Le, beqr_f => Eq, bger_f => Ge, bgtr_f => Gt, bner_f => Ne,
    bunltr_f => Unlt, bunler_f => Unle, buneqr_f => Uneq, bunger_f => Unge, bungtr_f => Ungt,
    bltgtr_f => Ltgt, bordr_f => Ord, bunordr_f => Unord,
}

fp_ops! {
    FpWidth::Double;
    addr_d, subr_d, mulr_d, divr_d, sqrtr_d, negr_d, absr_d;
    movr_d, movi_d: f64;
    ldr_d, ldi_d, ldxr_d, ldxi_d, str_d, sti_d, stxr_d, stxi_d;
    truncr_d_i, truncr_d_l, extr_d;
    retr_d, retval_d;
    bltr_d => Lt, bler_d => Le, beqr_d => Eq, bger_d => Ge, bgtr_d => Gt, bner_d => Ne,
    bunltr_d => Unlt, bunler_d => Unle, buneqr_d => Uneq, bunger_d => Unge, bungtr_d => Ungt,
    bltgtr_d => Ltgt, bordr_d => Ord, bunordr_d => Unord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CodeBuffer, JitConfig};
    use bumpalo::Bump;

    #[test]
    fn test_truth_table_reference() {
        let nan = f64::NAN;
        assert!(FpCond::Unlt.holds(nan, 1.0));
        assert!(!FpCond::Lt.holds(nan, 1.0));
        assert!(FpCond::Ne.holds(nan, nan));
        assert!(!FpCond::Ltgt.holds(1.0, 1.0));
        assert!(FpCond::Ltgt.holds(1.0, 2.0));
        assert!(FpCond::Unord.holds(1.0, nan));
    }

    #[test]
    fn test_two_predicate_branches_return_both_temps() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        for cond in [FpCond::Uneq, FpCond::Ltgt, FpCond::Ord, FpCond::Unord] {
            let r = jit.fp_branch(FpWidth::Double, cond, Fpr::FA0, Fpr::FA1);
            assert_eq!(jit.temps_in_use(), 0);
            jit.patch_here(r);
        }
        let code = jit.end().unwrap();
        assert_eq!(code.stats().max_temps, 2);
    }

    #[test]
    fn test_truncation_rounds_toward_zero() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        jit.truncr_d_l(Gpr::A0, Fpr::FA0);
        let code = jit.end().unwrap();
        let w = u32::from_le_bytes(code.bytes()[0..4].try_into().unwrap());
        assert_eq!(crate::riscv::encoding::funct3(w), RM_RTZ);
    }
}
