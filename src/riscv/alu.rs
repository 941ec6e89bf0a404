//! Integer arithmetic, logic, moves and comparisons.
//!
//! Register forms map to one instruction wherever the ISA has it. Immediate forms
//! use the native immediate encoding when the value fits and otherwise load it into
//! a scratch register and fall back to the register form. Carries live in the
//! [`CARRY`] register between the limbs of extended arithmetic.

use super::encoding::simm12_p;
use super::insn;
use super::jit::Jit;
use super::regs::{Gpr, CARRY};

impl Jit<'_> {
    // ==== ADD / SUB ====

    pub fn addr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::add(r0, r1, r2));
    }

    pub fn addi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        if simm12_p(i0) {
            self.emit_u32_with_pool(insn::addi(r0, r1, i0));
        } else {
            self.with_imm(i0, |jit, t| jit.addr(r0, r1, t));
        }
    }

    /// `r0 = r1 + r2`, carry out in [`CARRY`].
    pub fn addcr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        if r0 == r1 {
            self.with_temp(|jit, t| {
                jit.addr(t, r1, r2);
                jit.emit_u32_with_pool(insn::sltu(CARRY, t, r1));
                jit.movr(r0, t);
            });
        } else {
            self.addr(r0, r1, r2);
            self.emit_u32_with_pool(insn::sltu(CARRY, r0, r1));
        }
    }

    pub fn addci(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.addcr(r0, r1, t));
    }

    /// `r0 = r1 + r2 + CARRY`, carry out in [`CARRY`].
    pub fn addxr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        let carry_in = self.get_temp_gpr();
        self.movr(carry_in, CARRY);
        self.addcr(r0, r1, r2);
        let carry_first = self.get_temp_gpr();
        self.movr(carry_first, CARRY);
        self.addcr(r0, r0, carry_in);
        // At most one of the two carries is set.
        self.orr(CARRY, CARRY, carry_first);
        self.unget_temp_gpr(carry_first);
        self.unget_temp_gpr(carry_in);
    }

    pub fn addxi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.addxr(r0, r1, t));
    }

    pub fn subr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::sub(r0, r1, r2));
    }

    pub fn subi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        let neg = i0.wrapping_neg();
        if simm12_p(neg) {
            self.emit_u32_with_pool(insn::addi(r0, r1, neg));
        } else {
            self.with_imm(i0, |jit, t| jit.subr(r0, r1, t));
        }
    }

    /// `r0 = r1 - r2`, borrow out in [`CARRY`].
    pub fn subcr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        if r0 == r1 {
            self.with_temp(|jit, t| {
                jit.subr(t, r1, r2);
                jit.emit_u32_with_pool(insn::sltu(CARRY, r1, t));
                jit.movr(r0, t);
            });
        } else {
            self.subr(r0, r1, r2);
            self.emit_u32_with_pool(insn::sltu(CARRY, r1, r0));
        }
    }

    pub fn subci(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.subcr(r0, r1, t));
    }

    /// `r0 = r1 - r2 - CARRY`, borrow out in [`CARRY`].
    pub fn subxr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        let borrow_in = self.get_temp_gpr();
        self.movr(borrow_in, CARRY);
        self.subcr(r0, r1, r2);
        let borrow_first = self.get_temp_gpr();
        self.movr(borrow_first, CARRY);
        self.subcr(r0, r0, borrow_in);
        self.orr(CARRY, CARRY, borrow_first);
        self.unget_temp_gpr(borrow_first);
        self.unget_temp_gpr(borrow_in);
    }

    pub fn subxi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.subxr(r0, r1, t));
    }

    pub fn negr(&mut self, r0: Gpr, r1: Gpr) {
        self.emit_u32_with_pool(insn::neg(r0, r1));
    }

    pub fn comr(&mut self, r0: Gpr, r1: Gpr) {
        self.emit_u32_with_pool(insn::not(r0, r1));
    }

    // ==== MUL / DIV ====

    pub fn mulr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::mul(r0, r1, r2));
    }

    pub fn muli(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.mulr(r0, r1, t));
    }

    pub fn divr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::div(r0, r1, r2));
    }

    pub fn divi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.divr(r0, r1, t));
    }

    pub fn divr_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::divu(r0, r1, r2));
    }

    pub fn divi_u(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.divr_u(r0, r1, t));
    }

    pub fn remr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::rem(r0, r1, r2));
    }

    pub fn remi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.remr(r0, r1, t));
    }

    pub fn remr_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::remu(r0, r1, r2));
    }

    pub fn remi_u(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.remr_u(r0, r1, t));
    }

    /// Emit the pair `lo_op r0, r2, r3` and `hi_op r1, r2, r3`, going through a
    /// scratch register when `r0` would clobber an input of the second one.
    fn double_width(
        &mut self,
        r0: Gpr,
        r1: Gpr,
        r2: Gpr,
        r3: Gpr,
        lo_op: fn(Gpr, Gpr, Gpr) -> u32,
        hi_op: fn(Gpr, Gpr, Gpr) -> u32,
    ) {
        assert_ne!(r0, r1, "double-width result halves must be distinct registers");
        if r0 == r2 || r0 == r3 {
            self.with_temp(|jit, t| {
                jit.emit_u32_with_pool(lo_op(t, r2, r3));
                jit.emit_u32_with_pool(hi_op(r1, r2, r3));
                jit.movr(r0, t);
            });
        } else {
            self.emit_u32_with_pool(lo_op(r0, r2, r3));
            self.emit_u32_with_pool(hi_op(r1, r2, r3));
        }
    }

    /// Full product of `r2 * r3`: low half in `r0`, high half in `r1`.
    pub fn qmulr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr, r3: Gpr) {
        self.double_width(r0, r1, r2, r3, insn::mul, insn::mulh);
    }

    pub fn qmulr_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr, r3: Gpr) {
        self.double_width(r0, r1, r2, r3, insn::mul, insn::mulhu);
    }

    pub fn qmuli(&mut self, r0: Gpr, r1: Gpr, r2: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.qmulr(r0, r1, r2, t));
    }

    pub fn qmuli_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.qmulr_u(r0, r1, r2, t));
    }

    /// Quotient of `r2 / r3` in `r0`, remainder in `r1`.
    pub fn qdivr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr, r3: Gpr) {
        self.double_width(r0, r1, r2, r3, insn::div, insn::rem);
    }

    pub fn qdivr_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr, r3: Gpr) {
        self.double_width(r0, r1, r2, r3, insn::divu, insn::remu);
    }

    pub fn qdivi(&mut self, r0: Gpr, r1: Gpr, r2: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.qdivr(r0, r1, r2, t));
    }

    pub fn qdivi_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.qdivr_u(r0, r1, r2, t));
    }

    // ==== LOGIC / SHIFTS ====

    pub fn andr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::and(r0, r1, r2));
    }

    pub fn andi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        if simm12_p(i0) {
            self.emit_u32_with_pool(insn::andi(r0, r1, i0));
        } else {
            self.with_imm(i0, |jit, t| jit.andr(r0, r1, t));
        }
    }

    pub fn orr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::or(r0, r1, r2));
    }

    pub fn ori(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        if simm12_p(i0) {
            self.emit_u32_with_pool(insn::ori(r0, r1, i0));
        } else {
            self.with_imm(i0, |jit, t| jit.orr(r0, r1, t));
        }
    }

    pub fn xorr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::xor(r0, r1, r2));
    }

    pub fn xori(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        if simm12_p(i0) {
            self.emit_u32_with_pool(insn::xori(r0, r1, i0));
        } else {
            self.with_imm(i0, |jit, t| jit.xorr(r0, r1, t));
        }
    }

    pub fn lshr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::sll(r0, r1, r2));
    }

    pub fn lshi(&mut self, r0: Gpr, r1: Gpr, i0: u32) {
        self.emit_u32_with_pool(insn::slli(r0, r1, i0));
    }

    pub fn rshr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::sra(r0, r1, r2));
    }

    pub fn rshi(&mut self, r0: Gpr, r1: Gpr, i0: u32) {
        self.emit_u32_with_pool(insn::srai(r0, r1, i0));
    }

    pub fn rshr_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::srl(r0, r1, r2));
    }

    pub fn rshi_u(&mut self, r0: Gpr, r1: Gpr, i0: u32) {
        self.emit_u32_with_pool(insn::srli(r0, r1, i0));
    }

    // ==== MOVES / EXTENSIONS ====

    pub fn movr(&mut self, r0: Gpr, r1: Gpr) {
        if r0 != r1 {
            self.emit_u32_with_pool(insn::mv(r0, r1));
        }
    }

    fn extend(&mut self, r0: Gpr, r1: Gpr, bits: u32, signed: bool) {
        let shift = 64 - bits;
        self.lshi(r0, r1, shift);
        if signed {
            self.rshi(r0, r0, shift);
        } else {
            self.rshi_u(r0, r0, shift);
        }
    }

    pub fn extr_c(&mut self, r0: Gpr, r1: Gpr) {
        self.extend(r0, r1, 8, true);
    }

    pub fn extr_uc(&mut self, r0: Gpr, r1: Gpr) {
        self.extend(r0, r1, 8, false);
    }

    pub fn extr_s(&mut self, r0: Gpr, r1: Gpr) {
        self.extend(r0, r1, 16, true);
    }

    pub fn extr_us(&mut self, r0: Gpr, r1: Gpr) {
        self.extend(r0, r1, 16, false);
    }

    pub fn extr_i(&mut self, r0: Gpr, r1: Gpr) {
        self.extend(r0, r1, 32, true);
    }

    pub fn extr_ui(&mut self, r0: Gpr, r1: Gpr) {
        self.extend(r0, r1, 32, false);
    }

    /// Reverse the low `size` bytes of `r1` into `r0`, zero-extended.
    fn bswapr_uany(&mut self, r0: Gpr, r1: Gpr, size: u32) {
        let byte = self.get_temp_gpr();
        let acc = if r0 == r1 { self.get_temp_gpr() } else { r0 };
        self.andi(acc, r1, 0xff);
        for i in 1..size {
            self.lshi(acc, acc, 8);
            self.rshi_u(byte, r1, 8 * i);
            self.andi(byte, byte, 0xff);
            self.orr(acc, acc, byte);
        }
        if acc != r0 {
            self.movr(r0, acc);
            self.unget_temp_gpr(acc);
        }
        self.unget_temp_gpr(byte);
    }

    pub fn bswapr_us(&mut self, r0: Gpr, r1: Gpr) {
        self.bswapr_uany(r0, r1, 2);
    }

    pub fn bswapr_ui(&mut self, r0: Gpr, r1: Gpr) {
        self.bswapr_uany(r0, r1, 4);
    }

    pub fn bswapr_ul(&mut self, r0: Gpr, r1: Gpr) {
        self.bswapr_uany(r0, r1, 8);
    }

    // ==== COMPARISONS ====

    pub fn ltr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::slt(r0, r1, r2));
    }

    pub fn lti(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        if simm12_p(i0) {
            self.emit_u32_with_pool(insn::slti(r0, r1, i0));
        } else {
            self.with_imm(i0, |jit, t| jit.ltr(r0, r1, t));
        }
    }

    pub fn ltr_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::sltu(r0, r1, r2));
    }

    pub fn lti_u(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        if simm12_p(i0) {
            self.emit_u32_with_pool(insn::sltiu(r0, r1, i0));
        } else {
            self.with_imm(i0, |jit, t| jit.ltr_u(r0, r1, t));
        }
    }

    pub fn ler(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::slt(r0, r2, r1));
        self.emit_u32_with_pool(insn::xori(r0, r0, 1));
    }

    pub fn lei(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.ler(r0, r1, t));
    }

    pub fn ler_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::sltu(r0, r2, r1));
        self.emit_u32_with_pool(insn::xori(r0, r0, 1));
    }

    pub fn lei_u(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.ler_u(r0, r1, t));
    }

    pub fn eqr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.subr(r0, r1, r2);
        self.emit_u32_with_pool(insn::seqz(r0, r0));
    }

    pub fn eqi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.subi(r0, r1, i0);
        self.emit_u32_with_pool(insn::seqz(r0, r0));
    }

    pub fn ger(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::slt(r0, r1, r2));
        self.emit_u32_with_pool(insn::xori(r0, r0, 1));
    }

    pub fn gei(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.lti(r0, r1, i0);
        self.emit_u32_with_pool(insn::xori(r0, r0, 1));
    }

    pub fn ger_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::sltu(r0, r1, r2));
        self.emit_u32_with_pool(insn::xori(r0, r0, 1));
    }

    pub fn gei_u(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.lti_u(r0, r1, i0);
        self.emit_u32_with_pool(insn::xori(r0, r0, 1));
    }

    pub fn gtr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::slt(r0, r2, r1));
    }

    pub fn gti(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.gtr(r0, r1, t));
    }

    pub fn gtr_u(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.emit_u32_with_pool(insn::sltu(r0, r2, r1));
    }

    pub fn gti_u(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.with_imm(i0, |jit, t| jit.gtr_u(r0, r1, t));
    }

    pub fn ner(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
        self.subr(r0, r1, r2);
        self.emit_u32_with_pool(insn::snez(r0, r0));
    }

    pub fn nei(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
        self.subi(r0, r1, i0);
        self.emit_u32_with_pool(insn::snez(r0, r0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CodeBuffer, JitConfig};
    use bumpalo::Bump;

    fn words(f: impl FnOnce(&mut Jit<'_>)) -> Vec<u32> {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        f(&mut jit);
        let code = jit.end().unwrap();
        code.bytes()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_small_immediate_is_native() {
        assert_eq!(
            words(|j| j.addi(Gpr::A0, Gpr::A1, 2047)),
            vec![insn::addi(Gpr::A0, Gpr::A1, 2047)]
        );
        assert_eq!(
            words(|j| j.subi(Gpr::A0, Gpr::A1, 2048)),
            vec![insn::addi(Gpr::A0, Gpr::A1, -2048)]
        );
    }

    #[test]
    fn test_large_immediate_uses_temp() {
        let w = words(|j| j.andi(Gpr::A0, Gpr::A1, 0x1000));
        assert_eq!(w, vec![insn::lui(Gpr::T1, 1), insn::and(Gpr::A0, Gpr::A1, Gpr::T1)]);
    }

    #[test]
    fn test_addcr_sets_carry_from_sum() {
        assert_eq!(
            words(|j| j.addcr(Gpr::A0, Gpr::A1, Gpr::A2)),
            vec![insn::add(Gpr::A0, Gpr::A1, Gpr::A2), insn::sltu(CARRY, Gpr::A0, Gpr::A1)]
        );
    }

    #[test]
    fn test_subcr_subtracts() {
        assert_eq!(
            words(|j| j.subcr(Gpr::A0, Gpr::A1, Gpr::A2)),
            vec![insn::sub(Gpr::A0, Gpr::A1, Gpr::A2), insn::sltu(CARRY, Gpr::A1, Gpr::A0)]
        );
    }

    #[test]
    fn test_aliased_qmul_emits_once() {
        let w = words(|j| j.qmulr(Gpr::A0, Gpr::A1, Gpr::A0, Gpr::A2));
        assert_eq!(
            w,
            vec![
                insn::mul(Gpr::T1, Gpr::A0, Gpr::A2),
                insn::mulh(Gpr::A1, Gpr::A0, Gpr::A2),
                insn::mv(Gpr::A0, Gpr::T1),
            ]
        );
    }

    #[test]
    fn test_movr_same_register_is_empty() {
        assert!(words(|j| j.movr(Gpr::A0, Gpr::A0)).is_empty());
    }
}
