//! Integer compare-and-branch, overflow branches, jumps, calls and returns.
//!
//! Every conditional branch is emitted through the relocation manager and hands
//! back a [`Reloc`] to be patched once the target is known. Relations without a
//! native branch are built by swapping operands; mask tests and overflow checks
//! compute a predicate into scratch registers first.

use super::insn;
use super::jit::Jit;
use super::regs::Gpr;
use super::reloc::{offset_in_jmp_range, Reloc};

impl Jit<'_> {
    /// Branch with an immediate right-hand side; zero needs no scratch register.
    fn branch_imm(&mut self, r0: Gpr, i0: i64, f: impl FnOnce(&mut Self, Gpr, Gpr) -> Reloc) -> Reloc {
        if i0 == 0 {
            f(self, r0, Gpr::ZERO)
        } else {
            self.with_imm(i0, |jit, t| f(jit, r0, t))
        }
    }

    // ==== COMPARE AND BRANCH ====

    pub fn bltr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::blt(r0, r1, 0))
    }

    pub fn blti(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bltr)
    }

    pub fn bltr_u(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::bltu(r0, r1, 0))
    }

    pub fn blti_u(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bltr_u)
    }

    pub fn bler(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::bge(r1, r0, 0))
    }

    pub fn blei(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bler)
    }

    pub fn bler_u(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::bgeu(r1, r0, 0))
    }

    pub fn blei_u(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bler_u)
    }

    pub fn beqr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::beq(r0, r1, 0))
    }

    pub fn beqi(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::beqr)
    }

    pub fn bger(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::bge(r0, r1, 0))
    }

    pub fn bgei(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bger)
    }

    pub fn bger_u(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::bgeu(r0, r1, 0))
    }

    pub fn bgei_u(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bger_u)
    }

    pub fn bgtr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::blt(r1, r0, 0))
    }

    pub fn bgti(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bgtr)
    }

    pub fn bgtr_u(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::bltu(r1, r0, 0))
    }

    pub fn bgti_u(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bgtr_u)
    }

    pub fn bner(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.emit_cc_jump(insn::bne(r0, r1, 0))
    }

    pub fn bnei(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.branch_imm(r0, i0, Self::bner)
    }

    /// Branch if `r0 & r1` has any bit set.
    pub fn bmsr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.with_temp(|jit, t| {
            jit.andr(t, r0, r1);
            jit.bner(t, Gpr::ZERO)
        })
    }

    pub fn bmsi(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_temp(|jit, t| {
            jit.andi(t, r0, i0);
            jit.bner(t, Gpr::ZERO)
        })
    }

    /// Branch if `r0 & r1` is zero.
    pub fn bmcr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.with_temp(|jit, t| {
            jit.andr(t, r0, r1);
            jit.beqr(t, Gpr::ZERO)
        })
    }

    pub fn bmci(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_temp(|jit, t| {
            jit.andi(t, r0, i0);
            jit.beqr(t, Gpr::ZERO)
        })
    }

    // ==== OVERFLOW BRANCHES ====
    //
    // `r0` always receives the wrapped result. Signed overflow happened iff the
    // sign of the second operand disagrees with "result moved the wrong way".

    fn signed_overflow_branch(&mut self, r0: Gpr, r1: Gpr, sub: bool, on_overflow: bool) -> Reloc {
        let t0 = self.get_temp_gpr();
        let t1 = self.get_temp_gpr();
        let t2 = self.get_temp_gpr();
        if sub {
            self.subr(t0, r0, r1);
            self.emit_u32_with_pool(insn::slti(t1, r1, 0));
            self.emit_u32_with_pool(insn::slt(t2, r0, t0));
        } else {
            self.addr(t0, r0, r1);
            self.emit_u32_with_pool(insn::slti(t1, r1, 0));
            self.emit_u32_with_pool(insn::slt(t2, t0, r0));
        }
        self.movr(r0, t0);
        let reloc = if on_overflow {
            self.bner(t1, t2)
        } else {
            self.beqr(t1, t2)
        };
        self.unget_temp_gpr(t2);
        self.unget_temp_gpr(t1);
        self.unget_temp_gpr(t0);
        reloc
    }

    fn unsigned_overflow_branch(&mut self, r0: Gpr, r1: Gpr, sub: bool, on_overflow: bool) -> Reloc {
        let t0 = self.get_temp_gpr();
        let t1 = self.get_temp_gpr();
        if sub {
            self.subr(t0, r0, r1);
            self.emit_u32_with_pool(insn::sltu(t1, r0, t0));
        } else {
            self.addr(t0, r0, r1);
            self.emit_u32_with_pool(insn::sltu(t1, t0, r0));
        }
        self.movr(r0, t0);
        let reloc = if on_overflow {
            self.bner(t1, Gpr::ZERO)
        } else {
            self.beqr(t1, Gpr::ZERO)
        };
        self.unget_temp_gpr(t1);
        self.unget_temp_gpr(t0);
        reloc
    }

    /// `r0 += r1`; branch if the signed addition overflowed.
    pub fn boaddr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.signed_overflow_branch(r0, r1, false, true)
    }

    pub fn boaddi(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_imm(i0, |jit, t| jit.boaddr(r0, t))
    }

    pub fn boaddr_u(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.unsigned_overflow_branch(r0, r1, false, true)
    }

    pub fn boaddi_u(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_imm(i0, |jit, t| jit.boaddr_u(r0, t))
    }

    /// `r0 += r1`; branch if the signed addition did not overflow.
    pub fn bxaddr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.signed_overflow_branch(r0, r1, false, false)
    }

    pub fn bxaddi(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_imm(i0, |jit, t| jit.bxaddr(r0, t))
    }

    pub fn bxaddr_u(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.unsigned_overflow_branch(r0, r1, false, false)
    }

    pub fn bxaddi_u(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_imm(i0, |jit, t| jit.bxaddr_u(r0, t))
    }

    /// `r0 -= r1`; branch if the signed subtraction overflowed.
    pub fn bosubr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.signed_overflow_branch(r0, r1, true, true)
    }

    pub fn bosubi(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_imm(i0, |jit, t| jit.bosubr(r0, t))
    }

    pub fn bosubr_u(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.unsigned_overflow_branch(r0, r1, true, true)
    }

    pub fn bosubi_u(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_imm(i0, |jit, t| jit.bosubr_u(r0, t))
    }

    pub fn bxsubr(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.signed_overflow_branch(r0, r1, true, false)
    }

    pub fn bxsubi(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_imm(i0, |jit, t| jit.bxsubr(r0, t))
    }

    pub fn bxsubr_u(&mut self, r0: Gpr, r1: Gpr) -> Reloc {
        self.unsigned_overflow_branch(r0, r1, true, false)
    }

    pub fn bxsubi_u(&mut self, r0: Gpr, i0: i64) -> Reloc {
        self.with_imm(i0, |jit, t| jit.bxsubr_u(r0, t))
    }

    // ==== JUMPS AND CALLS ====

    pub fn jmpr(&mut self, r0: Gpr) {
        self.emit_u32_with_pool(insn::jalr(Gpr::ZERO, r0, 0));
    }

    /// Jump to an absolute address: `jal` when in reach, else through a scratch register.
    pub fn jmpi(&mut self, i0: u64) {
        self.jump_absolute(Gpr::ZERO, i0);
    }

    pub fn callr(&mut self, r0: Gpr) {
        self.emit_u32_with_pool(insn::jalr(Gpr::RA, r0, 0));
    }

    pub fn calli(&mut self, i0: u64) {
        self.jump_absolute(Gpr::RA, i0);
    }

    pub fn jmpi_with_link(&mut self, i0: u64) {
        self.calli(i0);
    }

    fn jump_absolute(&mut self, link: Gpr, target: u64) {
        let diff = target.wrapping_sub(self.address()) as i64;
        if offset_in_jmp_range(diff) {
            self.emit_u32_with_pool(insn::jal(link, diff));
        } else {
            self.with_temp(|jit, t| {
                jit.movi_u64(t, target);
                jit.emit_u32_with_pool(insn::jalr(link, t, 0));
            });
        }
    }

    // ==== RETURNS ====

    pub fn ret(&mut self) {
        self.emit_u32_with_pool(insn::ret());
    }

    pub fn retr(&mut self, r0: Gpr) {
        self.movr(Gpr::A0, r0);
        self.ret();
    }

    pub fn reti(&mut self, i0: i64) {
        self.movi(Gpr::A0, i0);
        self.ret();
    }

    pub fn retval_c(&mut self, r0: Gpr) {
        self.extr_c(r0, Gpr::A0);
    }

    pub fn retval_uc(&mut self, r0: Gpr) {
        self.extr_uc(r0, Gpr::A0);
    }

    pub fn retval_s(&mut self, r0: Gpr) {
        self.extr_s(r0, Gpr::A0);
    }

    pub fn retval_us(&mut self, r0: Gpr) {
        self.extr_us(r0, Gpr::A0);
    }

    pub fn retval_i(&mut self, r0: Gpr) {
        self.extr_i(r0, Gpr::A0);
    }

    pub fn retval_ui(&mut self, r0: Gpr) {
        self.extr_ui(r0, Gpr::A0);
    }

    pub fn retval_l(&mut self, r0: Gpr) {
        self.movr(r0, Gpr::A0);
    }

    // ==== MISC ====

    /// Emit `bytes / 4` nops.
    pub fn nop(&mut self, bytes: usize) {
        assert!(bytes % 4 == 0, "nop size {bytes} is not a multiple of 4");
        for _ in 0..bytes / 4 {
            self.emit_u32_with_pool(insn::nop());
        }
    }

    pub fn breakpoint(&mut self) {
        self.emit_u32_with_pool(insn::ebreak());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CodeBuffer, JitConfig};
    use crate::riscv::encoding::{b_imm, funct3, opcode, rs1, rs2};
    use bumpalo::Bump;

    #[test]
    fn test_ble_swaps_operands() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        let r = jit.bler(Gpr::A0, Gpr::A1);
        jit.patch_here(r);
        let code = jit.end().unwrap();
        let w = u32::from_le_bytes(code.bytes()[0..4].try_into().unwrap());
        assert_eq!(opcode(w), insn::OP_BRANCH);
        assert_eq!(funct3(w), 5); // bge
        assert_eq!((rs1(w), rs2(w)), (Gpr::A1.regno(), Gpr::A0.regno()));
        assert_eq!(b_imm(w), 4);
    }

    #[test]
    fn test_branch_against_zero_needs_no_temp() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        let r = jit.beqi(Gpr::A0, 0);
        jit.patch_here(r);
        let code = jit.end().unwrap();
        assert_eq!(code.len(), 4);
        assert_eq!(code.stats().max_temps, 0);
    }

    #[test]
    fn test_near_call_is_single_jal() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        let target = jit.address();
        jit.ret();
        jit.calli(target);
        let code = jit.end().unwrap();
        let w = u32::from_le_bytes(code.bytes()[4..8].try_into().unwrap());
        assert_eq!(w, insn::jal(Gpr::RA, -4));
    }

    #[test]
    #[should_panic(expected = "multiple of 4")]
    fn test_nop_size_must_be_whole_instructions() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        jit.nop(6);
    }
}
