//! Atomic memory operations on machine words.

use super::insn::{self, FENCE_IORW_IORW};
use super::jit::Jit;
use super::regs::Gpr;

/// lr.d, bne, sc.d, bne.
const CAS_LOOP_SIZE: usize = 16;

impl Jit<'_> {
    /// Full memory barrier.
    pub fn mfence(&mut self) {
        self.emit_u32_with_pool(insn::fence(FENCE_IORW_IORW));
    }

    /// `dst = *loc` with full ordering.
    pub fn ldr_atomic(&mut self, dst: Gpr, loc: Gpr) {
        self.mfence();
        self.ldr_l(dst, loc);
        self.mfence();
    }

    /// `*loc = val` with full ordering.
    pub fn str_atomic(&mut self, loc: Gpr, val: Gpr) {
        self.mfence();
        self.str_l(loc, val);
        self.mfence();
    }

    /// `dst = *loc; *loc = val` as one atomic step.
    pub fn swap_atomic(&mut self, dst: Gpr, loc: Gpr, val: Gpr) {
        self.emit_u32_with_pool(insn::amoswap_d(dst, loc, val, true, true));
    }

    /// Compare-and-swap: if `*loc == expected`, store `desired`. `dst` receives
    /// the value found at `loc` either way.
    pub fn cas_atomic(&mut self, dst: Gpr, loc: Gpr, expected: Gpr, desired: Gpr) {
        let found = self.get_temp_gpr();
        let status = self.get_temp_gpr();

        // No pool flush may land between lr.d and sc.d, so the loop is
        // emitted with fixed displacements.
        self.reserve_pool_free_span(CAS_LOOP_SIZE);
        self.emit_u32(insn::lr_d(found, loc, false, false));
        self.emit_u32(insn::bne(found, expected, 12));
        self.emit_u32(insn::sc_d(status, loc, desired, false, false));
        self.emit_u32(insn::bne(status, Gpr::ZERO, -12));

        self.mfence();
        self.movr(dst, found);

        self.unget_temp_gpr(status);
        self.unget_temp_gpr(found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CodeBuffer, JitConfig};
    use crate::riscv::encoding::{b_imm, rs1, rs2};
    use bumpalo::Bump;

    #[test]
    fn test_cas_loop_shape() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        jit.cas_atomic(Gpr::A0, Gpr::A1, Gpr::A2, Gpr::A3);
        let code = jit.end().unwrap();
        let w: Vec<u32> = code
            .bytes()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(w.len(), 6);
        assert_eq!(w[0], insn::lr_d(Gpr::T1, Gpr::A1, false, false));
        // Mismatch skips the store and the retry branch.
        assert_eq!(b_imm(w[1]), 12);
        // sc.d stores `desired` to `loc`.
        assert_eq!((rs1(w[2]), rs2(w[2])), (Gpr::A1.regno(), Gpr::A3.regno()));
        assert_eq!(b_imm(w[3]), -12);
        assert_eq!(w[4], insn::fence(FENCE_IORW_IORW));
        assert_eq!(w[5], insn::mv(Gpr::A0, Gpr::T1));
    }

    #[test]
    fn test_pool_never_splits_reservation() {
        let lr = insn::lr_d(Gpr::T1, Gpr::A1, false, false);
        // Slide the loop across the deadline of a pending branch.
        for nops in 495..512 {
            let arena = Bump::new();
            let mut jit = Jit::new(&arena, JitConfig::default());
            jit.begin(CodeBuffer::new(4096).unwrap());
            let pending = jit.bner(Gpr::A0, Gpr::ZERO);
            for _ in 0..nops {
                jit.emit_u32_with_pool(insn::nop());
            }
            jit.cas_atomic(Gpr::A0, Gpr::A1, Gpr::A2, Gpr::A3);
            jit.patch_here(pending);
            jit.emit_u32_with_pool(insn::ret());
            let code = jit.end().unwrap();
            let w: Vec<u32> = code
                .bytes()
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            let i = w.iter().position(|&x| x == lr).expect("lr.d emitted");
            assert_eq!(b_imm(w[i + 1]), 12, "{nops} nops");
            assert_eq!(rs2(w[i + 2]), Gpr::A3.regno(), "{nops} nops");
            assert_eq!(b_imm(w[i + 3]), -12, "{nops} nops");
            assert_eq!(w[i + 4], insn::fence(FENCE_IORW_IORW), "{nops} nops");
        }
    }
}
