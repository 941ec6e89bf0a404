//! Integer loads and stores.
//!
//! Four addressing shapes per width: register (`*r`), absolute (`*i`), base plus
//! index register (`*xr`) and base plus displacement (`*xi`). Displacements and
//! absolute addresses outside the signed 12-bit range are formed in a register
//! first; loads use their own destination for that, stores borrow a scratch
//! register.

use super::encoding::simm12_p;
use super::insn;
use super::jit::Jit;
use super::regs::Gpr;

/// Access width and extension of an integer memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemWidth {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
}

impl MemWidth {
    pub const fn bytes(self) -> usize {
        match self {
            MemWidth::I8 | MemWidth::U8 => 1,
            MemWidth::I16 | MemWidth::U16 => 2,
            MemWidth::I32 | MemWidth::U32 => 4,
            MemWidth::I64 => 8,
        }
    }

    fn load(self, rd: Gpr, base: Gpr, off: i64) -> u32 {
        match self {
            MemWidth::I8 => insn::lb(rd, base, off),
            MemWidth::U8 => insn::lbu(rd, base, off),
            MemWidth::I16 => insn::lh(rd, base, off),
            MemWidth::U16 => insn::lhu(rd, base, off),
            MemWidth::I32 => insn::lw(rd, base, off),
            MemWidth::U32 => insn::lwu(rd, base, off),
            MemWidth::I64 => insn::ld(rd, base, off),
        }
    }

    fn store(self, base: Gpr, src: Gpr, off: i64) -> u32 {
        match self.bytes() {
            1 => insn::sb(base, src, off),
            2 => insn::sh(base, src, off),
            4 => insn::sw(base, src, off),
            _ => insn::sd(base, src, off),
        }
    }
}

impl Jit<'_> {
    /// `r0 = *(base + off)`.
    pub fn load(&mut self, width: MemWidth, r0: Gpr, base: Gpr, off: i64) {
        if simm12_p(off) {
            self.emit_u32_with_pool(width.load(r0, base, off));
        } else {
            self.addi(r0, base, off);
            self.emit_u32_with_pool(width.load(r0, r0, 0));
        }
    }

    /// `*(base + off) = src`.
    pub fn store(&mut self, width: MemWidth, base: Gpr, src: Gpr, off: i64) {
        if simm12_p(off) {
            self.emit_u32_with_pool(width.store(base, src, off));
        } else {
            self.with_temp(|jit, t| {
                jit.addi(t, base, off);
                jit.emit_u32_with_pool(width.store(t, src, 0));
            });
        }
    }

    fn load_indexed(&mut self, width: MemWidth, r0: Gpr, base: Gpr, index: Gpr) {
        self.addr(r0, base, index);
        self.emit_u32_with_pool(width.load(r0, r0, 0));
    }

    fn store_indexed(&mut self, width: MemWidth, base: Gpr, index: Gpr, src: Gpr) {
        self.with_temp(|jit, t| {
            jit.addr(t, base, index);
            jit.emit_u32_with_pool(width.store(t, src, 0));
        });
    }

    fn load_absolute(&mut self, width: MemWidth, r0: Gpr, addr: i64) {
        if simm12_p(addr) {
            self.emit_u32_with_pool(width.load(r0, Gpr::ZERO, addr));
        } else {
            self.movi(r0, addr);
            self.emit_u32_with_pool(width.load(r0, r0, 0));
        }
    }

    fn store_absolute(&mut self, width: MemWidth, addr: i64, src: Gpr) {
        if simm12_p(addr) {
            self.emit_u32_with_pool(width.store(Gpr::ZERO, src, addr));
        } else {
            self.with_imm(addr, |jit, t| jit.emit_u32_with_pool(width.store(t, src, 0)));
        }
    }
}

macro_rules! load_ops {
    ($($width:ident => $ldr:ident, $ldi:ident, $ldxr:ident, $ldxi:ident;)*) => {
        impl Jit<'_> {
            $(
                pub fn $ldr(&mut self, r0: Gpr, r1: Gpr) {
                    self.load(MemWidth::$width, r0, r1, 0);
                }

                pub fn $ldi(&mut self, r0: Gpr, i0: i64) {
                    self.load_absolute(MemWidth::$width, r0, i0);
                }

                pub fn $ldxr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
                    self.load_indexed(MemWidth::$width, r0, r1, r2);
                }

                pub fn $ldxi(&mut self, r0: Gpr, r1: Gpr, i0: i64) {
                    self.load(MemWidth::$width, r0, r1, i0);
                }
            )*
        }
    };
}

macro_rules! store_ops {
    ($($width:ident => $str:ident, $sti:ident, $stxr:ident, $stxi:ident;)*) => {
        impl Jit<'_> {
            $(
                /// Store `r1` at the address in `r0`.
                pub fn $str(&mut self, r0: Gpr, r1: Gpr) {
                    self.store(MemWidth::$width, r0, r1, 0);
                }

                pub fn $sti(&mut self, i0: i64, r0: Gpr) {
                    self.store_absolute(MemWidth::$width, i0, r0);
                }

                /// Store `r2` at `r0 + r1`.
                pub fn $stxr(&mut self, r0: Gpr, r1: Gpr, r2: Gpr) {
                    self.store_indexed(MemWidth::$width, r0, r1, r2);
                }

                /// Store `r1` at `r0 + i0`.
                pub fn $stxi(&mut self, i0: i64, r0: Gpr, r1: Gpr) {
                    self.store(MemWidth::$width, r0, r1, i0);
                }
            )*
        }
    };
}

load_ops! {
    I8 => ldr_c, ldi_c, ldxr_c, ldxi_c;
    U8 => ldr_uc, ldi_uc, ldxr_uc, ldxi_uc;
    I16 => ldr_s, ldi_s, ldxr_s, ldxi_s;
    U16 => ldr_us, ldi_us, ldxr_us, ldxi_us;
    I32 => ldr_i, ldi_i, ldxr_i, ldxi_i;
    U32 => ldr_ui, ldi_ui, ldxr_ui, ldxi_ui;
    I64 => ldr_l, ldi_l, ldxr_l, ldxi_l;
}

store_ops! {
    I8 => str_c, sti_c, stxr_c, stxi_c;
    I16 => str_s, sti_s, stxr_s, stxi_s;
    I32 => str_i, sti_i, stxr_i, stxi_i;
    I64 => str_l, sti_l, stxr_l, stxi_l;
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
    fn test_near_displacement_is_one_instruction() {
        assert_eq!(
            words(|j| j.ldxi_us(Gpr::A0, Gpr::A1, -2048)),
            vec![insn::lhu(Gpr::A0, Gpr::A1, -2048)]
        );
        assert_eq!(
            words(|j| j.stxi_l(8, Gpr::SP, Gpr::RA)),
            vec![insn::sd(Gpr::SP, Gpr::RA, 8)]
        );
    }

    #[test]
    fn test_far_store_borrows_temp() {
        let w = words(|j| j.stxi_i(0x800, Gpr::A0, Gpr::A1));
        assert_eq!(w.last(), Some(&insn::sw(Gpr::T1, Gpr::A1, 0)));
    }

    #[test]
    fn test_far_load_reuses_destination() {
        let w = words(|j| j.ldi_l(Gpr::A0, 0x1_0000));
        assert_eq!(w, vec![insn::lui(Gpr::A0, 0x10), insn::ld(Gpr::A0, Gpr::A0, 0)]);
    }
}
