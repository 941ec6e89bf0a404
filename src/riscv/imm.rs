//! Materialization of 64-bit constants.
//!
//! Values that fit in a sign-extended 32-bit immediate take at most `lui` plus
//! `addiw`. Wider values peel off the low 12 bits, strip the trailing zeros of the
//! rest, materialize that recursively and rebuild with `slli` and `addi`. The
//! sequence never needs a scratch register and never reads memory.

use super::encoding::{sign_extend, simm32_p};
use super::insn;
use super::jit::Jit;
use super::regs::Gpr;

/// Longest sequence [`materialize`] can produce.
pub const MAX_IMM_SEQUENCE: usize = 8;

/// Instruction words loading one constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmSequence {
    words: [u32; MAX_IMM_SEQUENCE],
    len: usize,
}

impl ImmSequence {
    fn new() -> Self {
        Self {
            words: [0; MAX_IMM_SEQUENCE],
            len: 0,
        }
    }

    fn push(&mut self, word: u32) {
        assert!(self.len < MAX_IMM_SEQUENCE, "constant sequence too long");
        self.words[self.len] = word;
        self.len += 1;
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.words[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Instruction sequence setting `rd` to `value`.
pub fn materialize(rd: Gpr, value: i64) -> ImmSequence {
    let mut seq = ImmSequence::new();
    build(&mut seq, rd, value);
    seq
}

fn build(seq: &mut ImmSequence, rd: Gpr, value: i64) {
    if simm32_p(value) {
        let hi = sign_extend(((value.wrapping_add(0x800) >> 12) & 0xfffff) as u64, 20);
        let lo = sign_extend(value as u64 & 0xfff, 12);
        if hi != 0 {
            seq.push(insn::lui(rd, hi));
        }
        if lo != 0 || hi == 0 {
            let base = if hi == 0 { Gpr::ZERO } else { rd };
            seq.push(insn::addiw(rd, base, lo));
        }
        return;
    }

    let lo12 = (value << 52) >> 52;
    let hi52 = value.wrapping_add(0x800) >> 12;
    let shift = 12 + hi52.trailing_zeros();
    let upper = sign_extend((hi52 >> (shift - 12)) as u64, 64 - shift);

    build(seq, rd, upper);
    seq.push(insn::slli(rd, rd, shift));
    if lo12 != 0 {
        seq.push(insn::addi(rd, rd, lo12));
    }
}

impl Jit<'_> {
    /// `r0 = i0`.
    pub fn movi(&mut self, r0: Gpr, i0: i64) {
        for &word in materialize(r0, i0).as_slice() {
            self.emit_u32_with_pool(word);
        }
    }

    /// `r0 = i0` for an unsigned or pointer-sized constant.
    pub fn movi_u64(&mut self, r0: Gpr, i0: u64) {
        self.movi(r0, i0 as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riscv::encoding::{funct3, i_imm, opcode, rd, rs1, u_imm};
    use crate::riscv::insn::{OP_IMM, OP_IMM_32, OP_LUI};

    /// Evaluate a sequence built only from lui/addiw/slli/addi.
    fn eval(seq: &ImmSequence) -> i64 {
        let mut regs = [0i64; 32];
        for &w in seq.as_slice() {
            let src = regs[rs1(w) as usize];
            let result = match (opcode(w), funct3(w)) {
                (OP_LUI, _) => u_imm(w) << 12,
                (OP_IMM_32, 0) => src.wrapping_add(i_imm(w)) as i32 as i64,
                (OP_IMM, 0) => src.wrapping_add(i_imm(w)),
                (OP_IMM, 1) => src << (i_imm(w) & 0x3f),
                _ => panic!("unexpected instruction {w:#010x}"),
            };
            regs[rd(w) as usize] = result;
            regs[0] = 0;
        }
        regs[Gpr::A0.regno() as usize]
    }

    #[test]
    fn test_small_constants() {
        assert_eq!(materialize(Gpr::A0, 0).as_slice(), &[insn::addiw(Gpr::A0, Gpr::ZERO, 0)]);
        assert_eq!(materialize(Gpr::A0, -1).len(), 1);
        assert_eq!(materialize(Gpr::A0, 0x7ff).len(), 1);
        assert_eq!(materialize(Gpr::A0, 0x1000).as_slice(), &[insn::lui(Gpr::A0, 1)]);
        assert_eq!(materialize(Gpr::A0, 0x1234_5678).len(), 2);
    }

    #[test]
    fn test_wide_constants_are_short() {
        assert_eq!(materialize(Gpr::A0, 1 << 32).len(), 2);
        assert_eq!(materialize(Gpr::A0, i64::MIN).len(), 2);
        assert!(materialize(Gpr::A0, 0x1234_5678_9abc_def0).len() <= MAX_IMM_SEQUENCE);
    }

    #[test]
    fn test_sequences_produce_value() {
        let values = [
            0i64,
            1,
            -1,
            0x7ff,
            0x800,
            -0x800,
            -0x801,
            0x7fff_f7ff,
            0x7fff_ffff,
            -0x8000_0000,
            0x8000_0000,
            0xffff_ffff,
            1 << 32,
            0x1234_5678_9abc_def0,
            0x0123_4567_89ab_cdef,
            -0x0123_4567_89ab_cdef,
            0x7fff_ffff_ffff_ffff,
            i64::MIN,
            0x8000_0000_0000_0800u64 as i64,
            0xdead_beef_dead_beefu64 as i64,
        ];
        for v in values {
            assert_eq!(eval(&materialize(Gpr::A0, v)), v, "value {v:#x}");
        }
        for shift in 0..64 {
            for base in [1i64, 0x7ff, 0x801, 0xabc] {
                let v = base.wrapping_shl(shift);
                assert_eq!(eval(&materialize(Gpr::A0, v)), v, "value {v:#x}");
                assert_eq!(eval(&materialize(Gpr::A0, !v)), !v, "value {:#x}", !v);
            }
        }
    }
}
