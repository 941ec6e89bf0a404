// This module implements the calling-convention side of the backend: where each scalar
// argument lives at a call boundary, how to get a list of caller-chosen operands into
// those places without clobbering any source before it is read, and how JIT entry
// frames save and restore the callee-saved registers. Arguments are described by
// Operand values: an ABI kind (the scalar type) plus a location that is an immediate,
// a general-purpose register, a floating-point register or a memory slot. Register
// and memory locations may carry an addend, added to the value once it has arrived.
// AbiArgIterator hands out destinations in call order: integer-like kinds take a0-a7,
// float and double take fa0-fa7, and everything past that goes to consecutive 8-byte
// stack slots. move_operands performs the parallel move: each destination first moves
// every pending source it would overwrite, and a dependency cycle is broken by copying
// the source that is still in flight to a scratch register. Addends are applied after
// all values are in place. The scratch vectors of the shuffle live in the session arena.

//! ABI argument marshaling and JIT frame management.

use bumpalo::collections::Vec as BumpVec;
use log::debug;

use super::insn::FpWidth;
use super::jit::Jit;
use super::memory::MemWidth;
use super::regs::{
    Fpr, Gpr, ARG_FPRS, ARG_GPRS, CALLEE_SAVED_FPRS, CALLEE_SAVED_GPRS, PLATFORM_CALLEE_SAVED_GPRS,
    STACK_ALIGNMENT, WORD_SIZE,
};

/// Scalar type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandAbi {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Pointer,
    Float,
    Double,
}

impl OperandAbi {
    /// Passed in integer registers.
    pub const fn is_gpr(self) -> bool {
        !self.is_fpr()
    }

    /// Passed in floating-point registers.
    pub const fn is_fpr(self) -> bool {
        matches!(self, OperandAbi::Float | OperandAbi::Double)
    }

    pub const fn size(self) -> usize {
        match self {
            OperandAbi::U8 | OperandAbi::I8 => 1,
            OperandAbi::U16 | OperandAbi::I16 => 2,
            OperandAbi::U32 | OperandAbi::I32 | OperandAbi::Float => 4,
            OperandAbi::U64 | OperandAbi::I64 | OperandAbi::Pointer | OperandAbi::Double => 8,
        }
    }

    /// Memory access used to read or write a value of this kind.
    fn mem_width(self) -> MemWidth {
        match self {
            OperandAbi::U8 => MemWidth::U8,
            OperandAbi::I8 => MemWidth::I8,
            OperandAbi::U16 => MemWidth::U16,
            OperandAbi::I16 => MemWidth::I16,
            OperandAbi::U32 => MemWidth::U32,
            OperandAbi::I32 | OperandAbi::Float => MemWidth::I32,
            OperandAbi::U64 | OperandAbi::I64 | OperandAbi::Pointer | OperandAbi::Double => MemWidth::I64,
        }
    }

    fn fp_width(self) -> FpWidth {
        match self {
            OperandAbi::Float => FpWidth::Single,
            OperandAbi::Double => FpWidth::Double,
            _ => panic!("{self:?} is not a floating-point kind"),
        }
    }

    /// Whether `imm` is representable in this kind.
    fn imm_in_range(self, imm: i64) -> bool {
        match self {
            OperandAbi::U8 => (0..=u8::MAX as i64).contains(&imm),
            OperandAbi::I8 => (i8::MIN as i64..=i8::MAX as i64).contains(&imm),
            OperandAbi::U16 => (0..=u16::MAX as i64).contains(&imm),
            OperandAbi::I16 => (i16::MIN as i64..=i16::MAX as i64).contains(&imm),
            OperandAbi::U32 => (0..=u32::MAX as i64).contains(&imm),
            OperandAbi::I32 => (i32::MIN as i64..=i32::MAX as i64).contains(&imm),
            _ => true,
        }
    }
}

/// Where an operand's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLoc {
    Imm(i64),
    Gpr { reg: Gpr, addend: i64 },
    Fpr(Fpr),
    Mem { base: Gpr, offset: i64, addend: i64 },
}

/// A typed value location, source or destination of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub abi: OperandAbi,
    pub loc: OperandLoc,
}

impl Operand {
    pub const fn imm(abi: OperandAbi, value: i64) -> Self {
        Self {
            abi,
            loc: OperandLoc::Imm(value),
        }
    }

    pub const fn gpr(abi: OperandAbi, reg: Gpr) -> Self {
        Self::gpr_with_addend(abi, reg, 0)
    }

    pub const fn gpr_with_addend(abi: OperandAbi, reg: Gpr, addend: i64) -> Self {
        Self {
            abi,
            loc: OperandLoc::Gpr { reg, addend },
        }
    }

    pub const fn fpr(abi: OperandAbi, reg: Fpr) -> Self {
        Self {
            abi,
            loc: OperandLoc::Fpr(reg),
        }
    }

    pub const fn mem(abi: OperandAbi, base: Gpr, offset: i64) -> Self {
        Self::mem_with_addend(abi, base, offset, 0)
    }

    pub const fn mem_with_addend(abi: OperandAbi, base: Gpr, offset: i64, addend: i64) -> Self {
        Self {
            abi,
            loc: OperandLoc::Mem { base, offset, addend },
        }
    }

    fn addend(&self) -> i64 {
        match self.loc {
            OperandLoc::Gpr { addend, .. } | OperandLoc::Mem { addend, .. } => addend,
            _ => 0,
        }
    }

    /// Whether writing `self` destroys the value `src` still has to provide.
    fn write_would_clobber(&self, src: &Operand) -> bool {
        match (self.loc, src.loc) {
            (OperandLoc::Gpr { reg, .. }, OperandLoc::Gpr { reg: other, .. }) => reg == other,
            (OperandLoc::Gpr { reg, .. }, OperandLoc::Mem { base, .. }) => reg == base,
            (OperandLoc::Fpr(reg), OperandLoc::Fpr(other)) => reg == other,
            _ => false,
        }
    }

    /// Shift a source expressed relative to the incoming `sp` after `sp` moved down by `bytes`.
    fn rebase_sp(&mut self, bytes: usize) {
        match &mut self.loc {
            OperandLoc::Gpr { reg, addend } if *reg == Gpr::SP => *addend += bytes as i64,
            OperandLoc::Mem { base, offset, .. } if *base == Gpr::SP => *offset += bytes as i64,
            _ => {}
        }
    }
}

/// Assigns ABI locations to arguments in call order.
#[derive(Debug, Clone)]
pub struct AbiArgIterator<'a> {
    args: &'a [Operand],
    arg_idx: usize,
    gpr_idx: usize,
    fpr_idx: usize,
    stack_size: usize,
}

impl<'a> AbiArgIterator<'a> {
    pub fn new(args: &'a [Operand]) -> Self {
        Self::with_stack_base(args, 0)
    }

    /// Iterator whose stack slots start `base` bytes above `sp`.
    pub fn with_stack_base(args: &'a [Operand], base: usize) -> Self {
        Self {
            args,
            arg_idx: 0,
            gpr_idx: 0,
            fpr_idx: 0,
            stack_size: base,
        }
    }

    /// End of the stack area assigned so far.
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }
}

impl Iterator for AbiArgIterator<'_> {
    type Item = Operand;

    fn next(&mut self) -> Option<Operand> {
        let abi = self.args.get(self.arg_idx)?.abi;
        self.arg_idx += 1;
        if abi.is_gpr() && self.gpr_idx < ARG_GPRS.len() {
            self.gpr_idx += 1;
            return Some(Operand::gpr(abi, ARG_GPRS[self.gpr_idx - 1]));
        }
        if abi.is_fpr() && self.fpr_idx < ARG_FPRS.len() {
            self.fpr_idx += 1;
            return Some(Operand::fpr(abi, ARG_FPRS[self.fpr_idx - 1]));
        }
        let slot = Operand::mem(abi, Gpr::SP, self.stack_size as i64);
        self.stack_size += WORD_SIZE;
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.args.len() - self.arg_idx;
        (left, Some(left))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveStatus {
    ToMove,
    Moving,
    Moved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleTemp {
    Gpr(Gpr),
    Fpr(Fpr),
}

/// Scratch state of one parallel move.
struct ParallelMove<'m> {
    dst: &'m [Operand],
    src: BumpVec<'m, Operand>,
    status: BumpVec<'m, MoveStatus>,
    /// Temps holding cycle sources, with the index of the move that reads them.
    temps: BumpVec<'m, (CycleTemp, usize)>,
}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

impl Jit<'_> {
    // ==== STACK ====

    /// Grow the frame by at least `expand` bytes, keeping `sp` aligned.
    /// Returns the number of bytes actually reserved.
    pub fn align_stack(&mut self, expand: usize) -> usize {
        if expand == 0 {
            return 0;
        }
        let new_size = align_up(self.frame_size + expand, STACK_ALIGNMENT);
        let diff = new_size - self.frame_size;
        self.subi(Gpr::SP, Gpr::SP, diff as i64);
        self.frame_size = new_size;
        diff
    }

    /// Release `diff` bytes reserved by [`align_stack`](Self::align_stack).
    pub fn shrink_stack(&mut self, diff: usize) {
        if diff == 0 {
            return;
        }
        assert!(diff <= self.frame_size, "shrinking the stack below its entry size");
        self.addi(Gpr::SP, Gpr::SP, diff as i64);
        self.frame_size -= diff;
    }

    // ==== MOVES ====

    /// Move one value between two locations.
    pub fn move_operand(&mut self, dst: Operand, src: Operand) {
        match (dst.loc, src.loc) {
            (OperandLoc::Gpr { reg, .. }, OperandLoc::Imm(imm)) => {
                assert!(
                    src.abi.imm_in_range(imm),
                    "immediate {imm} does not fit {:?}",
                    src.abi
                );
                self.movi(reg, imm);
            }
            (OperandLoc::Mem { base, offset, .. }, OperandLoc::Imm(imm)) => {
                self.with_imm(imm, |jit, t| jit.store(dst.abi.mem_width(), base, t, offset));
            }
            (OperandLoc::Gpr { reg, .. }, OperandLoc::Gpr { reg: from, .. }) => self.movr(reg, from),
            (OperandLoc::Mem { base, offset, .. }, OperandLoc::Gpr { reg: from, .. }) => {
                self.store(dst.abi.mem_width(), base, from, offset);
            }
            (OperandLoc::Gpr { reg, .. }, OperandLoc::Mem { base, offset, .. }) => {
                self.load(src.abi.mem_width(), reg, base, offset);
            }
            (
                OperandLoc::Mem { base, offset, .. },
                OperandLoc::Mem {
                    base: from_base,
                    offset: from_offset,
                    ..
                },
            ) => {
                self.with_temp(|jit, t| {
                    jit.load(src.abi.mem_width(), t, from_base, from_offset);
                    jit.store(dst.abi.mem_width(), base, t, offset);
                });
            }
            (OperandLoc::Fpr(reg), OperandLoc::Fpr(from)) => {
                self.fp_movr(dst.abi.fp_width(), reg, from);
            }
            (OperandLoc::Mem { base, offset, .. }, OperandLoc::Fpr(from)) => {
                self.fp_store(dst.abi.fp_width(), base, from, offset);
            }
            (OperandLoc::Fpr(reg), OperandLoc::Mem { base, offset, .. }) => {
                self.fp_load(src.abi.fp_width(), reg, base, offset);
            }
            _ => panic!("unsupported operand move {src:?} -> {dst:?}"),
        }
    }

    /// Add the source's addend to a destination that already holds its value.
    fn apply_addend(&mut self, dst: Operand, src: Operand) {
        let addend = src.addend();
        if addend == 0 {
            return;
        }
        match dst.loc {
            OperandLoc::Gpr { reg, .. } => self.addi(reg, reg, addend),
            OperandLoc::Mem { base, offset, .. } => {
                let width = dst.abi.mem_width();
                self.with_temp(|jit, t| {
                    jit.load(width, t, base, offset);
                    jit.addi(t, t, addend);
                    jit.store(width, base, t, offset);
                });
            }
            _ => panic!("addend on a non-integer destination {dst:?}"),
        }
    }

    /// Move `src[i]` into `dst[i]` for every `i`, as if all moves happened at
    /// once.
    pub fn move_operands(&mut self, dst: &[Operand], src: &[Operand]) {
        assert_eq!(dst.len(), src.len(), "operand lists differ in length");
        for (i, a) in dst.iter().enumerate() {
            for b in &dst[i + 1..] {
                let same_reg = matches!((a.loc, b.loc), (OperandLoc::Gpr { .. }, OperandLoc::Gpr { .. }) | (OperandLoc::Fpr(_), OperandLoc::Fpr(_)))
                    && a.write_would_clobber(b);
                assert!(!same_reg, "destinations {a:?} and {b:?} overlap");
            }
        }

        let arena = self.arena;
        let mut state = ParallelMove {
            dst,
            src: BumpVec::from_iter_in(src.iter().copied(), arena),
            status: BumpVec::from_iter_in(src.iter().map(|_| MoveStatus::ToMove), arena),
            temps: BumpVec::new_in(arena),
        };

        for i in 0..dst.len() {
            if state.status[i] == MoveStatus::ToMove {
                self.move_one(&mut state, i);
            }
        }
        while let Some((temp, _)) = state.temps.pop() {
            self.release_cycle_temp(temp);
        }

        for i in 0..dst.len() {
            self.apply_addend(dst[i], state.src[i]);
        }
    }

    fn move_one(&mut self, state: &mut ParallelMove<'_>, i: usize) {
        state.status[i] = MoveStatus::Moving;
        let dst = state.dst[i];
        for j in 0..state.src.len() {
            if j == i || !dst.write_would_clobber(&state.src[j]) {
                continue;
            }
            match state.status[j] {
                MoveStatus::ToMove => self.move_one(state, j),
                MoveStatus::Moving => {
                    let src = state.src[j];
                    let (temp, tmp) = match src.loc {
                        OperandLoc::Fpr(_) => {
                            let t = self.get_temp_fpr();
                            (CycleTemp::Fpr(t), Operand::fpr(src.abi, t))
                        }
                        _ => {
                            let t = self.get_temp_gpr();
                            (CycleTemp::Gpr(t), Operand::gpr_with_addend(src.abi, t, src.addend()))
                        }
                    };
                    self.move_operand(tmp, src);
                    state.src[j] = tmp;
                    state.temps.push((temp, j));
                }
                MoveStatus::Moved => {}
            }
        }

        self.move_operand(dst, state.src[i]);
        state.status[i] = MoveStatus::Moved;

        // Temps whose reader has completed can go, as long as order is kept.
        while let Some(&(temp, reader)) = state.temps.last() {
            if state.status[reader] != MoveStatus::Moved {
                break;
            }
            state.temps.pop();
            self.release_cycle_temp(temp);
        }
    }

    fn release_cycle_temp(&mut self, temp: CycleTemp) {
        match temp {
            CycleTemp::Gpr(t) => self.unget_temp_gpr(t),
            CycleTemp::Fpr(t) => self.unget_temp_fpr(t),
        }
    }

    // ==== CALLS ====

    /// Reserve outgoing argument space and shuffle `args` into their ABI
    /// locations. Returns the bytes reserved.
    fn prepare_call_args(&mut self, args: &[Operand]) -> usize {
        let arena = self.arena;
        let mut iter = AbiArgIterator::new(args);
        let dst = BumpVec::from_iter_in(iter.by_ref(), arena);
        let reserved = self.align_stack(iter.stack_size());

        let mut src = BumpVec::from_iter_in(args.iter().copied(), arena);
        for operand in src.iter_mut() {
            operand.rebase_sp(reserved);
        }
        debug!(
            "marshaling {} call arguments, {} bytes of stack",
            args.len(),
            reserved
        );
        self.move_operands(&dst, &src);
        reserved
    }

    /// Call the absolute address `f` with `args`.
    pub fn calli_args(&mut self, f: u64, args: &[Operand]) {
        let reserved = self.prepare_call_args(args);
        self.calli(f);
        self.shrink_stack(reserved);
    }

    /// Call the function whose address is in `f` with `args`.
    pub fn callr_args(&mut self, f: Gpr, args: &[Operand]) {
        let mut iter = AbiArgIterator::new(args);
        let clobbered = iter.any(|d| matches!(d.loc, OperandLoc::Gpr { reg, .. } if reg == f));
        if clobbered || f == Gpr::SP {
            self.with_temp(|jit, t| {
                jit.movr(t, f);
                let reserved = jit.prepare_call_args(args);
                jit.callr(t);
                jit.shrink_stack(reserved);
            });
        } else {
            let reserved = self.prepare_call_args(args);
            self.callr(f);
            self.shrink_stack(reserved);
        }
    }

    /// Move incoming arguments from their ABI locations into `args`.
    pub fn load_args(&mut self, args: &[Operand]) {
        let arena = self.arena;
        let src = BumpVec::from_iter_in(AbiArgIterator::with_stack_base(args, self.frame_size), arena);
        self.move_operands(args, &src);
    }

    // ==== FRAMES ====

    /// Save `v` callee-saved GPRs, `vf` callee-saved FPRs and `ra`. `frame_size`
    /// is the stack already in use at entry. Returns the bytes reserved, to be
    /// passed to [`leave_jit_abi`](Self::leave_jit_abi).
    pub fn enter_jit_abi(&mut self, v: usize, vf: usize, frame_size: usize) -> usize {
        assert!(v <= CALLEE_SAVED_GPRS.len(), "{v} callee-saved GPRs requested");
        assert!(vf <= CALLEE_SAVED_FPRS.len(), "{vf} callee-saved FPRs requested");
        assert_eq!(self.frame_size, 0, "enter_jit_abi in a non-empty frame");
        self.frame_size = frame_size;

        let reserved = self.align_stack((PLATFORM_CALLEE_SAVED_GPRS.len() + v) * WORD_SIZE + vf * 8);
        let mut offset = 0;
        for &reg in &CALLEE_SAVED_FPRS[..vf] {
            self.fp_store(FpWidth::Double, Gpr::SP, reg, offset);
            offset += 8;
        }
        for &reg in CALLEE_SAVED_GPRS[..v].iter().chain(&PLATFORM_CALLEE_SAVED_GPRS) {
            self.store(MemWidth::I64, Gpr::SP, reg, offset);
            offset += WORD_SIZE as i64;
        }
        debug_assert!(offset as usize <= reserved);
        reserved
    }

    /// Restore what [`enter_jit_abi`](Self::enter_jit_abi) saved and release its frame.
    pub fn leave_jit_abi(&mut self, v: usize, vf: usize, reserved: usize) {
        let mut offset = 0;
        for &reg in &CALLEE_SAVED_FPRS[..vf] {
            self.fp_load(FpWidth::Double, reg, Gpr::SP, offset);
            offset += 8;
        }
        for &reg in CALLEE_SAVED_GPRS[..v].iter().chain(&PLATFORM_CALLEE_SAVED_GPRS) {
            self.load(MemWidth::I64, reg, Gpr::SP, offset);
            offset += WORD_SIZE as i64;
        }
        self.shrink_stack(reserved);
        self.frame_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CodeBuffer, JitConfig};
    use bumpalo::Bump;

    #[test]
    fn test_iterator_spills_ninth_integer() {
        let args: Vec<Operand> = (0..10).map(|i| Operand::imm(OperandAbi::I64, i)).collect();
        let mut iter = AbiArgIterator::new(&args);
        let dst: Vec<Operand> = iter.by_ref().collect();
        assert_eq!(dst[7].loc, OperandLoc::Gpr { reg: Gpr::A7, addend: 0 });
        assert_eq!(dst[8].loc, OperandLoc::Mem { base: Gpr::SP, offset: 0, addend: 0 });
        assert_eq!(dst[9].loc, OperandLoc::Mem { base: Gpr::SP, offset: 8, addend: 0 });
        assert_eq!(iter.stack_size(), 16);
    }

    #[test]
    fn test_iterator_classes_are_independent() {
        let args = [
            Operand::imm(OperandAbi::Double, 0),
            Operand::imm(OperandAbi::I32, 0),
            Operand::imm(OperandAbi::Double, 0),
            Operand::imm(OperandAbi::Pointer, 0),
        ];
        let dst: Vec<Operand> = AbiArgIterator::new(&args).collect();
        assert_eq!(dst[0].loc, OperandLoc::Fpr(Fpr::FA0));
        assert_eq!(dst[1].loc, OperandLoc::Gpr { reg: Gpr::A0, addend: 0 });
        assert_eq!(dst[2].loc, OperandLoc::Fpr(Fpr::FA1));
        assert_eq!(dst[3].loc, OperandLoc::Gpr { reg: Gpr::A1, addend: 0 });
    }

    #[test]
    fn test_swap_uses_one_temp() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        let dst = [
            Operand::gpr(OperandAbi::I64, Gpr::A1),
            Operand::gpr(OperandAbi::I64, Gpr::A0),
        ];
        let src = [
            Operand::gpr(OperandAbi::I64, Gpr::A0),
            Operand::gpr(OperandAbi::I64, Gpr::A1),
        ];
        jit.move_operands(&dst, &src);
        assert_eq!(jit.temps_in_use(), 0);
        let code = jit.end().unwrap();
        assert_eq!(code.len(), 12);
        assert_eq!(code.stats().max_temps, 1);
    }

    #[test]
    fn test_enter_leave_balance_frame() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        let reserved = jit.enter_jit_abi(3, 2, 0);
        assert_eq!(reserved, 48);
        assert_eq!(jit.frame_size(), 48);
        jit.leave_jit_abi(3, 2, reserved);
        jit.ret();
        assert!(jit.end().is_ok());
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn test_immediate_checked_against_kind() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        jit.move_operand(
            Operand::gpr(OperandAbi::U8, Gpr::A0),
            Operand::imm(OperandAbi::U8, 256),
        );
    }
}
