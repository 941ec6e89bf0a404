// This module defines Jit, the session context every emitting operation goes through.
// A session is bracketed by begin() and end(): begin() takes ownership of a CodeBuffer,
// end() flushes the literal pool, checks that every relocation was patched, and hands
// the finished code back as a FinishedCode. In between, the session owns all mutable
// state the operations need: the write cursor (through the buffer), the scratch
// register pools, the literal pool with its deadline, the set of unresolved
// relocations, and the current stack frame size used by argument marshaling. Nothing
// is global, so independent sessions can live side by side. The arena reference is
// borrowed from the caller (as with the compilation session) and backs the short-lived
// scratch vectors of the argument shuffler.

//! Emission session state.

use bumpalo::Bump;
use hashbrown::HashSet;
use log::{debug, trace, warn};

use super::regs::{reserved_set, Fpr, Gpr, TEMP_FPRS, TEMP_GPRS};
use super::reloc::{LiteralPool, PoolGuard};
use crate::core::code_buffer::CodeBuffer;
use crate::core::config::JitConfig;
use crate::core::error::{JitError, JitResult};
use crate::core::register_file::{RegBitSet, TempRegisterPool};

/// Counters gathered over one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitStats {
    /// Instruction and data words written (u32 and u64 each count once).
    pub words: usize,
    pub relocs_created: usize,
    pub relocs_patched: usize,
    pub pool_flushes: usize,
    pub veneers: usize,
    /// Deepest simultaneous scratch register use.
    pub max_temps: usize,
}

/// Code produced by a completed session.
#[derive(Debug)]
pub struct FinishedCode {
    buffer: CodeBuffer,
    len: usize,
    stats: EmitStats,
}

impl FinishedCode {
    /// Absolute address of the first instruction.
    pub fn address(&self) -> u64 {
        self.buffer.base_address()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer.as_slice()[..self.len]
    }

    pub fn stats(&self) -> &EmitStats {
        &self.stats
    }

    /// Flip the pages to read+execute and flush the instruction cache.
    pub fn make_executable(&self) -> JitResult<()> {
        self.buffer.set_executable()
    }

    /// Reinterpret the entry point as a function pointer.
    ///
    /// # Safety
    /// `F` must be an `extern "C"` function pointer type matching the emitted
    /// code, the host must be RV64, and [`make_executable`](Self::make_executable)
    /// must have succeeded.
    pub unsafe fn entry<F: Copy>(&self) -> F {
        assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
        let addr = self.address() as usize;
        std::mem::transmute_copy(&addr)
    }

    /// Take the buffer back, e.g. to reuse it for another session.
    pub fn into_buffer(self) -> CodeBuffer {
        self.buffer
    }
}

/// JIT emission session for RV64.
pub struct Jit<'arena> {
    pub(crate) arena: &'arena Bump,
    pub(crate) config: JitConfig,
    buf: Option<CodeBuffer>,
    temps: TempRegisterPool,
    ftemps: TempRegisterPool,
    pub(crate) pool: LiteralPool,
    /// Offsets of relocations created but not yet patched.
    pub(crate) unresolved: HashSet<u32>,
    /// Bytes currently reserved below the incoming stack pointer.
    pub(crate) frame_size: usize,
    pub(crate) stats: EmitStats,
}

impl<'arena> Jit<'arena> {
    pub fn new(arena: &'arena Bump, config: JitConfig) -> Self {
        assert!(
            config.pool_retry_limit >= 2,
            "pool_retry_limit {} leaves no retry after a flush",
            config.pool_retry_limit
        );
        let reserved = reserved_set();
        let pool = LiteralPool::new(config.pool_capacity_hint);
        Self {
            arena,
            config,
            buf: None,
            temps: TempRegisterPool::new(&TEMP_GPRS, &reserved),
            ftemps: TempRegisterPool::new(&TEMP_FPRS, &RegBitSet::new()),
            pool,
            unresolved: HashSet::new(),
            frame_size: 0,
            stats: EmitStats::default(),
        }
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn stats(&self) -> &EmitStats {
        &self.stats
    }

    /// Start a session writing at the cursor of `buffer`.
    pub fn begin(&mut self, mut buffer: CodeBuffer) {
        assert!(self.buf.is_none(), "begin() while a session is in progress");
        buffer.clear();
        debug!(
            "jit session begin at {:#x}, {} bytes",
            buffer.base_address(),
            buffer.capacity()
        );
        self.buf = Some(buffer);
        self.reset_state();
    }

    /// Finish the session: flush pending literals, check that every relocation
    /// was resolved, and return the code.
    ///
    /// Returns `BufferOverflow` if the code did not fit; the buffer is dropped
    /// and the caller may retry with a larger one.
    pub fn end(&mut self) -> JitResult<FinishedCode> {
        if self.buf.is_none() {
            return Err(JitError::NotStarted);
        }
        if !self.pool.is_empty() {
            self.emit_literal_pool(PoolGuard::NotNeeded);
        }
        let buffer = self.buf.take().ok_or(JitError::NotStarted)?;
        if buffer.has_overflow() {
            warn!(
                "jit session overflowed: {} bytes requested, {} available",
                buffer.requested(),
                buffer.capacity()
            );
            self.reset_state();
            return Err(JitError::BufferOverflow {
                needed: buffer.requested(),
                capacity: buffer.capacity(),
            });
        }

        if !self.unresolved.is_empty() {
            let mut offsets: Vec<u32> = self.unresolved.iter().copied().collect();
            offsets.sort_unstable();
            panic!("session ended with unresolved relocations at offsets {offsets:?}");
        }
        assert_eq!(self.temps.in_use(), 0, "temp registers still checked out at end()");
        assert_eq!(self.ftemps.in_use(), 0, "temp FP registers still checked out at end()");
        assert_eq!(self.frame_size, 0, "stack frame not released at end()");

        let len = buffer.offset();
        let stats = EmitStats {
            max_temps: self.temps.high_water(),
            ..self.stats
        };
        debug!(
            "jit session end: {} bytes, {} relocations, {} pool flushes, {} veneers",
            len, stats.relocs_created, stats.pool_flushes, stats.veneers
        );
        self.reset_state();
        Ok(FinishedCode {
            buffer,
            len,
            stats,
        })
    }

    /// Abandon the current session, returning its buffer if there was one.
    pub fn reset(&mut self) -> Option<CodeBuffer> {
        self.reset_state();
        self.buf.take()
    }

    fn reset_state(&mut self) {
        self.temps.reset();
        self.ftemps.reset();
        self.pool.reset();
        self.unresolved.clear();
        self.frame_size = 0;
        self.stats = EmitStats::default();
    }

    pub fn is_active(&self) -> bool {
        self.buf.is_some()
    }

    #[inline]
    pub(crate) fn buf(&self) -> &CodeBuffer {
        self.buf.as_ref().expect("no emission session in progress")
    }

    #[inline]
    pub(crate) fn buf_mut(&mut self) -> &mut CodeBuffer {
        self.buf.as_mut().expect("no emission session in progress")
    }

    /// Absolute address of the next instruction.
    pub fn address(&self) -> u64 {
        self.buf().current_address()
    }

    /// Offset of the next instruction from the start of the buffer.
    pub fn offset(&self) -> usize {
        self.buf().offset()
    }

    pub(crate) fn has_overflow(&self) -> bool {
        self.buf().has_overflow()
    }

    /// Bytes currently reserved on the stack by this session.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    // ==== RAW EMISSION ====

    pub(crate) fn emit_u32(&mut self, word: u32) {
        if self.config.trace_emission {
            trace!("{:#010x}: {:08x}", self.address(), word);
        }
        self.stats.words += 1;
        self.buf_mut().emit_u32(word);
    }

    pub(crate) fn emit_u64(&mut self, value: u64) {
        if self.config.trace_emission {
            trace!("{:#010x}: {:016x} (literal)", self.address(), value);
        }
        self.stats.words += 1;
        self.buf_mut().emit_u64(value);
    }

    /// Emit one instruction and flush the literal pool if its deadline passed.
    pub fn emit_u32_with_pool(&mut self, word: u32) {
        self.emit_u32(word);
        self.check_pool_deadline();
    }

    pub(crate) fn check_pool_deadline(&mut self) {
        if self.offset() >= self.pool.deadline() {
            self.emit_literal_pool(PoolGuard::Needed);
        }
    }

    /// Flush the pool now if `len` more bytes would run past its deadline, so
    /// that a sequence of that length can be emitted without a flush inside.
    pub(crate) fn reserve_pool_free_span(&mut self, len: usize) {
        if self.offset() + len >= self.pool.deadline() {
            self.emit_literal_pool(PoolGuard::Needed);
        }
    }

    // ==== SCRATCH REGISTERS ====

    /// Borrow a scratch GPR. Must be returned with [`unget_temp_gpr`](Self::unget_temp_gpr)
    /// in reverse order of checkout.
    pub fn get_temp_gpr(&mut self) -> Gpr {
        let reg = Gpr::from(self.temps.checkout());
        self.stats.max_temps = self.stats.max_temps.max(self.temps.in_use());
        reg
    }

    pub fn unget_temp_gpr(&mut self, reg: Gpr) {
        self.temps.release(reg.asm_reg());
    }

    pub fn get_temp_fpr(&mut self) -> Fpr {
        Fpr::from(self.ftemps.checkout())
    }

    pub fn unget_temp_fpr(&mut self, reg: Fpr) {
        self.ftemps.release(reg.asm_reg());
    }

    /// Run `f` with a scratch GPR checked out around it.
    pub(crate) fn with_temp<R>(&mut self, f: impl FnOnce(&mut Self, Gpr) -> R) -> R {
        let t = self.get_temp_gpr();
        let result = f(self, t);
        self.unget_temp_gpr(t);
        result
    }

    /// Run `f` with `imm` materialized in a scratch GPR.
    pub(crate) fn with_imm<R>(&mut self, imm: i64, f: impl FnOnce(&mut Self, Gpr) -> R) -> R {
        self.with_temp(|jit, t| {
            jit.movi(t, imm);
            f(jit, t)
        })
    }

    /// Scratch GPRs currently lent out.
    pub fn temps_in_use(&self) -> usize {
        self.temps.in_use()
    }

    /// Pad with nops until the cursor is a multiple of `align` bytes.
    pub fn align(&mut self, align: usize) {
        assert!(align.is_power_of_two() && align >= 4, "bad code alignment {align}");
        while !self.has_overflow() && self.offset() % align != 0 {
            self.emit_u32_with_pool(super::insn::nop());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riscv::insn;

    #[test]
    fn test_session_roundtrip() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(4096).unwrap());
        assert!(jit.is_active());
        let start = jit.address();
        jit.emit_u32_with_pool(insn::ret());
        assert_eq!(jit.address(), start + 4);
        let code = jit.end().unwrap();
        assert_eq!(code.address(), start);
        assert_eq!(code.bytes(), &insn::ret().to_le_bytes());
        assert!(!jit.is_active());
    }

    #[test]
    fn test_end_without_begin() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        assert!(matches!(jit.end(), Err(JitError::NotStarted)));
    }

    #[test]
    fn test_overflow_reported() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        let buf = CodeBuffer::new(1).unwrap();
        let cap = buf.capacity();
        jit.begin(buf);
        for _ in 0..cap / 4 + 1 {
            jit.emit_u32_with_pool(insn::nop());
        }
        match jit.end() {
            Err(JitError::BufferOverflow { needed, capacity }) => {
                assert_eq!(capacity, cap);
                assert_eq!(needed, cap + 4);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[test]
    fn test_branches_after_overflow_still_patch() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        let buf = CodeBuffer::new(1).unwrap();
        let cap = buf.capacity();
        jit.begin(buf);
        let early = jit.beqr(Gpr::A0, Gpr::A1);
        for _ in 0..cap / 4 {
            jit.emit_u32_with_pool(insn::nop());
        }
        assert!(jit.has_overflow());
        let a = jit.beqr(Gpr::A0, Gpr::A1);
        let b = jit.bner(Gpr::A0, Gpr::A1);
        jit.patch_here(a);
        jit.patch_here(b);
        jit.patch_here(early);
        assert!(matches!(jit.end(), Err(JitError::BufferOverflow { .. })));
        assert!(!jit.is_active());
    }

    #[test]
    #[should_panic(expected = "pool_retry_limit")]
    fn test_retry_limit_checked_without_builder() {
        let arena = Bump::new();
        let config = JitConfig {
            pool_retry_limit: 0,
            ..JitConfig::default()
        };
        let _ = Jit::new(&arena, config);
    }

    #[test]
    fn test_temps_nest() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        let a = jit.get_temp_gpr();
        let b = jit.get_temp_gpr();
        assert_eq!((a, b), (Gpr::T1, Gpr::T2));
        jit.unget_temp_gpr(b);
        jit.unget_temp_gpr(a);
        assert_eq!(jit.get_temp_fpr(), Fpr::FT11);
    }

    #[test]
    fn test_align_pads_with_nops() {
        let arena = Bump::new();
        let mut jit = Jit::new(&arena, JitConfig::default());
        jit.begin(CodeBuffer::new(64).unwrap());
        jit.emit_u32_with_pool(insn::ret());
        jit.align(16);
        assert_eq!(jit.offset(), 16);
        let code = jit.end().unwrap();
        assert_eq!(&code.bytes()[4..8], &insn::nop().to_le_bytes());
    }
}
