// This module implements forward references for emitted code. A branch, jump or
// address load whose target is not known yet is emitted with a zero displacement and
// described by a Reloc. Every such site also registers an entry in the literal pool,
// together with a deadline: the last code offset at which the pool can still be placed
// so that the site's short displacement reaches its slot. If the target gets patched
// while it is in range, the displacement is written directly and the pool entry is
// dropped. Otherwise, when the deadline passes, the pool is flushed inline behind a
// guard jump: a branch or jump site gets a veneer (auipc, ld, jalr through a scratch
// register, followed by the 64-bit target), and an address load gets its 64-bit slot.
// Patching a site after its veneer or slot is out only rewrites that 64-bit word, so
// any target in the address space stays reachable. The session remembers which
// relocations were never patched and refuses to end while any remain.

//! Relocations, literal pool and veneers.

use log::{debug, trace};

use super::encoding::{b_imm, i_imm, j_imm, split_pcrel, u_imm, with_b_imm, with_i_imm, with_j_imm, with_u_imm};
use super::insn;
use super::jit::Jit;
use super::regs::Gpr;

/// Bits of displacement a conditional branch can use toward its veneer.
const JCC_OFFSET_BITS: u32 = 12 - 1;
/// Bits of displacement an unconditional jump can use toward its veneer.
const JMP_OFFSET_BITS: u32 = 20 - 1;
/// Bits of displacement an auipc+ld pair can use toward its slot. One short of
/// the pair's signed 32-bit reach so the rounded upper part cannot overflow.
const LOAD_OFFSET_BITS: u32 = 31 - 1;

/// Longest single emission between two deadline checks (a literal load's slot).
const MAX_INST_SIZE: usize = 8;
/// Guard jump plus alignment padding.
const POOL_HEADER_SIZE: usize = 8;
/// Worst case per entry: a 20-byte veneer and its alignment padding.
const POOL_ENTRY_SIZE: usize = 24;
/// Byte offset of the target word inside a veneer.
const VENEER_TARGET_OFFSET: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocKind {
    /// Conditional branch that may go through a veneer.
    JccWithVeneer,
    /// Unconditional jump that may go through a veneer.
    JmpWithVeneer,
    /// `auipc`+`ld` pair reading a 64-bit pool slot.
    LoadFromPool,
}

/// A site whose target is patched later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "a relocation must be patched before the session ends"]
pub struct Reloc {
    kind: RelocKind,
    /// Offset of the instruction from the start of the buffer. Displacements
    /// are measured from here.
    offset: u32,
}

impl Reloc {
    fn new(kind: RelocKind, offset: usize) -> Self {
        Self {
            kind,
            offset: u32::try_from(offset).expect("code offset exceeds 4 GiB"),
        }
    }

    pub fn kind(&self) -> RelocKind {
        self.kind
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }
}

/// Whether a flush must first emit a jump over the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolGuard {
    Needed,
    NotNeeded,
}

#[derive(Debug, Clone, Copy)]
struct PoolEntry {
    reloc: Reloc,
    /// Target address, 0 until patched.
    value: u64,
}

/// Pending pool entries of a session.
#[derive(Debug)]
pub(crate) struct LiteralPool {
    entries: Vec<PoolEntry>,
    deadline: usize,
}

impl LiteralPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            deadline: usize::MAX,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.deadline = usize::MAX;
    }

    /// Offset at or past which the pool must be flushed.
    pub(crate) fn deadline(&self) -> usize {
        self.deadline
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Space the pool would need if flushed right now.
    fn byte_size(&self) -> usize {
        POOL_HEADER_SIZE + self.entries.len() * POOL_ENTRY_SIZE
    }

    fn find(&self, reloc: Reloc) -> Option<usize> {
        self.entries.iter().position(|e| e.reloc == reloc)
    }
}

/// Displacement a conditional branch can encode directly.
pub fn offset_in_jcc_range(diff: i64) -> bool {
    diff & 1 == 0 && (-0x1000..=0xfff).contains(&diff)
}

/// Displacement a `jal` can encode directly.
pub fn offset_in_jmp_range(diff: i64) -> bool {
    diff & 1 == 0 && (-0x10_0000..=0xf_ffff).contains(&diff)
}

impl Jit<'_> {
    // ==== EMITTING RELOCATABLE SITES ====

    /// Emit a conditional branch (`beq`, `bne`, ...) with an unresolved target.
    /// The displacement field of `inst` is ignored.
    pub fn emit_cc_jump(&mut self, inst: u32) -> Reloc {
        self.emit_relocatable(RelocKind::JccWithVeneer, JCC_OFFSET_BITS, |jit| {
            jit.emit_u32_with_pool(with_b_imm(inst, 0));
        })
    }

    /// Emit `jal zero` with an unresolved target.
    pub fn jmp(&mut self) -> Reloc {
        self.emit_jump(insn::jal(Gpr::ZERO, 0))
    }

    /// Emit a `jal` with an unresolved target.
    pub fn emit_jump(&mut self, inst: u32) -> Reloc {
        self.emit_relocatable(RelocKind::JmpWithVeneer, JMP_OFFSET_BITS, |jit| {
            jit.emit_u32_with_pool(with_j_imm(inst, 0));
        })
    }

    /// Emit `auipc rd, 0; ld rd, 0(rd)` reading a pool slot filled at patch time.
    pub fn emit_load_from_pool(&mut self, rd: Gpr) -> Reloc {
        self.emit_relocatable(RelocKind::LoadFromPool, LOAD_OFFSET_BITS, |jit| {
            jit.emit_u32(insn::auipc(rd, 0));
            jit.emit_u32(insn::ld(rd, rd, 0));
            jit.check_pool_deadline();
        })
    }

    /// Load an address known only later into `r0`.
    pub fn mov_addr(&mut self, r0: Gpr) -> Reloc {
        self.emit_load_from_pool(r0)
    }

    fn emit_relocatable(&mut self, kind: RelocKind, bits: u32, emit: impl Fn(&mut Self)) -> Reloc {
        for _ in 0..self.config.pool_retry_limit {
            let reloc = Reloc::new(kind, self.offset());
            if self.add_pending_literal(reloc, bits) {
                emit(self);
                // Offsets stop advancing once the buffer overflows.
                if !self.has_overflow() {
                    self.unresolved.insert(reloc.offset);
                }
                self.stats.relocs_created += 1;
                return reloc;
            }
        }
        panic!(
            "literal pool still full after {} flushes",
            self.config.pool_retry_limit
        );
    }

    // ==== LITERAL POOL ====

    /// Register a pool entry for `reloc`, whose displacement has `bits` bits to
    /// reach the pool. Returns false after flushing a pool that had no room
    /// left; the caller retries at the new offset.
    fn add_pending_literal(&mut self, reloc: Reloc, bits: u32) -> bool {
        if self.has_overflow() {
            return true;
        }
        let max_offset = (1usize << bits) - MAX_INST_SIZE;
        let pool_size = self.pool.byte_size();
        if max_offset <= pool_size {
            self.emit_literal_pool(PoolGuard::Needed);
            return false;
        }
        let deadline = reloc.offset() + (max_offset - pool_size);
        self.pool.deadline = self.pool.deadline.min(deadline);
        self.pool.entries.push(PoolEntry { reloc, value: 0 });
        true
    }

    fn remove_pending_literal(&mut self, index: usize) {
        // Entries flushed later keep their deadlines; removing one only moves
        // the rest closer, so the deadline stays valid.
        self.pool.entries.swap_remove(index);
        if self.pool.entries.is_empty() {
            self.pool.deadline = usize::MAX;
        }
    }

    /// Write all pending entries at the cursor.
    pub(crate) fn emit_literal_pool(&mut self, guard: PoolGuard) {
        if self.has_overflow() || self.pool.is_empty() {
            return;
        }
        debug!(
            "flushing literal pool: {} entries at offset {:#x}",
            self.pool.len(),
            self.offset()
        );
        self.stats.pool_flushes += 1;

        let guard_loc = match guard {
            PoolGuard::Needed => Some(self.jmp_without_veneer()),
            PoolGuard::NotNeeded => None,
        };

        let mut entries = std::mem::take(&mut self.pool.entries);
        self.pool.deadline = usize::MAX;
        for entry in &entries {
            let loc = entry.reloc.offset();
            match entry.reloc.kind {
                RelocKind::JccWithVeneer | RelocKind::JmpWithVeneer => {
                    // Veneer target word must be 8-byte aligned.
                    self.pad_pool_slot(VENEER_TARGET_OFFSET);
                    let diff = (self.offset() - loc) as i64;
                    if self.has_overflow() {
                        break;
                    }
                    let word = self.buf().read_u32(loc);
                    let patched = if entry.reloc.kind == RelocKind::JccWithVeneer {
                        with_b_imm(word, diff)
                    } else {
                        with_j_imm(word, diff)
                    };
                    self.buf_mut().patch_u32(loc, patched);
                    self.emit_veneer(entry.value);
                }
                RelocKind::LoadFromPool => {
                    self.pad_pool_slot(0);
                    let diff = (self.offset() - loc) as i64;
                    if self.has_overflow() {
                        break;
                    }
                    self.patch_load_from_pool_offset(loc, diff);
                    self.emit_u64(entry.value);
                }
            }
        }
        entries.clear();
        self.pool.entries = entries;

        if self.has_overflow() {
            return;
        }
        if let Some(loc) = guard_loc {
            self.patch_jmp_without_veneer(loc);
        }
    }

    fn pad_pool_slot(&mut self, bias: usize) {
        while !self.has_overflow() && (self.offset() + bias) % 8 != 0 {
            self.emit_u32(0);
        }
    }

    /// `jal zero, 0` that never gets a veneer; used to jump over the pool.
    fn jmp_without_veneer(&mut self) -> usize {
        let loc = self.offset();
        self.emit_u32(insn::jal(Gpr::ZERO, 0));
        loc
    }

    fn patch_jmp_without_veneer(&mut self, loc: usize) {
        let diff = (self.offset() - loc) as i64;
        let word = self.buf().read_u32(loc);
        self.buf_mut().patch_u32(loc, with_j_imm(word, diff));
    }

    fn emit_veneer(&mut self, target: u64) {
        let t = self.get_temp_gpr();
        self.emit_u32(insn::auipc(t, 0));
        self.emit_u32(insn::ld(t, t, VENEER_TARGET_OFFSET as i64));
        self.emit_u32(insn::jalr(Gpr::ZERO, t, 0));
        self.emit_u64(target);
        self.unget_temp_gpr(t);
        self.stats.veneers += 1;
    }

    fn patch_veneer(&mut self, veneer: usize, target: u64) {
        self.buf_mut().patch_u64(veneer + VENEER_TARGET_OFFSET, target);
    }

    fn patch_load_from_pool_offset(&mut self, loc: usize, diff: i64) {
        let (hi, lo) = split_pcrel(diff);
        let auipc = self.buf().read_u32(loc);
        let ld = self.buf().read_u32(loc + 4);
        self.buf_mut().patch_u32(loc, with_u_imm(auipc, hi));
        self.buf_mut().patch_u32(loc + 4, with_i_imm(ld, lo));
    }

    fn read_load_from_pool_offset(&self, loc: usize) -> i64 {
        let auipc = self.buf().read_u32(loc);
        let ld = self.buf().read_u32(loc + 4);
        (u_imm(auipc) << 12) + i_imm(ld)
    }

    // ==== PATCHING ====

    /// Resolve `reloc` to the absolute address `addr`.
    pub fn patch_there(&mut self, reloc: Reloc, addr: u64) {
        self.stats.relocs_patched += 1;
        if self.has_overflow() {
            self.unresolved.remove(&reloc.offset);
            return;
        }
        assert!(
            self.unresolved.remove(&reloc.offset),
            "relocation at offset {:#x} patched twice or not from this session",
            reloc.offset
        );

        let loc = reloc.offset();
        let site = self.buf().base_address() + loc as u64;
        let diff = addr.wrapping_sub(site) as i64;
        trace!("patch {:?} at {:#x} -> {:#x}", reloc.kind, site, addr);

        let pending = self.pool.find(reloc);
        match reloc.kind {
            RelocKind::JccWithVeneer | RelocKind::JmpWithVeneer => {
                let is_jcc = reloc.kind == RelocKind::JccWithVeneer;
                assert!(diff & 1 == 0, "branch displacement {diff} is odd");
                match pending {
                    Some(index) => {
                        let in_range = if is_jcc {
                            offset_in_jcc_range(diff)
                        } else {
                            offset_in_jmp_range(diff)
                        };
                        if in_range {
                            let word = self.buf().read_u32(loc);
                            let patched = if is_jcc {
                                with_b_imm(word, diff)
                            } else {
                                with_j_imm(word, diff)
                            };
                            self.buf_mut().patch_u32(loc, patched);
                            self.remove_pending_literal(index);
                        } else {
                            self.pool.entries[index].value = addr;
                        }
                    }
                    None => {
                        let word = self.buf().read_u32(loc);
                        let to_veneer = if is_jcc { b_imm(word) } else { j_imm(word) };
                        self.patch_veneer((loc as i64 + to_veneer) as usize, addr);
                    }
                }
            }
            RelocKind::LoadFromPool => match pending {
                Some(index) => self.pool.entries[index].value = addr,
                None => {
                    let slot = (loc as i64 + self.read_load_from_pool_offset(loc)) as usize;
                    self.buf_mut().patch_u64(slot, addr);
                }
            },
        }
    }

    /// Resolve `reloc` to the current cursor.
    pub fn patch_here(&mut self, reloc: Reloc) {
        let addr = self.address();
        self.patch_there(reloc, addr);
    }

    /// Create a label at the cursor, for backward branches.
    pub fn label(&self) -> u64 {
        self.address()
    }

    /// Number of entries waiting in the literal pool.
    pub fn pending_literals(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CodeBuffer, JitConfig};
    use crate::riscv::encoding::opcode;
    use bumpalo::Bump;

    fn session(arena: &Bump) -> Jit<'_> {
        let mut jit = Jit::new(arena, JitConfig::default());
        jit.begin(CodeBuffer::new(256 * 1024).unwrap());
        jit
    }

    #[test]
    fn test_near_forward_branch_patched_directly() {
        let arena = Bump::new();
        let mut jit = session(&arena);
        let r = jit.emit_cc_jump(insn::beq(Gpr::A0, Gpr::A1, 0));
        assert_eq!(jit.pending_literals(), 1);
        jit.emit_u32_with_pool(insn::nop());
        jit.patch_here(r);
        assert_eq!(jit.pending_literals(), 0);
        jit.emit_u32_with_pool(insn::ret());
        let code = jit.end().unwrap();
        let word = u32::from_le_bytes(code.bytes()[0..4].try_into().unwrap());
        assert_eq!(b_imm(word), 8);
        assert_eq!(code.len(), 12);
        assert_eq!(code.stats().veneers, 0);
    }

    #[test]
    fn test_backward_jump() {
        let arena = Bump::new();
        let mut jit = session(&arena);
        let top = jit.label();
        jit.emit_u32_with_pool(insn::nop());
        let r = jit.jmp();
        jit.patch_there(r, top);
        let code = jit.end().unwrap();
        let word = u32::from_le_bytes(code.bytes()[4..8].try_into().unwrap());
        assert_eq!(j_imm(word), -4);
    }

    #[test]
    fn test_far_branch_goes_through_veneer() {
        let arena = Bump::new();
        let mut jit = session(&arena);
        let r = jit.emit_cc_jump(insn::bne(Gpr::A0, Gpr::ZERO, 0));
        // Pass the deadline of the branch.
        for _ in 0..1100 {
            jit.emit_u32_with_pool(insn::nop());
        }
        assert_eq!(jit.pending_literals(), 0);
        assert_eq!(jit.stats().veneers, 1);
        jit.patch_here(r);
        let target = jit.address();
        jit.emit_u32_with_pool(insn::ret());
        let code = jit.end().unwrap();

        let bytes = code.bytes();
        let word = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let veneer = b_imm(word) as usize;
        assert!(veneer > 0 && veneer < 4096);
        let auipc = u32::from_le_bytes(bytes[veneer..veneer + 4].try_into().unwrap());
        assert_eq!(opcode(auipc), insn::OP_AUIPC);
        let slot = veneer + VENEER_TARGET_OFFSET;
        assert_eq!(slot % 8, 0);
        let stored = u64::from_le_bytes(bytes[slot..slot + 8].try_into().unwrap());
        assert_eq!(stored, target);
    }

    #[test]
    fn test_guard_jumps_over_pool() {
        let arena = Bump::new();
        let mut jit = session(&arena);
        let r = jit.emit_cc_jump(insn::beq(Gpr::A0, Gpr::A1, 0));
        let mut guard_at = None;
        for _ in 0..1100 {
            let before = jit.offset();
            jit.emit_u32_with_pool(insn::nop());
            if guard_at.is_none() && jit.offset() > before + 4 {
                guard_at = Some(before + 4);
            }
        }
        jit.patch_here(r);
        let code = jit.end().unwrap();
        let guard_at = guard_at.expect("pool was flushed");
        let guard = u32::from_le_bytes(code.bytes()[guard_at..guard_at + 4].try_into().unwrap());
        assert_eq!(opcode(guard), insn::OP_JAL);
        let after = guard_at + j_imm(guard) as usize;
        // The guard lands on a nop right behind the pool.
        assert_eq!(
            u32::from_le_bytes(code.bytes()[after..after + 4].try_into().unwrap()),
            insn::nop()
        );
    }

    #[test]
    fn test_address_load_slot() {
        let arena = Bump::new();
        let mut jit = session(&arena);
        let r = jit.mov_addr(Gpr::A0);
        jit.patch_there(r, 0x1234_5678_9abc);
        jit.emit_u32_with_pool(insn::ret());
        let code = jit.end().unwrap();
        let bytes = code.bytes();
        let auipc = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let ld = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let slot = ((u_imm(auipc) << 12) + i_imm(ld)) as usize;
        assert_eq!(slot % 8, 0);
        let stored = u64::from_le_bytes(bytes[slot..slot + 8].try_into().unwrap());
        assert_eq!(stored, 0x1234_5678_9abc);
    }

    #[test]
    #[should_panic(expected = "unresolved relocations")]
    fn test_unpatched_relocation_panics() {
        let arena = Bump::new();
        let mut jit = session(&arena);
        let _ = jit.jmp();
        let _ = jit.end();
    }

    #[test]
    fn test_load_budget_within_auipc_reach() {
        let budget = (1i64 << LOAD_OFFSET_BITS) + POOL_HEADER_SIZE as i64;
        let (hi, lo) = split_pcrel(budget);
        assert_eq!((hi << 12) + lo, budget);
        assert!(budget < i32::MAX as i64);
    }

    #[test]
    fn test_range_predicates() {
        assert!(offset_in_jcc_range(-4096));
        assert!(offset_in_jcc_range(4094));
        assert!(!offset_in_jcc_range(4096));
        assert!(!offset_in_jcc_range(3));
        assert!(offset_in_jmp_range(-0x10_0000));
        assert!(!offset_in_jmp_range(0x10_0000));
    }
}
