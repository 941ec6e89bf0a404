// This module provides the emission buffer that generated RISC-V code is written into.
// CodeBuffer owns an anonymous private mapping obtained from mmap through libc, sized
// up to whole pages, and exposes an append-only write cursor with little-endian emit
// helpers for 8/16/32/64-bit units plus random-access patch/read helpers used when
// relocations are resolved. Code is generated at its final address, so the absolute
// address of every byte is known while emitting; PC-relative displacements and call
// offsets are computed against it. Running past the end does not panic: the buffer
// records an overflow, stops writing and keeps counting the bytes that were requested,
// so the session can report how much space a retry needs. Once a session ends the
// buffer can be flipped to read+execute (W^X) and the instruction cache flushed.

//! Page-mapped code buffer with overflow tracking.

use std::ptr;

use super::config::JitConfig;
use super::error::{JitError, JitResult};

/// JIT code buffer backed by mmap'd memory.
///
/// The buffer is either writable or executable, never both.
pub struct CodeBuffer {
    ptr: *mut u8,
    size: usize,
    offset: usize,
    /// Bytes requested so far, including those dropped after an overflow.
    requested: usize,
    overflow: bool,
}

// SAFETY: CodeBuffer owns its mapping exclusively.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Map a new buffer of at least `size` bytes (rounded up to the page size).
    pub fn new(size: usize) -> JitResult<Self> {
        let page = page_size();
        let size = (size.max(1) + page - 1) & !(page - 1);

        // SAFETY: anonymous private mapping, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(JitError::map_failed(size));
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size,
            offset: 0,
            requested: 0,
            overflow: false,
        })
    }

    /// Map a buffer sized by the session configuration.
    pub fn with_config(config: &JitConfig) -> JitResult<Self> {
        Self::new(config.buffer_size)
    }

    /// Absolute address of the first byte.
    #[inline]
    pub fn base_address(&self) -> u64 {
        self.ptr as u64
    }

    /// Absolute address of the write cursor.
    #[inline]
    pub fn current_address(&self) -> u64 {
        self.base_address() + self.offset as u64
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.size - self.offset
    }

    /// Whether an emit was dropped for lack of room.
    #[inline]
    pub fn has_overflow(&self) -> bool {
        self.overflow
    }

    /// Total bytes requested, which exceeds the capacity after an overflow.
    #[inline]
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Rewind the cursor and forget any overflow.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.requested = 0;
        self.overflow = false;
    }

    #[inline]
    fn reserve(&mut self, len: usize) -> bool {
        self.requested += len;
        if self.overflow || self.offset + len > self.size {
            self.overflow = true;
            return false;
        }
        true
    }

    // -- Emit methods --

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        if self.reserve(4) {
            unsafe { (self.ptr.add(self.offset) as *mut u32).write_unaligned(val.to_le()) };
            self.offset += 4;
        }
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        if self.reserve(8) {
            unsafe { (self.ptr.add(self.offset) as *mut u64).write_unaligned(val.to_le()) };
            self.offset += 8;
        }
    }

    /// Patch a u32 at the given offset.
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        assert!(offset + 4 <= self.offset, "patch outside emitted code");
        unsafe { (self.ptr.add(offset) as *mut u32).write_unaligned(val.to_le()) };
    }

    /// Patch a u64 at the given offset.
    #[inline]
    pub fn patch_u64(&mut self, offset: usize, val: u64) {
        assert!(offset + 8 <= self.offset, "patch outside emitted code");
        unsafe { (self.ptr.add(offset) as *mut u64).write_unaligned(val.to_le()) };
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.offset, "read outside emitted code");
        u32::from_le(unsafe { (self.ptr.add(offset) as *const u32).read_unaligned() })
    }

    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        assert!(offset + 8 <= self.offset, "read outside emitted code");
        u64::from_le(unsafe { (self.ptr.add(offset) as *const u64).read_unaligned() })
    }

    /// Offset of an absolute address inside the buffer, if it falls inside.
    pub fn offset_of(&self, address: u64) -> Option<usize> {
        let base = self.base_address();
        (address >= base && address < base + self.size as u64).then(|| (address - base) as usize)
    }

    // -- Permission management (W^X) --

    /// Make the buffer executable and non-writable, then flush the instruction cache.
    pub fn set_executable(&self) -> JitResult<()> {
        let ret = unsafe {
            libc::mprotect(
                self.ptr as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if ret != 0 {
            return Err(JitError::protect());
        }
        self.flush_icache();
        Ok(())
    }

    #[cfg(all(target_arch = "riscv64", target_os = "linux"))]
    fn flush_icache(&self) {
        // riscv_flush_icache(start, end, flags = 0: all harts)
        const SYS_RISCV_FLUSH_ICACHE: libc::c_long = 259;
        unsafe {
            libc::syscall(
                SYS_RISCV_FLUSH_ICACHE,
                self.ptr as usize,
                self.ptr as usize + self.offset,
                0usize,
            );
        }
    }

    #[cfg(not(all(target_arch = "riscv64", target_os = "linux")))]
    fn flush_icache(&self) {}

    /// The emitted code as a byte slice (up to the current offset).
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+offset has been written.
        unsafe { std::slice::from_raw_parts(self.ptr, self.offset) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

impl std::fmt::Debug for CodeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeBuffer")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("offset", &self.offset)
            .field("capacity", &self.size)
            .field("overflow", &self.overflow)
            .finish()
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_little_endian_words() {
        let mut buf = CodeBuffer::new(64).unwrap();
        buf.emit_u32(0x0000_0013);
        buf.emit_u64(0x1122_3344_5566_7788);
        assert_eq!(buf.offset(), 12);
        assert_eq!(&buf.as_slice()[..4], &[0x13, 0, 0, 0]);
        assert_eq!(buf.read_u64(4), 0x1122_3344_5566_7788);
    }

    #[test]
    fn overflow_stops_writing_but_counts() {
        let mut buf = CodeBuffer::new(1).unwrap();
        let cap = buf.capacity();
        for _ in 0..cap / 4 {
            buf.emit_u32(0);
        }
        assert!(!buf.has_overflow());
        buf.emit_u32(0);
        buf.emit_u64(0);
        assert!(buf.has_overflow());
        assert_eq!(buf.offset(), cap);
        assert_eq!(buf.requested(), cap + 12);

        buf.clear();
        assert!(!buf.has_overflow());
        assert_eq!(buf.offset(), 0);
    }

    #[test]
    fn patch_rewrites_in_place() {
        let mut buf = CodeBuffer::new(64).unwrap();
        buf.emit_u32(1);
        buf.emit_u32(2);
        buf.patch_u32(4, 0xdead_beef);
        assert_eq!(buf.read_u32(4), 0xdead_beef);
        assert_eq!(buf.read_u32(0), 1);
    }

    #[test]
    fn offset_of_maps_addresses() {
        let mut buf = CodeBuffer::new(64).unwrap();
        buf.emit_u32(0);
        let base = buf.base_address();
        assert_eq!(buf.offset_of(base + 4), Some(4));
        assert_eq!(buf.offset_of(base.wrapping_sub(4)), None);
    }
}
