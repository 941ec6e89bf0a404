// This module is a small reference interpreter for the RV64IMAFD instructions the
// backend emits, so that generated code can be executed and checked on any host. The
// machine state is 32 integer and 32 floating-point registers (single-precision values
// are NaN-boxed in the 64-bit FP registers as on real hardware) plus a sparse paged
// memory. Code is loaded at the address it was emitted for, so pc-relative sequences,
// literal pools and absolute calls all behave exactly as they would natively. Host
// functions are Rust closures registered at fake addresses: when control reaches one,
// the closure sees the machine state, then execution returns through `ra`. A call runs
// until control returns to a sentinel address, a trap occurs, or the step limit is hit.

//! Reference RV64 interpreter for executing emitted code.

use hashbrown::HashMap;
use log::trace;
use thiserror::Error;

use super::encoding::{b_imm, funct3, funct7, i_imm, j_imm, opcode, rd, rs1, rs2, s_imm, u_imm};
use super::insn::{
    OP_AMO, OP_AUIPC, OP_BRANCH, OP_FP, OP_IMM, OP_IMM_32, OP_JAL, OP_JALR, OP_LOAD, OP_LOAD_FP,
    OP_LUI, OP_MISC_MEM, OP_REG, OP_REG_32, OP_STORE, OP_STORE_FP, OP_SYSTEM,
};
use super::jit::FinishedCode;
use super::regs::{Fpr, Gpr};

const PAGE_SHIFT: u32 = 12;
const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

/// Highest address of the simulated stack (exclusive).
pub const STACK_TOP: u64 = 0x1000_0000;
/// Size of the simulated stack.
pub const STACK_SIZE: usize = 1 << 20;
/// Base of the address range handed out to host functions.
pub const HOST_BASE: u64 = 0x2000_0000;
/// Return address of [`Simulator::call`]; reaching it ends the run.
pub const RETURN_SENTINEL: u64 = 0x3000_0000;

const CANONICAL_NAN_F32: u32 = 0x7fc0_0000;
const CANONICAL_NAN_F64: u64 = 0x7ff8_0000_0000_0000;
const NAN_BOX: u64 = 0xffff_ffff_0000_0000;

/// Why a simulated run stopped early.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("breakpoint at {pc:#x}")]
    Breakpoint { pc: u64 },

    #[error("environment call at {pc:#x}")]
    EnvironmentCall { pc: u64 },

    #[error("illegal instruction {word:#010x} at {pc:#x}")]
    IllegalInstruction { pc: u64, word: u32 },

    #[error("access to unmapped address {addr:#x}")]
    Unmapped { addr: u64 },

    #[error("step limit of {limit} instructions exceeded")]
    StepLimit { limit: u64 },
}

pub type SimResult<T> = Result<T, SimError>;

/// Registers and memory of the simulated hart.
pub struct Machine {
    pub x: [u64; 32],
    /// Raw FP register contents; single-precision values are NaN-boxed.
    pub f: [u64; 32],
    pub pc: u64,
    pages: HashMap<u64, Box<[u8; PAGE_SIZE]>>,
    reservation: Option<u64>,
}

impl Machine {
    fn new() -> Self {
        Self {
            x: [0; 32],
            f: [0; 32],
            pc: 0,
            pages: HashMap::new(),
            reservation: None,
        }
    }

    pub fn gpr(&self, r: Gpr) -> u64 {
        self.x[r.regno() as usize]
    }

    pub fn set_gpr(&mut self, r: Gpr, value: u64) {
        if r != Gpr::ZERO {
            self.x[r.regno() as usize] = value;
        }
    }

    pub fn fpr_f64(&self, r: Fpr) -> f64 {
        f64::from_bits(self.f[r.regno() as usize])
    }

    pub fn set_fpr_f64(&mut self, r: Fpr, value: f64) {
        self.f[r.regno() as usize] = value.to_bits();
    }

    /// Single-precision view; an improperly boxed value reads as the canonical NaN.
    pub fn fpr_f32(&self, r: Fpr) -> f32 {
        f32::from_bits(self.read_f32_bits(r.regno()))
    }

    pub fn set_fpr_f32(&mut self, r: Fpr, value: f32) {
        self.write_f32_bits(r.regno(), value.to_bits());
    }

    fn read_f32_bits(&self, n: u32) -> u32 {
        let raw = self.f[n as usize];
        if raw & NAN_BOX == NAN_BOX {
            raw as u32
        } else {
            CANONICAL_NAN_F32
        }
    }

    fn write_f32_bits(&mut self, n: u32, bits: u32) {
        self.f[n as usize] = NAN_BOX | bits as u64;
    }

    // ==== MEMORY ====

    /// Make `[addr, addr + len)` accessible, zero-filling new pages.
    pub fn map(&mut self, addr: u64, len: usize) {
        if len == 0 {
            return;
        }
        let first = addr >> PAGE_SHIFT;
        let last = (addr + len as u64 - 1) >> PAGE_SHIFT;
        for page in first..=last {
            self.pages
                .entry(page)
                .or_insert_with(|| Box::new([0; PAGE_SIZE]));
        }
    }

    /// Map and fill `[addr, addr + bytes.len())`.
    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) {
        self.map(addr, bytes.len());
        for (i, &b) in bytes.iter().enumerate() {
            let a = addr + i as u64;
            if let Some(page) = self.pages.get_mut(&(a >> PAGE_SHIFT)) {
                page[(a & PAGE_MASK) as usize] = b;
            }
        }
    }

    /// Little-endian read of `n` bytes.
    pub fn read(&self, addr: u64, n: usize) -> SimResult<u64> {
        let mut value = 0u64;
        for i in 0..n {
            let a = addr.wrapping_add(i as u64);
            let page = self
                .pages
                .get(&(a >> PAGE_SHIFT))
                .ok_or(SimError::Unmapped { addr: a })?;
            value |= (page[(a & PAGE_MASK) as usize] as u64) << (8 * i);
        }
        Ok(value)
    }

    /// Little-endian write of the low `n` bytes of `value`.
    pub fn write(&mut self, addr: u64, n: usize, value: u64) -> SimResult<()> {
        for i in 0..n {
            let a = addr.wrapping_add(i as u64);
            let page = self
                .pages
                .get_mut(&(a >> PAGE_SHIFT))
                .ok_or(SimError::Unmapped { addr: a })?;
            page[(a & PAGE_MASK) as usize] = (value >> (8 * i)) as u8;
        }
        if self.reservation.is_some_and(|r| r >> 3 == addr >> 3) {
            self.reservation = None;
        }
        Ok(())
    }

    // ==== EXECUTION ====

    fn step(&mut self) -> SimResult<()> {
        let pc = self.pc;
        let word = self.read(pc, 4)? as u32;
        trace!("sim {pc:#x}: {word:#010x}");
        let illegal = SimError::IllegalInstruction { pc, word };

        let rd_n = rd(word) as usize;
        let a = self.x[rs1(word) as usize];
        let b = self.x[rs2(word) as usize];
        let mut next = pc.wrapping_add(4);

        match opcode(word) {
            OP_LUI => self.x[rd_n] = (u_imm(word) << 12) as u64,
            OP_AUIPC => self.x[rd_n] = pc.wrapping_add((u_imm(word) << 12) as u64),
            OP_JAL => {
                self.x[rd_n] = next;
                next = pc.wrapping_add(j_imm(word) as u64);
            }
            OP_JALR => {
                let target = a.wrapping_add(i_imm(word) as u64) & !1;
                self.x[rd_n] = next;
                next = target;
            }
            OP_BRANCH => {
                let taken = match funct3(word) {
                    0 => a == b,
                    1 => a != b,
                    4 => (a as i64) < (b as i64),
                    5 => (a as i64) >= (b as i64),
                    6 => a < b,
                    7 => a >= b,
                    _ => return Err(illegal),
                };
                if taken {
                    next = pc.wrapping_add(b_imm(word) as u64);
                }
            }
            OP_LOAD => {
                let addr = a.wrapping_add(i_imm(word) as u64);
                self.x[rd_n] = match funct3(word) {
                    0 => self.read(addr, 1)? as i8 as u64,
                    1 => self.read(addr, 2)? as i16 as u64,
                    2 => self.read(addr, 4)? as i32 as u64,
                    3 => self.read(addr, 8)?,
                    4 => self.read(addr, 1)?,
                    5 => self.read(addr, 2)?,
                    6 => self.read(addr, 4)?,
                    _ => return Err(illegal),
                };
            }
            OP_STORE => {
                let addr = a.wrapping_add(s_imm(word) as u64);
                match funct3(word) {
                    f @ 0..=3 => self.write(addr, 1 << f, b)?,
                    _ => return Err(illegal),
                }
            }
            OP_IMM => {
                let imm = i_imm(word) as u64;
                let shamt = (word >> 20) & 0x3f;
                self.x[rd_n] = match funct3(word) {
                    0 => a.wrapping_add(imm),
                    1 => a << shamt,
                    2 => ((a as i64) < (imm as i64)) as u64,
                    3 => (a < imm) as u64,
                    4 => a ^ imm,
                    5 if word >> 30 & 1 == 1 => ((a as i64) >> shamt) as u64,
                    5 => a >> shamt,
                    6 => a | imm,
                    7 => a & imm,
                    _ => unreachable!(),
                };
            }
            OP_IMM_32 => {
                let a32 = a as u32;
                let shamt = (word >> 20) & 0x1f;
                let r = match funct3(word) {
                    0 => a32.wrapping_add(i_imm(word) as u32),
                    1 => a32 << shamt,
                    5 if word >> 30 & 1 == 1 => ((a32 as i32) >> shamt) as u32,
                    5 => a32 >> shamt,
                    _ => return Err(illegal),
                };
                self.x[rd_n] = r as i32 as u64;
            }
            OP_REG => self.x[rd_n] = alu64(word, a, b).ok_or(illegal)?,
            OP_REG_32 => self.x[rd_n] = alu32(word, a as u32, b as u32).ok_or(illegal)? as i32 as u64,
            OP_MISC_MEM => {}
            OP_SYSTEM => {
                return Err(match word >> 20 {
                    0 => SimError::EnvironmentCall { pc },
                    1 => SimError::Breakpoint { pc },
                    _ => illegal,
                })
            }
            OP_AMO if funct3(word) == 3 => match word >> 27 {
                // lr.d
                0b00010 => {
                    self.x[rd_n] = self.read(a, 8)?;
                    self.reservation = Some(a);
                }
                // sc.d
                0b00011 => {
                    if self.reservation == Some(a) {
                        self.write(a, 8, b)?;
                        self.x[rd_n] = 0;
                    } else {
                        self.x[rd_n] = 1;
                    }
                    self.reservation = None;
                }
                // amoswap.d
                0b00001 => {
                    let old = self.read(a, 8)?;
                    self.write(a, 8, b)?;
                    self.x[rd_n] = old;
                }
                _ => return Err(illegal),
            },
            OP_LOAD_FP => {
                let addr = a.wrapping_add(i_imm(word) as u64);
                match funct3(word) {
                    2 => {
                        let bits = self.read(addr, 4)? as u32;
                        self.write_f32_bits(rd_n as u32, bits);
                    }
                    3 => self.f[rd_n] = self.read(addr, 8)?,
                    _ => return Err(illegal),
                }
            }
            OP_STORE_FP => {
                let addr = a.wrapping_add(s_imm(word) as u64);
                let src = self.f[rs2(word) as usize];
                match funct3(word) {
                    2 => self.write(addr, 4, src)?,
                    3 => self.write(addr, 8, src)?,
                    _ => return Err(illegal),
                }
            }
            OP_FP => self.fp_op(word).ok_or(illegal)?,
            _ => return Err(illegal),
        }

        self.x[0] = 0;
        self.pc = next;
        Ok(())
    }

    fn fp_op(&mut self, word: u32) -> Option<()> {
        let funct5 = funct7(word) >> 2;
        let double = match funct7(word) & 3 {
            0 => false,
            1 => true,
            _ => return None,
        };
        let (d, s1, s2) = (rd(word), rs1(word), rs2(word));
        let rm = funct3(word);
        let int_src = self.x[s1 as usize];

        match funct5 {
            // fadd, fsub, fmul, fdiv, fsqrt, fmin/fmax
            0..=3 | 5 | 11 => {
                if double {
                    let (x, y) = (f64::from_bits(self.f[s1 as usize]), f64::from_bits(self.f[s2 as usize]));
                    let r = match funct5 {
                        0 => x + y,
                        1 => x - y,
                        2 => x * y,
                        3 => x / y,
                        5 if rm == 0 => x.min(y),
                        5 => x.max(y),
                        _ => x.sqrt(),
                    };
                    self.f[d as usize] = canonical_f64(r);
                } else {
                    let (x, y) = (
                        f32::from_bits(self.read_f32_bits(s1)),
                        f32::from_bits(self.read_f32_bits(s2)),
                    );
                    let r = match funct5 {
                        0 => x + y,
                        1 => x - y,
                        2 => x * y,
                        3 => x / y,
                        5 if rm == 0 => x.min(y),
                        5 => x.max(y),
                        _ => x.sqrt(),
                    };
                    self.write_f32_bits(d, canonical_f32(r));
                }
            }
            // fsgnj, fsgnjn, fsgnjx
            4 => {
                if double {
                    let (x, y) = (self.f[s1 as usize], self.f[s2 as usize]);
                    self.f[d as usize] = sign_inject(x, y, rm, 63)?;
                } else {
                    let (x, y) = (self.read_f32_bits(s1) as u64, self.read_f32_bits(s2) as u64);
                    self.write_f32_bits(d, sign_inject(x, y, rm, 31)? as u32);
                }
            }
            // fcvt.s.d / fcvt.d.s
            8 => {
                if double {
                    let x = f32::from_bits(self.read_f32_bits(s1));
                    self.f[d as usize] = canonical_f64(x as f64);
                } else {
                    let x = f64::from_bits(self.f[s1 as usize]);
                    self.write_f32_bits(d, canonical_f32(x as f32));
                }
            }
            // feq, flt, fle
            20 => {
                let (x, y) = if double {
                    (f64::from_bits(self.f[s1 as usize]), f64::from_bits(self.f[s2 as usize]))
                } else {
                    (
                        f32::from_bits(self.read_f32_bits(s1)) as f64,
                        f32::from_bits(self.read_f32_bits(s2)) as f64,
                    )
                };
                let r = match rm {
                    2 => x == y,
                    1 => x < y,
                    0 => x <= y,
                    _ => return None,
                };
                self.x[d as usize] = r as u64;
            }
            // fcvt.{w,wu,l,lu}.{s,d}
            24 => {
                let x = if double {
                    f64::from_bits(self.f[s1 as usize])
                } else {
                    f32::from_bits(self.read_f32_bits(s1)) as f64
                };
                let x = round(x, rm)?;
                self.x[d as usize] = match s2 {
                    0 => (if x.is_nan() { i32::MAX } else { x as i32 }) as i64 as u64,
                    1 => (if x.is_nan() { u32::MAX } else { x as u32 }) as i32 as i64 as u64,
                    2 => (if x.is_nan() { i64::MAX } else { x as i64 }) as u64,
                    3 => if x.is_nan() { u64::MAX } else { x as u64 },
                    _ => return None,
                };
            }
            // fcvt.{s,d}.{w,wu,l,lu}
            26 => {
                let v = int_src;
                if double {
                    let r = match s2 {
                        0 => v as i32 as f64,
                        1 => v as u32 as f64,
                        2 => v as i64 as f64,
                        3 => v as f64,
                        _ => return None,
                    };
                    self.f[d as usize] = r.to_bits();
                } else {
                    let r = match s2 {
                        0 => v as i32 as f32,
                        1 => v as u32 as f32,
                        2 => v as i64 as f32,
                        3 => v as f32,
                        _ => return None,
                    };
                    self.write_f32_bits(d, r.to_bits());
                }
            }
            // fmv.x.w / fmv.x.d
            28 if rm == 0 => {
                let raw = self.f[s1 as usize];
                self.x[d as usize] = if double { raw } else { raw as u32 as i32 as i64 as u64 };
            }
            // fmv.w.x / fmv.d.x
            30 => {
                if double {
                    self.f[d as usize] = int_src;
                } else {
                    self.write_f32_bits(d, int_src as u32);
                }
            }
            _ => return None,
        }
        Some(())
    }
}

fn alu64(word: u32, a: u64, b: u64) -> Option<u64> {
    let shamt = b & 0x3f;
    Some(match (funct7(word), funct3(word)) {
        (0x00, 0) => a.wrapping_add(b),
        (0x20, 0) => a.wrapping_sub(b),
        (0x00, 1) => a << shamt,
        (0x00, 2) => ((a as i64) < (b as i64)) as u64,
        (0x00, 3) => (a < b) as u64,
        (0x00, 4) => a ^ b,
        (0x00, 5) => a >> shamt,
        (0x20, 5) => ((a as i64) >> shamt) as u64,
        (0x00, 6) => a | b,
        (0x00, 7) => a & b,
        (0x01, 0) => a.wrapping_mul(b),
        (0x01, 1) => ((a as i64 as i128 * b as i64 as i128) >> 64) as u64,
        (0x01, 2) => ((a as i64 as i128 * b as i128) >> 64) as u64,
        (0x01, 3) => ((a as u128 * b as u128) >> 64) as u64,
        (0x01, 4) => match (a as i64, b as i64) {
            (_, 0) => u64::MAX,
            (x, y) => x.wrapping_div(y) as u64,
        },
        (0x01, 5) => a.checked_div(b).unwrap_or(u64::MAX),
        (0x01, 6) => match (a as i64, b as i64) {
            (x, 0) => x as u64,
            (x, y) => x.wrapping_rem(y) as u64,
        },
        (0x01, 7) => a.checked_rem(b).unwrap_or(a),
        _ => return None,
    })
}

fn alu32(word: u32, a: u32, b: u32) -> Option<u32> {
    let shamt = b & 0x1f;
    Some(match (funct7(word), funct3(word)) {
        (0x00, 0) => a.wrapping_add(b),
        (0x20, 0) => a.wrapping_sub(b),
        (0x00, 1) => a << shamt,
        (0x00, 5) => a >> shamt,
        (0x20, 5) => ((a as i32) >> shamt) as u32,
        (0x01, 0) => a.wrapping_mul(b),
        (0x01, 4) => match (a as i32, b as i32) {
            (_, 0) => u32::MAX,
            (x, y) => x.wrapping_div(y) as u32,
        },
        (0x01, 5) => a.checked_div(b).unwrap_or(u32::MAX),
        (0x01, 6) => match (a as i32, b as i32) {
            (x, 0) => x as u32,
            (x, y) => x.wrapping_rem(y) as u32,
        },
        (0x01, 7) => a.checked_rem(b).unwrap_or(a),
        _ => return None,
    })
}

fn sign_inject(x: u64, y: u64, mode: u32, sign_bit: u32) -> Option<u64> {
    let sign = 1u64 << sign_bit;
    let new_sign = match mode {
        0 => y & sign,
        1 => !y & sign,
        2 => (x ^ y) & sign,
        _ => return None,
    };
    Some((x & !sign) | new_sign)
}

/// Round to an integral value per the instruction's rounding mode.
fn round(x: f64, rm: u32) -> Option<f64> {
    Some(match rm {
        // rne, dyn (the simulated fcsr always holds rne)
        0 | 7 => x.round_ties_even(),
        1 => x.trunc(),
        2 => x.floor(),
        3 => x.ceil(),
        4 => x.round(),
        _ => return None,
    })
}

fn canonical_f64(x: f64) -> u64 {
    if x.is_nan() {
        CANONICAL_NAN_F64
    } else {
        x.to_bits()
    }
}

fn canonical_f32(x: f32) -> u32 {
    if x.is_nan() {
        CANONICAL_NAN_F32
    } else {
        x.to_bits()
    }
}

type HostFn = Box<dyn FnMut(&mut Machine)>;

/// Interpreter with host-function support.
pub struct Simulator {
    machine: Machine,
    hosts: HashMap<u64, HostFn>,
    step_limit: u64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        let mut machine = Machine::new();
        machine.map(STACK_TOP - STACK_SIZE as u64, STACK_SIZE);
        Self {
            machine,
            hosts: HashMap::new(),
            step_limit: 1_000_000,
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Copy finished code to the address it was emitted for.
    pub fn load_code(&mut self, code: &FinishedCode) {
        self.machine.write_bytes(code.address(), code.bytes());
    }

    /// Register `f` and return the address that calls it. The closure runs with
    /// the argument registers as the caller left them; its return value goes in
    /// whatever registers it writes.
    pub fn register_host(&mut self, f: impl FnMut(&mut Machine) + 'static) -> u64 {
        let addr = HOST_BASE + 16 * self.hosts.len() as u64;
        self.hosts.insert(addr, Box::new(f));
        addr
    }

    /// Call `entry` with integer arguments in `a0..`, returning `a0`.
    pub fn call(&mut self, entry: u64, args: &[u64]) -> SimResult<u64> {
        assert!(args.len() <= 8, "at most eight register arguments");
        for (i, &arg) in args.iter().enumerate() {
            self.machine.x[Gpr::A0.regno() as usize + i] = arg;
        }
        self.machine.set_gpr(Gpr::SP, STACK_TOP);
        self.machine.set_gpr(Gpr::RA, RETURN_SENTINEL);
        self.machine.pc = entry;
        self.run()?;
        Ok(self.machine.gpr(Gpr::A0))
    }

    /// Execute from the current pc until it reaches [`RETURN_SENTINEL`].
    pub fn run(&mut self) -> SimResult<()> {
        let mut steps = 0u64;
        while self.machine.pc != RETURN_SENTINEL {
            if steps == self.step_limit {
                return Err(SimError::StepLimit {
                    limit: self.step_limit,
                });
            }
            steps += 1;
            if let Some(host) = self.hosts.get_mut(&self.machine.pc) {
                host(&mut self.machine);
                self.machine.x[0] = 0;
                self.machine.pc = self.machine.gpr(Gpr::RA);
                continue;
            }
            self.machine.step()?;
        }
        Ok(())
    }
}

impl std::ops::Deref for Simulator {
    type Target = Machine;

    fn deref(&self) -> &Machine {
        &self.machine
    }
}

impl std::ops::DerefMut for Simulator {
    fn deref_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }
}
