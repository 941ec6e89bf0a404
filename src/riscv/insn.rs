//! Named RV64IMAFD instruction constructors.
//!
//! Each function returns the encoded 32-bit word; nothing is emitted here. Operand
//! order follows assembly syntax (destination first, then sources), except for stores
//! and store-conditional which take the address register before the value.

use super::encoding::{btype, istype, itype, jtype, r4type, rtype, stype, utype};
use super::regs::{Fpr, Gpr};

// ==== OPCODES ====

pub const OP_LUI: u32 = 0x37;
pub const OP_AUIPC: u32 = 0x17;
pub const OP_JAL: u32 = 0x6f;
pub const OP_JALR: u32 = 0x67;
pub const OP_BRANCH: u32 = 0x63;
pub const OP_LOAD: u32 = 0x03;
pub const OP_STORE: u32 = 0x23;
pub const OP_IMM: u32 = 0x13;
pub const OP_IMM_32: u32 = 0x1b;
pub const OP_REG: u32 = 0x33;
pub const OP_REG_32: u32 = 0x3b;
pub const OP_MISC_MEM: u32 = 0x0f;
pub const OP_SYSTEM: u32 = 0x73;
pub const OP_AMO: u32 = 0x2f;
pub const OP_LOAD_FP: u32 = 0x07;
pub const OP_STORE_FP: u32 = 0x27;
pub const OP_FP: u32 = 0x53;

/// Floating-point rounding modes (the `rm` field).
pub const RM_RNE: u32 = 0;
pub const RM_RTZ: u32 = 1;

/// Fence predecessor/successor set covering device input/output and memory reads/writes.
pub const FENCE_IORW_IORW: i64 = 0xff;

// ==== UPPER IMMEDIATES AND JUMPS ====

pub fn lui(rd: Gpr, imm20: i64) -> u32 {
    utype(OP_LUI, rd.regno(), imm20)
}

pub fn auipc(rd: Gpr, imm20: i64) -> u32 {
    utype(OP_AUIPC, rd.regno(), imm20)
}

pub fn jal(rd: Gpr, offset: i64) -> u32 {
    jtype(OP_JAL, rd.regno(), offset)
}

pub fn jalr(rd: Gpr, rs1: Gpr, offset: i64) -> u32 {
    itype(OP_JALR, rd.regno(), 0, rs1.regno(), offset)
}

// ==== CONDITIONAL BRANCHES ====

pub fn beq(rs1: Gpr, rs2: Gpr, offset: i64) -> u32 {
    btype(OP_BRANCH, 0, rs1.regno(), rs2.regno(), offset)
}

pub fn bne(rs1: Gpr, rs2: Gpr, offset: i64) -> u32 {
    btype(OP_BRANCH, 1, rs1.regno(), rs2.regno(), offset)
}

pub fn blt(rs1: Gpr, rs2: Gpr, offset: i64) -> u32 {
    btype(OP_BRANCH, 4, rs1.regno(), rs2.regno(), offset)
}

pub fn bge(rs1: Gpr, rs2: Gpr, offset: i64) -> u32 {
    btype(OP_BRANCH, 5, rs1.regno(), rs2.regno(), offset)
}

pub fn bltu(rs1: Gpr, rs2: Gpr, offset: i64) -> u32 {
    btype(OP_BRANCH, 6, rs1.regno(), rs2.regno(), offset)
}

pub fn bgeu(rs1: Gpr, rs2: Gpr, offset: i64) -> u32 {
    btype(OP_BRANCH, 7, rs1.regno(), rs2.regno(), offset)
}

// ==== LOADS AND STORES ====

pub fn lb(rd: Gpr, rs1: Gpr, offset: i64) -> u32 {
    itype(OP_LOAD, rd.regno(), 0, rs1.regno(), offset)
}

pub fn lh(rd: Gpr, rs1: Gpr, offset: i64) -> u32 {
    itype(OP_LOAD, rd.regno(), 1, rs1.regno(), offset)
}

pub fn lw(rd: Gpr, rs1: Gpr, offset: i64) -> u32 {
    itype(OP_LOAD, rd.regno(), 2, rs1.regno(), offset)
}

pub fn ld(rd: Gpr, rs1: Gpr, offset: i64) -> u32 {
    itype(OP_LOAD, rd.regno(), 3, rs1.regno(), offset)
}

pub fn lbu(rd: Gpr, rs1: Gpr, offset: i64) -> u32 {
    itype(OP_LOAD, rd.regno(), 4, rs1.regno(), offset)
}

pub fn lhu(rd: Gpr, rs1: Gpr, offset: i64) -> u32 {
    itype(OP_LOAD, rd.regno(), 5, rs1.regno(), offset)
}

pub fn lwu(rd: Gpr, rs1: Gpr, offset: i64) -> u32 {
    itype(OP_LOAD, rd.regno(), 6, rs1.regno(), offset)
}

pub fn sb(base: Gpr, src: Gpr, offset: i64) -> u32 {
    stype(OP_STORE, 0, base.regno(), src.regno(), offset)
}

pub fn sh(base: Gpr, src: Gpr, offset: i64) -> u32 {
    stype(OP_STORE, 1, base.regno(), src.regno(), offset)
}

pub fn sw(base: Gpr, src: Gpr, offset: i64) -> u32 {
    stype(OP_STORE, 2, base.regno(), src.regno(), offset)
}

pub fn sd(base: Gpr, src: Gpr, offset: i64) -> u32 {
    stype(OP_STORE, 3, base.regno(), src.regno(), offset)
}

// ==== INTEGER IMMEDIATE OPERATIONS ====

pub fn addi(rd: Gpr, rs1: Gpr, imm: i64) -> u32 {
    itype(OP_IMM, rd.regno(), 0, rs1.regno(), imm)
}

pub fn slti(rd: Gpr, rs1: Gpr, imm: i64) -> u32 {
    itype(OP_IMM, rd.regno(), 2, rs1.regno(), imm)
}

pub fn sltiu(rd: Gpr, rs1: Gpr, imm: i64) -> u32 {
    itype(OP_IMM, rd.regno(), 3, rs1.regno(), imm)
}

pub fn xori(rd: Gpr, rs1: Gpr, imm: i64) -> u32 {
    itype(OP_IMM, rd.regno(), 4, rs1.regno(), imm)
}

pub fn ori(rd: Gpr, rs1: Gpr, imm: i64) -> u32 {
    itype(OP_IMM, rd.regno(), 6, rs1.regno(), imm)
}

pub fn andi(rd: Gpr, rs1: Gpr, imm: i64) -> u32 {
    itype(OP_IMM, rd.regno(), 7, rs1.regno(), imm)
}

pub fn slli(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    istype(OP_IMM, rd.regno(), 1, rs1.regno(), shamt, 0)
}

pub fn srli(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    istype(OP_IMM, rd.regno(), 5, rs1.regno(), shamt, 0)
}

pub fn srai(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    istype(OP_IMM, rd.regno(), 5, rs1.regno(), shamt, 16)
}

pub fn addiw(rd: Gpr, rs1: Gpr, imm: i64) -> u32 {
    itype(OP_IMM_32, rd.regno(), 0, rs1.regno(), imm)
}

// ==== INTEGER REGISTER OPERATIONS ====

pub fn add(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 0, rs1.regno(), rs2.regno(), 0)
}

pub fn sub(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 0, rs1.regno(), rs2.regno(), 32)
}

pub fn sll(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 1, rs1.regno(), rs2.regno(), 0)
}

pub fn slt(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 2, rs1.regno(), rs2.regno(), 0)
}

pub fn sltu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 3, rs1.regno(), rs2.regno(), 0)
}

pub fn xor(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 4, rs1.regno(), rs2.regno(), 0)
}

pub fn srl(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 5, rs1.regno(), rs2.regno(), 0)
}

pub fn sra(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 5, rs1.regno(), rs2.regno(), 32)
}

pub fn or(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 6, rs1.regno(), rs2.regno(), 0)
}

pub fn and(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 7, rs1.regno(), rs2.regno(), 0)
}

pub fn addw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG_32, rd.regno(), 0, rs1.regno(), rs2.regno(), 0)
}

pub fn subw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG_32, rd.regno(), 0, rs1.regno(), rs2.regno(), 32)
}

// ==== M EXTENSION ====

pub fn mul(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 0, rs1.regno(), rs2.regno(), 1)
}

pub fn mulh(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 1, rs1.regno(), rs2.regno(), 1)
}

pub fn mulhu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 3, rs1.regno(), rs2.regno(), 1)
}

pub fn div(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 4, rs1.regno(), rs2.regno(), 1)
}

pub fn divu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 5, rs1.regno(), rs2.regno(), 1)
}

pub fn rem(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 6, rs1.regno(), rs2.regno(), 1)
}

pub fn remu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    rtype(OP_REG, rd.regno(), 7, rs1.regno(), rs2.regno(), 1)
}

// ==== A EXTENSION ====

pub fn lr_d(rd: Gpr, addr: Gpr, aq: bool, rl: bool) -> u32 {
    r4type(OP_AMO, rd.regno(), 3, addr.regno(), 0, aq as u32, rl as u32, 2)
}

pub fn sc_d(rd: Gpr, addr: Gpr, src: Gpr, aq: bool, rl: bool) -> u32 {
    r4type(OP_AMO, rd.regno(), 3, addr.regno(), src.regno(), aq as u32, rl as u32, 3)
}

pub fn amoswap_d(rd: Gpr, addr: Gpr, src: Gpr, aq: bool, rl: bool) -> u32 {
    r4type(OP_AMO, rd.regno(), 3, addr.regno(), src.regno(), aq as u32, rl as u32, 1)
}

// ==== SYSTEM ====

pub fn fence(pred_succ: i64) -> u32 {
    itype(OP_MISC_MEM, 0, 0, 0, pred_succ)
}

pub fn ecall() -> u32 {
    itype(OP_SYSTEM, 0, 0, 0, 0)
}

pub fn ebreak() -> u32 {
    itype(OP_SYSTEM, 0, 0, 0, 1)
}

// ==== PSEUDO INSTRUCTIONS ====

pub fn nop() -> u32 {
    addi(Gpr::ZERO, Gpr::ZERO, 0)
}

pub fn mv(rd: Gpr, rs: Gpr) -> u32 {
    addi(rd, rs, 0)
}

pub fn not(rd: Gpr, rs: Gpr) -> u32 {
    xori(rd, rs, -1)
}

pub fn neg(rd: Gpr, rs: Gpr) -> u32 {
    sub(rd, Gpr::ZERO, rs)
}

pub fn sext_w(rd: Gpr, rs: Gpr) -> u32 {
    addiw(rd, rs, 0)
}

pub fn seqz(rd: Gpr, rs: Gpr) -> u32 {
    sltiu(rd, rs, 1)
}

pub fn snez(rd: Gpr, rs: Gpr) -> u32 {
    sltu(rd, Gpr::ZERO, rs)
}

pub fn ret() -> u32 {
    jalr(Gpr::ZERO, Gpr::RA, 0)
}

// ==== F AND D EXTENSIONS ====

/// Selects the single- or double-precision variant of an FP instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpWidth {
    Single,
    Double,
}

impl FpWidth {
    /// Low bit of funct7 distinguishing S from D.
    const fn fmt(self) -> u32 {
        match self {
            FpWidth::Single => 0,
            FpWidth::Double => 1,
        }
    }

    /// funct3 of loads and stores.
    const fn mem_funct3(self) -> u32 {
        match self {
            FpWidth::Single => 2,
            FpWidth::Double => 3,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            FpWidth::Single => 4,
            FpWidth::Double => 8,
        }
    }
}

fn fp_op(funct7_base: u32, w: FpWidth, rd: u32, funct3: u32, rs1: u32, rs2: u32) -> u32 {
    rtype(OP_FP, rd, funct3, rs1, rs2, funct7_base | w.fmt())
}

pub fn fload(w: FpWidth, rd: Fpr, base: Gpr, offset: i64) -> u32 {
    itype(OP_LOAD_FP, rd.regno(), w.mem_funct3(), base.regno(), offset)
}

pub fn fstore(w: FpWidth, base: Gpr, src: Fpr, offset: i64) -> u32 {
    stype(OP_STORE_FP, w.mem_funct3(), base.regno(), src.regno(), offset)
}

pub fn fadd(w: FpWidth, rd: Fpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(0, w, rd.regno(), RM_RNE, rs1.regno(), rs2.regno())
}

pub fn fsub(w: FpWidth, rd: Fpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(4, w, rd.regno(), RM_RNE, rs1.regno(), rs2.regno())
}

pub fn fmul(w: FpWidth, rd: Fpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(8, w, rd.regno(), RM_RNE, rs1.regno(), rs2.regno())
}

pub fn fdiv(w: FpWidth, rd: Fpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(12, w, rd.regno(), RM_RNE, rs1.regno(), rs2.regno())
}

pub fn fsqrt(w: FpWidth, rd: Fpr, rs1: Fpr) -> u32 {
    fp_op(44, w, rd.regno(), RM_RNE, rs1.regno(), 0)
}

pub fn fsgnj(w: FpWidth, rd: Fpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(16, w, rd.regno(), 0, rs1.regno(), rs2.regno())
}

pub fn fsgnjn(w: FpWidth, rd: Fpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(16, w, rd.regno(), 1, rs1.regno(), rs2.regno())
}

pub fn fsgnjx(w: FpWidth, rd: Fpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(16, w, rd.regno(), 2, rs1.regno(), rs2.regno())
}

pub fn feq(w: FpWidth, rd: Gpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(80, w, rd.regno(), 2, rs1.regno(), rs2.regno())
}

pub fn flt(w: FpWidth, rd: Gpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(80, w, rd.regno(), 1, rs1.regno(), rs2.regno())
}

pub fn fle(w: FpWidth, rd: Gpr, rs1: Fpr, rs2: Fpr) -> u32 {
    fp_op(80, w, rd.regno(), 0, rs1.regno(), rs2.regno())
}

/// Integer width selector of conversions (the `rs2` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W = 0,
    Wu = 1,
    L = 2,
    Lu = 3,
}

/// `fcvt.{w,wu,l,lu}.{s,d}`: float to integer.
pub fn fcvt_to_int(w: FpWidth, iw: IntWidth, rd: Gpr, rs1: Fpr, rm: u32) -> u32 {
    fp_op(96, w, rd.regno(), rm, rs1.regno(), iw as u32)
}

/// `fcvt.{s,d}.{w,wu,l,lu}`: integer to float.
pub fn fcvt_from_int(w: FpWidth, iw: IntWidth, rd: Fpr, rs1: Gpr, rm: u32) -> u32 {
    fp_op(104, w, rd.regno(), rm, rs1.regno(), iw as u32)
}

/// `fcvt.s.d`
pub fn fcvt_s_d(rd: Fpr, rs1: Fpr) -> u32 {
    rtype(OP_FP, rd.regno(), RM_RNE, rs1.regno(), 1, 32)
}

/// `fcvt.d.s`
pub fn fcvt_d_s(rd: Fpr, rs1: Fpr) -> u32 {
    rtype(OP_FP, rd.regno(), RM_RNE, rs1.regno(), 0, 33)
}

/// `fmv.x.w` / `fmv.x.d`: raw bits to an integer register.
pub fn fmv_to_int(w: FpWidth, rd: Gpr, rs1: Fpr) -> u32 {
    fp_op(112, w, rd.regno(), 0, rs1.regno(), 0)
}

/// `fmv.w.x` / `fmv.d.x`: raw bits from an integer register.
pub fn fmv_from_int(w: FpWidth, rd: Fpr, rs1: Gpr) -> u32 {
    fp_op(120, w, rd.regno(), 0, rs1.regno(), 0)
}

pub fn fmv(w: FpWidth, rd: Fpr, rs: Fpr) -> u32 {
    fsgnj(w, rd, rs, rs)
}

pub fn fneg(w: FpWidth, rd: Fpr, rs: Fpr) -> u32 {
    fsgnjn(w, rd, rs, rs)
}

pub fn fabs(w: FpWidth, rd: Fpr, rs: Fpr) -> u32 {
    fsgnjx(w, rd, rs, rs)
}
