// This module implements the instruction word formats of the RV64 base ISA as pure
// encode/decode functions over plain integers. Every RISC-V instruction is a 32-bit
// little-endian word whose low seven bits are the major opcode; the remaining bits are
// carved into register numbers, function codes and immediates according to one of the
// R (register-register), R4 (atomic memory operation with funct5 and acquire/release
// bits), I (12-bit signed immediate), IS (RV64 shift with 6-bit shift amount), S (store,
// immediate split in two), B (branch, 13-bit even displacement with scrambled bits),
// U (20-bit upper immediate) and J (21-bit even displacement with scrambled bits)
// layouts. Encoders assert that each field fits its width instead of truncating, so a
// bad operand is caught where it is produced. The decoders and immediate rewriters are
// used by relocation patching and by the reference simulator.

//! RV64 instruction formats.
//!
//! ```text
//! R:   [ funct7 | rs2 | rs1 | funct3 |    rd    | opcode ]
//! R4:  [ f5|aq|rl | rs2 | rs1 | funct3 |  rd    | opcode ]
//! I:   [   imm[11:0]  | rs1 | funct3 |    rd    | opcode ]
//! IS:  [ imm6 | shamt | rs1 | funct3 |    rd    | opcode ]
//! S:   [imm[11:5]| rs2 | rs1 | funct3 | imm[4:0] | opcode ]
//! B:   [imm[12|10:5]|rs2|rs1|funct3|imm[4:1|11] | opcode ]
//! U:   [        imm[31:12]          |    rd    | opcode ]
//! J:   [   imm[20|10:1|11|19:12]    |    rd    | opcode ]
//! ```

/// Whether `v` fits a signed immediate of `bits` bits.
#[inline]
pub const fn fits_signed(v: i64, bits: u32) -> bool {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    v >= min && v <= max
}

#[inline]
pub const fn simm6_p(v: i64) -> bool {
    fits_signed(v, 6)
}

#[inline]
pub const fn simm12_p(v: i64) -> bool {
    fits_signed(v, 12)
}

#[inline]
pub const fn simm20_p(v: i64) -> bool {
    fits_signed(v, 20)
}

#[inline]
pub const fn simm32_p(v: i64) -> bool {
    fits_signed(v, 32)
}

/// Sign-extend the low `bits` bits of `v`.
#[inline]
pub const fn sign_extend(v: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((v << shift) as i64) >> shift
}

#[inline]
fn check_unsigned(value: u32, bits: u32, what: &str) {
    assert!(
        value >> bits == 0,
        "{what} field {value:#x} does not fit in {bits} bits"
    );
}

#[inline]
fn check_common(op: u32, rd: u32, funct3: u32, rs1: u32) {
    check_unsigned(op, 7, "opcode");
    check_unsigned(rd, 5, "rd");
    check_unsigned(funct3, 3, "funct3");
    check_unsigned(rs1, 5, "rs1");
}

// ==== ENCODERS ====

/// Register-register form.
pub fn rtype(op: u32, rd: u32, funct3: u32, rs1: u32, rs2: u32, funct7: u32) -> u32 {
    check_common(op, rd, funct3, rs1);
    check_unsigned(rs2, 5, "rs2");
    check_unsigned(funct7, 7, "funct7");
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | op
}

/// Register form with funct5 and acquire/release ordering bits (atomics).
#[allow(clippy::too_many_arguments)]
pub fn r4type(op: u32, rd: u32, funct3: u32, rs1: u32, rs2: u32, aq: u32, rl: u32, funct5: u32) -> u32 {
    check_common(op, rd, funct3, rs1);
    check_unsigned(rs2, 5, "rs2");
    check_unsigned(aq, 1, "aq");
    check_unsigned(rl, 1, "rl");
    check_unsigned(funct5, 5, "funct5");
    (funct5 << 27) | (aq << 26) | (rl << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | op
}

/// Immediate form with a signed 12-bit immediate.
pub fn itype(op: u32, rd: u32, funct3: u32, rs1: u32, imm: i64) -> u32 {
    check_common(op, rd, funct3, rs1);
    assert!(simm12_p(imm), "I-type immediate {imm} out of range");
    (((imm as u32) & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | op
}

/// RV64 shift-immediate form: 6-bit shift amount plus a 6-bit discriminator.
pub fn istype(op: u32, rd: u32, funct3: u32, rs1: u32, shamt: u32, imm6: u32) -> u32 {
    check_common(op, rd, funct3, rs1);
    check_unsigned(shamt, 6, "shamt");
    check_unsigned(imm6, 6, "shift discriminator");
    (imm6 << 26) | (shamt << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | op
}

/// Store form, the 12-bit immediate split into [11:5] and [4:0].
pub fn stype(op: u32, funct3: u32, rs1: u32, rs2: u32, imm: i64) -> u32 {
    check_common(op, 0, funct3, rs1);
    check_unsigned(rs2, 5, "rs2");
    assert!(simm12_p(imm), "S-type immediate {imm} out of range");
    let imm = imm as u32;
    (((imm >> 5) & 0x7f) << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | ((imm & 0x1f) << 7) | op
}

/// Branch form; `imm` is the even byte displacement in [-4096, 4094].
pub fn btype(op: u32, funct3: u32, rs1: u32, rs2: u32, imm: i64) -> u32 {
    check_common(op, 0, funct3, rs1);
    check_unsigned(rs2, 5, "rs2");
    (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | op | b_imm_bits(imm)
}

/// Upper-immediate form; `imm` is the signed 20-bit value placed in bits [31:12].
pub fn utype(op: u32, rd: u32, imm: i64) -> u32 {
    check_common(op, rd, 0, 0);
    assert!(simm20_p(imm), "U-type immediate {imm} out of range");
    (((imm as u32) & 0xfffff) << 12) | (rd << 7) | op
}

/// Jump form; `imm` is the even byte displacement in [-1 MiB, 1 MiB - 2].
pub fn jtype(op: u32, rd: u32, imm: i64) -> u32 {
    check_common(op, rd, 0, 0);
    (rd << 7) | op | j_imm_bits(imm)
}

fn b_imm_bits(imm: i64) -> u32 {
    assert!(imm & 1 == 0, "branch displacement {imm} is odd");
    assert!(simm12_p(imm >> 1), "branch displacement {imm} out of range");
    let v = imm as u32;
    (((v >> 12) & 0x1) << 31)
        | (((v >> 5) & 0x3f) << 25)
        | (((v >> 1) & 0xf) << 8)
        | (((v >> 11) & 0x1) << 7)
}

fn j_imm_bits(imm: i64) -> u32 {
    assert!(imm & 1 == 0, "jump displacement {imm} is odd");
    assert!(simm20_p(imm >> 1), "jump displacement {imm} out of range");
    let v = imm as u32;
    (((v >> 20) & 0x1) << 31)
        | (((v >> 1) & 0x3ff) << 21)
        | (((v >> 11) & 0x1) << 20)
        | (((v >> 12) & 0xff) << 12)
}

// ==== FIELD ACCESSORS ====

#[inline]
pub const fn opcode(w: u32) -> u32 {
    w & 0x7f
}

#[inline]
pub const fn rd(w: u32) -> u32 {
    (w >> 7) & 0x1f
}

#[inline]
pub const fn funct3(w: u32) -> u32 {
    (w >> 12) & 0x7
}

#[inline]
pub const fn rs1(w: u32) -> u32 {
    (w >> 15) & 0x1f
}

#[inline]
pub const fn rs2(w: u32) -> u32 {
    (w >> 20) & 0x1f
}

#[inline]
pub const fn rs3(w: u32) -> u32 {
    w >> 27
}

#[inline]
pub const fn funct7(w: u32) -> u32 {
    w >> 25
}

// ==== IMMEDIATE DECODERS ====

pub const fn i_imm(w: u32) -> i64 {
    sign_extend((w >> 20) as u64, 12)
}

pub const fn s_imm(w: u32) -> i64 {
    sign_extend((((w >> 25) << 5) | ((w >> 7) & 0x1f)) as u64, 12)
}

pub const fn b_imm(w: u32) -> i64 {
    let raw = (((w >> 31) & 1) << 12)
        | (((w >> 7) & 1) << 11)
        | (((w >> 25) & 0x3f) << 5)
        | (((w >> 8) & 0xf) << 1);
    sign_extend(raw as u64, 13)
}

/// Upper immediate as the signed 20-bit field value (not shifted).
pub const fn u_imm(w: u32) -> i64 {
    sign_extend((w >> 12) as u64, 20)
}

pub const fn j_imm(w: u32) -> i64 {
    let raw = (((w >> 31) & 1) << 20)
        | (((w >> 12) & 0xff) << 12)
        | (((w >> 20) & 1) << 11)
        | (((w >> 21) & 0x3ff) << 1);
    sign_extend(raw as u64, 21)
}

// ==== IMMEDIATE REWRITERS ====

/// Replace the displacement of a B-type word.
pub fn with_b_imm(w: u32, imm: i64) -> u32 {
    (w & 0x01ff_f07f) | b_imm_bits(imm)
}

/// Replace the displacement of a J-type word.
pub fn with_j_imm(w: u32, imm: i64) -> u32 {
    (w & 0x0000_0fff) | j_imm_bits(imm)
}

/// Replace the immediate of an I-type word.
pub fn with_i_imm(w: u32, imm: i64) -> u32 {
    assert!(simm12_p(imm), "I-type immediate {imm} out of range");
    (w & 0x000f_ffff) | (((imm as u32) & 0xfff) << 20)
}

/// Replace the immediate of a U-type word.
pub fn with_u_imm(w: u32, imm: i64) -> u32 {
    assert!(simm20_p(imm), "U-type immediate {imm} out of range");
    (w & 0x0000_0fff) | (((imm as u32) & 0xfffff) << 12)
}

/// Split a PC-relative byte offset into the AUIPC high part and the signed low
/// part of the paired I-type instruction.
pub fn split_pcrel(offset: i64) -> (i64, i64) {
    assert!(
        simm32_p(offset) && offset <= 0x7fff_f7ff,
        "pc-relative offset {offset} out of range"
    );
    let hi = sign_extend((((offset + 0x800) >> 12) & 0xfffff) as u64, 20);
    let lo = sign_extend(offset as u64 & 0xfff, 12);
    (hi, lo)
}
