//! RISC-V register names and ABI register tables.
//!
//! Names follow the standard psABI assignment. The tables at the bottom are the
//! architecture configuration the rest of the backend reads: which registers are
//! never touched, which are lent out as scratch, which carry arguments, and which
//! a function must preserve.

use std::fmt;

use crate::core::register_file::{AsmReg, RegBitSet, FP_BANK, GP_BANK};

/// General-purpose register `x0`..`x31`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gpr(u8);

/// Floating-point register `f0`..`f31`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fpr(u8);

const GPR_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

const FPR_NAMES: [&str; 32] = [
    "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "fs0", "fs1", "fa0", "fa1", "fa2",
    "fa3", "fa4", "fa5", "fa6", "fa7", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9",
    "fs10", "fs11", "ft8", "ft9", "ft10", "ft11",
];

impl Gpr {
    pub const fn new(n: u8) -> Self {
        assert!(n < 32, "GPR index out of range");
        Gpr(n)
    }

    /// Register number as an encoder field.
    #[inline]
    pub const fn regno(self) -> u32 {
        self.0 as u32
    }

    pub const fn asm_reg(self) -> AsmReg {
        AsmReg::new(GP_BANK, self.0)
    }

    pub const ZERO: Gpr = Gpr(0);
    pub const RA: Gpr = Gpr(1);
    pub const SP: Gpr = Gpr(2);
    pub const GP: Gpr = Gpr(3);
    pub const TP: Gpr = Gpr(4);
    pub const T0: Gpr = Gpr(5);
    pub const T1: Gpr = Gpr(6);
    pub const T2: Gpr = Gpr(7);
    pub const S0: Gpr = Gpr(8);
    pub const FP: Gpr = Gpr(8);
    pub const S1: Gpr = Gpr(9);
    pub const A0: Gpr = Gpr(10);
    pub const A1: Gpr = Gpr(11);
    pub const A2: Gpr = Gpr(12);
    pub const A3: Gpr = Gpr(13);
    pub const A4: Gpr = Gpr(14);
    pub const A5: Gpr = Gpr(15);
    pub const A6: Gpr = Gpr(16);
    pub const A7: Gpr = Gpr(17);
    pub const S2: Gpr = Gpr(18);
    pub const S3: Gpr = Gpr(19);
    pub const S4: Gpr = Gpr(20);
    pub const S5: Gpr = Gpr(21);
    pub const S6: Gpr = Gpr(22);
    pub const S7: Gpr = Gpr(23);
    pub const S8: Gpr = Gpr(24);
    pub const S9: Gpr = Gpr(25);
    pub const S10: Gpr = Gpr(26);
    pub const S11: Gpr = Gpr(27);
    pub const T3: Gpr = Gpr(28);
    pub const T4: Gpr = Gpr(29);
    pub const T5: Gpr = Gpr(30);
    pub const T6: Gpr = Gpr(31);
}

impl Fpr {
    pub const fn new(n: u8) -> Self {
        assert!(n < 32, "FPR index out of range");
        Fpr(n)
    }

    #[inline]
    pub const fn regno(self) -> u32 {
        self.0 as u32
    }

    pub const fn asm_reg(self) -> AsmReg {
        AsmReg::new(FP_BANK, self.0)
    }

    pub const FT0: Fpr = Fpr(0);
    pub const FT1: Fpr = Fpr(1);
    pub const FT2: Fpr = Fpr(2);
    pub const FT3: Fpr = Fpr(3);
    pub const FT4: Fpr = Fpr(4);
    pub const FT5: Fpr = Fpr(5);
    pub const FT6: Fpr = Fpr(6);
    pub const FT7: Fpr = Fpr(7);
    pub const FS0: Fpr = Fpr(8);
    pub const FS1: Fpr = Fpr(9);
    pub const FA0: Fpr = Fpr(10);
    pub const FA1: Fpr = Fpr(11);
    pub const FA2: Fpr = Fpr(12);
    pub const FA3: Fpr = Fpr(13);
    pub const FA4: Fpr = Fpr(14);
    pub const FA5: Fpr = Fpr(15);
    pub const FA6: Fpr = Fpr(16);
    pub const FA7: Fpr = Fpr(17);
    pub const FS2: Fpr = Fpr(18);
    pub const FS3: Fpr = Fpr(19);
    pub const FS4: Fpr = Fpr(20);
    pub const FS5: Fpr = Fpr(21);
    pub const FS6: Fpr = Fpr(22);
    pub const FS7: Fpr = Fpr(23);
    pub const FS8: Fpr = Fpr(24);
    pub const FS9: Fpr = Fpr(25);
    pub const FS10: Fpr = Fpr(26);
    pub const FS11: Fpr = Fpr(27);
    pub const FT8: Fpr = Fpr(28);
    pub const FT9: Fpr = Fpr(29);
    pub const FT10: Fpr = Fpr(30);
    pub const FT11: Fpr = Fpr(31);
}

impl fmt::Debug for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(GPR_NAMES[self.0 as usize])
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(GPR_NAMES[self.0 as usize])
    }
}

impl fmt::Debug for Fpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(FPR_NAMES[self.0 as usize])
    }
}

impl fmt::Display for Fpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(FPR_NAMES[self.0 as usize])
    }
}

impl From<AsmReg> for Gpr {
    fn from(reg: AsmReg) -> Self {
        assert_eq!(reg.bank, GP_BANK, "{reg:?} is not a general-purpose register");
        Gpr(reg.id)
    }
}

impl From<AsmReg> for Fpr {
    fn from(reg: AsmReg) -> Self {
        assert_eq!(reg.bank, FP_BANK, "{reg:?} is not a floating-point register");
        Fpr(reg.id)
    }
}

// ==== ARCHITECTURE CONFIGURATION ====

/// Registers the backend never allocates, lends or clobbers: the hard-wired zero,
/// the return address, and the stack, global and thread pointers.
pub const RESERVED_GPRS: [Gpr; 5] = [Gpr::ZERO, Gpr::RA, Gpr::SP, Gpr::GP, Gpr::TP];

/// Register threading synthesized carries between limbs of extended arithmetic.
pub const CARRY: Gpr = Gpr::T0;

/// Scratch registers lent to composed operations, in checkout order.
pub static TEMP_GPRS: [AsmReg; 6] = [
    Gpr::T1.asm_reg(),
    Gpr::T2.asm_reg(),
    Gpr::T3.asm_reg(),
    Gpr::T4.asm_reg(),
    Gpr::T5.asm_reg(),
    Gpr::T6.asm_reg(),
];

/// Floating-point scratch registers.
pub static TEMP_FPRS: [AsmReg; 1] = [Fpr::FT11.asm_reg()];

/// Integer argument registers in assignment order; `a0` also returns values.
pub const ARG_GPRS: [Gpr; 8] = [
    Gpr::A0,
    Gpr::A1,
    Gpr::A2,
    Gpr::A3,
    Gpr::A4,
    Gpr::A5,
    Gpr::A6,
    Gpr::A7,
];

/// Floating-point argument registers; `fa0` also returns values.
pub const ARG_FPRS: [Fpr; 8] = [
    Fpr::FA0,
    Fpr::FA1,
    Fpr::FA2,
    Fpr::FA3,
    Fpr::FA4,
    Fpr::FA5,
    Fpr::FA6,
    Fpr::FA7,
];

/// Callee-saved registers available to generated code (`s0` is kept as frame pointer).
pub const CALLEE_SAVED_GPRS: [Gpr; 11] = [
    Gpr::S1,
    Gpr::S2,
    Gpr::S3,
    Gpr::S4,
    Gpr::S5,
    Gpr::S6,
    Gpr::S7,
    Gpr::S8,
    Gpr::S9,
    Gpr::S10,
    Gpr::S11,
];

/// Callee-saved floating-point registers.
pub const CALLEE_SAVED_FPRS: [Fpr; 12] = [
    Fpr::FS0,
    Fpr::FS1,
    Fpr::FS2,
    Fpr::FS3,
    Fpr::FS4,
    Fpr::FS5,
    Fpr::FS6,
    Fpr::FS7,
    Fpr::FS8,
    Fpr::FS9,
    Fpr::FS10,
    Fpr::FS11,
];

/// Registers every JIT entry frame saves in addition to the requested V registers.
pub const PLATFORM_CALLEE_SAVED_GPRS: [Gpr; 1] = [Gpr::RA];

/// Required alignment of the stack pointer at call boundaries, in bytes.
pub const STACK_ALIGNMENT: usize = 8;

/// Machine word size in bytes.
pub const WORD_SIZE: usize = 8;

/// Set form of [`RESERVED_GPRS`].
pub fn reserved_set() -> RegBitSet {
    let mut set = RegBitSet::new();
    for r in RESERVED_GPRS {
        set.set(r.asm_reg());
    }
    set
}
