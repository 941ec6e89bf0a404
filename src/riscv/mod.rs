//! RISC-V RV64 components.
//!
//! This module contains everything specific to the RV64IMAFD target:
//! - Register names and ABI tables (`regs`)
//! - Instruction encoding and decoding helpers (`encoding`, `insn`)
//! - The emission session with its temp pools (`jit`)
//! - Constant materialization (`imm`)
//! - Relocations, the literal pool and veneers (`reloc`)
//! - Pseudo-operations built on the above (`alu`, `branch`, `memory`, `fpu`, `atomic`)
//! - Argument marshaling and frame management (`abi`)
//! - ELF object output (`elf`)
//! - A reference interpreter for running emitted code anywhere (`sim`)

pub mod regs;
pub mod encoding;
pub mod insn;
pub mod jit;
pub mod imm;
pub mod reloc;
pub mod alu;
pub mod branch;
pub mod memory;
pub mod fpu;
pub mod atomic;
pub mod abi;
pub mod elf;
pub mod sim;

pub use regs::{Fpr, Gpr};

pub use insn::FpWidth;

pub use jit::{
    EmitStats,
    FinishedCode,
    Jit,
};

pub use imm::{
    materialize,
    ImmSequence,
};

pub use reloc::{
    Reloc,
    RelocKind,
};

pub use elf::emit_elf;
pub use memory::MemWidth;
pub use fpu::FpCond;

pub use abi::{
    AbiArgIterator,
    Operand,
    OperandAbi,
    OperandLoc,
};

pub use sim::{
    Machine,
    SimError,
    SimResult,
    Simulator,
};
