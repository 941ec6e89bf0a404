//! rvjit - a RISC-V RV64 machine code emission backend.
//!
//! rvjit turns architecture-neutral operations (integer and floating-point
//! arithmetic, compare-and-branch, loads and stores, calls with arbitrary
//! argument lists) into RV64IMAFD instruction words written straight into a
//! page-mapped buffer. Whatever the ISA lacks is synthesized: wide constants,
//! carries between limbs, overflow branches, all fourteen IEEE-754 branch
//! relations. Branches and address loads that may end up out of range go
//! through a literal pool with veneers, flushed inline before its entries
//! could become unreachable.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use rvjit::core::{CodeBuffer, JitConfig};
//! use rvjit::riscv::{Gpr, Jit};
//!
//! let arena = Bump::new();
//! let mut jit = Jit::new(&arena, JitConfig::default());
//! jit.begin(CodeBuffer::new(4096)?);
//! let skip = jit.beqi(Gpr::A0, 0);
//! jit.addi(Gpr::A0, Gpr::A0, 1);
//! jit.patch_here(skip);
//! jit.ret();
//! let code = jit.end()?;
//! code.make_executable()?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shared infrastructure (errors, config, code buffer, registers)
//! - [`riscv`] - The RV64 target: encoder, session, pool, composer, ABI, simulator

pub mod core;
pub mod riscv;

pub use core::{CodeBuffer, JitConfig, JitError, JitResult};
pub use riscv::{FinishedCode, Fpr, Gpr, Jit, Operand, OperandAbi, Reloc};
