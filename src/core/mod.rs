// This module holds the architecture-neutral infrastructure of rvjit, shared by any
// target that plugs into it. It covers four subsystems: error types (the few recoverable
// failures at the boundary with the host), session configuration (tunables with
// builder-style setters), the code buffer (page-mapped memory that tracks overflow
// instead of failing mid-emission and is later flipped to executable), and register
// bookkeeping (bank-qualified register ids, bitsets and the LIFO temp pool lending
// scratch registers to composed operations). Targets own their register names and
// instruction formats and build on these types.

//! Core rvjit infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - `JitError` for recoverable host-boundary failures, `JitResult<T>`
//!
//! ## Configuration (`config`)
//! - `JitConfig` with `Default` and chained `with_*` builders
//!
//! ## Code Buffer (`code_buffer`)
//! - mmap-backed emission buffer with overflow tracking
//! - W^X transitions and instruction cache flushing
//!
//! ## Registers (`register_file`)
//! - `AsmReg` and `RegBitSet`
//! - `TempRegisterPool`, strictly LIFO checkout and release

pub mod error;
pub mod config;
pub mod code_buffer;
pub mod register_file;

pub use error::{
    JitError,
    JitResult,
};

pub use config::JitConfig;
pub use code_buffer::CodeBuffer;

pub use register_file::{
    AsmReg,
    RegBitSet,
    TempRegisterPool,
};
